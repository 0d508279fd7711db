//! Header annotation extraction.
//!
//! A policy header is either a METADATA block (possibly next to leftover
//! legacy tags) or legacy tags alone. [`HeaderAnnotations`] records which one
//! was found, and [`HeaderAnnotations::resolve`] turns either into the same
//! [`Annotations`] value so later stages never look at the format again.

pub mod legacy;
pub mod structured;

use std::collections::BTreeMap;

use kanon_core::policy::DEFAULT_ENFORCEMENT;
use kanon_core::{Advisory, AdvisoryKind, Matchers, Parameter};

use crate::error::AnnotationError;
use crate::matchers::{self, legacy_advisory};
use crate::parameters;
use crate::parser::Comment;

pub use legacy::LegacyAnnotations;
pub use structured::StructuredAnnotations;

/// Header metadata as declared, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderAnnotations {
    /// The header has a METADATA block. Legacy tags outside it only
    /// contribute matcher categories and parameters the block leaves out.
    Structured {
        /// The METADATA block.
        metadata: StructuredAnnotations,
        /// Tags found outside the block.
        legacy: LegacyAnnotations,
    },
    /// The header only has legacy tags and free text.
    Legacy(LegacyAnnotations),
}

/// Normalized header metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations {
    /// Title, empty if none.
    pub title: String,
    /// Description, empty if none.
    pub description: String,
    /// Enforcement action, `deny` unless declared.
    pub enforcement: String,
    /// Skip Constraint generation.
    pub skip_constraint: bool,
    /// Skip ConstraintTemplate generation.
    pub skip_template: bool,
    /// Canonical matchers.
    pub matchers: Matchers,
    /// Declared parameters.
    pub parameters: Vec<Parameter>,
    /// Constraint annotations.
    pub annotations: BTreeMap<String, String>,
    /// Constraint labels.
    pub labels: BTreeMap<String, String>,
    /// Whether a METADATA block was found.
    pub has_metadata: bool,
    /// Non-fatal findings.
    pub advisories: Vec<Advisory>,
}

impl HeaderAnnotations {
    /// Reads header comments, looking for a METADATA block first.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed YAML, a mistyped METADATA key or a
    /// malformed `@parameter` line.
    pub fn extract(header: &[Comment]) -> Result<Self, AnnotationError> {
        let (block, rest) = structured::split_metadata_block(header);
        let legacy = LegacyAnnotations::parse(&rest)?;

        Ok(match block {
            Some(block) => Self::Structured {
                metadata: StructuredAnnotations::parse(&block)?,
                legacy,
            },
            None => Self::Legacy(legacy),
        })
    }

    /// Returns true if a METADATA block was found.
    #[must_use]
    pub const fn has_metadata(&self) -> bool {
        matches!(self, Self::Structured { .. })
    }

    /// Normalizes matchers and parameters and applies defaults.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed matcher tags or METADATA matcher and
    /// parameter values.
    pub fn resolve(self) -> Result<Annotations, AnnotationError> {
        match self {
            Self::Structured { metadata, legacy } => resolve_structured(metadata, &legacy),
            Self::Legacy(legacy) => resolve_legacy(legacy),
        }
    }
}

fn resolve_structured(
    metadata: StructuredAnnotations,
    legacy: &LegacyAnnotations,
) -> Result<Annotations, AnnotationError> {
    let mut advisories = Vec::new();

    if legacy.title.is_some() || legacy.enforcement.is_some() || legacy.skip_constraint {
        advisories.push(Advisory::new(
            AdvisoryKind::PrecedenceConflict,
            "Legacy @title, @enforcement and @skip-constraint annotations are ignored when OPA Metadata is present.",
        ));
    }

    let structured_matchers = match &metadata.matchers {
        Some(value) => {
            let (declared, unsupported) = matchers::from_structured(value)?;
            advisories.extend(unsupported);
            Some(declared)
        }
        None => None,
    };
    let (matchers, merge_advisories) =
        matchers::merge(matchers::from_legacy(&legacy.matcher_tags)?, structured_matchers);
    advisories.extend(merge_advisories);

    let parameters = match &metadata.parameters {
        Some(value) => {
            if !legacy.parameters.is_empty() {
                advisories.push(Advisory::new(
                    AdvisoryKind::PrecedenceConflict,
                    "Parameters set with legacy annotations are overridden by OPA Metadata.",
                ));
            }
            parameters::from_structured(value)?
        }
        None => legacy_parameters(legacy.parameters.clone(), &mut advisories),
    };

    Ok(Annotations {
        title: metadata.title.unwrap_or_default(),
        description: metadata.description.unwrap_or_default(),
        enforcement: metadata
            .enforcement
            .unwrap_or_else(|| DEFAULT_ENFORCEMENT.to_string()),
        skip_constraint: metadata.skip_constraint,
        skip_template: metadata.skip_template,
        matchers,
        parameters,
        annotations: metadata.annotations,
        labels: metadata.labels,
        has_metadata: true,
        advisories,
    })
}

fn resolve_legacy(legacy: LegacyAnnotations) -> Result<Annotations, AnnotationError> {
    let (matchers, mut advisories) = matchers::merge(matchers::from_legacy(&legacy.matcher_tags)?, None);
    let parameters = legacy_parameters(legacy.parameters, &mut advisories);

    Ok(Annotations {
        title: legacy.title.unwrap_or_default(),
        description: legacy.description,
        enforcement: legacy
            .enforcement
            .unwrap_or_else(|| DEFAULT_ENFORCEMENT.to_string()),
        skip_constraint: legacy.skip_constraint,
        skip_template: false,
        matchers,
        parameters,
        annotations: BTreeMap::new(),
        labels: BTreeMap::new(),
        has_metadata: false,
        advisories,
    })
}

fn legacy_parameters(parameters: Vec<Parameter>, advisories: &mut Vec<Advisory>) -> Vec<Parameter> {
    if !parameters.is_empty() {
        advisories.push(legacy_advisory("Parameters"));
    }
    parameters
}
