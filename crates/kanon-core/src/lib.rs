//! # Kanon Core
//!
//! Core types for the Kanon Gatekeeper policy toolchain.
//!
//! This crate provides the model that metadata extraction produces and that
//! manifest and documentation generators consume:
//!
//! - [`Policy`] - One severity-classified Rego policy with its metadata
//! - [`Severity`] - `violation` or `warn` classification
//! - [`Parameter`] - A declared constraint parameter
//! - [`Matchers`] - Canonical constraint matchers
//! - [`Advisory`] - Non-fatal findings raised during extraction
//!
//! ## Example
//!
//! ```rust
//! use kanon_core::{KindMatchers, Matchers, Parameter, Policy, Severity};
//!
//! let policy = Policy::new(
//!     "policies/required-labels/src.rego",
//!     "package required_labels",
//!     Severity::Violation,
//! )
//! .with_title("Required labels")
//! .with_parameter(Parameter::new("labels", "string").array())
//! .with_matchers(Matchers {
//!     kind_matchers: KindMatchers::from_pairs([("core", "Namespace")]),
//!     ..Matchers::default()
//! });
//!
//! assert_eq!(policy.kind, "RequiredLabels");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod matchers;
pub mod parameter;
pub mod policy;

#[cfg(test)]
mod proptest_tests;

// Re-export main types at crate root
pub use error::{Error, Result};
pub use matchers::{KindMatcher, KindMatchers, MatchExpressionMatcher, MatchLabelsMatcher, Matchers};
pub use parameter::Parameter;
pub use policy::{Advisory, AdvisoryKind, Policy, Severity};
