//! # Kanon Compiler
//!
//! Static metadata extraction for Rego policies and the generators that
//! consume it.
//!
//! This crate provides functionality for:
//!
//! - Loading a policy directory into package-indexed modules
//! - Reading legacy `@tag` and OPA METADATA header annotations
//! - Normalizing matchers and checking parameter references
//! - Resolving library imports transitively
//! - Building Gatekeeper manifests, built in or from custom templates, and
//!   Markdown documentation
//!
//! Policy logic is never evaluated; rule heads, imports and comments are all
//! that is inspected.
//!
//! ## Example
//!
//! ```rust,no_run
//! use kanon_compiler::manifest::{to_yaml, ManifestBuilder, ManifestOptions};
//! use kanon_compiler::{Compiler, CompilerConfig, LoaderConfig};
//!
//! let config = CompilerConfig::new()
//!     .with_loader(LoaderConfig::new().with_ignore_pattern("deprecated/")?);
//! let policies = Compiler::new(config).compile_dir("policies")?;
//!
//! let builder = ManifestBuilder::new(ManifestOptions::new().with_dryrun(true));
//! for policy in &policies {
//!     if let Some(template) = builder.build(policy)?.template {
//!         println!("{}", to_yaml(&template)?);
//!     }
//! }
//! # Ok::<(), kanon_compiler::CompilerError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod annotations;
pub mod classifier;
pub mod compiler;
pub mod convert;
pub mod custom_template;
pub mod docs;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod matchers;
pub mod parameters;
pub mod parser;
pub mod resolver;


pub use annotations::{Annotations, HeaderAnnotations};
pub use classifier::classify;
pub use compiler::{Compiler, CompilerConfig};
pub use custom_template::CustomTemplate;
pub use error::{AnnotationError, CompilerError, Result};
pub use loader::{Loader, LoaderConfig, ModuleSet};
pub use manifest::{
    ManifestBuilder, ManifestOptions, Manifests, RenderedManifests, TemplateVersion,
};
pub use parser::{Parser, RegoModule};
pub use resolver::{Resolver, ResolverConfig};
