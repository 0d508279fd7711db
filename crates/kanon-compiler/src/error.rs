//! Error types for the Kanon compiler.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for compiler operations.
pub type Result<T> = std::result::Result<T, CompilerError>;

/// Errors that can occur while loading and compiling policies.
///
/// Every variant is fatal: compilation stops at the first one.
#[derive(Error, Debug)]
pub enum CompilerError {
    /// Failed to read a policy file.
    #[error("Failed to read policy file {path}: {source}")]
    FileReadError {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse Rego syntax.
    #[error("Rego parse error in {file} at line {line}: {message}")]
    ParseError {
        /// File being parsed.
        file: String,
        /// Line number of the error.
        line: usize,
        /// Error message.
        message: String,
    },

    /// Missing required package declaration.
    #[error("Missing package declaration in {file}")]
    MissingPackage {
        /// File missing the package.
        file: String,
    },

    /// Directory traversal failed.
    #[error("Failed to walk {path}: {source}")]
    WalkError {
        /// Directory being walked.
        path: PathBuf,
        /// Underlying walk error.
        #[source]
        source: walkdir::Error,
    },

    /// The ignore pattern is not a valid regex.
    #[error("Invalid ignore pattern `{pattern}`: {source}")]
    InvalidIgnorePattern {
        /// The rejected pattern.
        pattern: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// A header annotation is malformed.
    #[error("Invalid annotation in {file}: {source}")]
    Annotation {
        /// File carrying the annotation.
        file: String,
        /// What is wrong with it.
        #[source]
        source: AnnotationError,
    },

    /// Rule bodies reference parameters that are never declared.
    #[error("Missing parameter declarations in {file}: {}", .names.join(", "))]
    UndeclaredParameters {
        /// File referencing the parameters.
        file: String,
        /// Every referenced-but-undeclared name, in first-seen order.
        names: Vec<String>,
    },

    /// An import does not match any package in the corpus.
    #[error("import not found: `{import}` (in {file})")]
    ImportNotFound {
        /// File declaring the import.
        file: String,
        /// The unresolved import path.
        import: String,
    },

    /// The policy file has no directory to name its constraint kind after.
    #[error("Cannot derive a constraint kind for {file}: policies must live in their own directory")]
    MissingKind {
        /// The policy file.
        file: String,
    },

    /// Manifest or documentation output failed.
    #[error("Failed to render {what}: {message}")]
    RenderError {
        /// What was being rendered.
        what: String,
        /// Error message.
        message: String,
    },

    /// YAML serialization error.
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Core library error.
    #[error(transparent)]
    CoreError(#[from] kanon_core::Error),
}

impl CompilerError {
    /// Wraps an annotation error with the file it came from.
    pub fn annotation(file: impl Into<String>, source: AnnotationError) -> Self {
        Self::Annotation {
            file: file.into(),
            source,
        }
    }
}

/// Malformed annotation content.
#[derive(Error, Debug)]
pub enum AnnotationError {
    /// A `@kinds` token is not `<apiGroup>/<kind>`.
    #[error("invalid @kinds annotation token: {token} (expected <apiGroup>/<kind>)")]
    InvalidKind {
        /// The offending token.
        token: String,
    },

    /// A `@matchlabels` token is not `key=value`.
    #[error("invalid @matchlabels annotation token: {token} (expected key=value)")]
    InvalidMatchLabel {
        /// The offending token.
        token: String,
    },

    /// A `@matchExpression` line has the wrong number of segments.
    #[error("invalid @matchExpression annotation: expected 2 or 3 segments, got {segments}: {comment}")]
    InvalidMatchExpression {
        /// Number of segments found.
        segments: usize,
        /// The offending comment.
        comment: String,
    },

    /// A list tag was given without values.
    #[error("{tag} annotation requires at least one value")]
    EmptyList {
        /// The tag that was left bare.
        tag: String,
    },

    /// A `@parameter` line is not `<name> [array] <type> [-- description]`.
    #[error("invalid @parameter annotation: {comment} (expected <name> [array] <type> [-- description])")]
    InvalidParameter {
        /// The offending comment.
        comment: String,
    },

    /// A METADATA key holds a value of the wrong type.
    #[error("metadata key `{key}` must be {expected}, got {actual}")]
    InvalidType {
        /// Dotted path of the key.
        key: String,
        /// Expected type.
        expected: &'static str,
        /// Actual type found.
        actual: &'static str,
    },

    /// A required METADATA key is absent.
    #[error("metadata key `{key}` is required")]
    MissingKey {
        /// Dotted path of the key.
        key: String,
    },

    /// The METADATA block is not valid YAML.
    #[error("METADATA block is not valid YAML: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),
}
