//! Error types for the generator
//!
//! Every failure discovered inside the pipeline is a [`Diagnostic`]: it names the
//! source document, the JSON pointer inside it, the schema dialect and what went
//! wrong. The crate-level [`Error`] wraps diagnostics together with the I/O and
//! configuration failures that happen at the boundaries.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for orchestrated operations
pub type Result<T> = std::result::Result<T, Error>;

/// Location of a parsed schema node: virtual file plus in-file JSON pointer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub filepath: String,
    pub location: String,
}

impl SourceLocation {
    pub fn new(filepath: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            filepath: filepath.into(),
            location: location.into(),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.filepath, self.location)
    }
}

/// Schema dialect tag printed with every diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaDialect {
    #[default]
    JsonSchema,
    OpenApi,
}

impl SchemaDialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JsonSchema => "jsonschema",
            Self::OpenApi => "openapi",
        }
    }
}

impl fmt::Display for SchemaDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What went wrong
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiagnosticKind {
    #[error("Unknown field: \"{field}\", known fields: [{known}]")]
    UnknownField { field: String, known: String },

    #[error("Unknown vendor extension \"{key}\" for {variant}")]
    UnknownVendorExtension { key: String, variant: String },

    #[error("\"type\" is missing")]
    TypeMissing,

    #[error("Unknown type \"{0}\"")]
    TypeUnknown(String),

    #[error("Duplicate path: {0}")]
    DuplicatePath(String),

    #[error("$ref to unknown type \"{0}\"")]
    RefUnresolved(String),

    #[error("$ref cycle: {}", .0.join(" -> "))]
    RefCycle(Vec<String>),

    #[error("Discriminator error: {0}")]
    DiscriminatorViolation(String),

    #[error("Unknown format \"{0}\"")]
    FormatUnsupported(String),

    #[error("Include file \"{include}\" not found, tried paths: {tried}")]
    IncludeNotFound { include: String, tried: String },

    #[error("Conflicting vendor extensions: {0}")]
    VendorConflict(String),

    #[error("Enum item type mismatch: {0}")]
    EnumTypeMismatch(String),

    #[error("Field \"{0}\" is set in \"required\", but missing in \"properties\"")]
    RequiredMissingProperty(String),

    #[error("\"x-usrv-cpp-extra-member\" is allowed only with boolean \"additionalProperties\"")]
    ExtraMemberMisuse,

    #[error("Invalid value: {0}")]
    InvalidFieldValue(String),

    #[error("No name map rule matches \"{0}\"")]
    NameNotMapped(String),
}

/// A located diagnostic
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{filepath}: error at \"{location}\" ({dialect}): {kind}")]
pub struct Diagnostic {
    pub filepath: String,
    pub location: String,
    pub dialect: SchemaDialect,
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn new(source: &SourceLocation, kind: DiagnosticKind) -> Self {
        Self::at(&source.filepath, &source.location, kind)
    }

    pub fn at(filepath: &str, location: &str, kind: DiagnosticKind) -> Self {
        Self {
            filepath: filepath.to_string(),
            location: location.to_string(),
            dialect: SchemaDialect::default(),
            kind,
        }
    }

    pub fn with_dialect(mut self, dialect: SchemaDialect) -> Self {
        self.dialect = dialect;
        self
    }
}

/// Generator errors
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Diagnostic(#[from] Diagnostic),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error in {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),

    #[error("Invalid name map rule \"{rule}\": {reason}")]
    NameMap { rule: String, reason: String },

    #[error("Formatter \"{}\" failed: {reason}", .binary.display())]
    Formatter { binary: PathBuf, reason: String },

    #[error("Template error: {0}")]
    Template(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::at(
            "schemas/a.yaml",
            "/definitions/T/enum",
            DiagnosticKind::EnumTypeMismatch("expected integer, got \"1\"".to_string()),
        );
        assert_eq!(
            diag.to_string(),
            "schemas/a.yaml: error at \"/definitions/T/enum\" (jsonschema): \
             Enum item type mismatch: expected integer, got \"1\""
        );
    }

    #[test]
    fn test_cycle_message_lists_members() {
        let kind =
            DiagnosticKind::RefCycle(vec!["a#/definitions/A".into(), "a#/definitions/B".into()]);
        assert_eq!(kind.to_string(), "$ref cycle: a#/definitions/A -> a#/definitions/B");
    }

    #[test]
    fn test_dialect_tag() {
        let diag = Diagnostic::new(
            &SourceLocation::new("f.yaml", "/x"),
            DiagnosticKind::TypeMissing,
        )
        .with_dialect(SchemaDialect::OpenApi);
        assert!(diag.to_string().contains("(openapi)"));
        assert_eq!(SourceLocation::new("f.yaml", "/x").to_string(), "f.yaml#/x");
    }
}
