//! Error types for schema loading, oracle consultation, and compilation.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::Phase;

/// Errors while loading or querying a capability schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed capability schema: {}", errors.join("; "))]
    InvalidDocument { errors: Vec<String> },

    #[error("provider '{provider}' not in schema (available: {})", available.join(", "))]
    UnknownProvider {
        provider: String,
        available: Vec<String>,
    },

    #[error("no version pin for provider '{provider}': add provider_versions to the document or pass one explicitly")]
    MissingProviderVersion { provider: String },

    #[error("invalid type for {kind}.{attribute}: {message}")]
    InvalidType {
        kind: String,
        attribute: String,
        message: String,
    },

    #[error("unknown resource kind: {kind}")]
    UnknownKind { kind: String },
}

impl SchemaError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            SchemaError::FileNotFound { .. } | SchemaError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            SchemaError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}

/// Errors from the architecture oracle. Isolated to a single intent.
#[derive(Debug, Error)]
pub enum OracleError {
    #[cfg(feature = "remote")]
    #[error("oracle request for '{intent}' failed: {source}")]
    Request {
        intent: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("oracle returned status {status} for '{intent}'")]
    Status { intent: String, status: u16 },

    #[error("malformed oracle response for '{intent}': {message}")]
    MalformedResponse { intent: String, message: String },

    #[error("oracle has no suggestion for '{intent}'")]
    NoSuggestion { intent: String },
}

impl OracleError {
    /// Name of the intent the failed call was made for.
    pub fn intent(&self) -> &str {
        match self {
            #[cfg(feature = "remote")]
            OracleError::Request { intent, .. } => intent,
            OracleError::Status { intent, .. }
            | OracleError::MalformedResponse { intent, .. }
            | OracleError::NoSuggestion { intent } => intent,
        }
    }

    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            #[cfg(feature = "remote")]
            OracleError::Request { .. } => 3,
            OracleError::Status { .. } => 3,
            _ => 2,
        }
    }
}

/// Errors that abort (part of) a compilation run.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("circular dependency involving {kind}")]
    DependencyCycle { kind: String },

    #[error("cannot infer required attribute '{attribute}' of {kind}")]
    UnresolvableAttribute { kind: String, attribute: String },

    #[error("invalid attributes for {kind}: {}", errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    InvalidAttributes {
        kind: String,
        errors: Vec<AttributeViolation>,
    },

    #[error("oracle suggested no known resource kinds for '{intent}'")]
    NoValidKinds { intent: String },

    #[error("no resources to emit: every intent failed")]
    NoResources,

    #[error("graph references unknown node: {id}")]
    UnknownNode { id: String },

    #[error("duplicate node: {id}")]
    DuplicateNode { id: String },

    #[error("cannot start oracle worker pool: {message}")]
    WorkerPool { message: String },
}

impl CompileError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            CompileError::Schema(e) => e.exit_code(),
            CompileError::Oracle(e) => e.exit_code(),
            CompileError::InvalidAttributes { .. } => 1,
            _ => 2,
        }
    }
}

/// A run-level failure, tagged with the phase it happened in.
#[derive(Debug, Error)]
#[error("compilation failed during {phase}: {error}")]
pub struct CompileFailure {
    pub phase: Phase,
    #[source]
    pub error: CompileError,
}

impl CompileFailure {
    pub fn new(phase: Phase, error: impl Into<CompileError>) -> Self {
        Self {
            phase,
            error: error.into(),
        }
    }

    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        self.error.exit_code()
    }
}

/// One problem found when checking an attribute map against a resource model.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttributeViolation {
    /// The resource kind is not in the catalog.
    UnknownKind { kind: String },
    /// A required attribute has no value.
    MissingRequired { attribute: String },
    /// The attribute does not exist in the schema for this kind.
    UnknownAttribute { attribute: String },
    /// The attribute exists but is computed by the provider.
    ComputedOnly { attribute: String },
}

impl std::fmt::Display for AttributeViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeViolation::UnknownKind { kind } => write!(f, "unknown kind {}", kind),
            AttributeViolation::MissingRequired { attribute } => {
                write!(f, "{}: missing required attribute", attribute)
            }
            AttributeViolation::UnknownAttribute { attribute } => {
                write!(f, "{}: not in schema", attribute)
            }
            AttributeViolation::ComputedOnly { attribute } => {
                write!(f, "{}: computed by provider, cannot be set", attribute)
            }
        }
    }
}
