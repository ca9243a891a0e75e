//! Error types for migrt.

use thiserror::Error;

/// The main error type for migrt operations.
#[derive(Debug, Error)]
pub enum MigrtError {
    /// Failed to parse a transformation clause.
    #[error("Parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    /// A related-insert directive was rejected.
    #[error("Invalid directive '{directive}': {reason}")]
    Directive { directive: String, reason: String },

    /// The artifact catalog could not be read or rewritten.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Another writer holds the catalog lock.
    #[error("Catalog is locked by another writer: {0}")]
    CatalogLocked(String),

    /// The generation assist failed.
    #[error("Assist error: {0}")]
    Assist(String),

    /// The mapping file could not be read into rows.
    #[error("Intake error: {0}")]
    Intake(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrtError {
    /// Create a parse error at the given position.
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }

    /// Create a directive error.
    pub fn directive(directive: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Directive {
            directive: directive.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for migrt operations.
pub type MigrtResult<T> = Result<T, MigrtError>;
