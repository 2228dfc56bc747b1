//! Typed errors for the vault-context library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.
//!
//! A note that no longer resolves is *not* an error: the vault reports it
//! as `None` and the strategies skip it.

use thiserror::Error;

/// Errors that can occur while extracting context or streaming a generation.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Vault read or metadata lookup failed
    #[error("vault error: {0}")]
    Vault(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A single query attempt failed
    #[error("query failed: {query}")]
    Query {
        query: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Query kept failing after every retry
    #[error("query failed after {attempts} attempts: {query}")]
    QueryExhausted {
        query: String,
        attempts: u32,
        #[source]
        source: Box<ContextError>,
    },

    /// Generation transport failed
    #[error("generation error: {0}")]
    Generation(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Structured output from a ranking call could not be parsed
    #[error("malformed model response after {attempts} attempts: {reason}")]
    MalformedResponse { attempts: u32, reason: String },

    /// Strategy descriptor or configuration is unusable
    #[error("invalid descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    /// Output sink rejected an append
    #[error("sink error: {0}")]
    Sink(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A configured pattern failed to compile
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

impl ContextError {
    /// Build a generation error from any displayable message.
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation(message.into().into())
    }

    /// Build a vault error from any displayable message.
    pub fn vault(message: impl Into<String>) -> Self {
        Self::Vault(message.into().into())
    }

    /// Build an invalid-descriptor error.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            reason: reason.into(),
        }
    }

    /// Text shown to the user as a transient notice.
    pub fn notice(&self) -> String {
        match self {
            Self::QueryExhausted { query, .. } => {
                format!("Could not run query `{}`. No context was retrieved.", query)
            }
            Self::MalformedResponse { .. } => {
                "The model returned an unreadable ranking. Try again.".to_string()
            }
            other => format!("Context generation failed: {}", other),
        }
    }
}

/// Result type alias for vault-context operations.
pub type Result<T> = std::result::Result<T, ContextError>;
