//! Metadata store errors.

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

/// Backend failures carry redb's message as text. Codec failures also
/// name the record kind so a bad row can be traced to its table.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot open metadata store: {0}")]
    Open(String),

    #[error("storage backend: {0}")]
    Backend(String),

    #[error("cannot encode {kind} record: {reason}")]
    Encode { kind: &'static str, reason: String },

    #[error("cannot decode {kind} record: {reason}")]
    Decode { kind: &'static str, reason: String },

    /// Raised by wrapping stores that refuse a lookup.
    #[error("query rejected: {0}")]
    Query(String),
}
