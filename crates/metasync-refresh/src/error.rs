//! Refresh pass error types.

use metasync_state::StateError;
use thiserror::Error;

/// Errors that abort a whole refresh pass.
///
/// Failures of a single entity never surface here; the dispatcher logs
/// and counts them.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("failed to load {kind} records: {source}")]
    Load {
        kind: &'static str,
        #[source]
        source: StateError,
    },

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

impl RefreshError {
    pub(crate) fn load(kind: &'static str) -> impl FnOnce(StateError) -> Self {
        move |source| RefreshError::Load { kind, source }
    }
}

pub type RefreshResult<T> = Result<T, RefreshError>;
