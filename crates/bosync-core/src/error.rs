// ── Core error types ──
//
// Errors surfaced by the sync layer. Transport failures are wrapped, not
// re-exposed raw; request validation failures become `InvalidRequest` so
// callers can tell a programming error from a server error.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    // ── Transport ────────────────────────────────────────────────────
    #[error(transparent)]
    Api(bosync_api::Error),

    // ── Programming errors ───────────────────────────────────────────
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Resource watcher has been disposed")]
    Disposed,

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// The underlying transport error, if this is one.
    pub fn api(&self) -> Option<&bosync_api::Error> {
        match self {
            Self::Api(e) => Some(e),
            _ => None,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<bosync_api::Error> for CoreError {
    fn from(err: bosync_api::Error) -> Self {
        match err {
            bosync_api::Error::MissingField { message, field } => CoreError::InvalidRequest {
                message: format!("{message} is missing required field `{field}`"),
            },
            bosync_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid endpoint URL: {e}"),
            },
            other => CoreError::Api(other),
        }
    }
}
