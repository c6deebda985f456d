use thiserror::Error;

/// RPC status codes surfaced by the transport.
///
/// Mirrors the gRPC code space so status errors from a gRPC-web client can
/// be carried through unchanged.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::FromRepr,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(u8)]
pub enum Code {
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

/// Top-level error type for the `bosync-api` crate.
///
/// Covers every failure the transport collaborator can report: RPC status
/// errors, endpoint resolution, stream termination, and request validation.
/// `Clone` so it can be recorded in reactive state and still be returned to
/// the caller that triggered the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // ── RPC ─────────────────────────────────────────────────────────
    /// The server answered with a non-OK status.
    #[error("RPC failed ({code}): {message}")]
    Status { code: Code, message: String },

    /// The transport could not reach the server at all.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// The call was cancelled by the client.
    #[error("Request cancelled")]
    Cancelled,

    // ── Endpoint ────────────────────────────────────────────────────
    /// The connection endpoint could not be resolved.
    #[error("Cannot resolve endpoint: {0}")]
    Endpoint(String),

    /// Endpoint URL failed to parse.
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Streams ─────────────────────────────────────────────────────
    /// The server terminated a stream with an error.
    #[error("Stream closed by server: {reason}")]
    StreamClosed { reason: String },

    // ── Requests ────────────────────────────────────────────────────
    /// A request was built without a required field.
    #[error("{message} is missing required field `{field}`")]
    MissingField {
        message: &'static str,
        field: &'static str,
    },
}

impl Error {
    /// Shorthand for a status error.
    pub fn status(code: Code, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    /// Returns `true` if the failure is likely to go away on its own.
    ///
    /// The sync layer never retries; this is for consumers deciding how
    /// loudly to surface an error.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::StreamClosed { .. } | Self::Endpoint(_) => true,
            Self::Status { code, .. } => matches!(
                code,
                Code::Unavailable | Code::DeadlineExceeded | Code::ResourceExhausted | Code::Aborted
            ),
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Status {
                code: Code::NotFound,
                ..
            }
        )
    }

    /// The status code, if the server supplied one.
    pub fn code(&self) -> Option<Code> {
        match self {
            Self::Status { code, .. } => Some(*code),
            Self::Cancelled => Some(Code::Cancelled),
            Self::Unavailable(_) => Some(Code::Unavailable),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_round_trips_through_repr() {
        assert_eq!(Code::from_repr(5), Some(Code::NotFound));
        assert_eq!(Code::from_repr(0), None);
        assert_eq!("Unavailable".parse::<Code>().ok(), Some(Code::Unavailable));
    }

    #[test]
    fn transient_classification() {
        assert!(Error::Unavailable("refused".into()).is_transient());
        assert!(Error::status(Code::DeadlineExceeded, "slow").is_transient());
        assert!(!Error::status(Code::PermissionDenied, "nope").is_transient());
        assert!(
            !Error::MissingField {
                message: "PullRequest",
                field: "name"
            }
            .is_transient()
        );
    }

    #[test]
    fn not_found_only_for_status() {
        assert!(Error::status(Code::NotFound, "no device").is_not_found());
        assert!(!Error::Unavailable("x".into()).is_not_found());
    }

    #[test]
    fn display_includes_code() {
        let err = Error::status(Code::Internal, "boom");
        assert_eq!(err.to_string(), "RPC failed (Internal): boom");
    }
}
