use crate::model::SessionId;

/// Errors returned by a `ChatBackend` while opening a turn stream, reading it,
/// or fetching the authoritative transcript.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Backend answered with a non-success HTTP status.
    #[error("backend returned status {status}: {message}")]
    Status { status: u16, message: String },
    /// Connection or body read failed.
    #[error("transport error: {message}")]
    Network { message: String },
    /// Backend answered, but the response could not be understood.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },
}

impl TransportError {
    /// Creates a status error.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Creates a network-level error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates an invalid-response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Returns the HTTP status when the backend produced one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Network { .. } | Self::InvalidResponse { .. } => None,
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Status { message, .. }
            | Self::Network { message }
            | Self::InvalidResponse { message } => message,
        }
    }
}

/// Top-level error type for the public client API.
///
/// Failures that happen *during* a turn are reported through `TurnObserver`
/// and the returned `TurnOutcome`; this type covers what prevents a turn or a
/// fetch from happening at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input.
    #[error("validation error: {0}")]
    Validation(String),
    /// `start` was called while another turn of the same session is running.
    #[error("a turn is already in progress for session {session}")]
    TurnInProgress { session: SessionId },
    /// Backend failure outside of a running turn (for example a refetch).
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ChatError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
