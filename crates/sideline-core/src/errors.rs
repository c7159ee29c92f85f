use std::time::Duration;

/// REST collaborator failures. Surfaced once, never auto-retried; the store
/// reverts any optimistic transition and parks the message in its error slot.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Classify an HTTP status code into the appropriate variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            404 => Self::NotFound(body),
            400..=499 => Self::InvalidRequest(body),
            _ => Self::ServerError { status, body },
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::ServerError { .. } => "server_error",
            Self::Network(_) => "network",
            Self::Timeout(_) => "timeout",
            Self::Decode(_) => "decode",
        }
    }
}

/// Event-channel failures.
///
/// `RetriesExhausted` is terminal until a manual `connect()`; everything else
/// is transient and either retried automatically or returned to the caller of
/// a best-effort operation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// `send` was invoked while the channel was not connected. No I/O was
    /// attempted and the command was not queued.
    #[error("channel not connected")]
    NotConnected,
    /// No session is bound, so there is no endpoint to dial.
    #[error("no session bound to the channel")]
    NoSession,
    #[error("transport error: {0}")]
    Transport(String),
    /// Abnormal closure observed from the remote end.
    #[error("channel closed abnormally: {0}")]
    AbnormalClosure(String),
    /// The fixed reconnect bound was hit. Manual `connect()` required.
    #[error("gave up after {attempts} reconnect attempts")]
    RetriesExhausted { attempts: u32 },
}

impl ChannelError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }

    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::NoSession => "no_session",
            Self::Transport(_) => "transport",
            Self::AbnormalClosure(_) => "abnormal_closure",
            Self::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}
