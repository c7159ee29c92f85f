use sideline_core::errors::{ApiError, ChannelError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The operation was invoked in an invalid state and was rejected before
    /// any network call.
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("api error: {0}")]
    Api(#[from] ApiError),

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
}
