use thiserror::Error;

use crate::shared::AppError;

/// Failures reported back to a single connection as an `error` frame.
/// None of them close the connection; the display text is what the client sees.
#[derive(Error, Debug)]
pub enum HubError {
    // Protocol errors
    #[error("invalid event payload")]
    InvalidPayload,

    #[error("event payload too large")]
    FrameTooLarge,

    #[error("unsupported event type")]
    UnsupportedEvent,

    // Domain errors
    #[error("invalid channel id")]
    InvalidChannel,

    #[error("channel not found")]
    ChannelNotFound,

    #[error("message content is required")]
    EmptyMessage,

    #[error("message content too long")]
    MessageTooLong,

    #[error("channel is required for signal")]
    SignalChannelRequired,

    #[error("signal payload is required")]
    SignalPayloadRequired,

    #[error("connection is closed")]
    ConnectionClosed,

    // Collaborator failures, details stay in the logs
    #[error("failed to verify channel")]
    ChannelLookupFailed(#[source] AppError),

    #[error("failed to load channel history")]
    HistoryUnavailable(#[source] AppError),

    #[error("failed to create message")]
    MessageNotStored(#[source] AppError),

    #[error("failed to encode event")]
    Encode(#[from] serde_json::Error),
}

impl HubError {
    /// Whether the failure came from the store rather than the client
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            HubError::ChannelLookupFailed(_)
                | HubError::HistoryUnavailable(_)
                | HubError::MessageNotStored(_)
        )
    }
}
