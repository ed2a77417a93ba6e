// Public API
pub use models::{ChannelModel, MessageModel};
pub use repository::{ChatRepository, InMemoryChatRepository, SqliteChatRepository};

// Internal modules
mod models;
mod repository;

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::shared::AppError;

/// Runs a store call under `limit`. An elapsed call counts as failed and is not retried.
pub async fn with_timeout<T, F>(limit: Duration, operation: &'static str, call: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, timeout_ms = limit.as_millis() as u64, "Store call timed out");
            Err(AppError::Timeout(operation.to_string()))
        }
    }
}
