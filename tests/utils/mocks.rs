#![allow(dead_code)] // Test utilities may not all be used in every test

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use openvoice::session::UserIdentity;
use openvoice::store::{ChannelModel, ChatRepository, InMemoryChatRepository, MessageModel};
use openvoice::AppError;

// ============================================================================
// Mock Infrastructure
// ============================================================================

/// In-memory store with switchable failures and an optional delay on writes
#[derive(Default)]
pub struct MockChatRepository {
    inner: InMemoryChatRepository,
    fail_history: AtomicBool,
    fail_create: AtomicBool,
    create_delay_ms: AtomicU64,
    create_calls: AtomicUsize,
}

impl MockChatRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_history(&self, fail: bool) {
        self.fail_history.store(fail, Ordering::SeqCst);
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn delay_create(&self, delay: Duration) {
        self.create_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn stored_messages(&self) -> usize {
        self.inner.message_count()
    }
}

#[async_trait]
impl ChatRepository for MockChatRepository {
    async fn channel_exists(&self, channel_id: i64) -> Result<bool, AppError> {
        self.inner.channel_exists(channel_id).await
    }

    async fn load_recent_messages(
        &self,
        channel_id: i64,
        limit: i64,
    ) -> Result<Vec<MessageModel>, AppError> {
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError("history query failed".to_string()));
        }
        self.inner.load_recent_messages(channel_id, limit).await
    }

    async fn create_message(
        &self,
        author: &UserIdentity,
        channel_id: i64,
        content: &str,
    ) -> Result<MessageModel, AppError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.create_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError("insert failed".to_string()));
        }
        self.inner.create_message(author, channel_id, content).await
    }

    async fn ensure_channel(&self, name: &str, kind: &str) -> Result<ChannelModel, AppError> {
        self.inner.ensure_channel(name, kind).await
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.inner.health_check().await
    }
}
