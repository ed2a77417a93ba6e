use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

use super::models::{ChannelModel, MessageModel};
use crate::session::UserIdentity;
use crate::shared::AppError;

/// History size used when a caller passes a non-positive limit
const DEFAULT_HISTORY_LIMIT: i64 = 50;

/// Durable channel/message store consulted by the hub.
/// Implementations must be safe to call concurrently.
#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn channel_exists(&self, channel_id: i64) -> Result<bool, AppError>;

    /// Returns at most `limit` of the newest messages in the channel, oldest first
    async fn load_recent_messages(
        &self,
        channel_id: i64,
        limit: i64,
    ) -> Result<Vec<MessageModel>, AppError>;

    /// Stores a message and returns its canonical form (generated id and timestamp)
    async fn create_message(
        &self,
        author: &UserIdentity,
        channel_id: i64,
        content: &str,
    ) -> Result<MessageModel, AppError>;

    /// Returns the channel with this name, creating it if needed
    async fn ensure_channel(&self, name: &str, kind: &str) -> Result<ChannelModel, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

fn effective_limit(limit: i64) -> i64 {
    if limit <= 0 {
        DEFAULT_HISTORY_LIMIT
    } else {
        limit
    }
}

/// In-memory implementation of ChatRepository for development and testing
pub struct InMemoryChatRepository {
    state: Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    channels: Vec<ChannelModel>,
    messages: Vec<MessageModel>,
    last_channel_id: i64,
    last_message_id: i64,
}

impl Default for InMemoryChatRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryChatRepository {
    /// Creates a new empty in-memory repository
    pub fn new() -> Self {
        Self {
            state: Mutex::new(InMemoryState::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, InMemoryState>, AppError> {
        self.state.lock().map_err(|_| AppError::Internal)
    }

    /// Number of stored messages across all channels (useful for assertions)
    pub fn message_count(&self) -> usize {
        self.lock().map(|state| state.messages.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChatRepository for InMemoryChatRepository {
    #[instrument(skip(self))]
    async fn channel_exists(&self, channel_id: i64) -> Result<bool, AppError> {
        let state = self.lock()?;
        Ok(state.channels.iter().any(|c| c.id == channel_id))
    }

    #[instrument(skip(self))]
    async fn load_recent_messages(
        &self,
        channel_id: i64,
        limit: i64,
    ) -> Result<Vec<MessageModel>, AppError> {
        let state = self.lock()?;
        let mut newest_first: Vec<MessageModel> = state
            .messages
            .iter()
            .rev()
            .filter(|m| m.channel_id == channel_id)
            .take(effective_limit(limit) as usize)
            .cloned()
            .collect();
        newest_first.reverse();

        debug!(
            channel_id,
            count = newest_first.len(),
            "Loaded channel history from memory"
        );
        Ok(newest_first)
    }

    #[instrument(skip(self, author, content), fields(user_id = author.user_id))]
    async fn create_message(
        &self,
        author: &UserIdentity,
        channel_id: i64,
        content: &str,
    ) -> Result<MessageModel, AppError> {
        let mut state = self.lock()?;
        if !state.channels.iter().any(|c| c.id == channel_id) {
            warn!(channel_id, "Message for unknown channel rejected");
            return Err(AppError::NotFound("Channel not found".to_string()));
        }

        state.last_message_id += 1;
        let message = MessageModel {
            id: state.last_message_id,
            channel_id,
            user_id: author.user_id,
            username: author.username.clone(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        state.messages.push(message.clone());

        debug!(message_id = message.id, "Message stored in memory");
        Ok(message)
    }

    #[instrument(skip(self))]
    async fn ensure_channel(&self, name: &str, kind: &str) -> Result<ChannelModel, AppError> {
        let mut state = self.lock()?;
        if let Some(existing) = state.channels.iter().find(|c| c.name == name) {
            return Ok(existing.clone());
        }

        state.last_channel_id += 1;
        let channel = ChannelModel {
            id: state.last_channel_id,
            name: name.to_string(),
            kind: kind.to_string(),
        };
        state.channels.push(channel.clone());

        debug!(channel_id = channel.id, "Channel created in memory");
        Ok(channel)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.lock().map(|_| ())
    }
}

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS channels (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        type TEXT NOT NULL,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        channel_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        username TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at DATETIME NOT NULL,
        FOREIGN KEY (channel_id) REFERENCES channels(id) ON DELETE CASCADE
    )",
    "CREATE INDEX IF NOT EXISTS idx_messages_channel_id ON messages (channel_id, id)",
];

/// SQLite implementation of the chat repository
pub struct SqliteChatRepository {
    pool: SqlitePool,
}

impl SqliteChatRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if missing) the database at `database_url` in WAL mode
    #[instrument]
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        if let Some(dir) = options
            .clone()
            .get_filename()
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
        {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                AppError::DatabaseError(format!("create database directory: {}", e))
            })?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        info!("Connected to SQLite database");
        Ok(Self::new(pool))
    }

    pub async fn init_schema(&self) -> Result<(), AppError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await.map_err(|e| {
                warn!(error = %e, "Failed to apply schema");
                AppError::from(e)
            })?;
        }
        debug!("Database schema ready");
        Ok(())
    }
}

#[async_trait]
impl ChatRepository for SqliteChatRepository {
    #[instrument(skip(self))]
    async fn channel_exists(&self, channel_id: i64) -> Result<bool, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM channels WHERE id = ?")
            .bind(channel_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, channel_id, "Failed to look up channel");
                AppError::from(e)
            })?;
        Ok(count > 0)
    }

    #[instrument(skip(self))]
    async fn load_recent_messages(
        &self,
        channel_id: i64,
        limit: i64,
    ) -> Result<Vec<MessageModel>, AppError> {
        let mut messages = sqlx::query_as::<_, MessageModel>(
            "SELECT id, channel_id, user_id, username, content, created_at
             FROM messages
             WHERE channel_id = ?
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(channel_id)
        .bind(effective_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, channel_id, "Failed to load channel history");
            AppError::from(e)
        })?;

        // Fetched newest-first so LIMIT keeps the latest ones
        messages.reverse();

        debug!(channel_id, count = messages.len(), "Loaded channel history");
        Ok(messages)
    }

    #[instrument(skip(self, author, content), fields(user_id = author.user_id))]
    async fn create_message(
        &self,
        author: &UserIdentity,
        channel_id: i64,
        content: &str,
    ) -> Result<MessageModel, AppError> {
        let message = sqlx::query_as::<_, MessageModel>(
            "INSERT INTO messages (channel_id, user_id, username, content, created_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id, channel_id, user_id, username, content, created_at",
        )
        .bind(channel_id)
        .bind(author.user_id)
        .bind(&author.username)
        .bind(content)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, channel_id, "Failed to insert message");
            AppError::from(e)
        })?;

        debug!(message_id = message.id, "Message stored");
        Ok(message)
    }

    #[instrument(skip(self))]
    async fn ensure_channel(&self, name: &str, kind: &str) -> Result<ChannelModel, AppError> {
        sqlx::query("INSERT INTO channels (name, type) VALUES (?, ?) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .bind(kind)
            .execute(&self.pool)
            .await?;

        let channel =
            sqlx::query_as::<_, ChannelModel>("SELECT id, name, type FROM channels WHERE name = ?")
                .bind(name)
                .fetch_one(&self.pool)
                .await?;

        debug!(channel_id = channel.id, name = %channel.name, "Channel ensured");
        Ok(channel)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
