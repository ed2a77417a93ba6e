use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Database model for the channels table
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ChannelModel {
    pub id: i64,
    pub name: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String, // "text" or "voice"
}

/// Canonical stored form of a chat message, as broadcast to clients
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct MessageModel {
    pub id: i64,
    pub channel_id: i64,
    pub user_id: i64,
    pub username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
