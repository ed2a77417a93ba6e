// Library crate for the OpenVoice realtime hub
// This file exposes the public API for the binary and integration tests

pub mod config;
pub mod hub;
pub mod presence;
pub mod routes;
pub mod session;
pub mod shared;
pub mod store;
pub mod websockets;

// Re-export commonly used types for easier access in tests
pub use config::{AppConfig, RealtimeSettings};
pub use hub::{ConnectionHandle, ConnectionId, Hub, HubError, OutboundQueue};
pub use routes::build_router;
pub use session::UserIdentity;
pub use shared::{AppError, AppState};
pub use store::{ChatRepository, InMemoryChatRepository, SqliteChatRepository};
pub use websockets::{Connection, EventRouter, MessageHandler, OutboundEvent};
