// Public API
pub use handler::websocket_handler;
pub use messages::{
    ChannelHistoryPayload, ErrorPayload, InboundEvent, InboundEventType, OutboundEvent,
    SignalPayload, VoicePresencePayload,
};
pub use router::EventRouter;
pub use socket::{Connection, MessageHandler, SocketError};

// Internal modules
mod handler;
mod messages;
mod router;
mod socket;
