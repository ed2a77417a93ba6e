use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use strum_macros::{Display, EnumIter, IntoStaticStr};

use crate::hub::HubError;
use crate::session::UserIdentity;
use crate::store::MessageModel;

/// Client -> Server event discriminators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InboundEventType {
    JoinChannel,
    SendMessage,
    JoinVoice,
    LeaveVoice,
    Signal,

    // Anything else, including a missing discriminator
    #[default]
    #[serde(other)]
    Unsupported,
}

/// One decoded inbound frame. Every field besides the discriminator is optional.
#[derive(Debug, Deserialize)]
pub struct InboundEvent {
    #[serde(rename = "type", default)]
    pub event_type: InboundEventType,
    #[serde(default)]
    pub channel_id: Option<i64>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub payload: Option<Box<RawValue>>,
}

impl InboundEvent {
    pub fn parse(frame: &[u8]) -> Result<Self, HubError> {
        serde_json::from_slice(frame).map_err(|_| HubError::InvalidPayload)
    }

    /// The explicit channel id, if one was given and is positive
    pub fn explicit_channel(&self) -> Option<i64> {
        self.channel_id.filter(|id| *id > 0)
    }
}

/// Server -> Client events, encoded as `{"type": ..., "data": ...}`
#[derive(Debug, Clone, Serialize, IntoStaticStr)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutboundEvent {
    ChannelHistory(ChannelHistoryPayload),
    NewMessage(MessageModel),
    UserJoinedVoice(VoicePresencePayload),
    LeaveVoice(VoicePresencePayload),
    Signal(SignalPayload),
    Error(ErrorPayload),
}

impl OutboundEvent {
    pub fn error(message: impl Into<String>) -> Self {
        OutboundEvent::Error(ErrorPayload {
            message: message.into(),
        })
    }

    pub fn event_type(&self) -> &'static str {
        self.into()
    }

    pub fn encode(&self) -> Result<String, HubError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelHistoryPayload {
    pub channel_id: i64,
    /// Oldest first
    pub messages: Vec<MessageModel>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VoicePresencePayload {
    pub user_id: i64,
    pub username: String,
    pub channel_id: i64,
}

impl VoicePresencePayload {
    pub fn new(user: &UserIdentity, channel_id: i64) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username.clone(),
            channel_id,
        }
    }
}

/// Relayed WebRTC negotiation data. `target_id` is only a hint for clients;
/// every member of the channel receives the frame.
#[derive(Debug, Clone, Serialize)]
pub struct SignalPayload {
    pub from_user_id: i64,
    pub from_name: String,
    pub target_id: String,
    pub channel_id: i64,
    pub payload: Box<RawValue>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorPayload {
    pub message: String,
}
