use serde::{Deserialize, Serialize};

use crate::session::UserIdentity;

/// Response for GET /api/presence
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PresenceResponse {
    /// Users currently in any voice channel, ascending
    pub user_ids: Vec<i64>,
}

/// Response for GET /api/channels/:id/voice
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct VoiceParticipantsResponse {
    pub channel_id: i64,
    pub participants: Vec<UserIdentity>,
}
