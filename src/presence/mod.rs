// Public API
pub use handlers::{get_presence, get_voice_participants};
pub use types::{PresenceResponse, VoiceParticipantsResponse};

// Internal modules
mod handlers;
mod types;
