// Public API - what other modules can use
pub use authenticator::{Authenticator, JwtAuthenticator, WEBSOCKET_PROTOCOL};
pub use middleware::require_identity;
pub use token::{TokenConfig, DEFAULT_EXPIRATION_HOURS};
pub use types::{SessionClaims, UserIdentity};

// Internal modules
mod authenticator;
mod middleware;
mod token;
mod types;
