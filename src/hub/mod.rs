// Public API
pub use connection::{ConnectionHandle, ConnectionId, EnqueueResult, OutboundQueue};
pub use errors::HubError;
pub use registry::{Hub, Membership};

pub(crate) use connection::wait_closed;

// Internal modules
mod connection;
mod errors;
mod registry;
