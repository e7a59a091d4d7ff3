//! Server side: presence tracking and message fan-out.

pub mod presence;
pub mod router;
pub mod server;
pub mod session;

pub use presence::{PresenceRegistry, ANONYMOUS_NAME};
pub use router::{BroadcastRouter, RouterOptions, DEFAULT_BROADCAST_CAPACITY};
pub use server::{create_router, serve};
pub use session::RelaySession;
