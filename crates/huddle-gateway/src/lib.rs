//! Huddle Gateway - WebSocket server, presence, routing, and agent streams

pub mod auth;
pub mod presence;
pub mod router;
pub mod server;
pub mod stream;
pub mod ws;

pub use presence::{ConnectionHandle, PresenceRegistry};
pub use router::MessageRouter;
pub use server::{build_app, start_gateway, GatewayState};
pub use stream::{GenerationOrchestrator, Outcome};
