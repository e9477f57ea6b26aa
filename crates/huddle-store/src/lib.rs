//! Huddle Store - Contracts for the collaborators the gateway consumes
//!
//! Persistence, presence key-value storage, and session validation live
//! outside the gateway. This crate defines what the gateway needs from
//! them, with in-memory implementations for single-process deployments
//! and tests.

pub mod memory;
pub mod message;
pub mod presence;
pub mod session;

pub use memory::MemoryStore;
pub use message::{MessageFilter, MessageStore};
pub use presence::{MemoryPresenceStore, PresenceStore};
pub use session::{Credentials, HttpSessionValidator, SessionValidator, StaticSessions};
