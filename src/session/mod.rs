//! Session Coordination
//!
//! Session identity, roles and the registry the relay builds on.
//!
//! Lifecycle:
//! 1. Host sends `create-session` -> session is `Created`
//! 2. Peer sends `join-session` -> session is `Joined`
//! 3. Either side disconnects (or the unjoined session expires) -> removed

pub mod registry;
pub mod types;

pub use registry::SessionRegistry;
pub use types::*;
