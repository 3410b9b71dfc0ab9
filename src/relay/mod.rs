//! Signaling Relay
//!
//! Exchanges connection-setup data between the two clients of a session.
//!
//! Protocol Flow:
//! 1. Host sends `create-session`; relay acknowledges with `session-created`
//! 2. Peer sends `join-session`; host receives `receiver-joined`
//! 3. Host's `offer` reaches the peer (replayed if it was sent before the join)
//! 4. Peer's `answer` reaches the host
//! 5. `candidate`s cross over to the other participant
//! 6. A disconnect ends the session; the survivor receives `session-ended`

pub mod handle;
pub mod messages;
pub mod server;

pub use handle::{RelayError, RelayHandle};
pub use messages::*;
pub use server::{Outbox, RelayServer, SESSION_EXPIRED_REASON};
