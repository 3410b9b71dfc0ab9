//! WebDrop Server Library
//!
//! Signaling relay plus the peer-to-peer transfer protocol used by the
//! WebDrop clients. The server binary is in main.rs.
//!
//! # Modules
//!
//! - `session`: Session records and the registry that owns them
//! - `relay`: Signaling event routing between host and peer
//! - `transfer`: Chunked file transfer over an established peer channel
//! - `routes`: HTTP and WebSocket surface

pub mod config;
pub mod error;
pub mod relay;
pub mod routes;
pub mod session;
pub mod state;
pub mod transfer;

pub use config::Config;
pub use state::AppState;
