//! Relay - WebSocket chat relay
//!
//! Every message a participant sends is broadcast to all connected
//! participants.
//!
//! ## Features
//!
//! - Single registry task owning the set of connections, no locks
//! - Bounded per-connection outbound queues; slow participants are evicted
//! - Ping/pong keepalive with configurable period and deadline
//! - Queued messages coalesced into newline-delimited frames
//! - Embedded chat page and health endpoint

pub mod api;
pub mod config;
pub mod error;
pub mod hub;
pub mod telemetry;

pub use config::Config;
pub use error::{RelayError, Result};
pub use hub::{Registry, RegistryHandle};
