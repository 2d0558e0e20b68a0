//! WebSocket handlers
//!
//! One connection per chat participant. Outbound queues are bounded; a
//! participant that cannot keep up is evicted by the registry.

pub mod client;

pub use client::{chat_ws, ClientState};
