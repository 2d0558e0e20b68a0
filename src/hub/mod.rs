//! Message hub
//!
//! Tracks connected clients and fans messages out to them.

pub mod message;
pub mod registry;

pub use message::Message;
pub use registry::{ClientHandle, ClientId, Registry, RegistryHandle};
