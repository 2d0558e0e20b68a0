//! HTTP server
//!
//! Serves the chat page and the WebSocket endpoint participants connect to.

pub mod handlers;
pub mod routes;
pub mod server;
pub mod websocket;

pub use server::{AppState, RelayServer};
