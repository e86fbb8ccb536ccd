//! Web server module for the coordination demo.
//!
//! This module contains the Axum web server that hosts an in-memory shared
//! store, runs simulated participants against it and exposes the registry
//! over HTTP and WebSocket.

pub mod routes;
pub mod websocket;

// Re-export main server functionality
pub use routes::*;
