//! Module Exports
//!
//! This file exports the key modules used in the WebSocket server
//! implementation.
//!
//! # Modules
//! - `server`: Manages the WebSocket server, routes, sessions and command parsing.

/// Module for managing the WebSocket server, including routes and connection
/// handling.
pub mod server;
