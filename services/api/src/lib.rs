//! Chorus Relay Library Crate
//!
//! This library contains all the core logic for the relay web service,
//! including configuration, the application state, the HTTP handlers, the
//! WebSocket relay and routing. The `relay` binary is a thin wrapper around
//! this library.

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod ws;
