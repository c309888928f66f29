//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the shared
//! resources every handler needs: the loaded configuration and the relay's
//! session manager.

use crate::{config::Config, ws::SessionManager};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionManager>,
}
