//! services/desktop/src/web/state.rs
//!
//! Defines the state shared by the loopback handlers.

use crate::auth::AuthSender;

/// Created once at startup and handed to every loopback handler.
#[derive(Clone)]
pub struct LoopbackState {
    /// Publishes into the auth queue.
    pub sender: AuthSender,
    /// The port the server listens on, used for the CORS origin.
    pub port: u16,
}

impl LoopbackState {
    pub fn new(sender: AuthSender, port: u16) -> Self {
        Self { sender, port }
    }

    pub fn scheme(&self) -> &str {
        self.sender.scheme()
    }
}
