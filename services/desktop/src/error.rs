//! services/desktop/src/error.rs
//!
//! Defines the primary error type for the desktop auth host.

use crate::config::ConfigError;
use memowave_core::ports::PortError;
use std::net::SocketAddr;

/// The primary error type for the `desktop` service.
#[derive(Debug, thiserror::Error)]
pub enum DesktopError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// The loopback callback port is taken, usually by a crashed earlier instance.
    #[error("Cannot listen for login callbacks on {addr}: {source}")]
    ListenerBind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Represents an error from the HTTP client used for the identity backend.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}
