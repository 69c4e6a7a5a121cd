//! crates/memowave_core/src/ports.rs
//!
//! Defines the service contracts (traits) the authentication core depends on.
//! The settings store, the identity backend and the window toolkit all sit
//! behind these traits so the login flow can be driven without any of them.

use crate::domain::{AuthRecord, AuthUser, Session, WindowHandle, WindowMessage, WindowRole};
use async_trait::async_trait;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    /// The remote side understood the request and refused it.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// The remote side could not be reached or is not configured.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Durable storage for the `auth` settings record. Last write wins.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the stored record, or the all-default record on first run.
    async fn read(&self) -> PortResult<AuthRecord>;

    /// Replaces the stored record as a whole.
    async fn write(&self, record: AuthRecord) -> PortResult<()>;
}

#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Establishes a session from implicit-flow tokens. An expired access
    /// token is recovered through the refresh token when one is given.
    async fn set_session(&self, access_token: &str, refresh_token: &str) -> PortResult<Session>;

    /// Exchanges an authorization code for a session.
    async fn exchange_code(&self, code: &str) -> PortResult<Session>;

    /// Looks up the user behind the session this backend currently holds.
    async fn current_user(&self) -> PortResult<AuthUser>;

    /// Revokes the current session, if any.
    async fn sign_out(&self) -> PortResult<()>;

    /// Builds the provider authorization URL the browser should open.
    fn authorize_url(&self, provider: &str, redirect_to: &str) -> PortResult<String>;
}

/// Owns every application window, keyed by role.
pub trait WindowManager: Send + Sync {
    /// Opens the window for `role`, or returns the existing one.
    fn open(&self, role: &WindowRole) -> WindowHandle;

    /// Returns whether a window was closed.
    fn close(&self, role: &WindowRole) -> bool;

    /// Restores and raises the window. Returns false if it is not open.
    fn focus(&self, role: &WindowRole) -> bool;

    fn is_open(&self, role: &WindowRole) -> bool;

    /// Delivers a message to an open window. Returns false if it is not open.
    fn send(&self, role: &WindowRole, message: WindowMessage) -> bool;

    fn open_roles(&self) -> Vec<WindowRole>;

    /// Shows a modal error dialog.
    fn show_error_dialog(&self, title: &str, message: &str);
}
