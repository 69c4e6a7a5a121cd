//! crates/memowave_core/src/domain.rs
//!
//! Defines the pure data structures of the authentication subsystem.
//! These structs are independent of any storage backend or window toolkit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

//=========================================================================================
// Users and Sessions
//=========================================================================================

/// The identity provider's view of a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// A session issued by the identity backend after a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: AuthUser,
    pub access_token: String,
    /// May be empty when the backend did not rotate the token.
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Tokens pulled out of a login callback URL. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackPayload {
    pub access_token: String,
    /// Empty when the callback carried no refresh token.
    pub refresh_token: String,
}

//=========================================================================================
// The Persisted Auth Record
//=========================================================================================

/// The persisted snapshot of login state, stored under the `auth` settings key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthRecord {
    pub user: Option<AuthUser>,
    pub is_logged_in: bool,
    pub skip_login: bool,
    pub refresh_token: Option<String>,
}

impl AuthRecord {
    /// The record written after every successful exchange.
    pub fn logged_in(user: AuthUser, refresh_token: Option<String>) -> Self {
        Self {
            user: Some(user),
            is_logged_in: true,
            skip_login: false,
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
        }
    }

    /// The record written when the user chooses to work offline.
    pub fn offline() -> Self {
        Self {
            skip_login: true,
            ..Self::default()
        }
    }

    /// The record written on logout or irrecoverable session loss.
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// True when the record claims a session worth recovering.
    pub fn claims_session(&self) -> bool {
        self.is_logged_in && self.user.is_some()
    }

    /// Drops a logged-in flag that has no user behind it.
    pub fn normalized(mut self) -> Self {
        if self.user.is_none() {
            self.is_logged_in = false;
        }
        self
    }
}

//=========================================================================================
// Windows
//=========================================================================================

/// The role a window plays. A window manager holds at most one window per role.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WindowRole {
    Login,
    Panel,
    /// A detached memo widget, keyed by memo id.
    Widget(String),
}

impl fmt::Display for WindowRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowRole::Login => write!(f, "login"),
            WindowRole::Panel => write!(f, "panel"),
            WindowRole::Widget(id) => write!(f, "widget:{}", id),
        }
    }
}

/// An opaque handle to a window owned by the window manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub Uuid);

impl WindowHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WindowHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Which of the mutually exclusive top-level windows is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    NoWindow,
    LoginOpen,
    PanelOpen,
}

/// Notifications delivered to an open window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WindowMessage {
    /// Sent to the login window right before it is closed.
    LoginSuccess { user: AuthUser },

    /// Sent to the login window when a callback could not be turned into a session.
    LoginError { message: String },

    /// Asks the panel to re-open the widgets that were detached last run.
    RestoreWidgets,
}

//=========================================================================================
// Failures
//=========================================================================================

/// Why a login callback did not produce a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    #[error("no access token found in the login callback")]
    MissingAccessToken,
    #[error("identity backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("identity backend rejected the login: {0}")]
    ExchangeRejected(String),
}

impl AuthFailure {
    /// The text shown in the login window.
    pub fn user_message(&self) -> String {
        match self {
            AuthFailure::MissingAccessToken => {
                "Could not read a login token from the callback.".to_string()
            }
            AuthFailure::BackendUnavailable(_) => {
                "The login service is unavailable. Please try again later.".to_string()
            }
            AuthFailure::ExchangeRejected(reason) => format!("Login failed: {}", reason),
        }
    }
}
