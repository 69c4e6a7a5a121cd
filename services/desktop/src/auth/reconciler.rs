//! services/desktop/src/auth/reconciler.rs
//!
//! Maps auth outcomes onto window transitions. The reconciler never touches
//! toolkit windows directly; it only speaks the `WindowManager` port.

use crate::auth::exchanger::SessionExchanger;
use memowave_core::domain::{
    AuthFailure, AuthRecord, Session, WindowMessage, WindowRole, WindowState,
};
use memowave_core::ports::{SessionStore, WindowManager};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct Reconciler {
    windows: Arc<dyn WindowManager>,
    store: Arc<dyn SessionStore>,
    exchanger: Arc<SessionExchanger>,
    /// The error last shown in the login window, cleared on success.
    login_error: Option<String>,
}

impl Reconciler {
    pub fn new(
        windows: Arc<dyn WindowManager>,
        store: Arc<dyn SessionStore>,
        exchanger: Arc<SessionExchanger>,
    ) -> Self {
        Self {
            windows,
            store,
            exchanger,
            login_error: None,
        }
    }

    /// The window state as seen through the window manager.
    pub fn state(&self) -> WindowState {
        if self.windows.is_open(&WindowRole::Login) {
            WindowState::LoginOpen
        } else if self.windows.is_open(&WindowRole::Panel) {
            WindowState::PanelOpen
        } else {
            WindowState::NoWindow
        }
    }

    pub fn login_error(&self) -> Option<&str> {
        self.login_error.as_deref()
    }

    /// Decides the first window from the stored record.
    pub async fn startup(&mut self) -> WindowState {
        let record = match self.store.read().await {
            Ok(record) => record,
            Err(e) => {
                error!("Could not read auth record, starting signed out: {}", e);
                AuthRecord::default()
            }
        };

        if record.skip_login {
            info!("Offline mode chosen earlier, opening panel");
            self.show_panel();
            return self.state();
        }

        if record.claims_session() {
            match record.refresh_token.as_deref().filter(|t| !t.is_empty()) {
                Some(refresh_token) => {
                    info!("Stored login found, attempting silent recovery");
                    match self.exchanger.recover(refresh_token).await {
                        Ok(session) => {
                            self.on_success(&session);
                            return self.state();
                        }
                        Err(AuthFailure::BackendUnavailable(reason)) => {
                            // Keep the record; the refresh token may still work next launch.
                            warn!("Silent recovery postponed: {}", reason);
                            self.show_login();
                            self.on_failure(&AuthFailure::BackendUnavailable(reason));
                            return self.state();
                        }
                        Err(failure) => {
                            warn!("Silent recovery failed: {}", failure);
                            self.clear_record().await;
                        }
                    }
                }
                None => {
                    warn!("Stored login has no refresh token, clearing it");
                    self.clear_record().await;
                }
            }
        }

        self.show_login();
        self.state()
    }

    /// Startup when no login callback can be received this run. Opens the
    /// panel without a network call and leaves the stored record untouched.
    pub fn startup_offline(&mut self) -> WindowState {
        warn!("Login callbacks are unavailable, starting in offline mode");
        self.show_panel();
        self.state()
    }

    /// Applies a successful exchange. Repeated successes while the panel is
    /// already the only top-level window change nothing.
    pub fn on_success(&mut self, session: &Session) {
        self.login_error = None;

        if self.state() == WindowState::PanelOpen {
            debug!("Login for {} while panel is open, nothing to do", session.user.id);
            return;
        }

        if self.windows.is_open(&WindowRole::Login) {
            self.windows.send(
                &WindowRole::Login,
                WindowMessage::LoginSuccess {
                    user: session.user.clone(),
                },
            );
            self.windows.close(&WindowRole::Login);
        }
        info!("Logged in as {}", session.user.id);
        self.show_panel();
    }

    /// Reports a failed exchange to the login window, or to the log when no
    /// window can receive it.
    pub fn on_failure(&mut self, failure: &AuthFailure) {
        error!("Login callback failed: {}", failure);
        let message = failure.user_message();
        if self.windows.send(
            &WindowRole::Login,
            WindowMessage::LoginError {
                message: message.clone(),
            },
        ) {
            self.login_error = Some(message);
        } else {
            warn!("No login window to report to; any stored refresh token is kept for next launch");
        }
    }

    /// Brings the running instance forward when the app is launched again.
    pub fn on_relaunch(&self) {
        for role in [WindowRole::Login, WindowRole::Panel] {
            if self.windows.focus(&role) {
                debug!("Relaunch focused the {} window", role);
                return;
            }
        }
    }

    /// Offline mode: login closes, panel opens.
    pub fn on_skip_login(&mut self) {
        self.login_error = None;
        self.windows.close(&WindowRole::Login);
        self.show_panel();
    }

    /// Logout: panel and widgets close, login opens.
    pub fn on_signed_out(&mut self) {
        for role in self.windows.open_roles() {
            if matches!(role, WindowRole::Panel | WindowRole::Widget(_)) {
                self.windows.close(&role);
            }
        }
        self.show_login();
    }

    fn show_login(&self) {
        self.windows.open(&WindowRole::Login);
        self.windows.focus(&WindowRole::Login);
    }

    /// Opens and raises the panel; widgets are restored only when the panel is new.
    fn show_panel(&self) {
        let existed = self.windows.is_open(&WindowRole::Panel);
        self.windows.open(&WindowRole::Panel);
        self.windows.focus(&WindowRole::Panel);
        if !existed {
            self.windows
                .send(&WindowRole::Panel, WindowMessage::RestoreWidgets);
        }
    }

    async fn clear_record(&self) {
        if let Err(e) = self.store.write(AuthRecord::signed_out()).await {
            error!("Failed to clear auth record: {}", e);
        }
    }
}
