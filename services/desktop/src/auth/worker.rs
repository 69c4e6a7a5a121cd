//! services/desktop/src/auth/worker.rs
//!
//! The sole consumer of the auth queue. Each event runs to completion before
//! the next is taken, so concurrent entry points delivering the same login
//! are reconciled one after the other.

use crate::auth::exchanger::{classify, SessionExchanger};
use crate::auth::ingress::{find_scheme_url, AuthEvent, AuthStatus};
use crate::auth::reconciler::Reconciler;
use memowave_core::callback::{authorization_code, extract_tokens};
use memowave_core::domain::{AuthFailure, AuthRecord, Session, WindowState};
use memowave_core::ports::SessionStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Opens a URL in the user's browser. Returns false if no opener worked.
pub type BrowserOpener = Arc<dyn Fn(&str) -> bool + Send + Sync>;

pub struct AuthWorker {
    reconciler: Reconciler,
    exchanger: Arc<SessionExchanger>,
    store: Arc<dyn SessionStore>,
    scheme: String,
    redirect_uri: String,
    open_browser: BrowserOpener,
}

impl AuthWorker {
    pub fn new(
        reconciler: Reconciler,
        exchanger: Arc<SessionExchanger>,
        store: Arc<dyn SessionStore>,
        scheme: String,
        redirect_uri: String,
        open_browser: BrowserOpener,
    ) -> Self {
        Self {
            reconciler,
            exchanger,
            store,
            scheme,
            redirect_uri,
            open_browser,
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Startup reconciliation; run before consuming any event.
    pub async fn startup(&mut self) -> WindowState {
        let state = self.reconciler.startup().await;
        info!("Startup reconciliation finished in {:?}", state);
        state
    }

    /// Startup when the loopback server could not bind.
    pub fn startup_offline(&mut self) -> WindowState {
        self.reconciler.startup_offline()
    }

    /// Consumes events until the queue closes or `shutdown` fires.
    pub async fn run(mut self, mut rx: mpsc::Receiver<AuthEvent>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Auth worker shutting down.");
                    break;
                }
                event = rx.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => {
                        info!("Auth queue closed.");
                        break;
                    }
                }
            }
        }
    }

    /// Handles one event. Failures end up in the login window or the log.
    pub async fn handle(&mut self, event: AuthEvent) {
        match event {
            AuthEvent::OpenUrl(url) => {
                let _ = self.process_callback_url(&url).await;
            }
            AuthEvent::SecondInstance(args) => {
                info!("Second instance launched with {} arguments", args.len());
                self.reconciler.on_relaunch();
                if let Some(url) = find_scheme_url(&args, &self.scheme) {
                    let _ = self.process_callback_url(&url).await;
                }
            }
            AuthEvent::AuthCode { code, reply } => {
                let result = self.exchanger.exchange_code(&code).await;
                let outcome = self.reconcile(result);
                let _ = reply.send(outcome);
            }
            AuthEvent::ManualCallback { url, reply } => {
                let outcome = self.process_callback_url(&url).await;
                let _ = reply.send(outcome);
            }
            AuthEvent::SignInWithGoogle { reply } => {
                let _ = reply.send(self.sign_in_with_google());
            }
            AuthEvent::SkipLogin => {
                if let Err(e) = self.store.write(AuthRecord::offline()).await {
                    error!("Failed to store offline choice: {}", e);
                }
                self.reconciler.on_skip_login();
            }
            AuthEvent::SignOut { reply } => {
                let _ = reply.send(self.sign_out().await);
            }
            AuthEvent::Status { reply } => {
                let _ = reply.send(self.status().await);
            }
        }
    }

    /// Token mode for fragment URLs; code mode for `?code=` URLs.
    async fn process_callback_url(&mut self, url: &str) -> Result<(), AuthFailure> {
        info!("Processing login callback ({} chars)", url.len());
        let result = match extract_tokens(url) {
            Ok(payload) => self.exchanger.exchange_tokens(&payload).await,
            Err(AuthFailure::MissingAccessToken) => match authorization_code(url) {
                Some(code) => self.exchanger.exchange_code(&code).await,
                None => Err(AuthFailure::MissingAccessToken),
            },
            Err(other) => Err(other),
        };
        self.reconcile(result)
    }

    fn reconcile(&mut self, result: Result<Session, AuthFailure>) -> Result<(), AuthFailure> {
        match result {
            Ok(session) => {
                self.reconciler.on_success(&session);
                Ok(())
            }
            Err(failure) => {
                self.reconciler.on_failure(&failure);
                Err(failure)
            }
        }
    }

    fn sign_in_with_google(&self) -> Result<String, AuthFailure> {
        let backend = self.exchanger.backend()?;
        let url = backend
            .authorize_url("google", &self.redirect_uri)
            .map_err(classify)?;
        if !(self.open_browser)(&url) {
            warn!("Could not open a browser; the sign-in URL must be opened manually");
        }
        Ok(url)
    }

    async fn sign_out(&mut self) -> Result<(), AuthFailure> {
        if let Ok(backend) = self.exchanger.backend() {
            if let Err(e) = backend.sign_out().await {
                warn!("Backend sign-out failed: {}", e);
            }
        }
        self.store
            .write(AuthRecord::signed_out())
            .await
            .map_err(classify)?;
        self.reconciler.on_signed_out();
        info!("Signed out.");
        Ok(())
    }

    /// The stored record, revalidated against the backend when it claims a login.
    /// A failed revalidation reports logged-out without touching the store.
    async fn status(&self) -> AuthStatus {
        let record = match self.store.read().await {
            Ok(record) => record,
            Err(e) => {
                error!("Could not read auth record: {}", e);
                AuthRecord::default()
            }
        };
        let logged_out = AuthStatus {
            is_logged_in: false,
            skip_login: record.skip_login,
            user: None,
        };

        if !record.claims_session() {
            return logged_out;
        }
        let Ok(backend) = self.exchanger.backend() else {
            return logged_out;
        };
        match backend.current_user().await {
            Ok(user) => AuthStatus {
                is_logged_in: true,
                skip_login: record.skip_login,
                user: Some(user),
            },
            Err(e) => {
                warn!("Stored login could not be revalidated: {}", e);
                logged_out
            }
        }
    }
}

/// Opens `url` with the platform's default handler.
pub fn open_in_browser(url: &str) -> bool {
    let mut command = if cfg!(target_os = "macos") {
        std::process::Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut command = std::process::Command::new("cmd");
        command.args(["/C", "start", ""]);
        command
    } else {
        std::process::Command::new("xdg-open")
    };
    command
        .arg(url)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .is_ok()
}
