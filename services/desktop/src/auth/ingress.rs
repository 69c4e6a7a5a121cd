//! services/desktop/src/auth/ingress.rs
//!
//! The single event queue every login entry point publishes into.
//!
//! URL-scheme activation, second-instance relaunch, the loopback HTTP server
//! and the login window's own commands all hold an `AuthSender`. The
//! `AuthWorker` is the only receiver, so events are handled one at a time in
//! arrival order.

use memowave_core::callback::{scheme_prefix, wrap_fragment};
use memowave_core::domain::{AuthFailure, AuthUser};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Queue depth. Callbacks arrive at human speed.
pub const EVENT_QUEUE_DEPTH: usize = 32;

/// The login state reported to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub is_logged_in: bool,
    pub skip_login: bool,
    pub user: Option<AuthUser>,
}

pub type Reply<T> = oneshot::Sender<T>;

#[derive(Debug)]
pub enum AuthEvent {
    /// A full `<scheme>://login-callback...` URL from the OS or a relay page.
    OpenUrl(String),
    /// Command-line arguments handed over by a second launch.
    SecondInstance(Vec<String>),
    /// An authorization code posted by the loopback page.
    AuthCode {
        code: String,
        reply: Reply<Result<(), AuthFailure>>,
    },
    /// A callback URL pasted by the user.
    ManualCallback {
        url: String,
        reply: Reply<Result<(), AuthFailure>>,
    },
    SignInWithGoogle {
        reply: Reply<Result<String, AuthFailure>>,
    },
    SkipLogin,
    SignOut {
        reply: Reply<Result<(), AuthFailure>>,
    },
    Status {
        reply: Reply<AuthStatus>,
    },
}

/// A cloneable handle for publishing into the auth queue.
#[derive(Clone)]
pub struct AuthSender {
    tx: mpsc::Sender<AuthEvent>,
    scheme: String,
}

/// Creates the queue. The receiver belongs to the `AuthWorker`.
pub fn channel(scheme: &str) -> (AuthSender, mpsc::Receiver<AuthEvent>) {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    (
        AuthSender {
            tx,
            scheme: scheme.to_string(),
        },
        rx,
    )
}

impl AuthSender {
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    async fn publish(&self, event: AuthEvent) -> bool {
        if self.tx.send(event).await.is_err() {
            warn!("Auth worker has stopped, event dropped");
            return false;
        }
        true
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> AuthEvent,
    ) -> Option<T> {
        let (reply, rx) = oneshot::channel();
        if !self.publish(make(reply)).await {
            return None;
        }
        rx.await.ok()
    }

    /// OS URL-scheme activation. The URL is forwarded unchanged.
    pub async fn open_url(&self, url: impl Into<String>) -> bool {
        self.publish(AuthEvent::OpenUrl(url.into())).await
    }

    /// A second launch handed over its arguments.
    pub async fn second_instance(&self, args: Vec<String>) -> bool {
        self.publish(AuthEvent::SecondInstance(args)).await
    }

    /// A bare fragment relayed from a browser page.
    pub async fn fragment(&self, fragment: &str) -> bool {
        self.open_url(wrap_fragment(&self.scheme, fragment)).await
    }

    pub async fn auth_code(&self, code: String) -> Result<(), AuthFailure> {
        self.request(|reply| AuthEvent::AuthCode { code, reply })
            .await
            .unwrap_or_else(|| Err(worker_gone()))
    }

    /// Processes a pasted callback URL, rewriting loopback URLs first.
    pub async fn manual_callback(&self, url: &str, callback_port: u16) -> Result<(), AuthFailure> {
        let url = normalize_manual_url(url, &self.scheme, callback_port)?;
        self.request(|reply| AuthEvent::ManualCallback { url, reply })
            .await
            .unwrap_or_else(|| Err(worker_gone()))
    }

    pub async fn sign_in_with_google(&self) -> Result<String, AuthFailure> {
        self.request(|reply| AuthEvent::SignInWithGoogle { reply })
            .await
            .unwrap_or_else(|| Err(worker_gone()))
    }

    pub async fn skip_login(&self) -> bool {
        self.publish(AuthEvent::SkipLogin).await
    }

    pub async fn sign_out(&self) -> Result<(), AuthFailure> {
        self.request(|reply| AuthEvent::SignOut { reply })
            .await
            .unwrap_or_else(|| Err(worker_gone()))
    }

    /// Returns `None` only if the worker has stopped.
    pub async fn status(&self) -> Option<AuthStatus> {
        self.request(|reply| AuthEvent::Status { reply }).await
    }
}

fn worker_gone() -> AuthFailure {
    AuthFailure::BackendUnavailable("auth worker is not running".to_string())
}

/// Returns the first argument that starts with `<scheme>://`.
pub fn find_scheme_url(args: &[String], scheme: &str) -> Option<String> {
    let prefix = scheme_prefix(scheme);
    let found = args.iter().find(|arg| arg.starts_with(&prefix)).cloned();
    if let Some(url) = &found {
        debug!(
            "Found {} URL in arguments ({} chars, login callback: {})",
            prefix,
            url.len(),
            url.contains(memowave_core::LOGIN_CALLBACK_HOST)
        );
    }
    found
}

/// Rewrites `http://localhost:<port>/...#<fragment>` carrying an access token
/// into `<scheme>://login-callback#<fragment>`. Other input passes through.
pub fn normalize_manual_url(
    raw: &str,
    scheme: &str,
    callback_port: u16,
) -> Result<String, AuthFailure> {
    let raw = raw.trim();
    let loopback = format!("http://localhost:{}/", callback_port);
    let bare_loopback = format!("http://localhost:{}", callback_port);
    let is_loopback = raw.starts_with(&loopback)
        || raw == bare_loopback
        || raw.starts_with(&format!("{}#", bare_loopback));

    if !is_loopback || !raw.contains("access_token=") {
        return Ok(raw.to_string());
    }

    match raw.split_once('#') {
        Some((_, fragment)) if !fragment.is_empty() => Ok(wrap_fragment(scheme, fragment)),
        _ => Err(AuthFailure::MissingAccessToken),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_first_scheme_argument() {
        let args = vec![
            "/opt/memowave/memowave".to_string(),
            "--dev".to_string(),
            "memowave://login-callback#access_token=A".to_string(),
            "memowave://login-callback#access_token=B".to_string(),
        ];
        assert_eq!(
            find_scheme_url(&args, "memowave").as_deref(),
            Some("memowave://login-callback#access_token=A")
        );
        assert_eq!(find_scheme_url(&args[..2], "memowave"), None);
    }

    #[test]
    fn loopback_urls_are_rewritten_to_the_scheme() {
        let url = normalize_manual_url(
            "http://localhost:8989/#access_token=A&refresh_token=R",
            "memowave",
            8989,
        )
        .unwrap();
        assert_eq!(url, "memowave://login-callback#access_token=A&refresh_token=R");

        let url =
            normalize_manual_url("http://localhost:8989#access_token=A", "memowave", 8989).unwrap();
        assert_eq!(url, "memowave://login-callback#access_token=A");
    }

    #[test]
    fn loopback_url_with_token_in_query_only_is_refused() {
        let err = normalize_manual_url("http://localhost:8989/?access_token=A", "memowave", 8989)
            .unwrap_err();
        assert_eq!(err, AuthFailure::MissingAccessToken);
    }

    #[test]
    fn other_urls_pass_through() {
        let raw = "memowave://login-callback#access_token=A";
        assert_eq!(normalize_manual_url(raw, "memowave", 8989).unwrap(), raw);
        let other = "http://localhost:9999/#access_token=A";
        assert_eq!(normalize_manual_url(other, "memowave", 8989).unwrap(), other);
    }

    #[tokio::test]
    async fn fragment_is_wrapped_before_publishing() {
        let (sender, mut rx) = channel("memowave");
        assert!(sender.fragment("#access_token=A").await);
        match rx.recv().await {
            Some(AuthEvent::OpenUrl(url)) => {
                assert_eq!(url, "memowave://login-callback#access_token=A")
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn requests_fail_cleanly_when_worker_is_gone() {
        let (sender, rx) = channel("memowave");
        drop(rx);
        assert!(!sender.skip_login().await);
        assert!(matches!(
            sender.auth_code("c".to_string()).await,
            Err(AuthFailure::BackendUnavailable(_))
        ));
        assert_eq!(sender.status().await, None);
    }
}
