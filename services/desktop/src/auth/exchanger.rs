//! services/desktop/src/auth/exchanger.rs
//!
//! Hands callback tokens or authorization codes to the identity backend and
//! persists the resulting session as a single whole-record write.

use memowave_core::domain::{AuthFailure, AuthRecord, CallbackPayload, Session};
use memowave_core::ports::{IdentityBackend, PortError, PortResult, SessionStore};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct SessionExchanger {
    backend: Option<Arc<dyn IdentityBackend>>,
    store: Arc<dyn SessionStore>,
    timeout: Duration,
}

impl SessionExchanger {
    /// `backend` is `None` when no identity backend is configured.
    pub fn new(
        backend: Option<Arc<dyn IdentityBackend>>,
        store: Arc<dyn SessionStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            store,
            timeout,
        }
    }

    pub fn backend(&self) -> Result<&Arc<dyn IdentityBackend>, AuthFailure> {
        self.backend.as_ref().ok_or_else(|| {
            AuthFailure::BackendUnavailable("identity backend is not configured".to_string())
        })
    }

    /// Token mode: the implicit/fragment flow.
    pub async fn exchange_tokens(&self, payload: &CallbackPayload) -> Result<Session, AuthFailure> {
        let backend = self.backend()?;
        info!(
            "Exchanging callback tokens (access {} chars, refresh {} chars)",
            payload.access_token.len(),
            payload.refresh_token.len()
        );
        let session = self
            .bounded(backend.set_session(&payload.access_token, &payload.refresh_token))
            .await?;
        self.persist(&session, &payload.refresh_token).await;
        Ok(session)
    }

    /// Code mode: the authorization-code flow.
    pub async fn exchange_code(&self, code: &str) -> Result<Session, AuthFailure> {
        let backend = self.backend()?;
        if code.is_empty() {
            return Err(AuthFailure::ExchangeRejected(
                "authorization code is empty".to_string(),
            ));
        }
        info!("Exchanging authorization code");
        let session = self.bounded(backend.exchange_code(code)).await?;
        self.persist(&session, "").await;
        Ok(session)
    }

    /// Silent recovery at startup: token mode with the stored refresh token
    /// as both the access attempt and the recovery key.
    pub async fn recover(&self, refresh_token: &str) -> Result<Session, AuthFailure> {
        let payload = CallbackPayload {
            access_token: refresh_token.to_string(),
            refresh_token: refresh_token.to_string(),
        };
        self.exchange_tokens(&payload).await
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, AuthFailure>
    where
        F: Future<Output = PortResult<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(classify),
            Err(_) => {
                warn!("Identity backend did not answer within {:?}", self.timeout);
                Err(AuthFailure::BackendUnavailable(format!(
                    "no answer within {} seconds",
                    self.timeout.as_secs()
                )))
            }
        }
    }

    /// Prefers the backend-issued refresh token over the one from the callback.
    async fn persist(&self, session: &Session, callback_refresh: &str) {
        let refresh_token = if session.refresh_token.is_empty() {
            callback_refresh.to_string()
        } else {
            session.refresh_token.clone()
        };
        let record = AuthRecord::logged_in(session.user.clone(), Some(refresh_token));
        if let Err(e) = self.store.write(record).await {
            // The session is live for this run; the next launch will ask for a login again.
            error!("Failed to persist auth record: {}", e);
        }
    }
}

/// Maps a port failure onto the login failure taxonomy.
pub fn classify(err: PortError) -> AuthFailure {
    match err {
        PortError::Unauthorized(reason) | PortError::NotFound(reason) => {
            AuthFailure::ExchangeRejected(reason)
        }
        PortError::Unavailable(reason) | PortError::Unexpected(reason) => {
            AuthFailure::BackendUnavailable(reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemorySessionStore;
    use async_trait::async_trait;
    use memowave_core::domain::AuthUser;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Mode {
        Accept { refresh: &'static str },
        Reject,
        Hang,
    }

    struct ScriptedBackend {
        mode: Mode,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(mode: Mode) -> Arc<Self> {
            Arc::new(Self {
                mode,
                calls: AtomicUsize::new(0),
            })
        }

        async fn answer(&self) -> PortResult<Session> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.mode {
                Mode::Accept { refresh } => Ok(Session {
                    user: AuthUser {
                        id: "u-1".to_string(),
                        email: None,
                    },
                    access_token: "at".to_string(),
                    refresh_token: refresh.to_string(),
                    expires_at: None,
                }),
                Mode::Reject => Err(PortError::Unauthorized("token expired".to_string())),
                Mode::Hang => std::future::pending().await,
            }
        }
    }

    #[async_trait]
    impl IdentityBackend for ScriptedBackend {
        async fn set_session(&self, _: &str, _: &str) -> PortResult<Session> {
            self.answer().await
        }
        async fn exchange_code(&self, _: &str) -> PortResult<Session> {
            self.answer().await
        }
        async fn current_user(&self) -> PortResult<AuthUser> {
            Err(PortError::Unauthorized("none".to_string()))
        }
        async fn sign_out(&self) -> PortResult<()> {
            Ok(())
        }
        fn authorize_url(&self, _: &str, _: &str) -> PortResult<String> {
            Ok(String::new())
        }
    }

    fn payload(refresh: &str) -> CallbackPayload {
        CallbackPayload {
            access_token: "A".to_string(),
            refresh_token: refresh.to_string(),
        }
    }

    fn exchanger(
        backend: Option<Arc<ScriptedBackend>>,
        store: Arc<MemorySessionStore>,
    ) -> SessionExchanger {
        SessionExchanger::new(
            backend.map(|b| b as Arc<dyn IdentityBackend>),
            store,
            Duration::from_millis(200),
        )
    }

    #[tokio::test]
    async fn success_writes_one_whole_record_with_backend_refresh_token() {
        let store = Arc::new(MemorySessionStore::default());
        let ex = exchanger(
            Some(ScriptedBackend::new(Mode::Accept { refresh: "from-backend" })),
            store.clone(),
        );
        ex.exchange_tokens(&payload("from-url")).await.unwrap();
        assert_eq!(store.writes(), 1);
        let record = store.snapshot();
        assert!(record.is_logged_in);
        assert!(!record.skip_login);
        assert_eq!(record.refresh_token.as_deref(), Some("from-backend"));
    }

    #[tokio::test]
    async fn callback_refresh_token_fills_an_empty_session_token() {
        let store = Arc::new(MemorySessionStore::default());
        let ex = exchanger(
            Some(ScriptedBackend::new(Mode::Accept { refresh: "" })),
            store.clone(),
        );
        ex.exchange_tokens(&payload("from-url")).await.unwrap();
        assert_eq!(store.snapshot().refresh_token.as_deref(), Some("from-url"));
    }

    #[tokio::test]
    async fn missing_backend_is_unavailable_and_leaves_store_alone() {
        let store = Arc::new(MemorySessionStore::default());
        let ex = exchanger(None, store.clone());
        let err = ex.exchange_tokens(&payload("r")).await.unwrap_err();
        assert!(matches!(err, AuthFailure::BackendUnavailable(_)));
        let err = ex.exchange_code("c").await.unwrap_err();
        assert!(matches!(err, AuthFailure::BackendUnavailable(_)));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn rejection_is_typed_and_does_not_write() {
        let store = Arc::new(MemorySessionStore::default());
        let ex = exchanger(Some(ScriptedBackend::new(Mode::Reject)), store.clone());
        let err = ex.exchange_code("bad").await.unwrap_err();
        assert_eq!(err, AuthFailure::ExchangeRejected("token expired".to_string()));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn hung_backend_times_out_as_unavailable() {
        let store = Arc::new(MemorySessionStore::default());
        let ex = exchanger(Some(ScriptedBackend::new(Mode::Hang)), store.clone());
        let err = ex.exchange_tokens(&payload("r")).await.unwrap_err();
        assert!(matches!(err, AuthFailure::BackendUnavailable(_)));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn empty_code_is_rejected_without_a_backend_call() {
        let backend = ScriptedBackend::new(Mode::Accept { refresh: "r" });
        let ex = exchanger(Some(backend.clone()), Arc::new(MemorySessionStore::default()));
        assert!(matches!(
            ex.exchange_code("").await,
            Err(AuthFailure::ExchangeRejected(_))
        ));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }
}
