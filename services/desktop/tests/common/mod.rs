//! Shared fakes for the desktop integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use desktop_lib::adapters::{MemorySessionStore, WindowEvent, WindowRegistry};
use desktop_lib::auth::{channel, AuthEvent, AuthSender, AuthWorker, Reconciler, SessionExchanger};
use memowave_core::domain::{AuthRecord, AuthUser, Session, WindowMessage, WindowRole};
use memowave_core::ports::{IdentityBackend, PortError, PortResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Behavior {
    Accept,
    Reject,
    Unavailable,
}

/// An identity backend that answers from a script and records what it was asked.
pub struct FakeBackend {
    behavior: Mutex<Behavior>,
    pub calls: AtomicUsize,
    pub sign_outs: AtomicUsize,
    last_access_token: Mutex<Option<String>>,
    last_code: Mutex<Option<String>>,
}

impl FakeBackend {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            calls: AtomicUsize::new(0),
            sign_outs: AtomicUsize::new(0),
            last_access_token: Mutex::new(None),
            last_code: Mutex::new(None),
        })
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_access_token(&self) -> Option<String> {
        self.last_access_token.lock().unwrap().clone()
    }

    pub fn last_code(&self) -> Option<String> {
        self.last_code.lock().unwrap().clone()
    }

    fn answer(&self, access_token: &str) -> PortResult<Session> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match *self.behavior.lock().unwrap() {
            Behavior::Accept => Ok(Session {
                user: user(),
                access_token: access_token.to_string(),
                refresh_token: "backend-refresh".to_string(),
                expires_at: None,
            }),
            Behavior::Reject => Err(PortError::Unauthorized("Invalid Refresh Token".to_string())),
            Behavior::Unavailable => Err(PortError::Unavailable("connection refused".to_string())),
        }
    }
}

#[async_trait]
impl IdentityBackend for FakeBackend {
    async fn set_session(&self, access_token: &str, _refresh_token: &str) -> PortResult<Session> {
        *self.last_access_token.lock().unwrap() = Some(access_token.to_string());
        self.answer(access_token)
    }

    async fn exchange_code(&self, code: &str) -> PortResult<Session> {
        *self.last_code.lock().unwrap() = Some(code.to_string());
        self.answer("code-access")
    }

    async fn current_user(&self) -> PortResult<AuthUser> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match *self.behavior.lock().unwrap() {
            Behavior::Accept => Ok(user()),
            Behavior::Reject => Err(PortError::Unauthorized("invalid JWT".to_string())),
            Behavior::Unavailable => Err(PortError::Unavailable("connection refused".to_string())),
        }
    }

    async fn sign_out(&self) -> PortResult<()> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn authorize_url(&self, provider: &str, redirect_to: &str) -> PortResult<String> {
        Ok(format!(
            "https://auth.example.test/authorize?provider={}&redirect_to={}",
            provider, redirect_to
        ))
    }
}

pub fn user() -> AuthUser {
    AuthUser {
        id: "u-1".to_string(),
        email: Some("memo@example.com".to_string()),
    }
}

/// A worker wired to in-memory adapters.
pub struct Harness {
    pub windows: Arc<WindowRegistry>,
    pub store: Arc<MemorySessionStore>,
    pub backend: Arc<FakeBackend>,
    pub opened_urls: Arc<Mutex<Vec<String>>>,
    pub worker: AuthWorker,
    pub sender: AuthSender,
    pub rx: mpsc::Receiver<AuthEvent>,
}

pub fn harness(record: AuthRecord, behavior: Behavior) -> Harness {
    let windows = Arc::new(WindowRegistry::new());
    let store = Arc::new(MemorySessionStore::new(record));
    let backend = FakeBackend::new(behavior);
    let exchanger = Arc::new(SessionExchanger::new(
        Some(backend.clone() as Arc<dyn IdentityBackend>),
        store.clone(),
        Duration::from_secs(5),
    ));
    let reconciler = Reconciler::new(windows.clone(), store.clone(), exchanger.clone());

    let opened_urls = Arc::new(Mutex::new(Vec::new()));
    let sink = opened_urls.clone();
    let worker = AuthWorker::new(
        reconciler,
        exchanger,
        store.clone(),
        "memowave".to_string(),
        "http://localhost:8989".to_string(),
        Arc::new(move |url: &str| {
            sink.lock().unwrap().push(url.to_string());
            true
        }),
    );
    let (sender, rx) = channel("memowave");

    Harness {
        windows,
        store,
        backend,
        opened_urls,
        worker,
        sender,
        rx,
    }
}

pub fn panels_opened(windows: &WindowRegistry) -> usize {
    windows.count(|e| matches!(e, WindowEvent::Opened(WindowRole::Panel, _)))
}

pub fn widget_restores(windows: &WindowRegistry) -> usize {
    windows.count(|e| {
        matches!(
            e,
            WindowEvent::Message(WindowRole::Panel, WindowMessage::RestoreWidgets)
        )
    })
}

pub fn login_errors(windows: &WindowRegistry) -> Vec<String> {
    windows
        .events()
        .into_iter()
        .filter_map(|e| match e {
            WindowEvent::Message(WindowRole::Login, WindowMessage::LoginError { message }) => {
                Some(message)
            }
            _ => None,
        })
        .collect()
}
