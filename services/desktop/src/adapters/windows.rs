//! services/desktop/src/adapters/windows.rs
//!
//! The window registry: a `WindowManager` that owns a keyed map from window
//! role to window handle. Each operation is recorded as a `WindowEvent` so a
//! UI shell can replay it onto real toolkit windows.

use memowave_core::domain::{WindowHandle, WindowMessage, WindowRole};
use memowave_core::ports::WindowManager;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

/// Something that happened to a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowEvent {
    Opened(WindowRole, WindowHandle),
    Closed(WindowRole),
    Focused(WindowRole),
    Message(WindowRole, WindowMessage),
    Dialog { title: String, message: String },
}

/// Oldest events are dropped past this many.
pub const MAX_EVENTS: usize = 256;

#[derive(Default)]
struct Registry {
    windows: HashMap<WindowRole, WindowHandle>,
    events: VecDeque<WindowEvent>,
}

impl Registry {
    fn record(&mut self, event: WindowEvent) {
        if self.events.len() == MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// A `WindowManager` backed by an in-process registry.
#[derive(Default)]
pub struct WindowRegistry {
    inner: Mutex<Registry>,
}

impl WindowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The most recent `MAX_EVENTS` events, oldest first.
    pub fn events(&self) -> Vec<WindowEvent> {
        self.registry().events.iter().cloned().collect()
    }

    /// Removes and returns the recorded events.
    pub fn drain_events(&self) -> Vec<WindowEvent> {
        self.registry().events.drain(..).collect()
    }

    /// Counts recorded events that match `pred`.
    pub fn count(&self, pred: impl Fn(&WindowEvent) -> bool) -> usize {
        self.registry().events.iter().filter(|e| pred(e)).count()
    }
}

impl WindowManager for WindowRegistry {
    fn open(&self, role: &WindowRole) -> WindowHandle {
        let mut registry = self.registry();
        if let Some(handle) = registry.windows.get(role) {
            return *handle;
        }
        let handle = WindowHandle::new();
        registry.windows.insert(role.clone(), handle);
        registry.record(WindowEvent::Opened(role.clone(), handle));
        info!("Opened {} window", role);
        handle
    }

    fn close(&self, role: &WindowRole) -> bool {
        let mut registry = self.registry();
        if registry.windows.remove(role).is_none() {
            return false;
        }
        registry.record(WindowEvent::Closed(role.clone()));
        info!("Closed {} window", role);
        true
    }

    fn focus(&self, role: &WindowRole) -> bool {
        let mut registry = self.registry();
        if !registry.windows.contains_key(role) {
            return false;
        }
        registry.record(WindowEvent::Focused(role.clone()));
        true
    }

    fn is_open(&self, role: &WindowRole) -> bool {
        self.registry().windows.contains_key(role)
    }

    fn send(&self, role: &WindowRole, message: WindowMessage) -> bool {
        let mut registry = self.registry();
        if !registry.windows.contains_key(role) {
            warn!("Dropped message for closed {} window", role);
            return false;
        }
        registry.record(WindowEvent::Message(role.clone(), message));
        true
    }

    fn open_roles(&self) -> Vec<WindowRole> {
        self.registry().windows.keys().cloned().collect()
    }

    fn show_error_dialog(&self, title: &str, message: &str) {
        error!("{}: {}", title, message);
        self.registry().record(WindowEvent::Dialog {
            title: title.to_string(),
            message: message.to_string(),
        });
    }
}
