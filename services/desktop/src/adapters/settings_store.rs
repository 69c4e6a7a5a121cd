//! services/desktop/src/adapters/settings_store.rs
//!
//! Concrete implementations of the `SessionStore` port.
//!
//! `JsonSettingsStore` keeps the whole application settings document in one
//! JSON file and owns only its `auth` key; every other key is carried through
//! untouched. `MemorySessionStore` keeps the record in process memory.

use async_trait::async_trait;
use memowave_core::domain::AuthRecord;
use memowave_core::ports::{PortError, PortResult, SessionStore};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, warn};

/// The settings key the auth record lives under.
pub const AUTH_KEY: &str = "auth";

//=========================================================================================
// JSON File Store
//=========================================================================================

/// A settings-file adapter that implements the `SessionStore` port.
pub struct JsonSettingsStore {
    path: PathBuf,
    // Serializes read-modify-write cycles on the settings document.
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonSettingsStore {
    /// Creates a new `JsonSettingsStore`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_document(&self) -> PortResult<Map<String, Value>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Settings file {} not found, using defaults", self.path.display());
                return Ok(Map::new());
            }
            Err(e) => return Err(PortError::Unexpected(e.to_string())),
        };

        if text.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(PortError::Unexpected(format!(
                "settings file {} is not a JSON object",
                self.path.display()
            ))),
            Err(e) => Err(PortError::Unexpected(format!(
                "failed to parse settings file {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl SessionStore for JsonSettingsStore {
    async fn read(&self) -> PortResult<AuthRecord> {
        let document = self.load_document().await?;
        match document.get(AUTH_KEY) {
            None | Some(Value::Null) => Ok(AuthRecord::default()),
            Some(value) => serde_json::from_value(value.clone()).or_else(|e| {
                warn!("Stored auth record is malformed ({}), treating as signed out", e);
                Ok(AuthRecord::default())
            }),
        }
    }

    async fn write(&self, record: AuthRecord) -> PortResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut document = self.load_document().await?;
        let value = serde_json::to_value(record.normalized())
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        document.insert(AUTH_KEY.to_string(), value);

        let text = serde_json::to_string_pretty(&Value::Object(document))
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PortError::Unexpected(e.to_string()))?;
        }

        // Readers see the old document or the new one, never a partial write.
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, text)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        debug!("Auth record written to {}", self.path.display());
        Ok(())
    }
}

//=========================================================================================
// In-Memory Store
//=========================================================================================

/// A process-local `SessionStore`. Counts writes so callers can tell
/// "rewritten with the same value" apart from "left alone".
#[derive(Default)]
pub struct MemorySessionStore {
    record: Mutex<AuthRecord>,
    writes: AtomicUsize,
}

impl MemorySessionStore {
    pub fn new(record: AuthRecord) -> Self {
        Self {
            record: Mutex::new(record),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of `write` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> AuthRecord {
        self.record
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn read(&self) -> PortResult<AuthRecord> {
        Ok(self.snapshot())
    }

    async fn write(&self, record: AuthRecord) -> PortResult<()> {
        let mut guard = self
            .record
            .lock()
            .map_err(|_| PortError::Unexpected("session store lock poisoned".to_string()))?;
        *guard = record.normalized();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
