use async_trait::async_trait;
use escape_core::model::{SessionKey, SessionSnapshot};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Encode a snapshot in the persisted JSON layout.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if encoding fails.
pub fn encode_snapshot(snapshot: &SessionSnapshot) -> Result<String, StorageError> {
    serde_json::to_string(snapshot).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Decode a persisted snapshot.
///
/// # Errors
///
/// Returns `StorageError::Serialization` for malformed JSON or invalid questions.
pub fn decode_snapshot(raw: &str) -> Result<SessionSnapshot, StorageError> {
    serde_json::from_str(raw).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Durable per-student-per-level session snapshots.
///
/// Single writer (the live level screen), last writer wins; reads happen only
/// when a screen mounts.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the snapshot for `key`, if one was persisted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the stored payload is corrupt, or
    /// other storage errors.
    async fn restore(&self, key: &SessionKey) -> Result<Option<SessionSnapshot>, StorageError>;

    /// Overwrite the snapshot for `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be written.
    async fn persist(&self, key: &SessionKey, snapshot: &SessionSnapshot)
    -> Result<(), StorageError>;

    /// Delete the snapshot for `key`. Clearing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the delete fails.
    async fn clear(&self, key: &SessionKey) -> Result<(), StorageError>;
}

/// Simple in-memory snapshot store for testing and prototyping.
///
/// Payloads are kept serialized, the same way a browser key-value store holds them.
#[derive(Clone, Default)]
pub struct InMemorySnapshotStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    writes: Arc<AtomicUsize>,
}

impl InMemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw payload under `key`, bypassing encoding.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn insert_raw(&self, key: &SessionKey, raw: impl Into<String>) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.storage_key(), raw.into());
        Ok(())
    }

    /// Whether a payload exists for `key`.
    #[must_use]
    pub fn contains(&self, key: &SessionKey) -> bool {
        self.entries
            .lock()
            .map(|guard| guard.contains_key(&key.storage_key()))
            .unwrap_or(false)
    }

    /// Number of successful `persist` calls since creation.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn restore(&self, key: &SessionKey) -> Result<Option<SessionSnapshot>, StorageError> {
        let raw = {
            let guard = self
                .entries
                .lock()
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            guard.get(&key.storage_key()).cloned()
        };
        raw.as_deref().map(decode_snapshot).transpose()
    }

    async fn persist(
        &self,
        key: &SessionKey,
        snapshot: &SessionSnapshot,
    ) -> Result<(), StorageError> {
        let raw = encode_snapshot(snapshot)?;
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.storage_key(), raw);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self, key: &SessionKey) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(&key.storage_key());
        Ok(())
    }
}

/// Aggregates storage backends behind trait objects for easy swapping.
#[derive(Clone)]
pub struct Storage {
    pub snapshots: Arc<dyn SnapshotStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let snapshots: Arc<dyn SnapshotStore> = Arc::new(InMemorySnapshotStore::new());
        Self { snapshots }
    }
}
