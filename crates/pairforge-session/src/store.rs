//! The session store adapter: allocates device handles and persists them.
//!
//! Every protocol session is backed by one [`Device`]. The store hands out
//! fresh devices and keeps whatever the protocol client writes into them
//! (today: the stored [`Identity`]) in a [`DeviceBackend`].
//!
//! Two backends ship with the crate:
//! - [`MemoryBackend`]: a map in process memory, for tests and demos
//! - [`FileBackend`]: one JSON file per device in a directory

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Identity, SessionError};

// ---------------------------------------------------------------------------
// DeviceRecord
// ---------------------------------------------------------------------------

/// What the store persists for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Random 32-character hex id, also used as the file stem on disk.
    pub id: String,

    /// The identity written by the protocol client after pairing.
    pub identity: Option<Identity>,

    /// When the device was allocated.
    pub created_at: DateTime<Utc>,
}

impl DeviceRecord {
    fn fresh() -> Self {
        Self {
            id: generate_device_id(),
            identity: None,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// DeviceBackend
// ---------------------------------------------------------------------------

/// Durable storage for device records.
///
/// The backend is assumed to serialize its own writes; callers never add
/// locking around it.
#[async_trait]
pub trait DeviceBackend: Send + Sync + 'static {
    /// Inserts or overwrites the record with `record.id`.
    async fn save(&self, record: &DeviceRecord) -> Result<(), SessionError>;

    /// Loads a record by id. `Ok(None)` if it doesn't exist.
    async fn load(&self, id: &str) -> Result<Option<DeviceRecord>, SessionError>;

    /// Deletes a record. Deleting a missing record is not an error.
    async fn delete(&self, id: &str) -> Result<(), SessionError>;

    /// Returns every stored record.
    async fn list(&self) -> Result<Vec<DeviceRecord>, SessionError>;
}

/// Keeps device records in process memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<String, DeviceRecord>>,
}

#[async_trait]
impl DeviceBackend for MemoryBackend {
    async fn save(&self, record: &DeviceRecord) -> Result<(), SessionError> {
        self.records.lock().insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<DeviceRecord>, SessionError> {
        Ok(self.records.lock().get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<(), SessionError> {
        self.records.lock().remove(id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DeviceRecord>, SessionError> {
        Ok(self.records.lock().values().cloned().collect())
    }
}

/// Stores each device as `<dir>/<id>.json`.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// crash mid-write never leaves a half-written record behind.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Opens (and creates if needed) the store directory.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, SessionError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        tracing::debug!(dir = %dir.display(), "file device store opened");
        Ok(Self { dir })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl DeviceBackend for FileBackend {
    async fn save(&self, record: &DeviceRecord) -> Result<(), SessionError> {
        let bytes = serde_json::to_vec_pretty(record)?;
        let path = self.path_for(&record.id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<DeviceRecord>, SessionError> {
        match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), SessionError> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<DeviceRecord>, SessionError> {
        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(), error = %e,
                        "skipping unreadable device record"
                    );
                }
            }
        }
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

/// A device handle: the per-session slot the protocol client writes into.
///
/// Nothing is persisted until pairing writes an identity through
/// [`store_identity`](Self::store_identity);
/// [`delete_identity`](Self::delete_identity) removes the record again.
pub struct Device {
    id: String,
    created_at: DateTime<Utc>,
    identity: RwLock<Option<Identity>>,
    backend: Arc<dyn DeviceBackend>,
}

impl Device {
    /// The device's unique id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The stored identity, if the device has been paired.
    pub fn identity(&self) -> Option<Identity> {
        self.identity.read().clone()
    }

    /// Records the identity assigned during pairing and persists it.
    pub async fn store_identity(
        &self,
        identity: Identity,
    ) -> Result<(), SessionError> {
        *self.identity.write() = Some(identity);
        self.backend.save(&self.record()).await
    }

    /// Forgets the stored identity and removes the device record.
    pub async fn delete_identity(&self) -> Result<(), SessionError> {
        self.identity.write().take();
        self.backend.delete(&self.id).await
    }

    /// A point-in-time copy of the device's persisted state.
    pub fn record(&self) -> DeviceRecord {
        DeviceRecord {
            id: self.id.clone(),
            identity: self.identity(),
            created_at: self.created_at,
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("identity", &self.identity())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// Factory for fresh device handles over a shared [`DeviceBackend`].
///
/// Cheap to clone; all clones share the same backend.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn DeviceBackend>,
}

impl SessionStore {
    /// Wraps an arbitrary backend.
    pub fn new(backend: impl DeviceBackend) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// A store that forgets everything when the process exits.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::default())
    }

    /// A store backed by JSON files under `dir`.
    pub async fn open_dir(dir: impl AsRef<Path>) -> Result<Self, SessionError> {
        Ok(Self::new(FileBackend::open(dir).await?))
    }

    /// Allocates a brand-new device with no identity. The backend only
    /// sees it once it is paired.
    pub async fn new_device(&self) -> Result<Device, SessionError> {
        let record = DeviceRecord::fresh();
        tracing::debug!(device_id = %record.id, "device allocated");
        Ok(Device {
            id: record.id,
            created_at: record.created_at,
            identity: RwLock::new(None),
            backend: Arc::clone(&self.backend),
        })
    }

    /// Loads a stored record by id.
    pub async fn load(
        &self,
        id: &str,
    ) -> Result<Option<DeviceRecord>, SessionError> {
        self.backend.load(id).await
    }

    /// Every record the backend currently holds.
    pub async fn stored_devices(&self) -> Result<Vec<DeviceRecord>, SessionError> {
        self.backend.list().await
    }
}

/// Generates a random 32-character hex id (128 bits).
fn generate_device_id() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
