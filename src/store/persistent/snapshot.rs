//! File-backed [`GeofenceStore`].

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::codec;
use super::file_lock::StoreLock;
use super::StoreConfig;
use crate::record::{Coordinate, EventType, GeofenceId, GeofenceRecord};
use crate::store::{GeofenceStore, StorageError};

/// Persisted shape of one record. Field names are part of the file format.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    identifier: String,
    latitude: f64,
    longitude: f64,
    radius: f64,
    note: String,
    event_type: EventType,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotBody {
    records: Vec<StoredRecord>,
}

impl From<&GeofenceRecord> for StoredRecord {
    fn from(r: &GeofenceRecord) -> Self {
        Self {
            identifier: r.identifier.as_str().to_string(),
            latitude: r.coordinate.latitude,
            longitude: r.coordinate.longitude,
            radius: r.radius,
            note: r.note.clone(),
            event_type: r.event_type,
        }
    }
}

impl From<StoredRecord> for GeofenceRecord {
    fn from(s: StoredRecord) -> Self {
        Self {
            identifier: GeofenceId::from(s.identifier),
            coordinate: Coordinate::new(s.latitude, s.longitude),
            radius: s.radius,
            note: s.note,
            event_type: s.event_type,
        }
    }
}

/// Snapshot store rooted at a locked directory.
#[derive(Debug)]
pub struct FileGeofenceStore {
    dir: PathBuf,
    path: PathBuf,
    config: StoreConfig,
    write_guard: Mutex<()>,
    _lock: StoreLock,
}

impl FileGeofenceStore {
    /// Open the store, creating the directory if needed.
    pub fn open(dir: &Path, config: StoreConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)?;

        let lock = StoreLock::acquire(dir)?;

        let store = Self {
            dir: dir.to_path_buf(),
            path: dir.join(&config.file_name),
            config,
            write_guard: Mutex::new(()),
            _lock: lock,
        };
        store.remove_stale_temp_files();
        Ok(store)
    }

    /// Path of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, surfacing the reason it could not be read.
    ///
    /// A missing snapshot is not an error and yields an empty collection.
    pub fn try_load(&self) -> Result<Vec<GeofenceRecord>, StorageError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut reader = BufReader::new(file);
        codec::read_header(&mut reader)?;
        let body: SnapshotBody = codec::decode_frame(&mut reader)?;

        let mut trailing = [0u8; 1];
        if reader.read(&mut trailing)? != 0 {
            return Err(StorageError::Corrupt("trailing bytes after snapshot frame".to_string()));
        }

        Ok(body.records.into_iter().map(GeofenceRecord::from).collect())
    }

    fn temp_prefix(&self) -> String {
        format!("{}.tmp.", self.config.file_name)
    }

    fn remove_stale_temp_files(&self) {
        let prefix = self.temp_prefix();
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(&prefix) {
                if let Err(e) = fs::remove_file(entry.path()) {
                    tracing::warn!(path = %entry.path().display(), error = %e, "failed to remove stale snapshot temp file");
                }
            }
        }
    }

    fn write_temp(&self, temp_path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(temp_path)?;
        file.write_all(bytes)?;
        file.flush()?;
        if self.config.sync_on_write {
            file.sync_all()?;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn sync_dir(&self) -> std::io::Result<()> {
        File::open(&self.dir)?.sync_all()
    }

    #[cfg(not(unix))]
    fn sync_dir(&self) -> std::io::Result<()> {
        Ok(())
    }
}

impl GeofenceStore for FileGeofenceStore {
    fn load(&self) -> Vec<GeofenceRecord> {
        match self.try_load() {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "discarding unreadable geofence snapshot");
                Vec::new()
            }
        }
    }

    fn save(&self, records: &[GeofenceRecord]) -> Result<(), StorageError> {
        let body = SnapshotBody {
            records: records.iter().map(StoredRecord::from).collect(),
        };
        let mut bytes = Vec::new();
        codec::write_header(&mut bytes);
        bytes.extend_from_slice(&codec::encode_frame(&body)?);

        let _guard = self
            .write_guard
            .lock()
            .map_err(|_| StorageError::Io(std::io::Error::other("poisoned lock: snapshot writer")))?;

        let temp_path = self.dir.join(format!("{}{}", self.temp_prefix(), Uuid::new_v4()));
        if let Err(e) = self.write_temp(&temp_path, &bytes) {
            let _ = fs::remove_file(&temp_path);
            return Err(StorageError::Io(e));
        }
        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(StorageError::Io(e));
        }
        if self.config.sync_on_write {
            self.sync_dir()?;
        }

        tracing::debug!(path = %self.path.display(), count = records.len(), "geofence snapshot written");
        Ok(())
    }
}
