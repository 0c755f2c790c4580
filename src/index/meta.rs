use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;
use crate::core::error::{Result, StoreError};
use crate::directory::dir::{Directory, read_file, write_file};

/// Name of the lock that guards index mutation.
pub const WRITE_LOCK_NAME: &str = "write.lock";

/// Marker file identifying a directory as an initialized index.
pub const META_FILE_NAME: &str = "index.meta";

const META_FORMAT_VERSION: u32 = 1;

/// Metadata of one index partition. Its presence marks the partition as a
/// created index; generation counts how many times it was (re)created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub format_version: u32,
    pub index_id: Uuid,
    pub generation: u64,
    pub created_at: DateTime<Utc>,
}

impl IndexMeta {
    fn fresh(generation: u64) -> Self {
        IndexMeta {
            format_version: META_FORMAT_VERSION,
            index_id: Uuid::new_v4(),
            generation,
            created_at: Utc::now(),
        }
    }

    /// Load the marker from a directory. `Ok(None)` when the marker file is
    /// absent, an error when it is present but does not validate.
    pub fn read(dir: &dyn Directory) -> Result<Option<IndexMeta>> {
        if !dir.file_exists(META_FILE_NAME)? {
            return Ok(None);
        }
        let data = read_file(dir, META_FILE_NAME)?;
        if data.len() < 4 {
            return Err(StoreError::corrupt(META_FILE_NAME, "truncated"));
        }
        let (payload, trailer) = data.split_at(data.len() - 4);
        let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(payload);
        if hasher.finalize() != stored {
            return Err(StoreError::corrupt(META_FILE_NAME, "checksum mismatch"));
        }
        let meta = bincode::deserialize(payload)?;
        Ok(Some(meta))
    }

    pub fn write(&self, dir: &dyn Directory) -> Result<()> {
        let mut data = bincode::serialize(self)?;
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&data);
        data.extend_from_slice(&hasher.finalize().to_le_bytes());
        write_file(dir, META_FILE_NAME, &data)
    }
}

/// Whether the directory holds a created index. Any read problem counts as
/// "no index" so callers can recover by recreating it.
pub fn index_exists(dir: &dyn Directory) -> bool {
    matches!(IndexMeta::read(dir), Ok(Some(_)))
}

/// Initialize a fresh empty index in the directory, replacing whatever was
/// there. Takes the write lock for the duration.
pub fn create_index(dir: &dyn Directory) -> Result<()> {
    let mut lock = dir.make_lock(WRITE_LOCK_NAME)?;
    if !lock.try_acquire()? {
        return Err(StoreError::lock(WRITE_LOCK_NAME, "already held"));
    }
    let result = create_locked(dir);
    if let Err(err) = lock.release() {
        warn!(error = %err, "failed to release write lock after index creation");
    }
    result
}

fn create_locked(dir: &dyn Directory) -> Result<()> {
    let generation = match IndexMeta::read(dir) {
        Ok(Some(meta)) => meta.generation + 1,
        _ => 1,
    };
    // Lock files stay; everything else goes.
    for name in dir.list_files()? {
        if !name.ends_with(".lock") {
            dir.delete_file(&name)?;
        }
    }
    IndexMeta::fresh(generation).write(dir)
}
