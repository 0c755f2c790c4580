use std::any::Any;
use std::fmt;
use tracing::warn;
use crate::core::error::Result;
use crate::directory::dir::Directory;
use crate::index::meta::META_FILE_NAME;

/// Opaque token carried across the copy-from phases. Stores stash whatever
/// staging state they need in `data`.
pub struct CopyFromHolder {
    pub data: Option<Box<dyn Any + Send>>,
}

impl CopyFromHolder {
    pub fn empty() -> Self {
        CopyFromHolder { data: None }
    }
}

/// Physical backend of index partitions: opens raw directories and performs
/// the structural operations a plain `Directory` cannot express.
pub trait DirectoryStore: Send + Sync {
    /// Open the raw directory of one partition. Callers own composition and
    /// caching; stores hand out a fresh handle every time.
    fn open(&self, sub_context: &str, sub_index: &str) -> Result<Box<dyn Directory>>;

    /// Authoritative existence answer when the backend has one. `None` makes
    /// the caller fall back to a structural probe through the directory.
    fn index_exists(&self, dir: &dyn Directory) -> Option<bool> {
        let _ = dir;
        None
    }

    fn delete_index(&self, dir: &dyn Directory, sub_context: &str, sub_index: &str)
    -> Result<()>;

    fn clean_index(&self, dir: &dyn Directory, sub_context: &str, sub_index: &str) -> Result<()>;

    fn close_directory(
        &self,
        dir: &dyn Directory,
        sub_context: &str,
        sub_index: &str,
    ) -> Result<()> {
        let _ = (sub_context, sub_index);
        dir.close()
    }

    /// First replication phase: make the destination partitions ready to
    /// receive a full replacement. The default wipes every non-lock file.
    fn before_copy_from(
        &self,
        sub_context: &str,
        dirs: &[(&str, &dyn Directory)],
    ) -> Result<CopyFromHolder> {
        let _ = sub_context;
        for (_, dir) in dirs.iter().copied() {
            wipe_index_files(dir)?;
        }
        Ok(CopyFromHolder::empty())
    }

    fn after_successful_copy_from(
        &self,
        sub_context: &str,
        dirs: &[(&str, &dyn Directory)],
        holder: CopyFromHolder,
    ) -> Result<()> {
        let _ = (sub_context, dirs, holder);
        Ok(())
    }

    /// Failure cleanup: no destination may be left claiming a completed
    /// index, so the default drops the completion marker everywhere. Cleanup
    /// problems are logged, never raised, to keep the copy error visible.
    fn after_failed_copy_from(
        &self,
        sub_context: &str,
        dirs: &[(&str, &dyn Directory)],
        holder: CopyFromHolder,
    ) {
        let _ = holder;
        for (sub_index, dir) in dirs.iter().copied() {
            match dir.file_exists(META_FILE_NAME) {
                Ok(true) => {
                    if let Err(err) = dir.delete_file(META_FILE_NAME) {
                        warn!(
                            sub_context,
                            sub_index,
                            error = %err,
                            "failed to drop completion marker after aborted copy"
                        );
                    }
                }
                Ok(false) => {}
                Err(err) => warn!(
                    sub_context,
                    sub_index,
                    error = %err,
                    "failed to inspect directory after aborted copy"
                ),
            }
        }
    }

    /// Backend housekeeping for one open partition.
    fn perform_scheduled_tasks(
        &self,
        dir: &dyn Directory,
        sub_context: &str,
        sub_index: &str,
    ) -> Result<()> {
        let _ = (dir, sub_context, sub_index);
        Ok(())
    }

    /// Release backend-wide resources.
    fn close(&self) {}
}

impl fmt::Debug for dyn DirectoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DirectoryStore")
    }
}

/// Delete every file of the partition except lock files.
pub fn wipe_index_files(dir: &dyn Directory) -> Result<()> {
    for name in dir.list_files()? {
        if !name.ends_with(".lock") {
            dir.delete_file(&name)?;
        }
    }
    Ok(())
}
