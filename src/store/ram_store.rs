use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use crate::core::error::Result;
use crate::directory::dir::Directory;
use crate::directory::ram::{RamDirectory, RamFiles};
use crate::lock::single_instance::SingleInstanceLockFactory;
use crate::store::backend::DirectoryStore;

struct RamIndex {
    files: Arc<RamFiles>,
    locks: Arc<SingleInstanceLockFactory>,
}

/// In-memory backend. Partitions live in the store, not in the handles, so
/// they survive closes; only `delete_index` drops them for real.
pub struct RamDirectoryStore {
    indexes: RwLock<HashMap<String, Arc<RamIndex>>>,
}

impl RamDirectoryStore {
    pub fn new() -> Self {
        RamDirectoryStore {
            indexes: RwLock::new(HashMap::new()),
        }
    }

    fn key(sub_context: &str, sub_index: &str) -> String {
        format!("{sub_context}/{sub_index}")
    }

    fn index(&self, sub_context: &str, sub_index: &str) -> Arc<RamIndex> {
        let key = Self::key(sub_context, sub_index);
        if let Some(index) = self.indexes.read().get(&key) {
            return Arc::clone(index);
        }
        let mut indexes = self.indexes.write();
        Arc::clone(indexes.entry(key).or_insert_with(|| {
            Arc::new(RamIndex {
                files: Arc::new(RamFiles::new()),
                locks: Arc::new(SingleInstanceLockFactory::new()),
            })
        }))
    }
}

impl Default for RamDirectoryStore {
    fn default() -> Self {
        RamDirectoryStore::new()
    }
}

impl DirectoryStore for RamDirectoryStore {
    fn open(&self, sub_context: &str, sub_index: &str) -> Result<Box<dyn Directory>> {
        let index = self.index(sub_context, sub_index);
        Ok(Box::new(RamDirectory::with_lock_factory(
            Arc::clone(&index.files),
            Arc::clone(&index.locks) as _,
        )))
    }

    fn delete_index(
        &self,
        _dir: &dyn Directory,
        sub_context: &str,
        sub_index: &str,
    ) -> Result<()> {
        let removed = self
            .indexes
            .write()
            .remove(&Self::key(sub_context, sub_index));
        // Live handles share the file table; leave it empty for them.
        if let Some(index) = removed {
            index.files.clear();
        }
        Ok(())
    }

    fn clean_index(&self, _dir: &dyn Directory, sub_context: &str, sub_index: &str) -> Result<()> {
        if let Some(index) = self.indexes.read().get(&Self::key(sub_context, sub_index)) {
            index.files.clear();
        }
        Ok(())
    }

    fn close(&self) {
        self.indexes.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::dir::{read_file, write_file};

    #[test]
    fn data_survives_handle_closes() {
        let store = RamDirectoryStore::new();
        let first = store.open("index", "posts").expect("open");
        write_file(first.as_ref(), "seg.bin", b"kept").expect("write");
        first.close().expect("close");

        let second = store.open("index", "posts").expect("open");
        assert_eq!(read_file(second.as_ref(), "seg.bin").expect("read"), b"kept");
    }

    #[test]
    fn handles_of_one_partition_share_locks() {
        let store = RamDirectoryStore::new();
        let first = store.open("index", "posts").expect("open");
        let second = store.open("index", "posts").expect("open");

        let mut held = first.make_lock("write.lock").expect("lock");
        assert!(held.try_acquire().expect("acquire"));
        assert!(!second
            .make_lock("write.lock")
            .expect("lock")
            .try_acquire()
            .expect("acquire"));
        held.release().expect("release");
    }

    #[test]
    fn delete_empties_live_handles() {
        let store = RamDirectoryStore::new();
        let dir = store.open("index", "posts").expect("open");
        write_file(dir.as_ref(), "seg.bin", b"doomed").expect("write");

        store
            .delete_index(dir.as_ref(), "index", "posts")
            .expect("delete");
        assert!(dir.list_files().expect("list").is_empty());
    }

    #[test]
    fn partitions_are_isolated() {
        let store = RamDirectoryStore::new();
        let posts = store.open("index", "posts").expect("open");
        let users = store.open("index", "users").expect("open");

        write_file(posts.as_ref(), "seg.bin", b"posts").expect("write");
        assert!(!users.file_exists("seg.bin").expect("exists"));
    }
}
