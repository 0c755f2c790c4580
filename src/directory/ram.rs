use std::any::Any;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::Arc;
use parking_lot::RwLock;
use crate::core::error::{Result, StoreError};
use crate::directory::dir::{BytesInput, Directory, IndexOutput};
use crate::lock::factory::{DirectoryLock, LockFactory};
use crate::lock::single_instance::SingleInstanceLockFactory;

/// File table of one in-memory index partition, shared by every handle that
/// opens the partition so the data outlives any single handle.
pub struct RamFiles {
    files: RwLock<HashMap<String, Arc<Vec<u8>>>>,
}

impl RamFiles {
    pub fn new() -> Self {
        RamFiles {
            files: RwLock::new(HashMap::new()),
        }
    }

    pub fn clear(&self) {
        self.files.write().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl Default for RamFiles {
    fn default() -> Self {
        RamFiles::new()
    }
}

/// Directory over process memory.
pub struct RamDirectory {
    files: Arc<RamFiles>,
    lock_factory: Arc<dyn LockFactory>,
}

impl RamDirectory {
    pub fn new(files: Arc<RamFiles>) -> Self {
        RamDirectory {
            files,
            lock_factory: Arc::new(SingleInstanceLockFactory::new()),
        }
    }

    /// Handles of one partition must share the lock factory as well as the
    /// file table, otherwise their locks would not see each other.
    pub fn with_lock_factory(files: Arc<RamFiles>, lock_factory: Arc<dyn LockFactory>) -> Self {
        RamDirectory { files, lock_factory }
    }
}

impl Directory for RamDirectory {
    fn list_files(&self) -> Result<Vec<String>> {
        Ok(self.files.files.read().keys().cloned().collect())
    }

    fn file_exists(&self, name: &str) -> Result<bool> {
        Ok(self.files.files.read().contains_key(name))
    }

    fn file_len(&self, name: &str) -> Result<u64> {
        self.files
            .files
            .read()
            .get(name)
            .map(|data| data.len() as u64)
            .ok_or_else(|| StoreError::file_not_found(name))
    }

    fn open_input(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        let data = self
            .files
            .files
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::file_not_found(name))?;
        Ok(Box::new(BytesInput::new(data)))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn IndexOutput>> {
        Ok(Box::new(RamOutput {
            name: name.to_string(),
            buf: Vec::new(),
            files: Arc::clone(&self.files),
        }))
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.files
            .files
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::file_not_found(name))
    }

    fn make_lock(&self, name: &str) -> Result<Box<dyn DirectoryLock>> {
        self.lock_factory.make_lock(name)
    }

    fn clear_lock(&self, name: &str) -> Result<()> {
        self.lock_factory.clear_lock(name)
    }

    fn set_lock_factory(&mut self, factory: Arc<dyn LockFactory>) {
        self.lock_factory = factory;
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct RamOutput {
    name: String,
    buf: Vec<u8>,
    files: Arc<RamFiles>,
}

impl Write for RamOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl IndexOutput for RamOutput {
    fn finish(&mut self) -> Result<()> {
        let data = Arc::new(std::mem::take(&mut self.buf));
        self.files.files.write().insert(self.name.clone(), data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::dir::{read_file, write_file};

    #[test]
    fn write_then_read_roundtrip() {
        let dir = RamDirectory::new(Arc::new(RamFiles::new()));
        write_file(&dir, "seg.bin", b"payload").expect("write");

        assert!(dir.file_exists("seg.bin").expect("exists"));
        assert_eq!(dir.file_len("seg.bin").expect("len"), 7);
        assert_eq!(read_file(&dir, "seg.bin").expect("read"), b"payload");
    }

    #[test]
    fn unfinished_output_publishes_nothing() {
        let dir = RamDirectory::new(Arc::new(RamFiles::new()));
        {
            let mut output = dir.create_output("seg.bin").expect("output");
            output.write_all(b"partial").expect("write");
            // dropped without finish
        }
        assert!(!dir.file_exists("seg.bin").expect("exists"));
    }

    #[test]
    fn handles_share_the_file_table() {
        let files = Arc::new(RamFiles::new());
        let first = RamDirectory::new(Arc::clone(&files));
        let second = RamDirectory::new(Arc::clone(&files));

        write_file(&first, "seg.bin", b"shared").expect("write");
        assert_eq!(read_file(&second, "seg.bin").expect("read"), b"shared");

        second.delete_file("seg.bin").expect("delete");
        assert!(!first.file_exists("seg.bin").expect("exists"));
    }

    #[test]
    fn missing_file_errors() {
        let dir = RamDirectory::new(Arc::new(RamFiles::new()));
        assert!(matches!(
            dir.open_input("nope.bin"),
            Err(StoreError::FileNotFound { .. })
        ));
        assert!(matches!(
            dir.delete_file("nope.bin"),
            Err(StoreError::FileNotFound { .. })
        ));
    }
}
