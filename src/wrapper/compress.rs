use std::any::Any;
use std::io::{self, Read, Write};
use std::sync::Arc;
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use crate::core::error::{Result, StoreError};
use crate::directory::dir::{Directory, IndexOutput, read_file};
use crate::lock::factory::{DirectoryLock, LockFactory};
use crate::wrapper::provider::DirectoryWrapperProvider;

/// Transparent lz4 block compression around another directory. Readers see
/// the original bytes; storage holds compressed blocks with a prepended
/// uncompressed size.
pub struct CompressedDirectory {
    inner: Box<dyn Directory>,
}

impl CompressedDirectory {
    pub fn new(inner: Box<dyn Directory>) -> Self {
        CompressedDirectory { inner }
    }
}

impl Directory for CompressedDirectory {
    fn list_files(&self) -> Result<Vec<String>> {
        self.inner.list_files()
    }

    fn file_exists(&self, name: &str) -> Result<bool> {
        self.inner.file_exists(name)
    }

    /// Stored (compressed) size.
    fn file_len(&self, name: &str) -> Result<u64> {
        self.inner.file_len(name)
    }

    fn open_input(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        let stored = read_file(self.inner.as_ref(), name)?;
        let data = decompress_size_prepended(&stored)
            .map_err(|err| StoreError::corrupt(name, err.to_string()))?;
        Ok(Box::new(io::Cursor::new(data)))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn IndexOutput>> {
        Ok(Box::new(CompressedOutput {
            out: self.inner.create_output(name)?,
            buf: Vec::new(),
        }))
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.inner.delete_file(name)
    }

    fn make_lock(&self, name: &str) -> Result<Box<dyn DirectoryLock>> {
        self.inner.make_lock(name)
    }

    fn clear_lock(&self, name: &str) -> Result<()> {
        self.inner.clear_lock(name)
    }

    fn set_lock_factory(&mut self, factory: Arc<dyn LockFactory>) {
        self.inner.set_lock_factory(factory);
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }

    fn wrapped_directory(&self) -> Option<&dyn Directory> {
        Some(self.inner.as_ref())
    }

    fn clear_wrapper(&self) -> Result<()> {
        // No state of its own.
        self.inner.clear_wrapper()
    }

    fn perform_scheduled_tasks(&self) -> Result<()> {
        self.inner.perform_scheduled_tasks()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct CompressedOutput {
    out: Box<dyn IndexOutput>,
    buf: Vec<u8>,
}

impl Write for CompressedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl IndexOutput for CompressedOutput {
    fn finish(&mut self) -> Result<()> {
        let compressed = compress_prepend_size(&self.buf);
        self.out.write_all(&compressed)?;
        self.out.finish()
    }
}

/// Provider for the built-in `compress` wrapper kind.
pub struct CompressedWrapperProvider;

impl DirectoryWrapperProvider for CompressedWrapperProvider {
    fn wrap(&self, _sub_index: &str, dir: Box<dyn Directory>) -> Result<Box<dyn Directory>> {
        Ok(Box::new(CompressedDirectory::new(dir)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::dir::{unwrap_directory, write_file};
    use crate::directory::ram::{RamDirectory, RamFiles};

    #[test]
    fn readers_see_the_original_bytes() {
        let dir = CompressedDirectory::new(Box::new(RamDirectory::new(Arc::new(RamFiles::new()))));
        let payload = b"the same phrase over and over, the same phrase over and over".repeat(64);
        write_file(&dir, "seg.bin", &payload).expect("write");
        assert_eq!(read_file(&dir, "seg.bin").expect("read"), payload);
    }

    #[test]
    fn storage_holds_compressed_blocks() {
        let files = Arc::new(RamFiles::new());
        let raw = RamDirectory::new(Arc::clone(&files));
        let dir = CompressedDirectory::new(Box::new(RamDirectory::new(files)));

        let payload = vec![b'z'; 64 * 1024];
        write_file(&dir, "seg.bin", &payload).expect("write");

        let stored = read_file(&raw, "seg.bin").expect("read raw");
        assert!(stored.len() < payload.len());
        assert_ne!(stored, payload);
    }

    #[test]
    fn unwrap_reaches_the_raw_directory() {
        let dir = CompressedDirectory::new(Box::new(RamDirectory::new(Arc::new(RamFiles::new()))));
        assert!(dir.wrapped_directory().is_some());
        let raw = unwrap_directory(&dir);
        assert!(raw.as_any().downcast_ref::<RamDirectory>().is_some());
    }

    #[test]
    fn tampered_blocks_read_as_corrupt() {
        let files = Arc::new(RamFiles::new());
        let raw = RamDirectory::new(Arc::clone(&files));
        let dir = CompressedDirectory::new(Box::new(RamDirectory::new(files)));

        write_file(&dir, "seg.bin", b"some payload worth compressing").expect("write");
        // Valid size prefix, truncated block.
        write_file(&raw, "seg.bin", b"\x08\x00\x00\x00").expect("tamper");

        assert!(matches!(
            read_file(&dir, "seg.bin"),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
