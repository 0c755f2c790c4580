use std::any::Any;
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use memmap2::{Mmap, MmapOptions};
use crate::core::error::{Result, StoreError};
use crate::directory::dir::{BytesInput, Directory, IndexOutput};
use crate::directory::fs::FsDirectory;
use crate::lock::factory::{DirectoryLock, LockFactory};

/// Filesystem directory whose reads go through memory maps for zero-copy
/// access. Writes take the regular file path.
pub struct MmapDirectory {
    fs: FsDirectory,
}

impl MmapDirectory {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(MmapDirectory {
            fs: FsDirectory::open(path)?,
        })
    }
}

impl Directory for MmapDirectory {
    fn list_files(&self) -> Result<Vec<String>> {
        self.fs.list_files()
    }

    fn file_exists(&self, name: &str) -> Result<bool> {
        self.fs.file_exists(name)
    }

    fn file_len(&self, name: &str) -> Result<u64> {
        self.fs.file_len(name)
    }

    fn open_input(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        let path = self.fs.path().join(name);
        let file = File::open(&path).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                StoreError::file_not_found(name)
            } else {
                err.into()
            }
        })?;
        let len = file.metadata()?.len() as usize;
        // Zero-length files cannot be mapped.
        if len == 0 {
            return Ok(Box::new(BytesInput::new(Arc::new(Vec::new()))));
        }
        let mmap = unsafe { MmapOptions::new().len(len).map(&file)? };
        Ok(Box::new(MmapInput { mmap, pos: 0 }))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn IndexOutput>> {
        self.fs.create_output(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.fs.delete_file(name)
    }

    fn make_lock(&self, name: &str) -> Result<Box<dyn DirectoryLock>> {
        self.fs.make_lock(name)
    }

    fn clear_lock(&self, name: &str) -> Result<()> {
        self.fs.clear_lock(name)
    }

    fn set_lock_factory(&mut self, factory: Arc<dyn LockFactory>) {
        self.fs.set_lock_factory(factory);
    }

    fn close(&self) -> Result<()> {
        self.fs.close()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct MmapInput {
    mmap: Mmap,
    pos: usize,
}

impl Read for MmapInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.mmap[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::dir::{read_file, write_file};

    #[test]
    fn mapped_read_matches_written_bytes() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = MmapDirectory::open(tmp.path().join("idx")).expect("open");

        let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        write_file(&dir, "seg.bin", &payload).expect("write");
        assert_eq!(read_file(&dir, "seg.bin").expect("read"), payload);
    }

    #[test]
    fn empty_file_reads_as_empty() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = MmapDirectory::open(tmp.path().join("idx")).expect("open");

        write_file(&dir, "empty.bin", b"").expect("write");
        assert_eq!(read_file(&dir, "empty.bin").expect("read"), Vec::<u8>::new());
    }
}
