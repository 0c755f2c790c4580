use std::any::Any;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use crate::core::error::{Result, StoreError};
use crate::directory::dir::{Directory, IndexOutput};
use crate::lock::factory::{DirectoryLock, LockFactory};
use crate::lock::fs_locks::SimpleFsLockFactory;

fn not_found(name: &str, err: io::Error) -> StoreError {
    if err.kind() == io::ErrorKind::NotFound {
        StoreError::file_not_found(name)
    } else {
        err.into()
    }
}

/// Directory over one flat filesystem directory.
pub struct FsDirectory {
    path: PathBuf,
    lock_factory: Arc<dyn LockFactory>,
}

impl FsDirectory {
    /// Opens the directory at `path`, creating it if needed. Locks default
    /// to lock files next to the index files.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        fs::create_dir_all(&path)?;
        let lock_factory = Arc::new(SimpleFsLockFactory::new(&path)?);
        Ok(FsDirectory { path, lock_factory })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Directory for FsDirectory {
    fn list_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    fn file_exists(&self, name: &str) -> Result<bool> {
        Ok(self.path.join(name).is_file())
    }

    fn file_len(&self, name: &str) -> Result<u64> {
        let meta = fs::metadata(self.path.join(name)).map_err(|err| not_found(name, err))?;
        Ok(meta.len())
    }

    fn open_input(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        let file = File::open(self.path.join(name)).map_err(|err| not_found(name, err))?;
        Ok(Box::new(file))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn IndexOutput>> {
        let file = File::create(self.path.join(name))?;
        Ok(Box::new(FsOutput { file }))
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        fs::remove_file(self.path.join(name)).map_err(|err| not_found(name, err))
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

struct FsOutput {
    file: File,
}

impl Write for FsOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl IndexOutput for FsOutput {
    fn finish(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::dir::{read_file, write_file};

    #[test]
    fn write_then_read_roundtrip() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = FsDirectory::open(tmp.path().join("idx")).expect("open");

        write_file(&dir, "seg.bin", b"on disk").expect("write");
        assert!(dir.file_exists("seg.bin").expect("exists"));
        assert_eq!(dir.file_len("seg.bin").expect("len"), 7);
        assert_eq!(read_file(&dir, "seg.bin").expect("read"), b"on disk");

        dir.delete_file("seg.bin").expect("delete");
        assert!(!dir.file_exists("seg.bin").expect("exists"));
    }

    #[test]
    fn list_files_skips_subdirectories() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = FsDirectory::open(tmp.path().join("idx")).expect("open");
        write_file(&dir, "seg.bin", b"x").expect("write");
        fs::create_dir(tmp.path().join("idx").join("nested")).expect("mkdir");

        assert_eq!(dir.list_files().expect("list"), vec!["seg.bin"]);
    }

    #[test]
    fn missing_file_errors() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = FsDirectory::open(tmp.path().join("idx")).expect("open");
        assert!(matches!(
            dir.file_len("nope.bin"),
            Err(StoreError::FileNotFound { .. })
        ));
    }
}
