use std::any::Any;
use std::io::{self, Read, Write};
use std::sync::Arc;
use crate::core::error::Result;
use crate::lock::factory::{DirectoryLock, LockFactory};

/// Shared handle to an open directory. Clones all point at the same physical
/// handle, so equality of handles is `Arc::ptr_eq`.
pub type DirectoryHandle = Arc<dyn Directory>;

/// Flat namespace of index files over some physical storage. Every access to
/// an index partition flows through one of these, raw or decorated.
pub trait Directory: Send + Sync {
    fn list_files(&self) -> Result<Vec<String>>;

    fn file_exists(&self, name: &str) -> Result<bool>;

    /// Stored size in bytes.
    fn file_len(&self, name: &str) -> Result<u64>;

    fn open_input(&self, name: &str) -> Result<Box<dyn Read + Send>>;

    fn create_output(&self, name: &str) -> Result<Box<dyn IndexOutput>>;

    fn delete_file(&self, name: &str) -> Result<()>;

    fn make_lock(&self, name: &str) -> Result<Box<dyn DirectoryLock>>;

    fn clear_lock(&self, name: &str) -> Result<()>;

    fn set_lock_factory(&mut self, factory: Arc<dyn LockFactory>);

    /// Release whatever the directory holds. The handle must not be used
    /// afterwards.
    fn close(&self) -> Result<()>;

    /// The directory this one decorates. `None` for raw storage.
    fn wrapped_directory(&self) -> Option<&dyn Directory> {
        None
    }

    /// Drop decoration state (caches, staged buffers) down the whole chain.
    fn clear_wrapper(&self) -> Result<()> {
        Ok(())
    }

    /// Periodic housekeeping down the whole chain.
    fn perform_scheduled_tasks(&self) -> Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;
}

/// Streaming writer for one index file. The file is published by `finish`;
/// dropping an unfinished output abandons the write.
pub trait IndexOutput: Write + Send {
    fn finish(&mut self) -> Result<()>;
}

/// Reader over shared in-memory contents.
pub struct BytesInput {
    data: Arc<Vec<u8>>,
    pos: usize,
}

impl BytesInput {
    pub fn new(data: Arc<Vec<u8>>) -> Self {
        BytesInput { data, pos: 0 }
    }
}

impl Read for BytesInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.data[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

/// Walk the decorator chain down to raw storage.
pub fn unwrap_directory(dir: &dyn Directory) -> &dyn Directory {
    let mut current = dir;
    while let Some(inner) = current.wrapped_directory() {
        current = inner;
    }
    current
}

/// Stream every file of `src` into `dest` through a fixed-size buffer.
pub fn copy_directory(src: &dyn Directory, dest: &dyn Directory, buffer_size: usize) -> Result<()> {
    let mut buffer = vec![0u8; buffer_size.max(1)];
    for name in src.list_files()? {
        let mut input = src.open_input(&name)?;
        let mut output = dest.create_output(&name)?;
        loop {
            let n = input.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            output.write_all(&buffer[..n])?;
        }
        output.finish()?;
    }
    Ok(())
}

/// Write a whole file in one call.
pub fn write_file(dir: &dyn Directory, name: &str, data: &[u8]) -> Result<()> {
    let mut output = dir.create_output(name)?;
    output.write_all(data)?;
    output.finish()
}

/// Read a whole file in one call.
pub fn read_file(dir: &dyn Directory, name: &str) -> Result<Vec<u8>> {
    let mut input = dir.open_input(name)?;
    let mut data = Vec::new();
    input.read_to_end(&mut data)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::ram::{RamDirectory, RamFiles};

    #[test]
    fn bytes_input_reads_in_chunks() {
        let mut input = BytesInput::new(Arc::new(vec![1, 2, 3, 4, 5]));
        let mut buf = [0u8; 2];
        assert_eq!(input.read(&mut buf).expect("read"), 2);
        assert_eq!(buf, [1, 2]);
        let mut rest = Vec::new();
        input.read_to_end(&mut rest).expect("read_to_end");
        assert_eq!(rest, vec![3, 4, 5]);
    }

    #[test]
    fn copy_directory_moves_every_file() {
        let src = RamDirectory::new(Arc::new(RamFiles::new()));
        let dest = RamDirectory::new(Arc::new(RamFiles::new()));
        write_file(&src, "a.bin", b"alpha").expect("write");
        write_file(&src, "b.bin", &vec![7u8; 100_000]).expect("write");

        copy_directory(&src, &dest, 1024).expect("copy");

        let mut names = dest.list_files().expect("list");
        names.sort();
        assert_eq!(names, vec!["a.bin", "b.bin"]);
        assert_eq!(read_file(&dest, "a.bin").expect("read"), b"alpha");
        assert_eq!(read_file(&dest, "b.bin").expect("read"), vec![7u8; 100_000]);
    }
}
