use std::fs;
use std::io;
use std::path::PathBuf;
use crate::core::error::Result;
use crate::directory::dir::Directory;
use crate::directory::mmap::MmapDirectory;
use crate::store::backend::DirectoryStore;

/// Filesystem backend whose directories read through memory maps. Layout on
/// disk matches the plain filesystem backend.
pub struct MmapDirectoryStore {
    root: PathBuf,
}

impl MmapDirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        MmapDirectoryStore { root: root.into() }
    }

    fn index_path(&self, sub_context: &str, sub_index: &str) -> PathBuf {
        self.root.join(sub_context).join(sub_index)
    }

    fn remove_index_tree(&self, sub_context: &str, sub_index: &str) -> Result<()> {
        match fs::remove_dir_all(self.index_path(sub_context, sub_index)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl DirectoryStore for MmapDirectoryStore {
    fn open(&self, sub_context: &str, sub_index: &str) -> Result<Box<dyn Directory>> {
        Ok(Box::new(MmapDirectory::open(
            self.index_path(sub_context, sub_index),
        )?))
    }

    fn delete_index(
        &self,
        _dir: &dyn Directory,
        sub_context: &str,
        sub_index: &str,
    ) -> Result<()> {
        self.remove_index_tree(sub_context, sub_index)
    }

    fn clean_index(&self, _dir: &dyn Directory, sub_context: &str, sub_index: &str) -> Result<()> {
        self.remove_index_tree(sub_context, sub_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::dir::{read_file, write_file};

    #[test]
    fn mapped_reads_see_fs_writes() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = MmapDirectoryStore::new(tmp.path());

        let dir = store.open("index", "posts").expect("open");
        write_file(dir.as_ref(), "seg.bin", b"mapped").expect("write");
        assert_eq!(read_file(dir.as_ref(), "seg.bin").expect("read"), b"mapped");
    }
}
