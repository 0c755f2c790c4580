use std::fs;
use std::io;
use std::path::PathBuf;
use crate::core::error::Result;
use crate::directory::dir::Directory;
use crate::directory::fs::FsDirectory;
use crate::store::backend::DirectoryStore;

/// Filesystem backend rooted at the connection path. Partitions live at
/// `<root>/<sub_context>/<sub_index>`.
pub struct FsDirectoryStore {
    root: PathBuf,
}

impl FsDirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsDirectoryStore { root: root.into() }
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

impl DirectoryStore for FsDirectoryStore {
    fn open(&self, sub_context: &str, sub_index: &str) -> Result<Box<dyn Directory>> {
        Ok(Box::new(FsDirectory::open(
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
