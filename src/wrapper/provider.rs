use crate::core::error::Result;
use crate::directory::dir::Directory;

/// Builds one layer of the transparent directory chain. Providers are
/// resolved by kind when the store is built and applied in configured order
/// every time a directory is opened.
pub trait DirectoryWrapperProvider: Send + Sync {
    fn wrap(&self, sub_index: &str, dir: Box<dyn Directory>) -> Result<Box<dyn Directory>>;
}
