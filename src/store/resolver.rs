use std::sync::Arc;
use crate::core::error::{Result, StoreError};
use crate::core::settings::StoreSettings;
use crate::store::backend::DirectoryStore;
use crate::store::fs_store::FsDirectoryStore;
use crate::store::mmap_store::MmapDirectoryStore;
use crate::store::ram_store::RamDirectoryStore;
use crate::store::registry::ProviderRegistry;
use crate::store::sqlite_store::SqliteDirectoryStore;

/// Picks the backend from the connection string scheme. A bare path means
/// the plain filesystem backend.
pub fn resolve_store(
    settings: &StoreSettings,
    registry: &ProviderRegistry,
) -> Result<Arc<dyn DirectoryStore>> {
    let connection = settings.connection.as_str();

    if connection.strip_prefix("ram://").is_some() {
        return Ok(Arc::new(RamDirectoryStore::new()));
    }
    if let Some(path) = connection.strip_prefix("file://") {
        return Ok(Arc::new(FsDirectoryStore::new(path)));
    }
    if let Some(path) = connection.strip_prefix("mmap://") {
        return Ok(Arc::new(MmapDirectoryStore::new(path)));
    }
    if let Some(path) = connection.strip_prefix("sqlite://") {
        return Ok(Arc::new(SqliteDirectoryStore::open(path)?));
    }
    if let Some((scheme, _)) = connection.split_once("://") {
        let provider = registry.store_provider(scheme).ok_or_else(|| {
            StoreError::configuration(format!("unknown connection scheme [{scheme}]"))
        })?;
        return provider(settings);
    }

    Ok(Arc::new(FsDirectoryStore::new(connection)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::dir::write_file;

    #[test]
    fn ram_scheme_resolves() {
        let settings = StoreSettings::new("ram://target/test");
        let store = resolve_store(&settings, &ProviderRegistry::new()).expect("resolve");
        let dir = store.open("index", "posts").expect("open");
        write_file(dir.as_ref(), "a.bin", b"x").expect("write");
    }

    #[test]
    fn bare_path_means_filesystem() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let settings = StoreSettings::new(tmp.path().to_string_lossy());
        let store = resolve_store(&settings, &ProviderRegistry::new()).expect("resolve");
        let dir = store.open("index", "posts").expect("open");
        write_file(dir.as_ref(), "a.bin", b"x").expect("write");
        assert!(tmp.path().join("index/posts/a.bin").is_file());
    }

    #[test]
    fn unknown_scheme_is_a_configuration_error() {
        let settings = StoreSettings::new("gopher://somewhere");
        let err = resolve_store(&settings, &ProviderRegistry::new()).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("gopher"));
    }

    #[test]
    fn registered_scheme_wins_over_the_fallback() {
        let mut registry = ProviderRegistry::new();
        registry.register_store("gopher", |_| Ok(Arc::new(RamDirectoryStore::new())));

        let settings = StoreSettings::new("gopher://somewhere");
        assert!(resolve_store(&settings, &registry).is_ok());
    }
}
