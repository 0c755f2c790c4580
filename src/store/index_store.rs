use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use crate::core::error::{Result, StoreError};
use crate::core::mapping::MappingEntry;
use crate::core::settings::StoreSettings;
use crate::directory::dir::{Directory, DirectoryHandle, copy_directory, unwrap_directory};
use crate::index::meta::{self, WRITE_LOCK_NAME};
use crate::store::backend::DirectoryStore;
use crate::store::cache::{DirectoryCache, LockFactoryBuilder};
use crate::store::registry::ProviderRegistry;
use crate::store::resolver::resolve_store;
use crate::store::sub_index_registry::SubIndexRegistry;
use crate::wrapper::local_cache::LocalCacheManager;
use crate::wrapper::provider::DirectoryWrapperProvider;

/// Manages every index partition under one connection: a two level
/// namespace of sub contexts and sub indexes, with cached directory
/// handles, configured locking, wrappers, and index lifecycle on top.
///
/// Operations ending in `_in` take an explicit sub context, `_for` work in
/// the configured default, and the bare forms fan out over every mapped
/// sub index, stopping at the first failure.
pub struct IndexStore {
    settings: StoreSettings,
    sub_indexes: SubIndexRegistry,
    store: Arc<dyn DirectoryStore>,
    cache: DirectoryCache,
}

impl IndexStore {
    pub fn open(settings: StoreSettings, mappings: &[MappingEntry]) -> Result<Self> {
        IndexStore::open_with_registry(settings, mappings, &ProviderRegistry::new())
    }

    /// Like [`IndexStore::open`], resolving custom schemes, lock factories
    /// and wrapper kinds through the given registry. Every configured name
    /// resolves here, so a bad setup fails before any directory opens.
    pub fn open_with_registry(
        settings: StoreSettings,
        mappings: &[MappingEntry],
        registry: &ProviderRegistry,
    ) -> Result<Self> {
        settings.validate()?;
        let store = resolve_store(&settings, registry)?;
        let lock_builder = LockFactoryBuilder::from_settings(&settings, registry)?;

        let mut wrappers: Vec<(String, Arc<dyn DirectoryWrapperProvider>)> = Vec::new();
        for wrapper in &settings.wrappers {
            let provider_factory = registry.wrapper_provider(&wrapper.kind).ok_or_else(|| {
                StoreError::configuration(format!(
                    "unknown wrapper kind [{}] for wrapper [{}]",
                    wrapper.kind, wrapper.name
                ))
            })?;
            wrappers.push((wrapper.name.clone(), provider_factory(&settings)?));
        }

        let cache = DirectoryCache::new(
            Arc::clone(&store),
            settings.connection.clone(),
            lock_builder,
            wrappers,
            LocalCacheManager::new(&settings),
        );
        let sub_indexes = SubIndexRegistry::new(mappings);
        debug!(
            connection = %settings.connection,
            sub_context = %settings.sub_context,
            sub_indexes = sub_indexes.sub_indexes().len(),
            "index store ready"
        );

        Ok(IndexStore {
            settings,
            sub_indexes,
            store,
            cache,
        })
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn default_sub_context(&self) -> &str {
        &self.settings.sub_context
    }

    /// Every mapped sub index, sorted.
    pub fn sub_indexes(&self) -> &[String] {
        self.sub_indexes.sub_indexes()
    }

    pub fn sub_indexes_for_alias(&self, alias: &str) -> Option<&[String]> {
        self.sub_indexes.sub_indexes_for_alias(alias)
    }

    pub fn number_of_aliases_for(&self, sub_index: &str) -> usize {
        self.sub_indexes.number_of_aliases_for(sub_index)
    }

    /// Resolve a mixed selection of explicit sub indexes and aliases into
    /// the sub indexes to operate on.
    pub fn calc_sub_indexes(
        &self,
        sub_indexes: Option<&[&str]>,
        aliases: Option<&[&str]>,
    ) -> Result<Vec<String>> {
        self.sub_indexes.calc_sub_indexes(sub_indexes, aliases)
    }

    /// Cached directory handle in the default sub context.
    pub fn open_directory(&self, sub_index: &str) -> Result<DirectoryHandle> {
        self.open_directory_in(&self.settings.sub_context, sub_index)
    }

    pub fn open_directory_in(&self, sub_context: &str, sub_index: &str) -> Result<DirectoryHandle> {
        self.cache
            .open(sub_context, sub_index)
            .map_err(|err| err.wrap_storage("open directory", sub_context, sub_index))
    }

    fn with_directory<T>(
        &self,
        operation: &str,
        sub_context: &str,
        sub_index: &str,
        f: impl FnOnce(&dyn Directory) -> Result<T>,
    ) -> Result<T> {
        let run = || -> Result<T> {
            let dir = self.cache.open(sub_context, sub_index)?;
            f(dir.as_ref())
        };
        run().map_err(|err| err.wrap_storage(operation, sub_context, sub_index))
    }

    pub fn index_exists_for(&self, sub_index: &str) -> Result<bool> {
        self.index_exists_in(&self.settings.sub_context, sub_index)
    }

    /// Does a usable index live in this partition? Backends with an
    /// authoritative answer give it; everyone else is probed through the
    /// directory. A probe that had to open the directory closes it again,
    /// so checking existence never populates the cache.
    pub fn index_exists_in(&self, sub_context: &str, sub_index: &str) -> Result<bool> {
        let was_cached = self.cache.is_cached(sub_context, sub_index);
        let probe = || -> Result<bool> {
            let dir = self.cache.open(sub_context, sub_index)?;
            Ok(match self.store.index_exists(unwrap_directory(dir.as_ref())) {
                Some(exists) => exists,
                None => meta::index_exists(dir.as_ref()),
            })
        };
        let result = probe();
        if !was_cached {
            self.cache.close(sub_context, sub_index);
        }
        result.map_err(|err| err.wrap_storage("check index existence", sub_context, sub_index))
    }

    pub fn create_index_for(&self, sub_index: &str) -> Result<()> {
        self.create_index_in(&self.settings.sub_context, sub_index)
    }

    pub fn create_index_in(&self, sub_context: &str, sub_index: &str) -> Result<()> {
        self.with_directory("create index", sub_context, sub_index, |dir| {
            meta::create_index(dir)
        })
    }

    pub fn delete_index_for(&self, sub_index: &str) -> Result<()> {
        self.delete_index_in(&self.settings.sub_context, sub_index)
    }

    pub fn delete_index_in(&self, sub_context: &str, sub_index: &str) -> Result<()> {
        let result = (|| -> Result<()> {
            let dir = self.cache.open(sub_context, sub_index)?;
            self.store
                .delete_index(unwrap_directory(dir.as_ref()), sub_context, sub_index)
        })();
        // The cached handle points at deleted storage either way.
        self.cache.close(sub_context, sub_index);
        result.map_err(|err| err.wrap_storage("delete index", sub_context, sub_index))
    }

    pub fn verify_index_for(&self, sub_index: &str) -> Result<bool> {
        self.verify_index_in(&self.settings.sub_context, sub_index)
    }

    /// Create the index unless it already exists. `true` when created.
    pub fn verify_index_in(&self, sub_context: &str, sub_index: &str) -> Result<bool> {
        if self.index_exists_in(sub_context, sub_index)? {
            return Ok(false);
        }
        self.create_index_in(sub_context, sub_index)?;
        Ok(true)
    }

    pub fn clean_index_for(&self, sub_index: &str) -> Result<()> {
        self.clean_index_in(&self.settings.sub_context, sub_index)
    }

    /// Wipe a partition down to backend storage and recreate it empty. The
    /// wipe runs on a fresh raw handle so wrappers and cached overlays never
    /// see the intermediate state.
    pub fn clean_index_in(&self, sub_context: &str, sub_index: &str) -> Result<()> {
        let result = (|| -> Result<()> {
            let dir = self.store.open(sub_context, sub_index)?;
            let outcome = self.store.clean_index(dir.as_ref(), sub_context, sub_index);
            if let Err(err) = self.store.close_directory(dir.as_ref(), sub_context, sub_index) {
                warn!(sub_context, sub_index, error = %err, "failed to close directory after clean");
            }
            outcome
        })();
        self.cache.close(sub_context, sub_index);
        result.map_err(|err| err.wrap_storage("clean index", sub_context, sub_index))?;
        self.create_index_in(sub_context, sub_index)
    }

    pub fn is_locked_for(&self, sub_index: &str) -> Result<bool> {
        self.is_locked_in(&self.settings.sub_context, sub_index)
    }

    pub fn is_locked_in(&self, sub_context: &str, sub_index: &str) -> Result<bool> {
        self.with_directory("check lock", sub_context, sub_index, |dir| {
            dir.make_lock(WRITE_LOCK_NAME)?.is_locked()
        })
    }

    pub fn release_lock_for(&self, sub_index: &str) -> Result<()> {
        self.release_lock_in(&self.settings.sub_context, sub_index)
    }

    /// Forcibly drop the write lock, e.g. after a crashed writer.
    pub fn release_lock_in(&self, sub_context: &str, sub_index: &str) -> Result<()> {
        self.with_directory("release lock", sub_context, sub_index, |dir| {
            dir.clear_lock(WRITE_LOCK_NAME)
        })
    }

    /// `true` only when every mapped sub index has an index.
    pub fn index_exists(&self) -> Result<bool> {
        for sub_index in self.sub_indexes.sub_indexes() {
            if !self.index_exists_for(sub_index)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn create_index(&self) -> Result<()> {
        for sub_index in self.sub_indexes.sub_indexes() {
            self.create_index_for(sub_index)?;
        }
        Ok(())
    }

    pub fn delete_index(&self) -> Result<()> {
        for sub_index in self.sub_indexes.sub_indexes() {
            self.delete_index_for(sub_index)?;
        }
        Ok(())
    }

    /// Create every missing index. `true` when at least one was created.
    pub fn verify_index(&self) -> Result<bool> {
        let mut created = false;
        for sub_index in self.sub_indexes.sub_indexes() {
            if self.verify_index_for(sub_index)? {
                created = true;
            }
        }
        Ok(created)
    }

    pub fn clean_index(&self) -> Result<()> {
        for sub_index in self.sub_indexes.sub_indexes() {
            self.clean_index_for(sub_index)?;
        }
        Ok(())
    }

    /// `true` when any mapped sub index holds the write lock.
    pub fn is_locked(&self) -> Result<bool> {
        for sub_index in self.sub_indexes.sub_indexes() {
            if self.is_locked_for(sub_index)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn release_locks(&self) -> Result<()> {
        for sub_index in self.sub_indexes.sub_indexes() {
            self.release_lock_for(sub_index)?;
        }
        Ok(())
    }

    /// Replace the contents of every mapped sub index with the matching
    /// partition of `source`. The backend's copy hooks bracket the transfer:
    /// on failure the abort hook runs and the error propagates with the
    /// destinations left in their marked-incomplete state.
    pub fn copy_from(&self, source: &IndexStore) -> Result<()> {
        let sub_context = self.default_sub_context();
        let mut targets: Vec<(String, DirectoryHandle)> = Vec::new();
        for sub_index in self.sub_indexes.sub_indexes() {
            let dir = self.open_directory_in(sub_context, sub_index)?;
            dir.clear_wrapper()
                .map_err(|err| err.wrap_storage("clear wrappers", sub_context, sub_index))?;
            targets.push((sub_index.clone(), dir));
        }
        let raw: Vec<(&str, &dyn Directory)> = targets
            .iter()
            .map(|(name, dir)| (name.as_str(), unwrap_directory(dir.as_ref())))
            .collect();

        let holder = self.store.before_copy_from(sub_context, &raw)?;
        match self.copy_all(source, sub_context, &targets) {
            Ok(()) => self.store.after_successful_copy_from(sub_context, &raw, holder),
            Err(err) => {
                self.store.after_failed_copy_from(sub_context, &raw, holder);
                Err(err)
            }
        }
    }

    fn copy_all(
        &self,
        source: &IndexStore,
        sub_context: &str,
        targets: &[(String, DirectoryHandle)],
    ) -> Result<()> {
        for (sub_index, dest) in targets {
            let src = source.open_directory_in(source.default_sub_context(), sub_index)?;
            copy_directory(src.as_ref(), dest.as_ref(), self.settings.copy_buffer_size)
                .map_err(|err| err.wrap_storage("copy index", sub_context, sub_index))?;
        }
        Ok(())
    }

    /// Close every cached directory and shut the backend down. Failures are
    /// logged; close never raises.
    pub fn close(&self) {
        debug!(connection = %self.settings.connection, "closing index store");
        self.cache.close_all();
        self.store.close();
    }

    /// Run periodic maintenance over every cached directory and the backend.
    pub fn perform_scheduled_tasks(&self) -> Result<()> {
        self.cache.perform_scheduled_tasks()
    }
}

impl fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexStore")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for IndexStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "index store [{}][{}] sub indexes [{}]",
            self.settings.connection,
            self.settings.sub_context,
            self.sub_indexes.sub_indexes().join(", ")
        )
    }
}
