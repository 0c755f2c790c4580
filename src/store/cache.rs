use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};
use crate::core::error::{Result, StoreError};
use crate::core::settings::StoreSettings;
use crate::directory::dir::{Directory, DirectoryHandle, unwrap_directory};
use crate::lock::factory::{LockFactory, LockFactoryKind, NoLockFactory};
use crate::lock::fs_locks::{NativeFsLockFactory, SimpleFsLockFactory};
use crate::lock::single_instance::SingleInstanceLockFactory;
use crate::store::backend::DirectoryStore;
use crate::store::registry::{LockFactoryProvider, ProviderRegistry};
use crate::wrapper::local_cache::LocalCacheManager;
use crate::wrapper::provider::DirectoryWrapperProvider;

enum LockBuilderKind {
    /// Keep whatever lock factory the backend installed.
    BackendDefault,
    NativeFs,
    SimpleFs,
    SingleInstance,
    NoLocking,
    Custom(LockFactoryProvider),
}

/// Builds the configured lock factory for one partition. The lock directory
/// comes from the settings template (`#subcontext#`/`#subindex#` expanded)
/// or defaults to the partition path under the connection.
pub struct LockFactoryBuilder {
    kind: LockBuilderKind,
    path_template: Option<String>,
}

impl LockFactoryBuilder {
    pub fn backend_default() -> Self {
        LockFactoryBuilder {
            kind: LockBuilderKind::BackendDefault,
            path_template: None,
        }
    }

    pub fn from_settings(settings: &StoreSettings, registry: &ProviderRegistry) -> Result<Self> {
        let Some(lock_settings) = &settings.lock_factory else {
            return Ok(LockFactoryBuilder::backend_default());
        };
        let kind = match LockFactoryKind::parse(&lock_settings.kind) {
            LockFactoryKind::NativeFs => LockBuilderKind::NativeFs,
            LockFactoryKind::SimpleFs => LockBuilderKind::SimpleFs,
            LockFactoryKind::SingleInstance => LockBuilderKind::SingleInstance,
            LockFactoryKind::NoLocking => LockBuilderKind::NoLocking,
            LockFactoryKind::Custom(name) => {
                let provider = registry.lock_factory_provider(&name).ok_or_else(|| {
                    StoreError::configuration(format!("unknown lock factory [{name}]"))
                })?;
                LockBuilderKind::Custom(provider)
            }
        };
        Ok(LockFactoryBuilder {
            kind,
            path_template: lock_settings.path.clone(),
        })
    }

    fn lock_path(&self, connection: &str, sub_context: &str, sub_index: &str) -> String {
        match &self.path_template {
            Some(template) => template
                .replace("#subcontext#", sub_context)
                .replace("#subindex#", sub_index),
            None => {
                let base = connection
                    .strip_prefix("file://")
                    .or_else(|| connection.strip_prefix("mmap://"))
                    .unwrap_or(connection);
                format!("{base}/{sub_context}/{sub_index}")
            }
        }
    }

    /// `None` keeps the backend's own lock factory.
    pub fn build_for(
        &self,
        connection: &str,
        sub_context: &str,
        sub_index: &str,
    ) -> Result<Option<Arc<dyn LockFactory>>> {
        match &self.kind {
            LockBuilderKind::BackendDefault => Ok(None),
            LockBuilderKind::NativeFs => Ok(Some(Arc::new(NativeFsLockFactory::new(
                self.lock_path(connection, sub_context, sub_index),
            )?))),
            LockBuilderKind::SimpleFs => Ok(Some(Arc::new(SimpleFsLockFactory::new(
                self.lock_path(connection, sub_context, sub_index),
            )?))),
            LockBuilderKind::SingleInstance => Ok(Some(Arc::new(SingleInstanceLockFactory::new()))),
            LockBuilderKind::NoLocking => Ok(Some(Arc::new(NoLockFactory))),
            LockBuilderKind::Custom(provider) => {
                provider(&self.lock_path(connection, sub_context, sub_index)).map(Some)
            }
        }
    }
}

impl fmt::Debug for LockFactoryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFactoryBuilder")
            .field("path_template", &self.path_template)
            .finish_non_exhaustive()
    }
}

struct SubContextDirs {
    dirs: RwLock<HashMap<String, DirectoryHandle>>,
    /// Serializes directory composition within one sub context.
    open_lock: Mutex<()>,
}

impl Default for SubContextDirs {
    fn default() -> Self {
        SubContextDirs {
            dirs: RwLock::new(HashMap::new()),
            open_lock: Mutex::new(()),
        }
    }
}

/// Cache of composed directory handles, one per (sub context, sub index).
/// Lookups take a read lock; the first open of a partition composes the
/// directory exactly once while concurrent readers of other partitions stay
/// unblocked.
pub struct DirectoryCache {
    store: Arc<dyn DirectoryStore>,
    contexts: RwLock<HashMap<String, Arc<SubContextDirs>>>,
    connection: String,
    lock_builder: LockFactoryBuilder,
    wrappers: Vec<(String, Arc<dyn DirectoryWrapperProvider>)>,
    local_cache: LocalCacheManager,
}

impl DirectoryCache {
    pub fn new(
        store: Arc<dyn DirectoryStore>,
        connection: impl Into<String>,
        lock_builder: LockFactoryBuilder,
        wrappers: Vec<(String, Arc<dyn DirectoryWrapperProvider>)>,
        local_cache: LocalCacheManager,
    ) -> Self {
        DirectoryCache {
            store,
            contexts: RwLock::new(HashMap::new()),
            connection: connection.into(),
            lock_builder,
            wrappers,
            local_cache,
        }
    }

    fn context(&self, sub_context: &str) -> Arc<SubContextDirs> {
        if let Some(context) = self.contexts.read().get(sub_context) {
            return Arc::clone(context);
        }
        let mut contexts = self.contexts.write();
        Arc::clone(contexts.entry(sub_context.to_string()).or_default())
    }

    pub fn is_cached(&self, sub_context: &str, sub_index: &str) -> bool {
        self.contexts
            .read()
            .get(sub_context)
            .map(|context| context.dirs.read().contains_key(sub_index))
            .unwrap_or(false)
    }

    /// Cached handle, or compose and cache one.
    pub fn open(&self, sub_context: &str, sub_index: &str) -> Result<DirectoryHandle> {
        let context = self.context(sub_context);
        if let Some(dir) = context.dirs.read().get(sub_index) {
            return Ok(Arc::clone(dir));
        }
        let _guard = context.open_lock.lock();
        // Someone may have composed it while we waited for the open lock.
        if let Some(dir) = context.dirs.read().get(sub_index) {
            return Ok(Arc::clone(dir));
        }
        let dir: DirectoryHandle = Arc::from(self.compose(sub_context, sub_index)?);
        context
            .dirs
            .write()
            .insert(sub_index.to_string(), Arc::clone(&dir));
        Ok(dir)
    }

    fn compose(&self, sub_context: &str, sub_index: &str) -> Result<Box<dyn Directory>> {
        debug!(sub_context, sub_index, connection = %self.connection, "opening directory");
        let mut dir = self.store.open(sub_context, sub_index)?;
        if let Some(factory) =
            self.lock_builder
                .build_for(&self.connection, sub_context, sub_index)?
        {
            dir.set_lock_factory(factory);
        }
        for (name, provider) in &self.wrappers {
            debug!(sub_context, sub_index, wrapper = %name, "applying directory wrapper");
            dir = provider.wrap(sub_index, dir)?;
        }
        Ok(self.local_cache.wrap(sub_context, sub_index, dir))
    }

    /// Evict and close one partition. `true` when a cached handle was there.
    pub fn close(&self, sub_context: &str, sub_index: &str) -> bool {
        let Some(context) = self.contexts.read().get(sub_context).map(Arc::clone) else {
            return false;
        };
        let _guard = context.open_lock.lock();
        let removed = context.dirs.write().remove(sub_index);
        match removed {
            Some(dir) => {
                if let Err(err) = self.store.close_directory(dir.as_ref(), sub_context, sub_index)
                {
                    warn!(sub_context, sub_index, error = %err, "failed to close directory");
                }
                true
            }
            None => false,
        }
    }

    /// Evict and close everything. Close failures are logged, not raised, so
    /// one bad partition cannot keep the rest open.
    pub fn close_all(&self) {
        let contexts: Vec<(String, Arc<SubContextDirs>)> = self
            .contexts
            .read()
            .iter()
            .map(|(name, context)| (name.clone(), Arc::clone(context)))
            .collect();
        for (sub_context, context) in contexts {
            let _guard = context.open_lock.lock();
            let dirs: Vec<(String, DirectoryHandle)> = context.dirs.write().drain().collect();
            for (sub_index, dir) in dirs {
                debug!(sub_context = %sub_context, sub_index = %sub_index, "closing directory");
                if let Err(err) =
                    self.store
                        .close_directory(dir.as_ref(), &sub_context, &sub_index)
                {
                    warn!(
                        sub_context = %sub_context,
                        sub_index = %sub_index,
                        error = %err,
                        "failed to close directory"
                    );
                }
            }
        }
        self.contexts.write().clear();
    }

    /// Run directory and backend maintenance over every cached partition.
    pub fn perform_scheduled_tasks(&self) -> Result<()> {
        let contexts: Vec<(String, Arc<SubContextDirs>)> = self
            .contexts
            .read()
            .iter()
            .map(|(name, context)| (name.clone(), Arc::clone(context)))
            .collect();
        for (sub_context, context) in contexts {
            let _guard = context.open_lock.lock();
            let dirs: Vec<(String, DirectoryHandle)> = context
                .dirs
                .read()
                .iter()
                .map(|(name, dir)| (name.clone(), Arc::clone(dir)))
                .collect();
            for (sub_index, dir) in dirs {
                dir.perform_scheduled_tasks().map_err(|err| {
                    err.wrap_storage("perform scheduled tasks", &sub_context, &sub_index)
                })?;
                self.store
                    .perform_scheduled_tasks(
                        unwrap_directory(dir.as_ref()),
                        &sub_context,
                        &sub_index,
                    )
                    .map_err(|err| {
                        err.wrap_storage("perform scheduled tasks", &sub_context, &sub_index)
                    })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use crate::store::ram_store::RamDirectoryStore;
    use crate::wrapper::compress::CompressedWrapperProvider;

    struct CountingStore {
        inner: RamDirectoryStore,
        opens: AtomicUsize,
    }

    impl CountingStore {
        fn new() -> Self {
            CountingStore {
                inner: RamDirectoryStore::new(),
                opens: AtomicUsize::new(0),
            }
        }
    }

    impl DirectoryStore for CountingStore {
        fn open(&self, sub_context: &str, sub_index: &str) -> Result<Box<dyn Directory>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.inner.open(sub_context, sub_index)
        }

        fn delete_index(
            &self,
            dir: &dyn Directory,
            sub_context: &str,
            sub_index: &str,
        ) -> Result<()> {
            self.inner.delete_index(dir, sub_context, sub_index)
        }

        fn clean_index(
            &self,
            dir: &dyn Directory,
            sub_context: &str,
            sub_index: &str,
        ) -> Result<()> {
            self.inner.clean_index(dir, sub_context, sub_index)
        }
    }

    fn cache_over(store: Arc<dyn DirectoryStore>) -> DirectoryCache {
        DirectoryCache::new(
            store,
            "ram://cache-tests",
            LockFactoryBuilder::backend_default(),
            Vec::new(),
            LocalCacheManager::new(&StoreSettings::new("ram://cache-tests")),
        )
    }

    #[test]
    fn concurrent_opens_compose_exactly_once() {
        let store = Arc::new(CountingStore::new());
        let cache = cache_over(Arc::clone(&store) as _);

        let handles: Vec<DirectoryHandle> = thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| cache.open("index", "posts").expect("open")))
                .collect();
            workers.into_iter().map(|w| w.join().expect("join")).collect()
        });

        assert_eq!(store.opens.load(Ordering::SeqCst), 1);
        for dir in &handles[1..] {
            assert!(Arc::ptr_eq(&handles[0], dir));
        }
    }

    #[test]
    fn close_evicts_and_reopen_composes_fresh() {
        let store = Arc::new(CountingStore::new());
        let cache = cache_over(Arc::clone(&store) as _);

        let first = cache.open("index", "posts").expect("open");
        assert!(cache.is_cached("index", "posts"));
        assert!(cache.close("index", "posts"));
        assert!(!cache.is_cached("index", "posts"));
        assert!(!cache.close("index", "posts"));

        let second = cache.open("index", "posts").expect("reopen");
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(store.opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn sub_contexts_are_cached_independently() {
        let cache = cache_over(Arc::new(RamDirectoryStore::new()));
        cache.open("index", "posts").expect("open");
        cache.open("mirror", "posts").expect("open");

        assert!(cache.is_cached("index", "posts"));
        assert!(cache.is_cached("mirror", "posts"));
        cache.close("index", "posts");
        assert!(cache.is_cached("mirror", "posts"));
    }

    #[test]
    fn wrappers_apply_during_composition() {
        let wrappers: Vec<(String, Arc<dyn DirectoryWrapperProvider>)> =
            vec![("zip".to_string(), Arc::new(CompressedWrapperProvider))];
        let cache = DirectoryCache::new(
            Arc::new(RamDirectoryStore::new()),
            "ram://cache-tests",
            LockFactoryBuilder::backend_default(),
            wrappers,
            LocalCacheManager::new(&StoreSettings::new("ram://cache-tests")),
        );

        let dir = cache.open("index", "posts").expect("open");
        assert!(dir.wrapped_directory().is_some());
    }

    #[test]
    fn lock_path_template_expands_per_partition() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let template = format!("{}/#subcontext#/#subindex#", tmp.path().display());
        let settings = StoreSettings::new("ram://cache-tests")
            .with_lock_factory("simple_fs", Some(template));
        let builder =
            LockFactoryBuilder::from_settings(&settings, &ProviderRegistry::new()).expect("builder");

        let factory = builder
            .build_for("ram://cache-tests", "index", "posts")
            .expect("build")
            .expect("configured factory");
        let mut lock = factory.make_lock("write.lock").expect("lock");
        assert!(lock.try_acquire().expect("acquire"));
        assert!(tmp.path().join("index/posts/write.lock").is_file());
        lock.release().expect("release");
    }

    #[test]
    fn unknown_custom_lock_factory_is_a_configuration_error() {
        let settings = StoreSettings::new("ram://cache-tests").with_lock_factory("zk", None);
        let err =
            LockFactoryBuilder::from_settings(&settings, &ProviderRegistry::new()).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("zk"));
    }
}
