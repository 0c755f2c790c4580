use std::collections::HashMap;
use std::sync::Arc;
use crate::core::error::Result;
use crate::core::settings::StoreSettings;
use crate::lock::factory::LockFactory;
use crate::store::backend::DirectoryStore;
use crate::wrapper::compress::CompressedWrapperProvider;
use crate::wrapper::provider::DirectoryWrapperProvider;

pub type StoreProvider =
    Arc<dyn Fn(&StoreSettings) -> Result<Arc<dyn DirectoryStore>> + Send + Sync>;
pub type LockFactoryProvider = Arc<dyn Fn(&str) -> Result<Arc<dyn LockFactory>> + Send + Sync>;
pub type WrapperProvider =
    Arc<dyn Fn(&StoreSettings) -> Result<Arc<dyn DirectoryWrapperProvider>> + Send + Sync>;

/// Extension point for custom backends, lock factories and wrapper kinds,
/// keyed by the name settings refer to them with.
pub struct ProviderRegistry {
    stores: HashMap<String, StoreProvider>,
    lock_factories: HashMap<String, LockFactoryProvider>,
    wrappers: HashMap<String, WrapperProvider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        let mut registry = ProviderRegistry {
            stores: HashMap::new(),
            lock_factories: HashMap::new(),
            wrappers: HashMap::new(),
        };
        registry.register_wrapper("compress", |_| Ok(Arc::new(CompressedWrapperProvider)));
        registry
    }

    pub fn register_store<F>(&mut self, scheme: &str, provider: F)
    where
        F: Fn(&StoreSettings) -> Result<Arc<dyn DirectoryStore>> + Send + Sync + 'static,
    {
        self.stores.insert(scheme.to_string(), Arc::new(provider));
    }

    pub fn register_lock_factory<F>(&mut self, name: &str, provider: F)
    where
        F: Fn(&str) -> Result<Arc<dyn LockFactory>> + Send + Sync + 'static,
    {
        self.lock_factories
            .insert(name.to_string(), Arc::new(provider));
    }

    pub fn register_wrapper<F>(&mut self, kind: &str, provider: F)
    where
        F: Fn(&StoreSettings) -> Result<Arc<dyn DirectoryWrapperProvider>> + Send + Sync + 'static,
    {
        self.wrappers.insert(kind.to_string(), Arc::new(provider));
    }

    pub fn store_provider(&self, scheme: &str) -> Option<StoreProvider> {
        self.stores.get(scheme).cloned()
    }

    pub fn lock_factory_provider(&self, name: &str) -> Option<LockFactoryProvider> {
        self.lock_factories.get(name).cloned()
    }

    pub fn wrapper_provider(&self, kind: &str) -> Option<WrapperProvider> {
        self.wrappers.get(kind).cloned()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
