pub mod core;
pub mod directory;
pub mod index;
pub mod lock;
pub mod store;
pub mod wrapper;

pub use crate::core::error::{Result, StoreError};
pub use crate::core::mapping::MappingEntry;
pub use crate::core::settings::StoreSettings;
pub use crate::directory::dir::{Directory, DirectoryHandle};
pub use crate::store::backend::DirectoryStore;
pub use crate::store::index_store::IndexStore;
pub use crate::store::registry::ProviderRegistry;

/*
┌────────────────────────────── INDEXSTORE ARCHITECTURE ──────────────────────────────┐
│                                                                                      │
│  IndexStore ──resolves──> DirectoryStore (ram / fs / mmap / sqlite / registered)     │
│      │                                                                               │
│      ├──owns──> SubIndexRegistry          // alias -> sub index mapping              │
│      │                                                                               │
│      └──owns──> DirectoryCache ──caches──> one DirectoryHandle per                   │
│                      │                     (sub context, sub index)                  │
│                      │                                                               │
│                      └──composes──> raw Directory from the backend                   │
│                                      + configured LockFactory (native_fs /           │
│                                        simple_fs / single_instance / no_locking)     │
│                                      + wrappers in configured order (compress, ...)  │
│                                      + local cache overlay (byte-bounded LRU)        │
│                                                                                      │
│  index::meta ── index.meta marker, crc sealed, with a generation counter             │
│  copy_from   ── before hook / transfer / after-success or after-failure hook         │
│                                                                                      │
└──────────────────────────────────────────────────────────────────────────────────────┘
*/
