pub mod backend;
pub mod cache;
pub mod fs_store;
pub mod index_store;
pub mod mmap_store;
pub mod ram_store;
pub mod registry;
pub mod resolver;
pub mod sqlite_store;
pub mod sub_index_registry;
