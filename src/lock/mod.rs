pub mod factory;
pub mod fs_locks;
pub mod single_instance;
