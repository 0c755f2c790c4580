pub mod compress;
pub mod local_cache;
pub mod provider;
