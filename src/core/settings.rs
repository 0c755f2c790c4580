use std::collections::HashMap;
use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::core::error::{Result, StoreError};

pub const DEFAULT_SUB_CONTEXT: &str = "index";
pub const DEFAULT_COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Store configuration. The connection string picks the physical backend,
/// everything else tunes locking, wrapping and caching around it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Backend connection string, e.g. `file:///var/data/index`, `ram://app`,
    /// `mmap:///var/data/index`, `sqlite:///var/data/index.db` or a custom
    /// registered scheme. A bare path selects the filesystem backend.
    pub connection: String,

    /// Namespace under the connection that this store manages.
    #[serde(default = "default_sub_context")]
    pub sub_context: String,

    /// Lock strategy override. When unset each backend keeps its own default.
    #[serde(default)]
    pub lock_factory: Option<LockFactorySettings>,

    /// Transparent directory wrappers, applied in order around the raw
    /// directory.
    #[serde(default)]
    pub wrappers: Vec<WrapperSettings>,

    /// Local cache overlays, keyed by sub index ("*" covers all of them).
    #[serde(default)]
    pub local_cache: Vec<LocalCacheSettings>,

    /// Transfer buffer size for index replication.
    #[serde(default = "default_copy_buffer_size")]
    pub copy_buffer_size: usize,

    /// Free-form settings consumed by custom backends and wrappers.
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockFactorySettings {
    /// One of `native_fs`, `simple_fs`, `single_instance`, `no_locking`, or
    /// a registered custom name.
    pub kind: String,

    /// Lock directory template. `#subindex#` and `#subcontext#` expand per
    /// partition. Defaults to `<connection>/<sub_context>/<sub_index>`.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrapperSettings {
    /// Name of this wrapper instance, for diagnostics.
    pub name: String,
    /// Wrapper kind: `compress` is built in, anything else resolves through
    /// the provider registry.
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalCacheSettings {
    pub sub_index: String,
    pub max_bytes: usize,
}

fn default_sub_context() -> String {
    DEFAULT_SUB_CONTEXT.to_string()
}

fn default_copy_buffer_size() -> usize {
    DEFAULT_COPY_BUFFER_SIZE
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            connection: String::new(),
            sub_context: default_sub_context(),
            lock_factory: None,
            wrappers: Vec::new(),
            local_cache: Vec::new(),
            copy_buffer_size: default_copy_buffer_size(),
            extra: HashMap::new(),
        }
    }
}

impl StoreSettings {
    pub fn new(connection: impl Into<String>) -> Self {
        StoreSettings {
            connection: connection.into(),
            ..StoreSettings::default()
        }
    }

    pub fn with_sub_context(mut self, sub_context: impl Into<String>) -> Self {
        self.sub_context = sub_context.into();
        self
    }

    pub fn with_lock_factory(mut self, kind: impl Into<String>, path: Option<String>) -> Self {
        self.lock_factory = Some(LockFactorySettings {
            kind: kind.into(),
            path,
        });
        self
    }

    pub fn with_wrapper(mut self, name: impl Into<String>, kind: impl Into<String>) -> Self {
        self.wrappers.push(WrapperSettings {
            name: name.into(),
            kind: kind.into(),
        });
        self
    }

    pub fn with_local_cache(mut self, sub_index: impl Into<String>, max_bytes: usize) -> Self {
        self.local_cache.push(LocalCacheSettings {
            sub_index: sub_index.into(),
            max_bytes,
        });
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|err| StoreError::configuration(format!("invalid settings json: {err}")))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        StoreSettings::from_json_str(&data)
    }

    /// Fails on settings that can never produce a working store.
    pub fn validate(&self) -> Result<()> {
        if self.connection.is_empty() {
            return Err(StoreError::configuration("connection must be set"));
        }
        if self.sub_context.is_empty() {
            return Err(StoreError::configuration("sub context must not be empty"));
        }
        if self.copy_buffer_size == 0 {
            return Err(StoreError::configuration("copy buffer size must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_settings_fill_in_defaults() {
        let settings = StoreSettings::from_json_str(r#"{"connection": "ram://app"}"#)
            .expect("settings should parse");
        assert_eq!(settings.connection, "ram://app");
        assert_eq!(settings.sub_context, DEFAULT_SUB_CONTEXT);
        assert_eq!(settings.copy_buffer_size, DEFAULT_COPY_BUFFER_SIZE);
        assert!(settings.lock_factory.is_none());
        assert!(settings.wrappers.is_empty());
    }

    #[test]
    fn empty_connection_is_rejected() {
        let err = StoreSettings::default().validate().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn builder_style_settings() {
        let settings = StoreSettings::new("file:///tmp/idx")
            .with_sub_context("search")
            .with_lock_factory("simple_fs", None)
            .with_wrapper("zip", "compress");
        assert_eq!(settings.sub_context, "search");
        assert_eq!(settings.wrappers.len(), 1);
        assert_eq!(settings.wrappers[0].kind, "compress");
        settings.validate().expect("settings should be valid");
    }
}
