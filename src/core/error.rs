use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the index store layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Invalid settings detected while building the store. Always fatal,
    /// raised before any index operation runs.
    #[error("invalid store configuration: {message}")]
    Configuration { message: String },

    /// An alias that no mapping entry declares.
    #[error("no sub index mapped to alias [{alias}]")]
    UnknownAlias { alias: String },

    /// An index operation failed against physical storage. Carries the
    /// sub context and sub index so callers can tell which partition broke.
    #[error("failed to {operation} for sub context [{sub_context}] sub index [{sub_index}]")]
    Storage {
        operation: String,
        sub_context: String,
        sub_index: String,
        #[source]
        source: Box<StoreError>,
    },

    #[error("lock [{name}] {reason}")]
    Lock { name: String, reason: String },

    /// Stored bytes that fail checksum or framing validation.
    #[error("[{name}] is corrupt: {detail}")]
    Corrupt { name: String, detail: String },

    #[error("file [{name}] not found in directory")]
    FileNotFound { name: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Meta(#[from] bincode::Error),
}

impl StoreError {
    pub fn configuration(message: impl Into<String>) -> Self {
        StoreError::Configuration {
            message: message.into(),
        }
    }

    pub fn unknown_alias(alias: impl Into<String>) -> Self {
        StoreError::UnknownAlias {
            alias: alias.into(),
        }
    }

    pub fn lock(name: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Lock {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn corrupt(name: impl Into<String>, detail: impl Into<String>) -> Self {
        StoreError::Corrupt {
            name: name.into(),
            detail: detail.into(),
        }
    }

    pub fn file_not_found(name: impl Into<String>) -> Self {
        StoreError::FileNotFound { name: name.into() }
    }

    pub fn storage(
        operation: impl Into<String>,
        sub_context: impl Into<String>,
        sub_index: impl Into<String>,
        source: StoreError,
    ) -> Self {
        StoreError::Storage {
            operation: operation.into(),
            sub_context: sub_context.into(),
            sub_index: sub_index.into(),
            source: Box::new(source),
        }
    }

    /// Attach the partition key to a low level cause. Errors that already
    /// identify their partition, or that predate any partition (configuration,
    /// alias resolution), pass through untouched.
    pub fn wrap_storage(self, operation: &str, sub_context: &str, sub_index: &str) -> Self {
        match self {
            err @ (StoreError::Storage { .. }
            | StoreError::Configuration { .. }
            | StoreError::UnknownAlias { .. }) => err,
            other => StoreError::storage(operation, sub_context, sub_index, other),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, StoreError::Configuration { .. })
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, StoreError::Storage { .. })
    }
}
