use crate::core::error::Result;

/// A named lock inside one index directory.
pub trait DirectoryLock: Send {
    /// Try to take the lock without blocking.
    fn try_acquire(&mut self) -> Result<bool>;

    fn release(&mut self) -> Result<()>;

    fn is_locked(&self) -> Result<bool>;
}

/// Hands out locks for one index directory.
pub trait LockFactory: Send + Sync {
    fn make_lock(&self, name: &str) -> Result<Box<dyn DirectoryLock>>;

    /// Forcibly drop a lock left behind by a dead process or handle.
    fn clear_lock(&self, name: &str) -> Result<()>;
}

/// Lock strategy identifiers accepted in settings. Anything that is not a
/// built-in name resolves through the provider registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockFactoryKind {
    NativeFs,
    SimpleFs,
    SingleInstance,
    NoLocking,
    Custom(String),
}

impl LockFactoryKind {
    pub fn parse(value: &str) -> Self {
        match value {
            "native_fs" => LockFactoryKind::NativeFs,
            "simple_fs" => LockFactoryKind::SimpleFs,
            "single_instance" => LockFactoryKind::SingleInstance,
            "no_locking" => LockFactoryKind::NoLocking,
            other => LockFactoryKind::Custom(other.to_string()),
        }
    }
}

/// Factory whose locks always succeed. For setups where an external
/// coordinator already guarantees a single writer.
pub struct NoLockFactory;

impl LockFactory for NoLockFactory {
    fn make_lock(&self, _name: &str) -> Result<Box<dyn DirectoryLock>> {
        Ok(Box::new(NoLock))
    }

    fn clear_lock(&self, _name: &str) -> Result<()> {
        Ok(())
    }
}

pub struct NoLock;

impl DirectoryLock for NoLock {
    fn try_acquire(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn release(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_locked(&self) -> Result<bool> {
        Ok(false)
    }
}
