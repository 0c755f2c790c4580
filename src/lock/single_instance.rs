use std::collections::HashSet;
use std::sync::Arc;
use parking_lot::Mutex;
use crate::core::error::Result;
use crate::lock::factory::{DirectoryLock, LockFactory};

/// In-process locking over a shared name set. The default for backends that
/// only a single process can reach anyway.
pub struct SingleInstanceLockFactory {
    locks: Arc<Mutex<HashSet<String>>>,
}

impl SingleInstanceLockFactory {
    pub fn new() -> Self {
        SingleInstanceLockFactory {
            locks: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

impl Default for SingleInstanceLockFactory {
    fn default() -> Self {
        SingleInstanceLockFactory::new()
    }
}

impl LockFactory for SingleInstanceLockFactory {
    fn make_lock(&self, name: &str) -> Result<Box<dyn DirectoryLock>> {
        Ok(Box::new(SingleInstanceLock {
            name: name.to_string(),
            locks: Arc::clone(&self.locks),
            held: false,
        }))
    }

    fn clear_lock(&self, name: &str) -> Result<()> {
        self.locks.lock().remove(name);
        Ok(())
    }
}

pub struct SingleInstanceLock {
    name: String,
    locks: Arc<Mutex<HashSet<String>>>,
    held: bool,
}

impl DirectoryLock for SingleInstanceLock {
    fn try_acquire(&mut self) -> Result<bool> {
        if self.held {
            return Ok(true);
        }
        let acquired = self.locks.lock().insert(self.name.clone());
        if acquired {
            self.held = true;
        }
        Ok(acquired)
    }

    fn release(&mut self) -> Result<()> {
        if self.held {
            self.locks.lock().remove(&self.name);
            self.held = false;
        }
        Ok(())
    }

    fn is_locked(&self) -> Result<bool> {
        Ok(self.locks.lock().contains(&self.name))
    }
}

impl Drop for SingleInstanceLock {
    fn drop(&mut self) {
        if self.held {
            self.locks.lock().remove(&self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contention_within_one_factory() {
        let factory = SingleInstanceLockFactory::new();
        let mut first = factory.make_lock("write.lock").expect("lock");
        let mut second = factory.make_lock("write.lock").expect("lock");

        assert!(first.try_acquire().expect("acquire"));
        assert!(!second.try_acquire().expect("acquire"));
        assert!(first.is_locked().expect("is_locked"));

        first.release().expect("release");
        assert!(second.try_acquire().expect("acquire"));
    }

    #[test]
    fn separate_factories_do_not_contend() {
        let a = SingleInstanceLockFactory::new();
        let b = SingleInstanceLockFactory::new();
        let mut first = a.make_lock("write.lock").expect("lock");
        let mut second = b.make_lock("write.lock").expect("lock");

        assert!(first.try_acquire().expect("acquire"));
        assert!(second.try_acquire().expect("acquire"));
    }

    #[test]
    fn dropping_a_held_lock_releases_it() {
        let factory = SingleInstanceLockFactory::new();
        {
            let mut lock = factory.make_lock("write.lock").expect("lock");
            assert!(lock.try_acquire().expect("acquire"));
        }
        let mut again = factory.make_lock("write.lock").expect("lock");
        assert!(again.try_acquire().expect("acquire"));
    }
}
