use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::PathBuf;
use crate::core::error::Result;
use crate::lock::factory::{DirectoryLock, LockFactory};

enum FlockOp {
    Exclusive,
    Unlock,
}

fn flock(file: &File, op: FlockOp) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        use libc::{LOCK_EX, LOCK_NB, LOCK_UN, flock};

        let operation = match op {
            FlockOp::Exclusive => LOCK_EX | LOCK_NB,
            FlockOp::Unlock => LOCK_UN,
        };
        unsafe { flock(file.as_raw_fd(), operation) == 0 }
    }
    #[cfg(not(unix))]
    {
        let _ = (file, op);
        true
    }
}

/// Lock factory backed by OS advisory locks. Locks vanish with the owning
/// process, so crashes never leave the index permanently locked.
pub struct NativeFsLockFactory {
    lock_dir: PathBuf,
}

impl NativeFsLockFactory {
    pub fn new(lock_dir: impl Into<PathBuf>) -> Result<Self> {
        let lock_dir = lock_dir.into();
        fs::create_dir_all(&lock_dir)?;
        Ok(NativeFsLockFactory { lock_dir })
    }
}

impl LockFactory for NativeFsLockFactory {
    fn make_lock(&self, name: &str) -> Result<Box<dyn DirectoryLock>> {
        Ok(Box::new(NativeFsLock {
            path: self.lock_dir.join(name),
            file: None,
        }))
    }

    fn clear_lock(&self, name: &str) -> Result<()> {
        let path = self.lock_dir.join(name);
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

pub struct NativeFsLock {
    path: PathBuf,
    file: Option<File>,
}

impl DirectoryLock for NativeFsLock {
    fn try_acquire(&mut self) -> Result<bool> {
        if self.file.is_some() {
            return Ok(true);
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.path)?;
        if flock(&file, FlockOp::Exclusive) {
            self.file = Some(file);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn release(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            flock(&file, FlockOp::Unlock);
        }
        Ok(())
    }

    fn is_locked(&self) -> Result<bool> {
        if self.file.is_some() {
            return Ok(true);
        }
        if !self.path.exists() {
            return Ok(false);
        }
        // Probe by taking and immediately dropping the flock.
        let file = File::open(&self.path)?;
        if flock(&file, FlockOp::Exclusive) {
            flock(&file, FlockOp::Unlock);
            Ok(false)
        } else {
            Ok(true)
        }
    }
}

impl Drop for NativeFsLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            flock(&file, FlockOp::Unlock);
        }
    }
}

/// Lock factory based on lock file existence. Portable, but a crash can
/// leave a stale lock file behind that needs `clear_lock`.
pub struct SimpleFsLockFactory {
    lock_dir: PathBuf,
}

impl SimpleFsLockFactory {
    pub fn new(lock_dir: impl Into<PathBuf>) -> Result<Self> {
        let lock_dir = lock_dir.into();
        fs::create_dir_all(&lock_dir)?;
        Ok(SimpleFsLockFactory { lock_dir })
    }
}

impl LockFactory for SimpleFsLockFactory {
    fn make_lock(&self, name: &str) -> Result<Box<dyn DirectoryLock>> {
        Ok(Box::new(SimpleFsLock {
            path: self.lock_dir.join(name),
            held: false,
        }))
    }

    fn clear_lock(&self, name: &str) -> Result<()> {
        let path = self.lock_dir.join(name);
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

pub struct SimpleFsLock {
    path: PathBuf,
    held: bool,
}

impl DirectoryLock for SimpleFsLock {
    fn try_acquire(&mut self) -> Result<bool> {
        if self.held {
            return Ok(true);
        }
        match OpenOptions::new().create_new(true).write(true).open(&self.path) {
            Ok(_) => {
                self.held = true;
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn release(&mut self) -> Result<()> {
        if !self.held {
            return Ok(());
        }
        self.held = false;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            // Already cleared from the outside.
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn is_locked(&self) -> Result<bool> {
        Ok(self.path.exists())
    }
}
