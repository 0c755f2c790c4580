use std::any::Any;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;
use crate::core::error::Result;
use crate::core::settings::StoreSettings;
use crate::directory::dir::{BytesInput, Directory, IndexOutput, read_file};
use crate::lock::factory::{DirectoryLock, LockFactory};

struct CacheState {
    entries: LruCache<String, Arc<Vec<u8>>>,
    bytes: usize,
}

impl CacheState {
    fn insert(&mut self, name: String, data: Arc<Vec<u8>>, max_bytes: usize) {
        if let Some(old) = self.entries.put(name, Arc::clone(&data)) {
            self.bytes -= old.len();
        }
        self.bytes += data.len();
        while self.bytes > max_bytes {
            match self.entries.pop_lru() {
                Some((_, evicted)) => self.bytes -= evicted.len(),
                None => break,
            }
        }
    }

    fn invalidate(&mut self, name: &str) {
        if let Some(old) = self.entries.pop(name) {
            self.bytes -= old.len();
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.bytes = 0;
    }
}

/// Byte-bounded read cache in front of a possibly slow directory. Reads fill
/// the cache, writes and deletes invalidate, scheduled maintenance drops
/// entries whose backing file disappeared.
pub struct LocalCacheDirectory {
    inner: Box<dyn Directory>,
    state: Arc<Mutex<CacheState>>,
    max_bytes: usize,
    hit_count: AtomicUsize,
    miss_count: AtomicUsize,
}

impl LocalCacheDirectory {
    pub fn new(inner: Box<dyn Directory>, max_bytes: usize) -> Self {
        LocalCacheDirectory {
            inner,
            state: Arc::new(Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                bytes: 0,
            })),
            max_bytes,
            hit_count: AtomicUsize::new(0),
            miss_count: AtomicUsize::new(0),
        }
    }

    pub fn stats(&self) -> LocalCacheStats {
        let state = self.state.lock();
        LocalCacheStats {
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            cached_files: state.entries.len(),
            cached_bytes: state.bytes,
            max_bytes: self.max_bytes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocalCacheStats {
    pub hit_count: usize,
    pub miss_count: usize,
    pub cached_files: usize,
    pub cached_bytes: usize,
    pub max_bytes: usize,
}

impl Directory for LocalCacheDirectory {
    fn list_files(&self) -> Result<Vec<String>> {
        self.inner.list_files()
    }

    fn file_exists(&self, name: &str) -> Result<bool> {
        self.inner.file_exists(name)
    }

    fn file_len(&self, name: &str) -> Result<u64> {
        self.inner.file_len(name)
    }

    fn open_input(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        if let Some(data) = self.state.lock().entries.get(name) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return Ok(Box::new(BytesInput::new(Arc::clone(data))));
        }
        self.miss_count.fetch_add(1, Ordering::Relaxed);
        let data = Arc::new(read_file(self.inner.as_ref(), name)?);
        self.state
            .lock()
            .insert(name.to_string(), Arc::clone(&data), self.max_bytes);
        Ok(Box::new(BytesInput::new(data)))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn IndexOutput>> {
        Ok(Box::new(WriteThroughOutput {
            name: name.to_string(),
            out: self.inner.create_output(name)?,
            state: Arc::clone(&self.state),
        }))
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.state.lock().invalidate(name);
        self.inner.delete_file(name)
    }

    fn make_lock(&self, name: &str) -> Result<Box<dyn DirectoryLock>> {
        self.inner.make_lock(name)
    }

    fn clear_lock(&self, name: &str) -> Result<()> {
        self.inner.clear_lock(name)
    }

    fn set_lock_factory(&mut self, factory: Arc<dyn LockFactory>) {
        self.inner.set_lock_factory(factory);
    }

    fn close(&self) -> Result<()> {
        self.state.lock().clear();
        self.inner.close()
    }

    fn wrapped_directory(&self) -> Option<&dyn Directory> {
        Some(self.inner.as_ref())
    }

    fn clear_wrapper(&self) -> Result<()> {
        self.state.lock().clear();
        self.inner.clear_wrapper()
    }

    fn perform_scheduled_tasks(&self) -> Result<()> {
        let cached: Vec<String> = {
            let state = self.state.lock();
            state.entries.iter().map(|(name, _)| name.clone()).collect()
        };
        for name in cached {
            // Inspection failures count as gone; the entry gets refetched on
            // the next read anyway.
            if !self.inner.file_exists(&name).unwrap_or(false) {
                self.state.lock().invalidate(&name);
            }
        }
        self.inner.perform_scheduled_tasks()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct WriteThroughOutput {
    name: String,
    out: Box<dyn IndexOutput>,
    state: Arc<Mutex<CacheState>>,
}

impl Write for WriteThroughOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.out.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl IndexOutput for WriteThroughOutput {
    fn finish(&mut self) -> Result<()> {
        self.out.finish()?;
        self.state.lock().invalidate(&self.name);
        Ok(())
    }
}

/// Applies configured local cache overlays while directories are composed.
/// A sub index without an overlay (and no "*" default) passes through
/// unwrapped.
pub struct LocalCacheManager {
    limits: HashMap<String, usize>,
}

impl LocalCacheManager {
    pub fn new(settings: &StoreSettings) -> Self {
        let mut limits = HashMap::new();
        for cache in &settings.local_cache {
            limits.insert(cache.sub_index.clone(), cache.max_bytes);
        }
        LocalCacheManager { limits }
    }

    pub fn wrap(
        &self,
        sub_context: &str,
        sub_index: &str,
        dir: Box<dyn Directory>,
    ) -> Box<dyn Directory> {
        let limit = self
            .limits
            .get(sub_index)
            .or_else(|| self.limits.get("*"))
            .copied();
        match limit {
            Some(max_bytes) => {
                debug!(sub_context, sub_index, max_bytes, "installing local cache overlay");
                Box::new(LocalCacheDirectory::new(dir, max_bytes))
            }
            None => dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::dir::write_file;
    use crate::directory::ram::{RamDirectory, RamFiles};

    fn cached_ram(max_bytes: usize) -> (Arc<RamFiles>, LocalCacheDirectory) {
        let files = Arc::new(RamFiles::new());
        let dir = LocalCacheDirectory::new(
            Box::new(RamDirectory::new(Arc::clone(&files))),
            max_bytes,
        );
        (files, dir)
    }

    #[test]
    fn repeated_reads_hit_the_cache() {
        let (_files, dir) = cached_ram(1024 * 1024);
        write_file(&dir, "seg.bin", b"cached bytes").expect("write");

        assert_eq!(read_file(&dir, "seg.bin").expect("read"), b"cached bytes");
        assert_eq!(read_file(&dir, "seg.bin").expect("read"), b"cached bytes");

        let stats = dir.stats();
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.cached_files, 1);
    }

    #[test]
    fn writes_invalidate_the_cached_entry() {
        let (_files, dir) = cached_ram(1024 * 1024);
        write_file(&dir, "seg.bin", b"first").expect("write");
        assert_eq!(read_file(&dir, "seg.bin").expect("read"), b"first");

        write_file(&dir, "seg.bin", b"second").expect("rewrite");
        assert_eq!(read_file(&dir, "seg.bin").expect("read"), b"second");
    }

    #[test]
    fn eviction_keeps_bytes_under_the_cap() {
        let (_files, dir) = cached_ram(100);
        write_file(&dir, "a.bin", &vec![1u8; 60]).expect("write");
        write_file(&dir, "b.bin", &vec![2u8; 60]).expect("write");

        read_file(&dir, "a.bin").expect("read");
        read_file(&dir, "b.bin").expect("read");

        let stats = dir.stats();
        assert!(stats.cached_bytes <= 100);
        assert_eq!(stats.cached_files, 1);
    }

    #[test]
    fn maintenance_drops_entries_for_vanished_files() {
        let (files, dir) = cached_ram(1024 * 1024);
        write_file(&dir, "seg.bin", b"soon gone").expect("write");
        read_file(&dir, "seg.bin").expect("read");

        // Delete behind the cache's back.
        let raw = RamDirectory::new(files);
        raw.delete_file("seg.bin").expect("delete");

        // Still served from cache until maintenance runs.
        assert_eq!(read_file(&dir, "seg.bin").expect("read"), b"soon gone");
        dir.perform_scheduled_tasks().expect("maintenance");
        assert!(read_file(&dir, "seg.bin").is_err());
        assert_eq!(dir.stats().cached_files, 0);
    }

    #[test]
    fn clear_wrapper_empties_the_cache() {
        let (_files, dir) = cached_ram(1024 * 1024);
        write_file(&dir, "seg.bin", b"bytes").expect("write");
        read_file(&dir, "seg.bin").expect("read");
        assert_eq!(dir.stats().cached_files, 1);

        dir.clear_wrapper().expect("clear");
        let stats = dir.stats();
        assert_eq!(stats.cached_files, 0);
        assert_eq!(stats.cached_bytes, 0);
    }

    #[test]
    fn manager_wraps_only_configured_sub_indexes() {
        let settings = StoreSettings::new("ram://app").with_local_cache("posts", 4096);
        let manager = LocalCacheManager::new(&settings);

        let wrapped = manager.wrap("index", "posts", Box::new(RamDirectory::new(Arc::new(RamFiles::new()))));
        assert!(wrapped.wrapped_directory().is_some());

        let passthrough = manager.wrap("index", "users", Box::new(RamDirectory::new(Arc::new(RamFiles::new()))));
        assert!(passthrough.wrapped_directory().is_none());
    }

    #[test]
    fn star_config_covers_every_sub_index() {
        let settings = StoreSettings::new("ram://app").with_local_cache("*", 4096);
        let manager = LocalCacheManager::new(&settings);
        let wrapped = manager.wrap("index", "anything", Box::new(RamDirectory::new(Arc::new(RamFiles::new()))));
        assert!(wrapped.wrapped_directory().is_some());
    }
}
