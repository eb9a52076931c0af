//! Shared mmap-backed static file cache (spec §3 "File cache", §4.4).
//!
//! Ported from the original `zener::FileCache` (`include/http/file_cache.h`):
//! a path-keyed table of refcounted mappings guarded by a single
//! multi-reader/single-writer lock (`parking_lot::RwLock`, following
//! epheo-kiss's use of `parking_lot` throughout its own shared state), with
//! mtime-based invalidation and an idle sweep driven by the timer service
//! instead of a dedicated cache-reaper thread.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use memmap2::Mmap;
use parking_lot::RwLock;

use crate::error::{CoreError, Result};

/// A single cached mapping. Cloning an `Arc<Mapped>` is how a response body
/// span borrows the file's bytes without copying them; `Arc::strong_count`
/// doubles as the atomic acquire/release refcount spec §4.4 calls for — a
/// dropped response body is a release, with no separate bookkeeping to get
/// out of sync with it.
pub struct Mapped {
    body: Body,
    mtime: SystemTime,
}

/// `memmap2` refuses to map a zero-length file, so an empty body is kept as
/// a plain empty slice instead of a degenerate mapping.
enum Body {
    Mapped(Mmap),
    Empty,
}

impl Mapped {
    pub fn bytes(&self) -> &[u8] {
        match &self.body {
            Body::Mapped(m) => m,
            Body::Empty => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }
}

struct Slot {
    mapped: Arc<Mapped>,
    last_used: Instant,
}

/// Bound on how many idle entries a single sweep evicts, mirroring the
/// timer service's own per-tick cap so a cold cache doesn't stall the
/// reactor loop processing a large backlog in one go.
const MAX_EVICTED_PER_SWEEP: usize = 100;

pub struct FileCache {
    entries: RwLock<HashMap<PathBuf, Slot>>,
    idle_limit: std::time::Duration,
}

impl FileCache {
    pub fn new(idle_limit: std::time::Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            idle_limit,
        }
    }

    /// Return a cached mapping, re-reading it from disk if it is missing or
    /// stale (mtime changed since it was mapped). A single writer at a time
    /// re-maps a given path; concurrent readers of other paths are not
    /// blocked (spec §4.4's "multi-reader/single-writer" requirement).
    pub fn get(&self, path: &Path) -> Result<Arc<Mapped>> {
        if let Some(mapped) = self.try_fresh_hit(path) {
            return Ok(mapped);
        }

        let mut entries = self.entries.write();
        // Re-check: another writer may have refreshed it while we waited.
        if let Some(slot) = entries.get_mut(path) {
            if Self::is_fresh(slot, path) {
                slot.last_used = Instant::now();
                return Ok(slot.mapped.clone());
            }
        }

        let mapped = Arc::new(map_file(path)?);
        entries.insert(
            path.to_path_buf(),
            Slot {
                mapped: mapped.clone(),
                last_used: Instant::now(),
            },
        );
        Ok(mapped)
    }

    fn try_fresh_hit(&self, path: &Path) -> Option<Arc<Mapped>> {
        let mut entries = self.entries.write();
        let slot = entries.get_mut(path)?;
        if Self::is_fresh(slot, path) {
            slot.last_used = Instant::now();
            Some(slot.mapped.clone())
        } else {
            None
        }
    }

    fn is_fresh(slot: &Slot, path: &Path) -> bool {
        match std::fs::metadata(path).and_then(|m| m.modified()) {
            Ok(mtime) => mtime == slot.mapped.mtime,
            Err(_) => false,
        }
    }

    /// Drop mappings with a refcount of 1 (the cache's own reference only)
    /// untouched for longer than `idle_limit`. Returns the number evicted.
    pub fn sweep_idle(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let stale: Vec<PathBuf> = entries
            .iter()
            .filter(|(_, slot)| {
                now.duration_since(slot.last_used) > self.idle_limit && Arc::strong_count(&slot.mapped) <= 1
            })
            .take(MAX_EVICTED_PER_SWEEP)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &stale {
            entries.remove(path);
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn map_file(path: &Path) -> Result<Mapped> {
    let file = File::open(path).map_err(|e| CoreError::Resource(format!("{}: {e}", path.display())))?;
    let meta = file
        .metadata()
        .map_err(|e| CoreError::Resource(format!("{}: {e}", path.display())))?;
    let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    if meta.len() == 0 {
        return Ok(Mapped { body: Body::Empty, mtime });
    }
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| CoreError::Resource(format!("{}: {e}", path.display())))?;
    Ok(Mapped { body: Body::Mapped(mmap), mtime })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn caches_repeated_reads_of_the_same_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.html");
        std::fs::write(&path, b"<html></html>").unwrap();

        let cache = FileCache::new(Duration::from_secs(60));
        let a = cache.get(&path).unwrap();
        let b = cache.get(&path).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.bytes(), b"<html></html>");
    }

    #[test]
    fn reloads_when_mtime_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.html");
        std::fs::write(&path, b"v1").unwrap();

        let cache = FileCache::new(Duration::from_secs(60));
        let a = cache.get(&path).unwrap();
        assert_eq!(a.bytes(), b"v1");

        std::thread::sleep(Duration::from_millis(10));
        {
            let mut f = std::fs::OpenOptions::new().write(true).truncate(true).open(&path).unwrap();
            f.write_all(b"v2-longer").unwrap();
        }
        let b = cache.get(&path).unwrap();
        assert_eq!(b.bytes(), b"v2-longer");
    }

    #[test]
    fn sweep_evicts_once_the_only_caller_drops_its_reference() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.html");
        std::fs::write(&path, b"data").unwrap();

        let cache = FileCache::new(Duration::from_millis(0));
        {
            let _borrowed = cache.get(&path).unwrap();
            std::thread::sleep(Duration::from_millis(2));
            // still held by `_borrowed`: a concurrent sweep must not evict it.
            assert_eq!(cache.sweep_idle(), 0);
        }
        // `_borrowed` dropped: only the cache's own Arc remains.
        assert_eq!(cache.sweep_idle(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn missing_file_is_a_resource_error() {
        let cache = FileCache::new(Duration::from_secs(60));
        let err = cache.get(Path::new("/nonexistent/path/does/not/exist")).unwrap_err();
        assert!(matches!(err, CoreError::Resource(_)));
    }
}
