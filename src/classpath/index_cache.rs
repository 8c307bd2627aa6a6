//! LRU cache of compact classpath symbol indices.
//!
//! Second tier over the scan cache: a scope asks here first, and on a miss
//! this cache borrows a scan from [`SharedScanCache`] just long enough to
//! project it into a [`ClasspathSymbolIndex`], then releases it. Scopes can
//! hold the small index handle indefinitely without pinning a scan.

use std::collections::{BTreeSet, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::classpath::scan_cache::SharedScanCache;
use crate::classpath::scanner::canonical_paths;
use crate::classpath::symbol::ClasspathSymbolIndex;
use crate::compiler::ClassLoaderDescriptor;

const CACHE_CAPACITY: usize = 8;
const OVERLAP_THRESHOLD: f64 = 0.75;

#[derive(Debug)]
struct IndexEntry {
    index: Arc<ClasspathSymbolIndex>,
    urls: BTreeSet<String>,
}

#[derive(Debug)]
pub struct IndexAcquireResult {
    pub index: Arc<ClasspathSymbolIndex>,
    /// Set when the index covers a superset classpath; consumers filter
    /// symbols down to these canonical element paths.
    pub own_classpath_paths: Option<HashSet<String>>,
}

/// Access-ordered cache keyed by the same SHA-256 classpath key as the scan
/// cache.
#[derive(Debug)]
pub struct SharedIndexCache {
    entries: Mutex<LruCache<String, IndexEntry>>,
}

impl Default for SharedIndexCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedIndexCache {
    pub fn new() -> Self {
        SharedIndexCache {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("capacity is non-zero"),
            )),
        }
    }

    /// Exact hit, overlap hit, or scan-project-release on miss.
    pub fn acquire(
        &self,
        descriptor: &ClassLoaderDescriptor,
        scan_cache: &SharedScanCache,
    ) -> Option<IndexAcquireResult> {
        let key = scan_cache.cache_key(descriptor);
        let requested: BTreeSet<String> = descriptor.classpath_urls.iter().cloned().collect();

        {
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get(&key) {
                debug!("index cache exact hit for {key}");
                return Some(IndexAcquireResult {
                    index: entry.index.clone(),
                    own_classpath_paths: None,
                });
            }

            if !requested.is_empty() {
                let mut best: Option<(String, f64)> = None;
                for (cached_key, entry) in entries.iter() {
                    let shared = requested.intersection(&entry.urls).count();
                    let overlap = shared as f64 / requested.len() as f64;
                    if overlap >= OVERLAP_THRESHOLD
                        && best.as_ref().map(|(_, b)| overlap > *b).unwrap_or(true)
                    {
                        best = Some((cached_key.clone(), overlap));
                    }
                }
                if let Some((cached_key, overlap)) = best {
                    debug!(
                        "index cache overlap hit ({:.0}%) reusing {cached_key}",
                        overlap * 100.0
                    );
                    let index = entries
                        .get(&cached_key)
                        .map(|e| e.index.clone())
                        .expect("candidate exists");
                    return Some(IndexAcquireResult {
                        index,
                        own_classpath_paths: Some(canonical_paths(&descriptor.classpath_urls)),
                    });
                }
            }
        }

        // Miss: borrow a scan only for as long as projection takes.
        let acquired = scan_cache.acquire(descriptor)?;
        let index = Arc::new(ClasspathSymbolIndex::new(acquired.scan.symbols.clone()));
        let own_paths = acquired.own_paths.clone();
        scan_cache.release(acquired.handle);

        let mut entries = self.entries.lock();
        entries.put(
            key,
            IndexEntry {
                index: index.clone(),
                urls: requested,
            },
        );
        Some(IndexAcquireResult {
            index,
            own_classpath_paths: own_paths,
        })
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
