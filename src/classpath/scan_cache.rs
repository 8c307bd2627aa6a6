//! Process-wide, reference-counted cache of full classpath scans.
//!
//! Scans are seconds of work and 50–200 MiB of symbols, so they are shared
//! aggressively: exact key hits, near-superset overlap hits (≥ 75% of the
//! requested URLs), and a JSON disk cache under
//! `~/.groovy-lsp/cache/classgraph/` all avoid rescanning. Entries are
//! ref-counted; release at zero evicts and drops the scan.
//!
//! The cache is an explicit dependency of the server handle, not a global:
//! tests construct isolated instances with their own cache directory.
//!
//! # Memory
//!
//! There is no runtime-managed soft reference to lean on, so the cache
//! tracks an estimate (2 MiB + 6 KiB per class per scan) against a
//! configured heap budget, and [`SharedScanCache::reclaim`] can shed scan
//! payloads outright — the disk layer makes reloading safe.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classpath::scanner::{canonical_paths, scan_classpath, ClasspathScan};
use crate::compiler::ClassLoaderDescriptor;

/// Package prefixes never worth indexing: runtime internals that bloat a
/// scan without ever being completion or import candidates.
pub const BASE_REJECT_PACKAGES: &[&str] = &[
    "sun",
    "com.sun",
    "jdk.internal",
    "org.codehaus.groovy.vmplugin",
    "org.apache.groovy.internal",
];

/// Cached scans held at once before zero-ref entries are evicted.
const MAX_HELD_SCANS: usize = 6;

/// Minimum share of requested URLs a cached scan must cover to be shared.
const OVERLAP_THRESHOLD: f64 = 0.75;

const PER_SCAN_BASE_BYTES: u64 = 2 * 1024 * 1024;
const PER_CLASS_BYTES: u64 = 6 * 1024;

#[derive(Debug, Clone)]
pub struct ScanCacheConfig {
    /// Mixed into every cache key; bump on format changes.
    pub version_tag: String,
    /// Extra reject-package prefixes merged with [`BASE_REJECT_PACKAGES`].
    /// Changing this changes the key, naturally invalidating old entries.
    pub extra_reject_packages: Vec<String>,
    /// Stand-in for the JVM max heap when computing the admission budget.
    pub max_heap_bytes: u64,
    /// Cache directory override; defaults to
    /// `<home>/.groovy-lsp/cache/classgraph`.
    pub cache_dir: Option<PathBuf>,
}

impl Default for ScanCacheConfig {
    fn default() -> Self {
        ScanCacheConfig {
            version_tag: format!("groovy-lsp-{}", env!("CARGO_PKG_VERSION")),
            extra_reject_packages: Vec::new(),
            max_heap_bytes: 2 * 1024 * 1024 * 1024,
            cache_dir: None,
        }
    }
}

impl ScanCacheConfig {
    fn merged_reject_packages(&self) -> Vec<String> {
        let mut merged: BTreeSet<String> = BASE_REJECT_PACKAGES
            .iter()
            .map(|s| s.to_string())
            .collect();
        merged.extend(self.extra_reject_packages.iter().cloned());
        merged.into_iter().collect()
    }

    fn heap_budget_bytes(&self) -> u64 {
        let fraction = (self.max_heap_bytes as f64 * 0.35) as u64;
        fraction.max(256 * 1024 * 1024)
    }

    fn cache_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Some(dir.clone());
        }
        dirs::home_dir().map(|home| home.join(".groovy-lsp").join("cache").join("classgraph"))
    }
}

/// Ref-counted claim on a cache entry. Must be given back via
/// [`SharedScanCache::release`].
#[derive(Debug)]
pub struct ScanHandle {
    key: String,
}

impl ScanHandle {
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[derive(Debug)]
pub struct AcquireResult {
    pub handle: ScanHandle,
    pub scan: Arc<ClasspathScan>,
    /// True when this result reuses a scan keyed to a different classpath.
    pub shared: bool,
    /// When `shared`, the canonical paths of the requesting classpath, for
    /// post-filtering symbols out of the superset scan.
    pub own_paths: Option<HashSet<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanCacheStats {
    pub exact_hits: u64,
    pub stale_reloads: u64,
    pub overlap_hits: u64,
    pub disk_hits: u64,
    pub fresh_scans: u64,
    pub evictions: u64,
}

#[derive(Debug)]
struct CacheEntry {
    /// `None` after [`SharedScanCache::reclaim`] shed the payload.
    scan: Option<Arc<ClasspathScan>>,
    urls: BTreeSet<String>,
    ref_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedScan {
    version_tag: String,
    urls: Vec<String>,
    scan: ClasspathScan,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    stats: ScanCacheStats,
}

/// See the module docs. One instance per process, injected into the server.
#[derive(Debug)]
pub struct SharedScanCache {
    config: RwLock<ScanCacheConfig>,
    state: Mutex<CacheState>,
}

impl SharedScanCache {
    pub fn new(config: ScanCacheConfig) -> Self {
        SharedScanCache {
            config: RwLock::new(config),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Replace the configured extra reject packages. Existing entries stay
    /// but become unreachable: the filter is part of every key.
    pub fn set_extra_reject_packages(&self, packages: Vec<String>) {
        self.config.write().extra_reject_packages = packages;
    }

    /// Cache key: SHA-256 over version tag, sorted classpath URLs and the
    /// sorted merged reject filter.
    pub fn cache_key(&self, descriptor: &ClassLoaderDescriptor) -> String {
        let config = self.config.read();
        let mut hasher = Sha256::new();
        hasher.update(config.version_tag.as_bytes());
        hasher.update([0u8]);
        let mut urls: Vec<&String> = descriptor.classpath_urls.iter().collect();
        urls.sort();
        for url in urls {
            hasher.update(url.as_bytes());
            hasher.update([0u8]);
        }
        for package in config.merged_reject_packages() {
            hasher.update(package.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }

    /// Acquire a scan for the descriptor, in preference order: exact hit,
    /// stale-entry disk reload, overlap share, disk hit, fresh scan. The
    /// whole operation is serialised on the cache lock.
    pub fn acquire(&self, descriptor: &ClassLoaderDescriptor) -> Option<AcquireResult> {
        let key = self.cache_key(descriptor);
        let requested: BTreeSet<String> = descriptor.classpath_urls.iter().cloned().collect();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        // 1. Exact hit with a live payload.
        if let Some(entry) = state.entries.get_mut(&key) {
            if let Some(scan) = entry.scan.clone() {
                entry.ref_count += 1;
                state.stats.exact_hits += 1;
                debug!("scan cache exact hit for {key}");
                return Some(AcquireResult {
                    handle: ScanHandle { key },
                    scan,
                    shared: false,
                    own_paths: None,
                });
            }
            // 2. Entry whose payload was reclaimed: try the disk copy.
            match self.load_persisted(&key) {
                Some(scan) => {
                    let scan = Arc::new(scan);
                    entry.scan = Some(scan.clone());
                    entry.ref_count += 1;
                    state.stats.stale_reloads += 1;
                    debug!("scan cache reloaded reclaimed entry {key} from disk");
                    return Some(AcquireResult {
                        handle: ScanHandle { key },
                        scan,
                        shared: false,
                        own_paths: None,
                    });
                }
                None => {
                    state.entries.remove(&key);
                }
            }
        }

        // 3. Overlap hit against any cached scan.
        if !requested.is_empty() {
            let mut best: Option<(String, f64)> = None;
            for (cached_key, entry) in &state.entries {
                if entry.scan.is_none() {
                    continue;
                }
                let shared_count = requested.intersection(&entry.urls).count();
                let overlap = shared_count as f64 / requested.len() as f64;
                if overlap >= OVERLAP_THRESHOLD
                    && best.as_ref().map(|(_, b)| overlap > *b).unwrap_or(true)
                {
                    best = Some((cached_key.clone(), overlap));
                }
            }
            if let Some((cached_key, overlap)) = best {
                let entry = state.entries.get_mut(&cached_key).expect("candidate exists");
                entry.ref_count += 1;
                state.stats.overlap_hits += 1;
                debug!(
                    "scan cache overlap hit ({:.0}%) reusing {cached_key}",
                    overlap * 100.0
                );
                return Some(AcquireResult {
                    scan: state.entries[&cached_key]
                        .scan
                        .clone()
                        .expect("candidate has payload"),
                    handle: ScanHandle { key: cached_key },
                    shared: true,
                    own_paths: Some(canonical_paths(&descriptor.classpath_urls)),
                });
            }
        }

        // 4. Disk hit.
        if let Some(scan) = self.load_persisted(&key) {
            let scan = Arc::new(scan);
            state.entries.insert(
                key.clone(),
                CacheEntry {
                    scan: Some(scan.clone()),
                    urls: requested,
                    ref_count: 1,
                },
            );
            state.stats.disk_hits += 1;
            debug!("scan cache disk hit for {key}");
            return Some(AcquireResult {
                handle: ScanHandle { key },
                scan,
                shared: false,
                own_paths: None,
            });
        }

        // 5. Fresh scan: make room, check the budget, scan, persist.
        while state.entries.len() >= MAX_HELD_SCANS {
            let evictable = state
                .entries
                .iter()
                .find(|(_, e)| e.ref_count == 0)
                .map(|(k, _)| k.clone());
            match evictable {
                Some(victim) => {
                    state.entries.remove(&victim);
                    state.stats.evictions += 1;
                }
                None => {
                    warn!(
                        "scan cache holds {} referenced scans; admitting one more",
                        state.entries.len()
                    );
                    break;
                }
            }
        }

        let estimated = estimate_bytes(&state.entries);
        let budget = self.config.read().heap_budget_bytes();
        if estimated >= budget {
            warn!("scan cache estimate {estimated} bytes exceeds budget {budget}; scanning anyway");
        }

        let reject = self.config.read().merged_reject_packages();
        let scan = Arc::new(scan_classpath(&descriptor.classpath_urls, &reject));
        self.persist(&key, &descriptor.classpath_urls, &scan);
        state.entries.insert(
            key.clone(),
            CacheEntry {
                scan: Some(scan.clone()),
                urls: requested,
                ref_count: 1,
            },
        );
        state.stats.fresh_scans += 1;
        debug!("scan cache fresh scan for {key}: {} classes", scan.class_count);
        Some(AcquireResult {
            handle: ScanHandle { key },
            scan,
            shared: false,
            own_paths: None,
        })
    }

    /// Give back a handle. At refcount zero the entry is evicted and its
    /// scan dropped. An untracked handle is logged and dropped defensively.
    pub fn release(&self, handle: ScanHandle) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        match state.entries.get_mut(&handle.key) {
            Some(entry) => {
                entry.ref_count = entry.ref_count.saturating_sub(1);
                if entry.ref_count == 0 {
                    state.entries.remove(&handle.key);
                    state.stats.evictions += 1;
                    debug!("scan cache evicted {} on release", handle.key);
                }
            }
            None => {
                debug!("release of untracked scan handle {}", handle.key);
            }
        }
    }

    /// Shed scan payloads to relieve memory pressure. Entries keep their
    /// metadata and refcounts; the next acquire reloads from disk.
    pub fn reclaim(&self) {
        let mut state = self.state.lock();
        for entry in state.entries.values_mut() {
            entry.scan = None;
        }
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
    }

    pub fn size(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn ref_count(&self, key: &str) -> usize {
        self.state
            .lock()
            .entries
            .get(key)
            .map(|e| e.ref_count)
            .unwrap_or(0)
    }

    pub fn stats_snapshot(&self) -> ScanCacheStats {
        self.state.lock().stats
    }

    pub fn estimated_memory_bytes(&self) -> u64 {
        estimate_bytes(&self.state.lock().entries)
    }

    // ---- persistence ----

    fn persisted_path(&self, key: &str) -> Option<PathBuf> {
        self.config
            .read()
            .cache_dir()
            .map(|dir| dir.join(format!("{key}.json")))
    }

    /// Load a persisted scan; self-healing, a corrupt file is deleted.
    fn load_persisted(&self, key: &str) -> Option<ClasspathScan> {
        let path = self.persisted_path(key)?;
        let bytes = std::fs::read(&path).ok()?;
        match serde_json::from_slice::<PersistedScan>(&bytes) {
            Ok(persisted) if persisted.version_tag == self.config.read().version_tag => {
                Some(persisted.scan)
            }
            Ok(_) => {
                debug!("stale version tag in {}, discarding", path.display());
                let _ = std::fs::remove_file(&path);
                None
            }
            Err(e) => {
                warn!("corrupt scan cache file {}: {e}; deleting", path.display());
                let _ = std::fs::remove_file(&path);
                None
            }
        }
    }

    /// Write-tmp-then-rename so readers never observe a partial file.
    fn persist(&self, key: &str, urls: &[String], scan: &ClasspathScan) {
        let Some(path) = self.persisted_path(key) else {
            return;
        };
        let Some(parent) = path.parent() else { return };
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!("cannot create scan cache dir {}: {e}", parent.display());
            return;
        }
        let persisted = PersistedScan {
            version_tag: self.config.read().version_tag.clone(),
            urls: urls.to_vec(),
            scan: scan.clone(),
        };
        let tmp = path.with_extension("json.tmp");
        let write = serde_json::to_vec(&persisted)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| std::fs::write(&tmp, bytes).map_err(Into::into))
            .and_then(|()| std::fs::rename(&tmp, &path).map_err(Into::into));
        if let Err(e) = write {
            warn!("failed to persist scan {}: {e}", path.display());
            let _ = std::fs::remove_file(&tmp);
        }
    }
}

fn estimate_bytes(entries: &HashMap<String, CacheEntry>) -> u64 {
    entries
        .values()
        .filter_map(|e| e.scan.as_ref())
        .map(|scan| PER_SCAN_BASE_BYTES + PER_CLASS_BYTES * scan.class_count as u64)
        .sum()
}
