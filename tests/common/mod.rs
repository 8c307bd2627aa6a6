//! Shared fixtures: a scratch workspace on disk, a contents tracker with
//! open buffers, and a project scope wired to isolated caches.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use tower_lsp::lsp_types::{Diagnostic, Url};

use groovy_language_server::classpath::index_cache::SharedIndexCache;
use groovy_language_server::classpath::scan_cache::{ScanCacheConfig, SharedScanCache};
use groovy_language_server::compiler::frontend::BasicGroovyFrontend;
use groovy_language_server::lsp::backend::contents_tracker::FileContentsTracker;
use groovy_language_server::lsp::backend::scope::ProjectScope;

pub struct Workspace {
    _tmp: tempfile::TempDir,
    pub root: PathBuf,
    pub tracker: Arc<FileContentsTracker>,
    pub scope: ProjectScope,
}

impl Workspace {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().expect("scratch dir");
        let root = tmp.path().to_path_buf();
        let tracker = Arc::new(FileContentsTracker::new());
        let scope = ProjectScope::new(
            root.clone(),
            Arc::new(BasicGroovyFrontend::new(vec![])),
            tracker.clone(),
            Arc::new(SharedScanCache::new(ScanCacheConfig {
                cache_dir: Some(tmp.path().join(".scan-cache")),
                ..ScanCacheConfig::default()
            })),
            Arc::new(SharedIndexCache::new()),
            Vec::new(),
        );
        Workspace {
            _tmp: tmp,
            root,
            tracker,
            scope,
        }
    }

    /// Create the file on disk, open it in the tracker and register it with
    /// the scope.
    pub fn open(&self, name: &str, text: &str) -> Url {
        let path = self.root.join(name);
        std::fs::write(&path, text).expect("write source");
        let uri = Url::from_file_path(&path).expect("file uri");
        self.tracker.open(uri.clone(), text.to_string());
        self.scope.mark_open(uri.clone());
        uri
    }

    /// Replace a file's contents on disk and in the open buffer.
    pub fn edit(&self, uri: &Url, text: &str) {
        std::fs::write(uri.to_file_path().expect("path"), text).expect("write source");
        self.tracker.open(uri.clone(), text.to_string());
    }
}

pub fn diagnostics_for<'a>(
    publishes: &'a [(Url, Vec<Diagnostic>)],
    uri: &Url,
) -> Option<&'a Vec<Diagnostic>> {
    publishes.iter().find(|(u, _)| u == uri).map(|(_, d)| d)
}
