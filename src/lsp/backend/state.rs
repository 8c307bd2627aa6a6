//! Backend state: the scope map, shared caches and client handle.
//!
//! One [`GroovyBackend`] serves the whole connection. Project scopes are
//! created lazily on the first open file under a workspace root and torn
//! down when their last file closes. The scan and index caches are
//! process-wide but injected here, so tests can build isolated instances.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tower_lsp::lsp_types::{Diagnostic, Url};
use tower_lsp::Client;
use tracing::{debug, info};

use crate::classpath::index_cache::SharedIndexCache;
use crate::classpath::scan_cache::SharedScanCache;
use crate::compiler::frontend::BasicGroovyFrontend;
use crate::compiler::CompilationUnitFactory;
use crate::lsp::backend::contents_tracker::FileContentsTracker;
use crate::lsp::backend::scope::ProjectScope;

/// URI scheme used for synthetic decompiled-class documents.
pub const DECOMPILED_SCHEME: &str = "groovy-lsp-decompiled";

/// Settings delivered over `workspace/didChangeConfiguration`.
#[derive(Debug, Clone, Default)]
pub struct ServerSettings {
    /// Extra classpath entries injected into every compilation unit.
    pub classpath: Vec<String>,
    /// Extra package prefixes excluded from classpath scans.
    pub rejected_packages: Vec<String>,
}

pub struct GroovyBackend {
    pub(crate) client: Client,
    pub(crate) tracker: Arc<FileContentsTracker>,
    pub(crate) scopes: DashMap<PathBuf, Arc<ProjectScope>>,
    pub(crate) workspace_roots: RwLock<Vec<PathBuf>>,
    pub(crate) scan_cache: Arc<SharedScanCache>,
    pub(crate) index_cache: Arc<SharedIndexCache>,
    pub(crate) settings: RwLock<ServerSettings>,
    /// Rendered text of decompiled virtual documents, by their virtual URI.
    pub(crate) decompiled: Arc<DashMap<Url, String>>,
}

impl GroovyBackend {
    pub fn new(
        client: Client,
        scan_cache: Arc<SharedScanCache>,
        index_cache: Arc<SharedIndexCache>,
    ) -> Self {
        GroovyBackend {
            client,
            tracker: Arc::new(FileContentsTracker::new()),
            scopes: DashMap::new(),
            workspace_roots: RwLock::new(Vec::new()),
            scan_cache,
            index_cache,
            settings: RwLock::new(ServerSettings::default()),
            decompiled: Arc::new(DashMap::new()),
        }
    }

    pub fn tracker(&self) -> &FileContentsTracker {
        &self.tracker
    }

    fn factory(&self) -> Arc<dyn CompilationUnitFactory> {
        Arc::new(BasicGroovyFrontend::new(self.settings.read().classpath.clone()))
    }

    /// Workspace root owning a URI: the longest configured root that is a
    /// prefix of the file's path, else the file's parent directory.
    pub(crate) fn root_for(&self, uri: &Url) -> Option<PathBuf> {
        let path = uri.to_file_path().ok()?;
        let roots = self.workspace_roots.read();
        roots
            .iter()
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| root.components().count())
            .cloned()
            .or_else(|| path.parent().map(|p| p.to_path_buf()))
    }

    /// The scope owning a URI, creating it on first use.
    pub(crate) fn scope_for(&self, uri: &Url) -> Option<Arc<ProjectScope>> {
        let root = self.root_for(uri)?;
        let scope = self
            .scopes
            .entry(root.clone())
            .or_insert_with(|| {
                info!("creating project scope for {}", root.display());
                Arc::new(ProjectScope::new(
                    root,
                    self.factory(),
                    self.tracker.clone(),
                    self.scan_cache.clone(),
                    self.index_cache.clone(),
                    Vec::new(),
                ))
            })
            .clone();
        Some(scope)
    }

    /// Existing scope for a URI, without creating one.
    pub(crate) fn existing_scope_for(&self, uri: &Url) -> Option<Arc<ProjectScope>> {
        let root = self.root_for(uri)?;
        self.scopes.get(&root).map(|s| s.value().clone())
    }

    /// Tear down and forget the scope owning `root`.
    pub(crate) fn drop_scope(&self, root: &PathBuf) {
        if let Some((_, scope)) = self.scopes.remove(root) {
            scope.teardown();
            debug!("dropped scope for {}", root.display());
        }
    }

    /// Apply new settings: the classpath and reject filter feed the scan
    /// cache key, so every scope's classpath view is invalidated and the
    /// scopes themselves are rebuilt on next use.
    pub(crate) fn apply_settings(&self, settings: ServerSettings) {
        self.scan_cache
            .set_extra_reject_packages(settings.rejected_packages.clone());
        *self.settings.write() = settings;
        let roots: Vec<PathBuf> = self.scopes.iter().map(|e| e.key().clone()).collect();
        for root in roots {
            self.drop_scope(&root);
        }
    }

    pub(crate) async fn publish(&self, packets: Vec<(Url, Vec<Diagnostic>)>) {
        for (uri, diagnostics) in packets {
            self.client
                .publish_diagnostics(uri, diagnostics, None)
                .await;
        }
    }

    /// Recompile the scope owning `uri` with `uri` as the changed set and
    /// publish the resulting diagnostics.
    pub(crate) async fn recompile_and_publish(&self, uri: &Url) {
        let Some(scope) = self.scope_for(uri) else {
            debug!("no scope for {uri}");
            return;
        };
        let changed: HashSet<Url> = [uri.clone()].into_iter().collect();
        let scope_clone = scope.clone();
        let packets = tokio::task::spawn_blocking(move || {
            scope_clone.recompile(Some(changed))
        })
        .await
        .unwrap_or_default();
        self.publish(packets).await;
    }
}
