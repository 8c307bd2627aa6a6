//! Per-project-root state and the recompile pipeline.
//!
//! A scope owns one compilation unit, the live AST index, the dependency
//! graph, the class signature table and the previous round's diagnostics.
//! The scope mutex serialises the whole `create unit → compile → visit →
//! signature diff → dependency-driven re-invalidation → diagnostics`
//! pipeline; readers only take it long enough to clone the `Arc` of the
//! current index, which is safe because indexes are copy-on-write.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tower_lsp::lsp_types::{Diagnostic, Position, Url};
use tracing::{debug, info, warn};

use crate::classpath::index_cache::SharedIndexCache;
use crate::classpath::scan_cache::SharedScanCache;
use crate::classpath::symbol::ClasspathSymbolIndex;
use crate::compiler::errors::BugPattern;
use crate::compiler::{CompilationUnit, CompilationUnitFactory};
use crate::lsp::backend::ast_index::AstIndex;
use crate::lsp::backend::contents_tracker::FileContentsTracker;
use crate::lsp::backend::dependency_graph::DependencyGraph;
use crate::lsp::backend::diagnostics::{compute_round, DiagnosticRound};
use crate::lsp::backend::orchestrator::{
    self, BugSuppression, create_or_update_compilation_unit,
};
use crate::lsp::backend::signature::ClassSignature;

/// Incremental rounds before falling back to a full recompile.
const MAX_INCREMENTAL_ROUNDS: u32 = 2;

/// Which placeholder a provider wants injected before its recompile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Completion,
    SignatureHelp,
}

/// The classpath view a scope holds: a compact symbol index and, when the
/// index covers a superset classpath, the element paths to filter by.
#[derive(Debug, Clone)]
pub struct ScopeClasspath {
    pub index: Arc<ClasspathSymbolIndex>,
    pub own_paths: Option<HashSet<String>>,
}

struct ScopeState {
    unit: Option<Box<dyn CompilationUnit>>,
    ast_index: Arc<AstIndex>,
    dependency_graph: DependencyGraph,
    signatures: FxHashMap<String, ClassSignature>,
    previous_diagnostics: HashMap<Url, Vec<Diagnostic>>,
    bug_suppression: BugSuppression,
    classpath: Option<ScopeClasspath>,
    open_files: HashSet<Url>,
}

/// All state for one workspace root. Created on the first `didOpen` under
/// the root, torn down when the last file closes.
pub struct ProjectScope {
    root: PathBuf,
    factory: Arc<dyn CompilationUnitFactory>,
    tracker: Arc<FileContentsTracker>,
    scan_cache: Arc<SharedScanCache>,
    index_cache: Arc<SharedIndexCache>,
    state: Mutex<ScopeState>,
}

impl ProjectScope {
    pub fn new(
        root: PathBuf,
        factory: Arc<dyn CompilationUnitFactory>,
        tracker: Arc<FileContentsTracker>,
        scan_cache: Arc<SharedScanCache>,
        index_cache: Arc<SharedIndexCache>,
        benign_bug_patterns: Vec<BugPattern>,
    ) -> Self {
        ProjectScope {
            root,
            factory,
            tracker,
            scan_cache,
            index_cache,
            state: Mutex::new(ScopeState {
                unit: None,
                ast_index: Arc::new(AstIndex::new()),
                dependency_graph: DependencyGraph::new(),
                signatures: FxHashMap::default(),
                previous_diagnostics: HashMap::new(),
                bug_suppression: BugSuppression::new(benign_bug_patterns),
                classpath: None,
                open_files: HashSet::new(),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn contains(&self, uri: &Url) -> bool {
        uri.to_file_path()
            .map(|p| p.starts_with(&self.root))
            .unwrap_or(false)
    }

    /// Reference to the current index. Readers hold it for the duration of
    /// their request; snapshot semantics keep it stable under concurrent
    /// recompiles.
    pub fn ast_index(&self) -> Arc<AstIndex> {
        self.state.lock().ast_index.clone()
    }

    pub fn tracker(&self) -> &FileContentsTracker {
        &self.tracker
    }

    pub fn mark_open(&self, uri: Url) {
        self.state.lock().open_files.insert(uri);
    }

    /// Drop a file from the open set; returns true when the scope has no
    /// open files left and should be torn down.
    pub fn mark_closed(&self, uri: &Url) -> bool {
        let mut state = self.state.lock();
        state.open_files.remove(uri);
        state.open_files.is_empty()
    }

    pub fn previous_diagnostics_for(&self, uri: &Url) -> Vec<Diagnostic> {
        self.state
            .lock()
            .previous_diagnostics
            .get(uri)
            .cloned()
            .unwrap_or_default()
    }

    /// Recompile the scope. `changed = None` forces a full round. Returns
    /// the diagnostic publish packets for this round.
    pub fn recompile(&self, changed: Option<HashSet<Url>>) -> Vec<(Url, Vec<Diagnostic>)> {
        let mut state = self.state.lock();
        self.recompile_locked(&mut state, changed)
    }

    fn recompile_locked(
        &self,
        state: &mut ScopeState,
        changed: Option<HashSet<Url>>,
    ) -> Vec<(Url, Vec<Diagnostic>)> {
        let mut to_compile = match changed {
            Some(set) if !state.ast_index.is_empty() && state.unit.is_some() => Some(set),
            // First round for this scope, or an explicit full request.
            _ => None,
        };
        let mut incremental_rounds = 0u32;

        loop {
            let full = to_compile.is_none();
            let forced = to_compile.clone().unwrap_or_default();

            let Some(mut unit) = create_or_update_compilation_unit(
                state.unit.as_deref(),
                &self.root,
                self.factory.as_ref(),
                &self.tracker,
                &forced,
            ) else {
                warn!("recompile aborted for {}: unit creation failed", self.root.display());
                return Vec::new();
            };

            let collector = orchestrator::compile(unit.as_mut(), &mut state.bug_suppression);
            let (mut new_index, duplicates) = if full {
                orchestrator::visit_ast(unit.as_ref())
            } else {
                orchestrator::visit_ast_incremental(unit.as_ref(), &state.ast_index, &forced)
            };
            if !full {
                orchestrator::restore_degraded_uris(
                    &mut new_index,
                    &state.ast_index,
                    &forced,
                    &collector,
                );
            }
            state.unit = Some(unit);

            let visited: Vec<Url> = if full {
                new_index.uris().cloned().collect()
            } else {
                forced.iter().cloned().collect()
            };
            for uri in &visited {
                let deps = new_index.resolve_dependency_uris(uri);
                state.dependency_graph.update_dependencies(uri, deps);
            }

            let signature_changed = self.refresh_signatures(state, &new_index, &visited, full);
            state.ast_index = Arc::new(new_index);

            if full || !signature_changed {
                let round = self.finish_round(state, &collector, &duplicates);
                return round.publishes;
            }

            let dependents = state.dependency_graph.transitive_dependents(&forced);
            if dependents.is_empty() {
                let round = self.finish_round(state, &collector, &duplicates);
                return round.publishes;
            }

            incremental_rounds += 1;
            if incremental_rounds >= MAX_INCREMENTAL_ROUNDS {
                info!(
                    "signature changes still propagating after {incremental_rounds} rounds; falling back to full recompile"
                );
                to_compile = None;
            } else {
                debug!(
                    "signature change in {} file(s) invalidates {} dependent(s)",
                    forced.len(),
                    dependents.len()
                );
                let mut next: HashSet<Url> = forced;
                next.extend(dependents);
                to_compile = Some(next);
            }
        }
    }

    /// Update the signature table for the visited files. Returns whether
    /// any previously known class changed shape.
    fn refresh_signatures(
        &self,
        state: &mut ScopeState,
        index: &AstIndex,
        visited: &[Url],
        full: bool,
    ) -> bool {
        let mut changed = false;
        for uri in visited {
            let Some(classes) = index.class_nodes(uri) else {
                continue;
            };
            for class in classes.iter() {
                let Some(signature) = ClassSignature::of(class) else {
                    continue;
                };
                match state.signatures.get(&signature.name) {
                    Some(previous) if *previous == signature => {}
                    Some(_) => {
                        debug!("signature changed for {}", signature.name);
                        changed = true;
                        state.signatures.insert(signature.name.clone(), signature);
                    }
                    None => {
                        state.signatures.insert(signature.name.clone(), signature);
                    }
                }
            }
        }
        // A full round resets the table wholesale; nothing to cascade.
        !full && changed
    }

    fn finish_round(
        &self,
        state: &mut ScopeState,
        collector: &crate::compiler::errors::ErrorCollector,
        duplicates: &[crate::lsp::backend::ast_index::DuplicateClass],
    ) -> DiagnosticRound {
        let round = compute_round(
            &state.ast_index,
            collector,
            duplicates,
            &state.previous_diagnostics,
        );
        state.previous_diagnostics = round.by_file.clone();
        round
    }

    /// Inject a placeholder, recompile just this URI into a forked index,
    /// and restore the buffer. The fork is returned for candidate
    /// gathering; the live index is never touched, and the restore is
    /// guaranteed even if the recompile fails.
    pub fn placeholder_recompile(
        &self,
        uri: &Url,
        position: Position,
        placeholder: Placeholder,
    ) -> Option<Arc<AstIndex>> {
        let mut state = self.state.lock();

        let prior = match placeholder {
            Placeholder::Completion => {
                orchestrator::inject_completion_placeholder(&self.tracker, uri, position)?
            }
            Placeholder::SignatureHelp => {
                orchestrator::inject_signature_help_placeholder(&self.tracker, uri, position)?
            }
        };
        let restore = scopeguard::guard(prior, |prior| {
            orchestrator::restore_document_source(&self.tracker, uri, prior);
        });

        let forced: HashSet<Url> = [uri.clone()].into_iter().collect();
        let result = (|| {
            let mut unit = create_or_update_compilation_unit(
                state.unit.as_deref(),
                &self.root,
                self.factory.as_ref(),
                &self.tracker,
                &forced,
            )?;
            let _ = orchestrator::compile(unit.as_mut(), &mut state.bug_suppression);
            let (fork, _) =
                orchestrator::visit_ast_incremental(unit.as_ref(), &state.ast_index, &forced);
            state.unit = Some(unit);
            Some(Arc::new(fork))
        })();

        drop(restore);
        result
    }

    /// The scope's classpath symbols, acquired lazily through the shared
    /// index cache on first use. Needs a compilation unit for the
    /// classloader descriptor; scanning is never done eagerly at unit
    /// creation.
    pub fn classpath(&self) -> Option<ScopeClasspath> {
        let mut state = self.state.lock();
        if let Some(classpath) = &state.classpath {
            return Some(classpath.clone());
        }
        let descriptor = state.unit.as_ref()?.classloader();
        let acquired = self.index_cache.acquire(&descriptor, &self.scan_cache)?;
        let classpath = ScopeClasspath {
            index: acquired.index,
            own_paths: acquired.own_classpath_paths,
        };
        state.classpath = Some(classpath.clone());
        Some(classpath)
    }

    /// Drop the cached classpath view, e.g. after a configuration change
    /// altered the classpath or the reject-package filter.
    pub fn invalidate_classpath(&self) {
        self.state.lock().classpath = None;
    }

    /// Release everything the scope holds. Subsequent requests to this
    /// root re-create the scope from scratch.
    pub fn teardown(&self) {
        let mut state = self.state.lock();
        state.unit = None; // drops the unit and its classloader
        state.classpath = None;
        state.ast_index = Arc::new(AstIndex::new());
        state.dependency_graph.clear();
        state.signatures.clear();
        state.previous_diagnostics.clear();
        state.open_files.clear();
        debug!("scope for {} torn down", self.root.display());
    }
}
