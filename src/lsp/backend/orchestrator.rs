//! Compilation orchestration: unit lifecycle, AST visiting (full and
//! incremental), fault handling, and placeholder injection for completion
//! and signature help.
//!
//! Faults never escape: a failed compile still yields its error collector,
//! a frontend bug becomes a log line, and the server keeps answering from
//! the previous good state.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tower_lsp::lsp_types::{Position, Url};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::compiler::errors::{BugPattern, CompileFault, ErrorCollector, StackFrame};
use crate::compiler::{CompilationUnit, CompilationUnitFactory, CompilePhase};
use crate::lsp::backend::ast_index::{AstIndex, DuplicateClass};
use crate::lsp::backend::contents_tracker::{position_to_offset, FileContentsTracker};

static NEW_EXPRESSION_TAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bnew\s+\w*$").unwrap());

/// Tracks known-benign frontend bug patterns per scope, quieting repeats.
#[derive(Debug, Default)]
pub struct BugSuppression {
    patterns: Vec<BugPattern>,
    seen: HashSet<usize>,
}

impl BugSuppression {
    pub fn new(patterns: Vec<BugPattern>) -> Self {
        BugSuppression {
            patterns,
            seen: HashSet::new(),
        }
    }

    /// Log a compiler bug, suppressing known-benign patterns after their
    /// first occurrence in this scope.
    pub fn observe(&mut self, frames: &[StackFrame], message: &str) {
        for (i, pattern) in self.patterns.iter().enumerate() {
            if pattern.matches(frames, message) {
                if self.seen.insert(i) {
                    debug!("known-benign compiler bug (first occurrence): {message}");
                }
                return;
            }
        }
        debug!("compiler bug: {message}");
    }
}

/// Replace the compilation unit for a scope. The old unit's target
/// directory, if any, is deleted bottom-up first; a failed delete aborts
/// and yields `None` so the scope keeps its previous unit.
pub fn create_or_update_compilation_unit(
    old_unit: Option<&dyn CompilationUnit>,
    root: &Path,
    factory: &dyn CompilationUnitFactory,
    tracker: &FileContentsTracker,
    forced_invalidations: &HashSet<Url>,
) -> Option<Box<dyn CompilationUnit>> {
    if let Some(old) = old_unit {
        if let Some(target) = old.target_directory() {
            if target.exists() {
                if let Err(e) = remove_dir_bottom_up(&target) {
                    warn!("failed to clean target directory {}: {e}", target.display());
                    return None;
                }
            }
        }
    }
    match factory.create(root, tracker, forced_invalidations) {
        Ok(unit) => Some(unit),
        Err(e) => {
            warn!("compilation unit creation failed for {}: {e}", root.display());
            None
        }
    }
}

fn remove_dir_bottom_up(dir: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(dir).contents_first(true) {
        let entry = entry.map_err(std::io::Error::other)?;
        if entry.file_type().is_dir() {
            std::fs::remove_dir(entry.path())?;
        } else {
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

/// Run the unit to canonicalization, converting every fault to logs, and
/// hand back whatever the collector gathered.
pub fn compile(unit: &mut dyn CompilationUnit, bugs: &mut BugSuppression) -> ErrorCollector {
    match unit.compile(CompilePhase::Canonicalization) {
        Ok(()) => {}
        Err(CompileFault::Failed) => {
            debug!("compilation finished with source errors");
        }
        Err(CompileFault::CompilerBug { frames, message }) => {
            bugs.observe(&frames, &message);
        }
        Err(CompileFault::Linkage { class_name }) => {
            warn!("classpath linkage failure while compiling: {class_name}");
        }
    }
    unit.error_collector()
}

/// Build a fresh index over every module the unit produced.
pub fn visit_ast(unit: &dyn CompilationUnit) -> (AstIndex, Vec<DuplicateClass>) {
    let mut index = AstIndex::new();
    let mut duplicates = Vec::new();
    for module in unit.modules() {
        duplicates.extend(index.register_module(&module.uri, module.package.as_deref(), &module.nodes));
    }
    (index, duplicates)
}

/// Incremental visit: fork the existing index without `uris`, then register
/// only those URIs into the fork. Readers of `existing` observe no change.
pub fn visit_ast_incremental(
    unit: &dyn CompilationUnit,
    existing: &AstIndex,
    uris: &HashSet<Url>,
) -> (AstIndex, Vec<DuplicateClass>) {
    let mut index = existing.snapshot_excluding(uris);
    let mut duplicates = Vec::new();
    for module in unit.modules() {
        if uris.contains(&module.uri) {
            duplicates.extend(index.register_module(
                &module.uri,
                module.package.as_deref(),
                &module.nodes,
            ));
        }
    }
    (index, duplicates)
}

/// After an incremental visit, put back the previous data for any changed
/// URI whose recompile produced a degraded AST (fatal syntax errors and no
/// class structure to show for it).
pub fn restore_degraded_uris(
    index: &mut AstIndex,
    previous: &AstIndex,
    changed: &HashSet<Url>,
    collector: &ErrorCollector,
) {
    for uri in changed {
        if !collector.has_fatal_for(uri) {
            continue;
        }
        let degraded = index
            .class_nodes(uri)
            .map(|classes| classes.is_empty())
            .unwrap_or(true);
        if degraded && previous.nodes(uri).is_some() {
            debug!("restoring previous AST for degraded {uri}");
            index.restore_from_previous(uri, previous);
        }
    }
}

/// Insert the completion placeholder at the cursor: `a`, or `a()` directly
/// after a `new` keyword so the parser sees a constructable expression.
/// Returns the prior buffer text for the matching restore.
pub fn inject_completion_placeholder(
    tracker: &FileContentsTracker,
    uri: &Url,
    position: Position,
) -> Option<Arc<String>> {
    let prior = tracker.contents(uri)?;
    let offset = position_to_offset(&prior, position);
    let line_start = prior[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let placeholder = if NEW_EXPRESSION_TAIL.is_match(&prior[line_start..offset]) {
        "a()"
    } else {
        "a"
    };
    let mut text = prior.as_ref().clone();
    text.insert_str(offset, placeholder);
    tracker.set_contents(uri, Arc::new(text));
    Some(prior)
}

/// Insert the `)` placeholder signature help needs to parse the call.
pub fn inject_signature_help_placeholder(
    tracker: &FileContentsTracker,
    uri: &Url,
    position: Position,
) -> Option<Arc<String>> {
    let prior = tracker.contents(uri)?;
    let offset = position_to_offset(&prior, position);
    let mut text = prior.as_ref().clone();
    text.insert_str(offset, ")");
    tracker.set_contents(uri, Arc::new(text));
    Some(prior)
}

/// Revert a placeholder injection. Every successful inject has a matching
/// restore; the version bump makes the next compile re-read the buffer.
pub fn restore_document_source(tracker: &FileContentsTracker, uri: &Url, prior: Arc<String>) {
    tracker.set_contents(uri, prior);
}
