//! Compiler frontend contract.
//!
//! The analysis core never parses Groovy itself; it drives an implementation
//! of [`CompilationUnit`] obtained from a [`CompilationUnitFactory`] and
//! consumes the AST through the node model in [`ast`]. The bundled
//! declaration-level frontend lives in [`frontend`]; tests substitute their
//! own.

pub mod ast;
pub mod errors;
pub mod frontend;
pub mod navigation;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tower_lsp::lsp_types::Url;

use crate::compiler::ast::AstNode;
use crate::compiler::errors::{CompileFault, ErrorCollector};
use crate::lsp::backend::contents_tracker::FileContentsTracker;

/// How far a compile call should take the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CompilePhase {
    /// Parse into an AST.
    Conversion,
    /// Resolve names and check what can be checked statically.
    Canonicalization,
}

/// Frozen description of the classloader backing a compilation unit.
///
/// The URL list keys the shared classpath scan cache; identical lists from
/// different scopes share one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLoaderDescriptor {
    /// Classpath element URL strings, in configuration order.
    pub classpath_urls: Vec<String>,
}

impl ClassLoaderDescriptor {
    pub fn new(classpath_urls: Vec<String>) -> Self {
        ClassLoaderDescriptor { classpath_urls }
    }
}

/// The AST of one source file, as handed over by the frontend.
#[derive(Debug, Clone)]
pub struct ModuleAst {
    pub uri: Url,
    /// Package declared at the top of the file, if any.
    pub package: Option<String>,
    /// Top-level nodes in document order: imports, classes, script statements.
    pub nodes: Vec<Arc<AstNode>>,
}

/// A compile driver bound to one project scope.
pub trait CompilationUnit: Send {
    /// Compile all sources the unit considers dirty up to `phase`.
    fn compile(&mut self, phase: CompilePhase) -> Result<(), CompileFault>;

    /// ASTs of the sources compiled so far. A file with fatal syntax errors
    /// may be missing here, or present with a degraded node list.
    fn modules(&self) -> Vec<ModuleAst>;

    fn classloader(&self) -> ClassLoaderDescriptor;

    /// Optional on-disk artefact sink, cleaned by the orchestrator before a
    /// replacement unit is created.
    fn target_directory(&self) -> Option<PathBuf>;

    /// All source URIs this unit knows about.
    fn source_units(&self) -> Vec<Url>;

    fn error_collector(&self) -> ErrorCollector;
}

/// Produces compilation units bound to a scope's configuration.
pub trait CompilationUnitFactory: Send + Sync {
    /// Create a unit over `root`. Open-buffer contents come from `tracker`;
    /// `forced_invalidations` lists sources that must be re-parsed even if
    /// their tracked version is unchanged.
    fn create(
        &self,
        root: &Path,
        tracker: &FileContentsTracker,
        forced_invalidations: &HashSet<Url>,
    ) -> anyhow::Result<Box<dyn CompilationUnit>>;
}
