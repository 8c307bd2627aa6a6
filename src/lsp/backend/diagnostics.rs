//! Compiler output → LSP diagnostics, with cross-round stale clearing.
//!
//! Each compile round produces one [`DiagnosticRound`]: the per-URI publish
//! packets for the client, plus the diagnostics-by-file map the scope keeps
//! for the next round. A URI that had diagnostics last round and has none
//! now gets an explicit empty packet so the editor drops its stale markers.

use std::collections::HashMap;
use std::sync::Arc;

use tower_lsp::lsp_types::{
    Diagnostic, DiagnosticSeverity, DiagnosticTag, Range, Url,
};
use tracing::debug;

use crate::compiler::ast::{ImportData, NodeKind};
use crate::compiler::errors::ErrorCollector;
use crate::lsp::backend::ast_index::{AstIndex, DuplicateClass};

pub const DIAGNOSTIC_SOURCE: &str = "groovy";

/// Outcome of one diagnostic round.
#[derive(Debug, Default)]
pub struct DiagnosticRound {
    /// One packet per URI to publish, including empty packets that clear
    /// stale diagnostics from the previous round.
    pub publishes: Vec<(Url, Vec<Diagnostic>)>,
    /// Diagnostics to remember for the next round's clearing pass.
    pub by_file: HashMap<Url, Vec<Diagnostic>>,
}

/// Build the round: unused-import hints, compiler messages, duplicate-class
/// warnings, dedupe, then the stale-clearing publish set.
pub fn compute_round(
    index: &AstIndex,
    collector: &ErrorCollector,
    duplicates: &[DuplicateClass],
    previous: &HashMap<Url, Vec<Diagnostic>>,
) -> DiagnosticRound {
    let mut by_file: HashMap<Url, Vec<Diagnostic>> = HashMap::new();

    for (uri, diagnostic) in unused_import_hints(index) {
        push_deduped(&mut by_file, uri, diagnostic);
    }

    for error in collector.errors() {
        let Some(uri) = &error.uri else {
            debug!("dropping diagnostic without source locator: {}", error.message);
            continue;
        };
        let Some(range) = error.range else {
            debug!("dropping diagnostic without range: {}", error.message);
            continue;
        };
        let severity = if error.fatal {
            DiagnosticSeverity::ERROR
        } else {
            DiagnosticSeverity::WARNING
        };
        push_deduped(
            &mut by_file,
            uri.clone(),
            diagnostic(range, severity, error.message.clone()),
        );
    }

    for duplicate in duplicates {
        let Some(range) = duplicate.range else { continue };
        push_deduped(
            &mut by_file,
            duplicate.uri.clone(),
            diagnostic(
                range,
                DiagnosticSeverity::WARNING,
                format!("duplicate class declaration {}", duplicate.name),
            ),
        );
    }

    let mut publishes: Vec<(Url, Vec<Diagnostic>)> = by_file
        .iter()
        .map(|(uri, diagnostics)| (uri.clone(), diagnostics.clone()))
        .collect();
    // Clear markers for files that were dirty last round and are clean now.
    for uri in previous.keys() {
        if !by_file.contains_key(uri) {
            publishes.push((uri.clone(), Vec::new()));
        }
    }

    DiagnosticRound { publishes, by_file }
}

fn diagnostic(range: Range, severity: DiagnosticSeverity, message: String) -> Diagnostic {
    Diagnostic {
        range,
        severity: Some(severity),
        source: Some(DIAGNOSTIC_SOURCE.to_string()),
        message,
        ..Diagnostic::default()
    }
}

fn push_deduped(by_file: &mut HashMap<Url, Vec<Diagnostic>>, uri: Url, diagnostic: Diagnostic) {
    let list = by_file.entry(uri).or_default();
    let duplicate = list.iter().any(|d| {
        d.range == diagnostic.range
            && d.message == diagnostic.message
            && d.severity == diagnostic.severity
    });
    if !duplicate {
        list.push(diagnostic);
    }
}

/// Hint-severity, "unnecessary"-tagged diagnostics for imports nothing in
/// the file uses. Partially compiled files can be missing substructure, so
/// every lookup here is optional.
fn unused_import_hints(index: &AstIndex) -> Vec<(Url, Diagnostic)> {
    let mut hints = Vec::new();
    for uri in index.uris().cloned().collect::<Vec<_>>() {
        let Some(nodes) = index.nodes(&uri) else { continue };
        for import_node in index.imports_of(&uri) {
            let NodeKind::Import(import) = &import_node.kind else {
                continue;
            };
            // Star and static imports are kept; their use sites are not
            // reliably attributable.
            if import.is_star || import.is_static {
                continue;
            }
            let Some(range) = import_node.range else { continue };
            let used = nodes.iter().any(|node| {
                node.id() != import_node.id() && node_uses_import(node, import)
            });
            if !used {
                hints.push((
                    uri.clone(),
                    Diagnostic {
                        range,
                        severity: Some(DiagnosticSeverity::HINT),
                        source: Some(DIAGNOSTIC_SOURCE.to_string()),
                        message: format!("unused import {}", import.name),
                        tags: Some(vec![DiagnosticTag::UNNECESSARY]),
                        ..Diagnostic::default()
                    },
                ));
            }
        }
    }
    hints
}

fn node_uses_import(node: &Arc<crate::compiler::ast::AstNode>, import: &ImportData) -> bool {
    let Some(simple) = import.simple_name() else {
        return false;
    };
    let matches_name = |written: &str| {
        let written = written.trim_end_matches("[]");
        written == simple || written == import.name
    };
    if let Some(declared) = node.declared_type_name() {
        if matches_name(declared) {
            return true;
        }
    }
    match &node.kind {
        NodeKind::Expression(expr) => match &expr.kind {
            crate::compiler::ast::ExprKind::ClassRef { name }
            | crate::compiler::ast::ExprKind::ConstructorCall { type_name: name } => {
                matches_name(name)
            }
            _ => false,
        },
        NodeKind::Class(data) => {
            data.superclass.as_deref().map(matches_name).unwrap_or(false)
                || data.interfaces.iter().any(|i| matches_name(i))
        }
        _ => false,
    }
}
