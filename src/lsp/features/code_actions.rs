//! Quick fixes: add a missing import, remove unused imports.

use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tower_lsp::lsp_types::{
    CodeAction, CodeActionKind, CodeActionOrCommand, Diagnostic, DiagnosticTag, Position, Range,
    TextEdit, Url, WorkspaceEdit,
};

use crate::lsp::backend::ast_index::AstIndex;
use crate::lsp::backend::scope::ScopeClasspath;

static UNRESOLVED_CLASS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"unable to resolve class (\w+)").unwrap());

pub fn code_actions(
    index: &AstIndex,
    uri: &Url,
    diagnostics: &[Diagnostic],
    classpath: Option<&ScopeClasspath>,
    text: Option<&Arc<String>>,
) -> Vec<CodeActionOrCommand> {
    let mut actions = Vec::new();
    actions.extend(missing_import_actions(index, uri, diagnostics, classpath, text));
    actions.extend(unused_import_actions(uri, diagnostics));
    actions
}

/// One import candidate with its ordering bucket: AST classes from other
/// project files sort before classpath symbols, fully qualified name as the
/// tie-breaker.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ImportCandidate {
    bucket: u8,
    fqn: String,
}

fn missing_import_actions(
    index: &AstIndex,
    uri: &Url,
    diagnostics: &[Diagnostic],
    classpath: Option<&ScopeClasspath>,
    text: Option<&Arc<String>>,
) -> Vec<CodeActionOrCommand> {
    let current_package = index.package_of(uri).map(str::to_string);
    let insert_at = import_insertion_line(index, uri, text);

    let mut actions = Vec::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    for diagnostic in diagnostics {
        let Some(caps) = UNRESOLVED_CLASS_RE.captures(&diagnostic.message) else {
            continue;
        };
        let simple = caps[1].to_string();

        let mut candidates: Vec<ImportCandidate> = Vec::new();
        for class in index.all_class_nodes() {
            let Some(data) = class.class_data() else { continue };
            if data.simple_name() == simple {
                candidates.push(ImportCandidate {
                    bucket: 0,
                    fqn: data.name.clone(),
                });
            }
        }
        if let Some(classpath) = classpath {
            let own = classpath.own_paths.as_ref();
            for symbol in classpath.index.symbols(own).iter() {
                if symbol.simple_name == simple {
                    candidates.push(ImportCandidate {
                        bucket: 1,
                        fqn: symbol.fully_qualified_name.clone(),
                    });
                }
            }
        }

        // Same-package classes are already visible; importing them is noise.
        candidates.retain(|c| {
            c.fqn.contains('.')
                && c.fqn.rsplit_once('.').map(|(pkg, _)| pkg.to_string()) != current_package
        });
        candidates.sort();
        candidates.dedup_by(|a, b| a.fqn == b.fqn);

        for candidate in candidates {
            if !seen.insert((simple.clone(), candidate.fqn.clone())) {
                continue;
            }
            let title = format!("Import {}", candidate.fqn);
            let edit = TextEdit {
                range: Range::new(Position::new(insert_at, 0), Position::new(insert_at, 0)),
                new_text: format!("import {}\n", candidate.fqn),
            };
            actions.push(CodeActionOrCommand::CodeAction(CodeAction {
                title,
                kind: Some(CodeActionKind::QUICKFIX),
                diagnostics: Some(vec![diagnostic.clone()]),
                edit: Some(single_edit(uri, edit)),
                ..CodeAction::default()
            }));
        }
    }
    actions
}

fn unused_import_actions(uri: &Url, diagnostics: &[Diagnostic]) -> Vec<CodeActionOrCommand> {
    let unused: Vec<&Diagnostic> = diagnostics
        .iter()
        .filter(|d| {
            d.tags
                .as_ref()
                .is_some_and(|tags| tags.contains(&DiagnosticTag::UNNECESSARY))
        })
        .collect();

    let mut actions = Vec::new();
    for diagnostic in &unused {
        actions.push(CodeActionOrCommand::CodeAction(CodeAction {
            title: "Remove unused import".to_string(),
            kind: Some(CodeActionKind::QUICKFIX),
            diagnostics: Some(vec![(*diagnostic).clone()]),
            edit: Some(single_edit(uri, delete_line_edit(diagnostic.range))),
            ..CodeAction::default()
        }));
    }
    if unused.len() >= 2 {
        let edits: Vec<TextEdit> = unused
            .iter()
            .map(|d| delete_line_edit(d.range))
            .collect();
        actions.push(CodeActionOrCommand::CodeAction(CodeAction {
            title: "Remove all unused imports".to_string(),
            kind: Some(CodeActionKind::SOURCE_ORGANIZE_IMPORTS),
            diagnostics: Some(unused.iter().map(|d| (*d).clone()).collect()),
            edit: Some(WorkspaceEdit {
                changes: Some([(uri.clone(), edits)].into_iter().collect()),
                ..WorkspaceEdit::default()
            }),
            ..CodeAction::default()
        }));
    }
    actions
}

fn delete_line_edit(range: Range) -> TextEdit {
    TextEdit {
        range: Range::new(
            Position::new(range.start.line, 0),
            Position::new(range.start.line + 1, 0),
        ),
        new_text: String::new(),
    }
}

fn single_edit(uri: &Url, edit: TextEdit) -> WorkspaceEdit {
    WorkspaceEdit {
        changes: Some([(uri.clone(), vec![edit])].into_iter().collect()),
        ..WorkspaceEdit::default()
    }
}

/// New imports go after the last existing import, else after the package
/// declaration, else at the top.
fn import_insertion_line(index: &AstIndex, uri: &Url, text: Option<&Arc<String>>) -> u32 {
    let imports = index.imports_of(uri);
    if let Some(last) = imports.iter().filter_map(|i| i.range).map(|r| r.end.line).max() {
        return last + 1;
    }
    if let Some(text) = text {
        for (i, line) in text.lines().enumerate() {
            if line.trim_start().starts_with("package ") {
                return i as u32 + 1;
            }
        }
    }
    0
}
