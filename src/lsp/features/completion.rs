//! Completion candidate gathering.
//!
//! Runs against the forked index a placeholder recompile produced. Sources,
//! in order: local scope (parameters, earlier locals), enclosing-type
//! members, imported types, then classpath symbols filtered to the scope's
//! own classpath. Spock block labels layer on top inside specifications.

use std::sync::Arc;

use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, Position, Url,
};

use crate::classpath::symbol::SymbolKind as ClasspathSymbolKind;
use crate::compiler::ast::{AstNode, ExprKind, NodeKind};
use crate::compiler::navigation;
use crate::lsp::backend::ast_index::AstIndex;
use crate::lsp::backend::contents_tracker::line_at;
use crate::lsp::backend::scope::ScopeClasspath;
use crate::lsp::features::spock;

/// Cap on classpath-sourced items so a broad prefix cannot flood the
/// client.
const MAX_CLASSPATH_ITEMS: usize = 200;

pub struct CompletionRequest<'a> {
    /// Fork produced by the placeholder recompile.
    pub index: &'a AstIndex,
    pub uri: &'a Url,
    pub position: Position,
    /// Buffer contents before placeholder injection, for prefix extraction.
    pub source: Option<Arc<String>>,
    pub classpath: Option<&'a ScopeClasspath>,
}

pub fn completion(request: &CompletionRequest) -> Vec<CompletionItem> {
    let prefix = request
        .source
        .as_deref()
        .map(|text| word_before(text, request.position))
        .unwrap_or_default();

    let offset_node = request.index.node_at(request.uri, request.position);

    // Member access: the placeholder parsed as a property on a receiver.
    if let Some(node) = &offset_node {
        if let Some(receiver) = member_access_receiver(node) {
            if let Some(items) = member_completions(request.index, node, &receiver, &prefix) {
                return items;
            }
        }
    }

    let mut items = Vec::new();
    scope_completions(request.index, offset_node.as_ref(), &prefix, &mut items);
    import_completions(request.index, request.uri, &prefix, &mut items);
    classpath_completions(request, &prefix, &mut items);

    if let Some(node) = &offset_node {
        if let Some(class) = navigation::enclosing_class(request.index, node) {
            if spock::is_specification(request.index, &class) {
                items.extend(spock::block_label_completions());
            }
        }
    }

    items
}

/// Trailing identifier characters before the cursor.
fn word_before(text: &str, position: Position) -> String {
    let Some(line) = line_at(text, position.line) else {
        return String::new();
    };
    let upto: String = line.chars().take(position.character as usize).collect();
    upto.chars()
        .rev()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
        .collect::<Vec<char>>()
        .into_iter()
        .rev()
        .collect()
}

fn matches_prefix(name: &str, prefix: &str) -> bool {
    prefix.is_empty() || name.to_lowercase().starts_with(&prefix.to_lowercase())
}

fn member_access_receiver(node: &Arc<AstNode>) -> Option<Arc<AstNode>> {
    match &node.kind {
        NodeKind::Expression(expr) => match &expr.kind {
            ExprKind::PropertyAccess { .. } => node.children.first().cloned(),
            ExprKind::MethodCall {
                has_receiver: true, ..
            } => node.children.first().cloned(),
            _ => None,
        },
        _ => None,
    }
}

fn member_completions(
    index: &AstIndex,
    at: &Arc<AstNode>,
    receiver: &Arc<AstNode>,
    prefix: &str,
) -> Option<Vec<CompletionItem>> {
    let receiver_type = navigation::type_name_of(index, receiver)?;
    let uri = index.uri_of(at)?;
    let fqn = index.resolve_type_name(uri, &receiver_type)?;
    let mut class = index.class_by_name(&fqn).cloned();

    let mut items = Vec::new();
    while let Some(node) = class {
        for member in &node.children {
            if member.is_synthetic_member() {
                continue;
            }
            let item = match &member.kind {
                NodeKind::Method(m) if matches_prefix(&m.name, prefix) => Some(CompletionItem {
                    label: m.name.clone(),
                    kind: Some(CompletionItemKind::METHOD),
                    detail: Some(crate::lsp::features::hover::declaration_text(member)),
                    ..CompletionItem::default()
                }),
                NodeKind::Field(f) if matches_prefix(&f.name, prefix) => Some(CompletionItem {
                    label: f.name.clone(),
                    kind: Some(CompletionItemKind::FIELD),
                    detail: Some(f.type_name.clone()),
                    ..CompletionItem::default()
                }),
                NodeKind::Property(p) if matches_prefix(&p.name, prefix) => Some(CompletionItem {
                    label: p.name.clone(),
                    kind: Some(CompletionItemKind::PROPERTY),
                    detail: Some(p.type_name.clone()),
                    ..CompletionItem::default()
                }),
                _ => None,
            };
            items.extend(item);
        }
        class = navigation::superclass_node(index, &node);
    }
    Some(items)
}

fn scope_completions(
    index: &AstIndex,
    offset_node: Option<&Arc<AstNode>>,
    prefix: &str,
    items: &mut Vec<CompletionItem>,
) {
    let Some(node) = offset_node else { return };

    if let Some(callable) = navigation::enclosing_callable(index, node) {
        for param in callable.parameters() {
            if let NodeKind::Parameter(p) = &param.kind {
                if matches_prefix(&p.name, prefix) {
                    items.push(CompletionItem {
                        label: p.name.clone(),
                        kind: Some(CompletionItemKind::VARIABLE),
                        detail: Some(p.type_name.clone()),
                        ..CompletionItem::default()
                    });
                }
            }
        }
        for child in &callable.children {
            if let NodeKind::Variable(v) = &child.kind {
                if matches_prefix(&v.name, prefix) {
                    items.push(CompletionItem {
                        label: v.name.clone(),
                        kind: Some(CompletionItemKind::VARIABLE),
                        detail: v
                            .declared_type
                            .clone()
                            .or_else(|| v.inferred_type.clone()),
                        ..CompletionItem::default()
                    });
                }
            }
        }
    }

    if let Some(class) = navigation::enclosing_class(index, node) {
        for member in &class.children {
            if member.is_synthetic_member() {
                continue;
            }
            match &member.kind {
                NodeKind::Method(m) if matches_prefix(&m.name, prefix) => {
                    items.push(CompletionItem {
                        label: m.name.clone(),
                        kind: Some(CompletionItemKind::METHOD),
                        detail: Some(crate::lsp::features::hover::declaration_text(member)),
                        ..CompletionItem::default()
                    });
                }
                NodeKind::Field(f) if matches_prefix(&f.name, prefix) => {
                    items.push(CompletionItem {
                        label: f.name.clone(),
                        kind: Some(CompletionItemKind::FIELD),
                        detail: Some(f.type_name.clone()),
                        ..CompletionItem::default()
                    });
                }
                NodeKind::Property(p) if matches_prefix(&p.name, prefix) => {
                    items.push(CompletionItem {
                        label: p.name.clone(),
                        kind: Some(CompletionItemKind::PROPERTY),
                        detail: Some(p.type_name.clone()),
                        ..CompletionItem::default()
                    });
                }
                _ => {}
            }
        }
    }
}

fn import_completions(index: &AstIndex, uri: &Url, prefix: &str, items: &mut Vec<CompletionItem>) {
    for import_node in index.imports_of(uri) {
        if let NodeKind::Import(import) = &import_node.kind {
            if let Some(simple) = import.simple_name() {
                if matches_prefix(simple, prefix) {
                    items.push(CompletionItem {
                        label: simple.to_string(),
                        kind: Some(CompletionItemKind::CLASS),
                        detail: Some(import.name.clone()),
                        ..CompletionItem::default()
                    });
                }
            }
        }
    }
}

fn classpath_completions(
    request: &CompletionRequest,
    prefix: &str,
    items: &mut Vec<CompletionItem>,
) {
    // A bare cursor with no prefix would match the whole classpath.
    if prefix.is_empty() {
        return;
    }
    let Some(classpath) = request.classpath else {
        return;
    };
    let own = classpath.own_paths.as_ref();
    let mut taken = 0;
    for symbol in classpath.index.symbols(own).iter() {
        if taken >= MAX_CLASSPATH_ITEMS {
            break;
        }
        if matches_prefix(&symbol.simple_name, prefix) {
            items.push(CompletionItem {
                label: symbol.simple_name.clone(),
                kind: Some(match symbol.kind {
                    ClasspathSymbolKind::Interface => CompletionItemKind::INTERFACE,
                    ClasspathSymbolKind::Enum => CompletionItemKind::ENUM,
                    _ => CompletionItemKind::CLASS,
                }),
                detail: Some(symbol.fully_qualified_name.clone()),
                ..CompletionItem::default()
            });
            taken += 1;
        }
    }
}
