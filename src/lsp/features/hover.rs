//! Hover: a declaration-style markdown rendering of the resolved symbol.

use std::fmt::Write as _;
use std::sync::Arc;

use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position, Url};

use crate::compiler::ast::{AstNode, NodeKind};
use crate::compiler::navigation;
use crate::lsp::backend::ast_index::AstIndex;

pub fn hover(index: &AstIndex, uri: &Url, position: Position) -> Option<Hover> {
    let node = index.node_at(uri, position)?;
    let target = navigation::definition_of(index, &node, false)?;

    let mut value = String::new();
    value.push_str("```groovy\n");
    value.push_str(&declaration_text(&target));
    value.push_str("\n```");
    if let Some(owner) = navigation::enclosing_class(index, &target) {
        if owner.id() != target.id() {
            if let Some(name) = owner.name() {
                let _ = write!(value, "\n\nin `{name}`");
            }
        }
    }

    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value,
        }),
        range: target.range.or(node.range),
    })
}

/// One-line declaration rendering for a node.
pub fn declaration_text(node: &Arc<AstNode>) -> String {
    match &node.kind {
        NodeKind::Class(data) => {
            let keyword = if data.is_interface {
                "interface"
            } else if data.is_enum {
                "enum"
            } else if data.is_annotation {
                "@interface"
            } else {
                "class"
            };
            let mut text = format!("{keyword} {}", data.name);
            if let Some(superclass) = &data.superclass {
                let _ = write!(text, " extends {superclass}");
            }
            if !data.interfaces.is_empty() {
                let _ = write!(text, " implements {}", data.interfaces.join(", "));
            }
            text
        }
        NodeKind::Method(m) | NodeKind::Constructor(m) => {
            let params: Vec<String> = node
                .parameters()
                .filter_map(|p| match &p.kind {
                    NodeKind::Parameter(data) => {
                        Some(format!("{} {}", data.type_name, data.name))
                    }
                    _ => None,
                })
                .collect();
            let prefix = if m.modifiers.is_static { "static " } else { "" };
            if matches!(node.kind, NodeKind::Constructor(_)) {
                format!("{prefix}{}({})", m.name, params.join(", "))
            } else {
                format!("{prefix}{} {}({})", m.return_type, m.name, params.join(", "))
            }
        }
        NodeKind::Field(f) => format!("{} {}", f.type_name, f.name),
        NodeKind::Property(p) => format!("{} {}", p.type_name, p.name),
        NodeKind::Parameter(p) => format!("{} {}", p.type_name, p.name),
        NodeKind::Variable(v) => {
            let type_name = v
                .declared_type
                .as_deref()
                .or(v.inferred_type.as_deref())
                .unwrap_or("def");
            format!("{type_name} {}", v.name)
        }
        NodeKind::Import(i) => format!("import {}", i.name),
        NodeKind::Expression(_) => node.name().unwrap_or("").to_string(),
    }
}
