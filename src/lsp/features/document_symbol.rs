//! Document symbols: the class/member outline of one file.

use std::sync::Arc;

use tower_lsp::lsp_types::{DocumentSymbol, Range, SymbolKind, Url};

use crate::compiler::ast::{AstNode, NodeKind};
use crate::lsp::backend::ast_index::AstIndex;
use crate::lsp::features::spock;

pub fn document_symbols(index: &AstIndex, uri: &Url) -> Vec<DocumentSymbol> {
    let Some(classes) = index.class_nodes(uri) else {
        return Vec::new();
    };
    classes
        .iter()
        .filter_map(|class| class_symbol(index, class))
        .collect()
}

fn class_symbol(index: &AstIndex, class: &Arc<AstNode>) -> Option<DocumentSymbol> {
    let data = class.class_data()?;
    let range = class.range?;
    let kind = if data.is_interface {
        SymbolKind::INTERFACE
    } else if data.is_enum {
        SymbolKind::ENUM
    } else {
        SymbolKind::CLASS
    };
    let spec_class = spock::is_specification(index, class);

    let children: Vec<DocumentSymbol> = class
        .children
        .iter()
        .filter_map(|member| member_symbol(member, spec_class))
        .collect();

    Some(symbol(
        data.simple_name().to_string(),
        None,
        kind,
        range,
        children,
    ))
}

fn member_symbol(member: &Arc<AstNode>, spec_class: bool) -> Option<DocumentSymbol> {
    if member.is_synthetic_member() {
        return None;
    }
    let range = member.range?;
    match &member.kind {
        NodeKind::Method(m) => {
            let detail = if spec_class && spock::is_feature_method(&m.name) {
                Some("feature method".to_string())
            } else {
                Some(format!("{}()", m.name))
            };
            Some(symbol(m.name.clone(), detail, SymbolKind::METHOD, range, vec![]))
        }
        NodeKind::Constructor(m) => Some(symbol(
            m.name.clone(),
            None,
            SymbolKind::CONSTRUCTOR,
            range,
            vec![],
        )),
        NodeKind::Field(f) => Some(symbol(
            f.name.clone(),
            Some(f.type_name.clone()),
            SymbolKind::FIELD,
            range,
            vec![],
        )),
        NodeKind::Property(p) => Some(symbol(
            p.name.clone(),
            Some(p.type_name.clone()),
            SymbolKind::PROPERTY,
            range,
            vec![],
        )),
        _ => None,
    }
}

#[allow(deprecated)]
fn symbol(
    name: String,
    detail: Option<String>,
    kind: SymbolKind,
    range: Range,
    children: Vec<DocumentSymbol>,
) -> DocumentSymbol {
    DocumentSymbol {
        name,
        detail,
        kind,
        tags: None,
        deprecated: None,
        range,
        selection_range: range,
        children: if children.is_empty() {
            None
        } else {
            Some(children)
        },
    }
}
