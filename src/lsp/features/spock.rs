//! Spock test-framework awareness: specification detection, feature-method
//! recognition, and the block-label completions layered on top of the
//! generic completion provider.

use std::sync::Arc;

use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, InsertTextFormat,
};

use crate::compiler::ast::AstNode;
use crate::compiler::navigation;
use crate::lsp::backend::ast_index::AstIndex;

pub const SPECIFICATION_CLASS: &str = "spock.lang.Specification";

/// Labels that start Spock blocks inside a feature method.
pub const BLOCK_LABELS: &[&str] = &[
    "given", "when", "then", "expect", "where", "cleanup", "setup", "and",
];

/// Whether a class is a Spock specification: it, or any superclass in
/// source, extends `spock.lang.Specification` (simple or qualified).
pub fn is_specification(index: &AstIndex, class: &Arc<AstNode>) -> bool {
    let mut current = Some(class.clone());
    let mut depth = 0;
    while let Some(node) = current {
        if depth > 16 {
            return false;
        }
        let Some(data) = node.class_data() else {
            return false;
        };
        match data.superclass.as_deref() {
            Some(SPECIFICATION_CLASS) | Some("Specification") => return true,
            Some(_) => {}
            None => return false,
        }
        current = navigation::superclass_node(index, &node);
        depth += 1;
    }
    false
}

/// Feature methods are declared with a string literal name; anything with
/// whitespace in it cannot be a plain method name.
pub fn is_feature_method(name: &str) -> bool {
    name.contains(char::is_whitespace)
}

/// Block-label completions offered inside a specification's feature method.
pub fn block_label_completions() -> Vec<CompletionItem> {
    let mut items = Vec::new();
    for label in BLOCK_LABELS {
        items.push(CompletionItem {
            label: format!("{label}:"),
            kind: Some(CompletionItemKind::KEYWORD),
            detail: Some("Spock block".to_string()),
            ..CompletionItem::default()
        });
        items.push(CompletionItem {
            label: format!("{label} block"),
            kind: Some(CompletionItemKind::SNIPPET),
            insert_text: Some(format!("{label}: ${{1:description}}\n$0")),
            insert_text_format: Some(InsertTextFormat::SNIPPET),
            detail: Some("Spock block with description".to_string()),
            ..CompletionItem::default()
        });
    }
    items.push(CompletionItem {
        label: "feature method".to_string(),
        kind: Some(CompletionItemKind::SNIPPET),
        insert_text: Some(
            "def \"${1:does something}\"() {\n    given:\n    $0\n\n    expect:\n    true\n}"
                .to_string(),
        ),
        insert_text_format: Some(InsertTextFormat::SNIPPET),
        detail: Some("Spock feature method".to_string()),
        ..CompletionItem::default()
    });
    items
}
