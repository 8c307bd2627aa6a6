//! Workspace symbol search: case-insensitive substring over every declared
//! name the AST index knows.

use tower_lsp::lsp_types::{Location, SymbolInformation, SymbolKind};

use crate::compiler::ast::NodeKind;
use crate::lsp::backend::ast_index::AstIndex;
use crate::lsp::features::node_location;

pub fn workspace_symbols(index: &AstIndex, query: &str) -> Vec<SymbolInformation> {
    let needle = query.to_lowercase();
    let mut results = Vec::new();

    for class in index.all_class_nodes() {
        let Some(data) = class.class_data() else { continue };
        if matches(&needle, data.simple_name()) {
            if let Some(location) = node_location(index, class) {
                results.push(info(
                    data.simple_name().to_string(),
                    class_kind(data.is_interface, data.is_enum),
                    None,
                    location,
                ));
            }
        }
        for member in &class.children {
            if member.is_synthetic_member() {
                continue;
            }
            let (name, kind) = match &member.kind {
                NodeKind::Method(m) => (m.name.clone(), SymbolKind::METHOD),
                NodeKind::Constructor(m) => (m.name.clone(), SymbolKind::CONSTRUCTOR),
                NodeKind::Field(f) => (f.name.clone(), SymbolKind::FIELD),
                NodeKind::Property(p) => (p.name.clone(), SymbolKind::PROPERTY),
                _ => continue,
            };
            if matches(&needle, &name) {
                if let Some(location) = node_location(index, member) {
                    results.push(info(
                        name,
                        kind,
                        Some(data.simple_name().to_string()),
                        location,
                    ));
                }
            }
        }
    }
    results
}

fn matches(needle: &str, name: &str) -> bool {
    needle.is_empty() || name.to_lowercase().contains(needle)
}

fn class_kind(is_interface: bool, is_enum: bool) -> SymbolKind {
    if is_interface {
        SymbolKind::INTERFACE
    } else if is_enum {
        SymbolKind::ENUM
    } else {
        SymbolKind::CLASS
    }
}

#[allow(deprecated)]
fn info(
    name: String,
    kind: SymbolKind,
    container_name: Option<String>,
    location: Location,
) -> SymbolInformation {
    SymbolInformation {
        name,
        kind,
        tags: None,
        deprecated: None,
        location,
        container_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::{AstNode, ClassData, MethodData, Modifiers};
    use tower_lsp::lsp_types::{Position, Range, Url};

    fn uri(name: &str) -> Url {
        Url::parse(&format!("file:///ws/{name}.groovy")).unwrap()
    }

    fn span(sl: u32, el: u32) -> Option<Range> {
        Some(Range::new(Position::new(sl, 0), Position::new(el, 1)))
    }

    #[test]
    fn query_is_case_insensitive_substring() {
        let mut index = AstIndex::new();
        let method = AstNode::new(
            NodeKind::Method(MethodData {
                name: "computeTotal".to_string(),
                return_type: "int".to_string(),
                modifiers: Modifiers::default(),
            }),
            span(1, 2),
            vec![],
        );
        let class = AstNode::new(
            NodeKind::Class(ClassData {
                name: "com.example.TotalCalculator".to_string(),
                superclass: None,
                interfaces: vec![],
                is_interface: false,
                is_enum: false,
                is_annotation: false,
                is_script: false,
                modifiers: Modifiers::default(),
            }),
            span(0, 3),
            vec![method],
        );
        index.register_module(&uri("calc"), Some("com.example"), &[class]);

        let hits = workspace_symbols(&index, "total");
        let names: Vec<&str> = hits.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"TotalCalculator"));
        assert!(names.contains(&"computeTotal"));

        assert!(workspace_symbols(&index, "zzz").is_empty());
        // Empty query matches everything.
        assert_eq!(workspace_symbols(&index, "").len(), 2);
    }
}
