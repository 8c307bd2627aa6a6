//! Go-to-type-definition: the declared or inferred type of whatever is
//! under the cursor, with the same source-or-decompile fallback as
//! definition.

use dashmap::DashMap;
use tower_lsp::lsp_types::{GotoDefinitionResponse, Position, Url};

use crate::compiler::navigation;
use crate::lsp::backend::ast_index::AstIndex;
use crate::lsp::backend::scope::ScopeClasspath;
use crate::lsp::features::definition::decompile_location;
use crate::lsp::features::node_location;

pub fn type_definition(
    index: &AstIndex,
    uri: &Url,
    position: Position,
    classpath: Option<&ScopeClasspath>,
    decompiled: &DashMap<Url, String>,
) -> Option<GotoDefinitionResponse> {
    let node = index.node_at(uri, position)?;

    if let Some(class) = navigation::type_definition_of(index, &node) {
        if let Some(location) = node_location(index, &class) {
            return Some(GotoDefinitionResponse::Scalar(location));
        }
    }

    let type_name = navigation::type_name_of(index, &node)?;
    let location = decompile_location(&type_name, None, classpath, decompiled)?;
    Some(GotoDefinitionResponse::Scalar(location))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::{
        AstNode, ClassData, MethodData, Modifiers, NodeKind, VariableData,
    };
    use tower_lsp::lsp_types::Range;

    fn uri(name: &str) -> Url {
        Url::parse(&format!("file:///ws/{name}.groovy")).unwrap()
    }

    fn span(sl: u32, sc: u32, el: u32, ec: u32) -> Option<Range> {
        Some(Range::new(Position::new(sl, sc), Position::new(el, ec)))
    }

    fn class(name: &str, children: Vec<std::sync::Arc<AstNode>>) -> std::sync::Arc<AstNode> {
        AstNode::new(
            NodeKind::Class(ClassData {
                name: name.to_string(),
                superclass: None,
                interfaces: vec![],
                is_interface: false,
                is_enum: false,
                is_annotation: false,
                is_script: false,
                modifiers: Modifiers::default(),
            }),
            span(0, 0, 9, 1),
            children,
        )
    }

    #[test]
    fn variable_jumps_to_declared_type() {
        let mut index = AstIndex::new();
        let helper = class("Helper", vec![]);
        index.register_module(&uri("helper"), None, &[helper.clone()]);

        let variable = AstNode::new(
            NodeKind::Variable(VariableData {
                name: "h".to_string(),
                declared_type: Some("Helper".to_string()),
                inferred_type: None,
            }),
            span(1, 8, 1, 9),
            vec![],
        );
        let method = AstNode::new(
            NodeKind::Method(MethodData {
                name: "go".to_string(),
                return_type: "void".to_string(),
                modifiers: Modifiers::default(),
            }),
            span(1, 0, 2, 1),
            vec![variable],
        );
        let owner = class("Main", vec![method]);
        index.register_module(&uri("main"), None, &[owner]);

        let decompiled = DashMap::new();
        let response =
            type_definition(&index, &uri("main"), Position::new(1, 8), None, &decompiled).unwrap();
        match response {
            GotoDefinitionResponse::Scalar(location) => {
                assert_eq!(location.uri, uri("helper"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
