//! Signature help: resolve the call under the cursor and present its
//! parameter list, with the active parameter derived from comma counting
//! on the source line.

use std::sync::Arc;

use tower_lsp::lsp_types::{
    Documentation, ParameterInformation, ParameterLabel, Position, SignatureHelp,
    SignatureInformation, Url,
};

use crate::compiler::ast::{AstNode, ExprKind, NodeKind};
use crate::compiler::navigation;
use crate::lsp::backend::ast_index::AstIndex;
use crate::lsp::backend::contents_tracker::line_at;
use crate::lsp::backend::scope::ScopeClasspath;

pub struct SignatureHelpRequest<'a> {
    /// Fork produced by the `)` placeholder recompile.
    pub index: &'a AstIndex,
    pub uri: &'a Url,
    pub position: Position,
    /// Buffer contents before injection, for active-parameter counting.
    pub source: Option<Arc<String>>,
    pub classpath: Option<&'a ScopeClasspath>,
}

pub fn signature_help(request: &SignatureHelpRequest) -> Option<SignatureHelp> {
    let node = request.index.node_at(request.uri, request.position)?;
    let call = enclosing_call(request.index, &node)?;
    let method = navigation::method_from_call(request.index, &call)?;

    let parameters: Vec<ParameterInformation> = method
        .parameters()
        .filter_map(|p| match &p.kind {
            NodeKind::Parameter(data) => Some(ParameterInformation {
                label: ParameterLabel::Simple(format!("{} {}", data.type_name, data.name)),
                documentation: None,
            }),
            _ => None,
        })
        .collect();

    let label = crate::lsp::features::hover::declaration_text(&method);
    let active_parameter = request
        .source
        .as_deref()
        .and_then(|text| active_parameter(text, request.position))
        .map(|p| p.min(parameters.len().saturating_sub(1) as u32));

    Some(SignatureHelp {
        signatures: vec![SignatureInformation {
            label,
            documentation: None::<Documentation>,
            parameters: Some(parameters),
            active_parameter,
        }],
        active_signature: Some(0),
        active_parameter,
    })
}

fn enclosing_call(index: &AstIndex, node: &Arc<AstNode>) -> Option<Arc<AstNode>> {
    navigation::enclosing_node(index, node, |n| {
        matches!(
            &n.kind,
            NodeKind::Expression(e) if matches!(e.kind, ExprKind::MethodCall { .. })
        )
    })
}

/// Number of top-level commas between the call's opening parenthesis and
/// the cursor.
fn active_parameter(text: &str, position: Position) -> Option<u32> {
    let line = line_at(text, position.line)?;
    let upto: String = line.chars().take(position.character as usize).collect();
    let open = upto.rfind('(')?;
    let mut depth = 0u32;
    let mut commas = 0u32;
    for c in upto[open + 1..].chars() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => commas += 1,
            _ => {}
        }
    }
    Some(commas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::{
        ClassData, ExprData, MethodData, Modifiers, ParameterData,
    };
    use tower_lsp::lsp_types::Range;

    fn uri(name: &str) -> Url {
        Url::parse(&format!("file:///ws/{name}.groovy")).unwrap()
    }

    fn span(sl: u32, sc: u32, el: u32, ec: u32) -> Option<Range> {
        Some(Range::new(Position::new(sl, sc), Position::new(el, ec)))
    }

    #[test]
    fn call_resolves_to_signature_with_active_parameter() {
        let mut index = AstIndex::new();
        let params = vec![
            AstNode::new(
                NodeKind::Parameter(ParameterData {
                    name: "who".to_string(),
                    type_name: "String".to_string(),
                }),
                span(1, 15, 1, 25),
                vec![],
            ),
            AstNode::new(
                NodeKind::Parameter(ParameterData {
                    name: "times".to_string(),
                    type_name: "int".to_string(),
                }),
                span(1, 27, 1, 36),
                vec![],
            ),
        ];
        let greet = AstNode::new(
            NodeKind::Method(MethodData {
                name: "greet".to_string(),
                return_type: "void".to_string(),
                modifiers: Modifiers::default(),
            }),
            span(1, 4, 2, 5),
            params,
        );
        let call = AstNode::new(
            NodeKind::Expression(ExprData {
                kind: ExprKind::MethodCall {
                    name: "greet".to_string(),
                    has_receiver: false,
                },
                inferred_type: None,
            }),
            span(3, 8, 3, 30),
            vec![],
        );
        let caller = AstNode::new(
            NodeKind::Method(MethodData {
                name: "go".to_string(),
                return_type: "void".to_string(),
                modifiers: Modifiers::default(),
            }),
            span(3, 4, 4, 5),
            vec![call],
        );
        let class = AstNode::new(
            NodeKind::Class(ClassData {
                name: "A".to_string(),
                superclass: None,
                interfaces: vec![],
                is_interface: false,
                is_enum: false,
                is_annotation: false,
                is_script: false,
                modifiers: Modifiers::default(),
            }),
            span(0, 0, 5, 1),
            vec![greet, caller],
        );
        index.register_module(&uri("a"), None, &[class]);

        let source = Arc::new(
            "class A {\n    void greet(String who, int times) {\n    }\n        greet(\"hi\", \n    }\n"
                .to_string(),
        );
        let request = SignatureHelpRequest {
            index: &index,
            uri: &uri("a"),
            position: Position::new(3, 21),
            source: Some(source),
            classpath: None,
        };
        let help = signature_help(&request).unwrap();
        assert_eq!(help.signatures.len(), 1);
        assert!(help.signatures[0].label.contains("greet(String who, int times)"));
        assert_eq!(help.active_parameter, Some(1));
    }
}
