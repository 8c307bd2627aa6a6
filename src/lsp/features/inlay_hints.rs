//! Inlay hints: inferred types after dynamic variable declarations, and
//! parameter names before call arguments.

use std::sync::Arc;

use tower_lsp::lsp_types::{
    InlayHint, InlayHintKind, InlayHintLabel, Position, Range, Url,
};

use crate::compiler::ast::{AstNode, ExprKind, NodeKind};
use crate::compiler::navigation;
use crate::lsp::backend::ast_index::AstIndex;

/// Single-parameter calls whose parameter has one of these names get no
/// hint; the name carries no information.
const GENERIC_PARAMETER_NAMES: &[&str] = &["value", "arg", "args", "it", "o", "obj", "param"];

pub fn inlay_hints(index: &AstIndex, uri: &Url, range: Range) -> Vec<InlayHint> {
    let Some(nodes) = index.nodes(uri) else {
        return Vec::new();
    };
    let mut hints = Vec::new();

    for node in nodes.iter() {
        let Some(node_range) = node.range else { continue };
        if node_range.end.line < range.start.line || node_range.start.line > range.end.line {
            continue;
        }
        match &node.kind {
            NodeKind::Variable(v) => {
                if let Some(hint) = type_hint(v, node_range) {
                    hints.push(hint);
                }
            }
            NodeKind::Expression(expr) => {
                if let ExprKind::MethodCall { has_receiver, .. } = &expr.kind {
                    parameter_hints(index, node, *has_receiver, &mut hints);
                }
            }
            _ => {}
        }
    }
    hints
}

/// `def x = ...` gets an `: InferredType` hint when the frontend inferred
/// something more specific than Object.
fn type_hint(variable: &crate::compiler::ast::VariableData, range: Range) -> Option<InlayHint> {
    if variable.declared_type.is_some() {
        return None;
    }
    let inferred = variable.inferred_type.as_deref()?;
    if inferred == "java.lang.Object" || inferred == "Object" || inferred == "void" {
        return None;
    }
    let simple = inferred.rsplit('.').next().unwrap_or(inferred);
    Some(InlayHint {
        position: Position::new(range.end.line, range.end.character),
        label: InlayHintLabel::String(format!(": {simple}")),
        kind: Some(InlayHintKind::TYPE),
        text_edits: None,
        tooltip: None,
        padding_left: Some(false),
        padding_right: Some(false),
        data: None,
    })
}

fn parameter_hints(
    index: &AstIndex,
    call: &Arc<AstNode>,
    has_receiver: bool,
    hints: &mut Vec<InlayHint>,
) {
    let Some(method) = navigation::method_from_call(index, call) else {
        return;
    };
    let parameter_names: Vec<String> = method
        .parameters()
        .filter_map(|p| p.name().map(str::to_string))
        .collect();
    if parameter_names.is_empty() {
        return;
    }

    let arguments: Vec<&Arc<AstNode>> = call
        .children
        .iter()
        .skip(usize::from(has_receiver))
        .collect();

    let single_generic = parameter_names.len() == 1
        && GENERIC_PARAMETER_NAMES.contains(&parameter_names[0].as_str());

    for (argument, parameter_name) in arguments.iter().zip(parameter_names.iter()) {
        let Some(argument_range) = argument.range else {
            continue;
        };
        let skip = match &argument.kind {
            // Closures read fine without a label; same-named arguments are
            // self-describing.
            NodeKind::Expression(e) => match &e.kind {
                ExprKind::Closure => true,
                ExprKind::VariableRef { name } => name == parameter_name,
                _ => false,
            },
            _ => false,
        };
        if skip || single_generic {
            continue;
        }
        hints.push(InlayHint {
            position: argument_range.start,
            label: InlayHintLabel::String(format!("{parameter_name}:")),
            kind: Some(InlayHintKind::PARAMETER),
            text_edits: None,
            tooltip: None,
            padding_left: Some(false),
            padding_right: Some(true),
            data: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::{
        ClassData, ExprData, MethodData, Modifiers, ParameterData, VariableData,
    };

    fn uri(name: &str) -> Url {
        Url::parse(&format!("file:///ws/{name}.groovy")).unwrap()
    }

    fn span(sl: u32, sc: u32, el: u32, ec: u32) -> Option<Range> {
        Some(Range::new(Position::new(sl, sc), Position::new(el, ec)))
    }

    fn whole_file() -> Range {
        Range::new(Position::new(0, 0), Position::new(99, 0))
    }

    fn variable(name: &str, declared: Option<&str>, inferred: Option<&str>, line: u32) -> Arc<AstNode> {
        AstNode::new(
            NodeKind::Variable(VariableData {
                name: name.to_string(),
                declared_type: declared.map(str::to_string),
                inferred_type: inferred.map(str::to_string),
            }),
            span(line, 8, line, 20),
            vec![],
        )
    }

    fn method_with(children: Vec<Arc<AstNode>>) -> Arc<AstNode> {
        AstNode::new(
            NodeKind::Method(MethodData {
                name: "go".to_string(),
                return_type: "void".to_string(),
                modifiers: Modifiers::default(),
            }),
            span(1, 4, 20, 5),
            children,
        )
    }

    fn register(index: &mut AstIndex, uri_: &Url, members: Vec<Arc<AstNode>>) {
        let class = AstNode::new(
            NodeKind::Class(ClassData {
                name: "Main".to_string(),
                superclass: None,
                interfaces: vec![],
                is_interface: false,
                is_enum: false,
                is_annotation: false,
                is_script: false,
                modifiers: Modifiers::default(),
            }),
            span(0, 0, 21, 1),
            members,
        );
        index.register_module(uri_, None, &[class]);
    }

    #[test]
    fn dynamic_variable_gets_type_hint() {
        let mut index = AstIndex::new();
        let u = uri("a");
        register(
            &mut index,
            &u,
            vec![method_with(vec![
                variable("box", None, Some("com.example.Box"), 2),
                variable("plain", None, Some("java.lang.Object"), 3),
                variable("typed", Some("int"), Some("int"), 4),
            ])],
        );

        let hints = inlay_hints(&index, &u, whole_file());
        assert_eq!(hints.len(), 1);
        match &hints[0].label {
            InlayHintLabel::String(label) => assert_eq!(label, ": Box"),
            other => panic!("unexpected label {other:?}"),
        }
        assert_eq!(hints[0].kind, Some(InlayHintKind::TYPE));
    }

    #[test]
    fn parameter_hints_skip_matching_names_and_closures() {
        let mut index = AstIndex::new();
        let u = uri("a");

        let target_params = vec![
            AstNode::new(
                NodeKind::Parameter(ParameterData {
                    name: "width".to_string(),
                    type_name: "int".to_string(),
                }),
                span(1, 14, 1, 23),
                vec![],
            ),
            AstNode::new(
                NodeKind::Parameter(ParameterData {
                    name: "height".to_string(),
                    type_name: "int".to_string(),
                }),
                span(1, 25, 1, 35),
                vec![],
            ),
        ];
        let resize = AstNode::new(
            NodeKind::Method(MethodData {
                name: "resize".to_string(),
                return_type: "void".to_string(),
                modifiers: Modifiers::default(),
            }),
            span(1, 4, 1, 40),
            target_params,
        );

        let literal_arg = AstNode::new(
            NodeKind::Expression(ExprData {
                kind: ExprKind::Literal {
                    text: "10".to_string(),
                },
                inferred_type: None,
            }),
            span(3, 15, 3, 17),
            vec![],
        );
        let matching_arg = AstNode::new(
            NodeKind::Expression(ExprData {
                kind: ExprKind::VariableRef {
                    name: "height".to_string(),
                },
                inferred_type: None,
            }),
            span(3, 19, 3, 25),
            vec![],
        );
        let call = AstNode::new(
            NodeKind::Expression(ExprData {
                kind: ExprKind::MethodCall {
                    name: "resize".to_string(),
                    has_receiver: false,
                },
                inferred_type: None,
            }),
            span(3, 8, 3, 26),
            vec![literal_arg, matching_arg],
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
        register(&mut index, &u, vec![resize, caller]);

        let hints = inlay_hints(&index, &u, whole_file());
        assert_eq!(hints.len(), 1);
        match &hints[0].label {
            InlayHintLabel::String(label) => assert_eq!(label, "width:"),
            other => panic!("unexpected label {other:?}"),
        }
        assert_eq!(hints[0].position, Position::new(3, 15));
    }

    #[test]
    fn hints_outside_requested_range_are_skipped() {
        let mut index = AstIndex::new();
        let u = uri("a");
        register(
            &mut index,
            &u,
            vec![method_with(vec![variable("box", None, Some("Box"), 2)])],
        );
        let hints = inlay_hints(
            &index,
            &u,
            Range::new(Position::new(10, 0), Position::new(20, 0)),
        );
        assert!(hints.is_empty());
    }
}
