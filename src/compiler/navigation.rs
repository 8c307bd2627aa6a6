//! Definition, reference and type navigation over the AST index.
//!
//! These are the utility operations the request providers are written
//! against: resolve the declaration a node refers to, enumerate reference
//! sites, and answer "what type does this expression have". Resolution that
//! leaves the project (classpath types) yields synthetic, rangeless class
//! nodes in non-strict mode; strict mode returns only real source nodes.

use std::sync::Arc;

use tower_lsp::lsp_types::Url;

use crate::compiler::ast::{
    AstNode, ClassData, ExprKind, Modifiers, NodeKind,
};
use crate::lsp::backend::ast_index::AstIndex;

/// Declaration node for whatever `node` refers to.
///
/// With `strict`, only nodes that exist in project source are returned.
/// Without it, a type that resolves outside the project comes back as a
/// synthetic class node carrying the fully qualified name and no range.
pub fn definition_of(index: &AstIndex, node: &Arc<AstNode>, strict: bool) -> Option<Arc<AstNode>> {
    match &node.kind {
        NodeKind::Class(_)
        | NodeKind::Method(_)
        | NodeKind::Constructor(_)
        | NodeKind::Field(_)
        | NodeKind::Property(_)
        | NodeKind::Parameter(_)
        | NodeKind::Variable(_) => Some(node.clone()),
        NodeKind::Import(data) => {
            resolve_class(index, index.uri_of(node)?, &data.name, strict)
        }
        NodeKind::Expression(expr) => match &expr.kind {
            ExprKind::VariableRef { name } => resolve_variable(index, node, name),
            ExprKind::MethodCall { .. } => method_from_call(index, node),
            ExprKind::PropertyAccess { name } => {
                let receiver = node.children.first()?;
                let receiver_type = type_name_of(index, receiver)?;
                let class = resolve_class(index, index.uri_of(node)?, &receiver_type, true)?;
                find_member(index, &class, name, member_is_field_like)
            }
            ExprKind::ClassRef { name } | ExprKind::ConstructorCall { type_name: name } => {
                resolve_class(index, index.uri_of(node)?, name, strict)
            }
            ExprKind::Closure | ExprKind::Literal { .. } => None,
        },
    }
}

/// All reference sites of a declaration, across every indexed file.
pub fn references_of(index: &AstIndex, target: &Arc<AstNode>) -> Vec<(Url, Arc<AstNode>)> {
    let mut results = Vec::new();
    for uri in index.uris().cloned().collect::<Vec<_>>() {
        let Some(nodes) = index.nodes(&uri) else { continue };
        for node in nodes.iter() {
            let is_reference = matches!(
                node.kind,
                NodeKind::Expression(_) | NodeKind::Import(_)
            );
            if !is_reference || node.range.is_none() {
                continue;
            }
            if let Some(def) = definition_of(index, node, true) {
                if def.id() == target.id() {
                    results.push((uri.clone(), node.clone()));
                }
            }
        }
    }
    results
}

/// Declaration of the type of `node`'s value: the class node for a method's
/// return type, a variable's declared or inferred type, or the class itself.
pub fn type_definition_of(index: &AstIndex, node: &Arc<AstNode>) -> Option<Arc<AstNode>> {
    let name = type_name_of(index, node)?;
    resolve_class(index, index.uri_of(node)?, &name, true)
}

/// Type name of the value `node` evaluates to, using frontend inference
/// where available. Names are loose: project classes come back fully
/// qualified, external ones as well as imports can tell.
pub fn type_name_of(index: &AstIndex, node: &Arc<AstNode>) -> Option<String> {
    let uri = index.uri_of(node).cloned();
    let loose = |written: &str| -> Option<String> {
        if written == "def" {
            return Some("java.lang.Object".to_string());
        }
        if is_primitive(written) {
            return Some(written.to_string());
        }
        match &uri {
            Some(uri) => index.resolve_type_name_loose(uri, written),
            None => Some(written.to_string()),
        }
    };
    match &node.kind {
        NodeKind::Class(data) => Some(data.name.clone()),
        NodeKind::Method(m) | NodeKind::Constructor(m) => loose(&m.return_type),
        NodeKind::Field(f) => loose(&f.type_name),
        NodeKind::Property(p) => loose(&p.type_name),
        NodeKind::Parameter(p) => loose(&p.type_name),
        NodeKind::Variable(v) => {
            let written = v.declared_type.as_deref().or(v.inferred_type.as_deref())?;
            loose(written)
        }
        NodeKind::Import(i) => Some(i.name.clone()),
        NodeKind::Expression(expr) => {
            if let Some(inferred) = &expr.inferred_type {
                return loose(inferred);
            }
            match &expr.kind {
                ExprKind::VariableRef { .. } => {
                    let def = definition_of(index, node, true)?;
                    type_name_of(index, &def)
                }
                ExprKind::MethodCall { .. } => {
                    let method = method_from_call(index, node)?;
                    type_name_of(index, &method)
                }
                ExprKind::PropertyAccess { .. } => {
                    let member = definition_of(index, node, true)?;
                    type_name_of(index, &member)
                }
                ExprKind::ConstructorCall { type_name } => loose(type_name),
                ExprKind::ClassRef { name } => loose(name),
                ExprKind::Closure => Some("groovy.lang.Closure".to_string()),
                ExprKind::Literal { text } => literal_type(text),
            }
        }
    }
}

/// Nearest enclosing node (inclusive of `node`) matching the predicate.
pub fn enclosing_node(
    index: &AstIndex,
    node: &Arc<AstNode>,
    matches: impl Fn(&AstNode) -> bool,
) -> Option<Arc<AstNode>> {
    let mut current = Some(node.clone());
    while let Some(candidate) = current {
        if matches(&candidate) {
            return Some(candidate);
        }
        current = index.parent_of(&candidate).cloned();
    }
    None
}

pub fn enclosing_class(index: &AstIndex, node: &Arc<AstNode>) -> Option<Arc<AstNode>> {
    enclosing_node(index, node, AstNode::is_class)
}

pub fn enclosing_callable(index: &AstIndex, node: &Arc<AstNode>) -> Option<Arc<AstNode>> {
    enclosing_node(index, node, |n| {
        matches!(n.kind, NodeKind::Method(_) | NodeKind::Constructor(_))
            || matches!(
                n.kind,
                NodeKind::Expression(ref e) if matches!(e.kind, ExprKind::Closure)
            )
    })
}

/// Resolve a method call to its declaration, preferring an exact argument
/// count, then falling back to the first name match in the receiver's
/// class hierarchy.
pub fn method_from_call(index: &AstIndex, call: &Arc<AstNode>) -> Option<Arc<AstNode>> {
    let NodeKind::Expression(expr) = &call.kind else {
        return None;
    };
    let ExprKind::MethodCall { name, has_receiver } = &expr.kind else {
        return None;
    };

    let arg_count = call.children.len().saturating_sub(usize::from(*has_receiver));
    let class = if *has_receiver {
        let receiver = call.children.first()?;
        let receiver_type = type_name_of(index, receiver)?;
        resolve_class(index, index.uri_of(call)?, &receiver_type, true)?
    } else {
        enclosing_class(index, call)?
    };

    let mut fallback = None;
    let mut current = Some(class);
    while let Some(node) = current {
        for member in &node.children {
            if let NodeKind::Method(m) = &member.kind {
                if m.name == *name && !m.modifiers.is_synthetic {
                    if member.parameters().count() == arg_count {
                        return Some(member.clone());
                    }
                    fallback.get_or_insert_with(|| member.clone());
                }
            }
        }
        current = superclass_node(index, &node);
    }
    fallback
}

/// Project class node for the superclass of `class`, if it is in source.
pub fn superclass_node(index: &AstIndex, class: &Arc<AstNode>) -> Option<Arc<AstNode>> {
    let data = class.class_data()?;
    let written = data.superclass.as_deref()?;
    let uri = index.uri_of(class)?;
    let fqn = index.resolve_type_name(uri, written)?;
    index.class_by_name(&fqn).cloned()
}

/// Field, property or (for field-like filters) member lookup through the
/// superclass chain.
pub fn find_member(
    index: &AstIndex,
    class: &Arc<AstNode>,
    name: &str,
    matches: impl Fn(&AstNode, &str) -> bool,
) -> Option<Arc<AstNode>> {
    let mut current = Some(class.clone());
    while let Some(node) = current {
        for member in &node.children {
            if matches(member, name) && !member.is_synthetic_member() {
                return Some(member.clone());
            }
        }
        current = superclass_node(index, &node);
    }
    None
}

pub fn member_is_field_like(member: &AstNode, name: &str) -> bool {
    match &member.kind {
        NodeKind::Field(f) => f.name == name,
        NodeKind::Property(p) => p.name == name,
        _ => false,
    }
}

fn resolve_variable(index: &AstIndex, at: &Arc<AstNode>, name: &str) -> Option<Arc<AstNode>> {
    let reference_start = at.range.map(|r| r.start);
    let mut previous: Option<Arc<AstNode>> = None;
    let mut current = index.parent_of(at).cloned();

    while let Some(scope) = current {
        let scope_is_callable = matches!(
            scope.kind,
            NodeKind::Method(_) | NodeKind::Constructor(_)
        ) || matches!(
            scope.kind,
            NodeKind::Expression(ref e) if matches!(e.kind, ExprKind::Closure)
        );

        if scope_is_callable {
            for param in scope.parameters() {
                if param.name() == Some(name) {
                    return Some(param.clone());
                }
            }
        }

        // Locals declared earlier in this scope's body.
        for child in &scope.children {
            if let NodeKind::Variable(v) = &child.kind {
                if v.name == name && declared_before(child.range, reference_start) {
                    return Some(child.clone());
                }
            }
        }

        if let NodeKind::Class(_) = scope.kind {
            if let Some(member) = find_member(index, &scope, name, member_is_field_like) {
                return Some(member);
            }
        }

        previous = Some(scope.clone());
        current = index.parent_of(&scope).cloned();
    }

    // Top-level script variables live beside the reference's root node.
    let root = previous.unwrap_or_else(|| at.clone());
    let uri = index.uri_of(&root)?;
    let nodes = index.nodes(uri)?;
    nodes
        .iter()
        .find(|n| {
            matches!(&n.kind, NodeKind::Variable(v) if v.name == name)
                && index.parent_of(n).is_none()
                && declared_before(n.range, reference_start)
        })
        .cloned()
}

fn declared_before(
    declaration: Option<tower_lsp::lsp_types::Range>,
    reference_start: Option<tower_lsp::lsp_types::Position>,
) -> bool {
    match (declaration, reference_start) {
        (Some(decl), Some(at)) => decl.start <= at,
        _ => true,
    }
}

fn resolve_class(
    index: &AstIndex,
    uri: &Url,
    written: &str,
    strict: bool,
) -> Option<Arc<AstNode>> {
    if let Some(fqn) = index.resolve_type_name(uri, written) {
        if let Some(class) = index.class_by_name(&fqn) {
            return Some(class.clone());
        }
    }
    if strict {
        return None;
    }
    let fqn = index.resolve_type_name_loose(uri, written)?;
    Some(synthetic_class(&fqn))
}

/// Rangeless stand-in for a type that resolved outside project source.
pub fn synthetic_class(fqn: &str) -> Arc<AstNode> {
    AstNode::new(
        NodeKind::Class(ClassData {
            name: fqn.to_string(),
            superclass: None,
            interfaces: vec![],
            is_interface: false,
            is_enum: false,
            is_annotation: false,
            is_script: false,
            modifiers: Modifiers::default(),
        }),
        None,
        vec![],
    )
}

fn is_primitive(name: &str) -> bool {
    matches!(
        name,
        "void" | "boolean" | "byte" | "char" | "short" | "int" | "long" | "float" | "double"
    )
}

fn literal_type(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed == "null" {
        return None;
    }
    if trimmed == "true" || trimmed == "false" {
        return Some("boolean".to_string());
    }
    if trimmed.starts_with('"') || trimmed.starts_with('\'') {
        return Some("java.lang.String".to_string());
    }
    if trimmed.chars().all(|c| c.is_ascii_digit()) && !trimmed.is_empty() {
        return Some("int".to_string());
    }
    if trimmed.parse::<f64>().is_ok() {
        return Some("java.math.BigDecimal".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::{
        ExprData, MethodData, ParameterData, VariableData,
    };
    use tower_lsp::lsp_types::{Position, Range};

    fn uri(name: &str) -> Url {
        Url::parse(&format!("file:///ws/{name}.groovy")).unwrap()
    }

    fn span(sl: u32, sc: u32, el: u32, ec: u32) -> Option<Range> {
        Some(Range::new(Position::new(sl, sc), Position::new(el, ec)))
    }

    fn class(name: &str, range: Option<Range>, children: Vec<Arc<AstNode>>) -> Arc<AstNode> {
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
            range,
            children,
        )
    }

    fn expr(kind: ExprKind, range: Option<Range>, children: Vec<Arc<AstNode>>) -> Arc<AstNode> {
        AstNode::new(
            NodeKind::Expression(ExprData {
                kind,
                inferred_type: None,
            }),
            range,
            children,
        )
    }

    #[test]
    fn variable_ref_resolves_to_parameter() {
        let mut index = AstIndex::new();
        let param = AstNode::new(
            NodeKind::Parameter(ParameterData {
                name: "s".to_string(),
                type_name: "java.lang.String".to_string(),
            }),
            span(1, 13, 1, 21),
            vec![],
        );
        let reference = expr(
            ExprKind::VariableRef {
                name: "s".to_string(),
            },
            span(2, 8, 2, 9),
            vec![],
        );
        let method = AstNode::new(
            NodeKind::Method(MethodData {
                name: "greet".to_string(),
                return_type: "void".to_string(),
                modifiers: Modifiers::default(),
            }),
            span(1, 4, 3, 5),
            vec![param.clone(), reference.clone()],
        );
        let owner = class("A", span(0, 0, 4, 1), vec![method]);
        index.register_module(&uri("a"), None, &[owner]);

        let def = definition_of(&index, &reference, true).unwrap();
        assert_eq!(def.id(), param.id());
        assert_eq!(
            type_name_of(&index, &reference).as_deref(),
            Some("java.lang.String")
        );
    }

    #[test]
    fn variable_ref_ignores_later_declarations() {
        let mut index = AstIndex::new();
        let early = AstNode::new(
            NodeKind::Variable(VariableData {
                name: "x".to_string(),
                declared_type: Some("int".to_string()),
                inferred_type: None,
            }),
            span(1, 8, 1, 17),
            vec![],
        );
        let reference = expr(
            ExprKind::VariableRef {
                name: "x".to_string(),
            },
            span(2, 8, 2, 9),
            vec![],
        );
        let late = AstNode::new(
            NodeKind::Variable(VariableData {
                name: "x".to_string(),
                declared_type: Some("long".to_string()),
                inferred_type: None,
            }),
            span(3, 8, 3, 18),
            vec![],
        );
        let method = AstNode::new(
            NodeKind::Method(MethodData {
                name: "m".to_string(),
                return_type: "void".to_string(),
                modifiers: Modifiers::default(),
            }),
            span(0, 4, 4, 5),
            vec![early.clone(), reference.clone(), late],
        );
        let owner = class("A", span(0, 0, 5, 1), vec![method]);
        index.register_module(&uri("a"), None, &[owner]);

        let def = definition_of(&index, &reference, true).unwrap();
        assert_eq!(def.id(), early.id());
    }

    #[test]
    fn method_call_prefers_arity_match() {
        let mut index = AstIndex::new();
        let one_arg = AstNode::new(
            NodeKind::Method(MethodData {
                name: "run".to_string(),
                return_type: "int".to_string(),
                modifiers: Modifiers::default(),
            }),
            span(1, 4, 1, 30),
            vec![AstNode::new(
                NodeKind::Parameter(ParameterData {
                    name: "n".to_string(),
                    type_name: "int".to_string(),
                }),
                span(1, 12, 1, 17),
                vec![],
            )],
        );
        let no_arg = AstNode::new(
            NodeKind::Method(MethodData {
                name: "run".to_string(),
                return_type: "void".to_string(),
                modifiers: Modifiers::default(),
            }),
            span(2, 4, 2, 20),
            vec![],
        );
        let argument = expr(
            ExprKind::Literal {
                text: "1".to_string(),
            },
            span(3, 12, 3, 13),
            vec![],
        );
        let call = expr(
            ExprKind::MethodCall {
                name: "run".to_string(),
                has_receiver: false,
            },
            span(3, 8, 3, 14),
            vec![argument],
        );
        let method = AstNode::new(
            NodeKind::Method(MethodData {
                name: "caller".to_string(),
                return_type: "void".to_string(),
                modifiers: Modifiers::default(),
            }),
            span(3, 4, 3, 20),
            vec![call.clone()],
        );
        let owner = class(
            "A",
            span(0, 0, 5, 1),
            vec![one_arg.clone(), no_arg, method],
        );
        index.register_module(&uri("a"), None, &[owner]);

        let resolved = method_from_call(&index, &call).unwrap();
        assert_eq!(resolved.id(), one_arg.id());
        assert_eq!(type_name_of(&index, &call).as_deref(), Some("int"));
    }

    #[test]
    fn method_call_through_receiver_and_superclass() {
        let mut index = AstIndex::new();
        let base_method = AstNode::new(
            NodeKind::Method(MethodData {
                name: "base".to_string(),
                return_type: "void".to_string(),
                modifiers: Modifiers::default(),
            }),
            span(1, 4, 1, 20),
            vec![],
        );
        let base = class("Base", span(0, 0, 2, 1), vec![base_method.clone()]);
        index.register_module(&uri("base"), None, &[base]);

        let derived = AstNode::new(
            NodeKind::Class(ClassData {
                name: "Derived".to_string(),
                superclass: Some("Base".to_string()),
                interfaces: vec![],
                is_interface: false,
                is_enum: false,
                is_annotation: false,
                is_script: false,
                modifiers: Modifiers::default(),
            }),
            span(0, 0, 1, 1),
            vec![],
        );
        index.register_module(&uri("derived"), None, &[derived]);

        let receiver = expr(
            ExprKind::VariableRef {
                name: "d".to_string(),
            },
            span(1, 8, 1, 9),
            vec![],
        );
        let call = expr(
            ExprKind::MethodCall {
                name: "base".to_string(),
                has_receiver: true,
            },
            span(1, 8, 1, 17),
            vec![receiver],
        );
        let local = AstNode::new(
            NodeKind::Variable(VariableData {
                name: "d".to_string(),
                declared_type: Some("Derived".to_string()),
                inferred_type: None,
            }),
            span(0, 8, 0, 20),
            vec![],
        );
        let method = AstNode::new(
            NodeKind::Method(MethodData {
                name: "go".to_string(),
                return_type: "void".to_string(),
                modifiers: Modifiers::default(),
            }),
            span(0, 4, 2, 5),
            vec![local, call.clone()],
        );
        let owner = class("Main", span(0, 0, 3, 1), vec![method]);
        index.register_module(&uri("main"), None, &[owner]);

        let resolved = method_from_call(&index, &call).unwrap();
        assert_eq!(resolved.id(), base_method.id());
    }

    #[test]
    fn external_class_resolves_non_strict_only() {
        let mut index = AstIndex::new();
        let reference = expr(
            ExprKind::ClassRef {
                name: "java.util.List".to_string(),
            },
            span(0, 0, 0, 14),
            vec![],
        );
        let owner = class("A", span(0, 0, 2, 1), vec![reference.clone()]);
        index.register_module(&uri("a"), None, &[owner]);

        assert!(definition_of(&index, &reference, true).is_none());
        let loose = definition_of(&index, &reference, false).unwrap();
        assert_eq!(loose.name(), Some("java.util.List"));
        assert!(loose.range.is_none());
    }

    #[test]
    fn references_span_files() {
        let mut index = AstIndex::new();
        let target = class("com.example.Shared", span(0, 0, 1, 1), vec![]);
        index.register_module(&uri("shared"), Some("com.example"), &[target.clone()]);

        let reference = expr(
            ExprKind::ClassRef {
                name: "com.example.Shared".to_string(),
            },
            span(1, 0, 1, 18),
            vec![],
        );
        let owner = class("com.example.User", span(0, 0, 2, 1), vec![reference.clone()]);
        index.register_module(&uri("user"), Some("com.example"), &[owner]);

        let refs = references_of(&index, &target);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].0, uri("user"));
        assert_eq!(refs[0].1.id(), reference.id());
    }

    #[test]
    fn literal_types() {
        assert_eq!(literal_type("42").as_deref(), Some("int"));
        assert_eq!(literal_type("4.5").as_deref(), Some("java.math.BigDecimal"));
        assert_eq!(literal_type("'hi'").as_deref(), Some("java.lang.String"));
        assert_eq!(literal_type("true").as_deref(), Some("boolean"));
        assert_eq!(literal_type("null"), None);
    }
}
