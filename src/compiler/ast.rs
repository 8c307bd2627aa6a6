//! AST node model shared between the compiler frontend and the analysis core.
//!
//! The frontend produces trees of [`AstNode`]; the core flattens them into an
//! [`AstIndex`](crate::lsp::backend::ast_index::AstIndex) for position and
//! name queries. Nodes are immutable once published and shared via `Arc`.
//!
//! Every node carries a process-unique [`NodeId`]. Identity, never structural
//! equality, is what distinguishes two nodes: two `x + 1` expressions in
//! different methods are different nodes even though they are value-equal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tower_lsp::lsp_types::Range;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an AST node.
///
/// Used as the key of the parent table and for reference/definition
/// comparisons. Never derived from node contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Modifier bits relevant to signatures and semantic tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_final: bool,
    /// Compiler-generated member. Excluded from class signatures.
    pub is_synthetic: bool,
    pub is_deprecated: bool,
}

impl Modifiers {
    pub fn synthetic() -> Self {
        Modifiers {
            is_synthetic: true,
            ..Modifiers::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassData {
    /// Fully qualified name, e.g. `com.example.Foo`.
    pub name: String,
    /// Unresolved superclass name as written in source, if any.
    pub superclass: Option<String>,
    /// Unresolved interface names as written in source.
    pub interfaces: Vec<String>,
    pub is_interface: bool,
    pub is_enum: bool,
    pub is_annotation: bool,
    /// Script classes are synthesised from loose top-level statements.
    pub is_script: bool,
    pub modifiers: Modifiers,
}

impl ClassData {
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    pub fn package_name(&self) -> Option<&str> {
        self.name.rsplit_once('.').map(|(pkg, _)| pkg)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodData {
    pub name: String,
    /// Unresolved return type name; `java.lang.Object` for untyped `def`.
    pub return_type: String,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldData {
    pub name: String,
    pub type_name: String,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyData {
    pub name: String,
    pub type_name: String,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterData {
    pub name: String,
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableData {
    pub name: String,
    /// Declared type; `None` for dynamic (`def`) declarations.
    pub declared_type: Option<String>,
    /// Type inferred by the frontend from the initialiser, if any.
    pub inferred_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportData {
    /// Imported fully qualified class name, or the package for star imports.
    pub name: String,
    pub is_star: bool,
    pub is_static: bool,
}

impl ImportData {
    /// Simple name the import binds, e.g. `List` for `import java.util.List`.
    /// Star imports bind no single name.
    pub fn simple_name(&self) -> Option<&str> {
        if self.is_star {
            None
        } else {
            Some(self.name.rsplit('.').next().unwrap_or(&self.name))
        }
    }
}

/// Expression discriminator. Receiver and argument sub-expressions are
/// children of the expression node, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    /// Reference to a local variable, parameter, field or property.
    VariableRef { name: String },
    /// Method invocation. When `has_receiver`, the first child is the
    /// receiver expression and the rest are arguments.
    MethodCall { name: String, has_receiver: bool },
    /// `receiver.property` access; the first child is the receiver.
    PropertyAccess { name: String },
    /// Explicit type usage: declarations, extends/implements clauses, casts.
    ClassRef { name: String },
    /// `new Foo(...)`; arguments are children.
    ConstructorCall { type_name: String },
    /// Closure literal; parameter nodes then body expressions as children.
    Closure,
    Literal { text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprData {
    pub kind: ExprKind,
    /// Static type the frontend inferred for this expression, if known.
    pub inferred_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Class(ClassData),
    Method(MethodData),
    Constructor(MethodData),
    Field(FieldData),
    Property(PropertyData),
    Parameter(ParameterData),
    Variable(VariableData),
    Import(ImportData),
    Expression(ExprData),
}

/// A single node of the frontend's AST.
///
/// Trees are immutable: children are built before their parent and never
/// mutated afterwards, which is what makes `Arc` sharing across index
/// snapshots safe.
#[derive(Debug)]
pub struct AstNode {
    id: NodeId,
    pub kind: NodeKind,
    /// Source range; `None` for synthetic nodes (e.g. classpath types).
    pub range: Option<Range>,
    pub children: Vec<Arc<AstNode>>,
}

impl AstNode {
    pub fn new(kind: NodeKind, range: Option<Range>, children: Vec<Arc<AstNode>>) -> Arc<Self> {
        Arc::new(AstNode {
            id: NodeId::next(),
            kind,
            range,
            children,
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The declared or referenced name, for node kinds that have one.
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Class(c) => Some(&c.name),
            NodeKind::Method(m) | NodeKind::Constructor(m) => Some(&m.name),
            NodeKind::Field(f) => Some(&f.name),
            NodeKind::Property(p) => Some(&p.name),
            NodeKind::Parameter(p) => Some(&p.name),
            NodeKind::Variable(v) => Some(&v.name),
            NodeKind::Import(i) => Some(&i.name),
            NodeKind::Expression(e) => match &e.kind {
                ExprKind::VariableRef { name }
                | ExprKind::MethodCall { name, .. }
                | ExprKind::PropertyAccess { name }
                | ExprKind::ClassRef { name } => Some(name),
                ExprKind::ConstructorCall { type_name } => Some(type_name),
                ExprKind::Closure | ExprKind::Literal { .. } => None,
            },
        }
    }

    pub fn is_class(&self) -> bool {
        matches!(self.kind, NodeKind::Class(_))
    }

    pub fn is_constructor(&self) -> bool {
        matches!(self.kind, NodeKind::Constructor(_))
    }

    pub fn is_synthetic_member(&self) -> bool {
        match &self.kind {
            NodeKind::Method(m) | NodeKind::Constructor(m) => m.modifiers.is_synthetic,
            NodeKind::Field(f) => f.modifiers.is_synthetic,
            NodeKind::Property(p) => p.modifiers.is_synthetic,
            _ => false,
        }
    }

    pub fn class_data(&self) -> Option<&ClassData> {
        match &self.kind {
            NodeKind::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn method_data(&self) -> Option<&MethodData> {
        match &self.kind {
            NodeKind::Method(m) | NodeKind::Constructor(m) => Some(m),
            _ => None,
        }
    }

    pub fn expr_data(&self) -> Option<&ExprData> {
        match &self.kind {
            NodeKind::Expression(e) => Some(e),
            _ => None,
        }
    }

    /// Parameter nodes of a method, constructor or closure, in order.
    pub fn parameters(&self) -> impl Iterator<Item = &Arc<AstNode>> {
        self.children
            .iter()
            .filter(|c| matches!(c.kind, NodeKind::Parameter(_)))
    }

    /// Type name this node declares its value to have, where that is a
    /// syntactic property (no inference).
    pub fn declared_type_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Method(m) | NodeKind::Constructor(m) => Some(&m.return_type),
            NodeKind::Field(f) => Some(&f.type_name),
            NodeKind::Property(p) => Some(&p.type_name),
            NodeKind::Parameter(p) => Some(&p.type_name),
            NodeKind::Variable(v) => v.declared_type.as_deref(),
            _ => None,
        }
    }
}

impl PartialEq for AstNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AstNode {}

/// Depth-first walk over a subtree, parents before children.
pub fn walk<'a>(node: &'a Arc<AstNode>, visit: &mut impl FnMut(&'a Arc<AstNode>)) {
    visit(node);
    for child in &node.children {
        walk(child, visit);
    }
}
