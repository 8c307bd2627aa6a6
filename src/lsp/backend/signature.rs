//! Structural fingerprint of a class's public API.
//!
//! Two signatures compare equal exactly when the class's externally visible
//! shape is unchanged: name, superclass, interfaces, and the non-synthetic
//! methods, fields and properties. Body-only edits leave the signature
//! untouched, which is what lets the orchestrator skip recompiling
//! dependents.

use std::collections::BTreeSet;

use crate::compiler::ast::{AstNode, NodeKind};

/// Canonical public-API shape of one class.
///
/// Member sets are ordered (`BTreeSet`) so equality is independent of
/// traversal order. Synthetic members are excluded: they are deterministic
/// functions of the declaration and would only force spurious recompiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSignature {
    pub name: String,
    pub superclass: Option<String>,
    pub interfaces: BTreeSet<String>,
    pub methods: BTreeSet<String>,
    pub fields: BTreeSet<String>,
    pub properties: BTreeSet<String>,
}

impl ClassSignature {
    /// Compute the signature of a class node.
    pub fn of(class: &AstNode) -> Option<ClassSignature> {
        let data = class.class_data()?;

        let mut methods = BTreeSet::new();
        let mut fields = BTreeSet::new();
        let mut properties = BTreeSet::new();

        for member in &class.children {
            if member.is_synthetic_member() {
                continue;
            }
            match &member.kind {
                NodeKind::Method(m) => {
                    let params: Vec<String> = member
                        .parameters()
                        .filter_map(|p| p.declared_type_name().map(str::to_string))
                        .collect();
                    let prefix = if m.modifiers.is_static { "static " } else { "" };
                    methods.insert(format!(
                        "{prefix}{} {}({})",
                        m.return_type,
                        m.name,
                        params.join(",")
                    ));
                }
                NodeKind::Field(f) => {
                    fields.insert(format!("{} {}", f.type_name, f.name));
                }
                NodeKind::Property(p) => {
                    properties.insert(format!("{} {}", p.type_name, p.name));
                }
                _ => {}
            }
        }

        Some(ClassSignature {
            name: data.name.clone(),
            superclass: data.superclass.clone(),
            interfaces: data.interfaces.iter().cloned().collect(),
            methods,
            fields,
            properties,
        })
    }
}
