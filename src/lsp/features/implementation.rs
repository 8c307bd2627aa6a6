//! Go-to-implementation for interfaces, abstract classes and their methods.
//!
//! Scans every class node in the index for subtypes of the target, and for
//! method targets returns the matching overrides in those subtypes.

use std::sync::Arc;

use tower_lsp::lsp_types::{Location, Position, Url};

use crate::compiler::ast::{AstNode, NodeKind};
use crate::compiler::navigation;
use crate::lsp::backend::ast_index::AstIndex;
use crate::lsp::features::node_location;

pub fn implementation(index: &AstIndex, uri: &Url, position: Position) -> Vec<Location> {
    let Some(node) = index.node_at(uri, position) else {
        return Vec::new();
    };
    let Some(target) = navigation::definition_of(index, &node, true) else {
        return Vec::new();
    };

    match &target.kind {
        NodeKind::Class(data) if data.is_interface || data.modifiers.is_abstract => {
            subtypes_of(index, &target)
                .iter()
                .filter_map(|subtype| node_location(index, subtype))
                .collect()
        }
        NodeKind::Method(method) => {
            let Some(owner) = navigation::enclosing_class(index, &target) else {
                return Vec::new();
            };
            let abstract_owner = owner
                .class_data()
                .map(|c| c.is_interface || c.modifiers.is_abstract)
                .unwrap_or(false);
            if !abstract_owner && !method.modifiers.is_abstract {
                return Vec::new();
            }
            subtypes_of(index, &owner)
                .iter()
                .flat_map(|subtype| {
                    subtype.children.iter().filter(|member| {
                        matches!(&member.kind, NodeKind::Method(m) if m.name == method.name)
                    })
                })
                .filter_map(|over| node_location(index, over))
                .collect()
        }
        _ => Vec::new(),
    }
}

/// Direct and transitive subtypes of `target` among indexed classes.
fn subtypes_of(index: &AstIndex, target: &Arc<AstNode>) -> Vec<Arc<AstNode>> {
    let Some(target_name) = target.class_data().map(|c| c.name.clone()) else {
        return Vec::new();
    };
    let mut results = Vec::new();
    for class in index.all_class_nodes() {
        if class.id() == target.id() {
            continue;
        }
        if is_subtype(index, class, &target_name, 0) {
            results.push(class.clone());
        }
    }
    results
}

fn is_subtype(index: &AstIndex, class: &Arc<AstNode>, target_name: &str, depth: u32) -> bool {
    if depth > 16 {
        return false; // inheritance cycle in broken source
    }
    let Some(data) = class.class_data() else {
        return false;
    };
    let Some(class_uri) = index.uri_of(class) else {
        return false;
    };
    let mut written_supers: Vec<&str> = Vec::new();
    if let Some(superclass) = &data.superclass {
        written_supers.push(superclass);
    }
    written_supers.extend(data.interfaces.iter().map(String::as_str));

    for written in written_supers {
        match index.resolve_type_name(class_uri, written) {
            Some(resolved) if resolved == target_name => return true,
            Some(resolved) => {
                if let Some(parent) = index.class_by_name(&resolved) {
                    let parent = parent.clone();
                    if is_subtype(index, &parent, target_name, depth + 1) {
                        return true;
                    }
                }
            }
            None => {}
        }
    }
    false
}
