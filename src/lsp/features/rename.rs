//! Rename: prepare returns the renameable token range, execute emits a
//! workspace edit over every reference, plus a file rename when a
//! top-level class changes name.
//!
//! Node ranges span whole declarations, so the token range comes from a
//! search within the first source line of the node rather than the AST.

use std::sync::Arc;

use tower_lsp::lsp_types::{
    DocumentChangeOperation, DocumentChanges, OneOf, OptionalVersionedTextDocumentIdentifier,
    Position, Range, RenameFile, ResourceOp, TextDocumentEdit, TextEdit, Url, WorkspaceEdit,
};

use crate::compiler::ast::{AstNode, NodeKind};
use crate::compiler::navigation;
use crate::lsp::backend::ast_index::AstIndex;
use crate::lsp::backend::contents_tracker::{line_at, FileContentsTracker};
use crate::lsp::features::{find_identifier, identifier_range};

/// Range of the token the client may rename, or `None` when the position
/// is not on a renameable symbol.
pub fn prepare_rename(
    index: &AstIndex,
    tracker: &FileContentsTracker,
    uri: &Url,
    position: Position,
) -> Option<Range> {
    let node = index.node_at(uri, position)?;
    let target = navigation::definition_of(index, &node, true)?;
    if !is_renameable(&target) {
        return None;
    }
    token_range(index, tracker, &node)
}

pub fn rename(
    index: &AstIndex,
    tracker: &FileContentsTracker,
    uri: &Url,
    position: Position,
    new_name: &str,
) -> Option<WorkspaceEdit> {
    let node = index.node_at(uri, position)?;
    let target = navigation::definition_of(index, &node, true)?;
    if !is_renameable(&target) || new_name.is_empty() {
        return None;
    }

    let mut edits_by_uri: Vec<(Url, Vec<TextEdit>)> = Vec::new();
    let mut push_edit = |uri: Url, range: Range| {
        let edit = TextEdit {
            range,
            new_text: new_name.to_string(),
        };
        match edits_by_uri.iter_mut().find(|(u, _)| *u == uri) {
            Some((_, edits)) => {
                if !edits.iter().any(|e| e.range == range) {
                    edits.push(edit);
                }
            }
            None => edits_by_uri.push((uri, vec![edit])),
        }
    };

    if let Some(range) = token_range(index, tracker, &target) {
        let decl_uri = index.uri_of(&target)?.clone();
        push_edit(decl_uri, range);
    }
    for (ref_uri, reference) in navigation::references_of(index, &target) {
        if let Some(range) = token_range(index, tracker, &reference) {
            push_edit(ref_uri, range);
        }
    }

    let mut operations: Vec<DocumentChangeOperation> = edits_by_uri
        .into_iter()
        .map(|(uri, edits)| {
            DocumentChangeOperation::Edit(TextDocumentEdit {
                text_document: OptionalVersionedTextDocumentIdentifier {
                    uri,
                    version: None,
                },
                edits: edits.into_iter().map(OneOf::Left).collect(),
            })
        })
        .collect();

    // Renaming a top-level class whose file carries its name also renames
    // the file.
    if let Some(rename_op) = file_rename_operation(index, &target, new_name) {
        operations.push(DocumentChangeOperation::Op(ResourceOp::Rename(rename_op)));
    }

    Some(WorkspaceEdit {
        changes: None,
        document_changes: Some(DocumentChanges::Operations(operations)),
        change_annotations: None,
    })
}

fn is_renameable(node: &Arc<AstNode>) -> bool {
    matches!(
        node.kind,
        NodeKind::Class(_)
            | NodeKind::Method(_)
            | NodeKind::Field(_)
            | NodeKind::Property(_)
            | NodeKind::Parameter(_)
            | NodeKind::Variable(_)
    )
}

/// Identifier range of a node, via a regex-free scan of the node's first
/// source line. References already cover just the identifier; declarations
/// need the scan.
fn token_range(
    index: &AstIndex,
    tracker: &FileContentsTracker,
    node: &Arc<AstNode>,
) -> Option<Range> {
    let range = node.range?;
    let uri = index.uri_of(node)?;
    let name = simple_name_of(node)?;

    if let Some(text) = tracker.contents(uri) {
        if let Some(line) = line_at(&text, range.start.line) {
            if let Some(found) = identifier_range_for_name(node, line, &name) {
                return Some(found);
            }
        }
    }
    // Fall back to the node range when the buffer is unavailable; only
    // correct for reference nodes, which is what it is used for.
    Some(range)
}

fn identifier_range_for_name(node: &Arc<AstNode>, line: &str, name: &str) -> Option<Range> {
    if node.name() == Some(name) {
        return identifier_range(node, Some(line));
    }
    let range = node.range?;
    let column = find_identifier(line, name)?;
    Some(Range::new(
        Position::new(range.start.line, column as u32),
        Position::new(range.start.line, (column + name.len()) as u32),
    ))
}

/// Classes rename by simple name; the fully qualified name stays derived
/// from the package.
fn simple_name_of(node: &Arc<AstNode>) -> Option<String> {
    match &node.kind {
        NodeKind::Class(data) => Some(data.simple_name().to_string()),
        _ => node.name().map(str::to_string),
    }
}

fn file_rename_operation(
    index: &AstIndex,
    target: &Arc<AstNode>,
    new_name: &str,
) -> Option<RenameFile> {
    let data = target.class_data()?;
    if index.parent_of(target).is_some() {
        return None; // nested class
    }
    let uri = index.uri_of(target)?;
    let path = uri.to_file_path().ok()?;
    let stem = path.file_stem()?.to_str()?;
    if stem != data.simple_name() {
        return None;
    }
    let new_path = path.with_file_name(format!("{new_name}.groovy"));
    Some(RenameFile {
        old_uri: uri.clone(),
        new_uri: Url::from_file_path(new_path).ok()?,
        options: None,
        annotation_id: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::{ClassData, ExprData, ExprKind, MethodData, Modifiers};

    fn uri(name: &str) -> Url {
        Url::parse(&format!("file:///ws/{name}.groovy")).unwrap()
    }

    fn span(sl: u32, sc: u32, el: u32, ec: u32) -> Option<Range> {
        Some(Range::new(Position::new(sl, sc), Position::new(el, ec)))
    }

    fn simple_class(name: &str, children: Vec<Arc<AstNode>>) -> Arc<AstNode> {
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
            span(0, 0, 4, 1),
            children,
        )
    }

    #[test]
    fn prepare_returns_identifier_token_range() {
        let mut index = AstIndex::new();
        let tracker = FileContentsTracker::new();
        let method = AstNode::new(
            NodeKind::Method(MethodData {
                name: "greet".to_string(),
                return_type: "String".to_string(),
                modifiers: Modifiers::default(),
            }),
            span(1, 4, 2, 5),
            vec![],
        );
        index.register_module(&uri("a"), None, &[simple_class("A", vec![method])]);
        tracker.open(
            uri("a"),
            "class A {\n    String greet(String who) {\n    }\n}\n".to_string(),
        );

        let range = prepare_rename(&index, &tracker, &uri("a"), Position::new(1, 12)).unwrap();
        assert_eq!(range.start, Position::new(1, 11));
        assert_eq!(range.end, Position::new(1, 16));
    }

    #[test]
    fn rename_edits_declaration_and_references() {
        let mut index = AstIndex::new();
        let tracker = FileContentsTracker::new();

        index.register_module(&uri("Shared"), None, &[simple_class("Shared", vec![])]);
        tracker.open(uri("Shared"), "class Shared {\n}\n".to_string());

        let reference = AstNode::new(
            NodeKind::Expression(ExprData {
                kind: ExprKind::ClassRef {
                    name: "Shared".to_string(),
                },
                inferred_type: None,
            }),
            span(1, 4, 1, 10),
            vec![],
        );
        index.register_module(&uri("user"), None, &[simple_class("User", vec![reference])]);
        tracker.open(uri("user"), "class User {\n    Shared s\n}\n".to_string());

        let edit =
            rename(&index, &tracker, &uri("Shared"), Position::new(0, 8), "Common").unwrap();
        let DocumentChanges::Operations(operations) = edit.document_changes.unwrap() else {
            panic!("expected operations");
        };

        let mut edited_uris = Vec::new();
        let mut saw_file_rename = false;
        for operation in &operations {
            match operation {
                DocumentChangeOperation::Edit(edit) => {
                    edited_uris.push(edit.text_document.uri.clone());
                }
                DocumentChangeOperation::Op(ResourceOp::Rename(rename)) => {
                    saw_file_rename = true;
                    assert!(rename.new_uri.as_str().ends_with("Common.groovy"));
                }
                _ => {}
            }
        }
        assert!(edited_uris.contains(&uri("Shared")));
        assert!(edited_uris.contains(&uri("user")));
        assert!(saw_file_rename, "top-level class rename moves the file");
    }

    #[test]
    fn non_renameable_position_returns_none() {
        let mut index = AstIndex::new();
        let tracker = FileContentsTracker::new();
        index.register_module(&uri("a"), None, &[simple_class("A", vec![])]);
        // Position outside any node.
        assert!(prepare_rename(&index, &tracker, &uri("a"), Position::new(9, 0)).is_none());
    }
}
