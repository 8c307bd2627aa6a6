//! Find-references and document highlight.

use tower_lsp::lsp_types::{DocumentHighlight, Location, Position, Url};

use crate::compiler::navigation;
use crate::lsp::backend::ast_index::AstIndex;
use crate::lsp::features::node_location;

/// All reference sites of the symbol at the position, optionally with its
/// declaration.
pub fn references(
    index: &AstIndex,
    uri: &Url,
    position: Position,
    include_declaration: bool,
) -> Vec<Location> {
    let Some(node) = index.node_at(uri, position) else {
        return Vec::new();
    };
    let Some(target) = navigation::definition_of(index, &node, true) else {
        return Vec::new();
    };

    let mut locations: Vec<Location> = navigation::references_of(index, &target)
        .into_iter()
        .filter_map(|(_, reference)| node_location(index, &reference))
        .collect();
    if include_declaration {
        if let Some(declaration) = node_location(index, &target) {
            locations.insert(0, declaration);
        }
    }
    locations
}

/// Highlights are references filtered to the requested document.
pub fn document_highlight(
    index: &AstIndex,
    uri: &Url,
    position: Position,
) -> Vec<DocumentHighlight> {
    references(index, uri, position, true)
        .into_iter()
        .filter(|location| location.uri == *uri)
        .map(|location| DocumentHighlight {
            range: location.range,
            kind: None,
        })
        .collect()
}
