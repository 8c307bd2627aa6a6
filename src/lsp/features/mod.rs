//! Request providers.
//!
//! Every provider follows the same access pattern: resolve the URI, find
//! the offset node via the AST index, navigate with the utilities in
//! [`crate::compiler::navigation`], and translate the result into LSP
//! shapes. Providers are synchronous; the handlers decide what runs under
//! the scope lock.

pub mod code_actions;
pub mod completion;
pub mod definition;
pub mod document_symbol;
pub mod formatting;
pub mod hover;
pub mod implementation;
pub mod inlay_hints;
pub mod references;
pub mod rename;
pub mod semantic_tokens;
pub mod signature_help;
pub mod spock;
pub mod type_definition;
pub mod workspace_symbol;

use std::sync::Arc;

use tower_lsp::lsp_types::{Location, Position, Range, Url};

use crate::compiler::ast::AstNode;
use crate::lsp::backend::ast_index::AstIndex;

/// Location of a node, when it has both an owning URI and a range.
pub fn node_location(index: &AstIndex, node: &Arc<AstNode>) -> Option<Location> {
    let uri = index.uri_of(node)?.clone();
    let range = node.range?;
    Some(Location { uri, range })
}

/// Range of the identifier inside a declaration whose node range spans the
/// whole declaration: scan the first source line of the node for the name.
pub fn identifier_range(node: &AstNode, source_line: Option<&str>) -> Option<Range> {
    let range = node.range?;
    let name = node.name()?;
    let line = source_line?;
    let column = find_identifier(line, name)?;
    Some(Range::new(
        Position::new(range.start.line, column as u32),
        Position::new(range.start.line, (column + name.len()) as u32),
    ))
}

/// First occurrence of `name` in `line` that is not part of a longer
/// identifier.
pub fn find_identifier(line: &str, name: &str) -> Option<usize> {
    if name.is_empty() {
        return None;
    }
    let mut from = 0;
    while let Some(at) = line[from..].find(name) {
        let start = from + at;
        let end = start + name.len();
        let before_ok = start == 0
            || !line[..start]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$');
        let after_ok = end >= line.len()
            || !line[end..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$');
        if before_ok && after_ok {
            return Some(start);
        }
        from = end;
    }
    None
}

/// Virtual URI for a decompiled classpath class.
pub fn decompiled_uri(fully_qualified_name: &str) -> Option<Url> {
    Url::parse(&format!(
        "{}://{}",
        crate::lsp::backend::state::DECOMPILED_SCHEME,
        fully_qualified_name
    ))
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_identifier_respects_word_boundaries() {
        assert_eq!(find_identifier("int foo(String s)", "foo"), Some(4));
        assert_eq!(find_identifier("int foobar(int foo)", "foo"), Some(15));
        assert_eq!(find_identifier("foofoo", "foo"), None);
        assert_eq!(find_identifier("x.foo()", "foo"), Some(2));
    }

    #[test]
    fn decompiled_uri_scheme() {
        let uri = decompiled_uri("java.util.List").unwrap();
        assert_eq!(uri.scheme(), "groovy-lsp-decompiled");
        assert!(uri.as_str().contains("java.util.List"));
    }
}
