//! Go-to-definition, with decompiled fallback for classpath types.
//!
//! Resolution order: strict project definition; non-strict resolution for
//! external types; then decompile the classfile into a synthetic virtual
//! document and point at the declaration inside it.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use tower_lsp::lsp_types::{
    GotoDefinitionResponse, Location, Position, Range, Url,
};
use tracing::debug;
use zip::ZipArchive;

use crate::classpath::classfile::{parse_class_file, render_stub};
use crate::compiler::navigation;
use crate::lsp::backend::ast_index::AstIndex;
use crate::lsp::backend::scope::ScopeClasspath;
use crate::lsp::features::{decompiled_uri, node_location};

pub fn definition(
    index: &AstIndex,
    uri: &Url,
    position: Position,
    classpath: Option<&ScopeClasspath>,
    decompiled: &DashMap<Url, String>,
) -> Option<GotoDefinitionResponse> {
    let node = index.node_at(uri, position)?;

    if let Some(target) = navigation::definition_of(index, &node, true) {
        if let Some(location) = node_location(index, &target) {
            return Some(GotoDefinitionResponse::Scalar(location));
        }
    }

    // External type: resolve loosely to get the name, then decompile.
    let target = navigation::definition_of(index, &node, false)?;
    let fqn = target.name()?;
    let member = member_hint(&node);
    let location = decompile_location(fqn, member.as_deref(), classpath, decompiled)?;
    Some(GotoDefinitionResponse::Scalar(location))
}

/// When the offset node is a member access on an external type, the
/// decompiled document should point at that member, not the class header.
fn member_hint(node: &Arc<crate::compiler::ast::AstNode>) -> Option<String> {
    use crate::compiler::ast::{ExprKind, NodeKind};
    match &node.kind {
        NodeKind::Expression(expr) => match &expr.kind {
            ExprKind::MethodCall { name, .. } | ExprKind::PropertyAccess { name } => {
                Some(name.clone())
            }
            _ => None,
        },
        _ => None,
    }
}

/// Render (or reuse) the declaration stub for a classpath type and return a
/// location inside the virtual document.
pub fn decompile_location(
    fully_qualified_name: &str,
    member: Option<&str>,
    classpath: Option<&ScopeClasspath>,
    decompiled: &DashMap<Url, String>,
) -> Option<Location> {
    let classpath = classpath?;
    let symbol = classpath
        .index
        .all_symbols()
        .iter()
        .find(|s| s.fully_qualified_name == fully_qualified_name)?;
    // JDK module classes carry no element path we can read from.
    let element = symbol.classpath_element_path.as_deref()?;

    let bytes = read_class_bytes(Path::new(element), fully_qualified_name)?;
    let class = match parse_class_file(&bytes) {
        Ok(class) => class,
        Err(e) => {
            debug!("cannot decompile {fully_qualified_name}: {e}");
            return None;
        }
    };
    let stub = render_stub(&class);

    let line = member
        .and_then(|m| {
            stub.member_lines
                .iter()
                .find(|(name, _)| name == m)
                .map(|(_, line)| *line)
        })
        .unwrap_or(stub.declaration_line);

    let uri = decompiled_uri(fully_qualified_name)?;
    decompiled.insert(uri.clone(), stub.text);
    Some(Location {
        uri,
        range: Range::new(Position::new(line, 0), Position::new(line, 1)),
    })
}

fn read_class_bytes(element: &Path, fully_qualified_name: &str) -> Option<Vec<u8>> {
    let entry = format!("{}.class", fully_qualified_name.replace('.', "/"));
    if element.is_dir() {
        return std::fs::read(element.join(&entry)).ok();
    }
    let file = File::open(element).ok()?;
    let mut archive = ZipArchive::new(file).ok()?;
    let mut zipped = archive.by_name(&entry).ok()?;
    let mut bytes = Vec::new();
    zipped.read_to_end(&mut bytes).ok()?;
    Some(bytes)
}
