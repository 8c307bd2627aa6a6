//! Query-optimised projection of the frontend's AST.
//!
//! Per-URI node lists in document order, class nodes by file and by fully
//! qualified name, a parent table keyed by node identity, and the dependency
//! facts needed to resolve file→file edges.
//!
//! # Snapshots
//!
//! The incremental recompile path never mutates an index readers may hold.
//! [`AstIndex::snapshot_excluding`] forks the outer maps while sharing the
//! per-URI node lists (`Arc`); the orchestrator then re-registers the changed
//! files into the fork and swaps it in. Readers of the old index observe a
//! stable state for the whole request.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tower_lsp::lsp_types::{Position, Range, Url};

use crate::compiler::ast::{AstNode, ExprKind, ImportData, NodeId, NodeKind};

/// Package roots owned by the language and the hosting runtime. Types under
/// these are external by definition and never become project dependencies.
pub const RESERVED_PREFIXES: &[&str] = &[
    "groovy.",
    "org.codehaus.groovy.",
    "org.apache.groovy.",
    "java.",
    "javax.",
    "jdk.",
    "sun.",
    "com.sun.",
];

const PRIMITIVES: &[&str] = &[
    "void", "boolean", "byte", "char", "short", "int", "long", "float", "double", "def",
];

/// A second class declaration for an already-registered fully qualified
/// name. The first registration wins; the duplicate is surfaced as a
/// diagnostic at its declaration site.
#[derive(Debug, Clone)]
pub struct DuplicateClass {
    pub name: String,
    pub uri: Url,
    pub range: Option<Range>,
}

#[derive(Debug, Clone)]
struct ParentEntry {
    parent: Option<Arc<AstNode>>,
    uri: Url,
}

/// Unresolved dependency facts of one file, resolved on demand against the
/// currently known classes.
#[derive(Debug, Clone, Default)]
struct DependencyFacts {
    package: Option<String>,
    imports: Vec<ImportData>,
    /// Type names as written in source: simple or qualified.
    type_names: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct AstIndex {
    nodes_by_uri: FxHashMap<Url, Arc<Vec<Arc<AstNode>>>>,
    class_nodes_by_uri: FxHashMap<Url, Arc<Vec<Arc<AstNode>>>>,
    class_nodes_by_name: FxHashMap<String, Arc<AstNode>>,
    parents: FxHashMap<NodeId, ParentEntry>,
    facts_by_uri: FxHashMap<Url, DependencyFacts>,
}

impl AstIndex {
    pub fn new() -> Self {
        AstIndex::default()
    }

    /// Register one file's AST. Replaces any existing data for the URI.
    /// Returns duplicate class declarations for the diagnostic handler.
    pub fn register_module(
        &mut self,
        uri: &Url,
        package: Option<&str>,
        top_level: &[Arc<AstNode>],
    ) -> Vec<DuplicateClass> {
        self.unregister_uri(uri);

        let mut flat = Vec::new();
        let mut classes = Vec::new();
        let mut facts = DependencyFacts {
            package: package.map(str::to_string),
            ..DependencyFacts::default()
        };
        let mut duplicates = Vec::new();

        for node in top_level {
            self.register_subtree(uri, node, None, &mut flat, &mut classes, &mut facts);
        }

        for class in &classes {
            let name = class
                .class_data()
                .map(|c| c.name.clone())
                .unwrap_or_default();
            match self.class_nodes_by_name.entry(name.clone()) {
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(class.clone());
                }
                std::collections::hash_map::Entry::Occupied(existing) => {
                    if existing.get().id() != class.id() {
                        duplicates.push(DuplicateClass {
                            name,
                            uri: uri.clone(),
                            range: class.range,
                        });
                    }
                }
            }
        }

        self.nodes_by_uri.insert(uri.clone(), Arc::new(flat));
        self.class_nodes_by_uri
            .insert(uri.clone(), Arc::new(classes));
        self.facts_by_uri.insert(uri.clone(), facts);
        duplicates
    }

    fn register_subtree(
        &mut self,
        uri: &Url,
        node: &Arc<AstNode>,
        parent: Option<&Arc<AstNode>>,
        flat: &mut Vec<Arc<AstNode>>,
        classes: &mut Vec<Arc<AstNode>>,
        facts: &mut DependencyFacts,
    ) {
        flat.push(node.clone());
        self.parents.insert(
            node.id(),
            ParentEntry {
                parent: parent.cloned(),
                uri: uri.clone(),
            },
        );

        match &node.kind {
            NodeKind::Class(data) => {
                classes.push(node.clone());
                if let Some(superclass) = &data.superclass {
                    facts.type_names.insert(superclass.clone());
                }
                for interface in &data.interfaces {
                    facts.type_names.insert(interface.clone());
                }
            }
            NodeKind::Import(data) => {
                facts.imports.push(data.clone());
            }
            NodeKind::Expression(expr) => match &expr.kind {
                ExprKind::ClassRef { name } | ExprKind::ConstructorCall { type_name: name } => {
                    facts.type_names.insert(name.clone());
                }
                _ => {}
            },
            _ => {
                if let Some(type_name) = node.declared_type_name() {
                    facts.type_names.insert(type_name.to_string());
                }
            }
        }

        for child in &node.children {
            self.register_subtree(uri, child, Some(node), flat, classes, facts);
        }
    }

    /// Drop every trace of a URI from all four maps.
    pub fn unregister_uri(&mut self, uri: &Url) {
        if let Some(nodes) = self.nodes_by_uri.remove(uri) {
            for node in nodes.iter() {
                self.parents.remove(&node.id());
            }
        }
        if let Some(classes) = self.class_nodes_by_uri.remove(uri) {
            for class in classes.iter() {
                if let Some(name) = class.class_data().map(|c| c.name.as_str()) {
                    if self
                        .class_nodes_by_name
                        .get(name)
                        .is_some_and(|n| n.id() == class.id())
                    {
                        self.class_nodes_by_name.remove(name);
                    }
                }
            }
        }
        self.facts_by_uri.remove(uri);
    }

    /// Replace this index's data for `uri` with the data a previous index
    /// held, re-registering class names after dropping any the failed
    /// compile had inserted. Used when a recompile degraded the AST.
    pub fn restore_from_previous(&mut self, uri: &Url, previous: &AstIndex) {
        self.unregister_uri(uri);

        let Some(nodes) = previous.nodes_by_uri.get(uri) else {
            return;
        };
        self.nodes_by_uri.insert(uri.clone(), nodes.clone());
        for node in nodes.iter() {
            if let Some(entry) = previous.parents.get(&node.id()) {
                self.parents.insert(node.id(), entry.clone());
            }
        }
        if let Some(classes) = previous.class_nodes_by_uri.get(uri) {
            self.class_nodes_by_uri.insert(uri.clone(), classes.clone());
            for class in classes.iter() {
                if let Some(name) = class.class_data().map(|c| c.name.clone()) {
                    self.class_nodes_by_name.entry(name).or_insert_with(|| class.clone());
                }
            }
        }
        if let Some(facts) = previous.facts_by_uri.get(uri) {
            self.facts_by_uri.insert(uri.clone(), facts.clone());
        }
    }

    /// Fork the index without any data for `excluded`. Inner node lists are
    /// shared; the original is not touched.
    pub fn snapshot_excluding(&self, excluded: &HashSet<Url>) -> AstIndex {
        let mut snapshot = AstIndex::new();

        let mut excluded_class_ids = HashSet::new();
        for uri in excluded {
            if let Some(classes) = self.class_nodes_by_uri.get(uri) {
                excluded_class_ids.extend(classes.iter().map(|c| c.id()));
            }
        }

        for (uri, nodes) in &self.nodes_by_uri {
            if !excluded.contains(uri) {
                snapshot.nodes_by_uri.insert(uri.clone(), nodes.clone());
            }
        }
        for (uri, classes) in &self.class_nodes_by_uri {
            if !excluded.contains(uri) {
                snapshot
                    .class_nodes_by_uri
                    .insert(uri.clone(), classes.clone());
            }
        }
        for (name, class) in &self.class_nodes_by_name {
            if !excluded_class_ids.contains(&class.id()) {
                snapshot
                    .class_nodes_by_name
                    .insert(name.clone(), class.clone());
            }
        }
        // Copy by stored URI even for transient nodes; a missing parent link
        // is "no parent", never an error.
        for (id, entry) in &self.parents {
            if !excluded.contains(&entry.uri) {
                snapshot.parents.insert(*id, entry.clone());
            }
        }
        for (uri, facts) in &self.facts_by_uri {
            if !excluded.contains(uri) {
                snapshot.facts_by_uri.insert(uri.clone(), facts.clone());
            }
        }
        snapshot
    }

    // ---- queries ----

    pub fn uris(&self) -> impl Iterator<Item = &Url> {
        self.nodes_by_uri.keys()
    }

    pub fn nodes(&self, uri: &Url) -> Option<&Arc<Vec<Arc<AstNode>>>> {
        self.nodes_by_uri.get(uri)
    }

    pub fn class_nodes(&self, uri: &Url) -> Option<&Arc<Vec<Arc<AstNode>>>> {
        self.class_nodes_by_uri.get(uri)
    }

    pub fn class_by_name(&self, name: &str) -> Option<&Arc<AstNode>> {
        self.class_nodes_by_name.get(name)
    }

    pub fn all_class_nodes(&self) -> impl Iterator<Item = &Arc<AstNode>> {
        self.class_nodes_by_uri.values().flat_map(|v| v.iter())
    }

    pub fn parent_of(&self, node: &AstNode) -> Option<&Arc<AstNode>> {
        self.parents.get(&node.id())?.parent.as_ref()
    }

    pub fn uri_of(&self, node: &AstNode) -> Option<&Url> {
        self.parents.get(&node.id()).map(|e| &e.uri)
    }

    pub fn package_of(&self, uri: &Url) -> Option<&str> {
        self.facts_by_uri.get(uri)?.package.as_deref()
    }

    pub fn imports_of(&self, uri: &Url) -> Vec<Arc<AstNode>> {
        self.nodes_by_uri
            .get(uri)
            .map(|nodes| {
                nodes
                    .iter()
                    .filter(|n| matches!(n.kind, NodeKind::Import(_)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `a` is a strict descendant of `b` per the parent table.
    pub fn is_descendant_of(&self, a: &AstNode, b: &AstNode) -> bool {
        let mut current = self.parent_of(a).cloned();
        while let Some(node) = current {
            if node.id() == b.id() {
                return true;
            }
            current = self.parent_of(&node).cloned();
        }
        false
    }

    /// Innermost node whose range contains the position.
    ///
    /// Among containing candidates: latest start wins, then earliest end,
    /// then the descendant; a constructor beats its class on identical
    /// ranges.
    pub fn node_at(&self, uri: &Url, position: Position) -> Option<Arc<AstNode>> {
        let nodes = self.nodes_by_uri.get(uri)?;
        let mut best: Option<&Arc<AstNode>> = None;
        for node in nodes.iter() {
            let Some(range) = node.range else { continue };
            if !range_contains(range, position) {
                continue;
            }
            best = Some(match best {
                None => node,
                Some(current) => self.narrower(current, node),
            });
        }
        best.cloned()
    }

    fn narrower<'a>(&self, a: &'a Arc<AstNode>, b: &'a Arc<AstNode>) -> &'a Arc<AstNode> {
        let ra = a.range.expect("candidate has a range");
        let rb = b.range.expect("candidate has a range");
        if ra.start != rb.start {
            return if position_after(rb.start, ra.start) { b } else { a };
        }
        if ra.end != rb.end {
            return if position_after(ra.end, rb.end) { b } else { a };
        }
        // Identical ranges. A constructor shares its class's range but is
        // the more useful answer.
        if b.is_constructor() && a.is_class() {
            return b;
        }
        if a.is_constructor() && b.is_class() {
            return a;
        }
        if self.is_descendant_of(b, a) {
            return b;
        }
        a
    }

    // ---- dependencies ----

    /// Fully qualified names of project classes this file depends on, from
    /// imports, explicit type references, and star imports expanded against
    /// the currently known classes. Reserved-library names are excluded.
    pub fn dependencies_of(&self, uri: &Url) -> BTreeSet<String> {
        let Some(facts) = self.facts_by_uri.get(uri) else {
            return BTreeSet::new();
        };
        let mut deps = BTreeSet::new();

        for import in &facts.imports {
            if import.is_star {
                let prefix = format!("{}.", import.name);
                for known in self.class_nodes_by_name.keys() {
                    if known.starts_with(&prefix)
                        && !known[prefix.len()..].contains('.')
                        && !is_reserved(known)
                    {
                        deps.insert(known.clone());
                    }
                }
            } else if !is_reserved(&import.name) {
                deps.insert(import.name.clone());
            }
        }

        for name in &facts.type_names {
            if let Some(resolved) = self.resolve_type_name(uri, name) {
                if !is_reserved(&resolved) {
                    deps.insert(resolved);
                }
            }
        }
        deps
    }

    /// Translate this file's dependency names into source URIs, dropping
    /// unresolved (external) names and self references.
    pub fn resolve_dependency_uris(&self, uri: &Url) -> HashSet<Url> {
        self.dependencies_of(uri)
            .iter()
            .filter_map(|name| self.class_nodes_by_name.get(name))
            .filter_map(|class| self.uri_of(class))
            .filter(|dep_uri| *dep_uri != uri)
            .cloned()
            .collect()
    }

    /// Resolve a type name written in `uri` to the fully qualified name of a
    /// known project class: as-written, via imports, same package, then star
    /// imports.
    pub fn resolve_type_name(&self, uri: &Url, written: &str) -> Option<String> {
        let written = written.trim_end_matches("[]");
        if written.is_empty() || PRIMITIVES.contains(&written) {
            return None;
        }
        if written.contains('.') {
            return self
                .class_nodes_by_name
                .contains_key(written)
                .then(|| written.to_string());
        }
        let facts = self.facts_by_uri.get(uri)?;
        for import in &facts.imports {
            if import.simple_name() == Some(written)
                && self.class_nodes_by_name.contains_key(&import.name)
            {
                return Some(import.name.clone());
            }
        }
        if let Some(package) = &facts.package {
            let candidate = format!("{package}.{written}");
            if self.class_nodes_by_name.contains_key(&candidate) {
                return Some(candidate);
            }
        }
        if self.class_nodes_by_name.contains_key(written) {
            return Some(written.to_string());
        }
        for import in &facts.imports {
            if import.is_star {
                let candidate = format!("{}.{written}", import.name);
                if self.class_nodes_by_name.contains_key(&candidate) {
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// Best-guess fully qualified name for a type written in `uri`, even
    /// when no project class matches: import binding, then same package,
    /// then the name as written.
    pub fn resolve_type_name_loose(&self, uri: &Url, written: &str) -> Option<String> {
        let written = written.trim_end_matches("[]");
        if written.is_empty() || PRIMITIVES.contains(&written) {
            return None;
        }
        if let Some(known) = self.resolve_type_name(uri, written) {
            return Some(known);
        }
        if written.contains('.') {
            return Some(written.to_string());
        }
        if let Some(facts) = self.facts_by_uri.get(uri) {
            for import in &facts.imports {
                if import.simple_name() == Some(written) {
                    return Some(import.name.clone());
                }
            }
        }
        Some(written.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.nodes_by_uri.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes_by_uri.clear();
        self.class_nodes_by_uri.clear();
        self.class_nodes_by_name.clear();
        self.parents.clear();
        self.facts_by_uri.clear();
    }
}

pub fn is_reserved(name: &str) -> bool {
    RESERVED_PREFIXES.iter().any(|p| name.starts_with(p))
}

fn position_after(a: Position, b: Position) -> bool {
    a > b
}

/// Containment with the column axis half-open when the position's line
/// equals the range's end line.
fn range_contains(range: Range, position: Position) -> bool {
    if position.line < range.start.line || position.line > range.end.line {
        return false;
    }
    if position.line == range.start.line && position.character < range.start.character {
        return false;
    }
    if position.line == range.end.line && position.character >= range.end.character {
        return false;
    }
    true
}
