//! Compact classpath symbol records and the per-scope symbol index.
//!
//! A [`ClasspathSymbolIndex`] is the small, immutable projection a project
//! scope holds on to: roughly two orders of magnitude lighter than the scan
//! it was projected from, so a scope can keep it for its whole lifetime
//! without pinning a scan cache entry.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::classpath::classfile::ClassKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    Class,
    Interface,
    Enum,
    Annotation,
}

impl From<ClassKind> for SymbolKind {
    fn from(kind: ClassKind) -> Self {
        match kind {
            ClassKind::Class => SymbolKind::Class,
            ClassKind::Interface => SymbolKind::Interface,
            ClassKind::Enum => SymbolKind::Enum,
            ClassKind::Annotation => SymbolKind::Annotation,
        }
    }
}

/// One external class visible on a classpath.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClasspathSymbol {
    pub fully_qualified_name: String,
    pub simple_name: String,
    pub package_name: String,
    pub kind: SymbolKind,
    /// Canonical filesystem path of the containing archive or directory;
    /// `None` for JDK module classes.
    pub classpath_element_path: Option<String>,
}

impl ClasspathSymbol {
    pub fn new(
        fully_qualified_name: impl Into<String>,
        kind: SymbolKind,
        classpath_element_path: Option<String>,
    ) -> Self {
        let fully_qualified_name = fully_qualified_name.into();
        let (package_name, simple_name) = match fully_qualified_name.rsplit_once('.') {
            Some((pkg, simple)) => (pkg.to_string(), simple.to_string()),
            None => (String::new(), fully_qualified_name.clone()),
        };
        ClasspathSymbol {
            fully_qualified_name,
            simple_name,
            package_name,
            kind,
            classpath_element_path,
        }
    }
}

/// Immutable symbol list plus the set of package names it spans.
#[derive(Debug, Clone, Default)]
pub struct ClasspathSymbolIndex {
    symbols: Arc<Vec<ClasspathSymbol>>,
    package_names: Arc<BTreeSet<String>>,
}

impl ClasspathSymbolIndex {
    pub fn new(symbols: Vec<ClasspathSymbol>) -> Self {
        let package_names = symbols
            .iter()
            .map(|s| s.package_name.clone())
            .collect::<BTreeSet<_>>();
        ClasspathSymbolIndex {
            symbols: Arc::new(symbols),
            package_names: Arc::new(package_names),
        }
    }

    pub fn all_symbols(&self) -> &[ClasspathSymbol] {
        &self.symbols
    }

    pub fn package_names(&self) -> &BTreeSet<String> {
        &self.package_names
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Symbols restricted to the given classpath elements. Symbols without
    /// an element path (JDK module classes) always pass. A `None` or empty
    /// filter returns the full list without copying.
    pub fn symbols(&self, element_filter: Option<&HashSet<String>>) -> Cow<'_, [ClasspathSymbol]> {
        match element_filter {
            None => Cow::Borrowed(self.all_symbols()),
            Some(filter) if filter.is_empty() => Cow::Borrowed(self.all_symbols()),
            Some(filter) => Cow::Owned(
                self.symbols
                    .iter()
                    .filter(|s| {
                        s.classpath_element_path
                            .as_ref()
                            .map(|p| filter.contains(p))
                            .unwrap_or(true)
                    })
                    .cloned()
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(fqn: &str, element: Option<&str>) -> ClasspathSymbol {
        ClasspathSymbol::new(fqn, SymbolKind::Class, element.map(str::to_string))
    }

    #[test]
    fn name_parts_are_split() {
        let s = symbol("com.example.Widget", Some("/lib/core.jar"));
        assert_eq!(s.simple_name, "Widget");
        assert_eq!(s.package_name, "com.example");

        let default_pkg = symbol("TopLevel", None);
        assert_eq!(default_pkg.simple_name, "TopLevel");
        assert_eq!(default_pkg.package_name, "");
    }

    #[test]
    fn empty_filter_returns_borrowed() {
        let index = ClasspathSymbolIndex::new(vec![
            symbol("com.example.A", Some("/lib/core.jar")),
            symbol("com.example.B", Some("/lib/util.jar")),
        ]);
        assert!(matches!(index.symbols(None), Cow::Borrowed(_)));
        let empty = HashSet::new();
        assert!(matches!(index.symbols(Some(&empty)), Cow::Borrowed(_)));
    }

    #[test]
    fn filter_keeps_matching_and_pathless_symbols() {
        let index = ClasspathSymbolIndex::new(vec![
            symbol("com.example.A", Some("/lib/core.jar")),
            symbol("com.example.B", Some("/lib/util.jar")),
            symbol("java.util.List", None),
        ]);
        let filter: HashSet<String> = ["/lib/core.jar".to_string()].into_iter().collect();
        let filtered = index.symbols(Some(&filter));
        let names: Vec<&str> = filtered
            .iter()
            .map(|s| s.fully_qualified_name.as_str())
            .collect();
        assert_eq!(names, vec!["com.example.A", "java.util.List"]);
    }

    #[test]
    fn package_names_collected() {
        let index = ClasspathSymbolIndex::new(vec![
            symbol("com.example.A", None),
            symbol("com.example.util.B", None),
            symbol("com.example.C", None),
        ]);
        assert_eq!(index.package_names().len(), 2);
        assert!(index.package_names().contains("com.example"));
        assert!(index.package_names().contains("com.example.util"));
    }
}
