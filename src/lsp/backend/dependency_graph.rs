//! File-level dependency graph for incremental recompilation.
//!
//! Bidirectional edges: `forward` maps a file to the files it depends on,
//! `reverse` maps a file to its dependents. When a file's public API
//! changes, the transitive closure over `reverse` is exactly the set of
//! files that must be recompiled.
//!
//! Writers are serialised by the owning scope's recompile lock; the maps
//! themselves allow lock-free concurrent reads.

use std::collections::{HashSet, VecDeque};

use dashmap::DashMap;
use tower_lsp::lsp_types::Url;
use tracing::debug;

/// Bidirectional file→file dependency graph.
///
/// Invariants: `b ∈ forward[a] ⇔ a ∈ reverse[b]`, and no file is ever its
/// own dependency.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    forward: DashMap<Url, HashSet<Url>>,
    reverse: DashMap<Url, HashSet<Url>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph::default()
    }

    /// Replace the dependency set of `file`, diffing old against new to keep
    /// the reverse index in sync. An empty set removes the file's forward
    /// entry entirely. Self-edges are dropped.
    pub fn update_dependencies(&self, file: &Url, new_deps: HashSet<Url>) {
        let mut new_deps = new_deps;
        new_deps.remove(file);

        let old_deps = if new_deps.is_empty() {
            self.forward.remove(file).map(|(_, v)| v).unwrap_or_default()
        } else {
            self.forward
                .insert(file.clone(), new_deps.clone())
                .unwrap_or_default()
        };

        for removed in old_deps.difference(&new_deps) {
            if let Some(mut dependents) = self.reverse.get_mut(removed) {
                dependents.remove(file);
            }
        }
        for added in new_deps.difference(&old_deps) {
            self.reverse
                .entry(added.clone())
                .or_default()
                .insert(file.clone());
        }

        debug!(
            "dependencies of {} updated: {} entries",
            file,
            new_deps.len()
        );
    }

    pub fn direct_dependencies(&self, file: &Url) -> HashSet<Url> {
        self.forward.get(file).map(|d| d.clone()).unwrap_or_default()
    }

    pub fn direct_dependents(&self, file: &Url) -> HashSet<Url> {
        self.reverse.get(file).map(|d| d.clone()).unwrap_or_default()
    }

    /// All files transitively depending on any file in `changed`, excluding
    /// the changed files themselves. BFS over the reverse index; the
    /// visited set makes it terminate on cycles.
    pub fn transitive_dependents(&self, changed: &HashSet<Url>) -> HashSet<Url> {
        let mut visited: HashSet<Url> = changed.clone();
        let mut queue: VecDeque<Url> = changed.iter().cloned().collect();
        let mut dependents = HashSet::new();

        while let Some(current) = queue.pop_front() {
            if let Some(direct) = self.reverse.get(&current) {
                for dependent in direct.iter() {
                    if visited.insert(dependent.clone()) {
                        dependents.insert(dependent.clone());
                        queue.push_back(dependent.clone());
                    }
                }
            }
        }
        dependents
    }

    /// Remove every edge touching `file`, including reverse entries for a
    /// file that only ever appeared as a dependency.
    pub fn remove_file(&self, file: &Url) {
        if let Some((_, deps)) = self.forward.remove(file) {
            for dep in deps {
                if let Some(mut dependents) = self.reverse.get_mut(&dep) {
                    dependents.remove(file);
                }
            }
        }
        if let Some((_, dependents)) = self.reverse.remove(file) {
            for dependent in dependents {
                if let Some(mut deps) = self.forward.get_mut(&dependent) {
                    deps.remove(file);
                }
            }
        }
    }

    pub fn clear(&self) {
        self.forward.clear();
        self.reverse.clear();
    }

    /// Number of files present in either direction of the graph.
    pub fn size(&self) -> usize {
        let mut files: HashSet<Url> = HashSet::new();
        for entry in self.forward.iter() {
            files.insert(entry.key().clone());
        }
        for entry in self.reverse.iter() {
            files.insert(entry.key().clone());
        }
        files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty() && self.reverse.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(name: &str) -> Url {
        Url::parse(&format!("file:///ws/{name}.groovy")).unwrap()
    }

    fn set(names: &[&str]) -> HashSet<Url> {
        names.iter().map(|n| uri(n)).collect()
    }

    #[test]
    fn update_synchronises_reverse_index() {
        let graph = DependencyGraph::new();
        graph.update_dependencies(&uri("c"), set(&["a", "b"]));

        assert_eq!(graph.direct_dependencies(&uri("c")), set(&["a", "b"]));
        assert_eq!(graph.direct_dependents(&uri("a")), set(&["c"]));
        assert_eq!(graph.direct_dependents(&uri("b")), set(&["c"]));

        // Replace: b dropped, d added.
        graph.update_dependencies(&uri("c"), set(&["a", "d"]));
        assert_eq!(graph.direct_dependencies(&uri("c")), set(&["a", "d"]));
        assert!(graph.direct_dependents(&uri("b")).is_empty());
        assert_eq!(graph.direct_dependents(&uri("d")), set(&["c"]));
    }

    #[test]
    fn empty_update_removes_forward_entry() {
        let graph = DependencyGraph::new();
        graph.update_dependencies(&uri("c"), set(&["a"]));
        graph.update_dependencies(&uri("c"), HashSet::new());

        assert!(graph.direct_dependencies(&uri("c")).is_empty());
        assert!(graph.direct_dependents(&uri("a")).is_empty());
    }

    #[test]
    fn self_edges_are_dropped() {
        let graph = DependencyGraph::new();
        graph.update_dependencies(&uri("a"), set(&["a", "b"]));

        assert_eq!(graph.direct_dependencies(&uri("a")), set(&["b"]));
        assert!(!graph.direct_dependents(&uri("a")).contains(&uri("a")));
    }

    #[test]
    fn transitive_dependents_walks_chains_and_excludes_input() {
        let graph = DependencyGraph::new();
        // b depends on a, c on b, d on c.
        graph.update_dependencies(&uri("b"), set(&["a"]));
        graph.update_dependencies(&uri("c"), set(&["b"]));
        graph.update_dependencies(&uri("d"), set(&["c"]));

        let dependents = graph.transitive_dependents(&set(&["a"]));
        assert_eq!(dependents, set(&["b", "c", "d"]));
        assert!(dependents.is_disjoint(&set(&["a"])));
    }

    #[test]
    fn transitive_dependents_terminates_on_cycles() {
        let graph = DependencyGraph::new();
        graph.update_dependencies(&uri("a"), set(&["c"]));
        graph.update_dependencies(&uri("b"), set(&["a"]));
        graph.update_dependencies(&uri("c"), set(&["b"]));

        let dependents = graph.transitive_dependents(&set(&["a"]));
        assert_eq!(dependents, set(&["b", "c"]));
    }

    #[test]
    fn diamond_counts_each_dependent_once() {
        let graph = DependencyGraph::new();
        graph.update_dependencies(&uri("b"), set(&["a"]));
        graph.update_dependencies(&uri("c"), set(&["a"]));
        graph.update_dependencies(&uri("d"), set(&["b", "c"]));

        assert_eq!(
            graph.transitive_dependents(&set(&["a"])),
            set(&["b", "c", "d"])
        );
    }

    #[test]
    fn multi_file_input_set() {
        let graph = DependencyGraph::new();
        graph.update_dependencies(&uri("x"), set(&["a"]));
        graph.update_dependencies(&uri("y"), set(&["b"]));

        let dependents = graph.transitive_dependents(&set(&["a", "b"]));
        assert_eq!(dependents, set(&["x", "y"]));
    }

    #[test]
    fn remove_file_scrubs_both_directions() {
        let graph = DependencyGraph::new();
        graph.update_dependencies(&uri("b"), set(&["a"]));
        graph.update_dependencies(&uri("c"), set(&["b"]));
        assert_eq!(graph.size(), 3);

        graph.remove_file(&uri("b"));
        assert!(graph.direct_dependencies(&uri("b")).is_empty());
        assert!(graph.direct_dependents(&uri("b")).is_empty());
        assert!(graph.direct_dependents(&uri("a")).is_empty());
        assert!(graph.direct_dependencies(&uri("c")).is_empty());
    }

    #[test]
    fn remove_dependency_only_file() {
        let graph = DependencyGraph::new();
        // 'a' only ever appears as a dependency.
        graph.update_dependencies(&uri("b"), set(&["a"]));

        graph.remove_file(&uri("a"));
        assert!(graph.direct_dependencies(&uri("b")).is_empty());
        assert!(graph.transitive_dependents(&set(&["a"])).is_empty());
    }

    #[test]
    fn clear_and_counts() {
        let graph = DependencyGraph::new();
        graph.update_dependencies(&uri("b"), set(&["a"]));
        graph.update_dependencies(&uri("c"), set(&["a", "b"]));
        assert_eq!(graph.size(), 3);
        assert!(!graph.is_empty());

        graph.clear();
        assert_eq!(graph.size(), 0);
        assert!(graph.is_empty());
    }

    #[test]
    fn forward_reverse_symmetry_under_random_updates() {
        use quickcheck::quickcheck;

        fn holds(updates: Vec<(u8, Vec<u8>)>) -> bool {
            let graph = DependencyGraph::new();
            for (file, deps) in &updates {
                let deps: HashSet<Url> = deps.iter().map(|d| uri(&format!("f{d}"))).collect();
                graph.update_dependencies(&uri(&format!("f{file}")), deps);
            }
            // b ∈ forward[a] ⇔ a ∈ reverse[b], and no self edges.
            for entry in graph.forward.iter() {
                let a = entry.key();
                for b in entry.value() {
                    if a == b {
                        return false;
                    }
                    if !graph.direct_dependents(b).contains(a) {
                        return false;
                    }
                }
            }
            for entry in graph.reverse.iter() {
                let b = entry.key();
                for a in entry.value() {
                    if !graph.direct_dependencies(a).contains(b) {
                        return false;
                    }
                }
            }
            true
        }
        quickcheck(holds as fn(Vec<(u8, Vec<u8>)>) -> bool);
    }
}
