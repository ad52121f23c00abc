//! GC-root views: reverse paths from objects to the roots keeping them
//! alive, the flat root list, and the per-class root summary.

use ahash::AHashMap;
use serde::Serialize;

use crate::bitset::VersionedBitset;
use crate::graph::{GcRootKind, ReferenceGraph};
use crate::pools::IndexStack;
use crate::report::hex_id;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathNode {
    pub id: String,
    pub class_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
}

/// A chain from a GC root (first node) down to the target object (last).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GcRootPath {
    pub root_type: String,
    pub nodes: Vec<PathNode>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GcRootEntry {
    pub id: String,
    pub class_name: String,
    pub root_type: String,
    pub shallow_size: u64,
    pub retained_size: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GcRootClassSummary {
    pub class_name: String,
    pub count: usize,
    pub retained_size: u64,
    pub primary_root_type: String,
}

/// Iterative-deepening DFS over incoming edges with one pooled visited set
/// and a single path stack.
pub struct PathFinder<'g> {
    graph: &'g ReferenceGraph,
    visited: VersionedBitset,
    path: IndexStack,
}

impl<'g> PathFinder<'g> {
    pub fn new(graph: &'g ReferenceGraph) -> Self {
        Self {
            graph,
            visited: VersionedBitset::new(graph.object_count()),
            path: IndexStack::default(),
        }
    }

    /// Paths from `start_id` to GC roots, shortest depths first. Each
    /// deepening round only records paths of exactly the current limit, so
    /// no path is reported twice.
    pub fn find_paths_to_gc_root(
        &mut self,
        start_id: u64,
        max_paths: usize,
        max_depth: usize,
    ) -> Vec<GcRootPath> {
        let mut paths = Vec::new();
        if max_paths == 0 {
            return paths;
        }
        let start = match self.graph.compact_index_of(start_id) {
            Some(index) => index,
            None => return paths,
        };
        if let Some(kind) = self.graph.root_kind_of(start_id) {
            // the target is itself a root
            paths.push(self.materialize(&[start], kind));
            return paths;
        }
        for limit in 1..=max_depth {
            if paths.len() >= max_paths {
                break;
            }
            self.visited.reset();
            self.visited.set(start as usize);
            self.path.clear();
            self.path.push(start);
            self.descend(start, limit, max_paths, &mut paths);
        }
        paths
    }

    fn descend(&mut self, current: u32, remaining: usize, max_paths: usize, paths: &mut Vec<GcRootPath>) {
        if paths.len() >= max_paths {
            return;
        }
        let degree = self.graph.indexed_incoming_refs(current).len();
        for i in 0..degree {
            if paths.len() >= max_paths {
                return;
            }
            let pred = self.graph.indexed_incoming_refs(current)[i].from_index;
            if self.visited.test(pred as usize) {
                continue;
            }
            let pred_id = self.graph.object_id_at(pred);
            if remaining == 1 {
                if let Some(kind) = self.graph.root_kind_of(pred_id) {
                    self.path.push(pred);
                    let path = self.materialize(self.path.as_slice(), kind);
                    paths.push(path);
                    self.path.pop();
                }
                continue;
            }
            self.visited.set(pred as usize);
            self.path.push(pred);
            self.descend(pred, remaining - 1, max_paths, paths);
            self.path.pop();
        }
    }

    /// Reverses the recorded chain (target-first to root-first) and fills
    /// field names from the forward adjacency.
    fn materialize(&self, chain: &[u32], root_kind: GcRootKind) -> GcRootPath {
        let ids: Vec<u64> = chain
            .iter()
            .rev()
            .map(|&index| self.graph.object_id_at(index))
            .collect();
        let mut nodes = Vec::with_capacity(ids.len());
        for (position, &id) in ids.iter().enumerate() {
            let class_name = match self.graph.class_of(id) {
                Some(class_id) => self.graph.class_name_or_unknown(class_id),
                None => "unknown".to_string(),
            };
            let field_name = ids.get(position + 1).and_then(|&next| {
                self.graph
                    .outgoing_refs_of(id)
                    .iter()
                    .find(|r| r.to == next)
                    .and_then(|r| self.graph.field_name(r.field_name_id))
                    .map(|name| name.to_string())
            });
            nodes.push(PathNode {
                id: hex_id(id),
                class_name,
                field_name,
            });
        }
        GcRootPath {
            root_type: root_kind.label().to_string(),
            nodes,
        }
    }
}

/// Explicit roots joined with Class objects (synthetic sticky-class roots),
/// sorted by retained size.
pub fn gc_roots_list(graph: &ReferenceGraph) -> Vec<GcRootEntry> {
    let mut entries: Vec<GcRootEntry> = graph
        .root_object_ids()
        .iter()
        .map(|&id| {
            let class_name = match graph.class_of(id) {
                Some(class_id) => graph.class_name_or_unknown(class_id),
                None => "unknown".to_string(),
            };
            let shallow = graph.shallow_size_of(id).unwrap_or(0);
            let retained = graph.retained_size_of(id).unwrap_or(shallow);
            let root_type = graph
                .root_kind_of(id)
                .unwrap_or(GcRootKind::Unknown)
                .label()
                .to_string();
            GcRootEntry {
                id: hex_id(id),
                class_name,
                root_type,
                shallow_size: shallow,
                retained_size: retained,
            }
        })
        .collect();
    entries.sort_by(|a, b| b.retained_size.cmp(&a.retained_size).then(a.id.cmp(&b.id)));
    entries
}

/// Groups the root list by class name; the most common root type within a
/// class becomes its primary label.
pub fn gc_roots_summary(entries: &[GcRootEntry]) -> Vec<GcRootClassSummary> {
    struct Group {
        count: usize,
        retained: u64,
        kinds: AHashMap<String, usize>,
        first_seen: usize,
    }
    let mut groups: AHashMap<&str, Group> = AHashMap::new();
    for (position, entry) in entries.iter().enumerate() {
        let group = groups.entry(entry.class_name.as_str()).or_insert(Group {
            count: 0,
            retained: 0,
            kinds: AHashMap::new(),
            first_seen: position,
        });
        group.count += 1;
        group.retained += entry.retained_size;
        *group.kinds.entry(entry.root_type.clone()).or_insert(0) += 1;
    }
    let mut summary: Vec<(usize, GcRootClassSummary)> = groups
        .into_iter()
        .map(|(class_name, group)| {
            let primary_root_type = group
                .kinds
                .iter()
                .max_by_key(|(kind, &count)| (count, std::cmp::Reverse(kind.as_str())))
                .map(|(kind, _)| kind.clone())
                .unwrap_or_else(|| "unknown".to_string());
            (
                group.first_seen,
                GcRootClassSummary {
                    class_name: class_name.to_string(),
                    count: group.count,
                    retained_size: group.retained,
                    primary_root_type,
                },
            )
        })
        .collect();
    summary.sort_by(|a, b| {
        b.1.retained_size
            .cmp(&a.1.retained_size)
            .then(a.0.cmp(&b.0))
    });
    summary.into_iter().map(|(_, s)| s).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GcRoot, Reference};

    fn root_of(graph: &mut ReferenceGraph, id: u64, kind: GcRootKind) {
        graph.add_gc_root(GcRoot {
            object_id: id,
            kind,
            thread_serial: None,
            frame: None,
        });
    }

    fn link(graph: &mut ReferenceGraph, from: u64, to: u64, field: &str) {
        let from_class = graph.class_of(from).unwrap();
        let field_name_id = graph.intern_field_name(field);
        graph.add_reference(Reference {
            from,
            to,
            from_class_id: from_class,
            field_name_id,
        });
    }

    /// root(0x1) -> 0x2 -> 0x3, and a second inbound chain 0x4 -> 0x3 with
    /// 0x4 unrooted.
    fn chain_graph() -> ReferenceGraph {
        let mut graph = ReferenceGraph::new();
        graph.set_object_info(0x1, 0xA, 16);
        graph.set_object_info(0x2, 0xB, 24);
        graph.set_object_info(0x3, 0xC, 32);
        graph.set_object_info(0x4, 0xD, 8);
        graph.set_class_name(0xA, "RootHolder");
        graph.set_class_name(0xB, "Middle");
        graph.set_class_name(0xC, "Leaf");
        graph.set_class_name(0xD, "Stray");
        link(&mut graph, 0x1, 0x2, "child");
        link(&mut graph, 0x2, 0x3, "leaf");
        link(&mut graph, 0x4, 0x3, "stray");
        root_of(&mut graph, 0x1, GcRootKind::ThreadObject);
        graph.freeze();
        graph
    }

    #[test]
    fn finds_shortest_path_to_root() {
        let graph = chain_graph();
        let mut finder = PathFinder::new(&graph);
        let paths = finder.find_paths_to_gc_root(0x3, 5, 10);
        assert_eq!(paths.len(), 1);
        let path = &paths[0];
        assert_eq!(path.root_type, "thread object");
        let classes: Vec<&str> = path.nodes.iter().map(|n| n.class_name.as_str()).collect();
        assert_eq!(classes, ["RootHolder", "Middle", "Leaf"]);
        assert_eq!(path.nodes[0].field_name.as_deref(), Some("child"));
        assert_eq!(path.nodes[1].field_name.as_deref(), Some("leaf"));
        assert_eq!(path.nodes[2].field_name, None);
        assert_eq!(path.nodes[0].id, "0x1");
    }

    #[test]
    fn root_target_yields_trivial_path() {
        let graph = chain_graph();
        let mut finder = PathFinder::new(&graph);
        let paths = finder.find_paths_to_gc_root(0x1, 3, 10);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].nodes.len(), 1);
        assert_eq!(paths[0].nodes[0].class_name, "RootHolder");
    }

    #[test]
    fn depth_limit_bounds_search() {
        let graph = chain_graph();
        let mut finder = PathFinder::new(&graph);
        // root is 2 edges away from 0x3
        assert!(finder.find_paths_to_gc_root(0x3, 5, 1).is_empty());
        assert_eq!(finder.find_paths_to_gc_root(0x3, 5, 2).len(), 1);
    }

    #[test]
    fn unrooted_objects_have_no_paths() {
        let graph = chain_graph();
        let mut finder = PathFinder::new(&graph);
        assert!(finder.find_paths_to_gc_root(0x4, 5, 10).is_empty());
    }

    #[test]
    fn roots_list_includes_class_objects_and_sorts() {
        let mut graph = ReferenceGraph::new();
        graph.set_object_info(0x1, 0xA, 16);
        graph.set_class_name(0xA, "Held");
        root_of(&mut graph, 0x1, GcRootKind::JniGlobal);
        graph.set_object_info(0x100, 0x100, 8);
        graph.register_class_object(0x100);
        graph.freeze();

        let entries = gc_roots_list(&graph);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].class_name, "Held");
        assert_eq!(entries[0].root_type, "JNI global");
        assert_eq!(entries[1].root_type, "sticky class");

        let summary = gc_roots_summary(&entries);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].class_name, "Held");
        assert_eq!(summary[0].count, 1);
    }
}
