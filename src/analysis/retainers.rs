//! "Who retains this class" tables.
//!
//! For a target class, sampled instances run a level-synchronous BFS over
//! incoming references. Every predecessor edge at depth `d` collapses into a
//! packed 64-bit key `(retainerClass | fieldName | depth)`; a versioned
//! bitset over the keys' assignment order deduplicates contributions per
//! target, so one target adds at most once to any key no matter how many
//! parallel edges reach it.

use ahash::AHashMap;
use serde::Serialize;

use crate::analysis::gc_roots::{GcRootPath, PathFinder};
use crate::analysis::sampling::{stratified_sample, SampleResult};
use crate::bitset::VersionedBitset;
use crate::config::AnalysisConfig;
use crate::graph::ReferenceGraph;

const ROOT_PATH_COUNT: usize = 5;
const ROOT_PATH_MAX_DEPTH: usize = 20;
const ROOT_PATH_ATTEMPTS: usize = 20;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetainerEntry {
    pub retainer_class: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    pub retained_size: u64,
    pub retained_count: u64,
    pub percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u8>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRetainers {
    pub class_name: String,
    pub total_size: u64,
    pub instance_count: u64,
    pub retainers: Vec<RetainerEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retained_size: Option<u64>,
    pub sample_ratio: f64,
    pub gc_root_paths: Vec<GcRootPath>,
}

/// classID in the top 40 bits, interned field name in 16, depth in 8.
/// Truncation is deliberate: keys are sampling buckets, not identities.
fn pack_retainer_key(class_id: u64, field_name_id: u32, depth: u8) -> u64 {
    ((class_id & 0xFF_FFFF_FFFF) << 24)
        | ((u64::from(field_name_id) & 0xFFFF) << 8)
        | u64::from(depth)
}

struct KeyStat {
    class_id: u64,
    field_name_id: u32,
    depth: u8,
    count: u64,
    size: u64,
}

pub struct RetainerAnalyzer<'g> {
    graph: &'g ReferenceGraph,
    config: &'g AnalysisConfig,
    visited: VersionedBitset,
    seen_keys: VersionedBitset,
    key_index: AHashMap<u64, u32>,
    key_stats: Vec<KeyStat>,
    frontier: Vec<u32>,
    next: Vec<u32>,
}

impl<'g> RetainerAnalyzer<'g> {
    pub fn new(graph: &'g ReferenceGraph, config: &'g AnalysisConfig) -> Self {
        Self::with_scratch(graph, config, Vec::new(), Vec::new())
    }

    /// Builds an analyzer around pooled BFS buffers; return them with
    /// [`into_scratch`](Self::into_scratch) when done.
    pub fn with_scratch(
        graph: &'g ReferenceGraph,
        config: &'g AnalysisConfig,
        frontier: Vec<u32>,
        next: Vec<u32>,
    ) -> Self {
        Self {
            graph,
            config,
            visited: VersionedBitset::new(graph.object_count()),
            seen_keys: VersionedBitset::new(0),
            key_index: AHashMap::new(),
            key_stats: Vec::new(),
            frontier,
            next,
        }
    }

    pub fn into_scratch(self) -> (Vec<u32>, Vec<u32>) {
        (self.frontier, self.next)
    }

    /// Full retainer table for one class; `None` when the class is unknown.
    pub fn analyze(&mut self, class_name: &str) -> Option<ClassRetainers> {
        let class_id = self.graph.class_id_by_name(class_name)?;
        let targets: Vec<(u64, u64)> = self
            .graph
            .objects_of_class(class_id)
            .iter()
            .map(|&id| (id, self.graph.shallow_size_of(id).unwrap_or(0)))
            .collect();
        let instance_count = targets.len() as u64;
        let total_size: u64 = targets.iter().map(|&(_, size)| size).sum();
        let retained_size = self
            .graph
            .dominator_results()
            .map(|results| results.class_retained.get(&class_id).copied().unwrap_or(0));

        self.key_index.clear();
        self.key_stats.clear();

        let SampleResult { sampled, ratio } = stratified_sample(targets, &self.config.sampling);
        if self.config.retainer_max_depth > 0 {
            for &(target_id, target_size) in &sampled {
                if let Some(index) = self.graph.compact_index_of(target_id) {
                    self.scan_target(index, target_size);
                }
            }
        }

        let mut retainers: Vec<RetainerEntry> = self
            .key_stats
            .iter()
            .map(|stat| {
                let scaled_count = (stat.count as f64 / ratio).round() as u64;
                let scaled_size = ((stat.size as f64 / ratio).round() as u64).min(total_size);
                let percentage = if total_size == 0 {
                    0.0
                } else {
                    (scaled_size as f64 / total_size as f64 * 100.0).min(100.0)
                };
                RetainerEntry {
                    retainer_class: self.graph.class_name_or_unknown(stat.class_id),
                    field_name: self
                        .graph
                        .field_name(stat.field_name_id)
                        .filter(|name| !name.is_empty())
                        .map(|name| name.to_string()),
                    retained_size: scaled_size,
                    retained_count: scaled_count,
                    percentage,
                    depth: Some(stat.depth),
                }
            })
            .collect();
        retainers.sort_by(|a, b| {
            a.depth
                .cmp(&b.depth)
                .then(b.retained_size.cmp(&a.retained_size))
                .then(b.retained_count.cmp(&a.retained_count))
                .then(a.retainer_class.cmp(&b.retainer_class))
        });
        retainers.truncate(self.config.top_retainers_n);

        let gc_root_paths = self.sample_root_paths(&sampled);

        Some(ClassRetainers {
            class_name: class_name.to_string(),
            total_size,
            instance_count,
            retainers,
            retained_size,
            sample_ratio: ratio,
            gc_root_paths,
        })
    }

    /// Level-synchronous BFS from one target over incoming edges.
    fn scan_target(&mut self, target_index: u32, target_size: u64) {
        self.visited.reset();
        self.seen_keys.reset();
        self.visited.set(target_index as usize);
        self.frontier.clear();
        self.frontier.push(target_index);

        for depth in 1..=self.config.retainer_max_depth {
            self.next.clear();
            for fi in 0..self.frontier.len() {
                let index = self.frontier[fi];
                let degree = self.graph.indexed_incoming_refs(index).len();
                for e in 0..degree {
                    let edge = self.graph.indexed_incoming_refs(index)[e];
                    let key = pack_retainer_key(edge.from_class_id, edge.field_name_id, depth);
                    let key_slot = match self.key_index.get(&key) {
                        Some(&slot) => slot as usize,
                        None => {
                            let slot = self.key_stats.len();
                            self.key_index.insert(key, slot as u32);
                            self.key_stats.push(KeyStat {
                                class_id: edge.from_class_id,
                                field_name_id: edge.field_name_id,
                                depth,
                                count: 0,
                                size: 0,
                            });
                            self.seen_keys.grow(slot + 1);
                            slot
                        }
                    };
                    if !self.seen_keys.test_and_set(key_slot) {
                        self.key_stats[key_slot].count += 1;
                        self.key_stats[key_slot].size += target_size;
                    }
                    if !self.visited.test_and_set(edge.from_index as usize) {
                        self.next.push(edge.from_index);
                    }
                }
            }
            std::mem::swap(&mut self.frontier, &mut self.next);
            if self.frontier.is_empty() {
                break;
            }
        }
    }

    /// Up to five root paths, starting from the largest sampled targets.
    fn sample_root_paths(&self, sampled: &[(u64, u64)]) -> Vec<GcRootPath> {
        let mut by_size: Vec<(u64, u64)> = sampled.to_vec();
        by_size.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        let mut finder = PathFinder::new(self.graph);
        let mut paths = Vec::new();
        for &(target_id, _) in by_size.iter().take(ROOT_PATH_ATTEMPTS) {
            if paths.len() >= ROOT_PATH_COUNT {
                break;
            }
            paths.extend(finder.find_paths_to_gc_root(target_id, 1, ROOT_PATH_MAX_DEPTH));
        }
        paths.truncate(ROOT_PATH_COUNT);
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GcRoot, GcRootKind, Reference};

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

    fn config_with_depth(depth: u8) -> AnalysisConfig {
        AnalysisConfig {
            retainer_max_depth: depth,
            ..AnalysisConfig::default()
        }
    }

    /// holder(H) -> target(T), holder2(H) -> target2(T), deep(D) -> holder.
    fn small_graph() -> ReferenceGraph {
        let mut graph = ReferenceGraph::new();
        graph.set_class_name(0xA0, "com.acme.Target");
        graph.set_class_name(0xB0, "com.acme.Holder");
        graph.set_class_name(0xC0, "com.acme.Deep");
        graph.set_object_info(0x1, 0xA0, 32);
        graph.set_object_info(0x2, 0xA0, 48);
        graph.set_object_info(0x10, 0xB0, 16);
        graph.set_object_info(0x11, 0xB0, 16);
        graph.set_object_info(0x20, 0xC0, 8);
        link(&mut graph, 0x10, 0x1, "value");
        link(&mut graph, 0x11, 0x2, "value");
        link(&mut graph, 0x20, 0x10, "holder");
        graph.add_gc_root(GcRoot {
            object_id: 0x20,
            kind: GcRootKind::JavaFrame,
            thread_serial: Some(1),
            frame: Some(0),
        });
        graph.freeze();
        graph
    }

    #[test]
    fn exact_counts_without_sampling() {
        let graph = small_graph();
        let config = config_with_depth(3);
        let mut analyzer = RetainerAnalyzer::new(&graph, &config);
        let result = analyzer.analyze("com.acme.Target").unwrap();

        assert_eq!(result.instance_count, 2);
        assert_eq!(result.total_size, 80);
        assert_eq!(result.sample_ratio, 1.0);

        // depth 1: Holder.value retains both targets, exactly
        let holder = result
            .retainers
            .iter()
            .find(|r| r.retainer_class == "com.acme.Holder")
            .unwrap();
        assert_eq!(holder.retained_count, 2);
        assert_eq!(holder.retained_size, 80);
        assert_eq!(holder.depth, Some(1));
        assert_eq!(holder.field_name.as_deref(), Some("value"));
        assert!((holder.percentage - 100.0).abs() < 1e-9);

        // depth 2: Deep reaches only the first target
        let deep = result
            .retainers
            .iter()
            .find(|r| r.retainer_class == "com.acme.Deep")
            .unwrap();
        assert_eq!(deep.retained_count, 1);
        assert_eq!(deep.retained_size, 32);
        assert_eq!(deep.depth, Some(2));
    }

    #[test]
    fn retainers_sorted_by_depth_then_size() {
        let graph = small_graph();
        let config = config_with_depth(3);
        let mut analyzer = RetainerAnalyzer::new(&graph, &config);
        let result = analyzer.analyze("com.acme.Target").unwrap();
        for pair in result.retainers.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(a.depth <= b.depth);
            if a.depth == b.depth {
                assert!(a.retained_size >= b.retained_size);
            }
        }
    }

    #[test]
    fn zero_depth_produces_empty_table_with_valid_envelope() {
        let graph = small_graph();
        let config = config_with_depth(0);
        let mut analyzer = RetainerAnalyzer::new(&graph, &config);
        let result = analyzer.analyze("com.acme.Target").unwrap();
        assert!(result.retainers.is_empty());
        assert_eq!(result.instance_count, 2);
        assert_eq!(result.total_size, 80);
    }

    #[test]
    fn unknown_class_yields_none() {
        let graph = small_graph();
        let config = config_with_depth(3);
        let mut analyzer = RetainerAnalyzer::new(&graph, &config);
        assert!(analyzer.analyze("does.not.Exist").is_none());
    }

    #[test]
    fn parallel_edges_count_once_per_target() {
        let mut graph = ReferenceGraph::new();
        graph.set_class_name(0xA0, "T");
        graph.set_class_name(0xB0, "H");
        graph.set_object_info(0x1, 0xA0, 32);
        graph.set_object_info(0x10, 0xB0, 16);
        // two edges with the same field name from the same holder class
        link(&mut graph, 0x10, 0x1, "value");
        link(&mut graph, 0x10, 0x1, "value");
        graph.freeze();

        let config = config_with_depth(2);
        let mut analyzer = RetainerAnalyzer::new(&graph, &config);
        let result = analyzer.analyze("T").unwrap();
        let entry = result
            .retainers
            .iter()
            .find(|r| r.retainer_class == "H")
            .unwrap();
        assert_eq!(entry.retained_count, 1);
        assert_eq!(entry.retained_size, 32);
    }

    #[test]
    fn root_paths_come_from_largest_targets() {
        let graph = small_graph();
        let config = config_with_depth(2);
        let mut analyzer = RetainerAnalyzer::new(&graph, &config);
        let result = analyzer.analyze("com.acme.Target").unwrap();
        // only target 0x1 reaches the rooted chain deep -> holder -> target
        assert_eq!(result.gc_root_paths.len(), 1);
        let path = &result.gc_root_paths[0];
        assert_eq!(path.root_type, "Java frame");
        assert_eq!(path.nodes.first().unwrap().class_name, "com.acme.Deep");
        assert_eq!(path.nodes.last().unwrap().class_name, "com.acme.Target");
    }

    #[test]
    fn sampling_scales_counts_proportionally() {
        // 14_000 targets in 5 retainer-class groups laid out so every
        // stratum stride lands uniformly across the groups: budget 500
        // splits into quotas 200/175/125 with integer strides 7/32/56, all
        // coprime to the period-5 class pattern.
        let mut graph = ReferenceGraph::new();
        graph.set_class_name(0xA0, "T");
        let retainer_classes: Vec<u64> = (0..5).map(|c| 0x1000 + c).collect();
        for (c, &class_id) in retainer_classes.iter().enumerate() {
            graph.set_class_name(class_id, &format!("R{c}"));
        }
        let population = 14_000u64;
        for i in 0..population {
            let target_id = 0x10_0000 + i;
            let holder_id = 0x20_0000 + i;
            let holder_class = retainer_classes[(i % 5) as usize];
            graph.set_object_info(target_id, 0xA0, 64);
            graph.set_object_info(holder_id, holder_class, 16);
            let field = graph.intern_field_name("item");
            graph.add_reference(Reference {
                from: holder_id,
                to: target_id,
                from_class_id: holder_class,
                field_name_id: field,
            });
        }
        graph.freeze();

        let config = AnalysisConfig {
            retainer_max_depth: 1,
            sampling: crate::config::SamplingConfig {
                max_samples: 500,
                ..crate::config::SamplingConfig::default()
            },
            ..AnalysisConfig::default()
        };
        let mut analyzer = RetainerAnalyzer::new(&graph, &config);
        let result = analyzer.analyze("T").unwrap();
        assert!((result.sample_ratio - 500.0 / 14_000.0).abs() < 1e-9);

        let per_class_expected = (population / 5) as f64;
        let mut total_count = 0u64;
        for c in 0..5 {
            let entry = result
                .retainers
                .iter()
                .find(|r| r.retainer_class == format!("R{c}"))
                .unwrap_or_else(|| panic!("retainer R{c} missing"));
            let count = entry.retained_count as f64;
            assert!(
                (count - per_class_expected).abs() <= per_class_expected * 0.10,
                "R{c} scaled count {count} outside ±10% of {per_class_expected}"
            );
            total_count += entry.retained_count;
        }
        assert!(total_count <= population);
    }
}
