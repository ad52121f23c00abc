//! Business-level retainer chains.
//!
//! Same skeleton as the class retainer analysis, but the BFS walks object
//! ids over the raw reverse adjacency, retainer class names pass through the
//! business-name predicate, and each target stops contributing after a fixed
//! number of accepted business retainers.

use ahash::{AHashMap, AHashSet};

use crate::analysis::retainers::RetainerEntry;
use crate::analysis::sampling::{stratified_sample, SampleResult};
use crate::config::AnalysisConfig;
use crate::filters;
use crate::graph::ReferenceGraph;

struct BusinessStat {
    class_name: String,
    field_name: Option<String>,
    depth: u8,
    count: u64,
    size: u64,
}

pub struct BusinessRetainerAnalyzer<'g> {
    graph: &'g ReferenceGraph,
    config: &'g AnalysisConfig,
}

impl<'g> BusinessRetainerAnalyzer<'g> {
    pub fn new(graph: &'g ReferenceGraph, config: &'g AnalysisConfig) -> Self {
        Self { graph, config }
    }

    /// Business retainer table for one class; empty when the class is
    /// unknown or nothing qualifies. Classification prefers `is_business`;
    /// when that leaves the table empty, the class is re-analyzed at
    /// application level.
    pub fn analyze(&self, class_name: &str) -> Vec<RetainerEntry> {
        let strict = self.run(class_name, filters::is_business);
        if !strict.is_empty() {
            return strict;
        }
        self.run(class_name, filters::is_application_level)
    }

    fn run(&self, class_name: &str, accept: fn(&str) -> bool) -> Vec<RetainerEntry> {
        let class_id = match self.graph.class_id_by_name(class_name) {
            Some(id) => id,
            None => return Vec::new(),
        };
        let targets: Vec<(u64, u64)> = self
            .graph
            .objects_of_class(class_id)
            .iter()
            .map(|&id| (id, self.graph.shallow_size_of(id).unwrap_or(0)))
            .collect();
        let total_size: u64 = targets.iter().map(|&(_, size)| size).sum();

        let sampling = crate::config::SamplingConfig {
            max_samples: self.config.business.sample_size,
            ..self.config.sampling.clone()
        };
        let SampleResult { sampled, ratio } = stratified_sample(targets, &sampling);

        let mut stats: AHashMap<String, BusinessStat> = AHashMap::new();
        let mut visited: AHashSet<u64> = AHashSet::new();
        let mut seen: AHashSet<String> = AHashSet::new();
        let mut frontier: Vec<u64> = Vec::new();
        let mut next: Vec<u64> = Vec::new();

        for &(target_id, target_size) in &sampled {
            visited.clear();
            seen.clear();
            frontier.clear();
            frontier.push(target_id);
            visited.insert(target_id);
            let mut accepted = 0usize;

            'bfs: for depth in 1..=self.config.retainer_max_depth {
                next.clear();
                for &object_id in &frontier {
                    for reference in self.graph.incoming_refs_of(object_id) {
                        if self.graph.class_of(reference.from).is_none() {
                            continue;
                        }
                        let retainer_class =
                            self.graph.class_name_or_unknown(reference.from_class_id);
                        if accept(&retainer_class) {
                            let field_name = self
                                .graph
                                .field_name(reference.field_name_id)
                                .filter(|name| !name.is_empty())
                                .map(|name| name.to_string());
                            let key = format!(
                                "{retainer_class}#{}@{depth}",
                                field_name.as_deref().unwrap_or("")
                            );
                            if seen.insert(key.clone()) {
                                let stat = stats.entry(key).or_insert_with(|| BusinessStat {
                                    class_name: retainer_class.clone(),
                                    field_name,
                                    depth,
                                    count: 0,
                                    size: 0,
                                });
                                stat.count += 1;
                                stat.size += target_size;
                                accepted += 1;
                                if accepted >= self.config.business.max_per_target {
                                    break 'bfs;
                                }
                            }
                        }
                        if visited.insert(reference.from) {
                            next.push(reference.from);
                        }
                    }
                }
                std::mem::swap(&mut frontier, &mut next);
                if frontier.is_empty() {
                    break;
                }
            }
        }

        let mut entries: Vec<RetainerEntry> = stats
            .into_values()
            .map(|stat| {
                let scaled_count = (stat.count as f64 / ratio).round() as u64;
                let scaled_size = ((stat.size as f64 / ratio).round() as u64).min(total_size);
                let percentage = if total_size == 0 {
                    0.0
                } else {
                    (scaled_size as f64 / total_size as f64 * 100.0).min(100.0)
                };
                RetainerEntry {
                    retainer_class: stat.class_name,
                    field_name: stat.field_name,
                    retained_size: scaled_size,
                    retained_count: scaled_count,
                    percentage,
                    depth: Some(stat.depth),
                }
            })
            .collect();
        entries.sort_by(|a, b| {
            a.depth
                .cmp(&b.depth)
                .then(b.retained_size.cmp(&a.retained_size))
                .then(a.retainer_class.cmp(&b.retainer_class))
        });
        entries.truncate(self.config.top_retainers_n);
        entries
    }
}
