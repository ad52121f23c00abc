//! End-to-end analysis orchestration: dominator tree, class histogram, and
//! the three independent fan-out phases (class retainers, reference
//! subgraphs, business retainers) joined into the full report.

pub mod business;
pub mod gc_roots;
pub mod retainers;
pub mod sampling;

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use ahash::{AHashMap, AHashSet};

use crate::analysis::business::BusinessRetainerAnalyzer;
use crate::analysis::gc_roots::{gc_roots_list, gc_roots_summary};
use crate::analysis::retainers::{ClassRetainers, RetainerAnalyzer, RetainerEntry};
use crate::config::AnalysisConfig;
use crate::dominator::{compute_dominator_tree, DominatorResults};
use crate::errors::HprofRetainError;
use crate::graph::builder::ParseStats;
use crate::graph::ReferenceGraph;
use crate::parser::file_header_parser::FileHeader;
use crate::pool::{CancellationToken, ProgressTracker, WorkerPool};
use crate::pools::VecPool;
use crate::report::{
    hex_id, AnalysisStatsReport, ClassStatsReport, FullAnalysisReport, GcRootsReport,
    GraphEdgeReport, GraphNodeReport, HeaderReport, HeapSummaryReport, ReferenceSubgraphReport,
};

/// Seeds per reference subgraph.
const SUBGRAPH_SEEDS: usize = 3;
/// Incoming-BFS depth per reference subgraph.
const SUBGRAPH_DEPTH: usize = 2;
/// Root-list entries carried into the report; the summary covers the rest.
const ROOT_LIST_CAP: usize = 100;

pub fn run_full_analysis(
    header: &FileHeader,
    graph: &ReferenceGraph,
    parse_stats: &ParseStats,
    config: &AnalysisConfig,
) -> Result<FullAnalysisReport, HprofRetainError> {
    let total_start = Instant::now();
    let cancel = CancellationToken::with_timeout(config.parallel.timeout);
    let pool = WorkerPool::new(config.parallel.worker_count(), cancel);

    let dominator_start = Instant::now();
    let results = compute_dominator_tree(graph, &pool, config.effective_strategy())?;
    let dominator_millis = dominator_start.elapsed().as_millis() as u64;

    let top_classes = collect_top_classes(graph, results, config);
    let take_names = |n: usize| -> Vec<String> {
        top_classes
            .iter()
            .take(n)
            .map(|c| c.class_name.clone())
            .collect()
    };
    let retainer_classes = if config.analyze_retainers {
        take_names(config.retainer_classes_n)
    } else {
        Vec::new()
    };
    let graph_classes = if config.graphs_enabled() {
        take_names(config.graph_classes_n)
    } else {
        Vec::new()
    };
    let business_classes = if config.business_enabled() {
        take_names(config.business_classes_n)
    } else {
        Vec::new()
    };

    let (retainers_phase, graphs_phase, business_phase) = if config.parallel.enabled {
        let pool_ref = &pool;
        let (retainers_result, graphs_result, business_result) = thread::scope(|s| {
            let retainers = s.spawn(move || {
                run_retainers_phase(graph, config, pool_ref, retainer_classes)
            });
            let graphs =
                s.spawn(move || run_graphs_phase(graph, config, pool_ref, graph_classes));
            let business = s.spawn(move || {
                run_business_phase(graph, config, pool_ref, business_classes)
            });
            (retainers.join(), graphs.join(), business.join())
        });
        (
            retainers_result.map_err(|e| HprofRetainError::StdThreadError { e })?,
            graphs_result.map_err(|e| HprofRetainError::StdThreadError { e })?,
            business_result.map_err(|e| HprofRetainError::StdThreadError { e })?,
        )
    } else {
        (
            run_retainers_phase(graph, config, &pool, retainer_classes),
            run_graphs_phase(graph, config, &pool, graph_classes),
            run_business_phase(graph, config, &pool, business_classes),
        )
    };
    let (class_retainers, retainers_millis, mut errors) = retainers_phase;
    let (reference_graphs, graphs_millis, graph_errors) = graphs_phase;
    let (business_retainers, business_millis, business_errors) = business_phase;
    errors.extend(graph_errors);
    errors.extend(business_errors);

    let root_entries = gc_roots_list(graph);
    let root_summary = gc_roots_summary(&root_entries);
    let total_roots = root_entries.len();
    let mut roots = root_entries;
    roots.truncate(ROOT_LIST_CAP);

    let stats = AnalysisStatsReport {
        object_count: graph.object_count(),
        reference_count: graph.reference_count(),
        class_count: graph.class_count(),
        gc_root_count: parse_stats.gc_root_total(),
        reachable_count: results.reachable_count(),
        unreachable_count: results.unreachable_count(),
        total_reachable_bytes: results.total_reachable_bytes(),
        skipped_top_level_records: parse_stats.skipped_records,
        unknown_sub_tags: parse_stats.unknown_sub_tags,
        deferred_instances: parse_stats.deferred_instances,
        unresolved_instances: parse_stats.unresolved_instances,
        truncated_instances: parse_stats.truncated_instances,
        class_object_fixups: parse_stats.class_object_fixups,
        retained_size_estimated: results.is_estimated(),
        dominator_millis,
        retainers_millis,
        graphs_millis,
        business_millis,
        total_millis: total_start.elapsed().as_millis() as u64,
        retainer_classes: class_retainers.len(),
        graph_classes: reference_graphs.len(),
        business_classes: business_retainers.len(),
        errors,
    };

    Ok(FullAnalysisReport {
        header: HeaderReport {
            format: header.format.clone(),
            id_size: header.size_pointers,
            timestamp_millis: header.timestamp,
        },
        heap_summary: parse_stats.heap_summary.map(|summary| HeapSummaryReport {
            live_bytes: summary.total_live_bytes,
            live_objects: summary.total_live_instances,
            allocated_bytes: summary.total_bytes_allocated,
            allocated_objects: summary.total_instances_allocated,
        }),
        top_classes,
        class_retainers,
        reference_graphs,
        business_retainers,
        gc_roots: GcRootsReport {
            total: total_roots,
            roots,
            summary: root_summary,
        },
        stats,
    })
}

type PhaseOutput<T> = (BTreeMap<String, T>, u64, Vec<String>);

fn run_retainers_phase(
    graph: &ReferenceGraph,
    config: &AnalysisConfig,
    pool: &WorkerPool,
    classes: Vec<String>,
) -> PhaseOutput<ClassRetainers> {
    let start = Instant::now();
    let tracker = ProgressTracker::start(
        "retainers",
        classes.len(),
        config.parallel.progress_callback.clone(),
    );
    let counter = Arc::clone(tracker.counter());
    let scratch: VecPool<u32> = VecPool::new();
    let scratch = &scratch;
    let outcomes = pool.execute(classes, "retainers", move |class_name| {
        let mut analyzer = RetainerAnalyzer::with_scratch(
            graph,
            config,
            scratch.acquire(),
            scratch.acquire(),
        );
        let result = analyzer.analyze(&class_name);
        counter.fetch_add(1, Ordering::Relaxed);
        let (frontier, next) = analyzer.into_scratch();
        scratch.release(frontier);
        scratch.release(next);
        Ok((class_name, result))
    });
    tracker.finish();
    let mut map = BTreeMap::new();
    let mut errors = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok((class_name, Some(result))) => {
                map.insert(class_name, result);
            }
            Ok((_, None)) => (),
            Err(error) => errors.push(error.to_string()),
        }
    }
    (map, start.elapsed().as_millis() as u64, errors)
}

fn run_graphs_phase(
    graph: &ReferenceGraph,
    config: &AnalysisConfig,
    pool: &WorkerPool,
    classes: Vec<String>,
) -> PhaseOutput<ReferenceSubgraphReport> {
    let start = Instant::now();
    let max_nodes = config.graph_max_nodes;
    let outcomes = pool.execute(classes, "reference-graphs", move |class_name| {
        let subgraph = graph
            .class_id_by_name(&class_name)
            .map(|class_id| build_reference_subgraph(graph, class_id, max_nodes));
        Ok((class_name, subgraph))
    });
    let mut map = BTreeMap::new();
    let mut errors = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok((class_name, Some(subgraph))) => {
                map.insert(class_name, subgraph);
            }
            Ok((_, None)) => (),
            Err(error) => errors.push(error.to_string()),
        }
    }
    (map, start.elapsed().as_millis() as u64, errors)
}

fn run_business_phase(
    graph: &ReferenceGraph,
    config: &AnalysisConfig,
    pool: &WorkerPool,
    classes: Vec<String>,
) -> PhaseOutput<Vec<RetainerEntry>> {
    let start = Instant::now();
    let outcomes = pool.execute(classes, "business-retainers", move |class_name| {
        let analyzer = BusinessRetainerAnalyzer::new(graph, config);
        let entries = analyzer.analyze(&class_name);
        Ok((class_name, entries))
    });
    let mut map = BTreeMap::new();
    let mut errors = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok((class_name, entries)) => {
                if !entries.is_empty() {
                    map.insert(class_name, entries);
                }
            }
            Err(error) => errors.push(error.to_string()),
        }
    }
    (map, start.elapsed().as_millis() as u64, errors)
}

/// Per-class histogram: instance counts and shallow totals, decorated with
/// both retained views, sorted by shallow total.
fn collect_top_classes(
    graph: &ReferenceGraph,
    results: &DominatorResults,
    config: &AnalysisConfig,
) -> Vec<ClassStatsReport> {
    let arrays = graph.index_arrays();
    struct Agg {
        count: u64,
        shallow: u64,
    }
    let mut per_class: AHashMap<u64, Agg> = AHashMap::new();
    for i in 0..graph.object_count() {
        if !config.include_unreachable && !results.is_reachable(i as u32) {
            continue;
        }
        let agg = per_class
            .entry(arrays.class_ids[i])
            .or_insert(Agg { count: 0, shallow: 0 });
        agg.count += 1;
        agg.shallow += arrays.shallow_sizes[i];
    }
    let mut rows: Vec<ClassStatsReport> = per_class
        .into_iter()
        .map(|(class_id, agg)| ClassStatsReport {
            class_name: graph.class_name_or_unknown(class_id),
            instance_count: agg.count,
            shallow_size: agg.shallow,
            retained_size: results.class_retained.get(&class_id).copied().unwrap_or(0),
            attributed_size: results
                .class_retained_attributed
                .get(&class_id)
                .copied()
                .unwrap_or(0),
        })
        .collect();
    rows.sort_by(|a, b| {
        b.shallow_size
            .cmp(&a.shallow_size)
            .then(a.class_name.cmp(&b.class_name))
    });
    if config.top_classes_n > 0 {
        rows.truncate(config.top_classes_n);
    }
    rows
}

/// Small visualization-ready neighborhood around the largest instances of a
/// class: incoming BFS to depth 2, one outgoing hop, capped node count.
fn build_reference_subgraph(
    graph: &ReferenceGraph,
    class_id: u64,
    max_nodes: usize,
) -> ReferenceSubgraphReport {
    let mut instances: Vec<(u64, u64)> = graph
        .objects_of_class(class_id)
        .iter()
        .map(|&id| (id, graph.shallow_size_of(id).unwrap_or(0)))
        .collect();
    instances.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let seeds: Vec<u64> = instances
        .iter()
        .take(SUBGRAPH_SEEDS)
        .map(|&(id, _)| id)
        .collect();

    let mut node_ids: Vec<u64> = Vec::new();
    let mut node_of: AHashMap<u64, usize> = AHashMap::new();
    let mut add_node = |id: u64, node_ids: &mut Vec<u64>, node_of: &mut AHashMap<u64, usize>| {
        if node_of.contains_key(&id) || node_ids.len() >= max_nodes {
            return false;
        }
        node_of.insert(id, node_ids.len());
        node_ids.push(id);
        true
    };

    for &seed in &seeds {
        add_node(seed, &mut node_ids, &mut node_of);
    }
    let mut queue: std::collections::VecDeque<(u64, usize)> =
        seeds.iter().map(|&id| (id, 0)).collect();
    while let Some((id, depth)) = queue.pop_front() {
        if depth >= SUBGRAPH_DEPTH {
            continue;
        }
        for reference in graph.incoming_refs_of(id) {
            if graph.class_of(reference.from).is_none() {
                continue;
            }
            if add_node(reference.from, &mut node_ids, &mut node_of) {
                queue.push_back((reference.from, depth + 1));
            }
        }
    }
    for &seed in &seeds {
        for reference in graph.outgoing_refs_of(seed) {
            if graph.class_of(reference.to).is_none() {
                continue;
            }
            add_node(reference.to, &mut node_ids, &mut node_of);
        }
    }

    let nodes: Vec<GraphNodeReport> = node_ids
        .iter()
        .map(|&id| {
            let class = graph.class_of(id).unwrap_or(0);
            let shallow = graph.shallow_size_of(id).unwrap_or(0);
            let root_kind = graph.root_kind_of(id);
            GraphNodeReport {
                id: hex_id(id),
                class_name: graph.class_name_or_unknown(class),
                size: shallow,
                retained_size: graph.retained_size_of(id).unwrap_or(shallow),
                is_gc_root: root_kind.is_some(),
                gc_root_type: root_kind.map(|kind| kind.label().to_string()),
            }
        })
        .collect();

    let mut seen_edges: AHashSet<(u64, u64, u32)> = AHashSet::new();
    let mut edges: Vec<GraphEdgeReport> = Vec::new();
    for &id in &node_ids {
        for reference in graph.outgoing_refs_of(id) {
            if !node_of.contains_key(&reference.to) {
                continue;
            }
            if seen_edges.insert((id, reference.to, reference.field_name_id)) {
                edges.push(GraphEdgeReport {
                    source: hex_id(id),
                    target: hex_id(reference.to),
                    field_name: graph
                        .field_name(reference.field_name_id)
                        .filter(|name| !name.is_empty())
                        .map(|name| name.to_string()),
                });
            }
        }
    }

    ReferenceSubgraphReport { nodes, edges }
}
