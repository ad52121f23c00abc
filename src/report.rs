//! Output schema and rendering: the JSON report (camelCase, field-for-field)
//! plus the human-readable text summary printed to the terminal.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::fs::File;
use std::io::BufWriter;

use chrono::Utc;
use indoc::formatdoc;
use serde::Serialize;

use crate::analysis::gc_roots::{GcRootClassSummary, GcRootEntry};
use crate::analysis::retainers::{ClassRetainers, RetainerEntry};
use crate::errors::HprofRetainError;
use crate::graph::builder::ParseStats;
use crate::utils::pretty_bytes_size;

/// Object ids are rendered as lowercase hex with a `0x` prefix.
pub fn hex_id(id: u64) -> String {
    format!("0x{id:x}")
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderReport {
    pub format: String,
    pub id_size: u32,
    pub timestamp_millis: u64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeapSummaryReport {
    pub live_bytes: u32,
    pub live_objects: u32,
    pub allocated_bytes: u64,
    pub allocated_objects: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStatsReport {
    pub class_name: String,
    pub instance_count: u64,
    pub shallow_size: u64,
    pub retained_size: u64,
    pub attributed_size: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNodeReport {
    pub id: String,
    pub class_name: String,
    pub size: u64,
    pub retained_size: u64,
    pub is_gc_root: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gc_root_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdgeReport {
    pub source: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceSubgraphReport {
    pub nodes: Vec<GraphNodeReport>,
    pub edges: Vec<GraphEdgeReport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GcRootsReport {
    pub total: usize,
    pub roots: Vec<GcRootEntry>,
    pub summary: Vec<GcRootClassSummary>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStatsReport {
    pub object_count: usize,
    pub reference_count: u64,
    pub class_count: usize,
    pub gc_root_count: u64,
    pub reachable_count: usize,
    pub unreachable_count: usize,
    pub total_reachable_bytes: u64,
    pub skipped_top_level_records: u64,
    pub unknown_sub_tags: u64,
    pub deferred_instances: u64,
    pub unresolved_instances: u64,
    pub truncated_instances: u64,
    pub class_object_fixups: usize,
    pub retained_size_estimated: bool,
    pub dominator_millis: u64,
    pub retainers_millis: u64,
    pub graphs_millis: u64,
    pub business_millis: u64,
    pub total_millis: u64,
    pub retainer_classes: usize,
    pub graph_classes: usize,
    pub business_classes: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullAnalysisReport {
    pub header: HeaderReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heap_summary: Option<HeapSummaryReport>,
    pub top_classes: Vec<ClassStatsReport>,
    pub class_retainers: BTreeMap<String, ClassRetainers>,
    pub reference_graphs: BTreeMap<String, ReferenceSubgraphReport>,
    pub business_retainers: BTreeMap<String, Vec<RetainerEntry>>,
    pub gc_roots: GcRootsReport,
    pub stats: AnalysisStatsReport,
}

impl FullAnalysisReport {
    pub fn to_json(&self) -> Result<String, HprofRetainError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the JSON report, timestamping the file name unless the caller
    /// picked one.
    pub fn save_as_file(&self, path: Option<String>) -> Result<String, HprofRetainError> {
        let file_path = path
            .unwrap_or_else(|| format!("hprof-retain-{}.json", Utc::now().timestamp_millis()));
        let file = File::create(&file_path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer(writer, &self)?;
        Ok(file_path)
    }

    pub fn render_text(&self, top: usize) -> String {
        let stats = &self.stats;
        let mut out = formatdoc!(
            "\nHeap analysis summary:\n
            Objects: {} ({} reachable, {} unreachable)
            References: {}
            Classes: {}
            GC roots: {}
            Reachable bytes: {}
            Retained sizes: {}",
            stats.object_count,
            stats.reachable_count,
            stats.unreachable_count,
            stats.reference_count,
            stats.class_count,
            stats.gc_root_count,
            pretty_bytes_size(stats.total_reachable_bytes),
            if stats.retained_size_estimated {
                "estimated (fast mode)"
            } else {
                "exact (dominator tree)"
            },
        );

        let shown = if top == 0 {
            self.top_classes.len()
        } else {
            top.min(self.top_classes.len())
        };
        let _ = write!(out, "\n\nTop {shown} classes by shallow size:\n\n");
        out.push_str(&render_class_table(&self.top_classes[..shown]));

        if !self.gc_roots.summary.is_empty() {
            let _ = write!(
                out,
                "\nGC roots: {} ({} classes)\n",
                self.gc_roots.total,
                self.gc_roots.summary.len()
            );
        }
        if !stats.errors.is_empty() {
            let _ = write!(out, "\nAnalysis errors ({}):\n", stats.errors.len());
            for error in &stats.errors {
                let _ = writeln!(out, "  {error}");
            }
        }
        out
    }
}

/// Padded ASCII table of per-class stats.
fn render_class_table(rows: &[ClassStatsReport]) -> String {
    let headers = ["Retained", "Shallow", "Instances", "Class name"];
    let formatted: Vec<[String; 4]> = rows
        .iter()
        .map(|row| {
            [
                pretty_bytes_size(row.retained_size),
                pretty_bytes_size(row.shallow_size),
                row.instance_count.to_string(),
                row.class_name.clone(),
            ]
        })
        .collect();

    let mut widths: [usize; 4] = headers.map(str::len);
    for row in &formatted {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let separator = {
        let mut line = String::from("+");
        for width in widths {
            line.push_str(&"-".repeat(width + 2));
            line.push('+');
        }
        line.push('\n');
        line
    };

    out.push_str(&separator);
    out.push('|');
    for (&width, header) in widths.iter().zip(headers.iter()) {
        let _ = write!(out, " {header:>width$} |");
    }
    out.push('\n');
    out.push_str(&separator);
    for row in &formatted {
        out.push('|');
        for (column, (&width, cell)) in widths.iter().zip(row.iter()).enumerate() {
            if column == 3 {
                // class names read better left-aligned
                let _ = write!(out, " {cell:<width$} |");
            } else {
                let _ = write!(out, " {cell:>width$} |");
            }
        }
        out.push('\n');
    }
    out.push_str(&separator);
    out
}

/// File-content summary in the style of the parse-phase tag counters.
pub fn render_parse_summary(stats: &ParseStats) -> String {
    formatdoc!(
        "\nFile content summary:\n
        UTF-8 Strings: {}
        Classes loaded: {}
        {} heap dumps containing in total {} sub-records:
        ..GC root unknown: {}
        ..GC root thread objects: {}
        ..GC root JNI global: {}
        ..GC root JNI local: {}
        ..GC root Java frame: {}
        ..GC root native stack: {}
        ..GC root sticky class: {}
        ..GC root thread block: {}
        ..GC root monitor used: {}
        ..GC class dump: {}
        ..GC instance dump: {}
        ..GC object array dump: {}
        ..GC primitive array dump: {}
        Skipped top-level records: {}
        Unknown heap-dump sub-tags: {}
        Deferred instances: {} ({} unresolved)",
        stats.utf8_strings,
        stats.classes_loaded,
        stats.heap_dumps,
        stats.heap_dump_sub_records,
        stats.gc_root_unknown,
        stats.gc_root_thread_object,
        stats.gc_root_jni_global,
        stats.gc_root_jni_local,
        stats.gc_root_java_frame,
        stats.gc_root_native_stack,
        stats.gc_root_sticky_class,
        stats.gc_root_thread_block,
        stats.gc_root_monitor_used,
        stats.class_dumps,
        stats.instances,
        stats.object_arrays,
        stats.primitive_arrays,
        stats.skipped_records,
        stats.unknown_sub_tags,
        stats.deferred_instances,
        stats.unresolved_instances,
    )
}
