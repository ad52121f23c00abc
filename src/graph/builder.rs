//! Consumes parsed record batches and builds the [`ReferenceGraph`].
//!
//! This is the write side of C3/C4: the string table, class layouts, shallow
//! sizes, reference extraction (instance fields, array elements, static
//! fields, synthetic class edges) and the deferred-instance queue for
//! instances seen before their class dump.

use std::thread;
use std::thread::JoinHandle;

use ahash::AHashMap;
use crossbeam_channel::{Receiver, Sender};

use crate::config::SizeMode;
use crate::graph::names::normalize_class_name;
use crate::graph::{GcRoot, GcRootKind, Reference, ReferenceGraph};
use crate::parser::gc_record::{ClassDumpData, FieldInfo, FieldType, GcRecord};
use crate::parser::record::Record;
use crate::utils::align8;

/// Synthetic class ids for primitive arrays, one per basic-type code.
const SYNTHETIC_PRIMITIVE_CLASS_BASE: u64 = 0xFFFF_FFFF_FFFF_FF00;

/// Synthetic field name for object-array elements.
const ARRAY_ELEMENT_FIELD: &str = "[i]";

/// Guard against malformed cyclic superclass chains.
const MAX_HIERARCHY_DEPTH: usize = 512;

#[derive(Debug, Clone, Copy, Default)]
pub struct HeapSummaryData {
    pub total_live_bytes: u32,
    pub total_live_instances: u32,
    pub total_bytes_allocated: u64,
    pub total_instances_allocated: u64,
}

#[derive(Debug, Default, Clone)]
pub struct ParseStats {
    pub utf8_strings: usize,
    pub classes_loaded: usize,
    pub heap_dumps: u32,
    pub heap_dump_sub_records: u64,
    pub gc_root_unknown: u64,
    pub gc_root_thread_object: u64,
    pub gc_root_jni_global: u64,
    pub gc_root_jni_local: u64,
    pub gc_root_java_frame: u64,
    pub gc_root_native_stack: u64,
    pub gc_root_sticky_class: u64,
    pub gc_root_thread_block: u64,
    pub gc_root_monitor_used: u64,
    pub instances: u64,
    pub object_arrays: u64,
    pub primitive_arrays: u64,
    pub class_dumps: u64,
    pub skipped_records: u64,
    pub unknown_sub_tags: u64,
    pub deferred_instances: u64,
    pub unresolved_instances: u64,
    pub truncated_instances: u64,
    pub class_object_fixups: usize,
    pub heap_summary: Option<HeapSummaryData>,
}

impl ParseStats {
    pub fn gc_root_total(&self) -> u64 {
        self.gc_root_unknown
            + self.gc_root_thread_object
            + self.gc_root_jni_global
            + self.gc_root_jni_local
            + self.gc_root_java_frame
            + self.gc_root_native_stack
            + self.gc_root_sticky_class
            + self.gc_root_thread_block
            + self.gc_root_monitor_used
    }
}

pub struct BuiltGraph {
    pub graph: ReferenceGraph,
    pub stats: ParseStats,
}

struct ClassLayout {
    super_class_object_id: u64,
    fields: Vec<FieldInfo>,
}

struct DeferredInstance {
    object_id: u64,
    class_object_id: u64,
    data: Box<[u8]>,
}

pub struct GraphBuilder {
    id_size: u32,
    size_mode: SizeMode,
    graph: ReferenceGraph,
    utf8_strings_by_id: AHashMap<u64, Box<str>>,
    class_name_ids: AHashMap<u64, u64>,
    class_layouts: AHashMap<u64, ClassLayout>,
    deferred_instances: Vec<DeferredInstance>,
    array_element_field_id: u32,
    stats: ParseStats,
}

impl GraphBuilder {
    pub fn new(id_size: u32, size_mode: SizeMode) -> Self {
        let graph = ReferenceGraph::new();
        let array_element_field_id = graph.intern_field_name(ARRAY_ELEMENT_FIELD);
        Self {
            id_size,
            size_mode,
            graph,
            utf8_strings_by_id: AHashMap::new(),
            class_name_ids: AHashMap::new(),
            class_layouts: AHashMap::new(),
            deferred_instances: Vec::new(),
            array_element_field_id,
            stats: ParseStats::default(),
        }
    }

    pub fn start(
        mut self,
        receive_records: Receiver<Vec<Record>>,
        send_result: Sender<BuiltGraph>,
        send_pooled_vec: Sender<Vec<Record>>,
    ) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("hprof-graph-builder".to_string())
            .spawn(move || loop {
                if let Ok(mut records) = receive_records.recv() {
                    self.record_records(&mut records);
                    // clear values but retain underlying storage
                    records.clear();
                    // send back pooled vec (swallow errors as it is possible
                    // the receiver was already dropped)
                    send_pooled_vec.send(records).unwrap_or_default();
                } else {
                    // no more records to pull: resolve deferred work, freeze
                    // and hand the graph over
                    let built = self.finish();
                    send_result.send(built).unwrap_or_default();
                    break;
                }
            })
    }

    pub fn record_records(&mut self, records: &mut Vec<Record>) {
        for record in records.drain(..) {
            match record {
                Record::Utf8String { id, str } => {
                    self.utf8_strings_by_id.insert(id, str);
                }
                Record::LoadClass {
                    class_object_id,
                    class_name_id,
                    ..
                } => {
                    self.stats.classes_loaded += 1;
                    self.class_name_ids.insert(class_object_id, class_name_id);
                }
                Record::HeapSummary {
                    total_live_bytes,
                    total_live_instances,
                    total_bytes_allocated,
                    total_instances_allocated,
                } => {
                    self.stats.heap_summary = Some(HeapSummaryData {
                        total_live_bytes,
                        total_live_instances,
                        total_bytes_allocated,
                        total_instances_allocated,
                    });
                }
                Record::HeapDumpStart { .. } => self.stats.heap_dumps += 1,
                Record::HeapDumpEnd { .. } => (),
                Record::Skipped { .. } => self.stats.skipped_records += 1,
                Record::UnknownSubTag { .. } => self.stats.unknown_sub_tags += 1,
                Record::GcSegment(gc_record) => {
                    self.stats.heap_dump_sub_records += 1;
                    self.record_gc_record(gc_record);
                }
            }
        }
        self.stats.utf8_strings = self.utf8_strings_by_id.len();
    }

    fn record_gc_record(&mut self, gc_record: GcRecord) {
        match gc_record {
            GcRecord::RootUnknown { object_id } => {
                self.stats.gc_root_unknown += 1;
                self.add_root(object_id, GcRootKind::Unknown, None, None);
            }
            GcRecord::RootThreadObject {
                thread_object_id,
                thread_sequence_number,
                ..
            } => {
                self.stats.gc_root_thread_object += 1;
                self.add_root(
                    thread_object_id,
                    GcRootKind::ThreadObject,
                    Some(thread_sequence_number),
                    None,
                );
            }
            GcRecord::RootJniGlobal { object_id, .. } => {
                self.stats.gc_root_jni_global += 1;
                self.add_root(object_id, GcRootKind::JniGlobal, None, None);
            }
            GcRecord::RootJniLocal {
                object_id,
                thread_serial_number,
                frame_number_in_stack_trace,
            } => {
                self.stats.gc_root_jni_local += 1;
                self.add_root(
                    object_id,
                    GcRootKind::JniLocal,
                    Some(thread_serial_number),
                    Some(frame_number_in_stack_trace),
                );
            }
            GcRecord::RootJavaFrame {
                object_id,
                thread_serial_number,
                frame_number_in_stack_trace,
            } => {
                self.stats.gc_root_java_frame += 1;
                self.add_root(
                    object_id,
                    GcRootKind::JavaFrame,
                    Some(thread_serial_number),
                    Some(frame_number_in_stack_trace),
                );
            }
            GcRecord::RootNativeStack {
                object_id,
                thread_serial_number,
            } => {
                self.stats.gc_root_native_stack += 1;
                self.add_root(
                    object_id,
                    GcRootKind::NativeStack,
                    Some(thread_serial_number),
                    None,
                );
            }
            GcRecord::RootStickyClass { object_id } => {
                self.stats.gc_root_sticky_class += 1;
                self.add_root(object_id, GcRootKind::StickyClass, None, None);
            }
            GcRecord::RootThreadBlock {
                object_id,
                thread_serial_number,
            } => {
                self.stats.gc_root_thread_block += 1;
                self.add_root(
                    object_id,
                    GcRootKind::ThreadBlock,
                    Some(thread_serial_number),
                    None,
                );
            }
            GcRecord::RootMonitorUsed { object_id } => {
                self.stats.gc_root_monitor_used += 1;
                self.add_root(object_id, GcRootKind::MonitorUsed, None, None);
            }
            GcRecord::RootJniMonitor {
                object_id,
                thread_serial_number,
                frame_number_in_stack_trace,
            } => {
                self.stats.gc_root_monitor_used += 1;
                self.add_root(
                    object_id,
                    GcRootKind::MonitorUsed,
                    Some(thread_serial_number),
                    Some(frame_number_in_stack_trace),
                );
            }
            GcRecord::ClassDump(data) => {
                self.stats.class_dumps += 1;
                self.record_class_dump(*data);
            }
            GcRecord::InstanceDump {
                object_id,
                class_object_id,
                data,
                ..
            } => {
                self.stats.instances += 1;
                self.record_instance(object_id, class_object_id, data);
            }
            GcRecord::ObjectArrayDump {
                object_id,
                array_class_id,
                elements,
                ..
            } => {
                self.stats.object_arrays += 1;
                self.record_object_array(object_id, array_class_id, &elements);
            }
            GcRecord::PrimitiveArrayDump {
                object_id,
                number_of_elements,
                element_type,
                ..
            } => {
                self.stats.primitive_arrays += 1;
                self.record_primitive_array(object_id, number_of_elements, element_type);
            }
            GcRecord::HeapDumpInfo { .. } => (),
        }
    }

    fn add_root(
        &mut self,
        object_id: u64,
        kind: GcRootKind,
        thread_serial: Option<u32>,
        frame: Option<u32>,
    ) {
        self.graph.add_gc_root(GcRoot {
            object_id,
            kind,
            thread_serial,
            frame,
        });
    }

    fn record_class_dump(&mut self, data: ClassDumpData) {
        let class_id = data.class_object_id;
        self.class_layouts.insert(
            class_id,
            ClassLayout {
                super_class_object_id: data.super_class_object_id,
                fields: data.instance_fields,
            },
        );
        self.graph.register_class_object(class_id);
        // the class object itself, self-classified until the
        // java.lang.Class fix-up pass
        let header = self.size_mode.header_size();
        self.graph.set_object_info(class_id, class_id, align8(header));

        // object-typed static field values are references held by the class
        for (info, value) in &data.static_fields {
            if let Some(to) = value.object_id() {
                let field_name_id = self.intern_name_string(info.name_id);
                self.graph.add_reference(Reference {
                    from: class_id,
                    to,
                    from_class_id: class_id,
                    field_name_id,
                });
            }
        }

        // synthetic structural edges
        for (target, field) in [
            (data.super_class_object_id, "<superclass>"),
            (data.signers_object_id, "<signers>"),
            (data.protection_domain_object_id, "<protectionDomain>"),
        ] {
            if target != 0 {
                let field_name_id = self.graph.intern_field_name(field);
                self.graph.add_reference(Reference {
                    from: class_id,
                    to: target,
                    from_class_id: class_id,
                    field_name_id,
                });
            }
        }
        let loader = data.class_loader_object_id;
        if loader != 0 {
            if self.graph.class_of(loader).is_none() {
                // loader object not seen yet; placeholder patched by its
                // own instance dump
                self.graph.set_object_info(loader, 0, 0);
            }
            let field_name_id = self.graph.intern_field_name("<classloader>");
            self.graph.add_reference(Reference {
                from: class_id,
                to: loader,
                from_class_id: class_id,
                field_name_id,
            });
            // reverse edge so classes are dominated by their loader rather
            // than the super-root
            let class_edge_id = self.graph.intern_field_name("<class>");
            let loader_class = self.graph.class_of(loader).unwrap_or(0);
            self.graph.add_reference(Reference {
                from: loader,
                to: class_id,
                from_class_id: loader_class,
                field_name_id: class_edge_id,
            });
        }
    }

    fn record_instance(&mut self, object_id: u64, class_object_id: u64, data: Box<[u8]>) {
        let header = self.size_mode.header_size();
        let shallow = align8(header + data.len() as u64);
        self.graph
            .set_object_info(object_id, class_object_id, shallow);
        if self.hierarchy_known(class_object_id) {
            self.decode_instance_fields(object_id, class_object_id, &data);
        } else {
            self.stats.deferred_instances += 1;
            self.deferred_instances.push(DeferredInstance {
                object_id,
                class_object_id,
                data,
            });
        }
    }

    fn record_object_array(&mut self, object_id: u64, array_class_id: u64, elements: &[u64]) {
        let header = self.size_mode.header_size();
        let ref_size = self.size_mode.ref_size();
        let shallow = align8(header + 4 + elements.len() as u64 * ref_size);
        self.graph.set_object_info(object_id, array_class_id, shallow);
        for &element in elements {
            if element != 0 {
                self.graph.add_reference(Reference {
                    from: object_id,
                    to: element,
                    from_class_id: array_class_id,
                    field_name_id: self.array_element_field_id,
                });
            }
        }
    }

    fn record_primitive_array(
        &mut self,
        object_id: u64,
        number_of_elements: u32,
        element_type: FieldType,
    ) {
        let class_id = SYNTHETIC_PRIMITIVE_CLASS_BASE | element_type as u64;
        let header = self.size_mode.header_size();
        let shallow = align8(
            header + 4 + u64::from(number_of_elements) * element_type.heap_element_size(),
        );
        self.graph.set_object_info(object_id, class_id, shallow);
        if let Some(name) = element_type.primitive_array_name() {
            self.graph.set_class_name(class_id, name);
        }
    }

    fn hierarchy_known(&self, class_object_id: u64) -> bool {
        let mut current = class_object_id;
        let mut depth = 0;
        while current != 0 {
            match self.class_layouts.get(&current) {
                Some(layout) => current = layout.super_class_object_id,
                None => return false,
            }
            depth += 1;
            if depth > MAX_HIERARCHY_DEPTH {
                return false;
            }
        }
        true
    }

    /// Walks the instance payload in hierarchy order (current class first,
    /// then each superclass) and emits a reference per non-null object field.
    fn decode_instance_fields(&mut self, object_id: u64, class_object_id: u64, data: &[u8]) {
        let id_size = self.id_size;
        let mut offset = 0usize;
        let mut current = class_object_id;
        let mut depth = 0;
        while current != 0 && depth <= MAX_HIERARCHY_DEPTH {
            let layout = match self.class_layouts.get(&current) {
                Some(layout) => layout,
                None => break,
            };
            let super_class = layout.super_class_object_id;
            // collect object fields of this level before touching the graph
            let mut refs: Vec<(u64, u64)> = Vec::new();
            let mut truncated = false;
            for field in &layout.fields {
                let width = field.field_type.byte_size(id_size) as usize;
                if offset + width > data.len() {
                    truncated = true;
                    break;
                }
                if field.field_type == FieldType::Object {
                    let to = decode_id(&data[offset..offset + width]);
                    if to != 0 {
                        refs.push((field.name_id, to));
                    }
                }
                offset += width;
            }
            for (name_id, to) in refs {
                let field_name_id = self.intern_name_string(name_id);
                self.graph.add_reference(Reference {
                    from: object_id,
                    to,
                    from_class_id: class_object_id,
                    field_name_id,
                });
            }
            if truncated {
                self.stats.truncated_instances += 1;
                return;
            }
            current = super_class;
            depth += 1;
        }
    }

    fn intern_name_string(&self, name_string_id: u64) -> u32 {
        match self.utf8_strings_by_id.get(&name_string_id) {
            Some(name) => self.graph.intern_field_name(name),
            None => 0,
        }
    }

    /// End-of-stream work: drain the deferred queue, resolve class names,
    /// re-classify Class objects, freeze.
    pub fn finish(mut self) -> BuiltGraph {
        let deferred = std::mem::take(&mut self.deferred_instances);
        for instance in deferred {
            if self.hierarchy_known(instance.class_object_id) {
                self.decode_instance_fields(
                    instance.object_id,
                    instance.class_object_id,
                    &instance.data,
                );
            } else {
                // references from this instance are silently dropped
                self.stats.unresolved_instances += 1;
            }
        }

        let mut java_lang_class_id = None;
        for (&class_id, &name_id) in &self.class_name_ids {
            if let Some(raw_name) = self.utf8_strings_by_id.get(&name_id) {
                if &**raw_name == "java/lang/Class" {
                    java_lang_class_id = Some(class_id);
                }
                let normalized = normalize_class_name(raw_name);
                self.graph.set_class_name(class_id, &normalized);
            }
        }
        if let Some(id) = java_lang_class_id {
            self.stats.class_object_fixups = self.graph.fix_class_object_class_ids(id);
        }

        self.graph.freeze();
        BuiltGraph {
            graph: self.graph,
            stats: self.stats,
        }
    }
}

fn decode_id(bytes: &[u8]) -> u64 {
    match bytes.len() {
        4 => u64::from(u32::from_be_bytes(bytes.try_into().expect("4 bytes"))),
        8 => u64::from_be_bytes(bytes.try_into().expect("8 bytes")),
        _ => 0,
    }
}
