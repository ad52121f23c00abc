//! The in-memory object reference graph and its secondary indices.
//!
//! The graph is build-once, analyze-many: the builder writes while the state
//! is `Building`, `freeze` closes the object set, and from then on the
//! primary maps are read-only. Secondary indices (compact indices, per-class
//! object lists, indexed incoming references) are built lazily under one-shot
//! latches and are safe to read from many analysis threads at once.

pub mod builder;
pub mod names;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use ahash::{AHashMap, AHashSet};

use crate::dominator::DominatorResults;

/// Sentinel object id reported as the dominator of objects owned directly by
/// the virtual super-root.
pub const SUPER_ROOT_ID: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GcRootKind {
    Unknown,
    JniGlobal,
    JniLocal,
    JavaFrame,
    NativeStack,
    StickyClass,
    ThreadBlock,
    MonitorUsed,
    ThreadObject,
}

impl GcRootKind {
    pub fn label(self) -> &'static str {
        match self {
            GcRootKind::Unknown => "unknown",
            GcRootKind::JniGlobal => "JNI global",
            GcRootKind::JniLocal => "JNI local",
            GcRootKind::JavaFrame => "Java frame",
            GcRootKind::NativeStack => "native stack",
            GcRootKind::StickyClass => "sticky class",
            GcRootKind::ThreadBlock => "thread block",
            GcRootKind::MonitorUsed => "monitor used",
            GcRootKind::ThreadObject => "thread object",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GcRoot {
    pub object_id: u64,
    pub kind: GcRootKind,
    pub thread_serial: Option<u32>,
    pub frame: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub from: u64,
    pub to: u64,
    pub from_class_id: u64,
    pub field_name_id: u32,
}

/// Incoming edge rewritten onto compact indices for the BFS hot path.
#[derive(Debug, Clone, Copy)]
pub struct IndexedReference {
    pub from_index: u32,
    pub from_class_id: u64,
    pub field_name_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Building,
    Frozen,
    Analyzed,
}

const STATE_BUILDING: u8 = 0;
const STATE_FROZEN: u8 = 1;
const STATE_ANALYZED: u8 = 2;

/// Interning table for reference field names; id 0 is the empty string.
///
/// Readers take the read side on the fast path; the first writer takes the
/// write side and re-checks before assigning a new id.
pub struct FieldNameTable {
    inner: RwLock<FieldNameTableInner>,
}

struct FieldNameTableInner {
    by_name: AHashMap<Arc<str>, u32>,
    names: Vec<Arc<str>>,
}

impl FieldNameTable {
    fn new() -> Self {
        let empty: Arc<str> = Arc::from("");
        let mut by_name = AHashMap::new();
        by_name.insert(Arc::clone(&empty), 0);
        Self {
            inner: RwLock::new(FieldNameTableInner {
                by_name,
                names: vec![empty],
            }),
        }
    }

    pub fn intern(&self, name: &str) -> u32 {
        {
            let inner = self.inner.read().expect("interner lock poisoned");
            if let Some(&id) = inner.by_name.get(name) {
                return id;
            }
        }
        let mut inner = self.inner.write().expect("interner lock poisoned");
        if let Some(&id) = inner.by_name.get(name) {
            return id;
        }
        let id = inner.names.len() as u32;
        let interned: Arc<str> = Arc::from(name);
        inner.names.push(Arc::clone(&interned));
        inner.by_name.insert(interned, id);
        id
    }

    pub fn resolve(&self, id: u32) -> Option<Arc<str>> {
        self.inner
            .read()
            .expect("interner lock poisoned")
            .names
            .get(id as usize)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("interner lock poisoned").names.len()
    }

    pub fn is_empty(&self) -> bool {
        false // id 0 always present
    }
}

/// Per-compact-index views of the object table.
pub struct IndexArrays {
    pub class_ids: Vec<u64>,
    pub shallow_sizes: Vec<u64>,
}

struct CompactIndex {
    index_of: AHashMap<u64, u32>,
}

pub struct ReferenceGraph {
    state: AtomicU8,
    outgoing_refs: AHashMap<u64, Vec<Reference>>,
    incoming_refs: AHashMap<u64, Vec<Reference>>,
    object_class: AHashMap<u64, u64>,
    object_size: AHashMap<u64, u64>,
    /// Object ids in registration order; the position is the compact index.
    objects: Vec<u64>,
    class_names: AHashMap<u64, Box<str>>,
    gc_roots: Vec<GcRoot>,
    class_objects: AHashSet<u64>,
    reference_count: u64,
    field_names: FieldNameTable,
    compact: OnceLock<CompactIndex>,
    class_to_objects: OnceLock<AHashMap<u64, Vec<u64>>>,
    class_name_to_id: OnceLock<AHashMap<Box<str>, u64>>,
    indexed_incoming: OnceLock<Vec<Vec<IndexedReference>>>,
    index_arrays: OnceLock<IndexArrays>,
    root_objects: OnceLock<Vec<u64>>,
    root_kinds: OnceLock<AHashMap<u64, GcRootKind>>,
    dominators: OnceLock<DominatorResults>,
}

impl Default for ReferenceGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceGraph {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_BUILDING),
            outgoing_refs: AHashMap::new(),
            incoming_refs: AHashMap::new(),
            object_class: AHashMap::new(),
            object_size: AHashMap::new(),
            objects: Vec::new(),
            class_names: AHashMap::new(),
            gc_roots: Vec::new(),
            class_objects: AHashSet::new(),
            reference_count: 0,
            field_names: FieldNameTable::new(),
            compact: OnceLock::new(),
            class_to_objects: OnceLock::new(),
            class_name_to_id: OnceLock::new(),
            indexed_incoming: OnceLock::new(),
            index_arrays: OnceLock::new(),
            root_objects: OnceLock::new(),
            root_kinds: OnceLock::new(),
            dominators: OnceLock::new(),
        }
    }

    pub fn state(&self) -> GraphState {
        match self.state.load(Ordering::Acquire) {
            STATE_BUILDING => GraphState::Building,
            STATE_FROZEN => GraphState::Frozen,
            _ => GraphState::Analyzed,
        }
    }

    fn assert_building(&self) {
        assert_eq!(
            self.state(),
            GraphState::Building,
            "graph writes are only legal before freeze"
        );
    }

    // -- Building phase ----------------------------------------------------

    pub fn add_reference(&mut self, reference: Reference) {
        self.assert_building();
        self.outgoing_refs
            .entry(reference.from)
            .or_default()
            .push(reference);
        self.incoming_refs
            .entry(reference.to)
            .or_default()
            .push(reference);
        self.reference_count += 1;
    }

    /// Registers an object, idempotently: the first registration wins, except
    /// that a pre-registered placeholder (class 0, size 0) is patched by the
    /// first real registration.
    pub fn set_object_info(&mut self, object_id: u64, class_id: u64, size: u64) {
        self.assert_building();
        match self.object_class.get(&object_id) {
            None => {
                self.object_class.insert(object_id, class_id);
                self.object_size.insert(object_id, size);
                self.objects.push(object_id);
            }
            Some(&existing_class) => {
                let existing_size = self.object_size.get(&object_id).copied().unwrap_or(0);
                if existing_class == 0 && existing_size == 0 {
                    self.object_class.insert(object_id, class_id);
                    self.object_size.insert(object_id, size);
                }
            }
        }
    }

    pub fn register_class_object(&mut self, object_id: u64) {
        self.assert_building();
        self.class_objects.insert(object_id);
    }

    /// First non-empty name wins.
    pub fn set_class_name(&mut self, class_id: u64, name: &str) {
        self.assert_building();
        if name.is_empty() {
            return;
        }
        self.class_names
            .entry(class_id)
            .or_insert_with(|| name.into());
    }

    pub fn add_gc_root(&mut self, root: GcRoot) {
        self.assert_building();
        self.gc_roots.push(root);
    }

    pub fn intern_field_name(&self, name: &str) -> u32 {
        self.field_names.intern(name)
    }

    /// Rewrites the placeholder self-classification of Class objects to the
    /// discovered `java.lang.Class` id. Returns the number of rewrites, so a
    /// second call returns 0.
    pub fn fix_class_object_class_ids(&mut self, java_lang_class_id: u64) -> usize {
        self.assert_building();
        let mut fixed = 0;
        for &class_object_id in &self.class_objects {
            if class_object_id == java_lang_class_id {
                // java.lang.Class itself is legitimately its own class
                continue;
            }
            if let Some(class) = self.object_class.get_mut(&class_object_id) {
                if *class == class_object_id {
                    *class = java_lang_class_id;
                    fixed += 1;
                }
            }
        }
        fixed
    }

    pub fn freeze(&mut self) {
        let _ = self.state.compare_exchange(
            STATE_BUILDING,
            STATE_FROZEN,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    // -- Read phase --------------------------------------------------------

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn reference_count(&self) -> u64 {
        self.reference_count
    }

    pub fn class_count(&self) -> usize {
        self.class_names.len()
    }

    pub fn object_ids(&self) -> &[u64] {
        &self.objects
    }

    pub fn class_of(&self, object_id: u64) -> Option<u64> {
        self.object_class.get(&object_id).copied()
    }

    pub fn shallow_size_of(&self, object_id: u64) -> Option<u64> {
        self.object_size.get(&object_id).copied()
    }

    pub fn class_name(&self, class_id: u64) -> Option<&str> {
        self.class_names.get(&class_id).map(|n| &**n)
    }

    pub fn class_name_or_unknown(&self, class_id: u64) -> String {
        match self.class_name(class_id) {
            Some(name) => name.to_string(),
            None => format!("unknown-class-0x{class_id:x}"),
        }
    }

    pub fn outgoing_refs_of(&self, object_id: u64) -> &[Reference] {
        self.outgoing_refs
            .get(&object_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn incoming_refs_of(&self, object_id: u64) -> &[Reference] {
        self.incoming_refs
            .get(&object_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn gc_roots(&self) -> &[GcRoot] {
        &self.gc_roots
    }

    pub fn class_objects(&self) -> &AHashSet<u64> {
        &self.class_objects
    }

    pub fn field_name(&self, id: u32) -> Option<Arc<str>> {
        self.field_names.resolve(id)
    }

    pub fn field_names(&self) -> &FieldNameTable {
        &self.field_names
    }

    // -- Lazy indices ------------------------------------------------------

    fn compact_index(&self) -> &CompactIndex {
        self.compact.get_or_init(|| {
            let mut index_of = AHashMap::with_capacity(self.objects.len());
            for (idx, &id) in self.objects.iter().enumerate() {
                index_of.insert(id, idx as u32);
            }
            CompactIndex { index_of }
        })
    }

    pub fn compact_index_of(&self, object_id: u64) -> Option<u32> {
        self.compact_index().index_of.get(&object_id).copied()
    }

    pub fn object_id_at(&self, index: u32) -> u64 {
        self.objects[index as usize]
    }

    /// classID → object ids, counted first and then filled with exact
    /// capacities.
    pub fn objects_of_class(&self, class_id: u64) -> &[u64] {
        let map = self.class_to_objects.get_or_init(|| {
            let mut counts: AHashMap<u64, usize> = AHashMap::new();
            for &id in &self.objects {
                if let Some(&class) = self.object_class.get(&id) {
                    *counts.entry(class).or_default() += 1;
                }
            }
            let mut filled: AHashMap<u64, Vec<u64>> = AHashMap::with_capacity(counts.len());
            for (&class, &n) in &counts {
                filled.insert(class, Vec::with_capacity(n));
            }
            for &id in &self.objects {
                if let Some(&class) = self.object_class.get(&id) {
                    filled
                        .get_mut(&class)
                        .expect("counted in first pass")
                        .push(id);
                }
            }
            filled
        });
        map.get(&class_id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn class_id_by_name(&self, name: &str) -> Option<u64> {
        let map = self.class_name_to_id.get_or_init(|| {
            let mut by_name: AHashMap<Box<str>, u64> =
                AHashMap::with_capacity(self.class_names.len());
            for (&class_id, class_name) in &self.class_names {
                // first writer wins on duplicate names; duplicates come from
                // classes loaded by several loaders
                by_name.entry(class_name.clone()).or_insert(class_id);
            }
            by_name
        });
        map.get(name).copied()
    }

    pub fn indexed_incoming_refs(&self, index: u32) -> &[IndexedReference] {
        let indexed = self.indexed_incoming.get_or_init(|| {
            let compact = self.compact_index();
            let mut result: Vec<Vec<IndexedReference>> = Vec::with_capacity(self.objects.len());
            for &to_id in &self.objects {
                let refs = match self.incoming_refs.get(&to_id) {
                    Some(refs) => {
                        let mut indexed_refs = Vec::with_capacity(refs.len());
                        for r in refs {
                            // references from objects missing at analysis
                            // start are dropped here
                            if let Some(&from_index) = compact.index_of.get(&r.from) {
                                indexed_refs.push(IndexedReference {
                                    from_index,
                                    from_class_id: r.from_class_id,
                                    field_name_id: r.field_name_id,
                                });
                            }
                        }
                        indexed_refs
                    }
                    None => Vec::new(),
                };
                result.push(refs);
            }
            result
        });
        indexed[index as usize].as_slice()
    }

    pub fn index_arrays(&self) -> &IndexArrays {
        self.index_arrays.get_or_init(|| {
            let mut class_ids = Vec::with_capacity(self.objects.len());
            let mut shallow_sizes = Vec::with_capacity(self.objects.len());
            for &id in &self.objects {
                class_ids.push(self.object_class.get(&id).copied().unwrap_or(0));
                shallow_sizes.push(self.object_size.get(&id).copied().unwrap_or(0));
            }
            IndexArrays {
                class_ids,
                shallow_sizes,
            }
        })
    }

    /// Explicit GC roots joined with the Class-object set, deduplicated and
    /// sorted. These are the out-neighbors of the virtual super-root.
    pub fn root_object_ids(&self) -> &[u64] {
        self.root_objects.get_or_init(|| {
            let mut seen: AHashSet<u64> = AHashSet::new();
            let mut roots = Vec::new();
            for root in &self.gc_roots {
                if self.object_class.contains_key(&root.object_id)
                    && seen.insert(root.object_id)
                {
                    roots.push(root.object_id);
                }
            }
            for &class_object in &self.class_objects {
                if self.object_class.contains_key(&class_object) && seen.insert(class_object) {
                    roots.push(class_object);
                }
            }
            roots.sort_unstable();
            roots
        })
    }

    /// Root kind by object id, explicit roots winning over the implicit
    /// sticky-class kind of Class objects.
    pub fn root_kind_of(&self, object_id: u64) -> Option<GcRootKind> {
        let kinds = self.root_kinds.get_or_init(|| {
            let mut kinds: AHashMap<u64, GcRootKind> = AHashMap::new();
            for root in &self.gc_roots {
                kinds.entry(root.object_id).or_insert(root.kind);
            }
            for &class_object in &self.class_objects {
                kinds.entry(class_object).or_insert(GcRootKind::StickyClass);
            }
            kinds
        });
        kinds.get(&object_id).copied()
    }

    pub fn is_root_object(&self, object_id: u64) -> bool {
        self.root_kind_of(object_id).is_some()
    }

    // -- Dominator results -------------------------------------------------

    /// Publishes the dominator analysis; the first publication wins and moves
    /// the graph to `Analyzed`.
    pub fn set_dominator_results(&self, results: DominatorResults) -> bool {
        let stored = self.dominators.set(results).is_ok();
        if stored {
            self.state.store(STATE_ANALYZED, Ordering::Release);
        }
        stored
    }

    pub fn dominator_results(&self) -> Option<&DominatorResults> {
        self.dominators.get()
    }

    pub fn retained_size_of(&self, object_id: u64) -> Option<u64> {
        let results = self.dominators.get()?;
        let index = self.compact_index_of(object_id)?;
        Some(results.retained_of_index(index))
    }

    /// Immediate dominator; `SUPER_ROOT_ID` when the object hangs directly
    /// off the virtual super-root. `None` before analysis or for unknown ids.
    pub fn dominator_of(&self, object_id: u64) -> Option<u64> {
        let results = self.dominators.get()?;
        let index = self.compact_index_of(object_id)?;
        match results.dominator_index_of(index) {
            Some(parent_index) => Some(self.objects[parent_index as usize]),
            None => Some(SUPER_ROOT_ID),
        }
    }

    /// Conservatively true before the dominator tree exists.
    pub fn is_object_reachable(&self, object_id: u64) -> bool {
        match (self.dominators.get(), self.compact_index_of(object_id)) {
            (Some(results), Some(index)) => results.is_reachable(index),
            _ => true,
        }
    }
}
