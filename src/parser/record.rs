use crate::parser::gc_record::GcRecord;

#[derive(Debug, PartialEq, Eq)]
pub struct RecordHeader {
    pub timestamp: u32,
    pub length: u32,
}

#[derive(Debug)]
pub enum Record {
    Utf8String {
        id: u64,
        str: Box<str>,
    },
    LoadClass {
        serial_number: u32,
        class_object_id: u64,
        stack_trace_serial_number: u32,
        class_name_id: u64,
    },
    HeapSummary {
        total_live_bytes: u32,
        total_live_instances: u32,
        total_bytes_allocated: u64,
        total_instances_allocated: u64,
    },
    HeapDumpStart {
        length: u32,
    },
    HeapDumpEnd {
        length: u32,
    },
    /// A top-level record whose tag is not needed for graph construction;
    /// its payload was skipped by the declared length.
    Skipped {
        tag: u8,
        length: u32,
    },
    /// An unrecognized heap-dump sub-tag; the rest of the enclosing
    /// heap-dump payload was abandoned to resynchronize on the next
    /// top-level record.
    UnknownSubTag {
        tag: u8,
        skipped: u32,
    },
    GcSegment(GcRecord),
}
