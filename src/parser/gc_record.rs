#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FieldType {
    Object = 2,
    Bool = 4,
    Char = 5,
    Float = 6,
    Double = 7,
    Byte = 8,
    Short = 9,
    Int = 10,
    Long = 11,
}

impl FieldType {
    pub fn from_value(v: u8) -> Option<FieldType> {
        match v {
            2 => Some(FieldType::Object),
            4 => Some(FieldType::Bool),
            5 => Some(FieldType::Char),
            6 => Some(FieldType::Float),
            7 => Some(FieldType::Double),
            8 => Some(FieldType::Byte),
            9 => Some(FieldType::Short),
            10 => Some(FieldType::Int),
            11 => Some(FieldType::Long),
            _ => None,
        }
    }

    /// Width of one value of this type in the dump; object fields take the
    /// identifier width from the file header instead.
    pub fn byte_size(self, id_size: u32) -> u32 {
        match self {
            FieldType::Object => id_size,
            FieldType::Bool | FieldType::Byte => 1,
            FieldType::Char | FieldType::Short => 2,
            FieldType::Float | FieldType::Int => 4,
            FieldType::Double | FieldType::Long => 8,
        }
    }

    /// In-heap element width used for shallow-size reconstruction.
    pub fn heap_element_size(self) -> u64 {
        match self {
            FieldType::Bool | FieldType::Byte => 1,
            FieldType::Char | FieldType::Short => 2,
            FieldType::Float | FieldType::Int => 4,
            FieldType::Double | FieldType::Long | FieldType::Object => 8,
        }
    }

    pub fn primitive_array_name(self) -> Option<&'static str> {
        match self {
            FieldType::Bool => Some("boolean[]"),
            FieldType::Char => Some("char[]"),
            FieldType::Float => Some("float[]"),
            FieldType::Double => Some("double[]"),
            FieldType::Byte => Some("byte[]"),
            FieldType::Short => Some("short[]"),
            FieldType::Int => Some("int[]"),
            FieldType::Long => Some("long[]"),
            FieldType::Object => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldInfo {
    pub name_id: u64,
    pub field_type: FieldType,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Object(u64),
}

impl FieldValue {
    /// Object identifier carried by the value, when it is a non-null object.
    pub fn object_id(self) -> Option<u64> {
        match self {
            FieldValue::Object(0) => None,
            FieldValue::Object(id) => Some(id),
            _ => None,
        }
    }
}

/// Everything a `CLASS_DUMP` sub-record contributes to class layout
/// reconstruction. Constant-pool entries are consumed but not kept.
#[derive(Debug)]
pub struct ClassDumpData {
    pub class_object_id: u64,
    pub stack_trace_serial_number: u32,
    pub super_class_object_id: u64,
    pub class_loader_object_id: u64,
    pub signers_object_id: u64,
    pub protection_domain_object_id: u64,
    pub instance_size: u32,
    pub static_fields: Vec<(FieldInfo, FieldValue)>,
    /// Declared instance fields, in declaration order.
    pub instance_fields: Vec<FieldInfo>,
}

#[derive(Debug)]
pub enum GcRecord {
    RootUnknown {
        object_id: u64,
    },
    RootThreadObject {
        thread_object_id: u64,
        thread_sequence_number: u32,
        stack_sequence_number: u32,
    },
    RootJniGlobal {
        object_id: u64,
        jni_global_ref_id: u64,
    },
    RootJniLocal {
        object_id: u64,
        thread_serial_number: u32,
        frame_number_in_stack_trace: u32,
    },
    RootJavaFrame {
        object_id: u64,
        thread_serial_number: u32,
        frame_number_in_stack_trace: u32,
    },
    RootNativeStack {
        object_id: u64,
        thread_serial_number: u32,
    },
    RootStickyClass {
        object_id: u64,
    },
    RootThreadBlock {
        object_id: u64,
        thread_serial_number: u32,
    },
    RootMonitorUsed {
        object_id: u64,
    },
    /// Android/OpenJ9 extension root (0x8E).
    RootJniMonitor {
        object_id: u64,
        thread_serial_number: u32,
        frame_number_in_stack_trace: u32,
    },
    InstanceDump {
        object_id: u64,
        stack_trace_serial_number: u32,
        class_object_id: u64,
        /// Raw instance field bytes, decoded once the class layout is known.
        data: Box<[u8]>,
    },
    ObjectArrayDump {
        object_id: u64,
        stack_trace_serial_number: u32,
        array_class_id: u64,
        elements: Box<[u64]>,
    },
    PrimitiveArrayDump {
        object_id: u64,
        stack_trace_serial_number: u32,
        number_of_elements: u32,
        element_type: FieldType,
    },
    ClassDump(Box<ClassDumpData>),
    /// Android heap-dump-info marker (0xFE); carries no object.
    HeapDumpInfo {
        heap_id: u32,
        heap_name_id: u64,
    },
}
