use crate::parser::gc_record::{ClassDumpData, FieldInfo, FieldType, FieldValue, GcRecord};
use crate::parser::primitive_parsers::{
    parse_f32, parse_f64, parse_i16, parse_i32, parse_i64, parse_i8, parse_id, parse_u16,
    parse_u32, parse_u64, parse_u8, skip_bytes,
};
use crate::parser::record::{Record, RecordHeader};

use nom::bytes::streaming::take;
use nom::combinator::map;
use nom::error::{ErrorKind, ParseError};
use nom::multi::count;
use nom::sequence::preceded;
use nom::{IResult, Parser};

const TAG_STRING: u8 = 0x01;
const TAG_LOAD_CLASS: u8 = 0x02;
const TAG_HEAP_SUMMARY: u8 = 0x07;
const TAG_HEAP_DUMP: u8 = 0x0C;
const TAG_HEAP_DUMP_SEGMENT: u8 = 0x1C;
const TAG_HEAP_DUMP_END: u8 = 0x2C;

const TAG_GC_ROOT_UNKNOWN: u8 = 0xFF;
const TAG_GC_ROOT_JNI_GLOBAL: u8 = 0x01;
const TAG_GC_ROOT_JNI_LOCAL: u8 = 0x02;
const TAG_GC_ROOT_JAVA_FRAME: u8 = 0x03;
const TAG_GC_ROOT_NATIVE_STACK: u8 = 0x04;
const TAG_GC_ROOT_STICKY_CLASS: u8 = 0x05;
const TAG_GC_ROOT_THREAD_BLOCK: u8 = 0x06;
const TAG_GC_ROOT_MONITOR_USED: u8 = 0x07;
const TAG_GC_ROOT_THREAD_OBJ: u8 = 0x08;
const TAG_GC_CLASS_DUMP: u8 = 0x20;
const TAG_GC_INSTANCE_DUMP: u8 = 0x21;
const TAG_GC_OBJ_ARRAY_DUMP: u8 = 0x22;
const TAG_GC_PRIM_ARRAY_DUMP: u8 = 0x23;

// Android/OpenJ9 extension sub-tags, fixed layouts.
const TAG_GC_ROOT_INTERNED_STRING: u8 = 0x89;
const TAG_GC_ROOT_FINALIZING: u8 = 0x8A;
const TAG_GC_ROOT_DEBUGGER: u8 = 0x8B;
const TAG_GC_ROOT_REFERENCE_CLEANUP: u8 = 0x8C;
const TAG_GC_ROOT_VM_INTERNAL: u8 = 0x8D;
const TAG_GC_ROOT_JNI_MONITOR: u8 = 0x8E;
const TAG_GC_PRIM_ARRAY_NODATA: u8 = 0xC3;
const TAG_GC_HEAP_DUMP_INFO: u8 = 0xFE;

pub struct HprofRecordParser {
    id_size: u32,
    debug_mode: bool,
    heap_dump_remaining_len: u32,
}

impl HprofRecordParser {
    pub fn new(id_size: u32, debug_mode: bool) -> Self {
        HprofRecordParser {
            id_size,
            debug_mode,
            heap_dump_remaining_len: 0,
        }
    }

    pub fn parse_hprof_record(&mut self) -> impl FnMut(&[u8]) -> IResult<&[u8], Record> + '_ {
        |i| {
            if self.heap_dump_remaining_len == 0 {
                let (r1, tag) = parse_u8(i)?;
                if self.debug_mode {
                    println!("Found record tag:{tag} remaining bytes:{}", i.len());
                }
                match tag {
                    TAG_STRING => parse_utf8_string(self.id_size, r1),
                    TAG_LOAD_CLASS => parse_load_class(self.id_size, r1),
                    TAG_HEAP_SUMMARY => parse_heap_summary(r1),
                    TAG_HEAP_DUMP_END => parse_heap_dump_end(r1),
                    TAG_HEAP_DUMP | TAG_HEAP_DUMP_SEGMENT => map(parse_header_record, |hr| {
                        // arm GC sub-record mode for the payload length
                        self.heap_dump_remaining_len = hr.length;
                        Record::HeapDumpStart { length: hr.length }
                    })
                    .parse(r1),
                    other => parse_skipped_record(other, r1),
                }
            } else {
                // GC sub-record mode
                let remaining = self.heap_dump_remaining_len;
                let start_len = i.len();
                let (r1, sub_tag) = parse_u8(i)?;
                if !is_known_sub_tag(sub_tag) {
                    // Sub-record length is unknowable here: abandon the rest
                    // of this heap-dump payload and resynchronize on the next
                    // top-level record.
                    let skipped = remaining - 1;
                    let (r2, _) = take(skipped).parse(r1)?;
                    self.heap_dump_remaining_len = 0;
                    return Ok((
                        r2,
                        Record::UnknownSubTag {
                            tag: sub_tag,
                            skipped,
                        },
                    ));
                }
                let (r2, gc_record) = parse_gc_sub_record(self.id_size, sub_tag, r1)?;
                let consumed = (start_len - r2.len()) as u32;
                if consumed > remaining {
                    // sub-record over-ran the enclosing heap-dump payload
                    return Err(nom::Err::Failure(nom::error::Error::from_error_kind(
                        i,
                        ErrorKind::LengthValue,
                    )));
                }
                self.heap_dump_remaining_len = remaining - consumed;
                Ok((r2, Record::GcSegment(gc_record)))
            }
        }
    }

    pub fn parse_streaming<'a>(
        &mut self,
        i: &'a [u8],
        pooled_vec: &mut Vec<Record>,
    ) -> IResult<&'a [u8], ()> {
        lazy_many1(self.parse_hprof_record(), pooled_vec)(i)
    }

    #[cfg(test)]
    fn in_heap_dump(&self) -> bool {
        self.heap_dump_remaining_len != 0
    }
}

// copy of nom's many1 but
// - returns values accumulated so far on `nom::Err::Incomplete(_)` if any
// - takes a `&mut vector` as input to enable pooling at the call site
pub fn lazy_many1<'a, I, F>(
    mut f: F,
    pooled_vec: &'a mut Vec<<F as Parser<I>>::Output>,
) -> impl FnMut(I) -> IResult<I, (), <F as Parser<I>>::Error> + 'a
where
    I: Clone + PartialEq,
    F: Parser<I> + 'a,
    <F as Parser<I>>::Error: ParseError<I>,
{
    move |mut i: I| match f.parse(i.clone()) {
        Err(nom::Err::Error(err)) => Err(nom::Err::Error(<F as Parser<I>>::Error::append(
            i,
            ErrorKind::Many1,
            err,
        ))),
        Err(e) => Err(e),
        Ok((i1, o)) => {
            pooled_vec.push(o);
            i = i1;
            loop {
                match f.parse(i.clone()) {
                    Err(nom::Err::Error(_)) => return Ok((i, ())),
                    // return Ok if we have seen at least one element,
                    // otherwise fail
                    Err(nom::Err::Incomplete(_)) => return Ok((i, ())),
                    Err(e) => return Err(e),
                    Ok((i1, o)) => {
                        if i1 == i {
                            return Err(nom::Err::Error(
                                <F as Parser<I>>::Error::from_error_kind(i, ErrorKind::Many1),
                            ));
                        }
                        i = i1;
                        pooled_vec.push(o);
                    }
                }
            }
        }
    }
}

fn is_known_sub_tag(sub_tag: u8) -> bool {
    matches!(
        sub_tag,
        TAG_GC_ROOT_UNKNOWN
            | TAG_GC_ROOT_JNI_GLOBAL
            | TAG_GC_ROOT_JNI_LOCAL
            | TAG_GC_ROOT_JAVA_FRAME
            | TAG_GC_ROOT_NATIVE_STACK
            | TAG_GC_ROOT_STICKY_CLASS
            | TAG_GC_ROOT_THREAD_BLOCK
            | TAG_GC_ROOT_MONITOR_USED
            | TAG_GC_ROOT_THREAD_OBJ
            | TAG_GC_CLASS_DUMP
            | TAG_GC_INSTANCE_DUMP
            | TAG_GC_OBJ_ARRAY_DUMP
            | TAG_GC_PRIM_ARRAY_DUMP
            | TAG_GC_ROOT_INTERNED_STRING
            | TAG_GC_ROOT_FINALIZING
            | TAG_GC_ROOT_DEBUGGER
            | TAG_GC_ROOT_REFERENCE_CLEANUP
            | TAG_GC_ROOT_VM_INTERNAL
            | TAG_GC_ROOT_JNI_MONITOR
            | TAG_GC_PRIM_ARRAY_NODATA
            | TAG_GC_HEAP_DUMP_INFO
    )
}

fn parse_gc_sub_record(id_size: u32, sub_tag: u8, i: &[u8]) -> IResult<&[u8], GcRecord> {
    match sub_tag {
        // vendor single-id roots fold into the unknown root kind
        TAG_GC_ROOT_UNKNOWN
        | TAG_GC_ROOT_INTERNED_STRING
        | TAG_GC_ROOT_FINALIZING
        | TAG_GC_ROOT_DEBUGGER
        | TAG_GC_ROOT_REFERENCE_CLEANUP
        | TAG_GC_ROOT_VM_INTERNAL => parse_gc_root_unknown(id_size, i),
        TAG_GC_ROOT_JNI_GLOBAL => parse_gc_root_jni_global(id_size, i),
        TAG_GC_ROOT_JNI_LOCAL => parse_gc_root_jni_local(id_size, i),
        TAG_GC_ROOT_JAVA_FRAME => parse_gc_root_java_frame(id_size, i),
        TAG_GC_ROOT_NATIVE_STACK => parse_gc_root_native_stack(id_size, i),
        TAG_GC_ROOT_STICKY_CLASS => parse_gc_root_sticky_class(id_size, i),
        TAG_GC_ROOT_THREAD_BLOCK => parse_gc_root_thread_block(id_size, i),
        TAG_GC_ROOT_MONITOR_USED => parse_gc_root_monitor_used(id_size, i),
        TAG_GC_ROOT_THREAD_OBJ => parse_gc_root_thread_object(id_size, i),
        TAG_GC_ROOT_JNI_MONITOR => parse_gc_root_jni_monitor(id_size, i),
        TAG_GC_CLASS_DUMP => parse_gc_class_dump(id_size, i),
        TAG_GC_INSTANCE_DUMP => parse_gc_instance_dump(id_size, i),
        TAG_GC_OBJ_ARRAY_DUMP => parse_gc_object_array_dump(id_size, i),
        TAG_GC_PRIM_ARRAY_DUMP => parse_gc_primitive_array_dump(id_size, i),
        TAG_GC_PRIM_ARRAY_NODATA => parse_gc_primitive_array_nodata(id_size, i),
        TAG_GC_HEAP_DUMP_INFO => parse_gc_heap_dump_info(id_size, i),
        _ => unreachable!("sub tag filtered by is_known_sub_tag"),
    }
}

fn parse_gc_root_unknown(id_size: u32, i: &[u8]) -> IResult<&[u8], GcRecord> {
    map(parse_id(id_size), |object_id| GcRecord::RootUnknown {
        object_id,
    })
    .parse(i)
}

fn parse_gc_root_thread_object(id_size: u32, i: &[u8]) -> IResult<&[u8], GcRecord> {
    map(
        (parse_id(id_size), parse_u32, parse_u32),
        |(thread_object_id, thread_sequence_number, stack_sequence_number)| {
            GcRecord::RootThreadObject {
                thread_object_id,
                thread_sequence_number,
                stack_sequence_number,
            }
        },
    )
    .parse(i)
}

fn parse_gc_root_jni_global(id_size: u32, i: &[u8]) -> IResult<&[u8], GcRecord> {
    map(
        (parse_id(id_size), parse_id(id_size)),
        |(object_id, jni_global_ref_id)| GcRecord::RootJniGlobal {
            object_id,
            jni_global_ref_id,
        },
    )
    .parse(i)
}

fn parse_gc_root_jni_local(id_size: u32, i: &[u8]) -> IResult<&[u8], GcRecord> {
    map(
        (parse_id(id_size), parse_u32, parse_u32),
        |(object_id, thread_serial_number, frame_number_in_stack_trace)| GcRecord::RootJniLocal {
            object_id,
            thread_serial_number,
            frame_number_in_stack_trace,
        },
    )
    .parse(i)
}

fn parse_gc_root_java_frame(id_size: u32, i: &[u8]) -> IResult<&[u8], GcRecord> {
    map(
        (parse_id(id_size), parse_u32, parse_u32),
        |(object_id, thread_serial_number, frame_number_in_stack_trace)| GcRecord::RootJavaFrame {
            object_id,
            thread_serial_number,
            frame_number_in_stack_trace,
        },
    )
    .parse(i)
}

fn parse_gc_root_native_stack(id_size: u32, i: &[u8]) -> IResult<&[u8], GcRecord> {
    map(
        (parse_id(id_size), parse_u32),
        |(object_id, thread_serial_number)| GcRecord::RootNativeStack {
            object_id,
            thread_serial_number,
        },
    )
    .parse(i)
}

fn parse_gc_root_sticky_class(id_size: u32, i: &[u8]) -> IResult<&[u8], GcRecord> {
    map(parse_id(id_size), |object_id| GcRecord::RootStickyClass {
        object_id,
    })
    .parse(i)
}

fn parse_gc_root_thread_block(id_size: u32, i: &[u8]) -> IResult<&[u8], GcRecord> {
    map(
        (parse_id(id_size), parse_u32),
        |(object_id, thread_serial_number)| GcRecord::RootThreadBlock {
            object_id,
            thread_serial_number,
        },
    )
    .parse(i)
}

fn parse_gc_root_monitor_used(id_size: u32, i: &[u8]) -> IResult<&[u8], GcRecord> {
    map(parse_id(id_size), |object_id| GcRecord::RootMonitorUsed {
        object_id,
    })
    .parse(i)
}

fn parse_gc_root_jni_monitor(id_size: u32, i: &[u8]) -> IResult<&[u8], GcRecord> {
    map(
        (parse_id(id_size), parse_u32, parse_u32),
        |(object_id, thread_serial_number, frame_number_in_stack_trace)| {
            GcRecord::RootJniMonitor {
                object_id,
                thread_serial_number,
                frame_number_in_stack_trace,
            }
        },
    )
    .parse(i)
}

fn parse_field_type(i: &[u8]) -> IResult<&[u8], FieldType> {
    let (rest, raw) = parse_u8(i)?;
    match FieldType::from_value(raw) {
        Some(ty) => Ok((rest, ty)),
        // an undecodable basic type poisons the rest of the segment
        None => Err(nom::Err::Failure(nom::error::Error::from_error_kind(
            i,
            ErrorKind::Tag,
        ))),
    }
}

fn parse_field_value(id_size: u32, ty: FieldType, i: &[u8]) -> IResult<&[u8], FieldValue> {
    match ty {
        FieldType::Object => map(parse_id(id_size), FieldValue::Object).parse(i),
        FieldType::Bool => map(parse_u8, |b| FieldValue::Bool(b != 0)).parse(i),
        FieldType::Char => map(parse_u16, FieldValue::Char).parse(i),
        FieldType::Float => map(parse_f32, FieldValue::Float).parse(i),
        FieldType::Double => map(parse_f64, FieldValue::Double).parse(i),
        FieldType::Byte => map(parse_i8, FieldValue::Byte).parse(i),
        FieldType::Short => map(parse_i16, FieldValue::Short).parse(i),
        FieldType::Int => map(parse_i32, FieldValue::Int).parse(i),
        FieldType::Long => map(parse_i64, FieldValue::Long).parse(i),
    }
}

fn parse_const_pool_item(id_size: u32, i: &[u8]) -> IResult<&[u8], ()> {
    let (r1, (_const_pool_idx, const_type)) = (parse_u16, parse_field_type).parse(i)?;
    let (r2, _value) = parse_field_value(id_size, const_type, r1)?;
    Ok((r2, ()))
}

fn parse_static_field_item(id_size: u32, i: &[u8]) -> IResult<&[u8], (FieldInfo, FieldValue)> {
    let (r1, (name_id, field_type)) = (parse_id(id_size), parse_field_type).parse(i)?;
    let (r2, value) = parse_field_value(id_size, field_type, r1)?;
    Ok((
        r2,
        (
            FieldInfo {
                name_id,
                field_type,
            },
            value,
        ),
    ))
}

fn parse_instance_field_item(id_size: u32, i: &[u8]) -> IResult<&[u8], FieldInfo> {
    map(
        (parse_id(id_size), parse_field_type),
        |(name_id, field_type)| FieldInfo {
            name_id,
            field_type,
        },
    )
    .parse(i)
}

fn parse_gc_class_dump(id_size: u32, i: &[u8]) -> IResult<&[u8], GcRecord> {
    let pid = parse_id(id_size);
    let (r1, class_object_id) = pid(i)?;
    let (r1, stack_trace_serial_number) = parse_u32(r1)?;
    let (r1, super_class_object_id) = pid(r1)?;
    let (r1, class_loader_object_id) = pid(r1)?;
    let (r1, signers_object_id) = pid(r1)?;
    let (r1, protection_domain_object_id) = pid(r1)?;
    let (r1, _reserved_1) = pid(r1)?;
    let (r1, _reserved_2) = pid(r1)?;
    let (r1, instance_size) = parse_u32(r1)?;
    let (r1, constant_pool_size) = parse_u16(r1)?;
    let (r2, ()) = skip_count(r1, constant_pool_size as usize, |x| {
        parse_const_pool_item(id_size, x)
    })?;
    let (r3, static_fields_number) = parse_u16(r2)?;
    let (r4, static_fields) = count(
        |x| parse_static_field_item(id_size, x),
        static_fields_number as usize,
    )
    .parse(r3)?;
    let (r5, instance_field_number) = parse_u16(r4)?;
    let (r6, instance_fields) = count(
        |x| parse_instance_field_item(id_size, x),
        instance_field_number as usize,
    )
    .parse(r5)?;
    Ok((
        r6,
        GcRecord::ClassDump(Box::new(ClassDumpData {
            class_object_id,
            stack_trace_serial_number,
            super_class_object_id,
            class_loader_object_id,
            signers_object_id,
            protection_domain_object_id,
            instance_size,
            static_fields,
            instance_fields,
        })),
    ))
}

fn skip_count<'a, F>(mut i: &'a [u8], n: usize, f: F) -> IResult<&'a [u8], ()>
where
    F: Fn(&'a [u8]) -> IResult<&'a [u8], ()>,
{
    for _ in 0..n {
        let (rest, ()) = f(i)?;
        i = rest;
    }
    Ok((i, ()))
}

fn parse_gc_instance_dump(id_size: u32, i: &[u8]) -> IResult<&[u8], GcRecord> {
    let (r1, object_id) = parse_id(id_size)(i)?;
    let (r2, stack_trace_serial_number) = parse_u32(r1)?;
    let (r3, class_object_id) = parse_id(id_size)(r2)?;
    let (r4, data_size) = parse_u32(r3)?;
    // The payload is kept: the class layout needed to decode it may not have
    // been seen yet, so decoding happens downstream (possibly deferred).
    let (r5, data) = take(data_size).parse(r4)?;
    Ok((
        r5,
        GcRecord::InstanceDump {
            object_id,
            stack_trace_serial_number,
            class_object_id,
            data: data.to_vec().into_boxed_slice(),
        },
    ))
}

fn parse_gc_object_array_dump(id_size: u32, i: &[u8]) -> IResult<&[u8], GcRecord> {
    let (r1, object_id) = parse_id(id_size)(i)?;
    let (r2, stack_trace_serial_number) = parse_u32(r1)?;
    let (r3, number_of_elements) = parse_u32(r2)?;
    let (r4, array_class_id) = parse_id(id_size)(r3)?;
    let (r5, elements) = count(parse_id(id_size), number_of_elements as usize).parse(r4)?;
    Ok((
        r5,
        GcRecord::ObjectArrayDump {
            object_id,
            stack_trace_serial_number,
            array_class_id,
            elements: elements.into_boxed_slice(),
        },
    ))
}

fn parse_gc_primitive_array_dump(id_size: u32, i: &[u8]) -> IResult<&[u8], GcRecord> {
    let (r1, object_id) = parse_id(id_size)(i)?;
    let (r2, stack_trace_serial_number) = parse_u32(r1)?;
    let (r3, number_of_elements) = parse_u32(r2)?;
    let (r4, element_type) = parse_field_type(r3)?;
    // element values are irrelevant to the reference graph
    let elements_len = number_of_elements as usize * element_type.byte_size(id_size) as usize;
    let (r5, _elements) = take(elements_len).parse(r4)?;
    Ok((
        r5,
        GcRecord::PrimitiveArrayDump {
            object_id,
            stack_trace_serial_number,
            number_of_elements,
            element_type,
        },
    ))
}

fn parse_gc_primitive_array_nodata(id_size: u32, i: &[u8]) -> IResult<&[u8], GcRecord> {
    let (r1, object_id) = parse_id(id_size)(i)?;
    let (r2, stack_trace_serial_number) = parse_u32(r1)?;
    let (r3, number_of_elements) = parse_u32(r2)?;
    let (r4, element_type) = parse_field_type(r3)?;
    Ok((
        r4,
        GcRecord::PrimitiveArrayDump {
            object_id,
            stack_trace_serial_number,
            number_of_elements,
            element_type,
        },
    ))
}

fn parse_gc_heap_dump_info(id_size: u32, i: &[u8]) -> IResult<&[u8], GcRecord> {
    map(
        (parse_u32, parse_id(id_size)),
        |(heap_id, heap_name_id)| GcRecord::HeapDumpInfo {
            heap_id,
            heap_name_id,
        },
    )
    .parse(i)
}

fn parse_header_record(i: &[u8]) -> IResult<&[u8], RecordHeader> {
    map((parse_u32, parse_u32), |(timestamp, length)| RecordHeader {
        timestamp,
        length,
    })
    .parse(i)
}

fn parse_utf8_string(id_size: u32, i: &[u8]) -> IResult<&[u8], Record> {
    let (r1, header) = parse_header_record(i)?;
    if header.length < id_size {
        return Err(nom::Err::Failure(nom::error::Error::from_error_kind(
            i,
            ErrorKind::LengthValue,
        )));
    }
    let (r2, id) = parse_id(id_size)(r1)?;
    let (r3, bytes) = take(header.length - id_size).parse(r2)?;
    Ok((
        r3,
        Record::Utf8String {
            id,
            str: String::from_utf8_lossy(bytes).to_string().into_boxed_str(),
        },
    ))
}

fn parse_load_class(id_size: u32, i: &[u8]) -> IResult<&[u8], Record> {
    preceded(
        parse_header_record,
        map(
            (parse_u32, parse_id(id_size), parse_u32, parse_id(id_size)),
            |(serial_number, class_object_id, stack_trace_serial_number, class_name_id)| {
                Record::LoadClass {
                    serial_number,
                    class_object_id,
                    stack_trace_serial_number,
                    class_name_id,
                }
            },
        ),
    )
    .parse(i)
}

fn parse_heap_summary(i: &[u8]) -> IResult<&[u8], Record> {
    preceded(
        parse_header_record,
        map(
            (parse_u32, parse_u32, parse_u64, parse_u64),
            |(
                total_live_bytes,
                total_live_instances,
                total_bytes_allocated,
                total_instances_allocated,
            )| Record::HeapSummary {
                total_live_bytes,
                total_live_instances,
                total_bytes_allocated,
                total_instances_allocated,
            },
        ),
    )
    .parse(i)
}

fn parse_heap_dump_end(i: &[u8]) -> IResult<&[u8], Record> {
    map(parse_header_record, |rb| Record::HeapDumpEnd {
        length: rb.length,
    })
    .parse(i)
}

fn parse_skipped_record(tag: u8, i: &[u8]) -> IResult<&[u8], Record> {
    let (r1, header) = parse_header_record(i)?;
    let (r2, _) = skip_bytes(header.length)(r1)?;
    Ok((
        r2,
        Record::Skipped {
            tag,
            length: header.length,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: u32 = 8;

    fn record_header(length: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0u32.to_be_bytes()); // time delta
        out.extend_from_slice(&length.to_be_bytes());
        out
    }

    fn string_record(id: u64, s: &str) -> Vec<u8> {
        let mut out = vec![TAG_STRING];
        out.extend(record_header(8 + s.len() as u32));
        out.extend_from_slice(&id.to_be_bytes());
        out.extend_from_slice(s.as_bytes());
        out
    }

    fn parse_one(parser: &mut HprofRecordParser, bytes: &[u8]) -> Record {
        let (rest, record) = parser.parse_hprof_record()(bytes).unwrap();
        assert!(rest.is_empty());
        record
    }

    #[test]
    fn utf8_string_record() {
        let mut parser = HprofRecordParser::new(ID, false);
        let bytes = string_record(0x1234, "java/lang/Object");
        match parse_one(&mut parser, &bytes) {
            Record::Utf8String { id, str } => {
                assert_eq!(id, 0x1234);
                assert_eq!(&*str, "java/lang/Object");
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn load_class_record() {
        let mut parser = HprofRecordParser::new(ID, false);
        let mut bytes = vec![TAG_LOAD_CLASS];
        bytes.extend(record_header(4 + 8 + 4 + 8));
        bytes.extend_from_slice(&7u32.to_be_bytes());
        bytes.extend_from_slice(&0xAAu64.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&0xBBu64.to_be_bytes());
        match parse_one(&mut parser, &bytes) {
            Record::LoadClass {
                serial_number,
                class_object_id,
                class_name_id,
                ..
            } => {
                assert_eq!(serial_number, 7);
                assert_eq!(class_object_id, 0xAA);
                assert_eq!(class_name_id, 0xBB);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn unknown_top_level_tag_is_skipped_by_length() {
        let mut parser = HprofRecordParser::new(ID, false);
        let mut bytes = vec![0x0B]; // END_THREAD, not needed for the graph
        bytes.extend(record_header(4));
        bytes.extend_from_slice(&9u32.to_be_bytes());
        match parse_one(&mut parser, &bytes) {
            Record::Skipped { tag, length } => {
                assert_eq!(tag, 0x0B);
                assert_eq!(length, 4);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn heap_dump_sub_records_consume_payload_budget() {
        let mut parser = HprofRecordParser::new(ID, false);
        // ROOT_UNKNOWN (1 + 8 bytes) then ROOT_STICKY_CLASS (1 + 8 bytes)
        let mut body = vec![TAG_GC_ROOT_UNKNOWN];
        body.extend_from_slice(&0x11u64.to_be_bytes());
        body.push(TAG_GC_ROOT_STICKY_CLASS);
        body.extend_from_slice(&0x22u64.to_be_bytes());

        let mut bytes = vec![TAG_HEAP_DUMP];
        bytes.extend(record_header(body.len() as u32));
        bytes.extend(body);

        let mut f = parser.parse_hprof_record();
        let (rest, start) = f(&bytes).unwrap();
        assert!(matches!(start, Record::HeapDumpStart { length: 18 }));
        let (rest, root1) = f(rest).unwrap();
        assert!(matches!(
            root1,
            Record::GcSegment(GcRecord::RootUnknown { object_id: 0x11 })
        ));
        let (rest, root2) = f(rest).unwrap();
        assert!(matches!(
            root2,
            Record::GcSegment(GcRecord::RootStickyClass { object_id: 0x22 })
        ));
        assert!(rest.is_empty());
        drop(f);
        assert!(!parser.in_heap_dump());
    }

    #[test]
    fn unknown_sub_tag_abandons_heap_dump_payload() {
        let mut parser = HprofRecordParser::new(ID, false);
        let mut body = vec![0x42]; // not a sub-tag
        body.extend_from_slice(&[0xDE; 12]); // garbage the framer cannot size
        let mut bytes = vec![TAG_HEAP_DUMP_SEGMENT];
        bytes.extend(record_header(body.len() as u32));
        bytes.extend(body);
        bytes.extend(string_record(1, "after")); // next top-level record

        let mut f = parser.parse_hprof_record();
        let (rest, _start) = f(&bytes).unwrap();
        let (rest, skipped) = f(rest).unwrap();
        match skipped {
            Record::UnknownSubTag { tag, skipped } => {
                assert_eq!(tag, 0x42);
                assert_eq!(skipped, 12);
            }
            other => panic!("unexpected record {other:?}"),
        }
        let (rest, after) = f(rest).unwrap();
        assert!(matches!(after, Record::Utf8String { id: 1, .. }));
        assert!(rest.is_empty());
    }

    #[test]
    fn sub_record_overrunning_payload_is_malformed() {
        let mut parser = HprofRecordParser::new(ID, false);
        // payload claims 5 bytes but contains a 9-byte ROOT_UNKNOWN
        let mut bytes = vec![TAG_HEAP_DUMP];
        bytes.extend(record_header(5));
        bytes.push(TAG_GC_ROOT_UNKNOWN);
        bytes.extend_from_slice(&0x11u64.to_be_bytes());

        let mut f = parser.parse_hprof_record();
        let (rest, _start) = f(&bytes).unwrap();
        assert!(matches!(f(rest), Err(nom::Err::Failure(_))));
    }

    #[test]
    fn instance_dump_keeps_raw_bytes() {
        let mut parser = HprofRecordParser::new(ID, false);
        let mut body = vec![TAG_GC_INSTANCE_DUMP];
        body.extend_from_slice(&0x33u64.to_be_bytes());
        body.extend_from_slice(&0u32.to_be_bytes());
        body.extend_from_slice(&0x44u64.to_be_bytes());
        body.extend_from_slice(&4u32.to_be_bytes());
        body.extend_from_slice(&[1, 2, 3, 4]);
        let mut bytes = vec![TAG_HEAP_DUMP];
        bytes.extend(record_header(body.len() as u32));
        bytes.extend(body);

        let mut f = parser.parse_hprof_record();
        let (rest, _start) = f(&bytes).unwrap();
        let (_, record) = f(rest).unwrap();
        match record {
            Record::GcSegment(GcRecord::InstanceDump {
                object_id,
                class_object_id,
                data,
                ..
            }) => {
                assert_eq!(object_id, 0x33);
                assert_eq!(class_object_id, 0x44);
                assert_eq!(&*data, &[1, 2, 3, 4]);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn object_array_dump_decodes_elements() {
        let mut parser = HprofRecordParser::new(ID, false);
        let mut body = vec![TAG_GC_OBJ_ARRAY_DUMP];
        body.extend_from_slice(&0x50u64.to_be_bytes());
        body.extend_from_slice(&0u32.to_be_bytes());
        body.extend_from_slice(&3u32.to_be_bytes());
        body.extend_from_slice(&0x60u64.to_be_bytes());
        for id in [0x70u64, 0, 0x71] {
            body.extend_from_slice(&id.to_be_bytes());
        }
        let mut bytes = vec![TAG_HEAP_DUMP];
        bytes.extend(record_header(body.len() as u32));
        bytes.extend(body);

        let mut f = parser.parse_hprof_record();
        let (rest, _start) = f(&bytes).unwrap();
        let (_, record) = f(rest).unwrap();
        match record {
            Record::GcSegment(GcRecord::ObjectArrayDump {
                object_id,
                array_class_id,
                elements,
                ..
            }) => {
                assert_eq!(object_id, 0x50);
                assert_eq!(array_class_id, 0x60);
                assert_eq!(&*elements, &[0x70, 0, 0x71]);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn class_dump_collects_layout_and_statics() {
        let mut parser = HprofRecordParser::new(ID, false);
        let mut body = vec![TAG_GC_CLASS_DUMP];
        body.extend_from_slice(&0x100u64.to_be_bytes()); // class id
        body.extend_from_slice(&0u32.to_be_bytes());
        body.extend_from_slice(&0x200u64.to_be_bytes()); // super
        body.extend_from_slice(&0x300u64.to_be_bytes()); // loader
        body.extend_from_slice(&0u64.to_be_bytes()); // signers
        body.extend_from_slice(&0u64.to_be_bytes()); // protection domain
        body.extend_from_slice(&0u64.to_be_bytes()); // reserved
        body.extend_from_slice(&0u64.to_be_bytes()); // reserved
        body.extend_from_slice(&24u32.to_be_bytes()); // instance size
        body.extend_from_slice(&1u16.to_be_bytes()); // const pool: 1 entry
        body.extend_from_slice(&0u16.to_be_bytes()); // idx
        body.push(10); // int
        body.extend_from_slice(&7i32.to_be_bytes());
        body.extend_from_slice(&1u16.to_be_bytes()); // static fields: 1
        body.extend_from_slice(&0x400u64.to_be_bytes()); // name id
        body.push(2); // object
        body.extend_from_slice(&0x500u64.to_be_bytes()); // value
        body.extend_from_slice(&2u16.to_be_bytes()); // instance fields: 2
        body.extend_from_slice(&0x600u64.to_be_bytes());
        body.push(2); // object
        body.extend_from_slice(&0x601u64.to_be_bytes());
        body.push(10); // int

        let mut bytes = vec![TAG_HEAP_DUMP];
        bytes.extend(record_header(body.len() as u32));
        bytes.extend(body);

        let mut f = parser.parse_hprof_record();
        let (rest, _start) = f(&bytes).unwrap();
        let (rest, record) = f(rest).unwrap();
        assert!(rest.is_empty());
        match record {
            Record::GcSegment(GcRecord::ClassDump(data)) => {
                assert_eq!(data.class_object_id, 0x100);
                assert_eq!(data.super_class_object_id, 0x200);
                assert_eq!(data.class_loader_object_id, 0x300);
                assert_eq!(data.instance_size, 24);
                assert_eq!(data.static_fields.len(), 1);
                assert_eq!(data.static_fields[0].1, FieldValue::Object(0x500));
                assert_eq!(data.instance_fields.len(), 2);
                assert_eq!(data.instance_fields[0].field_type, FieldType::Object);
                assert_eq!(data.instance_fields[1].field_type, FieldType::Int);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn narrow_ids_parse_with_4_byte_width() {
        let mut parser = HprofRecordParser::new(4, false);
        let mut body = vec![TAG_GC_ROOT_UNKNOWN];
        body.extend_from_slice(&0x77u32.to_be_bytes());
        let mut bytes = vec![TAG_HEAP_DUMP];
        bytes.extend(record_header(body.len() as u32));
        bytes.extend(body);

        let mut f = parser.parse_hprof_record();
        let (rest, _start) = f(&bytes).unwrap();
        let (rest, record) = f(rest).unwrap();
        assert!(rest.is_empty());
        assert!(matches!(
            record,
            Record::GcSegment(GcRecord::RootUnknown { object_id: 0x77 })
        ));
    }

    #[test]
    fn streaming_returns_partial_batch_on_incomplete() {
        let mut parser = HprofRecordParser::new(ID, false);
        let mut bytes = string_record(1, "one");
        bytes.extend(string_record(2, "two"));
        let full_len = bytes.len();
        bytes.extend_from_slice(&[TAG_STRING, 0, 0]); // truncated third record

        let mut pooled = Vec::new();
        let (rest, ()) = parser.parse_streaming(&bytes, &mut pooled).unwrap();
        assert_eq!(pooled.len(), 2);
        assert_eq!(rest.len(), bytes.len() - full_len);
    }
}
