use crate::parser::gc_record::LineNumber;

pub const TAG_UTF8: u8 = 0x01;
pub const TAG_LOAD_CLASS: u8 = 0x02;
pub const TAG_FRAME: u8 = 0x04;
pub const TAG_TRACE: u8 = 0x05;
pub const TAG_HEAP_DUMP_SEGMENT: u8 = 0x1C;
pub const TAG_HEAP_DUMP_END: u8 = 0x2C;

/// Top-level record header. The 4-byte timestamp delta that follows the
/// tag on the wire is always zero in practice and is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub tag: u8,
    pub remaining: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utf8String {
    pub id: u64,
    pub characters: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadClass {
    pub serial_number: u32,
    pub class_object_id: u64,
    pub stack_trace_serial_number: u32,
    pub class_name_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackFrame {
    pub stack_frame_id: u64,
    pub method_name_id: u64,
    pub method_signature_id: u64,
    pub source_file_name_id: u64,
    pub class_serial_number: u32,
    pub line_number: LineNumber,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackTrace {
    pub serial_number: u32,
    pub thread_serial_number: u32,
    pub number_of_frames: u32,
    pub stack_frame_ids: Vec<u64>,
}
