//! Builders shared by the parser, accessor and heap tests: synthetic
//! heap dumps assembled byte by byte, and an all-in-memory parse.

use std::io::Cursor;

use crate::dump::accessor::ParsedAccessor;
use crate::dump::parser::DumpParser;
use crate::parser::gc_record::*;
use crate::parser::record::*;
use crate::storage::big::{BigRecordsReader, BigRecordsWriter};
use crate::storage::meta::MetaCounters;
use crate::storage::small::SmallRecords;

pub const TEST_TIMESTAMP_MS: u64 = (0x17B << 32) | 0x7F28_A827;

pub struct DumpBuilder {
    bytes: Vec<u8>,
}

impl DumpBuilder {
    /// Starts with a valid file header: 8-byte identifiers, fixed
    /// timestamp.
    pub fn new() -> Self {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"JAVA PROFILE 1.0.2\0");
        bytes.extend_from_slice(&8u32.to_be_bytes());
        bytes.extend_from_slice(&0x0000_017Bu32.to_be_bytes());
        bytes.extend_from_slice(&0x7F28_A827u32.to_be_bytes());
        DumpBuilder { bytes }
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }

    pub fn u1(&mut self, v: u8) {
        self.bytes.push(v);
    }

    pub fn u2(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }

    pub fn u4(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }

    pub fn i4(&mut self, v: i32) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }

    pub fn id(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }

    pub fn raw(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub fn record_header(&mut self, tag: u8, remaining: u32) {
        self.u1(tag);
        self.u4(0); // timestamp delta
        self.u4(remaining);
    }

    pub fn utf8(&mut self, id: u64, characters: &str) {
        self.record_header(TAG_UTF8, 8 + characters.len() as u32);
        self.id(id);
        self.raw(characters.as_bytes());
    }

    pub fn load_class(&mut self, serial: u32, class_object_id: u64, trace_serial: u32, name_id: u64) {
        self.record_header(TAG_LOAD_CLASS, 24);
        self.u4(serial);
        self.id(class_object_id);
        self.u4(trace_serial);
        self.id(name_id);
    }

    pub fn frame(
        &mut self,
        frame_id: u64,
        method_name_id: u64,
        signature_id: u64,
        source_file_id: u64,
        class_serial: u32,
        line: i32,
    ) {
        self.record_header(TAG_FRAME, 40);
        self.id(frame_id);
        self.id(method_name_id);
        self.id(signature_id);
        self.id(source_file_id);
        self.u4(class_serial);
        self.i4(line);
    }

    pub fn trace(&mut self, serial: u32, thread_serial: u32, frame_ids: &[u64]) {
        self.record_header(TAG_TRACE, 12 + 8 * frame_ids.len() as u32);
        self.u4(serial);
        self.u4(thread_serial);
        self.u4(frame_ids.len() as u32);
        for id in frame_ids {
            self.id(*id);
        }
    }

    /// Class dump sub-record with empty constant pool and no statics.
    pub fn simple_class_dump(
        &mut self,
        class_object_id: u64,
        super_class_object_id: u64,
        instance_size: i32,
        instance_fields: &[(u64, JavaType)],
    ) {
        self.u1(SUB_TAG_GC_CLASS_DUMP);
        self.id(class_object_id);
        self.u4(1);
        self.id(super_class_object_id);
        self.id(0); // class loader
        self.id(0); // signers
        self.id(0); // protection domain
        self.id(0); // reserved
        self.id(0); // reserved
        self.i4(instance_size);
        self.u2(0); // constant pool
        self.u2(0); // static fields
        self.u2(instance_fields.len() as u16);
        for (name_id, ty) in instance_fields {
            self.id(*name_id);
            self.u1(ty.tag());
        }
    }

    /// Class dump whose statics are object references, given as
    /// (name id, referenced object id) pairs.
    pub fn class_dump_with_statics(
        &mut self,
        class_object_id: u64,
        super_class_object_id: u64,
        instance_size: i32,
        statics: &[(u64, u64)],
        instance_fields: &[(u64, JavaType)],
    ) {
        self.u1(SUB_TAG_GC_CLASS_DUMP);
        self.id(class_object_id);
        self.u4(1);
        self.id(super_class_object_id);
        self.id(0);
        self.id(0);
        self.id(0);
        self.id(0);
        self.id(0);
        self.i4(instance_size);
        self.u2(0); // constant pool
        self.u2(statics.len() as u16);
        for (name_id, object_id) in statics {
            self.id(*name_id);
            self.u1(JavaType::Object.tag());
            self.id(*object_id);
        }
        self.u2(instance_fields.len() as u16);
        for (name_id, ty) in instance_fields {
            self.id(*name_id);
            self.u1(ty.tag());
        }
    }

    pub fn instance_dump(&mut self, object_id: u64, class_object_id: u64, payload: &[u8]) {
        self.u1(SUB_TAG_GC_INSTANCE_DUMP);
        self.id(object_id);
        self.u4(1);
        self.id(class_object_id);
        self.u4(payload.len() as u32);
        self.raw(payload);
    }

    pub fn obj_array_dump(&mut self, array_object_id: u64, array_class_id: u64, elements: &[u64]) {
        self.u1(SUB_TAG_GC_OBJ_ARRAY_DUMP);
        self.id(array_object_id);
        self.u4(1);
        self.u4(elements.len() as u32);
        self.id(array_class_id);
        for element in elements {
            self.id(*element);
        }
    }

    pub fn prim_byte_array_dump(&mut self, array_object_id: u64, payload: &[u8]) {
        self.u1(SUB_TAG_GC_PRIM_ARRAY_DUMP);
        self.id(array_object_id);
        self.u4(1);
        self.u4(payload.len() as u32);
        self.u1(JavaType::Byte.tag());
        self.raw(payload);
    }

    pub fn prim_char_array_dump(&mut self, array_object_id: u64, code_units: &[u16]) {
        self.u1(SUB_TAG_GC_PRIM_ARRAY_DUMP);
        self.id(array_object_id);
        self.u4(1);
        self.u4(code_units.len() as u32);
        self.u1(JavaType::Char.tag());
        for unit in code_units {
            self.u2(*unit);
        }
    }

    /// The canonical end-to-end fixture: every record kind once, two
    /// segments, known offsets for the three indexed records.
    pub fn full_fixture() -> (Vec<u8>, FixtureOffsets) {
        let mut b = DumpBuilder::new();
        b.utf8(1, "JAVA");
        b.load_class(1, 1, 1, 1);
        b.trace(1, 1, &[1, 1, 1]);
        b.frame(1, 1, 1, 1, 1, 1);
        b.record_header(TAG_HEAP_DUMP_SEGMENT, 0);
        b.u1(SUB_TAG_GC_ROOT_THREAD_OBJ);
        b.id(1);
        b.u4(1);
        b.u4(1);
        b.u1(SUB_TAG_GC_ROOT_JNI_LOCAL);
        b.id(1);
        b.u4(1);
        b.u4(1);
        b.u1(SUB_TAG_GC_ROOT_JNI_GLOBAL);
        b.id(1);
        b.id(1);
        b.u1(SUB_TAG_GC_ROOT_JAVA_FRAME);
        b.id(1);
        b.u4(1);
        b.u4(1);
        b.u1(SUB_TAG_GC_ROOT_STICKY_CLASS);
        b.id(1);
        b.u1(SUB_TAG_GC_CLASS_DUMP);
        b.id(1); // class object id
        b.u4(1);
        b.id(1); // superclass
        b.id(1); // class loader
        b.id(1); // signers
        b.id(1); // protection domain
        b.id(0); // reserved
        b.id(0); // reserved
        b.i4(1); // instance size
        b.u2(2); // constant pool
        b.u2(1);
        b.u1(JavaType::Boolean.tag());
        b.u1(0);
        b.u2(1);
        b.u1(JavaType::Boolean.tag());
        b.u1(1);
        b.u2(2); // static fields
        b.id(1);
        b.u1(JavaType::Boolean.tag());
        b.u1(0);
        b.id(1);
        b.u1(JavaType::Boolean.tag());
        b.u1(1);
        b.u2(2); // instance fields
        b.id(1);
        b.u1(JavaType::Object.tag());
        b.id(1);
        b.u1(JavaType::Object.tag());
        b.u1(SUB_TAG_GC_INSTANCE_DUMP);
        let instance_dump = b.len();
        b.id(1);
        b.u4(1);
        b.id(1);
        b.u4(1);
        b.u1(0x2A); // payload
        b.u1(SUB_TAG_GC_OBJ_ARRAY_DUMP);
        let obj_array_dump = b.len();
        b.id(1);
        b.u4(1);
        b.u4(1);
        b.id(1);
        b.id(1); // element
        b.u1(SUB_TAG_GC_PRIM_ARRAY_DUMP);
        let prim_array_dump = b.len();
        b.id(1);
        b.u4(1);
        b.u4(1);
        b.u1(JavaType::Boolean.tag());
        b.u1(1); // element
        b.record_header(TAG_HEAP_DUMP_SEGMENT, 0);
        b.u1(SUB_TAG_GC_ROOT_STICKY_CLASS);
        b.id(2);
        b.record_header(TAG_HEAP_DUMP_END, 0);
        (
            b.build(),
            FixtureOffsets {
                instance_dump,
                obj_array_dump,
                prim_array_dump,
            },
        )
    }
}

pub struct FixtureOffsets {
    pub instance_dump: u64,
    pub obj_array_dump: u64,
    pub prim_array_dump: u64,
}

pub struct ParsedDump {
    pub bytes: Vec<u8>,
    pub small: SmallRecords,
    pub meta: MetaCounters,
    pub instance_index: Vec<u8>,
    pub obj_array_index: Vec<u8>,
    pub prim_array_index: Vec<u8>,
    pub final_pos: u64,
}

impl ParsedDump {
    pub fn big_reader(&self) -> BigRecordsReader<Cursor<Vec<u8>>> {
        BigRecordsReader::new(
            Cursor::new(self.instance_index.clone()),
            Cursor::new(self.obj_array_index.clone()),
            Cursor::new(self.prim_array_index.clone()),
        )
        .unwrap()
    }

    pub fn into_accessor(self) -> ParsedAccessor<Cursor<Vec<u8>>, Cursor<Vec<u8>>> {
        let big = BigRecordsReader::new(
            Cursor::new(self.instance_index),
            Cursor::new(self.obj_array_index),
            Cursor::new(self.prim_array_index),
        )
        .unwrap();
        ParsedAccessor::new(Cursor::new(self.bytes), big, self.small, self.meta).unwrap()
    }
}

pub fn parse_in_memory(bytes: Vec<u8>) -> ParsedDump {
    let mut instance_index = Vec::new();
    let mut obj_array_index = Vec::new();
    let mut prim_array_index = Vec::new();
    let big = BigRecordsWriter::new(
        &mut instance_index,
        &mut obj_array_index,
        &mut prim_array_index,
    );
    let parser = DumpParser::new(Cursor::new(bytes.clone()), big);
    let pos = parser.position();
    let (small, meta) = parser.parse().expect("fixture parses");
    let final_pos = pos.load(std::sync::atomic::Ordering::Relaxed);
    ParsedDump {
        bytes,
        small,
        meta,
        instance_index,
        obj_array_index,
        prim_array_index,
        final_pos,
    }
}

/// Fixture for the heap layer: a two-level class hierarchy, one plain
/// instance, a java.lang.String backed by a byte array, another backed by
/// a char array, and an object array holding both objects.
pub fn heap_fixture() -> Vec<u8> {
    let mut b = DumpBuilder::new();
    b.utf8(10, "App");
    b.utf8(11, "java/lang/Object");
    b.utf8(12, "count");
    b.utf8(13, "next");
    b.utf8(14, "flag");
    b.utf8(15, "java/lang/String");
    b.utf8(16, "value");
    b.utf8(17, "[Ljava/lang/Object;");
    b.load_class(1, 100, 1, 10);
    b.load_class(2, 200, 1, 11);
    b.load_class(3, 300, 1, 15);
    b.load_class(4, 400, 1, 17);
    b.record_header(TAG_HEAP_DUMP_SEGMENT, 0);
    b.simple_class_dump(100, 200, 12, &[(12, JavaType::Int), (13, JavaType::Object)]);
    b.simple_class_dump(200, 0, 1, &[(14, JavaType::Boolean)]);
    b.simple_class_dump(300, 200, 8, &[(16, JavaType::Object)]);
    b.simple_class_dump(400, 0, 0, &[]);

    // instance of App: count = 7, next = 4000, flag = true
    let mut payload = Vec::new();
    payload.extend_from_slice(&7i32.to_be_bytes());
    payload.extend_from_slice(&4000u64.to_be_bytes());
    payload.push(1);
    b.instance_dump(1000, 100, &payload);

    // byte-array-backed string "hi!"
    let mut payload = Vec::new();
    payload.extend_from_slice(&3000u64.to_be_bytes());
    payload.push(0);
    b.instance_dump(4000, 300, &payload);

    // char-array-backed string "OK"
    let mut payload = Vec::new();
    payload.extend_from_slice(&3100u64.to_be_bytes());
    payload.push(0);
    b.instance_dump(4100, 300, &payload);

    b.prim_byte_array_dump(3000, b"hi!");
    b.prim_char_array_dump(3100, &[u16::from(b'O'), u16::from(b'K')]);
    b.obj_array_dump(5000, 400, &[1000, 4000]);
    b.record_header(TAG_HEAP_DUMP_END, 0);
    b.build()
}
