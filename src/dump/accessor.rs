//! Read side of an indexed dump. Combines the restored small store and
//! meta counters, the three offset indices, and a seekable handle to the
//! original .hprof file. A big-record query looks the offset up in the
//! index, seeks there and decodes the header; the cursor is then
//! positioned at the record payload so the caller can read it without
//! another decode pass.

use std::io::{Read, Seek, SeekFrom};

use crate::errors::Result;
use crate::parser::gc_record::{
    ClassDump, InstanceDumpHeader, ObjArrayDumpHeader, PrimArrayDumpHeader, RootJavaFrame,
    RootJniGlobal, RootJniLocal, RootStickyClass, RootThreadObject,
};
use crate::parser::primitives::IdSize;
use crate::parser::record::{LoadClass, StackFrame, StackTrace, Utf8String};
use crate::parser::record_parser::RecordParser;
use crate::storage::big::BigRecordsReader;
use crate::storage::meta::MetaCounters;
use crate::storage::small::SmallRecords;

pub struct ParsedAccessor<D, I> {
    records: RecordParser<D>,
    big: BigRecordsReader<I>,
    small: SmallRecords,
    meta: MetaCounters,
    id_size: IdSize,
}

impl<D: Read + Seek, I: Read + Seek> ParsedAccessor<D, I> {
    pub fn new(
        dump: D,
        big: BigRecordsReader<I>,
        small: SmallRecords,
        meta: MetaCounters,
    ) -> Result<Self> {
        let id_size = IdSize::from_raw(small.id_size_raw())?;
        Ok(ParsedAccessor {
            records: RecordParser::new(dump, id_size),
            big,
            small,
            meta,
            id_size,
        })
    }

    pub fn id_size(&self) -> IdSize {
        self.id_size
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.small.timestamp_ms()
    }

    pub fn small(&self) -> &SmallRecords {
        &self.small
    }

    pub fn meta(&self) -> &MetaCounters {
        &self.meta
    }

    pub fn get_instance_header(&mut self, object_id: u64) -> Result<InstanceDumpHeader> {
        let offset = self.big.instance_dump_offset(object_id)?;
        self.seek(offset)?;
        self.records.parse_instance_dump_header()
    }

    pub fn get_obj_array_header(&mut self, array_object_id: u64) -> Result<ObjArrayDumpHeader> {
        let offset = self.big.obj_array_dump_offset(array_object_id)?;
        self.seek(offset)?;
        self.records.parse_obj_array_dump_header()
    }

    pub fn get_prim_array_header(&mut self, array_object_id: u64) -> Result<PrimArrayDumpHeader> {
        let offset = self.big.prim_array_dump_offset(array_object_id)?;
        self.seek(offset)?;
        self.records.parse_prim_array_dump_header()
    }

    /// Reads `n` bytes from wherever the last header decode left the
    /// file cursor, i.e. the start of that record's payload.
    pub fn read_bytes_from_current(&mut self, n: usize) -> Result<Vec<u8>> {
        self.records.read_bytes(n)
    }

    pub fn get_utf8(&self, id: u64) -> Result<&Utf8String> {
        self.small.get_utf8(id)
    }

    pub fn get_load_class_by_class_object_id(&self, class_object_id: u64) -> Result<&LoadClass> {
        self.small.get_load_class_by_class_object_id(class_object_id)
    }

    pub fn get_load_class_by_serial(&self, serial_number: u32) -> Result<&LoadClass> {
        self.small.get_load_class_by_serial(serial_number)
    }

    pub fn get_frame(&self, stack_frame_id: u64) -> Result<&StackFrame> {
        self.small.get_frame(stack_frame_id)
    }

    pub fn get_trace(&self, thread_serial_number: u32) -> Result<&StackTrace> {
        self.small.get_trace(thread_serial_number)
    }

    pub fn get_class_dump(&self, class_object_id: u64) -> Result<&ClassDump> {
        self.small.get_class_dump(class_object_id)
    }

    pub fn list_load_classes(&self) -> &[LoadClass] {
        self.small.list_load_classes()
    }

    pub fn list_gc_root_jni_globals(&self) -> &[RootJniGlobal] {
        self.small.list_gc_root_jni_globals()
    }

    pub fn list_gc_root_jni_locals(&self) -> &[RootJniLocal] {
        self.small.list_gc_root_jni_locals()
    }

    pub fn list_gc_root_java_frames(&self) -> &[RootJavaFrame] {
        self.small.list_gc_root_java_frames()
    }

    pub fn list_gc_root_sticky_classes(&self) -> &[RootStickyClass] {
        self.small.list_gc_root_sticky_classes()
    }

    pub fn list_gc_root_thread_objects(&self) -> &[RootThreadObject] {
        self.small.list_gc_root_thread_objects()
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.records.source_mut().seek(SeekFrom::Start(offset))?;
        Ok(())
    }
}
