//! In-memory tables for the records small enough to keep resident:
//! UTF-8 strings, loaded classes, stack frames and traces, GC roots and
//! class dumps, plus the identifier size and capture timestamp from the
//! file header. The tables are filled during the walk, written once as a
//! snapshot, and restored read-only on later invocations.

use std::io::{Read, Write};

use ahash::AHashMap;

use crate::errors::{HprofError, Result};
use crate::parser::gc_record::{
    ClassDump, ConstPoolEntry, InstanceField, RootJavaFrame, RootJniGlobal, RootJniLocal,
    RootStickyClass, RootThreadObject, StaticField,
};
use crate::parser::record::{LoadClass, StackFrame, StackTrace, Utf8String};
use crate::storage::snapshot::{SnapshotReader, SnapshotWriter};

#[derive(Debug, Default, PartialEq)]
pub struct SmallRecords {
    id_size_raw: u32,
    timestamp_ms: u64,
    utf8_strings: AHashMap<u64, Utf8String>,
    load_classes: Vec<LoadClass>,
    frames: AHashMap<u64, StackFrame>,
    traces: AHashMap<u32, StackTrace>,
    gc_root_jni_globals: Vec<RootJniGlobal>,
    gc_root_jni_locals: Vec<RootJniLocal>,
    gc_root_java_frames: Vec<RootJavaFrame>,
    gc_root_sticky_classes: Vec<RootStickyClass>,
    gc_root_thread_objects: Vec<RootThreadObject>,
    class_dumps: AHashMap<u64, ClassDump>,
}

impl SmallRecords {
    pub fn new() -> Self {
        SmallRecords::default()
    }

    pub fn put_id_size(&mut self, id_size_raw: u32) {
        self.id_size_raw = id_size_raw;
    }

    pub fn put_timestamp_ms(&mut self, timestamp_ms: u64) {
        self.timestamp_ms = timestamp_ms;
    }

    pub fn put_utf8(&mut self, record: Utf8String) {
        self.utf8_strings.insert(record.id, record);
    }

    pub fn put_load_class(&mut self, record: LoadClass) {
        self.load_classes.push(record);
    }

    pub fn put_frame(&mut self, record: StackFrame) {
        self.frames.insert(record.stack_frame_id, record);
    }

    pub fn put_trace(&mut self, record: StackTrace) {
        self.traces.insert(record.thread_serial_number, record);
    }

    pub fn put_gc_root_jni_global(&mut self, record: RootJniGlobal) {
        self.gc_root_jni_globals.push(record);
    }

    pub fn put_gc_root_jni_local(&mut self, record: RootJniLocal) {
        self.gc_root_jni_locals.push(record);
    }

    pub fn put_gc_root_java_frame(&mut self, record: RootJavaFrame) {
        self.gc_root_java_frames.push(record);
    }

    pub fn put_gc_root_sticky_class(&mut self, record: RootStickyClass) {
        self.gc_root_sticky_classes.push(record);
    }

    pub fn put_gc_root_thread_object(&mut self, record: RootThreadObject) {
        self.gc_root_thread_objects.push(record);
    }

    pub fn put_class_dump(&mut self, record: ClassDump) {
        self.class_dumps.insert(record.class_object_id, record);
    }

    pub fn id_size_raw(&self) -> u32 {
        self.id_size_raw
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn get_utf8(&self, id: u64) -> Result<&Utf8String> {
        self.utf8_strings
            .get(&id)
            .ok_or_else(|| HprofError::not_found(format!("UTF-8 string with id {id}")))
    }

    pub fn get_load_class_by_class_object_id(&self, class_object_id: u64) -> Result<&LoadClass> {
        self.load_classes
            .iter()
            .find(|lc| lc.class_object_id == class_object_id)
            .ok_or_else(|| {
                HprofError::not_found(format!("load class with class object id {class_object_id}"))
            })
    }

    pub fn get_load_class_by_serial(&self, serial_number: u32) -> Result<&LoadClass> {
        self.load_classes
            .iter()
            .find(|lc| lc.serial_number == serial_number)
            .ok_or_else(|| {
                HprofError::not_found(format!("load class with serial number {serial_number}"))
            })
    }

    pub fn list_load_classes(&self) -> &[LoadClass] {
        &self.load_classes
    }

    pub fn get_frame(&self, stack_frame_id: u64) -> Result<&StackFrame> {
        self.frames
            .get(&stack_frame_id)
            .ok_or_else(|| HprofError::not_found(format!("stack frame with id {stack_frame_id}")))
    }

    pub fn get_trace(&self, thread_serial_number: u32) -> Result<&StackTrace> {
        self.traces.get(&thread_serial_number).ok_or_else(|| {
            HprofError::not_found(format!(
                "stack trace for thread serial {thread_serial_number}"
            ))
        })
    }

    pub fn list_gc_root_jni_globals(&self) -> &[RootJniGlobal] {
        &self.gc_root_jni_globals
    }

    pub fn list_gc_root_jni_locals(&self) -> &[RootJniLocal] {
        &self.gc_root_jni_locals
    }

    pub fn list_gc_root_java_frames(&self) -> &[RootJavaFrame] {
        &self.gc_root_java_frames
    }

    pub fn list_gc_root_sticky_classes(&self) -> &[RootStickyClass] {
        &self.gc_root_sticky_classes
    }

    pub fn list_gc_root_thread_objects(&self) -> &[RootThreadObject] {
        &self.gc_root_thread_objects
    }

    pub fn get_class_dump(&self, class_object_id: u64) -> Result<&ClassDump> {
        self.class_dumps.get(&class_object_id).ok_or_else(|| {
            HprofError::not_found(format!("class dump with class object id {class_object_id}"))
        })
    }

    pub fn serialize_to<W: Write>(&self, sink: W) -> Result<()> {
        let mut w = SnapshotWriter::new(sink)?;
        w.put_u32(self.id_size_raw)?;
        w.put_u64(self.timestamp_ms)?;

        w.put_len(self.utf8_strings.len())?;
        for record in self.utf8_strings.values() {
            w.put_u64(record.id)?;
            w.put_string(&record.characters)?;
        }

        w.put_len(self.load_classes.len())?;
        for record in &self.load_classes {
            w.put_u32(record.serial_number)?;
            w.put_u64(record.class_object_id)?;
            w.put_u32(record.stack_trace_serial_number)?;
            w.put_u64(record.class_name_id)?;
        }

        w.put_len(self.frames.len())?;
        for record in self.frames.values() {
            w.put_u64(record.stack_frame_id)?;
            w.put_u64(record.method_name_id)?;
            w.put_u64(record.method_signature_id)?;
            w.put_u64(record.source_file_name_id)?;
            w.put_u32(record.class_serial_number)?;
            w.put_i32(record.line_number.0)?;
        }

        w.put_len(self.traces.len())?;
        for record in self.traces.values() {
            w.put_u32(record.serial_number)?;
            w.put_u32(record.thread_serial_number)?;
            w.put_u32(record.number_of_frames)?;
            w.put_len(record.stack_frame_ids.len())?;
            for id in &record.stack_frame_ids {
                w.put_u64(*id)?;
            }
        }

        w.put_len(self.gc_root_jni_globals.len())?;
        for record in &self.gc_root_jni_globals {
            w.put_u64(record.object_id)?;
            w.put_u64(record.jni_global_ref_id)?;
        }

        w.put_len(self.gc_root_jni_locals.len())?;
        for record in &self.gc_root_jni_locals {
            w.put_u64(record.object_id)?;
            w.put_u32(record.thread_serial_number)?;
            w.put_u32(record.frame_number_in_stack_trace)?;
        }

        w.put_len(self.gc_root_java_frames.len())?;
        for record in &self.gc_root_java_frames {
            w.put_u64(record.object_id)?;
            w.put_u32(record.thread_serial_number)?;
            w.put_u32(record.frame_number_in_stack_trace)?;
        }

        w.put_len(self.gc_root_sticky_classes.len())?;
        for record in &self.gc_root_sticky_classes {
            w.put_u64(record.object_id)?;
        }

        w.put_len(self.gc_root_thread_objects.len())?;
        for record in &self.gc_root_thread_objects {
            w.put_u64(record.thread_object_id)?;
            w.put_u32(record.thread_sequence_number)?;
            w.put_u32(record.stack_sequence_number)?;
        }

        w.put_len(self.class_dumps.len())?;
        for record in self.class_dumps.values() {
            w.put_u64(record.class_object_id)?;
            w.put_u32(record.stack_trace_serial_number)?;
            w.put_u64(record.super_class_object_id)?;
            w.put_u64(record.class_loader_object_id)?;
            w.put_u64(record.signers_object_id)?;
            w.put_u64(record.protection_domain_object_id)?;
            w.put_i32(record.instance_size)?;
            w.put_len(record.constant_pool.len())?;
            for entry in &record.constant_pool {
                w.put_u16(entry.index)?;
                w.put_java_value(&entry.value)?;
            }
            w.put_len(record.static_fields.len())?;
            for field in &record.static_fields {
                w.put_u64(field.name_id)?;
                w.put_java_value(&field.value)?;
            }
            w.put_len(record.instance_fields.len())?;
            for field in &record.instance_fields {
                w.put_u64(field.name_id)?;
                w.put_u8(field.field_type.tag())?;
            }
        }

        w.finish()
    }

    pub fn restore_from<R: Read>(source: R) -> Result<SmallRecords> {
        let mut r = SnapshotReader::new(source)?;
        let mut records = SmallRecords::new();
        records.id_size_raw = r.read_u32()?;
        records.timestamp_ms = r.read_u64()?;

        for _ in 0..r.read_len()? {
            let id = r.read_u64()?;
            let characters = r.read_string()?;
            records.put_utf8(Utf8String { id, characters });
        }

        for _ in 0..r.read_len()? {
            records.put_load_class(LoadClass {
                serial_number: r.read_u32()?,
                class_object_id: r.read_u64()?,
                stack_trace_serial_number: r.read_u32()?,
                class_name_id: r.read_u64()?,
            });
        }

        for _ in 0..r.read_len()? {
            records.put_frame(StackFrame {
                stack_frame_id: r.read_u64()?,
                method_name_id: r.read_u64()?,
                method_signature_id: r.read_u64()?,
                source_file_name_id: r.read_u64()?,
                class_serial_number: r.read_u32()?,
                line_number: crate::parser::gc_record::LineNumber(r.read_i32()?),
            });
        }

        for _ in 0..r.read_len()? {
            let serial_number = r.read_u32()?;
            let thread_serial_number = r.read_u32()?;
            let number_of_frames = r.read_u32()?;
            let id_count = r.read_len()?;
            let mut stack_frame_ids = Vec::with_capacity(id_count);
            for _ in 0..id_count {
                stack_frame_ids.push(r.read_u64()?);
            }
            records.put_trace(StackTrace {
                serial_number,
                thread_serial_number,
                number_of_frames,
                stack_frame_ids,
            });
        }

        for _ in 0..r.read_len()? {
            records.put_gc_root_jni_global(RootJniGlobal {
                object_id: r.read_u64()?,
                jni_global_ref_id: r.read_u64()?,
            });
        }

        for _ in 0..r.read_len()? {
            records.put_gc_root_jni_local(RootJniLocal {
                object_id: r.read_u64()?,
                thread_serial_number: r.read_u32()?,
                frame_number_in_stack_trace: r.read_u32()?,
            });
        }

        for _ in 0..r.read_len()? {
            records.put_gc_root_java_frame(RootJavaFrame {
                object_id: r.read_u64()?,
                thread_serial_number: r.read_u32()?,
                frame_number_in_stack_trace: r.read_u32()?,
            });
        }

        for _ in 0..r.read_len()? {
            records.put_gc_root_sticky_class(RootStickyClass {
                object_id: r.read_u64()?,
            });
        }

        for _ in 0..r.read_len()? {
            records.put_gc_root_thread_object(RootThreadObject {
                thread_object_id: r.read_u64()?,
                thread_sequence_number: r.read_u32()?,
                stack_sequence_number: r.read_u32()?,
            });
        }

        for _ in 0..r.read_len()? {
            let class_object_id = r.read_u64()?;
            let stack_trace_serial_number = r.read_u32()?;
            let super_class_object_id = r.read_u64()?;
            let class_loader_object_id = r.read_u64()?;
            let signers_object_id = r.read_u64()?;
            let protection_domain_object_id = r.read_u64()?;
            let instance_size = r.read_i32()?;
            let mut constant_pool = Vec::new();
            for _ in 0..r.read_len()? {
                let index = r.read_u16()?;
                let value = r.read_java_value()?;
                constant_pool.push(ConstPoolEntry { index, value });
            }
            let mut static_fields = Vec::new();
            for _ in 0..r.read_len()? {
                let name_id = r.read_u64()?;
                let value = r.read_java_value()?;
                static_fields.push(StaticField { name_id, value });
            }
            let mut instance_fields = Vec::new();
            for _ in 0..r.read_len()? {
                let name_id = r.read_u64()?;
                let field_type = crate::parser::gc_record::JavaType::from_tag(r.read_u8()?)?;
                instance_fields.push(InstanceField { name_id, field_type });
            }
            records.put_class_dump(ClassDump {
                class_object_id,
                stack_trace_serial_number,
                super_class_object_id,
                class_loader_object_id,
                signers_object_id,
                protection_domain_object_id,
                instance_size,
                constant_pool,
                static_fields,
                instance_fields,
            });
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::gc_record::{JavaType, JavaValue, LineNumber};

    fn populated_store() -> SmallRecords {
        let mut store = SmallRecords::new();
        store.put_id_size(8);
        store.put_timestamp_ms(1_608_192_273_831);
        store.put_utf8(Utf8String { id: 1, characters: "JAVA".to_string() });
        store.put_utf8(Utf8String { id: 2, characters: "java/lang/Object".to_string() });
        store.put_load_class(LoadClass {
            serial_number: 1,
            class_object_id: 10,
            stack_trace_serial_number: 1,
            class_name_id: 2,
        });
        store.put_frame(StackFrame {
            stack_frame_id: 5,
            method_name_id: 1,
            method_signature_id: 1,
            source_file_name_id: 1,
            class_serial_number: 1,
            line_number: LineNumber::NATIVE_METHOD,
        });
        store.put_trace(StackTrace {
            serial_number: 1,
            thread_serial_number: 3,
            number_of_frames: 2,
            stack_frame_ids: vec![5, 5],
        });
        store.put_gc_root_jni_global(RootJniGlobal { object_id: 1, jni_global_ref_id: 2 });
        store.put_gc_root_jni_local(RootJniLocal {
            object_id: 1,
            thread_serial_number: 3,
            frame_number_in_stack_trace: 0,
        });
        store.put_gc_root_java_frame(RootJavaFrame {
            object_id: 4,
            thread_serial_number: 3,
            frame_number_in_stack_trace: 1,
        });
        store.put_gc_root_sticky_class(RootStickyClass { object_id: 10 });
        store.put_gc_root_thread_object(RootThreadObject {
            thread_object_id: 7,
            thread_sequence_number: 3,
            stack_sequence_number: 1,
        });
        store.put_class_dump(ClassDump {
            class_object_id: 10,
            stack_trace_serial_number: 1,
            super_class_object_id: 0,
            class_loader_object_id: 0,
            signers_object_id: 0,
            protection_domain_object_id: 0,
            instance_size: 24,
            constant_pool: vec![ConstPoolEntry { index: 1, value: JavaValue::Float(1.5) }],
            static_fields: vec![StaticField { name_id: 1, value: JavaValue::Object(77) }],
            instance_fields: vec![InstanceField { name_id: 2, field_type: JavaType::Long }],
        });
        store
    }

    #[test]
    fn lookups_hit_and_miss() {
        let store = populated_store();
        assert_eq!(store.get_utf8(1).unwrap().characters, "JAVA");
        assert!(matches!(store.get_utf8(99), Err(HprofError::NotFound(_))));
        assert_eq!(store.get_load_class_by_class_object_id(10).unwrap().serial_number, 1);
        assert_eq!(store.get_load_class_by_serial(1).unwrap().class_object_id, 10);
        assert!(matches!(
            store.get_load_class_by_serial(2),
            Err(HprofError::NotFound(_))
        ));
        assert_eq!(store.get_frame(5).unwrap().line_number, LineNumber::NATIVE_METHOD);
        assert_eq!(store.get_trace(3).unwrap().number_of_frames, 2);
        assert_eq!(store.list_gc_root_sticky_classes().len(), 1);
        assert_eq!(store.get_class_dump(10).unwrap().instance_size, 24);
    }

    #[test]
    fn snapshot_round_trips_every_table() {
        let store = populated_store();
        let mut buf = Vec::new();
        store.serialize_to(&mut buf).unwrap();
        let restored = SmallRecords::restore_from(&buf[..]).unwrap();
        assert_eq!(restored, store);
    }

    #[test]
    fn empty_store_round_trips() {
        let store = SmallRecords::new();
        let mut buf = Vec::new();
        store.serialize_to(&mut buf).unwrap();
        let restored = SmallRecords::restore_from(&buf[..]).unwrap();
        assert_eq!(restored, store);
    }

    #[test]
    fn truncated_snapshot_is_eof_error() {
        let store = populated_store();
        let mut buf = Vec::new();
        store.serialize_to(&mut buf).unwrap();
        buf.truncate(buf.len() / 2);
        assert!(matches!(
            SmallRecords::restore_from(&buf[..]),
            Err(HprofError::UnexpectedEof(_))
        ));
    }
}
