//! Per-class and per-type counters aggregated while walking the heap
//! dump. Large records are never kept in memory, so these counts are the
//! only whole-heap aggregates available without re-reading the dump.

use std::io::{Read, Write};

use ahash::AHashMap;

use crate::errors::Result;
use crate::parser::gc_record::{
    InstanceDumpHeader, JavaType, ObjArrayDumpHeader, PrimArrayDumpHeader,
};
use crate::storage::snapshot::{SnapshotReader, SnapshotWriter};

#[derive(Debug, Default, PartialEq)]
pub struct MetaCounters {
    instances_count: AHashMap<u64, u64>,
    obj_arrays_count: AHashMap<u64, u64>,
    obj_array_elements_count: AHashMap<u64, u64>,
    prim_arrays_count: AHashMap<JavaType, u64>,
    prim_array_elements_count: AHashMap<JavaType, u64>,
}

impl MetaCounters {
    pub fn new() -> Self {
        MetaCounters::default()
    }

    pub fn add_instance(&mut self, header: &InstanceDumpHeader) {
        *self.instances_count.entry(header.class_object_id).or_insert(0) += 1;
    }

    pub fn add_obj_array(&mut self, header: &ObjArrayDumpHeader) {
        *self.obj_arrays_count.entry(header.array_class_id).or_insert(0) += 1;
        *self
            .obj_array_elements_count
            .entry(header.array_class_id)
            .or_insert(0) += u64::from(header.number_of_elements);
    }

    pub fn add_prim_array(&mut self, header: &PrimArrayDumpHeader) {
        *self.prim_arrays_count.entry(header.element_type).or_insert(0) += 1;
        *self
            .prim_array_elements_count
            .entry(header.element_type)
            .or_insert(0) += u64::from(header.number_of_elements);
    }

    pub fn instances_count(&self) -> &AHashMap<u64, u64> {
        &self.instances_count
    }

    pub fn obj_arrays_count(&self) -> &AHashMap<u64, u64> {
        &self.obj_arrays_count
    }

    pub fn obj_array_elements_count(&self) -> &AHashMap<u64, u64> {
        &self.obj_array_elements_count
    }

    pub fn prim_arrays_count(&self) -> &AHashMap<JavaType, u64> {
        &self.prim_arrays_count
    }

    pub fn prim_array_elements_count(&self) -> &AHashMap<JavaType, u64> {
        &self.prim_array_elements_count
    }

    pub fn serialize_to<W: Write>(&self, sink: W) -> Result<()> {
        let mut w = SnapshotWriter::new(sink)?;
        for table in [
            &self.instances_count,
            &self.obj_arrays_count,
            &self.obj_array_elements_count,
        ] {
            w.put_len(table.len())?;
            for (key, count) in table {
                w.put_u64(*key)?;
                w.put_u64(*count)?;
            }
        }
        for table in [&self.prim_arrays_count, &self.prim_array_elements_count] {
            w.put_len(table.len())?;
            for (ty, count) in table {
                w.put_u8(ty.tag())?;
                w.put_u64(*count)?;
            }
        }
        w.finish()
    }

    pub fn restore_from<R: Read>(source: R) -> Result<MetaCounters> {
        let mut r = SnapshotReader::new(source)?;
        let mut meta = MetaCounters::new();
        for table in [
            &mut meta.instances_count,
            &mut meta.obj_arrays_count,
            &mut meta.obj_array_elements_count,
        ] {
            for _ in 0..r.read_len()? {
                let key = r.read_u64()?;
                let count = r.read_u64()?;
                table.insert(key, count);
            }
        }
        for table in [&mut meta.prim_arrays_count, &mut meta.prim_array_elements_count] {
            for _ in 0..r.read_len()? {
                let ty = JavaType::from_tag(r.read_u8()?)?;
                let count = r.read_u64()?;
                table.insert(ty, count);
            }
        }
        Ok(meta)
    }
}
