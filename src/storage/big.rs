//! The three per-kind offset indices for large records. Instances,
//! object arrays and primitive arrays each get their own file so keys
//! stay monotonic per kind during the single pass.

use std::io::{Read, Seek, Write};

use crate::errors::Result;
use crate::storage::index::{IndexReader, IndexWriter, DEFAULT_BATCH_ENTRIES};

pub struct BigRecordsWriter<W> {
    instance_dump: IndexWriter<W>,
    obj_array_dump: IndexWriter<W>,
    prim_array_dump: IndexWriter<W>,
}

impl<W: Write> BigRecordsWriter<W> {
    pub fn new(instance_dump: W, obj_array_dump: W, prim_array_dump: W) -> Self {
        BigRecordsWriter {
            instance_dump: IndexWriter::new(instance_dump, DEFAULT_BATCH_ENTRIES),
            obj_array_dump: IndexWriter::new(obj_array_dump, DEFAULT_BATCH_ENTRIES),
            prim_array_dump: IndexWriter::new(prim_array_dump, DEFAULT_BATCH_ENTRIES),
        }
    }

    pub fn put_instance_dump_offset(&mut self, object_id: u64, offset: u64) -> Result<()> {
        self.instance_dump.put(object_id, offset)
    }

    pub fn put_obj_array_dump_offset(&mut self, array_object_id: u64, offset: u64) -> Result<()> {
        self.obj_array_dump.put(array_object_id, offset)
    }

    pub fn put_prim_array_dump_offset(&mut self, array_object_id: u64, offset: u64) -> Result<()> {
        self.prim_array_dump.put(array_object_id, offset)
    }

    pub fn close(self) -> Result<()> {
        self.instance_dump.close()?;
        self.obj_array_dump.close()?;
        self.prim_array_dump.close()
    }
}

pub struct BigRecordsReader<R> {
    instance_dump: IndexReader<R>,
    obj_array_dump: IndexReader<R>,
    prim_array_dump: IndexReader<R>,
}

impl<R: Read + Seek> BigRecordsReader<R> {
    pub fn new(instance_dump: R, obj_array_dump: R, prim_array_dump: R) -> Result<Self> {
        Ok(BigRecordsReader {
            instance_dump: IndexReader::new(instance_dump)?,
            obj_array_dump: IndexReader::new(obj_array_dump)?,
            prim_array_dump: IndexReader::new(prim_array_dump)?,
        })
    }

    pub fn instance_dump_offset(&mut self, object_id: u64) -> Result<u64> {
        self.instance_dump.get(object_id)
    }

    pub fn obj_array_dump_offset(&mut self, array_object_id: u64) -> Result<u64> {
        self.obj_array_dump.get(array_object_id)
    }

    pub fn prim_array_dump_offset(&mut self, array_object_id: u64) -> Result<u64> {
        self.prim_array_dump.get(array_object_id)
    }
}
