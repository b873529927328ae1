//! Single-pass walk over an .hprof file. Small records land in the
//! in-memory store; for instance and array dumps only the header is
//! decoded, the absolute offset of that header is stamped into the
//! per-kind index, and the payload is skipped. Typically the big records
//! are well over 90% of a dump, so one pass with header-only decoding is
//! what keeps multi-gigabyte dumps parseable in bounded memory.

use std::io::{BufReader, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::errors::{HprofError, Result};
use crate::parser::file_header::{read_file_header, FILE_HEADER_LENGTH};
use crate::parser::gc_record::*;
use crate::parser::primitives::IdSize;
use crate::parser::pushback::PushbackReader;
use crate::parser::record::*;
use crate::parser::record_parser::RecordParser;
use crate::parser::sizes::SizeInfo;
use crate::storage::big::BigRecordsWriter;
use crate::storage::meta::MetaCounters;
use crate::storage::small::SmallRecords;

/// The driver's byte cursor. The local value is authoritative; every
/// change is mirrored into the shared atomic so a progress reporter on
/// another thread can poll it. Readers may see a stale value, never a
/// torn one.
struct Cursor {
    value: u64,
    shared: Arc<AtomicU64>,
}

impl Cursor {
    fn set(&mut self, value: u64) {
        self.value = value;
        self.shared.store(value, Ordering::Relaxed);
    }

    fn advance(&mut self, n: u64) {
        self.set(self.value + n);
    }

    fn retreat(&mut self, n: u64) {
        self.set(self.value - n);
    }

    fn get(&self) -> u64 {
        self.value
    }
}

pub struct DumpParser<R, W> {
    source: R,
    big: BigRecordsWriter<W>,
    pos: Arc<AtomicU64>,
}

impl<R: Read, W: Write> DumpParser<R, W> {
    pub fn new(source: R, big: BigRecordsWriter<W>) -> Self {
        DumpParser {
            source,
            big,
            pos: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared handle to the byte cursor, for progress reporting while
    /// `parse` runs on another thread.
    pub fn position(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.pos)
    }

    /// Walks the whole file. On success the index writers are flushed and
    /// closed and the filled small store and meta counters are returned.
    pub fn parse(self) -> Result<(SmallRecords, MetaCounters)> {
        let DumpParser { source, mut big, pos } = self;
        let mut cursor = Cursor { value: 0, shared: pos };
        let mut buffered = PushbackReader::new(BufReader::new(source));

        let header = read_file_header(&mut buffered)?;
        let id_size = IdSize::from_raw(header.id_size_raw)?;
        cursor.set(FILE_HEADER_LENGTH as u64);

        let mut small = SmallRecords::new();
        small.put_id_size(header.id_size_raw);
        small.put_timestamp_ms(header.timestamp_ms);
        let mut meta = MetaCounters::new();

        let sizes = SizeInfo::new(id_size);
        let mut records = RecordParser::new(buffered, id_size);

        loop {
            let record_header = match records.parse_record_header()? {
                Some(h) => h,
                None => break, // clean end of file at a record boundary
            };
            cursor.advance(9);
            debug!(tag = record_header.tag, pos = cursor.get(), "record");
            match record_header.tag {
                TAG_UTF8 => {
                    let record = records.parse_utf8(record_header.remaining)?;
                    small.put_utf8(record);
                    cursor.advance(u64::from(record_header.remaining));
                }
                TAG_LOAD_CLASS => {
                    let record = records.parse_load_class()?;
                    small.put_load_class(record);
                    cursor.advance(u64::from(record_header.remaining));
                }
                TAG_FRAME => {
                    let record = records.parse_frame()?;
                    small.put_frame(record);
                    cursor.advance(u64::from(record_header.remaining));
                }
                TAG_TRACE => {
                    let record = records.parse_trace()?;
                    small.put_trace(record);
                    cursor.advance(u64::from(record_header.remaining));
                }
                // `remaining` is not trustworthy for segments; the end is
                // signaled in-band by the next top-level tag.
                TAG_HEAP_DUMP_SEGMENT => {
                    Self::parse_segment(
                        &mut records,
                        &mut cursor,
                        &sizes,
                        &mut small,
                        &mut meta,
                        &mut big,
                    )?;
                }
                TAG_HEAP_DUMP_END => break,
                x => {
                    return Err(HprofError::format(format!(
                        "unknown record tag 0x{x:02X} at offset {}",
                        cursor.get() - 9
                    )))
                }
            }
        }

        big.close()?;
        Ok((small, meta))
    }

    fn parse_segment(
        records: &mut RecordParser<PushbackReader<BufReader<R>>>,
        cursor: &mut Cursor,
        sizes: &SizeInfo,
        small: &mut SmallRecords,
        meta: &mut MetaCounters,
        big: &mut BigRecordsWriter<W>,
    ) -> Result<()> {
        loop {
            let sub_tag = records.parse_sub_record_tag()?;
            cursor.advance(1);
            match sub_tag {
                SUB_TAG_GC_ROOT_JNI_GLOBAL => {
                    small.put_gc_root_jni_global(records.parse_gc_root_jni_global()?);
                    cursor.advance(sizes.of_jni_global());
                }
                SUB_TAG_GC_ROOT_JNI_LOCAL => {
                    small.put_gc_root_jni_local(records.parse_gc_root_jni_local()?);
                    cursor.advance(sizes.of_jni_local());
                }
                SUB_TAG_GC_ROOT_JAVA_FRAME => {
                    small.put_gc_root_java_frame(records.parse_gc_root_java_frame()?);
                    cursor.advance(sizes.of_java_frame());
                }
                SUB_TAG_GC_ROOT_STICKY_CLASS => {
                    small.put_gc_root_sticky_class(records.parse_gc_root_sticky_class()?);
                    cursor.advance(sizes.of_sticky_class());
                }
                SUB_TAG_GC_ROOT_THREAD_OBJ => {
                    small.put_gc_root_thread_object(records.parse_gc_root_thread_object()?);
                    cursor.advance(sizes.of_thread_object());
                }
                SUB_TAG_GC_CLASS_DUMP => {
                    let record = records.parse_class_dump()?;
                    let size = sizes.of_class_dump(&record);
                    small.put_class_dump(record);
                    cursor.advance(size);
                }
                SUB_TAG_GC_INSTANCE_DUMP => {
                    let header = records.parse_instance_dump_header()?;
                    // cursor still holds the offset of the header's first byte
                    big.put_instance_dump_offset(header.object_id, cursor.get())?;
                    meta.add_instance(&header);
                    let size = sizes.of_instance_dump(&header);
                    cursor.advance(size.full);
                    records.skip(size.payload)?;
                }
                SUB_TAG_GC_OBJ_ARRAY_DUMP => {
                    let header = records.parse_obj_array_dump_header()?;
                    big.put_obj_array_dump_offset(header.array_object_id, cursor.get())?;
                    meta.add_obj_array(&header);
                    let size = sizes.of_obj_array_dump(&header);
                    cursor.advance(size.full);
                    records.skip(size.payload)?;
                }
                SUB_TAG_GC_PRIM_ARRAY_DUMP => {
                    let header = records.parse_prim_array_dump_header()?;
                    big.put_prim_array_dump_offset(header.array_object_id, cursor.get())?;
                    meta.add_prim_array(&header);
                    let size = sizes.of_prim_array_dump(&header);
                    cursor.advance(size.full);
                    records.skip(size.payload)?;
                }
                TAG_HEAP_DUMP_SEGMENT | TAG_HEAP_DUMP_END => {
                    // next top-level record; give its tag byte back
                    records.source_mut().unread(sub_tag);
                    cursor.retreat(1);
                    return Ok(());
                }
                x => {
                    return Err(HprofError::format(format!(
                        "unknown sub-record tag 0x{x:02X} at offset {}",
                        cursor.get() - 1
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{parse_in_memory, DumpBuilder, TEST_TIMESTAMP_MS};
    use std::io::Cursor as IoCursor;
    use std::sync::atomic::Ordering;

    #[test]
    fn header_only_dump() {
        let builder = DumpBuilder::new();
        let parser = DumpParser::new(
            IoCursor::new(builder.build()),
            BigRecordsWriter::new(Vec::new(), Vec::new(), Vec::new()),
        );
        let pos = parser.position();
        let (small, meta) = parser.parse().unwrap();
        assert_eq!(small.id_size_raw(), 8);
        assert_eq!(small.timestamp_ms(), TEST_TIMESTAMP_MS);
        assert!(meta.instances_count().is_empty());
        assert_eq!(pos.load(Ordering::Relaxed), 31);
    }

    #[test]
    fn utf8_record_advances_cursor_by_header_and_remaining() {
        let mut builder = DumpBuilder::new();
        builder.utf8(1, "JAVA");
        let parser = DumpParser::new(
            IoCursor::new(builder.build()),
            BigRecordsWriter::new(Vec::new(), Vec::new(), Vec::new()),
        );
        let pos = parser.position();
        let (small, _) = parser.parse().unwrap();
        assert_eq!(small.get_utf8(1).unwrap().characters, "JAVA");
        assert_eq!(pos.load(Ordering::Relaxed), 31 + 9 + 12);
    }

    #[test]
    fn sticky_class_segment_produces_no_index_entries() {
        let mut builder = DumpBuilder::new();
        builder.record_header(TAG_HEAP_DUMP_SEGMENT, 0);
        builder.u1(SUB_TAG_GC_ROOT_STICKY_CLASS);
        builder.id(1);
        builder.record_header(TAG_HEAP_DUMP_END, 0);
        let parsed = parse_in_memory(builder.build());
        assert_eq!(
            parsed.small.list_gc_root_sticky_classes(),
            &[RootStickyClass { object_id: 1 }]
        );
        assert!(parsed.instance_index.is_empty());
        assert!(parsed.obj_array_index.is_empty());
        assert!(parsed.prim_array_index.is_empty());
    }

    #[test]
    fn walks_the_full_fixture_and_stamps_offsets() {
        let (bytes, offsets) = DumpBuilder::full_fixture();
        let parsed = parse_in_memory(bytes.clone());
        let small = &parsed.small;

        assert_eq!(
            small.get_utf8(1).unwrap(),
            &Utf8String { id: 1, characters: "JAVA".to_string() }
        );
        assert_eq!(small.get_load_class_by_serial(1).unwrap().class_object_id, 1);
        assert_eq!(small.get_trace(1).unwrap().stack_frame_ids, vec![1, 1, 1]);
        assert_eq!(small.get_frame(1).unwrap().class_serial_number, 1);
        assert_eq!(small.list_gc_root_thread_objects().len(), 1);
        assert_eq!(small.list_gc_root_jni_locals().len(), 1);
        assert_eq!(small.list_gc_root_jni_globals().len(), 1);
        assert_eq!(small.list_gc_root_java_frames().len(), 1);
        assert_eq!(
            small.list_gc_root_sticky_classes(),
            &[RootStickyClass { object_id: 1 }, RootStickyClass { object_id: 2 }]
        );
        let class_dump = small.get_class_dump(1).unwrap();
        assert_eq!(class_dump.instance_size, 1);
        assert_eq!(class_dump.constant_pool.len(), 2);
        assert_eq!(class_dump.static_fields.len(), 2);
        assert_eq!(class_dump.instance_fields.len(), 2);

        // index round-trip: every stamped (id, offset) is found again
        let mut reader = parsed.big_reader();
        assert_eq!(reader.instance_dump_offset(1).unwrap(), offsets.instance_dump);
        assert_eq!(reader.obj_array_dump_offset(1).unwrap(), offsets.obj_array_dump);
        assert_eq!(reader.prim_array_dump_offset(1).unwrap(), offsets.prim_array_dump);

        // meta counters saw one of each big record
        assert_eq!(parsed.meta.instances_count()[&1], 1);
        assert_eq!(parsed.meta.obj_arrays_count()[&1], 1);
        assert_eq!(parsed.meta.prim_array_elements_count()[&JavaType::Boolean], 1);

        // final cursor equals the file length
        assert_eq!(parsed.final_pos, bytes.len() as u64);
    }

    #[test]
    fn stamped_offset_points_at_the_header_bytes() {
        let (bytes, offsets) = DumpBuilder::full_fixture();
        // decode the instance header straight from the stamped offset
        let mut records = RecordParser::new(
            &bytes[offsets.instance_dump as usize..],
            IdSize::U8,
        );
        let header = records.parse_instance_dump_header().unwrap();
        assert_eq!(header.object_id, 1);
        assert_eq!(header.class_object_id, 1);
        assert_eq!(header.bytes_that_follow, 1);
    }

    #[test]
    fn index_keys_are_non_decreasing_across_the_file() {
        let (bytes, _) = DumpBuilder::full_fixture();
        let parsed = parse_in_memory(bytes);
        for index in [
            &parsed.instance_index,
            &parsed.obj_array_index,
            &parsed.prim_array_index,
        ] {
            let mut last = 0u64;
            for pair in index.chunks(16) {
                let key = u64::from_be_bytes(pair[..8].try_into().unwrap());
                assert!(key >= last);
                last = key;
            }
        }
    }

    #[test]
    fn wrong_version_fails_unsupported() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"JAVA PROFILE 1.0.1\0");
        bytes.extend_from_slice(&8u32.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 8]);
        let parser = DumpParser::new(
            IoCursor::new(bytes),
            BigRecordsWriter::new(Vec::new(), Vec::new(), Vec::new()),
        );
        assert!(matches!(parser.parse(), Err(HprofError::Unsupported(_))));
    }

    #[test]
    fn unknown_top_level_tag_fails_format() {
        let mut builder = DumpBuilder::new();
        builder.record_header(0x0E, 6);
        let parser = DumpParser::new(
            IoCursor::new(builder.build()),
            BigRecordsWriter::new(Vec::new(), Vec::new(), Vec::new()),
        );
        assert!(matches!(parser.parse(), Err(HprofError::Format(_))));
    }

    #[test]
    fn unknown_sub_record_tag_fails_format() {
        let mut builder = DumpBuilder::new();
        builder.record_header(TAG_HEAP_DUMP_SEGMENT, 0);
        builder.u1(0x42);
        let parser = DumpParser::new(
            IoCursor::new(builder.build()),
            BigRecordsWriter::new(Vec::new(), Vec::new(), Vec::new()),
        );
        assert!(matches!(parser.parse(), Err(HprofError::Format(_))));
    }

    #[test]
    fn truncated_sub_record_fails_eof() {
        let mut builder = DumpBuilder::new();
        builder.record_header(TAG_HEAP_DUMP_SEGMENT, 0);
        builder.u1(SUB_TAG_GC_ROOT_STICKY_CLASS);
        builder.u4(1); // half an identifier, then nothing
        let parser = DumpParser::new(
            IoCursor::new(builder.build()),
            BigRecordsWriter::new(Vec::new(), Vec::new(), Vec::new()),
        );
        assert!(matches!(parser.parse(), Err(HprofError::UnexpectedEof(_))));
    }
}
