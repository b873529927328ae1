//! Append-only (key, value) index files and their binary-searched
//! readers. Records are fixed 16-byte pairs of big-endian u64, so the
//! file size is always a multiple of 16 and a record number maps straight
//! to a byte offset. Keys must arrive in non-decreasing order during the
//! single-pass walk; that monotonicity is what makes the read side a
//! plain binary search. Lookups rely on the OS page cache, the reader
//! keeps no cache of its own.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::errors::{HprofError, Result};

pub const INDEX_RECORD_LEN: u64 = 16;

/// Entries buffered per batch before hitting the sink (16 MiB of index).
pub const DEFAULT_BATCH_ENTRIES: usize = 1_000_000;

pub struct IndexWriter<W> {
    sink: W,
    batch: Vec<u8>,
    batch_capacity: usize,
    last_key: u64,
}

impl<W: Write> IndexWriter<W> {
    pub fn new(sink: W, batch_entries: usize) -> Self {
        IndexWriter {
            sink,
            batch: Vec::new(),
            batch_capacity: batch_entries.max(1) * INDEX_RECORD_LEN as usize,
            last_key: 0,
        }
    }

    /// Appends one pair. Equal consecutive keys are allowed, a strictly
    /// smaller key is a `NonMonotonic` error.
    pub fn put(&mut self, key: u64, value: u64) -> Result<()> {
        if key < self.last_key {
            return Err(HprofError::NonMonotonic {
                key,
                last: self.last_key,
            });
        }
        self.last_key = key;
        self.batch.extend_from_slice(&key.to_be_bytes());
        self.batch.extend_from_slice(&value.to_be_bytes());
        if self.batch.len() >= self.batch_capacity {
            self.write_batch()?;
        }
        Ok(())
    }

    fn write_batch(&mut self) -> Result<()> {
        if !self.batch.is_empty() {
            self.sink.write_all(&self.batch)?;
            self.batch.clear();
        }
        Ok(())
    }

    /// Flushes the partial batch. Must run before the sink is dropped.
    pub fn close(mut self) -> Result<()> {
        self.write_batch()?;
        self.sink.flush()?;
        Ok(())
    }
}

pub struct IndexReader<R> {
    source: R,
    records: u64,
}

impl<R: Read + Seek> IndexReader<R> {
    pub fn new(mut source: R) -> Result<Self> {
        let len = source.seek(SeekFrom::End(0))?;
        if len % INDEX_RECORD_LEN != 0 {
            return Err(HprofError::format(format!(
                "index size {len} is not a multiple of {INDEX_RECORD_LEN}"
            )));
        }
        Ok(IndexReader {
            source,
            records: len / INDEX_RECORD_LEN,
        })
    }

    pub fn len(&self) -> u64 {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Binary search for `key`, 16-byte aligned reads only.
    pub fn get(&mut self, key: u64) -> Result<u64> {
        let mut left: u64 = 0;
        let mut right = self.records;
        while left < right {
            let mid = left + (right - left) / 2;
            let (mid_key, mid_value) = self.record_at(mid)?;
            if mid_key == key {
                return Ok(mid_value);
            }
            if mid_key < key {
                left = mid + 1;
            } else {
                right = mid;
            }
        }
        Err(HprofError::not_found(format!("key {key} not in index")))
    }

    fn record_at(&mut self, record: u64) -> Result<(u64, u64)> {
        self.source
            .seek(SeekFrom::Start(record * INDEX_RECORD_LEN))?;
        let mut key = [0u8; 8];
        let mut value = [0u8; 8];
        self.source.read_exact(&mut key)?;
        self.source.read_exact(&mut value)?;
        Ok((u64::from_be_bytes(key), u64::from_be_bytes(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn build_index(pairs: &[(u64, u64)], batch_entries: usize) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut writer = IndexWriter::new(&mut buf, batch_entries);
        for (k, v) in pairs {
            writer.put(*k, *v).unwrap();
        }
        writer.close().unwrap();
        buf
    }

    #[test]
    fn written_pairs_are_found_again() {
        let pairs: Vec<(u64, u64)> = (0..100).map(|i| (i * 3, i * 1000)).collect();
        let buf = build_index(&pairs, 7);
        let mut reader = IndexReader::new(Cursor::new(buf)).unwrap();
        assert_eq!(reader.len(), 100);
        for (k, v) in pairs {
            assert_eq!(reader.get(k).unwrap(), v);
        }
    }

    #[test]
    fn missing_key_is_not_found() {
        let buf = build_index(&[(2, 20), (4, 40)], DEFAULT_BATCH_ENTRIES);
        let mut reader = IndexReader::new(Cursor::new(buf)).unwrap();
        assert!(matches!(reader.get(3), Err(HprofError::NotFound(_))));
        assert!(matches!(reader.get(5), Err(HprofError::NotFound(_))));
    }

    #[test]
    fn empty_index_finds_nothing() {
        let buf = build_index(&[], DEFAULT_BATCH_ENTRIES);
        let mut reader = IndexReader::new(Cursor::new(buf)).unwrap();
        assert!(reader.is_empty());
        assert!(matches!(reader.get(1), Err(HprofError::NotFound(_))));
    }

    #[test]
    fn keys_going_backward_fail() {
        let mut buf = Vec::new();
        let mut writer = IndexWriter::new(&mut buf, DEFAULT_BATCH_ENTRIES);
        writer.put(5, 50).unwrap();
        writer.put(5, 51).unwrap();
        let err = writer.put(4, 40).unwrap_err();
        assert!(matches!(err, HprofError::NonMonotonic { key: 4, last: 5 }));
    }

    #[test]
    fn partial_batch_is_flushed_on_close() {
        // batch of 4 entries, 5 puts: one full batch plus one on close
        let buf = build_index(&[(1, 1), (2, 2), (3, 3), (4, 4), (5, 5)], 4);
        assert_eq!(buf.len(), 5 * INDEX_RECORD_LEN as usize);
        let mut reader = IndexReader::new(Cursor::new(buf)).unwrap();
        assert_eq!(reader.get(5).unwrap(), 5);
    }

    #[test]
    fn misaligned_index_is_format_error() {
        let buf = vec![0u8; 17];
        assert!(matches!(
            IndexReader::new(Cursor::new(buf)),
            Err(HprofError::Format(_))
        ));
    }
}
