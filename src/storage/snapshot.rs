//! Length-prefixed big-endian encoding for the persisted snapshots
//! (`small-records.bin`, `meta.bin`). Identifiers are stored widened to
//! 8 bytes regardless of the dump's identifier size, so the reader needs
//! no width parameter. A leading version byte guards the layout.

use std::io::{Read, Write};

use crate::errors::{HprofError, Result};
use crate::parser::gc_record::{JavaType, JavaValue};
use crate::parser::primitives::{IdSize, PrimitiveReader};

pub(crate) const SNAPSHOT_VERSION: u8 = 1;

pub(crate) struct SnapshotWriter<W> {
    sink: W,
}

impl<W: Write> SnapshotWriter<W> {
    pub fn new(mut sink: W) -> Result<Self> {
        sink.write_all(&[SNAPSHOT_VERSION])?;
        Ok(SnapshotWriter { sink })
    }

    pub fn put_u8(&mut self, v: u8) -> Result<()> {
        self.sink.write_all(&[v])?;
        Ok(())
    }

    pub fn put_u16(&mut self, v: u16) -> Result<()> {
        self.sink.write_all(&v.to_be_bytes())?;
        Ok(())
    }

    pub fn put_u32(&mut self, v: u32) -> Result<()> {
        self.sink.write_all(&v.to_be_bytes())?;
        Ok(())
    }

    pub fn put_u64(&mut self, v: u64) -> Result<()> {
        self.sink.write_all(&v.to_be_bytes())?;
        Ok(())
    }

    pub fn put_i32(&mut self, v: i32) -> Result<()> {
        self.sink.write_all(&v.to_be_bytes())?;
        Ok(())
    }

    pub fn put_len(&mut self, len: usize) -> Result<()> {
        let len = u32::try_from(len)
            .map_err(|_| HprofError::format("snapshot table too large"))?;
        self.put_u32(len)
    }

    pub fn put_string(&mut self, s: &str) -> Result<()> {
        self.put_len(s.len())?;
        self.sink.write_all(s.as_bytes())?;
        Ok(())
    }

    pub fn put_java_value(&mut self, value: &JavaValue) -> Result<()> {
        self.put_u8(value.java_type().tag())?;
        match value {
            JavaValue::Object(id) => self.put_u64(*id),
            JavaValue::Boolean(b) => self.put_u8(u8::from(*b)),
            JavaValue::Char(c) => self.put_u16(*c),
            JavaValue::Float(f) => self.put_u32(f.to_bits()),
            JavaValue::Double(d) => self.put_u64(d.to_bits()),
            JavaValue::Byte(b) => self.put_u8(*b as u8),
            JavaValue::Short(s) => self.put_u16(*s as u16),
            JavaValue::Int(i) => self.put_i32(*i),
            JavaValue::Long(l) => self.put_u64(*l as u64),
        }
    }

    pub fn finish(mut self) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }
}

pub(crate) struct SnapshotReader<R> {
    primitives: PrimitiveReader<R>,
}

impl<R: Read> SnapshotReader<R> {
    pub fn new(source: R) -> Result<Self> {
        // snapshots store identifiers pre-widened to 8 bytes
        let mut primitives = PrimitiveReader::new(source, IdSize::U8);
        let version = primitives.read_u8()?;
        if version != SNAPSHOT_VERSION {
            return Err(HprofError::format(format!(
                "snapshot version {version}, expected {SNAPSHOT_VERSION}"
            )));
        }
        Ok(SnapshotReader { primitives })
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.primitives.read_u8()
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.primitives.read_u16()
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.primitives.read_u32()
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.primitives.read_u64()
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.primitives.read_i32()
    }

    pub fn read_len(&mut self) -> Result<usize> {
        Ok(self.read_u32()? as usize)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_len()?;
        let bytes = self.primitives.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|_| HprofError::format("snapshot string is not UTF-8"))
    }

    pub fn read_java_type(&mut self) -> Result<JavaType> {
        self.primitives.read_java_type()
    }

    pub fn read_java_value(&mut self) -> Result<JavaValue> {
        let ty = self.read_java_type()?;
        self.primitives.read_java_value(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn java_values_round_trip_with_tags() {
        let values = [
            JavaValue::Object(0xDEAD_BEEF_0000_0001),
            JavaValue::Boolean(true),
            JavaValue::Char(0x30C4),
            JavaValue::Float(-0.5),
            JavaValue::Double(f64::MIN_POSITIVE),
            JavaValue::Byte(-128),
            JavaValue::Short(-32768),
            JavaValue::Int(i32::MIN),
            JavaValue::Long(i64::MIN),
        ];
        let mut buf = Vec::new();
        let mut writer = SnapshotWriter::new(&mut buf).unwrap();
        for value in &values {
            writer.put_java_value(value).unwrap();
        }
        writer.finish().unwrap();

        let mut reader = SnapshotReader::new(&buf[..]).unwrap();
        for value in &values {
            assert_eq!(reader.read_java_value().unwrap(), *value);
        }
    }

    #[test]
    fn strings_round_trip() {
        let mut buf = Vec::new();
        let mut writer = SnapshotWriter::new(&mut buf).unwrap();
        writer.put_string("java/lang/String").unwrap();
        writer.put_string("").unwrap();
        writer.finish().unwrap();

        let mut reader = SnapshotReader::new(&buf[..]).unwrap();
        assert_eq!(reader.read_string().unwrap(), "java/lang/String");
        assert_eq!(reader.read_string().unwrap(), "");
    }

    #[test]
    fn version_mismatch_is_format_error() {
        let buf = [SNAPSHOT_VERSION + 1, 0, 0];
        assert!(matches!(
            SnapshotReader::new(&buf[..]),
            Err(HprofError::Format(_))
        ));
    }
}
