use std::io::{self, Read};

use nom::bytes::streaming::{tag, take_until};
use nom::combinator::map;
use nom::number::streaming::be_u32;
use nom::sequence::{terminated, tuple};
use nom::IResult;

use crate::errors::{HprofError, Result};

/// The only profile version this crate reads.
pub const SUPPORTED_VERSION: &str = "JAVA PROFILE 1.0.2";

/// Exact size of the file header: version string + NUL + id size + two
/// timestamp words.
pub const FILE_HEADER_LENGTH: usize = 31;

#[derive(Debug, PartialEq, Eq)]
pub struct FileHeader {
    pub version: String,
    pub id_size_raw: u32,
    /// Capture time in milliseconds since the epoch. On the wire the first
    /// u4 holds the high 32 bits, the second the low 32 bits.
    pub timestamp_ms: u64,
}

fn parse_c_string(i: &[u8]) -> IResult<&[u8], &[u8]> {
    terminated(take_until("\0"), tag("\0"))(i)
}

fn parse_file_header(i: &[u8]) -> IResult<&[u8], FileHeader> {
    map(
        tuple((parse_c_string, be_u32, be_u32, be_u32)),
        |(version, id_size_raw, high, low)| FileHeader {
            version: String::from_utf8_lossy(version).to_string(),
            id_size_raw,
            timestamp_ms: (u64::from(high) << 32) | u64::from(low),
        },
    )(i)
}

/// Reads and validates the 31-byte file header from the start of a dump.
pub fn read_file_header<R: Read>(source: &mut R) -> Result<FileHeader> {
    let mut buf = [0u8; FILE_HEADER_LENGTH];
    source.read_exact(&mut buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            HprofError::UnexpectedEof("file header")
        } else {
            HprofError::Io(e)
        }
    })?;
    let (rest, header) = parse_file_header(&buf)
        .map_err(|_| HprofError::format("malformed file header"))?;
    if header.version != SUPPORTED_VERSION {
        return Err(HprofError::unsupported(format!(
            "profile version {:?}, only {SUPPORTED_VERSION:?} is supported",
            header.version
        )));
    }
    if !rest.is_empty() {
        return Err(HprofError::format("trailing bytes in file header"));
    }
    Ok(header)
}
