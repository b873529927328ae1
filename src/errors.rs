use thiserror::Error;

pub type Result<T> = std::result::Result<T, HprofError>;

/// Every failure the crate can produce. The first error aborts the walk or
/// the query; there are no retries. `NotFound` is non-fatal by convention:
/// callers probing for a record kind treat it as "try the next kind".
#[derive(Error, Debug)]
pub enum HprofError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected end of input while reading {0}")]
    UnexpectedEof(&'static str),

    #[error("malformed input: {0}")]
    Format(String),

    #[error("unsupported input: {0}")]
    Unsupported(String),

    #[error("index keys went backward: key {key} after {last}")]
    NonMonotonic { key: u64, last: u64 },

    #[error("not found: {0}")]
    NotFound(String),
}

impl HprofError {
    pub fn format(msg: impl Into<String>) -> Self {
        HprofError::Format(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        HprofError::Unsupported(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        HprofError::NotFound(msg.into())
    }
}
