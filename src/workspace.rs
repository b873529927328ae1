//! On-disk layout of the persisted parse results and the index-once
//! entry points. Next to `app.hprof` the parser creates `app.hprof.db/`
//! holding the three offset indices and the two snapshots; the
//! directory's presence alone marks the dump as indexed and later
//! invocations skip straight to opening the accessor.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::dump::accessor::ParsedAccessor;
use crate::dump::parser::DumpParser;
use crate::errors::Result;
use crate::storage::big::{BigRecordsReader, BigRecordsWriter};
use crate::storage::meta::MetaCounters;
use crate::storage::small::SmallRecords;

pub const STORAGE_DIR_SUFFIX: &str = ".db";
const INSTANCE_DUMP_INDEX_FILE: &str = "instance-dump.idx.bin";
const OBJ_ARRAY_DUMP_INDEX_FILE: &str = "obj-array-dump.idx.bin";
const PRIM_ARRAY_DUMP_INDEX_FILE: &str = "prim-array-dump.idx.bin";
const SMALL_RECORDS_FILE: &str = "small-records.bin";
const META_FILE: &str = "meta.bin";

pub fn storage_dir(hprof: &Path) -> PathBuf {
    let mut dir = hprof.as_os_str().to_os_string();
    dir.push(STORAGE_DIR_SUFFIX);
    PathBuf::from(dir)
}

pub fn is_indexed(hprof: &Path) -> bool {
    storage_dir(hprof).is_dir()
}

/// Parses and indexes the dump unless its storage directory already
/// exists. A failed parse removes the half-written directory so it
/// cannot be mistaken for a finished index later.
pub fn ensure_indexed(hprof: &Path, show_progress: bool) -> Result<()> {
    if is_indexed(hprof) {
        return Ok(());
    }
    let dir = storage_dir(hprof);
    index_dump(hprof, &dir, show_progress).map_err(|e| {
        let _ = fs::remove_dir_all(&dir);
        e
    })
}

fn index_dump(hprof: &Path, dir: &Path, show_progress: bool) -> Result<()> {
    let dump_file = File::open(hprof)?;
    let file_len = dump_file.metadata()?.len();
    fs::create_dir_all(dir)?;

    let big = BigRecordsWriter::new(
        File::create(dir.join(INSTANCE_DUMP_INDEX_FILE))?,
        File::create(dir.join(OBJ_ARRAY_DUMP_INDEX_FILE))?,
        File::create(dir.join(PRIM_ARRAY_DUMP_INDEX_FILE))?,
    );
    let parser = DumpParser::new(dump_file, big);

    let done = Arc::new(AtomicBool::new(false));
    let progress = show_progress.then(|| {
        spawn_progress_bar(file_len, parser.position(), Arc::clone(&done))
    });

    let outcome = parser.parse();
    done.store(true, Ordering::Relaxed);
    if let Some(handle) = progress {
        let _ = handle.join();
    }
    let (small, meta) = outcome?;

    small.serialize_to(BufWriter::new(File::create(dir.join(SMALL_RECORDS_FILE))?))?;
    meta.serialize_to(BufWriter::new(File::create(dir.join(META_FILE))?))?;
    info!(dump = %hprof.display(), "indexed heap dump");
    Ok(())
}

/// Polls the driver's atomic byte cursor from a separate thread; the
/// walk itself stays single-threaded.
fn spawn_progress_bar(
    file_len: u64,
    pos: Arc<AtomicU64>,
    done: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    let bar = ProgressBar::new(file_len);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, eta {eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    bar.set_style(style);
    thread::spawn(move || {
        while !done.load(Ordering::Relaxed) {
            bar.set_position(pos.load(Ordering::Relaxed));
            thread::sleep(Duration::from_millis(100));
        }
        bar.finish_and_clear();
    })
}

/// Opens the persisted files of an indexed dump as a typed accessor.
pub fn open_accessor(hprof: &Path) -> Result<ParsedAccessor<File, File>> {
    let dir = storage_dir(hprof);
    let small = SmallRecords::restore_from(BufReader::new(File::open(
        dir.join(SMALL_RECORDS_FILE),
    )?))?;
    let meta = MetaCounters::restore_from(BufReader::new(File::open(dir.join(META_FILE))?))?;
    let big = BigRecordsReader::new(
        File::open(dir.join(INSTANCE_DUMP_INDEX_FILE))?,
        File::open(dir.join(OBJ_ARRAY_DUMP_INDEX_FILE))?,
        File::open(dir.join(PRIM_ARRAY_DUMP_INDEX_FILE))?,
    )?;
    ParsedAccessor::new(File::open(hprof)?, big, small, meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::DumpBuilder;
    use std::io::Write;

    fn write_dump(dir: &Path, bytes: &[u8]) -> PathBuf {
        let path = dir.join("test.hprof");
        let mut file = File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn indexes_once_and_serves_queries() {
        let tmp = tempfile::tempdir().unwrap();
        let (bytes, _) = DumpBuilder::full_fixture();
        let hprof = write_dump(tmp.path(), &bytes);

        assert!(!is_indexed(&hprof));
        ensure_indexed(&hprof, false).unwrap();
        assert!(is_indexed(&hprof));
        for file in [
            INSTANCE_DUMP_INDEX_FILE,
            OBJ_ARRAY_DUMP_INDEX_FILE,
            PRIM_ARRAY_DUMP_INDEX_FILE,
            SMALL_RECORDS_FILE,
            META_FILE,
        ] {
            assert!(storage_dir(&hprof).join(file).is_file(), "{file} missing");
        }

        let mut accessor = open_accessor(&hprof).unwrap();
        assert_eq!(accessor.get_utf8(1).unwrap().characters, "JAVA");
        let header = accessor.get_instance_header(1).unwrap();
        assert_eq!(header.bytes_that_follow, 1);
        assert_eq!(accessor.read_bytes_from_current(1).unwrap(), vec![0x2A]);
    }

    #[test]
    fn existing_directory_skips_reparsing() {
        let tmp = tempfile::tempdir().unwrap();
        let (bytes, _) = DumpBuilder::full_fixture();
        let hprof = write_dump(tmp.path(), &bytes);
        ensure_indexed(&hprof, false).unwrap();

        // overwrite the dump with garbage; the index directory is still
        // present, so no re-parse happens and no error surfaces
        fs::write(&hprof, b"garbage").unwrap();
        ensure_indexed(&hprof, false).unwrap();
    }

    #[test]
    fn failed_parse_leaves_no_directory_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let hprof = write_dump(tmp.path(), b"not an hprof file at all........");
        assert!(ensure_indexed(&hprof, false).is_err());
        assert!(!is_indexed(&hprof));
    }
}
