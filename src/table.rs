//! File helpers shared by the crawl and compare stages: numbered output
//! names, output creation and CSV readers.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::PipelineError;

pub const EXTRACTED_PREFIX: &str = "extraidos";
pub const RESULTS_PREFIX: &str = "resultados";

static SEQ_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.+)-(\d+)\.([A-Za-z0-9]+)$").unwrap());

/// Highest `N` among files named `<prefix>-N.<ext>` in `dir`.
pub fn latest_seq(dir: &Path, prefix: &str, ext: &str) -> Option<u32> {
    let entries = fs::read_dir(dir).ok()?;
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name();
            let name = name.to_str()?;
            let caps = SEQ_RE.captures(name)?;
            if &caps[1] == prefix && caps[3].eq_ignore_ascii_case(ext) {
                caps[2].parse::<u32>().ok()
            } else {
                None
            }
        })
        .max()
}

/// Next free counter for `<prefix>-N.<ext>` (starts at 1).
pub fn next_seq(dir: &Path, prefix: &str, ext: &str) -> u32 {
    latest_seq(dir, prefix, ext).map_or(1, |n| n + 1)
}

pub fn seq_path(dir: &Path, prefix: &str, n: u32, ext: &str) -> PathBuf {
    dir.join(format!("{}-{}.{}", prefix, n, ext))
}

/// Path of the newest extracted table in `dir`.
pub fn latest_extracted(dir: &Path) -> Result<PathBuf, PipelineError> {
    latest_seq(dir, EXTRACTED_PREFIX, "csv")
        .map(|n| seq_path(dir, EXTRACTED_PREFIX, n, "csv"))
        .ok_or_else(|| PipelineError::NoExtractedTable(dir.to_path_buf()))
}

/// Path of the newest results table in `dir`.
pub fn latest_results(dir: &Path) -> Result<PathBuf, PipelineError> {
    latest_seq(dir, RESULTS_PREFIX, "csv")
        .map(|n| seq_path(dir, RESULTS_PREFIX, n, "csv"))
        .ok_or_else(|| PipelineError::NoResultsTable(dir.to_path_buf()))
}

pub fn ensure_dir(dir: &Path) -> Result<(), PipelineError> {
    fs::create_dir_all(dir).map_err(|source| PipelineError::OutputLocked {
        path: dir.to_path_buf(),
        source,
    })
}

/// Create (truncate) an output file. Any IO failure is reported as `OutputLocked`.
pub fn create_output(path: &Path) -> Result<BufWriter<File>, PipelineError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent)?;
        }
    }
    File::create(path)
        .map(BufWriter::new)
        .map_err(|source| PipelineError::OutputLocked {
            path: path.to_path_buf(),
            source,
        })
}

/// Open an input table, mapping a missing file to the fatal `MissingInput`.
pub fn open_input(path: &Path) -> Result<File, PipelineError> {
    File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => PipelineError::MissingInput(path.to_path_buf()),
        _ => PipelineError::Table {
            path: path.to_path_buf(),
            source: csv::Error::from(e),
        },
    })
}

/// Lenient reader for hand-edited spreadsheets: ragged rows, padded cells.
pub fn csv_reader(file: File, has_headers: bool) -> csv::Reader<File> {
    csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file)
}

pub fn strip_bom(s: &str) -> &str {
    s.strip_prefix('\u{feff}').unwrap_or(s)
}
