use std::path::PathBuf;

use thiserror::Error;

/// Per-URL failure. Recorded in the crawl log, never fatal.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("empty url")]
    EmptyUrl,
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("unsupported content-type: {0}")]
    NotHtml(String),
    #[error("field not found on page: {0}")]
    MissingField(&'static str),
    #[error("invalid amount {raw:?}: {source}")]
    InvalidAmount {
        raw: String,
        #[source]
        source: AmountError,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("empty amount")]
    Empty,
    #[error("not a number")]
    NotANumber,
    #[error("too many decimal places")]
    Precision,
}

/// Errors that abort a whole stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),
    #[error("no extracted table (extraidos-N.csv) found in {0}; run `autocheck crawl` first or pass --extracted")]
    NoExtractedTable(PathBuf),
    #[error("no results table (resultados-N.csv) found in {0}; run `autocheck compare` first")]
    NoResultsTable(PathBuf),
    #[error("column {wanted} not found in {path} (headers: {headers})")]
    MissingColumn {
        wanted: String,
        path: PathBuf,
        headers: String,
    },
    #[error(
        "cannot write {path}: {source}. Is the file open in another program (e.g. a spreadsheet)?"
    )]
    OutputLocked {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write workbook {path}: {source}")]
    Workbook {
        path: PathBuf,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },
    #[error("failed to read table {path}: {source}")]
    Table {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}
