use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local, SecondsFormat};

use crate::error::PipelineError;
use crate::table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Fail,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Ok => "OK",
            Outcome::Fail => "FAIL",
        })
    }
}

/// One processed URL.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub at: DateTime<Local>,
    pub url: String,
    pub outcome: Outcome,
    pub elapsed: Duration,
    pub status: Option<u16>,
    pub error: Option<String>,
}

impl fmt::Display for LogEntry {
    /// `timestamp  outcome  url  elapsed  status  error`, tab separated.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.status.map(|s| s.to_string()).unwrap_or_else(|| "-".into());
        let error = self.error.as_deref().unwrap_or("").replace(['\n', '\r', '\t'], " ");
        write!(
            f,
            "{}\t{}\t{}\t{:.3}s\t{}\t{}",
            self.at.to_rfc3339_opts(SecondsFormat::Secs, false),
            self.outcome,
            self.url,
            self.elapsed.as_secs_f64(),
            status,
            error
        )
    }
}

/// Append-only crawl log. The file is created up front so an empty run
/// still leaves an (empty) log behind.
pub struct CrawlLog {
    path: PathBuf,
    out: std::io::BufWriter<std::fs::File>,
}

impl CrawlLog {
    pub fn create(path: &Path) -> Result<Self, PipelineError> {
        Ok(CrawlLog {
            path: path.to_path_buf(),
            out: table::create_output(path)?,
        })
    }

    pub fn append(&mut self, entry: &LogEntry) -> Result<(), PipelineError> {
        writeln!(self.out, "{}", entry).map_err(|source| self.locked(source))
    }

    pub fn finish(mut self) -> Result<PathBuf, PipelineError> {
        self.out.flush().map_err(|source| self.locked(source))?;
        Ok(self.path)
    }

    fn locked(&self, source: std::io::Error) -> PipelineError {
        PipelineError::OutputLocked {
            path: self.path.clone(),
            source,
        }
    }
}
