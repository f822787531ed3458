use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::PipelineError;
use crate::table;

const KEY_CANDIDATES: &[&str] = &["numNotaFiscal", "numero", "number", "num", "nota", "documento"];
const DESC_CANDIDATES: &[&str] = &["descricao", "descrição", "desc", "description", "historico", "histórico"];
pub const AMOUNT_CANDIDATES: &[&str] = &["Valor", "valor_reembolso", "value", "amount"];

/// Column names requested on the command line; `None` means auto-detect.
#[derive(Debug, Clone, Default)]
pub struct ColumnSpec {
    pub key: Option<String>,
    pub desc: Option<String>,
    pub amount: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Columns {
    pub key: usize,
    pub desc: Option<usize>,
    pub amount: Option<usize>,
}

#[derive(Debug, Clone)]
pub enum ReferenceRow {
    Parsed(Vec<String>),
    Broken { line: u64, error: String },
}

#[derive(Debug)]
pub struct ReferenceTable {
    pub path: PathBuf,
    pub headers: Vec<String>,
    pub columns: Columns,
    pub rows: Vec<ReferenceRow>,
}

impl ReferenceTable {
    pub fn load(path: &Path, spec: &ColumnSpec) -> Result<Self, PipelineError> {
        let file = table::open_input(path)?;
        let mut reader = table::csv_reader(file, true);
        let headers: Vec<String> = reader
            .headers()
            .map_err(|source| PipelineError::Table {
                path: path.to_path_buf(),
                source,
            })?
            .iter()
            .map(|h| table::strip_bom(h).trim().to_string())
            .collect();
        let columns = resolve_columns(path, &headers, spec)?;

        let mut rows = Vec::new();
        for (i, result) in reader.records().enumerate() {
            match result {
                Ok(rec) => {
                    if rec.iter().all(|c| c.trim().is_empty()) {
                        continue;
                    }
                    rows.push(ReferenceRow::Parsed(rec.iter().map(String::from).collect()));
                }
                Err(e) => {
                    let line = e.position().map(|p| p.line()).unwrap_or(i as u64 + 2);
                    warn!("Unreadable reference row at line {}: {}", line, e);
                    rows.push(ReferenceRow::Broken {
                        line,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(ReferenceTable {
            path: path.to_path_buf(),
            headers,
            columns,
            rows,
        })
    }
}

fn resolve_columns(path: &Path, headers: &[String], spec: &ColumnSpec) -> Result<Columns, PipelineError> {
    let missing = |wanted: &str| PipelineError::MissingColumn {
        wanted: wanted.to_string(),
        path: path.to_path_buf(),
        headers: headers.join(", "),
    };

    let key = match &spec.key {
        Some(name) => find_column(headers, &[name.as_str()]).ok_or_else(|| missing(name))?,
        None => find_column(headers, KEY_CANDIDATES).ok_or_else(|| missing(&KEY_CANDIDATES.join("|")))?,
    };
    let desc = match &spec.desc {
        Some(name) => Some(find_column(headers, &[name.as_str()]).ok_or_else(|| missing(name))?),
        None => find_column(headers, DESC_CANDIDATES),
    };
    let amount = match &spec.amount {
        Some(name) => Some(find_column(headers, &[name.as_str()]).ok_or_else(|| missing(name))?),
        None => find_column(headers, AMOUNT_CANDIDATES),
    };

    Ok(Columns { key, desc, amount })
}

/// First candidate (in priority order) present in `headers`, case-insensitive.
pub fn find_column(headers: &[String], candidates: &[&str]) -> Option<usize> {
    candidates.iter().find_map(|c| {
        headers
            .iter()
            .position(|h| h.to_lowercase() == c.to_lowercase())
    })
}
