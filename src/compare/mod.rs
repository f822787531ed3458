pub mod classify;
pub mod reference;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::record::Amount;
use crate::table::{self, RESULTS_PREFIX};
use classify::Label;
use reference::{ColumnSpec, ReferenceRow, ReferenceTable};

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

pub const RESULT_HEADERS: [&str; 5] = [
    "classificacao",
    "matched_num",
    "matched_valor",
    "matched_emissao",
    "observacao",
];

/// Reference vs receipt amounts further apart than this are flagged.
const VALUE_TOLERANCE: Amount = Amount::from_cents(70);

const NOTE_OK: &str = "OK";
pub const NOTE_CHECK_VALUE: &str = "VERIFICAR_VALOR";
pub const NOTE_CHECK_NUMBER: &str = "VERIFICAR_NUMNOTA";

/// A row of the extracted table as seen by the comparator. The amount is
/// optional here because the table may have been edited by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRow {
    pub numero: String,
    pub emissao: String,
    pub valor: Option<Amount>,
}

#[derive(Debug, Clone)]
pub struct ComparisonResult {
    pub cells: Vec<String>,
    pub label: Label,
    pub matched: Option<MatchedRow>,
    pub observacao: String,
}

impl ComparisonResult {
    fn to_record(&self, width: usize) -> Vec<String> {
        let mut out = self.cells.clone();
        out.resize(width, String::new());
        let (num, valor, emissao) = match &self.matched {
            Some(m) => (
                m.numero.clone(),
                m.valor.map(|v| v.to_string()).unwrap_or_default(),
                m.emissao.clone(),
            ),
            None => Default::default(),
        };
        out.extend([self.label.to_string(), num, valor, emissao, self.observacao.clone()]);
        out
    }
}

pub struct CompareOptions {
    pub reference: PathBuf,
    /// Explicit extracted table; newest `extraidos-N.csv` in `out_dir` otherwise.
    pub extracted: Option<PathBuf>,
    pub out_dir: PathBuf,
    pub columns: ColumnSpec,
    /// Nearest-number fallback distance; 0 disables it.
    pub max_diff: u64,
}

pub struct CompareOutput {
    pub path: PathBuf,
    pub extracted: PathBuf,
    pub results: Vec<ComparisonResult>,
    pub counts: BTreeMap<Label, usize>,
}

/// Join the reference table with an extracted table and write `resultados-N.csv`.
pub fn run(opts: &CompareOptions) -> Result<CompareOutput, PipelineError> {
    let reference = ReferenceTable::load(&opts.reference, &opts.columns)?;
    let extracted_path = match &opts.extracted {
        Some(p) => p.clone(),
        None => table::latest_extracted(&opts.out_dir)?,
    };
    let extracted = load_extracted(&extracted_path)?;
    info!(
        "Loaded {} reference rows from {} and {} extracted rows from {}",
        reference.rows.len(),
        reference.path.display(),
        extracted.len(),
        extracted_path.display()
    );

    let results = compare(&reference, &extracted, opts.max_diff);

    table::ensure_dir(&opts.out_dir)?;
    let n = table::next_seq(&opts.out_dir, RESULTS_PREFIX, "csv");
    let path = table::seq_path(&opts.out_dir, RESULTS_PREFIX, n, "csv");
    write_results(&path, &reference.headers, &results)?;

    let mut counts = BTreeMap::new();
    for r in &results {
        *counts.entry(r.label).or_insert(0) += 1;
    }

    Ok(CompareOutput {
        path,
        extracted: extracted_path,
        results,
        counts,
    })
}

/// One result per reference row, in reference order.
pub fn compare(reference: &ReferenceTable, extracted: &[MatchedRow], max_diff: u64) -> Vec<ComparisonResult> {
    let index = Index::build(extracted, max_diff);
    let cols = reference.columns;

    reference
        .rows
        .iter()
        .map(|row| {
            let cells = match row {
                ReferenceRow::Parsed(cells) => cells,
                ReferenceRow::Broken { line, error } => {
                    return ComparisonResult {
                        cells: Vec::new(),
                        label: Label::Erro,
                        matched: None,
                        observacao: format!("linha {}: {}", line, error),
                    };
                }
            };

            let key = cells.get(cols.key).map(|k| k.trim()).unwrap_or_default();
            if key.is_empty() {
                return ComparisonResult {
                    cells: cells.clone(),
                    label: Label::Erro,
                    matched: None,
                    observacao: format!("{} vazio", reference.headers[cols.key]),
                };
            }

            let Some((matched, diff)) = index.find(key) else {
                return ComparisonResult {
                    cells: cells.clone(),
                    label: Label::NaoEncontrado,
                    matched: None,
                    observacao: Label::NaoEncontrado.to_string(),
                };
            };

            let desc = cols.desc.and_then(|i| cells.get(i)).map(String::as_str);
            let (label, hour_note) = classify::classify(desc, matched.valor, &matched.emissao);

            let mut notes = vec![if diff == 0 {
                NOTE_OK.to_string()
            } else {
                format!("{} (dif={})", NOTE_CHECK_NUMBER, diff)
            }];
            notes.extend(hour_note.map(String::from));
            let ref_amount = cols
                .amount
                .and_then(|i| cells.get(i))
                .and_then(|v| v.parse::<Amount>().ok());
            if let (Some(a), Some(b)) = (ref_amount, matched.valor) {
                if a.abs_diff(b) > VALUE_TOLERANCE {
                    notes.push(NOTE_CHECK_VALUE.to_string());
                }
            }

            ComparisonResult {
                cells: cells.clone(),
                label,
                matched: Some(matched.clone()),
                observacao: notes.join(" | "),
            }
        })
        .collect()
}

/// Lookup from document number to extracted row. Later rows overwrite
/// earlier ones with the same number.
struct Index<'a> {
    exact: HashMap<&'a str, &'a MatchedRow>,
    numeric: Vec<(u64, &'a MatchedRow)>,
    max_diff: u64,
}

impl<'a> Index<'a> {
    fn build(rows: &'a [MatchedRow], max_diff: u64) -> Self {
        let mut exact = HashMap::with_capacity(rows.len());
        for r in rows {
            exact.insert(r.numero.trim(), r);
        }
        let numeric = if max_diff > 0 {
            rows.iter()
                .filter_map(|r| leading_number(&r.numero).map(|n| (n, r)))
                .collect()
        } else {
            Vec::new()
        };
        Index {
            exact,
            numeric,
            max_diff,
        }
    }

    /// Exact match, else (if enabled) the numerically closest row within `max_diff`.
    fn find(&self, key: &str) -> Option<(&'a MatchedRow, u64)> {
        if let Some(r) = self.exact.get(key) {
            return Some((*r, 0));
        }
        if self.max_diff == 0 {
            return None;
        }
        let target = leading_number(key)?;
        let mut best: Option<(&'a MatchedRow, u64)> = None;
        for (n, r) in &self.numeric {
            let d = n.abs_diff(target);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((*r, d));
            }
        }
        best.filter(|(_, d)| *d <= self.max_diff)
    }
}

fn leading_number(s: &str) -> Option<u64> {
    DIGITS_RE.find(s).and_then(|m| m.as_str().parse().ok())
}

/// Read an extracted table. Rows without a number are skipped; a bad amount
/// is kept as missing so the row still classifies (as SEM_VALOR).
pub fn load_extracted(path: &Path) -> Result<Vec<MatchedRow>, PipelineError> {
    let file = table::open_input(path)?;
    let mut reader = table::csv_reader(file, true);
    let table_err = |source| PipelineError::Table {
        path: path.to_path_buf(),
        source,
    };
    let headers: Vec<String> = reader
        .headers()
        .map_err(table_err)?
        .iter()
        .map(|h| table::strip_bom(h).trim().to_string())
        .collect();
    let col = |name: &str| {
        reference::find_column(&headers, &[name]).ok_or_else(|| PipelineError::MissingColumn {
            wanted: name.to_string(),
            path: path.to_path_buf(),
            headers: headers.join(", "),
        })
    };
    let (num_i, em_i, val_i) = (col("numero")?, col("emissao")?, col("valor_pagar")?);

    let mut rows = Vec::new();
    for result in reader.records() {
        let rec = match result {
            Ok(rec) => rec,
            Err(e) => {
                warn!("Skipping unreadable row in {}: {}", path.display(), e);
                continue;
            }
        };
        let numero = rec.get(num_i).unwrap_or_default().trim();
        if numero.is_empty() {
            continue;
        }
        let raw_valor = rec.get(val_i).unwrap_or_default();
        let valor = match raw_valor.parse::<Amount>() {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Row {} in {} has no usable amount ({:?}): {}", numero, path.display(), raw_valor, e);
                None
            }
        };
        rows.push(MatchedRow {
            numero: numero.to_string(),
            emissao: rec.get(em_i).unwrap_or_default().trim().to_string(),
            valor,
        });
    }
    Ok(rows)
}

fn write_results(path: &Path, headers: &[String], results: &[ComparisonResult]) -> Result<(), PipelineError> {
    let locked = |source| PipelineError::OutputLocked {
        path: path.to_path_buf(),
        source,
    };
    let csv_err = |e: csv::Error| match e.into_kind() {
        csv::ErrorKind::Io(source) => locked(source),
        other => locked(std::io::Error::other(format!("{:?}", other))),
    };

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(table::create_output(path)?);
    let header: Vec<&str> = headers
        .iter()
        .map(String::as_str)
        .chain(RESULT_HEADERS)
        .collect();
    wtr.write_record(&header).map_err(csv_err)?;
    for r in results {
        wtr.write_record(r.to_record(headers.len())).map_err(csv_err)?;
    }
    wtr.flush().map_err(locked)?;
    Ok(())
}
