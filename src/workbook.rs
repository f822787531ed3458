//! Formatted `.xlsx` copy of a results table: bold header, frozen first row,
//! autofilter, and a fill colour per row.

use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, XlsxError};
use tracing::info;

use crate::compare::classify::Label;
use crate::compare::reference::{find_column, AMOUNT_CANDIDATES};
use crate::compare::{NOTE_CHECK_NUMBER, NOTE_CHECK_VALUE};
use crate::error::PipelineError;
use crate::record::Amount;
use crate::table;

const SHEET_NAME: &str = "resultados";

const HEADER_FILL: u32 = 0xD9E1F2;
pub const FILL_OK: u32 = 0xC6EFCE;
pub const FILL_NOT_FOUND: u32 = 0xFFC7CE;
pub const FILL_CHECK: u32 = 0xFFEB9C;
pub const FILL_HOTEL: u32 = 0xF4CCCC;
pub const FILL_NO_VALUE: u32 = 0xFCE4D6;
pub const FILL_SERIOUS: u32 = 0xF8696B;

/// Reference vs receipt gap that turns a row red on its own.
const SERIOUS_DIFF: Amount = Amount::from_cents(5_00);

const MIN_WIDTH: usize = 10;
const MAX_WIDTH: usize = 50;

/// Fill colour for one results row, `None` for no fill.
///
/// A row flagged for both number and value review, or whose amounts are
/// more than 5.00 apart, is red. Any other review flag is yellow. Otherwise
/// the label picks the colour.
pub fn row_fill(label: &str, observacao: &str, reference: Option<Amount>, matched: Option<Amount>) -> Option<u32> {
    let number_flag = observacao.contains(NOTE_CHECK_NUMBER);
    let value_flag = observacao.contains(NOTE_CHECK_VALUE);
    if number_flag && value_flag {
        return Some(FILL_SERIOUS);
    }
    if let (Some(a), Some(b)) = (reference, matched) {
        if a.abs_diff(b) > SERIOUS_DIFF {
            return Some(FILL_SERIOUS);
        }
    }
    if number_flag || value_flag {
        return Some(FILL_CHECK);
    }

    match Label::from_name(label.trim())? {
        Label::Almoco | Label::Janta => Some(FILL_OK),
        Label::NaoEncontrado => Some(FILL_NOT_FOUND),
        Label::Hotel => Some(FILL_HOTEL),
        Label::SemValor => Some(FILL_NO_VALUE),
        Label::Outro | Label::Erro => None,
    }
}

/// `resultados-N.csv` → `resultados-N.xlsx` next to it.
pub fn default_path(results: &Path) -> PathBuf {
    results.with_extension("xlsx")
}

/// Read `results` and write the formatted workbook to `out`.
pub fn write_workbook(results: &Path, out: &Path) -> Result<PathBuf, PipelineError> {
    let file = table::open_input(results)?;
    let mut reader = table::csv_reader(file, true);
    let table_err = |source| PipelineError::Table {
        path: results.to_path_buf(),
        source,
    };
    let headers: Vec<String> = reader
        .headers()
        .map_err(table_err)?
        .iter()
        .map(|h| table::strip_bom(h).trim().to_string())
        .collect();

    let label_i = find_column(&headers, &["classificacao"]).ok_or_else(|| PipelineError::MissingColumn {
        wanted: "classificacao".to_string(),
        path: results.to_path_buf(),
        headers: headers.join(", "),
    })?;
    let obs_i = find_column(&headers, &["observacao"]);
    let matched_i = find_column(&headers, &["matched_valor"]);
    let reference_i = find_column(&headers, AMOUNT_CANDIDATES);

    let mut rows: Vec<Vec<String>> = Vec::new();
    for result in reader.records() {
        let rec = result.map_err(table_err)?;
        if rec.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        rows.push(rec.iter().map(String::from).collect());
    }

    let xlsx_err = |e: XlsxError| match e {
        XlsxError::IoError(source) => PipelineError::OutputLocked {
            path: out.to_path_buf(),
            source,
        },
        other => PipelineError::Workbook {
            path: out.to_path_buf(),
            source: other,
        },
    };

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME).map_err(xlsx_err)?;

    let header_format = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(HEADER_FILL))
        .set_align(FormatAlign::Center);
    for (c, h) in headers.iter().enumerate() {
        sheet
            .write_string_with_format(0, c as u16, h, &header_format)
            .map_err(xlsx_err)?;
    }

    for (r, cells) in rows.iter().enumerate() {
        let cell = |i: Option<usize>| i.and_then(|i| cells.get(i)).map(String::as_str).unwrap_or_default();
        let fill = row_fill(
            cell(Some(label_i)),
            cell(obs_i),
            cell(reference_i).parse().ok(),
            cell(matched_i).parse().ok(),
        );
        let format = fill.map(|rgb| Format::new().set_background_color(Color::RGB(rgb)));
        let row = (r + 1) as u32;
        for c in 0..headers.len() {
            let value = cells.get(c).map(String::as_str).unwrap_or_default();
            let written = match &format {
                Some(f) => sheet.write_string_with_format(row, c as u16, value, f),
                None => sheet.write_string(row, c as u16, value),
            };
            written.map_err(xlsx_err)?;
        }
    }

    for c in 0..headers.len() {
        let longest = std::iter::once(&headers[c])
            .chain(rows.iter().filter_map(|r| r.get(c)))
            .map(|s| s.chars().count())
            .max()
            .unwrap_or(0);
        let width = (longest + 2).clamp(MIN_WIDTH, MAX_WIDTH);
        sheet.set_column_width(c as u16, width as f64).map_err(xlsx_err)?;
    }
    sheet.set_freeze_panes(1, 0).map_err(xlsx_err)?;
    if !headers.is_empty() {
        sheet
            .autofilter(0, 0, rows.len() as u32, (headers.len() - 1) as u16)
            .map_err(xlsx_err)?;
    }

    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            table::ensure_dir(parent)?;
        }
    }
    workbook.save(out).map_err(xlsx_err)?;
    info!("Wrote {} rows to {}", rows.len(), out.display());
    Ok(out.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn amt(s: &str) -> Option<Amount> {
        Some(s.parse().unwrap())
    }

    #[test]
    fn fill_per_label() {
        assert_eq!(row_fill("ALMOCO", "OK", None, None), Some(FILL_OK));
        assert_eq!(row_fill("JANTA", "OK", None, None), Some(FILL_OK));
        assert_eq!(row_fill("HOTEL", "OK", None, None), Some(FILL_HOTEL));
        assert_eq!(row_fill("SEM_VALOR", "OK", None, None), Some(FILL_NO_VALUE));
        assert_eq!(row_fill("NAO_ENCONTRADO", "NAO_ENCONTRADO", None, None), Some(FILL_NOT_FOUND));
        assert_eq!(row_fill("OUTRO", "OK", None, None), None);
        assert_eq!(row_fill("ERRO", "linha 3: x", None, None), None);
        assert_eq!(row_fill("", "", None, None), None);
    }

    #[test]
    fn single_review_flag_is_yellow() {
        assert_eq!(row_fill("ALMOCO", "OK | VERIFICAR_VALOR", amt("48,90"), amt("50,00")), Some(FILL_CHECK));
        assert_eq!(row_fill("HOTEL", "VERIFICAR_NUMNOTA (dif=2)", None, None), Some(FILL_CHECK));
    }

    #[test]
    fn serious_rows_are_red() {
        assert_eq!(
            row_fill("ALMOCO", "VERIFICAR_NUMNOTA (dif=2) | VERIFICAR_VALOR", None, None),
            Some(FILL_SERIOUS)
        );
        assert_eq!(row_fill("ALMOCO", "OK | VERIFICAR_VALOR", amt("40,00"), amt("45,01")), Some(FILL_SERIOUS));
        // exactly 5.00 apart is not serious
        assert_eq!(row_fill("ALMOCO", "OK | VERIFICAR_VALOR", amt("40,00"), amt("45,00")), Some(FILL_CHECK));
    }

    #[test]
    fn writes_workbook_next_to_results() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("resultados-1.csv");
        fs::write(
            &results,
            "numNotaFiscal,Valor,classificacao,matched_num,matched_valor,matched_emissao,observacao\n\
             1,45.00,ALMOCO,1,45.00,05/03/2024 12:00:00,OK\n\
             2,10.00,NAO_ENCONTRADO,,,,NAO_ENCONTRADO\n",
        )
        .unwrap();

        let out = write_workbook(&results, &default_path(&results)).unwrap();
        assert_eq!(out, dir.path().join("resultados-1.xlsx"));
        let bytes = fs::read(&out).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn results_without_label_column() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("r.csv");
        fs::write(&results, "a,b\n1,2\n").unwrap();
        let err = write_workbook(&results, &dir.path().join("r.xlsx")).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { .. }));
    }

    #[test]
    fn missing_results_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_workbook(&dir.path().join("nope.csv"), &dir.path().join("nope.xlsx")).unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput(_)));
    }
}
