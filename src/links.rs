use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::table;

const INVISIBLE: &[char] = &['\u{feff}', '\u{200b}', '\u{00a0}'];
const HEADER_WORDS: &[&str] = &["data", "url", "link", "links"];
const SCHEMES: &[&str] = &["http://", "https://", "file://"];

/// Load the ordered URL list written by the QR reader.
///
/// Rows are `timestamp,data` (URL in the second column) or a bare URL.
/// Duplicates are kept; each occurrence is crawled.
pub fn load_links(path: &Path) -> Result<Vec<String>> {
    let file = table::open_input(path)?;
    let mut reader = table::csv_reader(file, false);
    let mut links = Vec::new();

    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read {}", path.display()))?;
        let cell = if record.len() >= 2 {
            record.get(1)
        } else {
            record.get(0)
        };
        let Some(value) = cell.map(clean_cell) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        if i == 0 && HEADER_WORDS.contains(&value.to_lowercase().as_str()) {
            continue;
        }
        links.push(value);
    }

    info!("Loaded {} links from {}", links.len(), path.display());
    Ok(links)
}

fn clean_cell(raw: &str) -> String {
    raw.replace(INVISIBLE, "").trim().to_string()
}

/// Repair a scanned URL: drop invisible characters, cut garbage before the
/// scheme, default to `http://`.
pub fn normalize_url(raw: &str) -> String {
    let mut u = clean_cell(raw);
    if u.is_empty() {
        return u;
    }

    let lower = u.to_ascii_lowercase();
    if let Some(idx) = SCHEMES.iter().filter_map(|s| lower.find(*s)).min() {
        if idx > 0 {
            u = u[idx..].to_string();
        }
    }

    if SCHEMES.iter().any(|s| u.to_ascii_lowercase().starts_with(*s)) {
        u
    } else {
        format!("http://{}", u)
    }
}
