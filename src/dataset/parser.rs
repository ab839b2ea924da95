//! CSV text → raw column-major table.

use std::collections::HashSet;

use csv::ReaderBuilder;

use crate::types::{AppError, AppResult};

const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b'\t', b';', b'|'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    pub has_header: bool,
    /// `None` sniffs the delimiter from the first line.
    pub delimiter: Option<u8>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: None,
        }
    }
}

/// Parsed cells before typing. `cells[c][r]` is column `c`, row `r`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub cells: Vec<Vec<String>>,
    pub row_count: usize,
}

/// Parses a user supplied delimiter. Accepts a single ASCII character or the
/// escapes `\t` / `tab`.
pub fn parse_delimiter(raw: Option<&str>) -> AppResult<Option<u8>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw {
        "" => Ok(None),
        "\\t" | "tab" => Ok(Some(b'\t')),
        s if s.len() == 1 && s.is_ascii() => Ok(Some(s.as_bytes()[0])),
        other => Err(AppError::InvalidRequest(format!(
            "delimiter must be a single ASCII character, got {other:?}"
        ))),
    }
}

/// Picks the candidate delimiter occurring most often (outside quotes) in
/// the first non-empty line. Falls back to a comma.
pub fn sniff_delimiter(text: &str) -> u8 {
    let Some(first_line) = text.lines().find(|l| !l.trim().is_empty()) else {
        return b',';
    };

    let mut counts = [0usize; CANDIDATE_DELIMITERS.len()];
    let mut in_quotes = false;
    for byte in first_line.bytes() {
        if byte == b'"' {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes {
            continue;
        }
        if let Some(pos) = CANDIDATE_DELIMITERS.iter().position(|d| *d == byte) {
            counts[pos] += 1;
        }
    }

    let mut best = 0;
    for (pos, count) in counts.iter().enumerate() {
        if *count > counts[best] {
            best = pos;
        }
    }
    CANDIDATE_DELIMITERS[best]
}

/// Parses a complete CSV document. Rows with a different field count than
/// the first record are a parse error.
pub fn parse_csv(text: &str, options: &ParseOptions) -> AppResult<RawTable> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    if text.trim().is_empty() {
        return Err(AppError::EmptyPayload);
    }

    let delimiter = options.delimiter.unwrap_or_else(|| sniff_delimiter(text));
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(false)
        .from_reader(text.as_bytes());

    let mut records = rdr.records();

    let header: Option<Vec<String>> = if options.has_header {
        match records.next() {
            Some(first) => {
                let first = first.map_err(|e| AppError::Parse(e.to_string()))?;
                Some(first.iter().map(|h| h.trim().to_string()).collect())
            }
            None => return Err(AppError::EmptyPayload),
        }
    } else {
        None
    };

    let mut cells: Vec<Vec<String>> = header
        .as_ref()
        .map(|h| vec![Vec::new(); h.len()])
        .unwrap_or_default();
    let mut row_count = 0usize;

    for record in records {
        let record = record.map_err(|e| AppError::Parse(e.to_string()))?;
        if cells.is_empty() && row_count == 0 {
            cells = vec![Vec::new(); record.len()];
        }
        for (idx, field) in record.iter().enumerate() {
            cells[idx].push(field.to_string());
        }
        row_count += 1;
    }

    let columns = match header {
        Some(raw) => unique_column_names(&raw),
        None => (0..cells.len()).map(|idx| format!("column_{}", idx + 1)).collect(),
    };

    if columns.is_empty() {
        return Err(AppError::Parse("no columns found".to_string()));
    }

    // Header-only documents still need one (empty) vector per column.
    if cells.len() < columns.len() {
        cells.resize(columns.len(), Vec::new());
    }

    Ok(RawTable {
        columns,
        cells,
        row_count,
    })
}

/// Blank headers become `column_N`; duplicates get `.1`, `.2`, ... suffixes.
fn unique_column_names(raw: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut names = Vec::with_capacity(raw.len());
    for (idx, name) in raw.iter().enumerate() {
        let base = if name.is_empty() {
            format!("column_{}", idx + 1)
        } else {
            name.clone()
        };
        let mut candidate = base.clone();
        let mut suffix = 1;
        while seen.contains(&candidate) {
            candidate = format!("{base}.{suffix}");
            suffix += 1;
        }
        seen.insert(candidate.clone());
        names.push(candidate);
    }
    names
}
