//! Tabular reader: decodes upload bytes and parses them into a [`RawTable`].
//!
//! The field delimiter is inferred by trying `;`, `,` and tab in that order
//! and accepting the first parse that yields more than one column. When none
//! does, the content is parsed once more with the default comma delimiter,
//! which may legitimately produce a single column.

use encoding_rs::Encoding;
use log::{debug, info, warn};

use crate::{
    error::{IncomeError, IncomeResult},
    io_utils,
};

pub const CANDIDATE_DELIMITERS: [u8; 3] = [b';', b',', b'\t'];

/// Tokens read as a missing cell in addition to the empty string.
pub const MISSING_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    /// Row-major cells; `None` marks a missing value.
    pub rows: Vec<Vec<Option<String>>>,
    pub delimiter: u8,
}

impl RawTable {
    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn require_column(&self, name: &str) -> IncomeResult<usize> {
        self.column_index(name)
            .ok_or_else(|| IncomeError::MissingColumn {
                column: name.to_string(),
                available: self.headers.clone(),
            })
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .and_then(|cell| cell.as_deref())
    }
}

pub fn is_missing_token(value: &str) -> bool {
    MISSING_TOKENS.contains(&value)
}

pub fn read_table(bytes: &[u8], encoding: &'static Encoding) -> IncomeResult<RawTable> {
    let text = io_utils::decode_bytes(bytes, encoding)?;
    for delimiter in CANDIDATE_DELIMITERS {
        match parse_with_delimiter(&text, delimiter) {
            Ok(table) if table.column_count() > 1 => {
                info!(
                    "Read CSV with delimiter '{}' ({} column(s), {} row(s))",
                    io_utils::printable_delimiter(delimiter),
                    table.column_count(),
                    table.row_count()
                );
                return Ok(table);
            }
            Ok(_) => debug!(
                "Delimiter '{}' produced a single column",
                io_utils::printable_delimiter(delimiter)
            ),
            Err(err) => warn!(
                "Failed to read with delimiter '{}': {err}",
                io_utils::printable_delimiter(delimiter)
            ),
        }
    }
    let table = parse_with_delimiter(&text, io_utils::DEFAULT_CSV_DELIMITER)?;
    info!("Read CSV with default delimiter");
    Ok(table)
}

pub fn parse_with_delimiter(text: &str, delimiter: u8) -> IncomeResult<RawTable> {
    let mut reader = io_utils::open_csv_reader(text.as_bytes(), delimiter);
    let headers = reader
        .headers()
        .map_err(|err| IncomeError::MalformedTable(err.to_string()))?
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    if headers.is_empty() || (headers.len() == 1 && headers[0].trim().is_empty()) {
        return Err(IncomeError::MalformedTable(
            "No columns to parse from file".to_string(),
        ));
    }
    let headers = dedupe_headers(headers);

    let mut rows = Vec::new();
    for (row_idx, record) in reader.records().enumerate() {
        let record = record.map_err(|err| IncomeError::MalformedTable(err.to_string()))?;
        if record.len() > headers.len() {
            return Err(IncomeError::MalformedTable(format!(
                "Expected {} fields in line {}, saw {}",
                headers.len(),
                row_idx + 2,
                record.len()
            )));
        }
        let mut cells = record
            .iter()
            .map(|field| (!is_missing_token(field)).then(|| field.to_string()))
            .collect::<Vec<_>>();
        cells.resize(headers.len(), None);
        rows.push(cells);
    }

    Ok(RawTable {
        headers,
        rows,
        delimiter,
    })
}

fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(headers.len());
    for header in headers {
        let mut candidate = header.clone();
        let mut suffix = 1;
        while seen.contains(&candidate) {
            candidate = format!("{header}.{suffix}");
            suffix += 1;
        }
        seen.push(candidate);
    }
    seen
}
