//! Column typing and missing-value filling.
//!
//! Every column is classified once, numeric when each present value parses
//! as a finite number and textual otherwise. Missing numeric cells become `0`
//! and missing textual cells become [`UNKNOWN_TEXT`]. Each column keeps a
//! `filled` mask so later stages can still tell a defaulted cell from a
//! value that was actually supplied.

use std::fmt;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::reader::RawTable;

pub const UNKNOWN_TEXT: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Numeric,
    Textual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => parse_number(s),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Cell::Number(n) => format_number(*n),
            Cell::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    pub cells: Vec<Cell>,
    pub filled: Vec<bool>,
}

impl Column {
    /// The cell only if the source actually supplied it.
    pub fn present(&self, row: usize) -> Option<&Cell> {
        match self.filled.get(row) {
            Some(false) => self.cells.get(row),
            _ => None,
        }
    }

    pub fn filled_count(&self) -> usize {
        self.filled.iter().filter(|f| **f).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTable {
    columns: Vec<Column>,
    row_count: usize,
}

impl NormalizedTable {
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

pub fn normalize(raw: &RawTable) -> NormalizedTable {
    let columns = raw
        .headers
        .iter()
        .enumerate()
        .map(|(idx, name)| normalize_column(raw, idx, name))
        .collect::<Vec<_>>();
    for column in &columns {
        debug!(
            "Column '{}' typed {:?} with {} default(s)",
            column.name,
            column.kind,
            column.filled_count()
        );
    }
    info!(
        "Processed data shape: ({}, {})",
        raw.row_count(),
        columns.len()
    );
    NormalizedTable {
        columns,
        row_count: raw.row_count(),
    }
}

fn normalize_column(raw: &RawTable, idx: usize, name: &str) -> Column {
    let values = (0..raw.row_count())
        .map(|row| raw.cell(row, idx))
        .collect::<Vec<_>>();
    let kind = if values.iter().flatten().all(|v| parse_number(v).is_some()) {
        ColumnKind::Numeric
    } else {
        ColumnKind::Textual
    };
    let filled = values.iter().map(Option::is_none).collect();
    let cells = values
        .into_iter()
        .map(|value| match (kind, value) {
            (ColumnKind::Numeric, Some(v)) => Cell::Number(parse_number(v).unwrap_or_default()),
            (ColumnKind::Numeric, None) => Cell::Number(0.0),
            (ColumnKind::Textual, Some(v)) => Cell::Text(v.to_string()),
            (ColumnKind::Textual, None) => Cell::Text(UNKNOWN_TEXT.to_string()),
        })
        .collect();
    Column {
        name: name.to_string(),
        kind,
        cells,
        filled,
    }
}

pub fn parse_number(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|parsed| parsed.is_finite())
}

pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}
