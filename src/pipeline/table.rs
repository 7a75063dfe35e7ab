//! In-memory table for the CSV export: named columns, row-major cells.

use crate::common::error::Result;
use serde_json::{Map, Number, Value};
use std::fmt;
use std::io::{Read, Write};
use tracing::warn;

/// Markers read as a missing value, on top of the empty cell.
const NULL_MARKERS: &[&str] = &["NULL", "null", "NaN", "nan", "N/A", "#N/A"];

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Text(String),
    Decimal(f64),
}

impl Cell {
    /// Parse a raw CSV field; blank fields and null markers become `Null`.
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || NULL_MARKERS.contains(&trimmed) {
            Cell::Null
        } else {
            Cell::Text(raw.to_string())
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Cell::Null => Value::Null,
            Cell::Text(s) => Value::String(s.clone()),
            Cell::Decimal(d) => Number::from_f64(*d).map(Value::Number).unwrap_or(Value::Null),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Text(s) => f.write_str(s),
            Cell::Decimal(d) => write!(f, "{d}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Build a table from column names and rows. Short rows are padded with
    /// `Null`; extra cells are dropped.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Cell::Null);
                row
            })
            .collect();
        Self { columns, rows }
    }

    /// Read a delimited text export with a header row. Ragged rows are
    /// accepted and padded or cut to the header width.
    pub fn from_csv_reader<R: Read>(reader: R, delimiter: u8) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let columns: Vec<String> = rdr
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                // exports saved from spreadsheet tools start with a BOM
                let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
                h.trim().to_string()
            })
            .collect();

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            if record.len() > columns.len() {
                warn!(
                    row = rows.len(),
                    cells = record.len(),
                    columns = columns.len(),
                    "Row is wider than the header, extra cells dropped"
                );
            }
            rows.push(record.iter().map(Cell::from_raw).collect());
        }
        Ok(Self::new(columns, rows))
    }

    pub fn from_csv_str(text: &str, delimiter: u8) -> Result<Self> {
        Self::from_csv_reader(text.as_bytes(), delimiter)
    }

    pub fn write_csv<W: Write>(&self, writer: W, delimiter: u8) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new().delimiter(delimiter).from_writer(writer);
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(|cell| cell.to_string()))?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Remove a column. Returns false if it was not there.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        self.columns.remove(idx);
        for row in &mut self.rows {
            row.remove(idx);
        }
        true
    }

    pub fn column_cells(&self, idx: usize) -> Vec<Cell> {
        self.rows.iter().map(|row| row[idx].clone()).collect()
    }

    /// Replace a whole column. `cells` must have one entry per row.
    pub fn set_column_cells(&mut self, idx: usize, cells: Vec<Cell>) {
        debug_assert_eq!(cells.len(), self.rows.len());
        for (row, cell) in self.rows.iter_mut().zip(cells) {
            row[idx] = cell;
        }
    }

    pub fn cells_mut(&mut self) -> impl Iterator<Item = &mut Cell> {
        self.rows.iter_mut().flat_map(|row| row.iter_mut())
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.rows.iter().flat_map(|row| row.iter())
    }

    /// One row as a JSON object keyed by column name.
    pub fn row_object(&self, row: usize) -> Option<Map<String, Value>> {
        let cells = self.rows.get(row)?;
        Some(
            self.columns
                .iter()
                .cloned()
                .zip(cells.iter().map(Cell::to_json))
                .collect(),
        )
    }
}
