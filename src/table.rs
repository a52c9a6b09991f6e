//! Table
//!
//! Raw, untyped tabular input. Cells are kept as read; missing cells are `None`.
//! Typing and validation of the modelled columns happens in
//! [`preprocessing`](crate::preprocessing).
use crate::constants::MISSING_TOKENS;
use crate::errors::KnnError;
use crate::utils::items_to_strings;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// A single raw column.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Values already known to be numeric.
    Numeric(Vec<Option<f64>>),
    /// Text cells, as read from a file.
    Text(Vec<Option<String>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            Column::Numeric(v) => v[row].map_or(true, |x| x.is_nan()),
            Column::Text(v) => v[row].is_none(),
        }
    }

    pub fn n_missing(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_missing(i)).count()
    }

    /// Read a cell as a number.
    ///
    /// `Ok(None)` for a missing cell, `Err` with the offending text when a present cell
    /// is not numeric.
    pub fn numeric_value(&self, row: usize) -> Result<Option<f64>, String> {
        match self {
            Column::Numeric(v) => Ok(v[row].filter(|x| !x.is_nan())),
            Column::Text(v) => match &v[row] {
                None => Ok(None),
                Some(s) => s.trim().parse::<f64>().map(Some).map_err(|_| s.clone()),
            },
        }
    }

    /// Read a cell as a category label. Numeric cells are rendered with `Display`.
    pub fn label_value(&self, row: usize) -> Option<String> {
        match self {
            Column::Numeric(v) => v[row].filter(|x| !x.is_nan()).map(|x| x.to_string()),
            Column::Text(v) => v[row].as_ref().map(|s| s.trim().to_string()),
        }
    }
}

/// Named columns of equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    names: Vec<String>,
    columns: Vec<Column>,
    rows: usize,
}

fn parse_cell(cell: &str) -> Option<String> {
    let trimmed = cell.trim();
    if trimmed.is_empty() || MISSING_TOKENS.contains(&trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl RawTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a numeric column, returning the extended table.
    pub fn with_numeric(self, name: &str, values: Vec<Option<f64>>) -> Result<Self, KnnError> {
        self.with_column(name, Column::Numeric(values))
    }

    /// Add a text column, returning the extended table.
    pub fn with_text(self, name: &str, values: Vec<Option<String>>) -> Result<Self, KnnError> {
        self.with_column(name, Column::Text(values))
    }

    pub fn with_column(mut self, name: &str, column: Column) -> Result<Self, KnnError> {
        if self.names.iter().any(|n| n == name) {
            return Err(KnnError::Schema(format!("Duplicate column {}.", name)));
        }
        if !self.columns.is_empty() && column.len() != self.rows {
            return Err(KnnError::Schema(format!(
                "Column {} has {} rows, expected {}.",
                name,
                column.len(),
                self.rows
            )));
        }
        self.rows = column.len();
        self.names.push(name.to_string());
        self.columns.push(column);
        Ok(self)
    }

    /// Read a table with a header row from any CSV source.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, KnnError> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let names: Vec<String> = rdr
            .headers()
            .map_err(|e| KnnError::UnableToRead(e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); names.len()];
        for (i, record) in rdr.records().enumerate() {
            let record = record.map_err(|e| match e.kind() {
                csv::ErrorKind::UnequalLengths { .. } => {
                    KnnError::Schema(format!("Row {} does not match the header: {}", i + 1, e))
                }
                _ => KnnError::UnableToRead(e.to_string()),
            })?;
            for (col, cell) in cells.iter_mut().zip(record.iter()) {
                col.push(parse_cell(cell));
            }
        }
        let mut table = RawTable::new();
        for (name, col) in names.iter().zip(cells) {
            table = table.with_text(name, col)?;
        }
        Ok(table)
    }

    /// Read a table with a header row from a CSV file.
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self, KnnError> {
        let file = File::open(path.as_ref())
            .map_err(|e| KnnError::UnableToRead(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_csv_reader(file)
    }

    pub fn n_rows(&self) -> usize {
        self.rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Result<&Column, KnnError> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.columns[i])
            .ok_or_else(|| {
                KnnError::Schema(format!(
                    "Required column {} is absent, available columns are {}",
                    name,
                    items_to_strings(self.names.iter().map(|s| s.as_str()).collect())
                ))
            })
    }

    /// Proportion of missing cells in a column, zero for an empty table.
    pub fn missing_fraction(&self, name: &str) -> Result<f64, KnnError> {
        let col = self.column(name)?;
        if self.rows == 0 {
            return Ok(0.0);
        }
        Ok(col.n_missing() as f64 / self.rows as f64)
    }
}

/// Write one named column of values as CSV, header first.
pub fn write_column_csv<W: Write>(writer: W, name: &str, values: &[f64]) -> Result<(), KnnError> {
    let mut wtr = csv::Writer::from_writer(writer);
    let to_err = |e: csv::Error| KnnError::UnableToWrite(e.to_string());
    wtr.write_record([name]).map_err(to_err)?;
    for v in values {
        wtr.write_record([v.to_string()]).map_err(to_err)?;
    }
    wtr.flush().map_err(|e| KnnError::UnableToWrite(e.to_string()))
}
