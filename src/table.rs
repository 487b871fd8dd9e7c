//! In-memory tabular datasets and their delimited-text form
//!
//! Datasets flow into a plugin's `train`, come back out of `synopsis`, and
//! aggregate rows come back out of `infer`. On disk they are plain CSV.

use std::fmt;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Serialize, Serializer};

use crate::error::{Result, RunnerError};

/// A single dataset value
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    /// Infer a cell from a raw delimited-text field
    pub fn infer(field: &str) -> Self {
        if field.is_empty() {
            return Cell::Null;
        }
        match field {
            "true" | "True" | "TRUE" => return Cell::Bool(true),
            "false" | "False" | "FALSE" => return Cell::Bool(false),
            _ => {}
        }
        if let Ok(i) = field.parse::<i64>() {
            return Cell::Int(i);
        }
        // Rust accepts "inf"/"nan" spellings that should stay text
        if field.bytes().any(|b| b.is_ascii_digit()) {
            if let Ok(f) = field.parse::<f64>() {
                return Cell::Float(f);
            }
        }
        Cell::Text(field.to_string())
    }

    fn to_field(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Float(f) if f.is_nan() => String::new(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Bool(b) => write!(f, "{b}"),
            Cell::Int(i) => write!(f, "{i}"),
            // Debug keeps the trailing ".0" so floats stay floats on re-read
            Cell::Float(v) => write!(f, "{v:?}"),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Cell::Null => serializer.serialize_none(),
            Cell::Bool(b) => serializer.serialize_bool(*b),
            Cell::Int(i) => serializer.serialize_i64(*i),
            Cell::Float(v) => serializer.serialize_f64(*v),
            Cell::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// Options for reading and writing delimited text
#[derive(Debug, Clone, Copy)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub infer_types: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            infer_types: true,
        }
    }
}

/// Ordered rows under named columns
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Create an empty table with the given columns
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table, checking every row has one cell per column
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self> {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(RunnerError::data(format!(
                "row {} has {} values but the table has {} columns",
                self.rows.len(),
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Parse delimited text with a header row
    pub fn read_csv<R: Read>(reader: R, options: CsvOptions) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(options.delimiter)
            .has_headers(true)
            .from_reader(reader);

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut table = Self::new(columns);

        for record in reader.records() {
            let record = record?;
            let row = record
                .iter()
                .map(|field| {
                    if options.infer_types {
                        Cell::infer(field)
                    } else if field.is_empty() {
                        Cell::Null
                    } else {
                        Cell::Text(field.to_string())
                    }
                })
                .collect();
            table.push_row(row)?;
        }

        if options.infer_types {
            table.widen_numeric_columns();
        }
        Ok(table)
    }

    pub fn read_csv_file<P: AsRef<Path>>(path: P, options: CsvOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| RunnerError::data(format!("cannot open {}: {e}", path.display())))?;
        Self::read_csv(file, options)
    }

    /// Write the table with a header row
    pub fn write_csv<W: Write>(&self, writer: W, options: CsvOptions) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(options.delimiter)
            .has_headers(false)
            .from_writer(writer);

        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(Cell::to_field))?;
        }
        writer.flush().map_err(RunnerError::data)?;
        Ok(())
    }

    pub fn write_csv_file<P: AsRef<Path>>(&self, path: P, options: CsvOptions) -> Result<()> {
        let path = path.as_ref();
        let file = std::fs::File::create(path)
            .map_err(|e| RunnerError::data(format!("cannot create {}: {e}", path.display())))?;
        self.write_csv(file, options)
    }

    /// Columns holding both integers and floats become all floats
    fn widen_numeric_columns(&mut self) {
        for col in 0..self.columns.len() {
            let mut has_float = false;
            let mut has_other = false;
            for row in &self.rows {
                match &row[col] {
                    Cell::Float(_) => has_float = true,
                    Cell::Int(_) | Cell::Null => {}
                    _ => has_other = true,
                }
            }
            if !has_float || has_other {
                continue;
            }
            for row in &mut self.rows {
                if let Cell::Int(i) = row[col] {
                    row[col] = Cell::Float(i as f64);
                }
            }
        }
    }
}

/// Write headerless rows, as produced by an aggregate query
pub fn write_rows<W: Write>(writer: W, rows: &[Vec<Cell>], options: CsvOptions) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(false)
        .flexible(true)
        .from_writer(writer);

    for row in rows {
        writer.write_record(row.iter().map(Cell::to_field))?;
    }
    writer.flush().map_err(RunnerError::data)?;
    Ok(())
}
