//! Header-driven CSV tables.
//!
//! Fields are looked up by column name, so feeds may order their columns
//! freely. Quoted fields may contain commas and doubled quotes. Blank lines
//! are skipped, and rows shorter than the header are padded with empty fields.

use std::collections::HashMap;

use csv::{ReaderBuilder, Trim};

use crate::models::types::Result;

const BYTE_ORDER_MARK: char = '\u{feff}';

#[derive(Clone, Debug, Default)]
pub struct CsvTable {
    headers: Vec<String>,
    columns: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(bytes);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches(BYTE_ORDER_MARK).to_string())
            .collect();

        let columns = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row: Vec<String> = record
                .iter()
                .take(headers.len())
                .map(str::to_string)
                .collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        Ok(Self {
            headers,
            columns,
            rows,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = CsvRow<'_>> {
        self.rows.iter().map(move |fields| CsvRow {
            columns: &self.columns,
            fields,
        })
    }
}

/// A borrowed view of one data row
#[derive(Clone, Copy, Debug)]
pub struct CsvRow<'a> {
    columns: &'a HashMap<String, usize>,
    fields: &'a [String],
}

impl<'a> CsvRow<'a> {
    /// Field by column name; `None` only when the table has no such column
    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.columns
            .get(column)
            .and_then(|&i| self.fields.get(i))
            .map(String::as_str)
    }

    /// Field by column name, treating empty values as absent
    pub fn non_empty(&self, column: &str) -> Option<&'a str> {
        self.get(column).filter(|v| !v.is_empty())
    }

    pub fn parse<T: std::str::FromStr>(&self, column: &str) -> Option<T> {
        self.non_empty(column).and_then(|v| v.parse().ok())
    }
}
