//! Source extract readers
//!
//! A source table is an ordered list of records, each a map from column name
//! to trimmed raw text. Tables are read from CSV or from a JSON array of
//! objects; the format is picked from the file extension.

use ahash::{AHashMap, AHashSet};
use serde_json::error::Category;
use serde_json::Value;
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;
use toolcat_core::{Error, Result};
use tracing::debug;

/// One row of a source table. Every value is trimmed; absent cells read as "".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRecord {
    values: AHashMap<String, String>,
}

impl SourceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter, the value is trimmed
    pub fn with(mut self, column: &str, value: &str) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: &str) {
        self.values.insert(column.trim().to_string(), value.trim().to_string());
    }

    pub fn get(&self, column: &str) -> &str {
        self.values.get(column).map(String::as_str).unwrap_or("")
    }
}

/// Column header plus records, in source order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceTable {
    pub columns: Vec<String>,
    pub records: Vec<SourceRecord>,
}

impl SourceTable {
    pub fn new(columns: Vec<String>, records: Vec<SourceRecord>) -> Self {
        Self { columns, records }
    }

    /// Table from in-memory rows; the header is the first-seen order of columns
    pub fn from_records(records: Vec<SourceRecord>) -> Self {
        let mut seen = BTreeSet::new();
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            let mut keys: Vec<&String> = record.values.keys().collect();
            keys.sort();
            for key in keys {
                if seen.insert(key.clone()) {
                    columns.push(key.clone());
                }
            }
        }
        Self { columns, records }
    }

    /// Read a CSV table with a header row
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| Error::SchemaConfiguration(format!("unreadable CSV header: {}", e)))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut seen = AHashSet::new();
        let repeated: Vec<&str> = columns
            .iter()
            .filter(|c| !seen.insert(c.as_str()))
            .map(String::as_str)
            .collect();
        if !repeated.is_empty() {
            return Err(Error::SchemaConfiguration(format!(
                "CSV header repeats columns: {}",
                repeated.join(", ")
            )));
        }

        let mut records = Vec::new();
        for (idx, row) in reader.records().enumerate() {
            let row = row.map_err(|e| Error::RecordIngestion {
                row: idx + 1,
                message: format!("unreadable CSV row: {}", e),
            })?;
            let mut record = SourceRecord::new();
            for (column, value) in columns.iter().zip(row.iter()) {
                record.insert(column, value);
            }
            records.push(record);
        }

        debug!("Read {} CSV records with {} columns", records.len(), columns.len());
        Ok(Self { columns, records })
    }

    /// Read a JSON array of flat objects. Numbers and booleans are
    /// stringified, `null` reads as empty.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let rows: Vec<serde_json::Map<String, Value>> = serde_json::from_str(json).map_err(|e| match e.classify() {
            Category::Data => Error::SchemaConfiguration(format!("source is not a JSON array of objects: {}", e)),
            Category::Syntax | Category::Eof | Category::Io => Error::Serialization(format!("malformed JSON source: {}", e)),
        })?;

        let mut records = Vec::with_capacity(rows.len());
        for (idx, row) in rows.into_iter().enumerate() {
            let mut record = SourceRecord::new();
            for (column, value) in row {
                let text = match value {
                    Value::Null => String::new(),
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    Value::Array(_) | Value::Object(_) => {
                        return Err(Error::RecordIngestion {
                            row: idx + 1,
                            message: format!("column '{}' holds a nested value", column),
                        })
                    }
                };
                record.insert(&column, &text);
            }
            records.push(record);
        }

        Ok(Self::from_records(records))
    }

    /// Read a table, choosing the format by extension (`.json` or CSV)
    pub fn from_path(path: &Path) -> Result<Self> {
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        if is_json {
            let text = std::fs::read_to_string(path)?;
            Self::from_json_str(&text)
        } else {
            let file = std::fs::File::open(path)?;
            Self::from_csv_reader(std::io::BufReader::new(file))
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Required columns absent from the header, in the order given
    pub fn missing_columns<'a>(&self, required: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        required.into_iter().filter(|c| !self.has_column(c)).collect()
    }
}

/// Everything a rebuild reads: the wide tool table and, for the direct
/// geography layout, the areas table
#[derive(Debug, Clone, Default)]
pub struct SourceExtract {
    pub tools: SourceTable,
    pub areas: Option<SourceTable>,
}

impl SourceExtract {
    pub fn new(tools: SourceTable) -> Self {
        Self { tools, areas: None }
    }

    pub fn with_areas(mut self, areas: SourceTable) -> Self {
        self.areas = Some(areas);
        self
    }

    pub fn from_paths(tools: &Path, areas: Option<&Path>) -> Result<Self> {
        let extract = Self::new(SourceTable::from_path(tools)?);
        match areas {
            Some(path) => Ok(extract.with_areas(SourceTable::from_path(path)?)),
            None => Ok(extract),
        }
    }
}
