use crate::error::Result;
use crate::schema::SourceKind;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// A table as it comes out of a spreadsheet export: a header plus string cells.
/// The engine only ever reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Builds a table from "all values" output where the first row is the header,
    /// the shape spreadsheet APIs return. An empty input gives an empty table.
    pub fn from_rows<I, R, S>(values: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut iter = values
            .into_iter()
            .map(|row| row.into_iter().map(Into::into).collect::<Vec<String>>());

        let columns = iter.next().unwrap_or_default();
        let rows = iter.collect();

        Self { columns, rows }
    }

    /// Reads a CSV export with a header line. Ragged rows are accepted.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let columns = csv_reader
            .headers()?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell at (row, column). Missing trailing cells of a short row read as "".
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(|c| c.as_str())
            .unwrap_or("")
    }
}

/// The three inputs of one run. Any of them may be absent.
#[derive(Debug, Clone, Default)]
pub struct SourceTables {
    pub forecast: Option<RawTable>,
    pub actual: Option<RawTable>,
    pub sales: Option<RawTable>,
}

impl SourceTables {
    pub fn new(forecast: RawTable, actual: RawTable) -> Self {
        Self {
            forecast: Some(forecast),
            actual: Some(actual),
            sales: None,
        }
    }

    pub fn with_sales(mut self, sales: RawTable) -> Self {
        self.sales = Some(sales);
        self
    }

    pub fn get(&self, kind: SourceKind) -> Option<&RawTable> {
        match kind {
            SourceKind::Forecast => self.forecast.as_ref(),
            SourceKind::Actual => self.actual.as_ref(),
            SourceKind::Sales => self.sales.as_ref(),
        }
    }
}
