use crate::metrics::AccuracyStatus;
use crate::schema::{SourceKind, TableLayout};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A recoverable input defect. Collected into the run report, never returned as
/// an error. Row numbers are 1-based data rows (the header is not counted).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseWarning {
    /// No key token matched; the first column was used.
    KeyColumnFallback { source: SourceKind, column: String },

    /// Header looked like a month but no period could be read from it; the column
    /// is left out of the reshape.
    UnparseablePeriodHeader { source: SourceKind, column: String },

    /// Date cell could not be read; the row was dropped.
    UnparseableDate {
        source: SourceKind,
        row: usize,
        value: String,
    },

    /// Quantity cell could not be read; counted as zero.
    UnparseableQuantity {
        source: SourceKind,
        row: usize,
        column: String,
        value: String,
    },

    /// Quantity was negative; clamped to zero.
    NegativeQuantityClamped {
        source: SourceKind,
        row: usize,
        column: String,
        value: String,
    },

    /// Key cell was empty after normalization; the row was dropped.
    EmptyEntityKey { source: SourceKind, row: usize },

    /// Source had no data rows and the run continued without it.
    EmptySourceSkipped { source: SourceKind },
}

impl ParseWarning {
    pub fn source(&self) -> SourceKind {
        match self {
            ParseWarning::KeyColumnFallback { source, .. }
            | ParseWarning::UnparseablePeriodHeader { source, .. }
            | ParseWarning::UnparseableDate { source, .. }
            | ParseWarning::UnparseableQuantity { source, .. }
            | ParseWarning::NegativeQuantityClamped { source, .. }
            | ParseWarning::EmptyEntityKey { source, .. }
            | ParseWarning::EmptySourceSkipped { source } => *source,
        }
    }
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::KeyColumnFallback { source, column } => write!(
                f,
                "{source}: no key column matched, falling back to first column '{column}'"
            ),
            ParseWarning::UnparseablePeriodHeader { source, column } => {
                write!(f, "{source}: cannot read a month from header '{column}'")
            }
            ParseWarning::UnparseableDate { source, row, value } => {
                write!(f, "{source} row {row}: cannot parse date '{value}', row dropped")
            }
            ParseWarning::UnparseableQuantity {
                source,
                row,
                column,
                value,
            } => write!(
                f,
                "{source} row {row}, column '{column}': cannot parse quantity '{value}', using 0"
            ),
            ParseWarning::NegativeQuantityClamped {
                source,
                row,
                column,
                value,
            } => write!(
                f,
                "{source} row {row}, column '{column}': negative quantity '{value}' clamped to 0"
            ),
            ParseWarning::EmptyEntityKey { source, row } => {
                write!(f, "{source} row {row}: empty SKU, row dropped")
            }
            ParseWarning::EmptySourceSkipped { source } => {
                write!(f, "{source}: no data rows, reconciled without it")
            }
        }
    }
}

/// What happened to one source during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    pub layout: TableLayout,
    pub key_column: String,
    pub key_column_fallback: bool,
    pub period_columns: usize,
    pub rows_read: usize,
    pub rows_dropped: usize,
    pub records: usize,
    pub total_quantity: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub sources: BTreeMap<SourceKind, SourceReport>,
    pub warnings: Vec<ParseWarning>,
    pub status_counts: BTreeMap<AccuracyStatus, usize>,
    pub reconciled_rows: usize,
}

impl RunReport {
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    pub fn warnings_for(&self, source: SourceKind) -> impl Iterator<Item = &ParseWarning> {
        self.warnings.iter().filter(move |w| w.source() == source)
    }

    pub fn status_count(&self, status: AccuracyStatus) -> usize {
        self.status_counts.get(&status).copied().unwrap_or(0)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
