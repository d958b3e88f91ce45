use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconciliationError {
    #[error("Schema error in source '{source_name}': {details} (columns seen: {columns:?})")]
    Schema {
        source_name: String,
        details: String,
        columns: Vec<String>,
    },

    #[error("Source '{0}' has no data rows")]
    EmptySource(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid accuracy band [{low}, {high}]: bounds must be finite, non-negative and low <= high")]
    InvalidAccuracyBand { low: f64, high: f64 },

    #[error("Invalid period header pattern: {0}")]
    InvalidPeriodPattern(#[from] regex::Error),

    #[error("Quantity lost in reconciliation for '{source_name}': source total {expected}, reconciled total {reconciled}")]
    TotalsMismatch {
        source_name: String,
        expected: f64,
        reconciled: f64,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ReconciliationError {
    pub(crate) fn schema(source_name: &str, details: impl Into<String>, columns: &[String]) -> Self {
        Self::Schema {
            source_name: source_name.to_string(),
            details: details.into(),
            columns: columns.to_vec(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconciliationError>;
