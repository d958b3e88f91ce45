use crate::error::{ReconciliationError, Result};
use crate::metrics::ZERO_FORECAST_FAR;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[schemars(description = "The forecast plan (ROFO), usually one column per month")]
    Forecast,

    #[schemars(description = "Purchase-order / inbound confirmations: the actual supply")]
    Actual,

    #[schemars(description = "End-customer sales. Optional in every run")]
    Sales,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::Forecast, SourceKind::Actual, SourceKind::Sales];

    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Forecast => "forecast",
            SourceKind::Actual => "actual",
            SourceKind::Sales => "sales",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum TableLayout {
    #[schemars(description = "One row per SKU, one column per calendar month")]
    Wide,

    #[schemars(description = "Transactional rows carrying an explicit date and quantity column")]
    Long,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum EmptySourcePolicy {
    #[schemars(description = "A present source with zero data rows fails the run with EmptySource")]
    #[default]
    Abort,

    #[schemars(
        description = "A present source with zero data rows is treated as absent and reported as a warning"
    )]
    ProceedPartial,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct AccuracyBand {
    #[schemars(description = "Lowest FAR still counted as Accurate (inclusive)")]
    pub low: f64,

    #[schemars(description = "Highest FAR still counted as Accurate (inclusive)")]
    pub high: f64,
}

impl Default for AccuracyBand {
    fn default() -> Self {
        Self { low: 0.8, high: 1.2 }
    }
}

impl AccuracyBand {
    pub fn contains(&self, far: f64) -> bool {
        far >= self.low && far <= self.high
    }

    pub fn validate(&self) -> Result<()> {
        let valid = self.low.is_finite()
            && self.high.is_finite()
            && self.low >= 0.0
            && self.low <= self.high;
        if !valid {
            return Err(ReconciliationError::InvalidAccuracyBand {
                low: self.low,
                high: self.high,
            });
        }
        Ok(())
    }
}

/// Caller-side corrections for one source when the heuristics pick wrong.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SourceOverrides {
    #[schemars(description = "Force the table layout instead of detecting it from the headers")]
    pub layout: Option<TableLayout>,

    #[schemars(description = "Exact name of the SKU column")]
    pub key_column: Option<String>,

    #[schemars(description = "Exact name of the date column (long layout only)")]
    pub date_column: Option<String>,

    #[schemars(description = "Exact name of the quantity column (long layout only)")]
    pub quantity_column: Option<String>,
}

impl SourceOverrides {
    pub fn is_empty(&self) -> bool {
        self.layout.is_none()
            && self.key_column.is_none()
            && self.date_column.is_none()
            && self.quantity_column.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ReconciliationConfig {
    #[schemars(
        description = "Tokens identifying the SKU column, in priority order. Matched as case-insensitive substrings of the column name."
    )]
    pub key_column_tokens: Vec<String>,

    #[schemars(
        description = "Regular expression a wide-layout month column header must match (month-name headers are accepted regardless)."
    )]
    pub period_header_pattern: String,

    #[schemars(
        description = "Quantity column names for long-layout tables, in priority order. Exact (case-insensitive) matches beat substring matches."
    )]
    pub quantity_column_candidates: Vec<String>,

    #[schemars(description = "Date column names for long-layout tables, in priority order.")]
    pub date_column_candidates: Vec<String>,

    #[schemars(
        description = "Prefixes removed from SKU values before matching (e.g. 'FG-' on supply-side exports). Case-insensitive, first match only."
    )]
    pub entity_prefix_strip: Vec<String>,

    #[schemars(description = "The FAR range classified as Accurate. Defaults to 0.8..=1.2")]
    pub accuracy_band: AccuracyBand,

    #[schemars(
        description = "FAR assigned when forecast is zero but actual is positive. Policy constant, 10.0 by default."
    )]
    pub zero_forecast_far: f64,

    #[schemars(description = "Character stripped from quantity cells as a thousands separator.")]
    pub thousands_separator: char,

    #[schemars(
        description = "chrono format strings tried, in order, on long-layout date cells before the built-in fallbacks."
    )]
    pub date_formats: Vec<String>,

    #[schemars(description = "What to do when a supplied source has zero data rows.")]
    pub empty_source_policy: EmptySourcePolicy,

    #[schemars(description = "Per-source overrides for the forecast table")]
    pub forecast_overrides: SourceOverrides,

    #[schemars(description = "Per-source overrides for the actual (PO) table")]
    pub actual_overrides: SourceOverrides,

    #[schemars(description = "Per-source overrides for the sales table")]
    pub sales_overrides: SourceOverrides,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            key_column_tokens: strings(&["SKU SAP", "Material", "SKU", "Kode Barang", "Item"]),
            period_header_pattern: r"\b20\d{2}\b".to_string(),
            quantity_column_candidates: strings(&[
                "Qty",
                "Quantity",
                "Actual",
                "Sales Qty",
                "PO Qty",
                "Qty PO",
                "Jumlah",
            ]),
            date_column_candidates: strings(&[
                "Date",
                "Tanggal",
                "PO Date",
                "Delivery Date",
                "Month",
                "Period",
                "Bulan",
            ]),
            entity_prefix_strip: strings(&["FG-"]),
            accuracy_band: AccuracyBand::default(),
            zero_forecast_far: ZERO_FORECAST_FAR,
            thousands_separator: ',',
            date_formats: strings(&[
                "%Y-%m-%d",
                "%Y-%m-%d %H:%M:%S",
                "%Y-%m-%dT%H:%M:%S",
                "%d/%m/%Y",
                "%d-%m-%Y",
                "%Y/%m/%d",
            ]),
            empty_source_policy: EmptySourcePolicy::Abort,
            forecast_overrides: SourceOverrides::default(),
            actual_overrides: SourceOverrides::default(),
            sales_overrides: SourceOverrides::default(),
        }
    }
}

impl ReconciliationConfig {
    pub fn overrides_for(&self, kind: SourceKind) -> &SourceOverrides {
        match kind {
            SourceKind::Forecast => &self.forecast_overrides,
            SourceKind::Actual => &self.actual_overrides,
            SourceKind::Sales => &self.sales_overrides,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.key_column_tokens.iter().all(|t| t.trim().is_empty()) {
            return Err(ReconciliationError::InvalidConfig(
                "key_column_tokens must contain at least one non-empty token".to_string(),
            ));
        }

        if self.quantity_column_candidates.is_empty() {
            return Err(ReconciliationError::InvalidConfig(
                "quantity_column_candidates must not be empty".to_string(),
            ));
        }

        if self.date_column_candidates.is_empty() {
            return Err(ReconciliationError::InvalidConfig(
                "date_column_candidates must not be empty".to_string(),
            ));
        }

        if !self.zero_forecast_far.is_finite() || self.zero_forecast_far < 0.0 {
            return Err(ReconciliationError::InvalidConfig(format!(
                "zero_forecast_far must be a finite non-negative number, got {}",
                self.zero_forecast_far
            )));
        }

        if self.thousands_separator.is_ascii_digit() {
            return Err(ReconciliationError::InvalidConfig(format!(
                "thousands_separator cannot be a digit ('{}')",
                self.thousands_separator
            )));
        }

        self.accuracy_band.validate()?;
        regex::Regex::new(&self.period_header_pattern)?;

        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ReconciliationConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
