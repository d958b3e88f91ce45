//! # Forecast Reconciler
//!
//! A library for reconciling three misaligned spreadsheet sources (a forecast plan,
//! purchase-order confirmations and end-customer sales) onto a common
//! (SKU, month) grain and scoring forecast accuracy on it.
//!
//! ## Core Concepts
//!
//! - **Column Classifier**: finds the SKU column, the month columns of a wide table,
//!   or the date/quantity columns of a transactional table, from a configurable
//!   token table
//! - **Reshaper**: melts wide tables and buckets transactional rows into
//!   `(SKU, month, quantity)` records, summing duplicates
//! - **Reconciler**: full outer join of the three record sets, zero-filled, with
//!   all-zero combinations dropped
//! - **Metric Engine**: Forecast Achievement Ratio, Bias and a five-way delivery
//!   status per row
//!
//! The engine does no I/O. Tables are loaded by the caller and handed over as
//! [`RawTable`]s; recoverable defects are collected into a [`RunReport`] instead of
//! failing the run.
//!
//! ## Example
//!
//! ```rust,ignore
//! use forecast_reconciler::*;
//!
//! let forecast = RawTable::from_rows(vec![
//!     vec!["SKU SAP", "Jan-2024", "Feb-2024"],
//!     vec!["1001", "100", "0"],
//! ]);
//! let actual = RawTable::from_rows(vec![
//!     vec!["Material", "PO Date", "Qty"],
//!     vec!["FG-1001", "2024-01-12", "90"],
//! ]);
//!
//! let output = process_sources(
//!     &ReconciliationConfig::default(),
//!     &SourceTables::new(forecast, actual),
//! )
//! .unwrap();
//!
//! assert_eq!(output.rows.len(), 1);
//! assert_eq!(output.rows[0].status, AccuracyStatus::Accurate);
//! ```

pub mod classifier;
pub mod error;
pub mod ingestion;
pub mod metrics;
pub mod period;
pub mod reconciler;
pub mod report;
pub mod reshaper;
pub mod schema;
pub mod utils;

pub use classifier::{Classification, ColumnClassifier, ColumnRef, KeyMatch, PeriodColumn};
pub use error::{ReconciliationError, Result};
pub use ingestion::{RawTable, SourceTables};
pub use metrics::{AccuracyStatus, MetricEngine, RowMetrics, ZERO_FORECAST_FAR};
pub use period::Period;
pub use reconciler::{reconcile, ReconciledRow, Reconciler};
pub use report::{ParseWarning, RunReport, SourceReport};
pub use reshaper::{LongRecord, LongTable, RecordKey, ReshapeOutcome, Reshaper};
pub use schema::*;

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

/// A normalized SKU / material identifier.
pub type EntityKey = String;

/// The engine's handoff to presentation layers: the reconciled table plus the
/// report of everything that was degraded on the way.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationOutput {
    pub rows: Vec<ReconciledRow>,
    pub report: RunReport,
}

impl ReconciliationOutput {
    /// Writes the flat table (`entity_key, period, forecast_qty, actual_qty,
    /// sales_qty, far, bias, status`) with a header line.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        if self.rows.is_empty() {
            csv_writer.write_record(OUTPUT_COLUMNS)?;
        }
        for row in &self.rows {
            csv_writer.serialize(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub const OUTPUT_COLUMNS: [&str; 8] = [
    "entity_key",
    "period",
    "forecast_qty",
    "actual_qty",
    "sales_qty",
    "far",
    "bias",
    "status",
];

pub struct ReconciliationProcessor;

impl ReconciliationProcessor {
    pub fn process(config: &ReconciliationConfig, sources: &SourceTables) -> Result<ReconciliationOutput> {
        config.validate()?;

        let classifier = ColumnClassifier::new(config)?;
        let reshaper = Reshaper::new(config);
        let mut report = RunReport::default();
        let mut tables: BTreeMap<SourceKind, LongTable> = BTreeMap::new();

        info!(
            "Reconciling sources: {}",
            SourceKind::ALL
                .iter()
                .filter(|k| sources.get(**k).is_some())
                .map(|k| k.name())
                .collect::<Vec<_>>()
                .join(", ")
        );

        for kind in SourceKind::ALL {
            let Some(table) = sources.get(kind) else {
                debug!("{}: not supplied", kind);
                continue;
            };

            if table.is_empty() {
                match config.empty_source_policy {
                    EmptySourcePolicy::Abort => {
                        return Err(ReconciliationError::EmptySource(kind.name().to_string()))
                    }
                    EmptySourcePolicy::ProceedPartial => {
                        warn!("{}: no data rows, continuing without it", kind);
                        report
                            .warnings
                            .push(ParseWarning::EmptySourceSkipped { source: kind });
                        continue;
                    }
                }
            }

            let classification =
                classifier.classify_with_overrides(kind, table.columns(), config.overrides_for(kind))?;
            let outcome = reshaper.reshape(table, &classification)?;

            report.sources.insert(
                kind,
                SourceReport {
                    layout: classification.layout,
                    key_column: classification.key_column.name.clone(),
                    key_column_fallback: classification.key_match == KeyMatch::Fallback,
                    period_columns: classification.period_columns.len(),
                    rows_read: outcome.rows_read,
                    rows_dropped: outcome.rows_dropped,
                    records: outcome.table.len(),
                    total_quantity: outcome.table.total_quantity(),
                },
            );
            report.warnings.extend(classification.warnings);
            report.warnings.extend(outcome.warnings);
            tables.insert(kind, outcome.table);
        }

        // Absent sources join as empty tables.
        let empty = LongTable::new();
        let forecast = tables.get(&SourceKind::Forecast).unwrap_or(&empty);
        let actual = tables.get(&SourceKind::Actual).unwrap_or(&empty);
        let sales = tables.get(&SourceKind::Sales).unwrap_or(&empty);

        let reconciler = Reconciler::new(MetricEngine::from_config(config));
        let rows = reconciler.reconcile(forecast, actual, sales);

        for row in &rows {
            *report.status_counts.entry(row.status).or_insert(0) += 1;
        }
        report.reconciled_rows = rows.len();

        info!(
            "Reconciled {} row(s) with {} warning(s)",
            rows.len(),
            report.warning_count()
        );
        for (status, count) in &report.status_counts {
            debug!("{}: {} row(s)", status, count);
        }

        Ok(ReconciliationOutput { rows, report })
    }

    /// Runs [`process`](Self::process) and then checks that no quantity was lost in
    /// the join: per source, the reconciled column total must equal the reshaped
    /// table total within `tolerance`.
    pub fn process_with_verification(
        config: &ReconciliationConfig,
        sources: &SourceTables,
        tolerance: f64,
    ) -> Result<ReconciliationOutput> {
        let output = Self::process(config, sources)?;
        verify_totals(&output, tolerance)?;
        Ok(output)
    }
}

pub fn process_sources(config: &ReconciliationConfig, sources: &SourceTables) -> Result<ReconciliationOutput> {
    ReconciliationProcessor::process(config, sources)
}

pub fn process_with_verification(
    config: &ReconciliationConfig,
    sources: &SourceTables,
    tolerance: f64,
) -> Result<ReconciliationOutput> {
    ReconciliationProcessor::process_with_verification(config, sources, tolerance)
}

fn verify_totals(output: &ReconciliationOutput, tolerance: f64) -> Result<()> {
    for (kind, source) in &output.report.sources {
        let reconciled: f64 = output
            .rows
            .iter()
            .map(|row| match kind {
                SourceKind::Forecast => row.forecast_qty,
                SourceKind::Actual => row.actual_qty,
                SourceKind::Sales => row.sales_qty,
            })
            .sum();

        if (reconciled - source.total_quantity).abs() > tolerance {
            return Err(ReconciliationError::TotalsMismatch {
                source_name: kind.name().to_string(),
                expected: source.total_quantity,
                reconciled,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forecast_table() -> RawTable {
        RawTable::from_rows(vec![
            vec!["SKU SAP", "Description", "2024-01", "2024-02"],
            vec!["X", "Widget", "100", "0"],
        ])
    }

    fn actual_table() -> RawTable {
        RawTable::from_rows(vec![
            vec!["Material", "Delivery Date", "Qty PO"],
            vec!["FG-X", "2024-01-20", "90"],
        ])
    }

    #[test]
    fn test_end_to_end_processing() {
        let sources = SourceTables::new(forecast_table(), actual_table());
        let output = process_sources(&ReconciliationConfig::default(), &sources).unwrap();

        assert_eq!(output.rows.len(), 1);
        let row = &output.rows[0];
        assert_eq!(row.entity_key, "X");
        assert_eq!(row.period.to_string(), "2024-01");
        assert_eq!(row.forecast_qty, 100.0);
        assert_eq!(row.actual_qty, 90.0);
        assert!((row.far - 0.9).abs() < 1e-12);
        assert_eq!(row.bias, 10.0);
        assert_eq!(row.status, AccuracyStatus::Accurate);

        assert_eq!(output.report.reconciled_rows, 1);
        assert_eq!(output.report.status_count(AccuracyStatus::Accurate), 1);
        assert_eq!(output.report.sources[&SourceKind::Forecast].layout, TableLayout::Wide);
        assert_eq!(output.report.sources[&SourceKind::Actual].layout, TableLayout::Long);
        assert!(!output.report.sources.contains_key(&SourceKind::Sales));
    }

    #[test]
    fn test_empty_source_aborts_by_default() {
        let empty_sales = RawTable::from_rows(vec![vec!["SKU", "Tanggal", "Qty"]]);
        let sources = SourceTables::new(forecast_table(), actual_table()).with_sales(empty_sales);

        let err = process_sources(&ReconciliationConfig::default(), &sources).unwrap_err();
        assert!(matches!(err, ReconciliationError::EmptySource(ref s) if s == "sales"));
    }

    #[test]
    fn test_empty_source_can_be_skipped() {
        let empty_sales = RawTable::from_rows(vec![vec!["SKU", "Tanggal", "Qty"]]);
        let sources = SourceTables::new(forecast_table(), actual_table()).with_sales(empty_sales);
        let config = ReconciliationConfig {
            empty_source_policy: EmptySourcePolicy::ProceedPartial,
            ..Default::default()
        };

        let output = process_sources(&config, &sources).unwrap();
        assert_eq!(output.rows.len(), 1);
        assert_eq!(
            output.report.warnings,
            vec![ParseWarning::EmptySourceSkipped {
                source: SourceKind::Sales
            }]
        );
    }

    #[test]
    fn test_schema_error_propagates() {
        let bad_actual = RawTable::from_rows(vec![vec!["Material", "Remarks"], vec!["X", "late"]]);
        let sources = SourceTables::new(forecast_table(), bad_actual);

        let err = process_sources(&ReconciliationConfig::default(), &sources).unwrap_err();
        match err {
            ReconciliationError::Schema {
                source_name,
                columns,
                ..
            } => {
                assert_eq!(source_name, "actual");
                assert_eq!(columns, vec!["Material", "Remarks"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_csv_output() {
        let sources = SourceTables::new(forecast_table(), actual_table());
        let output = process_sources(&ReconciliationConfig::default(), &sources).unwrap();
        let csv = output.to_csv_string().unwrap();

        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("entity_key,period,forecast_qty,actual_qty,sales_qty,far,bias,status")
        );
        assert_eq!(lines.next(), Some("X,2024-01,100.0,90.0,0.0,0.9,10.0,Accurate"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_csv_output_without_rows_has_header() {
        let output = ReconciliationOutput {
            rows: Vec::new(),
            report: RunReport::default(),
        };
        let csv = output.to_csv_string().unwrap();
        assert_eq!(csv.trim_end(), OUTPUT_COLUMNS.join(","));
    }

    #[test]
    fn test_verification_passes() {
        let sources = SourceTables::new(forecast_table(), actual_table());
        let output =
            process_with_verification(&ReconciliationConfig::default(), &sources, 1e-9).unwrap();
        assert_eq!(output.rows.len(), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ReconciliationConfig {
            accuracy_band: AccuracyBand { low: 2.0, high: 1.0 },
            ..Default::default()
        };
        let sources = SourceTables::new(forecast_table(), actual_table());
        assert!(matches!(
            process_sources(&config, &sources),
            Err(ReconciliationError::InvalidAccuracyBand { .. })
        ));
    }
}
