use crate::classifier::{Classification, ColumnRef};
use crate::error::{ReconciliationError, Result};
use crate::ingestion::RawTable;
use crate::period::Period;
use crate::report::ParseWarning;
use crate::schema::{ReconciliationConfig, SourceKind, TableLayout};
use crate::utils::{normalize_entity_key, parse_date_cell, parse_quantity, QuantityCell};
use crate::EntityKey;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RecordKey {
    pub entity: EntityKey,
    pub period: Period,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LongRecord {
    pub entity: EntityKey,
    pub period: Period,
    pub quantity: f64,
}

/// A set of long records, unique per (entity, period). Adding an existing key
/// sums into it; nothing is ever overwritten.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LongTable {
    records: BTreeMap<RecordKey, f64>,
}

impl LongTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entity: impl Into<EntityKey>, period: Period, quantity: f64) {
        let key = RecordKey {
            entity: entity.into(),
            period,
        };
        *self.records.entry(key).or_insert(0.0) += quantity;
    }

    /// Quantity for the combination, zero when absent.
    pub fn get(&self, entity: &str, period: Period) -> f64 {
        self.records
            .get(&RecordKey {
                entity: entity.to_string(),
                period,
            })
            .copied()
            .unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &RecordKey> {
        self.records.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RecordKey, f64)> {
        self.records.iter().map(|(k, v)| (k, *v))
    }

    pub fn records(&self) -> Vec<LongRecord> {
        self.records
            .iter()
            .map(|(key, quantity)| LongRecord {
                entity: key.entity.clone(),
                period: key.period,
                quantity: *quantity,
            })
            .collect()
    }

    pub fn total_quantity(&self) -> f64 {
        self.records.values().sum()
    }

    pub fn total_for_entity(&self, entity: &str) -> f64 {
        self.records
            .iter()
            .filter(|(k, _)| k.entity == entity)
            .map(|(_, v)| *v)
            .sum()
    }
}

impl FromIterator<LongRecord> for LongTable {
    fn from_iter<I: IntoIterator<Item = LongRecord>>(iter: I) -> Self {
        let mut table = LongTable::new();
        for record in iter {
            table.add(record.entity, record.period, record.quantity);
        }
        table
    }
}

#[derive(Debug, Clone)]
pub struct ReshapeOutcome {
    pub table: LongTable,
    pub warnings: Vec<ParseWarning>,
    pub rows_read: usize,
    pub rows_dropped: usize,
}

/// Turns classified raw tables into long tables.
pub struct Reshaper<'a> {
    config: &'a ReconciliationConfig,
}

impl<'a> Reshaper<'a> {
    pub fn new(config: &'a ReconciliationConfig) -> Self {
        Self { config }
    }

    pub fn reshape(&self, table: &RawTable, classification: &Classification) -> Result<ReshapeOutcome> {
        if table.is_empty() {
            return Err(ReconciliationError::EmptySource(
                classification.source.name().to_string(),
            ));
        }

        let outcome = match classification.layout {
            TableLayout::Wide => self.reshape_wide(table, classification),
            TableLayout::Long => self.reshape_long(table, classification)?,
        };

        debug!(
            "{}: {} row(s) read, {} dropped, {} record(s), {} warning(s)",
            classification.source,
            outcome.rows_read,
            outcome.rows_dropped,
            outcome.table.len(),
            outcome.warnings.len()
        );

        Ok(outcome)
    }

    /// Melts one row per SKU with one column per month into (SKU, month, qty).
    pub fn reshape_wide(&self, table: &RawTable, classification: &Classification) -> ReshapeOutcome {
        let source = classification.source;
        let mut out = LongTable::new();
        let mut warnings = Vec::new();
        let mut rows_dropped = 0;

        for row in 0..table.row_count() {
            let Some(entity) = self.entity_for_row(table, row, classification, &mut warnings) else {
                rows_dropped += 1;
                continue;
            };

            for column in &classification.period_columns {
                let raw = table.cell(row, column.index);
                let quantity = self.quantity(source, row, &column.name, raw, &mut warnings);
                out.add(entity.as_str(), column.period, quantity);
            }
        }

        ReshapeOutcome {
            table: out,
            warnings,
            rows_read: table.row_count(),
            rows_dropped,
        }
    }

    /// Buckets transactional rows into calendar months, summing duplicates.
    pub fn reshape_long(&self, table: &RawTable, classification: &Classification) -> Result<ReshapeOutcome> {
        let source = classification.source;
        let (date_column, quantity_column) = long_columns(table, classification)?;

        let mut out = LongTable::new();
        let mut warnings = Vec::new();
        let mut rows_dropped = 0;

        for row in 0..table.row_count() {
            let Some(entity) = self.entity_for_row(table, row, classification, &mut warnings) else {
                rows_dropped += 1;
                continue;
            };

            let raw_date = table.cell(row, date_column.index);
            let Some(period) = parse_date_cell(raw_date, &self.config.date_formats) else {
                warnings.push(ParseWarning::UnparseableDate {
                    source,
                    row: row + 1,
                    value: raw_date.to_string(),
                });
                rows_dropped += 1;
                continue;
            };

            let raw_quantity = table.cell(row, quantity_column.index);
            let quantity = self.quantity(source, row, &quantity_column.name, raw_quantity, &mut warnings);
            out.add(entity, period, quantity);
        }

        Ok(ReshapeOutcome {
            table: out,
            warnings,
            rows_read: table.row_count(),
            rows_dropped,
        })
    }

    /// Normalized key for a row, or `None` if the row must be dropped. Entirely
    /// blank rows (spreadsheet padding) are dropped without a warning.
    fn entity_for_row(
        &self,
        table: &RawTable,
        row: usize,
        classification: &Classification,
        warnings: &mut Vec<ParseWarning>,
    ) -> Option<EntityKey> {
        let raw = table.cell(row, classification.key_column.index);
        if let Some(key) = normalize_entity_key(raw, &self.config.entity_prefix_strip) {
            return Some(key);
        }

        let blank_row = table.rows()[row].iter().all(|c| c.trim().is_empty());
        if !blank_row {
            warnings.push(ParseWarning::EmptyEntityKey {
                source: classification.source,
                row: row + 1,
            });
        }
        None
    }

    fn quantity(
        &self,
        source: SourceKind,
        row: usize,
        column: &str,
        raw: &str,
        warnings: &mut Vec<ParseWarning>,
    ) -> f64 {
        let cell = parse_quantity(raw, self.config.thousands_separator);
        match cell {
            QuantityCell::Unparseable => warnings.push(ParseWarning::UnparseableQuantity {
                source,
                row: row + 1,
                column: column.to_string(),
                value: raw.to_string(),
            }),
            QuantityCell::Negative(_) => warnings.push(ParseWarning::NegativeQuantityClamped {
                source,
                row: row + 1,
                column: column.to_string(),
                value: raw.to_string(),
            }),
            QuantityCell::Blank | QuantityCell::Value(_) => {}
        }
        cell.quantity()
    }
}

fn long_columns<'c>(
    table: &RawTable,
    classification: &'c Classification,
) -> Result<(&'c ColumnRef, &'c ColumnRef)> {
    match (&classification.date_column, &classification.quantity_column) {
        (Some(date), Some(quantity)) => Ok((date, quantity)),
        _ => Err(ReconciliationError::schema(
            classification.source.name(),
            "long layout needs both a date and a quantity column",
            table.columns(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ColumnClassifier;

    fn p(year: i32, month: u32) -> Period {
        Period::new(year, month).unwrap()
    }

    fn reshape(kind: SourceKind, table: &RawTable) -> ReshapeOutcome {
        let config = ReconciliationConfig::default();
        let classification = ColumnClassifier::new(&config)
            .unwrap()
            .classify(kind, table.columns())
            .unwrap();
        Reshaper::new(&config).reshape(table, &classification).unwrap()
    }

    #[test]
    fn test_wide_melt() {
        let table = RawTable::from_rows(vec![
            vec!["SKU SAP", "Description", "Jan-2024", "Feb-2024"],
            vec!["FG-1001", "Widget", "1,200", "-"],
            vec!["1002", "Gadget", "", "35.5"],
        ]);
        let out = reshape(SourceKind::Forecast, &table);

        assert_eq!(out.table.get("1001", p(2024, 1)), 1200.0);
        assert_eq!(out.table.get("1001", p(2024, 2)), 0.0);
        assert_eq!(out.table.get("1002", p(2024, 2)), 35.5);
        assert_eq!(out.rows_read, 2);
        assert_eq!(out.rows_dropped, 0);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_wide_bad_cells_degrade_to_zero() {
        let table = RawTable::from_rows(vec![
            vec!["SKU", "2024-01-01", "2024-02-01"],
            vec!["A", "n/a", "-40"],
        ]);
        let out = reshape(SourceKind::Forecast, &table);

        assert_eq!(out.table.get("A", p(2024, 1)), 0.0);
        assert_eq!(out.table.get("A", p(2024, 2)), 0.0);
        assert_eq!(out.warnings.len(), 2);
        assert!(matches!(out.warnings[0], ParseWarning::UnparseableQuantity { row: 1, .. }));
        assert!(matches!(out.warnings[1], ParseWarning::NegativeQuantityClamped { row: 1, .. }));
    }

    #[test]
    fn test_wide_duplicate_sku_rows_are_summed() {
        let table = RawTable::from_rows(vec![
            vec!["SKU", "Jan-2024"],
            vec!["A", "10"],
            vec!["FG-A", "15"],
        ]);
        let out = reshape(SourceKind::Forecast, &table);
        assert_eq!(out.table.len(), 1);
        assert_eq!(out.table.get("A", p(2024, 1)), 25.0);
    }

    #[test]
    fn test_long_aggregates_by_month() {
        let table = RawTable::from_rows(vec![
            vec!["Material", "PO Date", "Qty"],
            vec!["FG-X", "2024-01-05", "30"],
            vec!["X", "2024-01-28", "20"],
            vec!["X", "2024-02-01", "7"],
        ]);
        let out = reshape(SourceKind::Actual, &table);

        assert_eq!(out.table.get("X", p(2024, 1)), 50.0);
        assert_eq!(out.table.get("X", p(2024, 2)), 7.0);
        assert_eq!(out.table.len(), 2);
    }

    #[test]
    fn test_long_bad_date_drops_row() {
        let table = RawTable::from_rows(vec![
            vec!["SKU", "Tanggal", "Qty"],
            vec!["X", "soon", "30"],
            vec!["X", "15/03/2024", "5"],
        ]);
        let out = reshape(SourceKind::Sales, &table);

        assert_eq!(out.rows_dropped, 1);
        assert_eq!(out.table.total_quantity(), 5.0);
        assert_eq!(
            out.warnings,
            vec![ParseWarning::UnparseableDate {
                source: SourceKind::Sales,
                row: 1,
                value: "soon".to_string()
            }]
        );
    }

    #[test]
    fn test_quarter_total_column_is_not_melted() {
        let config = ReconciliationConfig::default();
        let table = RawTable::from_rows(vec![
            vec!["SKU", "Jan-2024", "Feb-2024", "Mar-2024", "Q1 2024"],
            vec!["X", "100", "100", "100", "300"],
        ]);
        let classification = ColumnClassifier::new(&config)
            .unwrap()
            .classify(SourceKind::Forecast, table.columns())
            .unwrap();
        assert_eq!(
            classification.warnings,
            vec![ParseWarning::UnparseablePeriodHeader {
                source: SourceKind::Forecast,
                column: "Q1 2024".to_string()
            }]
        );

        let out = Reshaper::new(&config).reshape(&table, &classification).unwrap();
        assert_eq!(out.table.get("X", p(2024, 1)), 100.0);
        assert_eq!(out.table.total_quantity(), 300.0);
    }

    #[test]
    fn test_long_two_digit_year_is_dropped() {
        let table = RawTable::from_rows(vec![
            vec!["SKU", "Date", "Qty"],
            vec!["X", "05-01-24", "30"],
            vec!["X", "5/1/24", "20"],
            vec!["X", "05-01-2024", "7"],
        ]);
        let out = reshape(SourceKind::Actual, &table);

        assert_eq!(out.rows_dropped, 2);
        assert_eq!(out.table.len(), 1);
        assert_eq!(out.table.get("X", p(2024, 1)), 7.0);
        assert!(out
            .warnings
            .iter()
            .all(|w| matches!(w, ParseWarning::UnparseableDate { .. })));
        assert_eq!(out.warnings.len(), 2);
    }

    #[test]
    fn test_empty_keys_and_blank_rows() {
        let table = RawTable::from_rows(vec![
            vec!["SKU", "Jan-2024"],
            vec!["", "10"],
            vec!["", ""],
            vec!["B", "3"],
        ]);
        let out = reshape(SourceKind::Forecast, &table);
        assert_eq!(out.rows_dropped, 2);
        assert_eq!(
            out.warnings,
            vec![ParseWarning::EmptyEntityKey {
                source: SourceKind::Forecast,
                row: 1
            }]
        );
        assert_eq!(out.table.get("B", p(2024, 1)), 3.0);
    }

    #[test]
    fn test_empty_table_is_an_error() {
        let config = ReconciliationConfig::default();
        let table = RawTable::from_rows(vec![vec!["SKU", "Jan-2024"]]);
        let classification = ColumnClassifier::new(&config)
            .unwrap()
            .classify(SourceKind::Forecast, table.columns())
            .unwrap();
        let err = Reshaper::new(&config)
            .reshape(&table, &classification)
            .unwrap_err();
        assert!(matches!(err, ReconciliationError::EmptySource(ref s) if s == "forecast"));
    }

    #[test]
    fn test_reshape_is_deterministic() {
        let table = RawTable::from_rows(vec![
            vec!["SKU", "Jan-2024", "Feb-2024", "Mar-2024"],
            vec!["C", "1", "2", "3"],
            vec!["A", "4", "x", "6"],
            vec!["B", "7", "8", "-9"],
        ]);
        let first = reshape(SourceKind::Forecast, &table);
        let second = reshape(SourceKind::Forecast, &table);
        assert_eq!(first.table, second.table);
        assert_eq!(first.warnings, second.warnings);
    }

    #[test]
    fn test_long_table_from_records() {
        let table: LongTable = vec![
            LongRecord {
                entity: "X".to_string(),
                period: p(2024, 1),
                quantity: 30.0,
            },
            LongRecord {
                entity: "X".to_string(),
                period: p(2024, 1),
                quantity: 20.0,
            },
        ]
        .into_iter()
        .collect();
        assert_eq!(table.len(), 1);
        assert_eq!(table.records()[0].quantity, 50.0);
        assert_eq!(table.total_for_entity("X"), 50.0);
    }
}
