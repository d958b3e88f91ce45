use crate::metrics::{AccuracyStatus, MetricEngine};
use crate::period::Period;
use crate::reshaper::{LongTable, RecordKey};
use crate::EntityKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One (SKU, month) of the reconciled grain. Field order is the column order of
/// the exported table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledRow {
    pub entity_key: EntityKey,
    pub period: Period,
    pub forecast_qty: f64,
    pub actual_qty: f64,
    pub sales_qty: f64,
    pub far: f64,
    pub bias: f64,
    pub status: AccuracyStatus,
}

impl ReconciledRow {
    pub fn is_noise(&self) -> bool {
        self.forecast_qty == 0.0 && self.actual_qty == 0.0 && self.sales_qty == 0.0
    }
}

/// Full outer join of the three long tables on (entity, period), scored.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler {
    metrics: MetricEngine,
}

impl Reconciler {
    pub fn new(metrics: MetricEngine) -> Self {
        Self { metrics }
    }

    /// Rows come out sorted by (entity, period). Combinations missing from a table
    /// read as zero there; combinations that are zero everywhere are dropped.
    pub fn reconcile(
        &self,
        forecast: &LongTable,
        actual: &LongTable,
        sales: &LongTable,
    ) -> Vec<ReconciledRow> {
        let keys: BTreeSet<&RecordKey> = forecast
            .keys()
            .chain(actual.keys())
            .chain(sales.keys())
            .collect();

        let mut rows = Vec::with_capacity(keys.len());
        for key in keys {
            let forecast_qty = forecast.get(&key.entity, key.period);
            let actual_qty = actual.get(&key.entity, key.period);
            let sales_qty = sales.get(&key.entity, key.period);

            if forecast_qty == 0.0 && actual_qty == 0.0 && sales_qty == 0.0 {
                continue;
            }

            let scored = self.metrics.score(forecast_qty, actual_qty);
            rows.push(ReconciledRow {
                entity_key: key.entity.clone(),
                period: key.period,
                forecast_qty,
                actual_qty,
                sales_qty,
                far: scored.far,
                bias: scored.bias,
                status: scored.status,
            });
        }

        rows
    }
}

/// Reconciles with the default accuracy band and zero-forecast sentinel.
pub fn reconcile(forecast: &LongTable, actual: &LongTable, sales: &LongTable) -> Vec<ReconciledRow> {
    Reconciler::default().reconcile(forecast, actual, sales)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(year: i32, month: u32) -> Period {
        Period::new(year, month).unwrap()
    }

    fn table(entries: &[(&str, Period, f64)]) -> LongTable {
        let mut t = LongTable::new();
        for (entity, period, qty) in entries {
            t.add(*entity, *period, *qty);
        }
        t
    }

    #[test]
    fn test_outer_join_fills_zero() {
        let forecast = table(&[("A", p(2024, 1), 100.0)]);
        let actual = table(&[("B", p(2024, 1), 40.0)]);
        let sales = table(&[("C", p(2024, 2), 5.0)]);

        let rows = reconcile(&forecast, &actual, &sales);
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].entity_key, "A");
        assert_eq!(rows[0].actual_qty, 0.0);
        assert_eq!(rows[0].status, AccuracyStatus::MissedNoSupply);

        assert_eq!(rows[1].entity_key, "B");
        assert_eq!(rows[1].forecast_qty, 0.0);
        assert_eq!(rows[1].status, AccuracyStatus::UnforecastedDemand);

        assert_eq!(rows[2].entity_key, "C");
        assert_eq!(rows[2].sales_qty, 5.0);
    }

    #[test]
    fn test_all_zero_rows_are_dropped() {
        let forecast = table(&[("A", p(2024, 1), 100.0), ("A", p(2024, 2), 0.0)]);
        let actual = table(&[("A", p(2024, 1), 90.0), ("A", p(2024, 2), 0.0)]);
        let rows = reconcile(&forecast, &actual, &LongTable::new());

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].period, p(2024, 1));
        assert!(rows.iter().all(|r| !r.is_noise()));
    }

    #[test]
    fn test_sales_only_row_is_kept() {
        let sales = table(&[("S", p(2024, 3), 12.0)]);
        let rows = reconcile(&LongTable::new(), &LongTable::new(), &sales);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].far, 1.0);
        assert_eq!(rows[0].bias, 0.0);
    }

    #[test]
    fn test_no_sources() {
        let empty = LongTable::new();
        assert!(reconcile(&empty, &empty, &empty).is_empty());
    }

    #[test]
    fn test_keys_match_exactly() {
        let forecast = table(&[("sku-1", p(2024, 1), 10.0)]);
        let actual = table(&[("SKU-1", p(2024, 1), 10.0)]);
        let rows = reconcile(&forecast, &actual, &LongTable::new());
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_output_sorted_by_entity_then_period() {
        let forecast = table(&[
            ("B", p(2024, 2), 1.0),
            ("A", p(2024, 3), 1.0),
            ("B", p(2023, 12), 1.0),
            ("A", p(2024, 1), 1.0),
        ]);
        let rows = reconcile(&forecast, &LongTable::new(), &LongTable::new());
        let order: Vec<String> = rows
            .iter()
            .map(|r| format!("{}:{}", r.entity_key, r.period))
            .collect();
        assert_eq!(order, vec!["A:2024-01", "A:2024-03", "B:2023-12", "B:2024-02"]);
    }
}
