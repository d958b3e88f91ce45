use crate::schema::{AccuracyBand, ReconciliationConfig};
use serde::{Deserialize, Serialize};
use std::fmt;

/// FAR assigned to zero-forecast rows with positive actuals.
pub const ZERO_FORECAST_FAR: f64 = 10.0;

/// Delivery status of one (SKU, month). Variants are listed in the order the
/// rules are evaluated; the first one that applies wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AccuracyStatus {
    /// Nothing was forecast but supply arrived.
    UnforecastedDemand,
    /// Forecast was positive but nothing arrived.
    MissedNoSupply,
    Accurate,
    UnderDelivery,
    OverDelivery,
}

impl AccuracyStatus {
    pub const ALL: [AccuracyStatus; 5] = [
        AccuracyStatus::UnforecastedDemand,
        AccuracyStatus::MissedNoSupply,
        AccuracyStatus::Accurate,
        AccuracyStatus::UnderDelivery,
        AccuracyStatus::OverDelivery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccuracyStatus::UnforecastedDemand => "UnforecastedDemand",
            AccuracyStatus::MissedNoSupply => "MissedNoSupply",
            AccuracyStatus::Accurate => "Accurate",
            AccuracyStatus::UnderDelivery => "UnderDelivery",
            AccuracyStatus::OverDelivery => "OverDelivery",
        }
    }

    pub fn is_accurate(&self) -> bool {
        matches!(self, AccuracyStatus::Accurate)
    }
}

impl fmt::Display for AccuracyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowMetrics {
    pub far: f64,
    pub bias: f64,
    pub status: AccuracyStatus,
}

/// Scores reconciled rows. Quantities are expected to be non-negative, which the
/// reshaper guarantees.
#[derive(Debug, Clone, Copy)]
pub struct MetricEngine {
    band: AccuracyBand,
    zero_forecast_far: f64,
}

impl Default for MetricEngine {
    fn default() -> Self {
        Self {
            band: AccuracyBand::default(),
            zero_forecast_far: ZERO_FORECAST_FAR,
        }
    }
}

impl MetricEngine {
    pub fn new(band: AccuracyBand, zero_forecast_far: f64) -> Self {
        Self {
            band,
            zero_forecast_far,
        }
    }

    pub fn from_config(config: &ReconciliationConfig) -> Self {
        Self::new(config.accuracy_band, config.zero_forecast_far)
    }

    pub fn band(&self) -> AccuracyBand {
        self.band
    }

    /// Forecast Achievement Ratio. Never divides by zero: a zero forecast yields
    /// the sentinel when something arrived, otherwise 1.0.
    pub fn far(&self, forecast: f64, actual: f64) -> f64 {
        if forecast > 0.0 {
            actual / forecast
        } else if actual > 0.0 {
            self.zero_forecast_far
        } else {
            1.0
        }
    }

    pub fn bias(&self, forecast: f64, actual: f64) -> f64 {
        forecast - actual
    }

    pub fn status(&self, forecast: f64, actual: f64, far: f64) -> AccuracyStatus {
        if forecast == 0.0 && actual > 0.0 {
            AccuracyStatus::UnforecastedDemand
        } else if forecast > 0.0 && actual == 0.0 {
            AccuracyStatus::MissedNoSupply
        } else if self.band.contains(far) {
            AccuracyStatus::Accurate
        } else if far < self.band.low {
            AccuracyStatus::UnderDelivery
        } else {
            AccuracyStatus::OverDelivery
        }
    }

    pub fn score(&self, forecast: f64, actual: f64) -> RowMetrics {
        let far = self.far(forecast, actual);
        RowMetrics {
            far,
            bias: self.bias(forecast, actual),
            status: self.status(forecast, actual, far),
        }
    }
}
