//! Derived metrics computed from aggregated rows.
//!
//! Everything here is a pure function of its inputs. Inputs are already
//! null-free (aggregation coerces missing values to zero) and every
//! percentage with a zero denominator is `0.0`.

mod cost;
mod settlement;
mod summary;
mod surplus;

pub use cost::{
    calculate_costs, calculate_with_banking, calculate_without_banking, summarize_costs,
    BankingPolicy, CostRow, CostSummary, GridRate, DEFAULT_GRID_RATE,
};
pub use settlement::{banking_totals, settlement_breakdown, BankingTotals, SettlementBreakdown};
pub use summary::{generation_summary, GenerationSummary};
pub use surplus::{
    enrich_generation_consumption, settled_percentage, surplus, GenerationConsumptionMetrics,
    Surplus,
};

use serde::Serialize;

use crate::error::AnalyticsError;

/// Transmission/distribution loss applied to generation by default.
pub const DEFAULT_LOSS_FACTOR: f64 = 0.028;

/// Fraction of generation lost before it reaches the consumer, in `[0, 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LossFactor(f64);

impl LossFactor {
    pub fn new(fraction: f64) -> Result<Self, AnalyticsError> {
        if !fraction.is_finite() || !(0.0..1.0).contains(&fraction) {
            return Err(AnalyticsError::invalid(format!(
                "loss factor must be in [0, 1), got {fraction}"
            )));
        }
        Ok(Self(fraction))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for LossFactor {
    fn default() -> Self {
        Self(DEFAULT_LOSS_FACTOR)
    }
}

pub fn generation_after_loss(generation: f64, loss: LossFactor) -> f64 {
    generation * (1.0 - loss.value())
}

/// `100 * part / whole`, or zero unless `whole` is positive.
pub(crate) fn percent_of(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        100.0 * part / whole
    } else {
        0.0
    }
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
