use std::{fmt, str::FromStr};

use metering_client::domain::YearMonth;
use serde::{Deserialize, Serialize};

use super::round2;
use crate::{aggregation::MonthlyRow, error::AnalyticsError};

/// Billing policy used to credit settled energy against consumption.
///
/// The two policies are distinct answers, not variants of one another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BankingPolicy {
    /// Matched, intra and inter settlement all offset consumption.
    #[default]
    WithBanking,
    /// Only matched settlement offsets consumption.
    WithoutBanking,
}

impl fmt::Display for BankingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BankingPolicy::WithBanking => "with-banking",
            BankingPolicy::WithoutBanking => "without-banking",
        })
    }
}

impl FromStr for BankingPolicy {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "with-banking" => Ok(BankingPolicy::WithBanking),
            "without-banking" => Ok(BankingPolicy::WithoutBanking),
            other => Err(AnalyticsError::invalid(format!(
                "unknown banking policy '{other}', expected with-banking or without-banking"
            ))),
        }
    }
}

/// Grid tariff applied when no rate is configured, in ₹/kWh.
pub const DEFAULT_GRID_RATE: f64 = 4.0;

/// Grid tariff in ₹/kWh. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridRate(f64);

impl Default for GridRate {
    fn default() -> Self {
        Self(DEFAULT_GRID_RATE)
    }
}

impl GridRate {
    pub fn new(rate: f64) -> Result<Self, AnalyticsError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(AnalyticsError::invalid(format!(
                "grid rate must be a positive number, got {rate}"
            )));
        }
        Ok(Self(rate))
    }

    pub fn per_kwh(self) -> f64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostRow {
    pub month: YearMonth,
    /// What the whole consumption would cost at the grid rate.
    pub grid_cost: f64,
    /// What the consumption left after settlement costs.
    pub actual_cost: f64,
    pub savings: f64,
    pub savings_pct: f64,
    /// Settled units credited under the policy.
    pub energy_offset: f64,
    pub grid_consumption: f64,
}

fn cost_row(row: &MonthlyRow, offset: f64, rate: GridRate) -> CostRow {
    let grid_consumption = (row.consumption - offset).max(0.0);
    let grid_cost = row.consumption * rate.per_kwh();
    let actual_cost = grid_consumption * rate.per_kwh();
    let savings = grid_cost - actual_cost;
    let savings_pct = if grid_cost != 0.0 {
        round2(100.0 * savings / grid_cost)
    } else {
        0.0
    };

    CostRow {
        month: row.month,
        grid_cost,
        actual_cost,
        savings,
        savings_pct,
        energy_offset: offset,
        grid_consumption,
    }
}

pub fn calculate_with_banking(rows: &[MonthlyRow], rate: GridRate) -> Vec<CostRow> {
    rows.iter()
        .map(|row| {
            let banked_settled_units =
                row.matched_settled_sum + row.intra_settlement + row.inter_settlement;
            cost_row(row, banked_settled_units, rate)
        })
        .collect()
}

pub fn calculate_without_banking(rows: &[MonthlyRow], rate: GridRate) -> Vec<CostRow> {
    rows.iter()
        .map(|row| cost_row(row, row.matched_settled_sum, rate))
        .collect()
}

pub fn calculate_costs(rows: &[MonthlyRow], rate: GridRate, policy: BankingPolicy) -> Vec<CostRow> {
    match policy {
        BankingPolicy::WithBanking => calculate_with_banking(rows, rate),
        BankingPolicy::WithoutBanking => calculate_without_banking(rows, rate),
    }
}

/// Single-row rollup of monthly costs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostSummary {
    pub total_grid_cost: f64,
    pub total_actual_cost: f64,
    pub total_savings: f64,
    pub energy_offset: f64,
    pub savings_pct: f64,
}

pub fn summarize_costs(rows: &[CostRow]) -> CostSummary {
    let total_grid_cost: f64 = rows.iter().map(|r| r.grid_cost).sum();
    let total_actual_cost: f64 = rows.iter().map(|r| r.actual_cost).sum();
    let total_savings: f64 = rows.iter().map(|r| r.savings).sum();
    let energy_offset: f64 = rows.iter().map(|r| r.energy_offset).sum();

    let savings_pct = if total_grid_cost != 0.0 {
        round2(100.0 * total_savings / total_grid_cost)
    } else {
        0.0
    };

    CostSummary {
        total_grid_cost,
        total_actual_cost,
        total_savings,
        energy_offset,
        savings_pct,
    }
}
