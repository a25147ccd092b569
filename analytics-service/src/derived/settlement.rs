use metering_client::domain::YearMonth;
use serde::Serialize;

use super::{generation_after_loss, percent_of, LossFactor};
use crate::aggregation::MonthlyRow;

/// Composition of one month's settlement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementBreakdown {
    pub month: YearMonth,
    pub consumption: f64,
    /// Matched settlement only.
    pub settlement_without_banking: f64,
    /// Intra plus inter banking settlement.
    pub settlement_with_banking: f64,
    pub total_settlement: f64,
    pub surplus_demand_after_banking: f64,
    pub replacement_pct: f64,
}

pub fn settlement_breakdown(rows: &[MonthlyRow]) -> Vec<SettlementBreakdown> {
    rows.iter()
        .map(|row| {
            let with_banking = row.intra_settlement + row.inter_settlement;
            let total = with_banking + row.matched_settled_sum;
            SettlementBreakdown {
                month: row.month,
                consumption: row.consumption,
                settlement_without_banking: row.matched_settled_sum,
                settlement_with_banking: with_banking,
                total_settlement: total,
                surplus_demand_after_banking: (row.surplus_demand
                    - row.matched_settled_sum
                    - row.intra_settlement
                    - row.inter_settlement)
                    .max(0.0),
                replacement_pct: percent_of(total, row.consumption),
            }
        })
        .collect()
}

/// Totals across every month of a combined monthly aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BankingTotals {
    pub generation: f64,
    pub generation_after_loss: f64,
    pub consumption: f64,
    pub settlement_without_banking: f64,
    pub settlement_with_banking: f64,
    pub total_settlement: f64,
    /// Consumption covered by no settlement at all, floored at zero.
    pub unsettled: f64,
    pub surplus_demand_after_banking: f64,
    pub replacement_pct: f64,
}

pub fn banking_totals(rows: &[MonthlyRow], loss: LossFactor) -> BankingTotals {
    let breakdown = settlement_breakdown(rows);

    let generation: f64 = rows.iter().map(|r| r.generation).sum();
    let consumption: f64 = rows.iter().map(|r| r.consumption).sum();
    let without_banking: f64 = breakdown.iter().map(|b| b.settlement_without_banking).sum();
    let with_banking: f64 = breakdown.iter().map(|b| b.settlement_with_banking).sum();
    let total = with_banking + without_banking;

    BankingTotals {
        generation,
        generation_after_loss: generation_after_loss(generation, loss),
        consumption,
        settlement_without_banking: without_banking,
        settlement_with_banking: with_banking,
        total_settlement: total,
        unsettled: (consumption - total).max(0.0),
        surplus_demand_after_banking: breakdown
            .iter()
            .map(|b| b.surplus_demand_after_banking)
            .sum(),
        replacement_pct: percent_of(total, consumption),
    }
}
