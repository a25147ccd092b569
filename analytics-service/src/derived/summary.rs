use serde::Serialize;

use super::{generation_after_loss, percent_of, LossFactor};
use crate::aggregation::GenerationConsumptionRow;

/// Range totals for the generation/consumption view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationSummary {
    pub generation: f64,
    pub generation_after_loss: f64,
    pub consumption: f64,
    pub settled: f64,
    /// Sum of the stored per-slot surplus demand.
    pub surplus_demand: f64,
    pub replacement_pct: f64,
}

pub fn generation_summary(rows: &[GenerationConsumptionRow], loss: LossFactor) -> GenerationSummary {
    let generation: f64 = rows.iter().map(|r| r.generation).sum();
    let consumption: f64 = rows.iter().map(|r| r.consumption).sum();
    let settled: f64 = rows.iter().map(|r| r.settled).sum();

    GenerationSummary {
        generation,
        generation_after_loss: generation_after_loss(generation, loss),
        consumption,
        settled,
        surplus_demand: rows.iter().map(|r| r.surplus_demand).sum(),
        replacement_pct: percent_of(settled, consumption),
    }
}
