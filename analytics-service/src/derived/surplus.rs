use serde::Serialize;

use super::percent_of;
use crate::aggregation::{GenerationConsumptionRow, TimeBucket};

/// Excess generation and unmet demand of one bucket; at most one is non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Surplus {
    pub surplus_generation: f64,
    pub surplus_demand: f64,
}

pub fn surplus(generation: f64, consumption: f64) -> Surplus {
    Surplus {
        surplus_generation: (generation - consumption).max(0.0),
        surplus_demand: (consumption - generation).max(0.0),
    }
}

pub fn settled_percentage(settled: f64, consumption: f64) -> f64 {
    percent_of(settled, consumption)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationConsumptionMetrics {
    pub bucket: TimeBucket,
    pub generation: f64,
    pub consumption: f64,
    pub settled: f64,
    pub deficit: f64,
    pub surplus_generation: f64,
    pub surplus_demand: f64,
    pub settled_pct: f64,
}

/// Recomputes surplus from generation and consumption and adds the settled
/// share of consumption.
pub fn enrich_generation_consumption(
    rows: &[GenerationConsumptionRow],
) -> Vec<GenerationConsumptionMetrics> {
    rows.iter()
        .map(|row| {
            let split = surplus(row.generation, row.consumption);
            GenerationConsumptionMetrics {
                bucket: row.bucket,
                generation: row.generation,
                consumption: row.consumption,
                settled: row.settled,
                deficit: row.deficit,
                surplus_generation: split.surplus_generation,
                surplus_demand: split.surplus_demand,
                settled_pct: settled_percentage(row.settled, row.consumption),
            }
        })
        .collect()
}
