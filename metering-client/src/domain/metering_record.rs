use time::{Date, PrimitiveDateTime};

/// One per-slot row of the `settlement_data` table.
///
/// Numeric columns are nullable upstream; consumers treat `None` as zero.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MeteringRecord {
    pub client_id: String,
    pub date: Date,
    pub timestamp: Option<PrimitiveDateTime>,
    pub slot_name: Option<String>,
    pub plant_type: Option<String>,
    pub cons_unit: Option<String>,
    pub allocated_generation: Option<f64>,
    pub consumption: Option<f64>,
    pub deficit: Option<f64>,
    pub surplus_demand: Option<f64>,
    pub surplus_generation: Option<f64>,
    pub settled: Option<f64>,
}

impl MeteringRecord {
    /// A record with every numeric column null.
    pub fn empty(client_id: impl Into<String>, date: Date) -> Self {
        Self {
            client_id: client_id.into(),
            date,
            timestamp: None,
            slot_name: None,
            plant_type: None,
            cons_unit: None,
            allocated_generation: None,
            consumption: None,
            deficit: None,
            surplus_demand: None,
            surplus_generation: None,
            settled: None,
        }
    }
}
