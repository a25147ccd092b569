//! Aggregation queries over the metering store.
//!
//! Every query takes the store explicitly, pushes the client/date/plant-type
//! predicates down to it and groups the returned rows in memory. A query
//! that matches nothing yields an empty [`Aggregate`], never an error;
//! store failures surface as [`AnalyticsError::StoreUnavailable`].

mod generation;
mod monthly;
mod plants;
mod tod;

pub use generation::{
    fetch_generation_consumption, fetch_unitwise, GenerationConsumptionRow, TimeBucket, UnitRow,
    UNASSIGNED_UNIT,
};
pub use monthly::{fetch_combined_monthly, MonthlyRow};
pub use plants::{fetch_plants, PlantScope};
pub use tod::{
    fetch_all_daily_tod, fetch_daily_tod, fetch_monthly_tod, fetch_tod_binned, pivot_by_slot,
    DailyTodRow, MonthlyTodRow, SlotPivotRow, SlotValues, TodRow,
};

use std::collections::BTreeSet;

use serde::Serialize;
use time::Date;

use crate::{
    error::AnalyticsError,
    tod::{normalize, NormalizedSlot},
};

/// Inclusive calendar date range. Equal ends select single-day raw mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    start: Date,
    end: Date,
}

impl DateRange {
    pub fn new(start: Date, end: Date) -> Result<Self, AnalyticsError> {
        if end < start {
            return Err(AnalyticsError::invalid(format!(
                "date range end {end} is before start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn single_day(day: Date) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    pub fn start(&self) -> Date {
        self.start
    }

    pub fn end(&self) -> Date {
        self.end
    }

    pub fn is_single_day(&self) -> bool {
        self.start == self.end
    }
}

/// Degraded-but-handled conditions observed while aggregating.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Anomalies {
    /// Upstream rows excluded or with columns coerced to zero.
    pub malformed_rows: usize,
    /// Distinct raw slot names that matched no canonical slot.
    pub unrecognized_slots: BTreeSet<String>,
    /// The row-limit guard cut the result short.
    pub truncated: bool,
}

impl Anomalies {
    pub fn is_clean(&self) -> bool {
        self.malformed_rows == 0 && self.unrecognized_slots.is_empty() && !self.truncated
    }

    pub(crate) fn merge(&mut self, other: Anomalies) {
        self.malformed_rows += other.malformed_rows;
        self.unrecognized_slots.extend(other.unrecognized_slots);
        self.truncated |= other.truncated;
    }

    /// Normalizes a slot name, recording it when it is not canonical.
    ///
    /// A missing slot name makes the row malformed and yields `None`.
    fn slot(&mut self, query: &'static str, raw: Option<&str>) -> Option<NormalizedSlot> {
        let Some(raw) = raw else {
            self.malformed_rows += 1;
            return None;
        };
        let slot = normalize(raw);
        if let NormalizedSlot::Unrecognized(name) = &slot {
            if self.unrecognized_slots.insert(name.clone()) {
                tracing::warn!(query, raw_slot = %name, "unrecognized ToD slot name, bucketing separately");
                metrics::counter!("tod_unrecognized_slot_total").increment(1);
            }
        }
        Some(slot)
    }
}

/// Tabular query result; emptiness is the "no data" signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregate<T> {
    pub rows: Vec<T>,
    pub anomalies: Anomalies,
}

impl<T> Aggregate<T> {
    pub fn new(rows: Vec<T>, anomalies: Anomalies) -> Self {
        Self { rows, anomalies }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Anomalies::default())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Null and non-finite inputs contribute zero.
pub(crate) fn value(v: Option<f64>) -> f64 {
    v.filter(|x| x.is_finite()).unwrap_or(0.0)
}

pub(crate) fn require_client(client_id: &str) -> Result<&str, AnalyticsError> {
    let trimmed = client_id.trim();
    if trimmed.is_empty() {
        return Err(AnalyticsError::invalid("client_id must not be empty"));
    }
    Ok(trimmed)
}

/// Logs and counts what the store reported as malformed.
fn observe_upstream(query: &'static str, table: &'static str, malformed: usize) {
    if malformed > 0 {
        tracing::warn!(query, table, malformed, "malformed upstream rows coerced or excluded");
        metrics::counter!("metering_malformed_rows_total", "table" => table)
            .increment(malformed as u64);
    }
}

fn finish<T>(query: &'static str, client_id: Option<&str>, rows: Vec<T>, anomalies: Anomalies) -> Aggregate<T> {
    if rows.is_empty() {
        tracing::debug!(query, client_id = client_id.unwrap_or("*"), "query matched no rows");
        metrics::counter!("aggregation_empty_results_total", "query" => query).increment(1);
    } else {
        tracing::debug!(query, client_id = client_id.unwrap_or("*"), rows = rows.len(), "aggregation complete");
    }
    Aggregate::new(rows, anomalies)
}
