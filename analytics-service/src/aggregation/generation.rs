use std::collections::BTreeMap;

use metering_client::{domain::MeteringRecord, MeteringFilter, MeteringStore};
use serde::Serialize;
use time::{Date, PrimitiveDateTime};

use super::{finish, observe_upstream, require_client, value, Aggregate, Anomalies, DateRange};
use crate::error::AnalyticsError;

/// Key of a generation/consumption row: the stored timestamp in
/// single-day mode, the calendar date otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum TimeBucket {
    Timestamp(PrimitiveDateTime),
    Date(Date),
}

#[derive(Debug, Clone, Default)]
struct Sums {
    generation: f64,
    consumption: f64,
    deficit: f64,
    surplus_demand: f64,
    surplus_generation: f64,
    settled: f64,
}

impl Sums {
    fn add(&mut self, r: &MeteringRecord) {
        self.generation += value(r.allocated_generation);
        self.consumption += value(r.consumption);
        self.deficit += value(r.deficit);
        self.surplus_demand += value(r.surplus_demand);
        self.surplus_generation += value(r.surplus_generation);
        self.settled += value(r.settled);
    }

    fn into_row(self, bucket: TimeBucket) -> GenerationConsumptionRow {
        GenerationConsumptionRow {
            bucket,
            generation: self.generation,
            consumption: self.consumption,
            deficit: self.deficit,
            surplus_demand: self.surplus_demand,
            surplus_generation: self.surplus_generation,
            settled: self.settled,
        }
    }
}

/// Generation vs consumption for one time bucket, as stored upstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationConsumptionRow {
    pub bucket: TimeBucket,
    pub generation: f64,
    pub consumption: f64,
    pub deficit: f64,
    pub surplus_demand: f64,
    pub surplus_generation: f64,
    pub settled: f64,
}

/// Single day: one row per stored timestamp, ascending. Otherwise one row
/// per date with every numeric column summed.
pub async fn fetch_generation_consumption<S>(
    store: &S,
    client_id: &str,
    range: DateRange,
) -> Result<Aggregate<GenerationConsumptionRow>, AnalyticsError>
where
    S: MeteringStore + ?Sized,
{
    const QUERY: &str = "generation_consumption";
    let client_id = require_client(client_id)?;

    let filter = MeteringFilter::for_client(client_id).between(range.start(), range.end());
    let batch = store.metering_records(&filter).await?;
    observe_upstream(QUERY, "settlement_data", batch.malformed);

    let mut anomalies = Anomalies {
        malformed_rows: batch.malformed,
        ..Anomalies::default()
    };

    let rows = if range.is_single_day() {
        let mut rows = Vec::with_capacity(batch.records.len());
        for record in &batch.records {
            let Some(ts) = record.timestamp else {
                anomalies.malformed_rows += 1;
                continue;
            };
            let mut sums = Sums::default();
            sums.add(record);
            rows.push(sums.into_row(TimeBucket::Timestamp(ts)));
        }
        rows.sort_by_key(|r| r.bucket);
        rows
    } else {
        let mut by_date: BTreeMap<Date, Sums> = BTreeMap::new();
        for record in &batch.records {
            by_date.entry(record.date).or_default().add(record);
        }
        by_date
            .into_iter()
            .map(|(date, sums)| sums.into_row(TimeBucket::Date(date)))
            .collect()
    };

    Ok(finish(QUERY, Some(client_id), rows, anomalies))
}

/// Records without a consumption unit are grouped under this name.
pub const UNASSIGNED_UNIT: &str = "unassigned";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitRow {
    pub cons_unit: String,
    pub consumption: f64,
    pub allocated_generation: f64,
}

/// Consumption and allocated generation per consumption unit, ordered by unit.
pub async fn fetch_unitwise<S>(
    store: &S,
    client_id: &str,
    range: DateRange,
) -> Result<Aggregate<UnitRow>, AnalyticsError>
where
    S: MeteringStore + ?Sized,
{
    const QUERY: &str = "unitwise";
    let client_id = require_client(client_id)?;

    let filter = MeteringFilter::for_client(client_id).between(range.start(), range.end());
    let batch = store.metering_records(&filter).await?;
    observe_upstream(QUERY, "settlement_data", batch.malformed);

    let mut by_unit: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    for record in &batch.records {
        let unit = record
            .cons_unit
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(UNASSIGNED_UNIT);
        let entry = by_unit.entry(unit.to_string()).or_default();
        entry.0 += value(record.consumption);
        entry.1 += value(record.allocated_generation);
    }

    let rows = by_unit
        .into_iter()
        .map(|(cons_unit, (consumption, allocated_generation))| UnitRow {
            cons_unit,
            consumption,
            allocated_generation,
        })
        .collect();

    let anomalies = Anomalies {
        malformed_rows: batch.malformed,
        ..Anomalies::default()
    };
    Ok(finish(QUERY, Some(client_id), rows, anomalies))
}
