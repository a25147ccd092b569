use std::collections::BTreeMap;

use metering_client::{
    domain::{MeteringRecord, YearMonth},
    Batch, MeteringFilter, MeteringStore,
};
use serde::Serialize;
use time::Date;

use super::{finish, observe_upstream, require_client, value, Aggregate, Anomalies, DateRange};
use crate::{
    error::AnalyticsError,
    tod::{NormalizedSlot, TodSlot},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TodRow {
    pub slot: NormalizedSlot,
    pub generation: f64,
    pub consumption: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTodRow {
    pub date: Date,
    pub slot: NormalizedSlot,
    pub generation: f64,
    pub consumption: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTodRow {
    pub month: YearMonth,
    pub slot: NormalizedSlot,
    pub generation: f64,
    pub consumption: f64,
}

/// Groups a batch by `key(record)` and normalized slot, summing
/// generation and consumption. Output is ordered by key, then slot order.
fn group_by_slot<K, F>(
    query: &'static str,
    batch: &Batch<MeteringRecord>,
    key: F,
) -> (BTreeMap<(K, NormalizedSlot), (f64, f64)>, Anomalies)
where
    K: Ord,
    F: Fn(&MeteringRecord) -> K,
{
    let mut anomalies = Anomalies {
        malformed_rows: batch.malformed,
        ..Anomalies::default()
    };
    let mut groups = BTreeMap::new();
    for record in &batch.records {
        let Some(slot) = anomalies.slot(query, record.slot_name.as_deref()) else {
            continue;
        };
        let entry: &mut (f64, f64) = groups.entry((key(record), slot)).or_default();
        entry.0 += value(record.allocated_generation);
        entry.1 += value(record.consumption);
    }
    (groups, anomalies)
}

/// Whole range collapsed into one row per slot.
pub async fn fetch_tod_binned<S>(
    store: &S,
    client_id: &str,
    range: DateRange,
) -> Result<Aggregate<TodRow>, AnalyticsError>
where
    S: MeteringStore + ?Sized,
{
    const QUERY: &str = "tod_binned";
    let client_id = require_client(client_id)?;

    let filter = MeteringFilter::for_client(client_id).between(range.start(), range.end());
    let batch = store.metering_records(&filter).await?;
    observe_upstream(QUERY, "settlement_data", batch.malformed);

    let (groups, anomalies) = group_by_slot(QUERY, &batch, |_| ());
    let rows = groups
        .into_iter()
        .map(|(((), slot), (generation, consumption))| TodRow {
            slot,
            generation,
            consumption,
        })
        .collect();

    Ok(finish(QUERY, Some(client_id), rows, anomalies))
}

/// One row per `(date, slot)` within the range, optionally for one plant type.
pub async fn fetch_daily_tod<S>(
    store: &S,
    client_id: &str,
    range: DateRange,
    plant_type: Option<&str>,
) -> Result<Aggregate<DailyTodRow>, AnalyticsError>
where
    S: MeteringStore + ?Sized,
{
    const QUERY: &str = "daily_tod";
    let client_id = require_client(client_id)?;

    let filter = MeteringFilter::for_client(client_id)
        .between(range.start(), range.end())
        .plant_type(plant_type);
    daily_tod(QUERY, store, client_id, &filter, None).await
}

/// Like [`fetch_daily_tod`] over every stored date.
///
/// `row_limit` caps the number of upstream rows read. When more rows exist,
/// the last date is dropped (it may be partly summed) and
/// `anomalies.truncated` is set.
pub async fn fetch_all_daily_tod<S>(
    store: &S,
    client_id: &str,
    plant_type: Option<&str>,
    row_limit: Option<usize>,
) -> Result<Aggregate<DailyTodRow>, AnalyticsError>
where
    S: MeteringStore + ?Sized,
{
    const QUERY: &str = "all_daily_tod";
    let client_id = require_client(client_id)?;
    if row_limit == Some(0) {
        return Err(AnalyticsError::invalid("row limit must be positive"));
    }

    let filter = MeteringFilter::for_client(client_id)
        .plant_type(plant_type)
        .limit(lookahead(row_limit));
    daily_tod(QUERY, store, client_id, &filter, row_limit).await
}

async fn daily_tod<S>(
    query: &'static str,
    store: &S,
    client_id: &str,
    filter: &MeteringFilter,
    row_limit: Option<usize>,
) -> Result<Aggregate<DailyTodRow>, AnalyticsError>
where
    S: MeteringStore + ?Sized,
{
    let mut batch = store.metering_records(filter).await?;
    observe_upstream(query, "settlement_data", batch.malformed);
    let truncated = apply_row_limit(query, row_limit, &mut batch, |r| r.date);

    let (groups, mut anomalies) = group_by_slot(query, &batch, |r| r.date);
    anomalies.truncated = truncated;
    let rows = groups
        .into_iter()
        .map(|((date, slot), (generation, consumption))| DailyTodRow {
            date,
            slot,
            generation,
            consumption,
        })
        .collect();

    Ok(finish(query, Some(client_id), rows, anomalies))
}

/// One row per `(month, slot)` over every stored date.
///
/// The row limit behaves as in [`fetch_all_daily_tod`], dropping the last
/// month on overflow.
pub async fn fetch_monthly_tod<S>(
    store: &S,
    client_id: &str,
    plant_type: Option<&str>,
    row_limit: Option<usize>,
) -> Result<Aggregate<MonthlyTodRow>, AnalyticsError>
where
    S: MeteringStore + ?Sized,
{
    const QUERY: &str = "monthly_tod";
    let client_id = require_client(client_id)?;
    if row_limit == Some(0) {
        return Err(AnalyticsError::invalid("row limit must be positive"));
    }

    let filter = MeteringFilter::for_client(client_id)
        .plant_type(plant_type)
        .limit(lookahead(row_limit));
    let mut batch = store.metering_records(&filter).await?;
    observe_upstream(QUERY, "settlement_data", batch.malformed);
    let truncated = apply_row_limit(QUERY, row_limit, &mut batch, |r| YearMonth::from_date(r.date));

    let (groups, mut anomalies) = group_by_slot(QUERY, &batch, |r| YearMonth::from_date(r.date));
    anomalies.truncated = truncated;
    let rows = groups
        .into_iter()
        .map(|((month, slot), (generation, consumption))| MonthlyTodRow {
            month,
            slot,
            generation,
            consumption,
        })
        .collect();

    Ok(finish(QUERY, Some(client_id), rows, anomalies))
}

/// One row past the limit, so that overflow can be told apart from a store
/// holding exactly `limit` rows.
fn lookahead(row_limit: Option<usize>) -> Option<usize> {
    row_limit.map(|limit| limit.saturating_add(1))
}

/// Cuts a batch fetched with [`lookahead`] back to `limit` rows and drops
/// the trailing group the cut went through. Returns whether anything was cut.
fn apply_row_limit<K, F>(
    query: &'static str,
    limit: Option<usize>,
    batch: &mut Batch<MeteringRecord>,
    key: F,
) -> bool
where
    K: PartialEq,
    F: Fn(&MeteringRecord) -> K,
{
    let Some(limit) = limit else {
        return false;
    };
    let Some(first_over) = batch.records.get(limit) else {
        return false;
    };

    let boundary = key(first_over);
    batch.records.truncate(limit);
    while batch.records.last().is_some_and(|r| key(r) == boundary) {
        batch.records.pop();
    }

    tracing::warn!(query, limit, kept = batch.records.len(), "row limit reached, result is truncated");
    metrics::counter!("aggregation_row_limit_hits_total", "query" => query).increment(1);
    true
}

/// Values for the four canonical slots, indexed by [`TodSlot::index`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SlotValues([f64; 4]);

impl SlotValues {
    pub fn get(&self, slot: TodSlot) -> f64 {
        self.0[slot.index()]
    }

    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    fn add(&mut self, slot: TodSlot, v: f64) {
        self.0[slot.index()] += v;
    }
}

impl Serialize for SlotValues {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(4))?;
        for slot in crate::tod::slot_order() {
            map.serialize_entry(slot.label(), &self.get(slot))?;
        }
        map.end()
    }
}

/// One key (date or month) with a column per canonical slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotPivotRow<K> {
    pub key: K,
    pub generation: SlotValues,
    pub consumption: SlotValues,
    /// Generation and consumption booked under unrecognized slot names.
    pub unrecognized_generation: f64,
    pub unrecognized_consumption: f64,
}

/// Reshapes long `(key, slot, generation, consumption)` rows into one row
/// per key. Slots with no data read as zero.
pub fn pivot_by_slot<K, I>(rows: I) -> Vec<SlotPivotRow<K>>
where
    K: Ord,
    I: IntoIterator<Item = (K, NormalizedSlot, f64, f64)>,
{
    let mut by_key: BTreeMap<K, SlotPivotRow<()>> = BTreeMap::new();
    for (key, slot, generation, consumption) in rows {
        let row = by_key.entry(key).or_insert_with(|| SlotPivotRow {
            key: (),
            generation: SlotValues::default(),
            consumption: SlotValues::default(),
            unrecognized_generation: 0.0,
            unrecognized_consumption: 0.0,
        });
        match slot.known() {
            Some(slot) => {
                row.generation.add(slot, generation);
                row.consumption.add(slot, consumption);
            }
            None => {
                row.unrecognized_generation += generation;
                row.unrecognized_consumption += consumption;
            }
        }
    }

    by_key
        .into_iter()
        .map(|(key, row)| SlotPivotRow {
            key,
            generation: row.generation,
            consumption: row.consumption,
            unrecognized_generation: row.unrecognized_generation,
            unrecognized_consumption: row.unrecognized_consumption,
        })
        .collect()
}

impl DailyTodRow {
    /// Long-form entry for [`pivot_by_slot`].
    pub fn pivot_entry(self) -> (Date, NormalizedSlot, f64, f64) {
        (self.date, self.slot, self.generation, self.consumption)
    }
}

impl MonthlyTodRow {
    /// Long-form entry for [`pivot_by_slot`].
    pub fn pivot_entry(self) -> (YearMonth, NormalizedSlot, f64, f64) {
        (self.month, self.slot, self.generation, self.consumption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::test_support::{slot_record, BrokenStore};
    use metering_client::InMemoryStore;
    use time::macros::date;

    fn typed(mut r: MeteringRecord, plant_type: &str) -> MeteringRecord {
        r.plant_type = Some(plant_type.to_string());
        r
    }

    fn store() -> InMemoryStore {
        InMemoryStore::new().with_metering(vec![
            typed(slot_record("acme", date!(2024 - 01 - 01), None, "Off-Peak", 1.0, 10.0), "solar"),
            typed(slot_record("acme", date!(2024 - 01 - 01), None, "Night Off-Peak", 2.0, 20.0), "wind"),
            typed(slot_record("acme", date!(2024 - 01 - 01), None, "Morning Peak", 5.0, 3.0), "solar"),
            typed(slot_record("acme", date!(2024 - 01 - 02), None, "Evening Peak", 4.0, 6.0), "solar"),
            typed(slot_record("acme", date!(2024 - 02 - 10), None, "Midnight Special", 7.0, 1.0), "solar"),
        ])
    }

    #[tokio::test]
    async fn tod_binned_collapses_range_into_slots() {
        let range = DateRange::new(date!(2024 - 01 - 01), date!(2024 - 01 - 31)).unwrap();
        let agg = fetch_tod_binned(&store(), "acme", range).await.unwrap();

        let slots: Vec<&str> = agg.rows.iter().map(|r| r.slot.label()).collect();
        assert_eq!(slots, vec!["Morning Peak", "Evening Peak", "Night Off-Peak"]);
        let night = &agg.rows[2];
        assert_eq!(night.generation, 3.0);
        assert_eq!(night.consumption, 30.0);
        assert!(agg.anomalies.unrecognized_slots.is_empty());
    }

    #[tokio::test]
    async fn unknown_slot_gets_its_own_bucket_and_is_flagged() {
        let range = DateRange::new(date!(2024 - 02 - 01), date!(2024 - 02 - 28)).unwrap();
        let agg = fetch_tod_binned(&store(), "acme", range).await.unwrap();

        assert_eq!(agg.len(), 1);
        assert_eq!(agg.rows[0].slot, NormalizedSlot::Unrecognized("Midnight Special".to_string()));
        assert!(agg.anomalies.unrecognized_slots.contains("Midnight Special"));
    }

    #[tokio::test]
    async fn daily_tod_orders_by_date_then_slot_and_filters_plant_type() {
        let range = DateRange::new(date!(2024 - 01 - 01), date!(2024 - 01 - 02)).unwrap();
        let all = fetch_daily_tod(&store(), "acme", range, None).await.unwrap();
        let keys: Vec<(Date, &str)> = all.rows.iter().map(|r| (r.date, r.slot.label())).collect();
        assert_eq!(
            keys,
            vec![
                (date!(2024 - 01 - 01), "Morning Peak"),
                (date!(2024 - 01 - 01), "Night Off-Peak"),
                (date!(2024 - 01 - 02), "Evening Peak"),
            ]
        );
        assert_eq!(all.rows[1].consumption, 30.0);

        let solar = fetch_daily_tod(&store(), "acme", range, Some("solar")).await.unwrap();
        assert_eq!(solar.rows[1].consumption, 10.0);
    }

    #[tokio::test]
    async fn all_daily_tod_flags_truncation_at_row_limit() {
        let agg = fetch_all_daily_tod(&store(), "acme", None, Some(2)).await.unwrap();
        assert!(agg.anomalies.truncated);

        let agg = fetch_all_daily_tod(&store(), "acme", None, None).await.unwrap();
        assert!(!agg.anomalies.truncated);
        assert_eq!(agg.len(), 4);
        assert_eq!(agg.rows[3].date, date!(2024 - 02 - 10));
    }

    #[tokio::test]
    async fn all_daily_tod_at_exact_limit_is_not_truncated() {
        let agg = fetch_all_daily_tod(&store(), "acme", None, Some(5)).await.unwrap();
        assert!(!agg.anomalies.truncated);
        assert_eq!(agg.len(), 4);
    }

    #[tokio::test]
    async fn truncation_drops_the_partial_trailing_date() {
        // Three rows on 2024-01-01 fit; the cut falls on 2024-01-02.
        let agg = fetch_all_daily_tod(&store(), "acme", None, Some(3)).await.unwrap();
        assert!(agg.anomalies.truncated);
        assert!(agg.rows.iter().all(|r| r.date == date!(2024 - 01 - 01)));
        assert_eq!(agg.rows[1].consumption, 30.0);

        // The cut falls inside 2024-01-01, so nothing complete remains.
        let agg = fetch_all_daily_tod(&store(), "acme", None, Some(2)).await.unwrap();
        assert!(agg.anomalies.truncated);
        assert!(agg.is_empty());
    }

    #[tokio::test]
    async fn monthly_tod_truncation_drops_the_partial_month() {
        let agg = fetch_monthly_tod(&store(), "acme", None, Some(4)).await.unwrap();
        assert!(agg.anomalies.truncated);
        let months: Vec<String> = agg.rows.iter().map(|r| r.month.to_string()).collect();
        assert_eq!(months, vec!["2024-01", "2024-01", "2024-01"]);

        let agg = fetch_monthly_tod(&store(), "acme", None, Some(5)).await.unwrap();
        assert!(!agg.anomalies.truncated);
        assert_eq!(agg.len(), 4);
    }

    #[tokio::test]
    async fn all_daily_tod_rejects_zero_limit() {
        let err = fetch_all_daily_tod(&store(), "acme", None, Some(0)).await.unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn monthly_tod_groups_by_year_month() {
        let agg = fetch_monthly_tod(&store(), "acme", None, None).await.unwrap();
        let months: Vec<String> = agg.rows.iter().map(|r| r.month.to_string()).collect();
        assert_eq!(months, vec!["2024-01", "2024-01", "2024-01", "2024-02"]);
    }

    #[tokio::test]
    async fn record_without_slot_is_counted_malformed() {
        let mut missing = slot_record("acme", date!(2024 - 01 - 01), None, "", 1.0, 1.0);
        missing.slot_name = None;
        let store = InMemoryStore::new().with_metering(vec![missing]);
        let range = DateRange::single_day(date!(2024 - 01 - 01));

        let agg = fetch_tod_binned(&store, "acme", range).await.unwrap();
        assert!(agg.is_empty());
        assert_eq!(agg.anomalies.malformed_rows, 1);
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let err = fetch_monthly_tod(&BrokenStore, "acme", None, None).await.unwrap_err();
        assert!(matches!(err, AnalyticsError::StoreUnavailable(_)));
    }

    #[test]
    fn pivot_fills_missing_slots_with_zero() {
        let rows = vec![
            ("2024-01", NormalizedSlot::Known(TodSlot::MorningPeak), 5.0, 3.0),
            ("2024-01", NormalizedSlot::Known(TodSlot::NightOffPeak), 3.0, 30.0),
            ("2024-01", NormalizedSlot::Unrecognized("Midnight Special".into()), 7.0, 1.0),
            ("2024-02", NormalizedSlot::Known(TodSlot::EveningPeak), 4.0, 6.0),
        ];
        let pivot = pivot_by_slot(rows);

        assert_eq!(pivot.len(), 2);
        let jan = &pivot[0];
        assert_eq!(jan.key, "2024-01");
        assert_eq!(jan.generation.get(TodSlot::MorningPeak), 5.0);
        assert_eq!(jan.generation.get(TodSlot::DayNormal), 0.0);
        assert_eq!(jan.consumption.total(), 33.0);
        assert_eq!(jan.unrecognized_generation, 7.0);
        assert_eq!(pivot[1].consumption.get(TodSlot::EveningPeak), 6.0);
    }
}
