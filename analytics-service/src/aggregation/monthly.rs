use std::collections::BTreeMap;

use metering_client::{domain::YearMonth, MeteringFilter, MeteringStore, SettlementFilter};
use serde::Serialize;

use super::{finish, observe_upstream, require_client, value, Aggregate, Anomalies};
use crate::error::AnalyticsError;

/// Monthly consumption joined with monthly banking settlement.
///
/// Either side may be absent for a month; absent figures are zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRow {
    pub month: YearMonth,
    pub consumption: f64,
    pub generation: f64,
    pub surplus_demand: f64,
    pub matched_settled_sum: f64,
    pub intra_settlement: f64,
    pub inter_settlement: f64,
}

impl MonthlyRow {
    pub fn new(month: YearMonth) -> Self {
        Self {
            month,
            consumption: 0.0,
            generation: 0.0,
            surplus_demand: 0.0,
            matched_settled_sum: 0.0,
            intra_settlement: 0.0,
            inter_settlement: 0.0,
        }
    }
}

/// Outer join of consumption-by-month and settlement-by-month, ordered by
/// month. `client_id = None` aggregates across all clients.
///
/// No plant scope applies here: banking settlement is booked per client, so
/// the monthly view always covers every plant of the client.
pub async fn fetch_combined_monthly<S>(
    store: &S,
    client_id: Option<&str>,
) -> Result<Aggregate<MonthlyRow>, AnalyticsError>
where
    S: MeteringStore + ?Sized,
{
    const QUERY: &str = "combined_monthly";
    let client_id = client_id.map(require_client).transpose()?;

    let metering_filter = MeteringFilter {
        client_id: client_id.map(str::to_string),
        ..MeteringFilter::default()
    };
    let settlement_filter = SettlementFilter {
        client_id: client_id.map(str::to_string),
    };

    let (metering, settlements) = futures::try_join!(
        store.metering_records(&metering_filter),
        store.settlement_records(&settlement_filter),
    )?;
    observe_upstream(QUERY, "settlement_data", metering.malformed);
    observe_upstream(QUERY, "banking_settlement", settlements.malformed);

    let mut months: BTreeMap<YearMonth, MonthlyRow> = BTreeMap::new();

    for record in &metering.records {
        let month = YearMonth::from_date(record.date);
        let row = months.entry(month).or_insert_with(|| MonthlyRow::new(month));
        row.consumption += value(record.consumption);
        row.generation += value(record.allocated_generation);
        row.surplus_demand += value(record.surplus_demand);
    }

    for record in &settlements.records {
        let row = months
            .entry(record.month)
            .or_insert_with(|| MonthlyRow::new(record.month));
        row.matched_settled_sum += value(record.matched_settled_sum);
        row.intra_settlement += value(record.intra_settlement);
        row.inter_settlement += value(record.inter_settlement);
    }

    let anomalies = Anomalies {
        malformed_rows: metering.malformed + settlements.malformed,
        ..Anomalies::default()
    };
    let rows = months.into_values().collect();
    Ok(finish(QUERY, client_id, rows, anomalies))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::test_support::{slot_record, BrokenStore};
    use metering_client::{domain::SettlementRecord, InMemoryStore};
    use time::macros::date;

    fn settlement(client: &str, month: &str, matched: f64, intra: Option<f64>) -> SettlementRecord {
        SettlementRecord {
            client_id: client.to_string(),
            month: month.parse().unwrap(),
            matched_settled_sum: Some(matched),
            intra_settlement: intra,
            inter_settlement: None,
        }
    }

    fn store() -> InMemoryStore {
        InMemoryStore::new()
            .with_metering(vec![
                slot_record("acme", date!(2024 - 01 - 05), None, "Morning Peak", 300.0, 600.0),
                slot_record("acme", date!(2024 - 01 - 20), None, "Evening Peak", 100.0, 400.0),
                slot_record("acme", date!(2024 - 02 - 01), None, "Morning Peak", 50.0, 80.0),
                slot_record("beta", date!(2024 - 01 - 05), None, "Morning Peak", 1.0, 1.0),
            ])
            .with_settlements(vec![
                settlement("acme", "2024-01", 200.0, Some(300.0)),
                settlement("acme", "2024-03", 40.0, None),
                settlement("beta", "2024-01", 1.0, None),
            ])
    }

    #[tokio::test]
    async fn outer_join_keeps_months_from_both_sides() {
        let agg = fetch_combined_monthly(&store(), Some("acme")).await.unwrap();
        let months: Vec<String> = agg.rows.iter().map(|r| r.month.to_string()).collect();
        assert_eq!(months, vec!["2024-01", "2024-02", "2024-03"]);

        let jan = &agg.rows[0];
        assert_eq!(jan.consumption, 1000.0);
        assert_eq!(jan.generation, 400.0);
        assert_eq!(jan.matched_settled_sum, 200.0);
        assert_eq!(jan.intra_settlement, 300.0);
        assert_eq!(jan.inter_settlement, 0.0);

        let feb = &agg.rows[1];
        assert_eq!(feb.consumption, 80.0);
        assert_eq!(feb.matched_settled_sum, 0.0);

        let mar = &agg.rows[2];
        assert_eq!(mar.consumption, 0.0);
        assert_eq!(mar.matched_settled_sum, 40.0);
    }

    #[tokio::test]
    async fn no_client_aggregates_everyone() {
        let agg = fetch_combined_monthly(&store(), None).await.unwrap();
        assert_eq!(agg.rows[0].consumption, 1001.0);
        assert_eq!(agg.rows[0].matched_settled_sum, 201.0);
    }

    #[tokio::test]
    async fn unknown_client_is_empty() {
        let agg = fetch_combined_monthly(&store(), Some("nobody")).await.unwrap();
        assert!(agg.is_empty());
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let err = fetch_combined_monthly(&BrokenStore, Some("acme")).await.unwrap_err();
        assert!(matches!(err, AnalyticsError::StoreUnavailable(_)));
    }
}
