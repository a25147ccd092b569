use sqlx::{
    postgres::{PgPool, PgPoolOptions, PgRow},
    Postgres, QueryBuilder, Row,
};
use time::{Date, PrimitiveDateTime};

use crate::{
    domain::{MeteringRecord, Plant, SettlementRecord, YearMonth},
    store::{Batch, MeteringFilter, MeteringStore, SettlementFilter, StoreError},
};

/// `MeteringStore` over the Postgres wire protocol.
#[derive(Debug, Clone)]
pub struct PgMeteringStore {
    pool: PgPool,
}

impl PgMeteringStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(uri: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(uri)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Column-by-column reader that never fails: a missing column or a value of
/// the wrong type marks the row malformed and reads as `None`.
struct RowReader<'r> {
    row: &'r PgRow,
    table: &'static str,
    malformed: bool,
}

impl<'r> RowReader<'r> {
    fn new(row: &'r PgRow, table: &'static str) -> Self {
        Self {
            row,
            table,
            malformed: false,
        }
    }

    fn get<T>(&mut self, column: &'static str) -> Option<T>
    where
        T: for<'a> sqlx::Decode<'a, Postgres> + sqlx::Type<Postgres>,
    {
        match self.row.try_get::<Option<T>, _>(column) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(table = self.table, column, error = %e, "unreadable column, treating as null");
                self.malformed = true;
                None
            }
        }
    }

    fn number(&mut self, column: &'static str) -> Option<f64> {
        match self.get::<f64>(column) {
            Some(v) if !v.is_finite() => {
                tracing::warn!(table = self.table, column, value = v, "non-finite value, treating as null");
                self.malformed = true;
                None
            }
            other => other,
        }
    }
}

fn decode_metering(row: &PgRow) -> (Option<MeteringRecord>, bool) {
    let mut r = RowReader::new(row, "settlement_data");

    let client_id: Option<String> = r.get("client_name");
    let date: Option<Date> = r.get("date");
    let (Some(client_id), Some(date)) = (client_id, date) else {
        return (None, true);
    };

    let record = MeteringRecord {
        client_id,
        date,
        timestamp: r.get::<PrimitiveDateTime>("datetime"),
        slot_name: r.get("slot_name"),
        plant_type: r.get("type"),
        cons_unit: r.get("cons_unit"),
        allocated_generation: r.number("allocated_generation"),
        consumption: r.number("consumption"),
        deficit: r.number("deficit"),
        surplus_demand: r.number("surplus_demand"),
        surplus_generation: r.number("surplus_generation"),
        settled: r.number("settled"),
    };
    (Some(record), r.malformed)
}

fn decode_settlement(row: &PgRow) -> (Option<SettlementRecord>, bool) {
    let mut r = RowReader::new(row, "banking_settlement");

    let client_id: Option<String> = r.get("client_name");
    let date: Option<Date> = r.get("date");
    let (Some(client_id), Some(date)) = (client_id, date) else {
        return (None, true);
    };

    let record = SettlementRecord {
        client_id,
        month: YearMonth::from_date(date),
        matched_settled_sum: r.number("matched_settled_sum"),
        intra_settlement: r.number("intra_settlement"),
        inter_settlement: r.number("inter_settlement"),
    };
    (Some(record), r.malformed)
}

fn collect<T>(rows: &[PgRow], decode: impl Fn(&PgRow) -> (Option<T>, bool)) -> Batch<T> {
    let mut records = Vec::with_capacity(rows.len());
    let mut malformed = 0;
    for row in rows {
        let (record, bad) = decode(row);
        if bad {
            malformed += 1;
        }
        records.extend(record);
    }
    Batch { records, malformed }
}

fn record_store_error(table: &'static str, e: &sqlx::Error) {
    tracing::error!(table, error = %e, "metering store query failed");
    metrics::counter!("metering_store_errors_total", "table" => table).increment(1);
}

/// Fetch per-slot metering rows matching `filter`, ordered by date then timestamp.
pub async fn metering_rows(
    pool: &PgPool,
    filter: &MeteringFilter,
) -> Result<Batch<MeteringRecord>, StoreError> {
    let mut builder = QueryBuilder::<Postgres>::new(
        r#"
        SELECT
            client_name,
            date,
            datetime,
            slot_name,
            type,
            cons_unit,
            allocated_generation,
            consumption,
            deficit,
            surplus_demand,
            surplus_generation,
            settled
        FROM settlement_data
        WHERE date IS NOT NULL"#,
    );

    if let Some(client) = &filter.client_id {
        builder.push(" AND client_name = ").push_bind(client.clone());
    }
    if let Some((start, end)) = filter.dates {
        builder
            .push(" AND date BETWEEN ")
            .push_bind(start)
            .push(" AND ")
            .push_bind(end);
    }
    if let Some(plant_type) = &filter.plant_type {
        builder.push(" AND type = ").push_bind(plant_type.clone());
    }
    builder.push(" ORDER BY date, datetime");
    if let Some(limit) = filter.limit {
        builder
            .push(" LIMIT ")
            .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }

    let rows = builder.build().fetch_all(pool).await.map_err(|e| {
        record_store_error("settlement_data", &e);
        e
    })?;

    Ok(collect(&rows, decode_metering))
}

/// Fetch monthly banking settlement rows, ordered by month.
pub async fn settlement_rows(
    pool: &PgPool,
    filter: &SettlementFilter,
) -> Result<Batch<SettlementRecord>, StoreError> {
    let mut builder = QueryBuilder::<Postgres>::new(
        r#"
        SELECT
            client_name,
            date,
            matched_settled_sum,
            intra_settlement,
            inter_settlement
        FROM banking_settlement
        WHERE date IS NOT NULL"#,
    );

    if let Some(client) = &filter.client_id {
        builder.push(" AND client_name = ").push_bind(client.clone());
    }
    builder.push(" ORDER BY date");

    let rows = builder.build().fetch_all(pool).await.map_err(|e| {
        record_store_error("banking_settlement", &e);
        e
    })?;

    Ok(collect(&rows, decode_settlement))
}

/// Fetch the plants registered for a client.
pub async fn plants_by_client(pool: &PgPool, client_id: &str) -> Result<Vec<Plant>, StoreError> {
    let rows = sqlx::query_as::<_, Plant>(
        r#"
        SELECT
            plant_id,
            client_name,
            plant_name,
            type
        FROM tbl_plants
        WHERE client_name = $1
        ORDER BY plant_id
        "#,
    )
    .bind(client_id)
    .fetch_all(pool)
    .await
    .map_err(|e| {
        record_store_error("tbl_plants", &e);
        e
    })?;

    Ok(rows)
}

#[async_trait::async_trait]
impl MeteringStore for PgMeteringStore {
    async fn metering_records(
        &self,
        filter: &MeteringFilter,
    ) -> Result<Batch<MeteringRecord>, StoreError> {
        metering_rows(&self.pool, filter).await
    }

    async fn settlement_records(
        &self,
        filter: &SettlementFilter,
    ) -> Result<Batch<SettlementRecord>, StoreError> {
        settlement_rows(&self.pool, filter).await
    }

    async fn plants(&self, client_id: &str) -> Result<Vec<Plant>, StoreError> {
        plants_by_client(&self.pool, client_id).await
    }
}
