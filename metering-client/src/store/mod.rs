mod memory;

pub use memory::InMemoryStore;

use time::Date;

use crate::domain::{MeteringRecord, Plant, SettlementRecord};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("metering store query failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("metering store unavailable: {0}")]
    Unavailable(String),
}

/// Read-only predicate pushed down to the `settlement_data` table.
///
/// `dates` is inclusive on both ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeteringFilter {
    pub client_id: Option<String>,
    pub dates: Option<(Date, Date)>,
    pub plant_type: Option<String>,
    pub limit: Option<usize>,
}

impl MeteringFilter {
    pub fn for_client(client_id: &str) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            ..Self::default()
        }
    }

    pub fn between(mut self, start: Date, end: Date) -> Self {
        self.dates = Some((start, end));
        self
    }

    pub fn plant_type(mut self, plant_type: Option<&str>) -> Self {
        self.plant_type = plant_type.map(str::to_string);
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn matches(&self, record: &MeteringRecord) -> bool {
        if let Some(client) = &self.client_id {
            if &record.client_id != client {
                return false;
            }
        }
        if let Some((start, end)) = self.dates {
            if record.date < start || record.date > end {
                return false;
            }
        }
        if let Some(plant_type) = &self.plant_type {
            if record.plant_type.as_deref() != Some(plant_type.as_str()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettlementFilter {
    pub client_id: Option<String>,
}

impl SettlementFilter {
    pub fn matches(&self, record: &SettlementRecord) -> bool {
        self.client_id
            .as_ref()
            .map_or(true, |client| &record.client_id == client)
    }
}

/// Rows returned by the store together with the number of upstream rows that
/// were malformed (excluded, or with columns coerced to null).
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<T> {
    pub records: Vec<T>,
    pub malformed: usize,
}

impl<T> Batch<T> {
    pub fn new(records: Vec<T>) -> Self {
        Self {
            records,
            malformed: 0,
        }
    }
}

/// Read-only access to the metering tables.
///
/// Metering records come back ordered by `(date, timestamp)`, settlement
/// records by month.
#[async_trait::async_trait]
pub trait MeteringStore: Send + Sync {
    async fn metering_records(
        &self,
        filter: &MeteringFilter,
    ) -> Result<Batch<MeteringRecord>, StoreError>;

    async fn settlement_records(
        &self,
        filter: &SettlementFilter,
    ) -> Result<Batch<SettlementRecord>, StoreError>;

    async fn plants(&self, client_id: &str) -> Result<Vec<Plant>, StoreError>;
}
