use crate::domain::{MeteringRecord, Plant, SettlementRecord};

use super::{Batch, MeteringFilter, MeteringStore, SettlementFilter, StoreError};

/// Store backed by plain vectors; used for CSV exports and tests.
///
/// Every record carries a malformed flag, set when it was loaded with cells
/// coerced to null. Queries report the flagged records they return in
/// [`Batch::malformed`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    metering: Vec<(MeteringRecord, bool)>,
    settlements: Vec<(SettlementRecord, bool)>,
    plants: Vec<Plant>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metering(mut self, records: impl IntoIterator<Item = MeteringRecord>) -> Self {
        self.metering.extend(records.into_iter().map(|r| (r, false)));
        self
    }

    /// Adds records paired with their malformed flag.
    pub fn with_flagged_metering(
        mut self,
        records: impl IntoIterator<Item = (MeteringRecord, bool)>,
    ) -> Self {
        self.metering.extend(records);
        self
    }

    pub fn with_settlements(
        mut self,
        records: impl IntoIterator<Item = SettlementRecord>,
    ) -> Self {
        self.settlements.extend(records.into_iter().map(|r| (r, false)));
        self
    }

    pub fn with_flagged_settlements(
        mut self,
        records: impl IntoIterator<Item = (SettlementRecord, bool)>,
    ) -> Self {
        self.settlements.extend(records);
        self
    }

    pub fn with_plants(mut self, plants: impl IntoIterator<Item = Plant>) -> Self {
        self.plants.extend(plants);
        self
    }
}

fn flagged_batch<T: Clone>(matched: Vec<&(T, bool)>) -> Batch<T> {
    let malformed = matched.iter().filter(|(_, bad)| *bad).count();
    Batch {
        records: matched.into_iter().map(|(r, _)| r.clone()).collect(),
        malformed,
    }
}

#[async_trait::async_trait]
impl MeteringStore for InMemoryStore {
    async fn metering_records(
        &self,
        filter: &MeteringFilter,
    ) -> Result<Batch<MeteringRecord>, StoreError> {
        let mut matched: Vec<&(MeteringRecord, bool)> = self
            .metering
            .iter()
            .filter(|(r, _)| filter.matches(r))
            .collect();
        matched.sort_by_key(|(r, _)| (r.date, r.timestamp));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(flagged_batch(matched))
    }

    async fn settlement_records(
        &self,
        filter: &SettlementFilter,
    ) -> Result<Batch<SettlementRecord>, StoreError> {
        let mut matched: Vec<&(SettlementRecord, bool)> = self
            .settlements
            .iter()
            .filter(|(r, _)| filter.matches(r))
            .collect();
        matched.sort_by_key(|(r, _)| r.month);
        Ok(flagged_batch(matched))
    }

    async fn plants(&self, client_id: &str) -> Result<Vec<Plant>, StoreError> {
        Ok(self
            .plants
            .iter()
            .filter(|p| p.client_id == client_id)
            .cloned()
            .collect())
    }
}
