pub mod db;
pub mod domain;
pub mod store;

pub use db::PgMeteringStore;
pub use store::{Batch, InMemoryStore, MeteringFilter, MeteringStore, SettlementFilter, StoreError};
