pub mod metering_queries;

pub use metering_queries::PgMeteringStore;
