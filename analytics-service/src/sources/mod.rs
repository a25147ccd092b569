//! Offline sources: table exports loaded into an in-memory store.

pub mod metering_csv;

pub use metering_csv::{
    load_csv_store, read_metering, read_plants, read_settlement, CsvPaths, CsvTable, LoadReport,
    SourceError,
};
