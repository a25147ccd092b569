mod metering_record;
mod month;
mod plant;
mod settlement_record;

pub use metering_record::MeteringRecord;
pub use month::YearMonth;
pub use plant::Plant;
pub use settlement_record::SettlementRecord;
