use super::YearMonth;

/// Monthly banking settlement figures from the `banking_settlement` table.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SettlementRecord {
    pub client_id: String,
    pub month: YearMonth,
    pub matched_settled_sum: Option<f64>,
    pub intra_settlement: Option<f64>,
    pub inter_settlement: Option<f64>,
}
