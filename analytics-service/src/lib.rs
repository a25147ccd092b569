pub mod aggregation;
pub mod config;
pub mod derived;
pub mod error;
pub mod metrics_server;
pub mod observability;
pub mod report;
pub mod sources;
pub mod tod;

pub use aggregation::{Aggregate, Anomalies, DateRange};
pub use error::AnalyticsError;
pub use report::{build_report, DashboardReport, ReportRequest};
