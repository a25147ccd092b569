use metering_client::StoreError;

#[derive(thiserror::Error, Debug)]
pub enum AnalyticsError {
    /// The metering store could not be reached or queried.
    #[error("metering store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
    /// A caller-supplied parameter was rejected before any query was issued.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl AnalyticsError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}
