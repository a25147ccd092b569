#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Plant {
    pub plant_id: String,
    #[sqlx(rename = "client_name")]
    pub client_id: String,
    pub plant_name: Option<String>,
    #[sqlx(rename = "type")]
    pub plant_type: Option<String>,
}
