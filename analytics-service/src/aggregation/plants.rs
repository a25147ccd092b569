use metering_client::{domain::Plant, MeteringStore};
use serde::Serialize;

use super::require_client;
use crate::error::AnalyticsError;

pub async fn fetch_plants<S>(store: &S, client_id: &str) -> Result<Vec<Plant>, AnalyticsError>
where
    S: MeteringStore + ?Sized,
{
    let client_id = require_client(client_id)?;
    let plants = store.plants(client_id).await?;
    tracing::debug!(client_id, plants = plants.len(), "plants loaded");
    Ok(plants)
}

/// Which slice of a client's metering rows a view covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", content = "plant_type", rename_all = "snake_case")]
pub enum PlantScope {
    /// All plants of the client together.
    Combined,
    PlantType(String),
}

impl PlantScope {
    /// Resolves a plant identifier against the client's plants.
    ///
    /// The identifier may be a plant id, a plant name or a plant type
    /// (case-insensitive). No identifier selects the combined view.
    pub fn resolve(plants: &[Plant], identifier: Option<&str>) -> Result<Self, AnalyticsError> {
        let Some(identifier) = identifier.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(PlantScope::Combined);
        };

        let eq = |candidate: Option<&str>| {
            candidate.is_some_and(|c| c.trim().eq_ignore_ascii_case(identifier))
        };

        let matched = plants.iter().find(|p| {
            eq(Some(p.plant_id.as_str())) || eq(p.plant_name.as_deref()) || eq(p.plant_type.as_deref())
        });

        match matched {
            Some(Plant {
                plant_type: Some(plant_type),
                ..
            }) => Ok(PlantScope::PlantType(plant_type.clone())),
            Some(plant) => {
                tracing::warn!(plant_id = %plant.plant_id, "plant has no type, falling back to combined view");
                Ok(PlantScope::Combined)
            }
            None => Err(AnalyticsError::invalid(format!(
                "unknown plant identifier '{identifier}'"
            ))),
        }
    }

    pub fn plant_type(&self) -> Option<&str> {
        match self {
            PlantScope::Combined => None,
            PlantScope::PlantType(t) => Some(t),
        }
    }
}
