//! Measurement definitions: the named axes ("Chest", "Waist") a tenant measures.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Whether a definition ships with the account or was added by the tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum MeasureType {
    #[default]
    Default,
    Custom,
}

impl MeasureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasureType::Default => "DEFAULT",
            MeasureType::Custom => "CUSTOM",
        }
    }
}

impl std::fmt::Display for MeasureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MeasureType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DEFAULT" => Ok(MeasureType::Default),
            "CUSTOM" => Ok(MeasureType::Custom),
            _ => Err(format!("Unknown measure type: {}", s)),
        }
    }
}

/// A row of `male_measurements` or `female_measurements`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementDefinition {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub measure_type: String,
    pub status: bool,
    pub added_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMeasurementRequest {
    pub name: String,
    #[serde(default)]
    pub measure_type: MeasureType,
    #[serde(default)]
    pub status: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeasurementRequest {
    pub name: Option<String>,
    pub measure_type: Option<MeasureType>,
    pub status: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_type_parsing() {
        assert_eq!("custom".parse::<MeasureType>().unwrap(), MeasureType::Custom);
        assert_eq!("DEFAULT".parse::<MeasureType>().unwrap(), MeasureType::Default);
        assert!("other".parse::<MeasureType>().is_err());
    }

    #[test]
    fn test_create_request_defaults() {
        let req: CreateMeasurementRequest = serde_json::from_str(r#"{"name":"Chest"}"#).unwrap();
        assert_eq!(req.measure_type, MeasureType::Default);
        assert!(!req.status);
    }
}
