//! Measurement detail rows, as submitted and as returned.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One incoming measured value.
///
/// The create path needs `measured_value` and `measurement_definition_id`;
/// the update path additionally needs `id` and `reference_id`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailRow {
    pub id: Option<String>,
    pub measured_value: f64,
    #[serde(alias = "maleMeasurementId", alias = "femaleMeasurementId")]
    pub measurement_definition_id: String,
    pub reference_id: Option<String>,
}

/// Flat join of a detail row with its definition
#[derive(Debug, Clone, FromRow)]
pub struct DetailJoinRow {
    pub id: String,
    pub measured_value: f64,
    pub reference_id: String,
    pub measurement_id: String,
    pub measurement_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefinitionRef {
    pub id: String,
    pub name: String,
}

/// Projection returned by the detail read paths
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetailView {
    pub id: String,
    pub measured_value: f64,
    pub reference_id: String,
    pub measurement_definition: DefinitionRef,
}

impl From<DetailJoinRow> for DetailView {
    fn from(row: DetailJoinRow) -> Self {
        Self {
            id: row.id,
            measured_value: row.measured_value,
            reference_id: row.reference_id,
            measurement_definition: DefinitionRef {
                id: row.measurement_id,
                name: row.measurement_name,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_row_accepts_category_specific_key() {
        let row: DetailRow =
            serde_json::from_str(r#"{"measuredValue": 38.5, "maleMeasurementId": "chest"}"#)
                .unwrap();
        assert_eq!(row.measurement_definition_id, "chest");
        assert_eq!(row.measured_value, 38.5);
        assert!(row.id.is_none());
    }

    #[test]
    fn test_save_outcome_omits_missing_reference() {
        let json = serde_json::to_value(SaveOutcome {
            count: 3,
            reference_id: None,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"count": 3}));
    }
}
