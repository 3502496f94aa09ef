//! Fabric records attached to a customer and optionally a reference.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Fabric {
    pub id: String,
    pub user_id: String,
    pub customer_id: String,
    pub reference_id: Option<String>,
    pub fabric_name: Option<String>,
    pub description: Option<String>,
    pub completed_date: Option<String>,
    pub added_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FabricRequest {
    pub customer_id: String,
    pub reference_id: Option<String>,
    pub fabric_name: Option<String>,
    pub description: Option<String>,
    pub completed_date: Option<String>,
}
