//! Customer models. A customer belongs to exactly one tenant.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub user_id: String,
    pub full_name: String,
    pub phone_number: String,
    pub address: Option<String>,
    pub added_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Body for creating or updating a customer
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRequest {
    pub full_name: String,
    pub phone_number: String,
    pub address: Option<String>,
    /// Must match the authenticated user when present
    pub user_id: Option<String>,
}
