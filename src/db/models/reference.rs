//! References group one save of measurement details for a customer.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{Fabric, FormType};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub id: String,
    pub user_id: String,
    pub customer_id: String,
    pub ref_name: String,
    pub added_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Reference {
    pub fn form_type(&self) -> Option<FormType> {
        self.ref_name.parse().ok()
    }
}

/// A reference together with the fabric recorded against it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceWithFabric {
    #[serde(flatten)]
    pub reference: Reference,
    pub fabric: Option<Fabric>,
}
