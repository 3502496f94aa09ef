//! Shareable measurement form links.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::DetailRow;

/// Which measurement form a link opens. Also used as a reference name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormType {
    #[serde(rename = "MALE_FORM")]
    Male,
    #[serde(rename = "FEMALE_FORM")]
    Female,
}

impl FormType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormType::Male => "MALE_FORM",
            FormType::Female => "FEMALE_FORM",
        }
    }
}

impl std::fmt::Display for FormType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FormType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MALE_FORM" => Ok(FormType::Male),
            "FEMALE_FORM" => Ok(FormType::Female),
            _ => Err(format!("Unknown form type: {}", s)),
        }
    }
}

/// Stored form link. Only the hash of the bearer token is kept.
#[derive(Debug, Clone, FromRow)]
pub struct Form {
    pub id: String,
    pub user_id: String,
    pub form_type: String,
    pub token_hash: String,
    pub url: String,
    pub short_id: String,
    pub short_url: String,
    pub expires_at: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Public view of a form link (no token material beyond the short URL)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FormLink {
    pub id: String,
    pub form_type: String,
    pub short_url: String,
    pub expires_at: String,
}

impl From<&Form> for FormLink {
    fn from(form: &Form) -> Self {
        Self {
            id: form.id.clone(),
            form_type: form.form_type.clone(),
            short_url: form.short_url.clone(),
            expires_at: form.expires_at.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueFormRequest {
    pub form_type: FormType,
    /// Must match the authenticated user when present
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Customer identity as entered on a public form
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormCustomer {
    pub full_name: String,
    pub phone_number: String,
    pub address: Option<String>,
}

/// Body of a public form submission
#[derive(Debug, Deserialize)]
pub struct SubmitFormRequest {
    pub customer: FormCustomer,
    pub details: Vec<DetailRow>,
}
