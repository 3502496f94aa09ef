//! Expiring share links for measurement forms.
//!
//! Issuing a link signs a token for `(user, form type)`, stores only the
//! token's SHA-256 and hands out a short URL that resolves to the full
//! URL carrying the token. A user has at most one active link per form
//! type. The stored row is authoritative: deleting it revokes the token
//! even while its signature is still valid.

mod sweep;
pub mod token;

pub use sweep::{purge_expired, purge_expired_at, spawn_form_sweep_task, SweepStats};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::config::FormsConfig;
use crate::crypto;
use crate::db::{self, DbPool, Form, FormLink, FormType};
use token::FormClaims;

/// Short id collisions are astronomically rare; give up after a few tries
const SHORT_ID_ATTEMPTS: usize = 5;

#[derive(Error, Debug)]
pub enum FormError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Expired(String),

    #[error("{0}")]
    InvalidToken(String),

    #[error("Token signing failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result of an issue call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueOutcome {
    /// False when an active link already existed and was returned instead
    pub created: bool,
    #[serde(flatten)]
    pub link: FormLink,
}

/// A token that passed both the signature and the stored-row checks
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedToken {
    pub is_valid: bool,
    pub user_id: String,
    pub form_type: FormType,
    pub form_id: String,
}

pub struct FormIssuer {
    db: DbPool,
    signing_key: String,
    config: FormsConfig,
}

impl FormIssuer {
    pub fn new(db: DbPool, signing_key: String, config: FormsConfig) -> Self {
        Self {
            db,
            signing_key,
            config,
        }
    }

    pub async fn issue(&self, user_id: &str, form_type: FormType) -> Result<IssueOutcome, FormError> {
        self.issue_at(user_id, form_type, Utc::now()).await
    }

    pub async fn issue_at(
        &self,
        user_id: &str,
        form_type: FormType,
        now: DateTime<Utc>,
    ) -> Result<IssueOutcome, FormError> {
        let now_ts = db::timestamp(now);
        let mut tx = self.db.begin().await?;

        let existing: Option<Form> = sqlx::query_as(
            r#"
            SELECT * FROM forms
            WHERE user_id = ? AND form_type = ? AND expires_at > ?
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(form_type.as_str())
        .bind(&now_ts)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(form) = existing {
            tracing::debug!(user_id = %user_id, form_id = %form.id, "Active form link already exists");
            return Ok(IssueOutcome {
                created: false,
                link: FormLink::from(&form),
            });
        }

        let user: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if user.is_none() {
            return Err(FormError::NotFound("User not found".to_string()));
        }

        let claims = FormClaims::new(
            user_id,
            form_type,
            now,
            Duration::days(self.config.link_ttl_days),
        );
        let token = token::sign(&self.signing_key, &claims)?;

        let mut short_id = crypto::generate_short_id(self.config.short_id_length);
        for _ in 1..SHORT_ID_ATTEMPTS {
            let taken: Option<(String,)> = sqlx::query_as("SELECT id FROM forms WHERE short_id = ?")
                .bind(&short_id)
                .fetch_optional(&mut *tx)
                .await?;
            if taken.is_none() {
                break;
            }
            short_id = crypto::generate_short_id(self.config.short_id_length);
        }

        let form_id = uuid::Uuid::new_v4().to_string();
        let form = Form {
            url: format!(
                "{}?id={}&token={}",
                self.config.public_form_url, form_id, token
            ),
            short_url: format!(
                "{}/{}",
                self.config.short_url_base.trim_end_matches('/'),
                short_id
            ),
            id: form_id,
            user_id: user_id.to_string(),
            form_type: form_type.as_str().to_string(),
            token_hash: crypto::hash_token(&token),
            short_id,
            expires_at: db::timestamp(now + Duration::days(self.config.link_ttl_days)),
            created_at: now_ts.clone(),
            updated_at: now_ts,
        };

        sqlx::query(
            r#"
            INSERT INTO forms (id, user_id, form_type, token_hash, url, short_id, short_url, expires_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&form.id)
        .bind(&form.user_id)
        .bind(&form.form_type)
        .bind(&form.token_hash)
        .bind(&form.url)
        .bind(&form.short_id)
        .bind(&form.short_url)
        .bind(&form.expires_at)
        .bind(&form.created_at)
        .bind(&form.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        crate::api::metrics::record_form_issued(form_type);
        tracing::info!(
            user_id = %user_id,
            form_id = %form.id,
            form_type = %form_type,
            expires_at = %form.expires_at,
            "Issued form link"
        );

        Ok(IssueOutcome {
            created: true,
            link: FormLink::from(&form),
        })
    }

    /// Full URL behind a short id
    pub async fn resolve_short_link(&self, short_id: &str) -> Result<String, FormError> {
        self.resolve_short_link_at(short_id, Utc::now()).await
    }

    pub async fn resolve_short_link_at(
        &self,
        short_id: &str,
        now: DateTime<Utc>,
    ) -> Result<String, FormError> {
        let form: Option<Form> = sqlx::query_as("SELECT * FROM forms WHERE short_id = ?")
            .bind(short_id)
            .fetch_optional(&self.db)
            .await?;

        let form = form.ok_or_else(|| FormError::NotFound("Link does not exist".to_string()))?;
        if form.expires_at <= db::timestamp(now) {
            return Err(FormError::Expired("Link has expired".to_string()));
        }

        Ok(form.url)
    }

    pub async fn validate(&self, token: &str) -> Result<ValidatedToken, FormError> {
        self.validate_at(token, Utc::now()).await
    }

    /// Accept a token only if its signature holds, its lifetime claim has
    /// not elapsed and a live stored row with the same hash exists.
    pub async fn validate_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<ValidatedToken, FormError> {
        if token.trim().is_empty() {
            return Err(FormError::Validation("Token is required".to_string()));
        }

        let claims = token::verify(&self.signing_key, token, now)?;

        let form: Option<Form> = sqlx::query_as("SELECT * FROM forms WHERE token_hash = ?")
            .bind(crypto::hash_token(token))
            .fetch_optional(&self.db)
            .await?;

        let form =
            form.ok_or_else(|| FormError::NotFound("Invalid or expired token".to_string()))?;

        if form.expires_at <= db::timestamp(now) {
            return Err(FormError::Expired(
                "Token has expired or has already been used".to_string(),
            ));
        }

        if form.user_id != claims.user_id || form.form_type != claims.form_type.as_str() {
            tracing::warn!(form_id = %form.id, "Form token claims do not match stored link");
            return Err(FormError::InvalidToken("Invalid form token".to_string()));
        }

        Ok(ValidatedToken {
            is_valid: true,
            user_id: form.user_id,
            form_type: claims.form_type,
            form_id: form.id,
        })
    }

    /// Delete a link so its token stops validating
    pub async fn revoke(&self, user_id: &str, form_id: &str) -> Result<(), FormError> {
        let result = sqlx::query("DELETE FROM forms WHERE id = ? AND user_id = ?")
            .bind(form_id)
            .bind(user_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(FormError::NotFound("Form link not found".to_string()));
        }

        tracing::info!(user_id = %user_id, form_id = %form_id, "Revoked form link");
        Ok(())
    }

    pub async fn list_active(&self, user_id: &str) -> Result<Vec<FormLink>, FormError> {
        self.list_active_at(user_id, Utc::now()).await
    }

    pub async fn list_active_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<FormLink>, FormError> {
        let forms: Vec<Form> = sqlx::query_as(
            "SELECT * FROM forms WHERE user_id = ? AND expires_at > ? ORDER BY form_type",
        )
        .bind(user_id)
        .bind(db::timestamp(now))
        .fetch_all(&self.db)
        .await?;

        Ok(forms.iter().map(FormLink::from).collect())
    }
}

/// Pull the `token` query parameter out of a full form URL
pub fn token_from_url(url: &str) -> Option<&str> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
}
