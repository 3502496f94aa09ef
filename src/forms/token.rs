//! Signed bearer tokens embedded in form links.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::FormError;
use crate::db::FormType;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FormClaims {
    pub user_id: String,
    pub form_type: FormType,
    /// Random per-link secret so two links never share a token
    pub secret: String,
    pub iat: i64,
    pub exp: i64,
}

impl FormClaims {
    pub fn new(user_id: &str, form_type: FormType, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            user_id: user_id.to_string(),
            form_type,
            secret: crate::crypto::generate_token(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }
}

pub fn sign(key: &str, claims: &FormClaims) -> Result<String, FormError> {
    Ok(encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(key.as_bytes()),
    )?)
}

/// Check the signature, then the lifetime claim against `now`.
pub fn verify(key: &str, token: &str, now: DateTime<Utc>) -> Result<FormClaims, FormError> {
    let mut validation = Validation::new(Algorithm::HS256);
    // Expiry is compared against the caller's clock below
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    let claims = decode::<FormClaims>(token, &DecodingKey::from_secret(key.as_bytes()), &validation)
        .map_err(|e| {
            tracing::debug!(error = %e, "Rejected form token");
            FormError::InvalidToken("Invalid form token".to_string())
        })?
        .claims;

    if claims.exp <= now.timestamp() {
        return Err(FormError::Expired("Form token has expired".to_string()));
    }

    Ok(claims)
}
