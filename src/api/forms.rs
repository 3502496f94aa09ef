//! Form link handlers. Issuing, listing and revoking need an account;
//! resolving, validating and submitting are open to whoever holds the link.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use super::auth::AuthUser;
use super::customers::{upsert_by_phone, validate_customer_request};
use super::error::ApiError;
use super::metrics::record_details_saved;
use super::ApiResponse;
use crate::db::{CustomerRequest, FormLink, IssueFormRequest, SaveOutcome, SubmitFormRequest, TokenQuery};
use crate::forms::{IssueOutcome, ValidatedToken};
use crate::measurements::Category;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ResolvedLink {
    pub url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub customer_id: String,
    #[serde(flatten)]
    pub saved: SaveOutcome,
}

fn token_param(query: &TokenQuery) -> &str {
    query.token.as_deref().unwrap_or_default()
}

/// POST /api/forms
pub async fn issue_form(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<IssueFormRequest>,
) -> Result<(StatusCode, Json<ApiResponse<IssueOutcome>>), ApiError> {
    auth.ensure_same(req.user_id.as_deref())?;

    let outcome = state.form_issuer().issue(auth.id(), req.form_type).await?;
    if outcome.created {
        Ok((
            StatusCode::CREATED,
            Json(ApiResponse::new("Form link created", outcome)),
        ))
    } else {
        Ok((
            StatusCode::OK,
            Json(ApiResponse::new(
                "An active form link already exists",
                outcome,
            )),
        ))
    }
}

/// GET /api/forms/active
pub async fn list_active_forms(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<FormLink>>>, ApiError> {
    let links = state.form_issuer().list_active(auth.id()).await?;
    Ok(Json(ApiResponse::list("Active form links retrieved", links)))
}

/// DELETE /api/forms/:id
pub async fn revoke_form(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.form_issuer().revoke(auth.id(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/forms/s/:short_id
pub async fn resolve_short_link(
    State(state): State<Arc<AppState>>,
    Path(short_id): Path<String>,
) -> Result<Json<ApiResponse<ResolvedLink>>, ApiError> {
    let url = state.form_issuer().resolve_short_link(&short_id).await?;
    Ok(Json(ApiResponse::new("Link resolved", ResolvedLink { url })))
}

/// GET /api/forms?token=...
pub async fn validate_token(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<ApiResponse<ValidatedToken>>, ApiError> {
    let validated = state.form_issuer().validate(token_param(&query)).await?;
    Ok(Json(ApiResponse::new("Token is valid", validated)))
}

/// POST /api/forms/submit?token=...
///
/// Files the submitted measurements under the link owner, creating the
/// customer on first contact.
pub async fn submit_form(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
    Json(req): Json<SubmitFormRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SubmitOutcome>>), ApiError> {
    let validated = state.form_issuer().validate(token_param(&query)).await?;

    let customer = CustomerRequest {
        full_name: req.customer.full_name,
        phone_number: req.customer.phone_number,
        address: req.customer.address,
        user_id: None,
    };
    validate_customer_request(&customer)?;
    if req.details.is_empty() {
        return Err(ApiError::bad_request(
            "At least one measurement detail is required",
        ));
    }

    // Customer and measurements land together or not at all
    let category = Category::from(validated.form_type);
    let mut tx = state.db.begin().await?;
    let customer_id = upsert_by_phone(&mut tx, &validated.user_id, &customer).await?;
    let saved = state
        .linker(category)
        .create_in(&mut tx, &req.details, &validated.user_id, &customer_id)
        .await?;
    tx.commit().await?;
    record_details_saved(category, saved.count);

    tracing::info!(
        user_id = %validated.user_id,
        form_id = %validated.form_id,
        customer_id = %customer_id,
        count = saved.count,
        "Accepted form submission"
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            "Measurements submitted",
            SubmitOutcome { customer_id, saved },
        )),
    ))
}
