//! HTTP surface of the detail batch linker.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use super::auth::AuthUser;
use super::error::ApiError;
use super::measurements::parse_category;
use super::ApiResponse;
use crate::db::{DetailRow, DetailView, SaveOutcome};
use crate::measurements::SaveMode;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct DeleteOutcome {
    pub count: u64,
}

/// POST /api/details/:category/:customer_id
pub async fn create_details(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((category, customer_id)): Path<(String, String)>,
    Json(rows): Json<Vec<DetailRow>>,
) -> Result<(StatusCode, Json<ApiResponse<SaveOutcome>>), ApiError> {
    let category = parse_category(&category)?;
    let outcome = state
        .linker(category)
        .save(&rows, SaveMode::Create, auth.id(), &customer_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new("Details saved", outcome)),
    ))
}

/// PUT /api/details/:category/:customer_id
pub async fn update_details(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((category, customer_id)): Path<(String, String)>,
    Json(rows): Json<Vec<DetailRow>>,
) -> Result<Json<ApiResponse<SaveOutcome>>, ApiError> {
    let category = parse_category(&category)?;
    let outcome = state
        .linker(category)
        .save(&rows, SaveMode::Update, auth.id(), &customer_id)
        .await?;

    Ok(Json(ApiResponse::new("Details updated", outcome)))
}

/// GET /api/details/:category/customer/:customer_id
pub async fn details_by_customer(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((category, customer_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Vec<DetailView>>>, ApiError> {
    let category = parse_category(&category)?;
    let details = state
        .linker(category)
        .fetch_by_customer(auth.id(), &customer_id)
        .await?;

    Ok(Json(ApiResponse::list("Details retrieved", details)))
}

/// GET /api/details/:category/reference/:reference_id
pub async fn details_by_reference(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((category, reference_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Vec<DetailView>>>, ApiError> {
    let category = parse_category(&category)?;
    let details = state
        .linker(category)
        .fetch_by_reference(auth.id(), &reference_id)
        .await?;

    Ok(Json(ApiResponse::list("Details retrieved", details)))
}

/// DELETE /api/details/:category/:reference_id
pub async fn delete_details(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((category, reference_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<DeleteOutcome>>, ApiError> {
    let category = parse_category(&category)?;
    let count = state
        .linker(category)
        .delete_by_reference(auth.id(), &reference_id)
        .await?;

    Ok(Json(ApiResponse::new(
        "Details deleted",
        DeleteOutcome { count },
    )))
}
