//! Measurement definitions, one handler set serving both categories.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::auth::AuthUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::validate_required;
use super::ApiResponse;
use crate::db::{self, CreateMeasurementRequest, MeasurementDefinition, UpdateMeasurementRequest};
use crate::measurements::Category;
use crate::AppState;

/// Category from a path segment; an unknown one is a missing route
pub(super) fn parse_category(segment: &str) -> Result<Category, ApiError> {
    segment.parse().map_err(ApiError::not_found)
}

async fn find_definition(
    state: &AppState,
    category: Category,
    user_id: &str,
    id: &str,
) -> Result<MeasurementDefinition, ApiError> {
    let definition: Option<MeasurementDefinition> = sqlx::query_as(&format!(
        "SELECT * FROM {} WHERE id = ? AND user_id = ?",
        category.definitions_table()
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(&state.db)
    .await?;

    definition.ok_or_else(|| ApiError::not_found("Measurement definition not found"))
}

/// GET /api/measurements/:category
pub async fn list_definitions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(category): Path<String>,
) -> Result<Json<ApiResponse<Vec<MeasurementDefinition>>>, ApiError> {
    let category = parse_category(&category)?;

    let definitions: Vec<MeasurementDefinition> = sqlx::query_as(&format!(
        "SELECT * FROM {} WHERE user_id = ? ORDER BY created_at, name",
        category.definitions_table()
    ))
    .bind(auth.id())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::list(
        format!("{} measurements retrieved", category),
        definitions,
    )))
}

/// POST /api/measurements/:category
pub async fn create_definition(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(category): Path<String>,
    Json(req): Json<CreateMeasurementRequest>,
) -> Result<(StatusCode, Json<ApiResponse<MeasurementDefinition>>), ApiError> {
    let category = parse_category(&category)?;

    let mut errors = ValidationErrorBuilder::new();
    errors.check("name", validate_required(&req.name, "Name", 100));
    errors.finish()?;

    let now = db::now();
    let definition = MeasurementDefinition {
        id: Uuid::new_v4().to_string(),
        user_id: auth.id().to_string(),
        name: req.name.trim().to_string(),
        measure_type: req.measure_type.as_str().to_string(),
        status: req.status,
        added_by: Some(auth.user.full_name.clone()),
        created_at: now.clone(),
        updated_at: now,
    };

    sqlx::query(&format!(
        r#"
        INSERT INTO {} (id, user_id, name, measure_type, status, added_by, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        category.definitions_table()
    ))
    .bind(&definition.id)
    .bind(&definition.user_id)
    .bind(&definition.name)
    .bind(&definition.measure_type)
    .bind(definition.status)
    .bind(&definition.added_by)
    .bind(&definition.created_at)
    .bind(&definition.updated_at)
    .execute(&state.db)
    .await?;

    tracing::info!(
        category = %category,
        user_id = %definition.user_id,
        definition_id = %definition.id,
        "Created measurement definition"
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new("Measurement created", definition)),
    ))
}

/// PUT /api/measurements/:category/:id
pub async fn update_definition(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((category, id)): Path<(String, String)>,
    Json(req): Json<UpdateMeasurementRequest>,
) -> Result<Json<ApiResponse<MeasurementDefinition>>, ApiError> {
    let category = parse_category(&category)?;

    if let Some(ref name) = req.name {
        let mut errors = ValidationErrorBuilder::new();
        errors.check("name", validate_required(name, "Name", 100));
        errors.finish()?;
    }

    let mut definition = find_definition(&state, category, auth.id(), &id).await?;
    if let Some(name) = req.name {
        definition.name = name.trim().to_string();
    }
    if let Some(measure_type) = req.measure_type {
        definition.measure_type = measure_type.as_str().to_string();
    }
    if let Some(status) = req.status {
        definition.status = status;
    }
    definition.updated_at = db::now();

    sqlx::query(&format!(
        "UPDATE {} SET name = ?, measure_type = ?, status = ?, updated_at = ? WHERE id = ? AND user_id = ?",
        category.definitions_table()
    ))
    .bind(&definition.name)
    .bind(&definition.measure_type)
    .bind(definition.status)
    .bind(&definition.updated_at)
    .bind(&id)
    .bind(auth.id())
    .execute(&state.db)
    .await?;

    Ok(Json(ApiResponse::new("Measurement updated", definition)))
}

/// DELETE /api/measurements/:category/:id
pub async fn delete_definition(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((category, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let category = parse_category(&category)?;
    find_definition(&state, category, auth.id(), &id).await?;

    let (in_use,): (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM {} WHERE measurement_id = ?",
        category.details_table()
    ))
    .bind(&id)
    .fetch_one(&state.db)
    .await?;

    if in_use > 0 {
        return Err(ApiError::conflict(format!(
            "Measurement is used by {} recorded detail(s)",
            in_use
        )));
    }

    sqlx::query(&format!(
        "DELETE FROM {} WHERE id = ? AND user_id = ?",
        category.definitions_table()
    ))
    .bind(&id)
    .bind(auth.id())
    .execute(&state.db)
    .await?;

    tracing::info!(category = %category, user_id = %auth.id(), definition_id = %id, "Deleted measurement definition");
    Ok(StatusCode::NO_CONTENT)
}
