use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::auth::AuthUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::payments::verify_ownership;
use super::validation::{validate_date, validate_optional};
use super::ApiResponse;
use crate::db::{self, DbPool, Fabric, FabricRequest};
use crate::AppState;

fn validate_fabric_request(req: &FabricRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("fabricName", validate_optional(&req.fabric_name, "Fabric name", 100))
        .check("description", validate_optional(&req.description, "Description", 500))
        .check("completedDate", validate_date(&req.completed_date, "Completed date"));
    errors.finish()
}

async fn find_fabric(db: &DbPool, user_id: &str, id: &str) -> Result<Fabric, ApiError> {
    let fabric: Option<Fabric> = sqlx::query_as("SELECT * FROM fabrics WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    fabric.ok_or_else(|| ApiError::not_found("Fabric not found"))
}

/// GET /api/fabrics
pub async fn list_fabrics(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<Fabric>>>, ApiError> {
    let fabrics: Vec<Fabric> =
        sqlx::query_as("SELECT * FROM fabrics WHERE user_id = ? ORDER BY created_at DESC")
            .bind(auth.id())
            .fetch_all(&state.db)
            .await?;

    Ok(Json(ApiResponse::list("Fabrics retrieved", fabrics)))
}

/// GET /api/fabrics/:id
pub async fn get_fabric(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Fabric>>, ApiError> {
    let fabric = find_fabric(&state.db, auth.id(), &id).await?;
    Ok(Json(ApiResponse::new("Fabric retrieved", fabric)))
}

/// GET /api/fabrics/customer/:customer_id/reference/:reference_id
pub async fn fabrics_by_reference(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((customer_id, reference_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Vec<Fabric>>>, ApiError> {
    verify_ownership(&state.db, auth.id(), &customer_id, Some(&reference_id)).await?;

    let fabrics: Vec<Fabric> = sqlx::query_as(
        r#"
        SELECT * FROM fabrics
        WHERE user_id = ? AND customer_id = ? AND reference_id = ?
        ORDER BY created_at DESC
        "#,
    )
    .bind(auth.id())
    .bind(&customer_id)
    .bind(&reference_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::list("Fabrics retrieved", fabrics)))
}

/// POST /api/fabrics
pub async fn create_fabric(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<FabricRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Fabric>>), ApiError> {
    validate_fabric_request(&req)?;
    verify_ownership(&state.db, auth.id(), &req.customer_id, req.reference_id.as_deref()).await?;

    let now = db::now();
    let fabric = Fabric {
        id: Uuid::new_v4().to_string(),
        user_id: auth.id().to_string(),
        customer_id: req.customer_id,
        reference_id: req.reference_id,
        fabric_name: req.fabric_name,
        description: req.description,
        completed_date: req.completed_date,
        added_by: Some(auth.user.full_name.clone()),
        created_at: now.clone(),
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO fabrics (id, user_id, customer_id, reference_id, fabric_name, description, completed_date, added_by, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&fabric.id)
    .bind(&fabric.user_id)
    .bind(&fabric.customer_id)
    .bind(&fabric.reference_id)
    .bind(&fabric.fabric_name)
    .bind(&fabric.description)
    .bind(&fabric.completed_date)
    .bind(&fabric.added_by)
    .bind(&fabric.created_at)
    .bind(&fabric.updated_at)
    .execute(&state.db)
    .await?;

    tracing::info!(user_id = %fabric.user_id, customer_id = %fabric.customer_id, fabric_id = %fabric.id, "Recorded fabric");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new("Fabric recorded", fabric)),
    ))
}

/// PUT /api/fabrics/:id
pub async fn update_fabric(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<FabricRequest>,
) -> Result<Json<ApiResponse<Fabric>>, ApiError> {
    validate_fabric_request(&req)?;
    find_fabric(&state.db, auth.id(), &id).await?;
    verify_ownership(&state.db, auth.id(), &req.customer_id, req.reference_id.as_deref()).await?;

    sqlx::query(
        r#"
        UPDATE fabrics SET
            customer_id = ?, reference_id = ?, fabric_name = ?, description = ?,
            completed_date = ?, updated_at = ?
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(&req.customer_id)
    .bind(&req.reference_id)
    .bind(&req.fabric_name)
    .bind(&req.description)
    .bind(&req.completed_date)
    .bind(db::now())
    .bind(&id)
    .bind(auth.id())
    .execute(&state.db)
    .await?;

    let fabric = find_fabric(&state.db, auth.id(), &id).await?;
    Ok(Json(ApiResponse::new("Fabric updated", fabric)))
}

/// DELETE /api/fabrics/:id
pub async fn delete_fabric(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let result = sqlx::query("DELETE FROM fabrics WHERE id = ? AND user_id = ?")
        .bind(&id)
        .bind(auth.id())
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Fabric not found"));
    }

    tracing::info!(user_id = %auth.id(), fabric_id = %id, "Deleted fabric");
    Ok(StatusCode::NO_CONTENT)
}
