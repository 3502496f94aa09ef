use axum::{extract::State, Json};
use std::sync::Arc;

use super::auth::AuthUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    validate_email, validate_password, validate_required, validate_username, UniqueField,
};
use super::ApiResponse;
use crate::crypto;
use crate::db::{self, UpdateUserRequest, User, UserResponse};
use crate::measurements::Category;
use crate::AppState;

/// Tables holding tenant data, children before parents
fn tenant_tables() -> Vec<&'static str> {
    let mut tables: Vec<&'static str> = Category::ALL.iter().map(|c| c.details_table()).collect();
    tables.extend(["payments", "fabrics", "measurement_references", "customers"]);
    tables.extend(Category::ALL.iter().map(|c| c.definitions_table()));
    tables.extend(["forms", "settings", "companies", "otps", "refresh_tokens"]);
    tables
}

fn validate_update_request(req: &UpdateUserRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(ref name) = req.full_name {
        errors.check("fullName", validate_required(name, "Full name", 100));
    }
    if let Some(ref password) = req.password {
        errors.check("password", validate_password(password));
    }
    errors
        .check("emailAddress", validate_email(&req.email_address))
        .check("username", validate_username(&req.username));
    errors.finish()
}

/// GET /api/users/me
pub async fn get_me(auth: AuthUser) -> Json<ApiResponse<UserResponse>> {
    Json(ApiResponse::new("User retrieved", UserResponse::from(auth.user)))
}

/// PUT /api/users/me
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    validate_update_request(&req)?;

    let check = state.unique_check();
    if let Some(ref email) = req.email_address {
        if !check.is_unique(UniqueField::UserEmail, email, Some(auth.id())).await? {
            return Err(ApiError::conflict(UniqueField::UserEmail.message()));
        }
    }
    if let Some(ref username) = req.username {
        if !check.is_unique(UniqueField::Username, username, Some(auth.id())).await? {
            return Err(ApiError::conflict(UniqueField::Username.message()));
        }
    }

    let password_hash = match req.password {
        Some(ref password) => Some(crypto::hash_password(password).map_err(|e| {
            tracing::error!(error = %e, "Failed to hash password");
            ApiError::internal("Failed to update password")
        })?),
        None => None,
    };

    sqlx::query(
        r#"
        UPDATE users SET
            full_name = COALESCE(?, full_name),
            email_address = COALESCE(?, email_address),
            username = COALESCE(?, username),
            password_hash = COALESCE(?, password_hash),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(req.full_name.as_deref().map(str::trim))
    .bind(&req.email_address)
    .bind(&req.username)
    .bind(&password_hash)
    .bind(db::now())
    .bind(auth.id())
    .execute(&state.db)
    .await?;

    // Outstanding sessions end with a password change
    if password_hash.is_some() {
        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
            .bind(auth.id())
            .execute(&state.db)
            .await?;
    }

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(auth.id())
        .fetch_one(&state.db)
        .await?;

    tracing::info!(user_id = %user.id, "Updated user");
    Ok(Json(ApiResponse::new("User updated", UserResponse::from(user))))
}

/// DELETE /api/users/me
pub async fn delete_me(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let mut tx = state.db.begin().await?;
    for table in tenant_tables() {
        sqlx::query(&format!("DELETE FROM {} WHERE user_id = ?", table))
            .bind(auth.id())
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(auth.id())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(user_id = %auth.id(), "Deleted user and all tenant data");
    Ok(Json(ApiResponse::new("Account deleted", ())))
}
