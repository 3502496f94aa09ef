use axum::{extract::State, Json};
use std::sync::Arc;

use super::auth::AuthUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_optional, validate_required, UniqueField};
use super::ApiResponse;
use crate::db::{self, Company, Settings, UpdateCompanyRequest, UpdateSettingsRequest};
use crate::AppState;

async fn find_company(state: &AppState, user_id: &str) -> Result<Company, ApiError> {
    let company: Option<Company> = sqlx::query_as("SELECT * FROM companies WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?;
    company.ok_or_else(|| ApiError::not_found("Company not found"))
}

/// GET /api/company
pub async fn get_company(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Company>>, ApiError> {
    let company = find_company(&state, auth.id()).await?;
    Ok(Json(ApiResponse::new("Company retrieved", company)))
}

/// PUT /api/company
pub async fn update_company(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<UpdateCompanyRequest>,
) -> Result<Json<ApiResponse<Company>>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("companyName", validate_required(&req.company_name, "Company name", 100))
        .check("address", validate_optional(&req.address, "Address", 255))
        .check("quote", validate_optional(&req.quote, "Quote", 500));
    errors.finish()?;

    let name = req.company_name.trim();
    if !state
        .unique_check()
        .is_unique(UniqueField::CompanyName, name, Some(auth.id()))
        .await?
    {
        return Err(ApiError::conflict(UniqueField::CompanyName.message()));
    }

    let result = sqlx::query(
        "UPDATE companies SET company_name = ?, address = ?, quote = ?, updated_at = ? WHERE user_id = ?",
    )
    .bind(name)
    .bind(&req.address)
    .bind(&req.quote)
    .bind(db::now())
    .bind(auth.id())
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Company not found"));
    }

    let company = find_company(&state, auth.id()).await?;
    tracing::info!(user_id = %auth.id(), "Updated company profile");
    Ok(Json(ApiResponse::new("Company updated", company)))
}

/// GET /api/settings
///
/// `data` is null until the tenant saves settings for the first time.
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Option<Settings>>>, ApiError> {
    let settings: Option<Settings> = sqlx::query_as("SELECT * FROM settings WHERE user_id = ?")
        .bind(auth.id())
        .fetch_optional(&state.db)
        .await?;
    Ok(Json(ApiResponse::new("Settings retrieved", settings)))
}

/// PUT /api/settings
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<Json<ApiResponse<Settings>>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("formNote", validate_optional(&req.form_note, "Form note", 1000))
        .check("footerNote", validate_optional(&req.footer_note, "Footer note", 1000));
    errors.finish()?;

    let now = db::now();
    sqlx::query(
        r#"
        INSERT INTO settings (id, user_id, form_note, footer_note, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            form_note = excluded.form_note,
            footer_note = excluded.footer_note,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(auth.id())
    .bind(&req.form_note)
    .bind(&req.footer_note)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let settings: Settings = sqlx::query_as("SELECT * FROM settings WHERE user_id = ?")
        .bind(auth.id())
        .fetch_one(&state.db)
        .await?;

    Ok(Json(ApiResponse::new("Settings saved", settings)))
}

#[cfg(test)]
mod tests {
    use crate::api::create_router;
    use crate::test_support::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn send(
        app: &axum::Router,
        method: &str,
        uri: &str,
        user_id: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", bearer(user_id))
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_company_update_and_name_conflict() {
        let (state, _otp) = test_state().await;
        let user_id = seed_user(&state.db, "0241234567", "Kente Couture").await;
        seed_user(&state.db, "0201234567", "Other Tailors").await;
        let app = create_router(state);

        let (status, body) = send(&app, "GET", "/api/company", &user_id, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["companyName"], "Kente Couture");

        let (status, body) = send(
            &app,
            "PUT",
            "/api/company",
            &user_id,
            Some(json!({"companyName": "Kente Couture Ltd", "address": "Osu, Accra"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["companyName"], "Kente Couture Ltd");
        assert_eq!(body["data"]["address"], "Osu, Accra");

        let (status, body) = send(
            &app,
            "PUT",
            "/api/company",
            &user_id,
            Some(json!({"companyName": "Other Tailors"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "Company name already exists");
    }

    #[tokio::test]
    async fn test_settings_upsert() {
        let (state, _otp) = test_state().await;
        let user_id = seed_user(&state.db, "0241234567", "Kente Couture").await;
        let app = create_router(state.clone());

        let (status, body) = send(&app, "GET", "/api/settings", &user_id, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"].is_null());

        let (status, _) = send(
            &app,
            "PUT",
            "/api/settings",
            &user_id,
            Some(json!({"formNote": "Measure over light clothing"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            "PUT",
            "/api/settings",
            &user_id,
            Some(json!({"formNote": "Bring a reference outfit", "footerNote": "Thank you"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["formNote"], "Bring a reference outfit");
        assert_eq!(body["data"]["footerNote"], "Thank you");
        assert_eq!(count_rows(&state.db, "settings").await, 1);
    }
}
