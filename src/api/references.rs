use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use super::auth::AuthUser;
use super::customers::find_customer;
use super::error::ApiError;
use super::ApiResponse;
use crate::db::{DbPool, DetailView, Fabric, Reference, ReferenceWithFabric};
use crate::measurements::Category;
use crate::AppState;

/// A reference with every detail row saved under it
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceDetails {
    #[serde(flatten)]
    pub reference: Reference,
    pub category: Option<Category>,
    pub details: Vec<DetailView>,
}

async fn customer_references(
    db: &DbPool,
    user_id: &str,
    customer_id: &str,
) -> Result<Vec<Reference>, ApiError> {
    let references: Vec<Reference> = sqlx::query_as(
        "SELECT * FROM measurement_references WHERE user_id = ? AND customer_id = ? ORDER BY created_at DESC, rowid DESC",
    )
    .bind(user_id)
    .bind(customer_id)
    .fetch_all(db)
    .await?;
    Ok(references)
}

async fn with_fabric(db: &DbPool, reference: Reference) -> Result<ReferenceWithFabric, ApiError> {
    let fabric: Option<Fabric> = sqlx::query_as(
        "SELECT * FROM fabrics WHERE reference_id = ? AND user_id = ? ORDER BY created_at DESC LIMIT 1",
    )
    .bind(&reference.id)
    .bind(&reference.user_id)
    .fetch_optional(db)
    .await?;

    Ok(ReferenceWithFabric { reference, fabric })
}

/// GET /api/references/customer/:customer_id
pub async fn references_by_customer(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(customer_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<ReferenceWithFabric>>>, ApiError> {
    find_customer(&state.db, auth.id(), &customer_id).await?;

    let mut result = Vec::new();
    for reference in customer_references(&state.db, auth.id(), &customer_id).await? {
        result.push(with_fabric(&state.db, reference).await?);
    }

    Ok(Json(ApiResponse::list("References retrieved", result)))
}

/// GET /api/references/:id
pub async fn get_reference(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ReferenceWithFabric>>, ApiError> {
    let reference: Option<Reference> =
        sqlx::query_as("SELECT * FROM measurement_references WHERE id = ? AND user_id = ?")
            .bind(&id)
            .bind(auth.id())
            .fetch_optional(&state.db)
            .await?;
    let reference = reference.ok_or_else(|| ApiError::not_found("Reference not found"))?;

    let reference = with_fabric(&state.db, reference).await?;
    Ok(Json(ApiResponse::new("Reference retrieved", reference)))
}

/// GET /api/references/customer/:customer_id/details
pub async fn customer_details(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(customer_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<ReferenceDetails>>>, ApiError> {
    find_customer(&state.db, auth.id(), &customer_id).await?;

    let mut by_reference: HashMap<String, Vec<DetailView>> = HashMap::new();
    for category in Category::ALL {
        let details = state
            .linker(category)
            .fetch_by_customer(auth.id(), &customer_id)
            .await?;
        for detail in details {
            by_reference
                .entry(detail.reference_id.clone())
                .or_default()
                .push(detail);
        }
    }

    let result = customer_references(&state.db, auth.id(), &customer_id)
        .await?
        .into_iter()
        .map(|reference| ReferenceDetails {
            category: reference.form_type().map(Category::from),
            details: by_reference.remove(&reference.id).unwrap_or_default(),
            reference,
        })
        .collect();

    Ok(Json(ApiResponse::list("Customer details retrieved", result)))
}

#[cfg(test)]
mod tests {
    use crate::api::create_router;
    use crate::db::DetailRow;
    use crate::measurements::{Category, SaveMode};
    use crate::test_support::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn get(app: &axum::Router, uri: &str, user_id: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .uri(uri)
            .header("authorization", bearer(user_id))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn row(definition: &str, value: f64) -> DetailRow {
        DetailRow {
            id: None,
            measured_value: value,
            measurement_definition_id: definition.to_string(),
            reference_id: None,
        }
    }

    #[tokio::test]
    async fn test_references_and_grouped_details() {
        let (state, _otp) = test_state().await;
        let user_id = seed_user(&state.db, "0241234567", "Kente Couture").await;
        let customer = seed_customer(&state.db, &user_id, "0551234567").await;
        let chest = seed_definition(&state.db, Category::Male, &user_id, "Chest").await;
        let bust = seed_definition(&state.db, Category::Female, &user_id, "Bust").await;

        let male = state
            .linker(Category::Male)
            .save(&[row(&chest, 40.0)], SaveMode::Create, &user_id, &customer)
            .await
            .unwrap();
        let female = state
            .linker(Category::Female)
            .save(&[row(&bust, 34.0)], SaveMode::Create, &user_id, &customer)
            .await
            .unwrap();
        let male_ref = male.reference_id.unwrap();
        let female_ref = female.reference_id.unwrap();
        let app = create_router(state);

        let (status, body) = get(
            &app,
            &format!("/api/references/customer/{}", customer),
            &user_id,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert!(body["data"][0]["fabric"].is_null());

        let (status, body) = get(&app, &format!("/api/references/{}", male_ref), &user_id).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["refName"], "MALE_FORM");

        let (status, body) = get(
            &app,
            &format!("/api/references/customer/{}/details", customer),
            &user_id,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let groups = body["data"].as_array().unwrap();
        assert_eq!(groups.len(), 2);
        for group in groups {
            assert_eq!(group["details"].as_array().unwrap().len(), 1);
            if group["id"] == female_ref.as_str() {
                assert_eq!(group["category"], "female");
                assert_eq!(group["details"][0]["measurementDefinition"]["name"], "Bust");
            } else {
                assert_eq!(group["category"], "male");
            }
        }
    }

    #[tokio::test]
    async fn test_reference_of_other_tenant_is_hidden() {
        let (state, _otp) = test_state().await;
        let owner = seed_user(&state.db, "0241234567", "Kente Couture").await;
        let intruder = seed_user(&state.db, "0201234567", "Other Tailors").await;
        let customer = seed_customer(&state.db, &owner, "0551234567").await;
        let chest = seed_definition(&state.db, Category::Male, &owner, "Chest").await;
        let outcome = state
            .linker(Category::Male)
            .save(&[row(&chest, 40.0)], SaveMode::Create, &owner, &customer)
            .await
            .unwrap();
        let app = create_router(state);

        let uri = format!("/api/references/{}", outcome.reference_id.unwrap());
        let (status, _) = get(&app, &uri, &intruder).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get(
            &app,
            &format!("/api/references/customer/{}", customer),
            &intruder,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
