use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use sqlx::{Sqlite, Transaction};
use std::sync::Arc;
use uuid::Uuid;

use super::auth::AuthUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_optional, validate_phone, validate_required};
use super::ApiResponse;
use crate::db::{self, Customer, CustomerRequest, DbPool};
use crate::measurements::Category;
use crate::AppState;

pub(super) fn validate_customer_request(req: &CustomerRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("fullName", validate_required(&req.full_name, "Full name", 100))
        .check("phoneNumber", validate_phone(&req.phone_number))
        .check("address", validate_optional(&req.address, "Address", 255));
    errors.finish()
}

/// Load a customer owned by `user_id`, or 404
pub(super) async fn find_customer(
    db: &DbPool,
    user_id: &str,
    customer_id: &str,
) -> Result<Customer, ApiError> {
    let customer: Option<Customer> =
        sqlx::query_as("SELECT * FROM customers WHERE id = ? AND user_id = ?")
            .bind(customer_id)
            .bind(user_id)
            .fetch_optional(db)
            .await?;
    customer.ok_or_else(|| ApiError::not_found("Customer not found"))
}

async fn ensure_phone_free(
    state: &AppState,
    user_id: &str,
    phone: &str,
    except: Option<&str>,
) -> Result<(), ApiError> {
    if !state
        .unique_check()
        .customer_phone_is_unique(user_id, phone, except)
        .await?
    {
        return Err(ApiError::conflict(
            "A customer with this phone number already exists",
        ));
    }
    Ok(())
}

/// Find the tenant's customer with this phone number, refreshing its name
/// and address, or create one. Returns the customer id.
pub(super) async fn upsert_by_phone(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &str,
    req: &CustomerRequest,
) -> Result<String, ApiError> {
    let now = db::now();
    let existing: Option<(String,)> =
        sqlx::query_as("SELECT id FROM customers WHERE user_id = ? AND phone_number = ?")
            .bind(user_id)
            .bind(&req.phone_number)
            .fetch_optional(&mut **tx)
            .await?;

    if let Some((id,)) = existing {
        sqlx::query(
            "UPDATE customers SET full_name = ?, address = COALESCE(?, address), updated_at = ? WHERE id = ?",
        )
        .bind(req.full_name.trim())
        .bind(&req.address)
        .bind(&now)
        .bind(&id)
        .execute(&mut **tx)
        .await?;
        return Ok(id);
    }

    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO customers (id, user_id, full_name, phone_number, address, added_by, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, 'form', ?, ?)
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(req.full_name.trim())
    .bind(&req.phone_number)
    .bind(&req.address)
    .bind(&now)
    .bind(&now)
    .execute(&mut **tx)
    .await?;

    tracing::info!(user_id = %user_id, customer_id = %id, "Created customer from form submission");
    Ok(id)
}

/// GET /api/customers
pub async fn list_customers(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<Customer>>>, ApiError> {
    let customers: Vec<Customer> =
        sqlx::query_as("SELECT * FROM customers WHERE user_id = ? ORDER BY full_name")
            .bind(auth.id())
            .fetch_all(&state.db)
            .await?;

    Ok(Json(ApiResponse::list("Customers retrieved", customers)))
}

/// GET /api/customers/:id
pub async fn get_customer(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Customer>>, ApiError> {
    let customer = find_customer(&state.db, auth.id(), &id).await?;
    Ok(Json(ApiResponse::new("Customer retrieved", customer)))
}

/// POST /api/customers
pub async fn create_customer(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<CustomerRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Customer>>), ApiError> {
    auth.ensure_same(req.user_id.as_deref())?;
    validate_customer_request(&req)?;
    ensure_phone_free(&state, auth.id(), &req.phone_number, None).await?;

    let now = db::now();
    let customer = Customer {
        id: Uuid::new_v4().to_string(),
        user_id: auth.id().to_string(),
        full_name: req.full_name.trim().to_string(),
        phone_number: req.phone_number.clone(),
        address: req.address.clone(),
        added_by: Some(auth.user.full_name.clone()),
        created_at: now.clone(),
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO customers (id, user_id, full_name, phone_number, address, added_by, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&customer.id)
    .bind(&customer.user_id)
    .bind(&customer.full_name)
    .bind(&customer.phone_number)
    .bind(&customer.address)
    .bind(&customer.added_by)
    .bind(&customer.created_at)
    .bind(&customer.updated_at)
    .execute(&state.db)
    .await?;

    tracing::info!(user_id = %customer.user_id, customer_id = %customer.id, "Created customer");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new("Customer created", customer)),
    ))
}

/// PUT /api/customers/:id
pub async fn update_customer(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<CustomerRequest>,
) -> Result<Json<ApiResponse<Customer>>, ApiError> {
    auth.ensure_same(req.user_id.as_deref())?;
    validate_customer_request(&req)?;
    find_customer(&state.db, auth.id(), &id).await?;
    ensure_phone_free(&state, auth.id(), &req.phone_number, Some(&id)).await?;

    sqlx::query(
        "UPDATE customers SET full_name = ?, phone_number = ?, address = ?, updated_at = ? WHERE id = ? AND user_id = ?",
    )
    .bind(req.full_name.trim())
    .bind(&req.phone_number)
    .bind(&req.address)
    .bind(db::now())
    .bind(&id)
    .bind(auth.id())
    .execute(&state.db)
    .await?;

    let customer = find_customer(&state.db, auth.id(), &id).await?;
    tracing::info!(user_id = %auth.id(), customer_id = %id, "Updated customer");
    Ok(Json(ApiResponse::new("Customer updated", customer)))
}

/// DELETE /api/customers/:id
///
/// Removes the customer's details, payments, fabrics and references with it.
pub async fn delete_customer(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    find_customer(&state.db, auth.id(), &id).await?;

    let mut tx = state.db.begin().await?;
    for category in Category::ALL {
        sqlx::query(&format!(
            "DELETE FROM {} WHERE customer_id = ? AND user_id = ?",
            category.details_table()
        ))
        .bind(&id)
        .bind(auth.id())
        .execute(&mut *tx)
        .await?;
    }
    for table in ["payments", "fabrics", "measurement_references"] {
        sqlx::query(&format!(
            "DELETE FROM {} WHERE customer_id = ? AND user_id = ?",
            table
        ))
        .bind(&id)
        .bind(auth.id())
        .execute(&mut *tx)
        .await?;
    }
    sqlx::query("DELETE FROM customers WHERE id = ? AND user_id = ?")
        .bind(&id)
        .bind(auth.id())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(user_id = %auth.id(), customer_id = %id, "Deleted customer");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::create_router;
    use crate::db::DetailRow;
    use crate::measurements::SaveMode;
    use crate::test_support::*;
    use axum::body::Body;
    use axum::http::Request;
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
    async fn test_customer_crud() {
        let (state, _otp) = test_state().await;
        let user_id = seed_user(&state.db, "0241234567", "Kente Couture").await;
        let app = create_router(state);

        let (status, body) = send(
            &app,
            "POST",
            "/api/customers",
            &user_id,
            Some(json!({"fullName": "Abena Asante", "phoneNumber": "0551234567"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            "POST",
            "/api/customers",
            &user_id,
            Some(json!({"fullName": "Someone Else", "phoneNumber": "0551234567"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["status"], "error");

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/api/customers/{}", id),
            &user_id,
            Some(json!({"fullName": "Abena Asante", "phoneNumber": "0551234567", "address": "Kumasi"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["address"], "Kumasi");

        let (status, body) = send(&app, "GET", "/api/customers", &user_id, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);

        let (status, _) = send(&app, "DELETE", &format!("/api/customers/{}", id), &user_id, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, "GET", &format!("/api/customers/{}", id), &user_id, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_customers_are_tenant_scoped() {
        let (state, _otp) = test_state().await;
        let owner = seed_user(&state.db, "0241234567", "Kente Couture").await;
        let intruder = seed_user(&state.db, "0201234567", "Other Tailors").await;
        let customer = seed_customer(&state.db, &owner, "0551234567").await;
        let app = create_router(state);

        let uri = format!("/api/customers/{}", customer);
        let (status, _) = send(&app, "GET", &uri, &intruder, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "DELETE", &uri, &intruder, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // Claiming another tenant in the body is rejected outright
        let (status, _) = send(
            &app,
            "POST",
            "/api/customers",
            &intruder,
            Some(json!({"fullName": "X", "phoneNumber": "0551234568", "userId": owner})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_delete_customer_cascades() {
        let (state, _otp) = test_state().await;
        let user_id = seed_user(&state.db, "0241234567", "Kente Couture").await;
        let customer = seed_customer(&state.db, &user_id, "0551234567").await;
        let waist = seed_definition(&state.db, Category::Female, &user_id, "Waist").await;
        state
            .linker(Category::Female)
            .save(
                &[DetailRow {
                    id: None,
                    measured_value: 28.0,
                    measurement_definition_id: waist,
                    reference_id: None,
                }],
                SaveMode::Create,
                &user_id,
                &customer,
            )
            .await
            .unwrap();
        let app = create_router(state.clone());

        let (status, _) = send(
            &app,
            "DELETE",
            &format!("/api/customers/{}", customer),
            &user_id,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(count_rows(&state.db, "female_details").await, 0);
        assert_eq!(count_rows(&state.db, "measurement_references").await, 0);
        assert_eq!(count_rows(&state.db, "customers").await, 0);
        assert_eq!(count_rows(&state.db, "female_measurements").await, 1);
    }

    #[tokio::test]
    async fn test_upsert_by_phone() {
        let pool = test_pool().await;
        let user_id = seed_user(&pool, "0241234567", "Kente Couture").await;
        let existing = seed_customer(&pool, &user_id, "0551234567").await;

        let req = CustomerRequest {
            full_name: "Esi Owusu-Ansah".to_string(),
            phone_number: "0551234567".to_string(),
            address: None,
            user_id: None,
        };
        let mut tx = pool.begin().await.unwrap();
        assert_eq!(upsert_by_phone(&mut tx, &user_id, &req).await.unwrap(), existing);
        tx.commit().await.unwrap();
        let customer = find_customer(&pool, &user_id, &existing).await.unwrap();
        assert_eq!(customer.full_name, "Esi Owusu-Ansah");

        let req = CustomerRequest {
            phone_number: "0557654321".to_string(),
            ..req
        };
        let mut tx = pool.begin().await.unwrap();
        let created = upsert_by_phone(&mut tx, &user_id, &req).await.unwrap();
        tx.commit().await.unwrap();
        assert_ne!(created, existing);
        assert_eq!(count_rows(&pool, "customers").await, 2);
    }
}
