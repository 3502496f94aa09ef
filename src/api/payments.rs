//! Payments against a customer, optionally tied to one reference.
//!
//! `amountRemaining` and `paymentStatus` are always derived from the paid
//! and expected amounts, never taken from the client.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::auth::AuthUser;
use super::customers::find_customer;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_amount, validate_date, validate_optional};
use super::ApiResponse;
use crate::db::{self, derive_balance, DbPool, Payment, PaymentRequest};
use crate::AppState;

fn validate_payment_request(req: &PaymentRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("amountPaid", validate_amount(req.amount_paid, "Amount paid"))
        .check("date", validate_date(&req.date, "Payment date"))
        .check("description", validate_optional(&req.description, "Description", 500));
    if let Some(expected) = req.expected_amount {
        errors.check("expectedAmount", validate_amount(expected, "Expected amount"));
    }
    errors.finish()
}

/// The customer, and the reference when given, must belong to the caller
/// and to each other
pub(super) async fn verify_ownership(
    db: &DbPool,
    user_id: &str,
    customer_id: &str,
    reference_id: Option<&str>,
) -> Result<(), ApiError> {
    find_customer(db, user_id, customer_id).await?;

    if let Some(reference_id) = reference_id {
        let reference: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM measurement_references WHERE id = ? AND user_id = ? AND customer_id = ?",
        )
        .bind(reference_id)
        .bind(user_id)
        .bind(customer_id)
        .fetch_optional(db)
        .await?;
        if reference.is_none() {
            return Err(ApiError::not_found("Reference not found"));
        }
    }
    Ok(())
}

async fn find_payment(db: &DbPool, user_id: &str, id: &str) -> Result<Payment, ApiError> {
    let payment: Option<Payment> =
        sqlx::query_as("SELECT * FROM payments WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(db)
            .await?;
    payment.ok_or_else(|| ApiError::not_found("Payment not found"))
}

/// POST /api/payments
pub async fn create_payment(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<PaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Payment>>), ApiError> {
    validate_payment_request(&req)?;
    verify_ownership(&state.db, auth.id(), &req.customer_id, req.reference_id.as_deref()).await?;

    let (amount_remaining, status) = derive_balance(req.amount_paid, req.expected_amount);
    let now = db::now();
    let payment = Payment {
        id: Uuid::new_v4().to_string(),
        user_id: auth.id().to_string(),
        customer_id: req.customer_id,
        reference_id: req.reference_id,
        amount_paid: req.amount_paid,
        expected_amount: req.expected_amount,
        amount_remaining,
        payment_date: req.date,
        payment_status: status.map(|s| s.as_str().to_string()),
        payment_method: req.payment_method.map(|m| m.as_str().to_string()),
        description: req.description,
        added_by: Some(auth.user.full_name.clone()),
        created_at: now.clone(),
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO payments (
            id, user_id, customer_id, reference_id, amount_paid, expected_amount,
            amount_remaining, payment_date, payment_status, payment_method,
            description, added_by, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.user_id)
    .bind(&payment.customer_id)
    .bind(&payment.reference_id)
    .bind(payment.amount_paid)
    .bind(payment.expected_amount)
    .bind(payment.amount_remaining)
    .bind(&payment.payment_date)
    .bind(&payment.payment_status)
    .bind(&payment.payment_method)
    .bind(&payment.description)
    .bind(&payment.added_by)
    .bind(&payment.created_at)
    .bind(&payment.updated_at)
    .execute(&state.db)
    .await?;

    tracing::info!(
        user_id = %payment.user_id,
        customer_id = %payment.customer_id,
        payment_id = %payment.id,
        "Recorded payment"
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new("Payment recorded", payment)),
    ))
}

/// PUT /api/payments/:id
pub async fn update_payment(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<PaymentRequest>,
) -> Result<Json<ApiResponse<Payment>>, ApiError> {
    validate_payment_request(&req)?;
    find_payment(&state.db, auth.id(), &id).await?;
    verify_ownership(&state.db, auth.id(), &req.customer_id, req.reference_id.as_deref()).await?;

    let (amount_remaining, status) = derive_balance(req.amount_paid, req.expected_amount);
    sqlx::query(
        r#"
        UPDATE payments SET
            customer_id = ?, reference_id = ?, amount_paid = ?, expected_amount = ?,
            amount_remaining = ?, payment_date = ?, payment_status = ?, payment_method = ?,
            description = ?, updated_at = ?
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(&req.customer_id)
    .bind(&req.reference_id)
    .bind(req.amount_paid)
    .bind(req.expected_amount)
    .bind(amount_remaining)
    .bind(&req.date)
    .bind(status.map(|s| s.as_str()))
    .bind(req.payment_method.map(|m| m.as_str()))
    .bind(&req.description)
    .bind(db::now())
    .bind(&id)
    .bind(auth.id())
    .execute(&state.db)
    .await?;

    let payment = find_payment(&state.db, auth.id(), &id).await?;
    tracing::info!(user_id = %auth.id(), payment_id = %id, "Updated payment");
    Ok(Json(ApiResponse::new("Payment updated", payment)))
}

/// GET /api/payments/customer/:customer_id
pub async fn payments_by_customer(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(customer_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<Payment>>>, ApiError> {
    find_customer(&state.db, auth.id(), &customer_id).await?;

    let payments: Vec<Payment> = sqlx::query_as(
        "SELECT * FROM payments WHERE user_id = ? AND customer_id = ? ORDER BY created_at DESC",
    )
    .bind(auth.id())
    .bind(&customer_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::list("Payments retrieved", payments)))
}

/// GET /api/payments/customer/:customer_id/reference/:reference_id
pub async fn payments_by_reference(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((customer_id, reference_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Vec<Payment>>>, ApiError> {
    verify_ownership(&state.db, auth.id(), &customer_id, Some(&reference_id)).await?;

    let payments: Vec<Payment> = sqlx::query_as(
        r#"
        SELECT * FROM payments
        WHERE user_id = ? AND customer_id = ? AND reference_id = ?
        ORDER BY created_at DESC
        "#,
    )
    .bind(auth.id())
    .bind(&customer_id)
    .bind(&reference_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::list("Payments retrieved", payments)))
}

/// DELETE /api/payments/:id
pub async fn delete_payment(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let result = sqlx::query("DELETE FROM payments WHERE id = ? AND user_id = ?")
        .bind(&id)
        .bind(auth.id())
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Payment not found"));
    }

    tracing::info!(user_id = %auth.id(), payment_id = %id, "Deleted payment");
    Ok(StatusCode::NO_CONTENT)
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
    async fn test_payment_status_is_derived() {
        let (state, _otp) = test_state().await;
        let user_id = seed_user(&state.db, "0241234567", "Kente Couture").await;
        let customer = seed_customer(&state.db, &user_id, "0551234567").await;
        let chest = seed_definition(&state.db, Category::Male, &user_id, "Chest").await;
        let reference = state
            .linker(Category::Male)
            .save(
                &[DetailRow {
                    id: None,
                    measured_value: 40.0,
                    measurement_definition_id: chest,
                    reference_id: None,
                }],
                SaveMode::Create,
                &user_id,
                &customer,
            )
            .await
            .unwrap()
            .reference_id
            .unwrap();
        let app = create_router(state);

        let (status, body) = send(
            &app,
            "POST",
            "/api/payments",
            &user_id,
            Some(json!({
                "customerId": customer,
                "referenceId": reference,
                "amountPaid": 100,
                "expectedAmount": 250,
                "date": "2026-10-17",
                "paymentMethod": "MOBILE_MONEY",
                "paymentStatus": "PAID"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["amountRemaining"], 150.0);
        assert_eq!(body["data"]["paymentStatus"], "PARTIAL");
        assert_eq!(body["data"]["paymentMethod"], "MOBILE_MONEY");
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/api/payments/{}", id),
            &user_id,
            Some(json!({
                "customerId": customer,
                "referenceId": reference,
                "amountPaid": 250,
                "expectedAmount": 250
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["amountRemaining"], 0.0);
        assert_eq!(body["data"]["paymentStatus"], "PAID");

        let (_, body) = send(
            &app,
            "GET",
            &format!("/api/payments/customer/{}/reference/{}", customer, reference),
            &user_id,
            None,
        )
        .await;
        assert_eq!(body["count"], 1);

        let (status, _) = send(&app, "DELETE", &format!("/api/payments/{}", id), &user_id, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = send(
            &app,
            "GET",
            &format!("/api/payments/customer/{}", customer),
            &user_id,
            None,
        )
        .await;
        assert_eq!(body["count"], 0);
    }

    #[tokio::test]
    async fn test_payment_rejects_foreign_customer_and_bad_amount() {
        let (state, _otp) = test_state().await;
        let owner = seed_user(&state.db, "0241234567", "Kente Couture").await;
        let intruder = seed_user(&state.db, "0201234567", "Other Tailors").await;
        let customer = seed_customer(&state.db, &owner, "0551234567").await;
        let app = create_router(state);

        let (status, _) = send(
            &app,
            "POST",
            "/api/payments",
            &intruder,
            Some(json!({"customerId": customer, "amountPaid": 10})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app,
            "POST",
            "/api/payments",
            &owner,
            Some(json!({"customerId": customer, "amountPaid": -5})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["details"]["amountPaid"].is_array());
    }
}
