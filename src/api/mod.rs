pub mod auth;
mod company;
mod customers;
mod details;
pub mod error;
mod fabrics;
mod forms;
mod measurements;
pub mod metrics;
mod payments;
pub mod rate_limit;
mod references;
mod users;
pub mod validation;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

/// Success envelope shared by every JSON handler
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            count: None,
            data,
        }
    }
}

impl<T> ApiResponse<Vec<T>> {
    /// Envelope for a list, with `count` set to its length
    pub fn list(message: impl Into<String>, data: Vec<T>) -> Self {
        Self {
            message: message.into(),
            count: Some(data.len()),
            data,
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    // Registration and sessions (public, tight rate limit)
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/verify-otp", post(auth::verify_otp))
        .route("/resend-otp", post(auth::resend_otp))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ));

    // Form links opened by customers (no account), served to the form
    // page on its own origin
    let public_routes = Router::new()
        .route("/forms", get(forms::validate_token))
        .route("/forms/s/:short_id", get(forms::resolve_short_link))
        .route("/forms/submit", post(forms::submit_form))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_public,
        ))
        .layer(CorsLayer::permissive());

    // Everything else requires a bearer token via the AuthUser extractor
    let api_routes = Router::new()
        // Account
        .route("/users/me", get(users::get_me))
        .route("/users/me", put(users::update_me))
        .route("/users/me", delete(users::delete_me))
        .route("/company", get(company::get_company))
        .route("/company", put(company::update_company))
        .route("/settings", get(company::get_settings))
        .route("/settings", put(company::update_settings))
        // Customers
        .route("/customers", get(customers::list_customers))
        .route("/customers", post(customers::create_customer))
        .route("/customers/:id", get(customers::get_customer))
        .route("/customers/:id", put(customers::update_customer))
        .route("/customers/:id", delete(customers::delete_customer))
        // Measurement definitions
        .route("/measurements/:category", get(measurements::list_definitions))
        .route("/measurements/:category", post(measurements::create_definition))
        .route("/measurements/:category/:id", put(measurements::update_definition))
        .route("/measurements/:category/:id", delete(measurements::delete_definition))
        // Measurement details. `:id` is the customer for POST/PUT and
        // the reference for DELETE.
        .route("/details/:category/:id", post(details::create_details))
        .route("/details/:category/:id", put(details::update_details))
        .route("/details/:category/:id", delete(details::delete_details))
        .route(
            "/details/:category/customer/:customer_id",
            get(details::details_by_customer),
        )
        .route(
            "/details/:category/reference/:reference_id",
            get(details::details_by_reference),
        )
        // References
        .route("/references/:id", get(references::get_reference))
        .route(
            "/references/customer/:customer_id",
            get(references::references_by_customer),
        )
        .route(
            "/references/customer/:customer_id/details",
            get(references::customer_details),
        )
        // Payments
        .route("/payments", post(payments::create_payment))
        .route("/payments/:id", put(payments::update_payment))
        .route("/payments/:id", delete(payments::delete_payment))
        .route(
            "/payments/customer/:customer_id",
            get(payments::payments_by_customer),
        )
        .route(
            "/payments/customer/:customer_id/reference/:reference_id",
            get(payments::payments_by_reference),
        )
        // Fabrics
        .route("/fabrics", get(fabrics::list_fabrics))
        .route("/fabrics", post(fabrics::create_fabric))
        .route("/fabrics/:id", get(fabrics::get_fabric))
        .route("/fabrics/:id", put(fabrics::update_fabric))
        .route("/fabrics/:id", delete(fabrics::delete_fabric))
        .route(
            "/fabrics/customer/:customer_id/reference/:reference_id",
            get(fabrics::fabrics_by_reference),
        )
        // Form links
        .route("/forms", post(forms::issue_form))
        .route("/forms/active", get(forms::list_active_forms))
        .route("/forms/:id", delete(forms::revoke_form))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_api,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api/auth", auth_routes)
        .nest("/api", public_routes.merge(api_routes))
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
