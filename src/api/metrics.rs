//! Prometheus metrics endpoint, request tracking middleware and the
//! domain counters recorded by the linker and the form issuer.

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::db::{self, FormType};
use crate::measurements::Category;
use crate::AppState;

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const MEASUREMENT_DETAILS_SAVED_TOTAL: &str = "measurement_details_saved_total";
pub const FORM_LINKS_ISSUED_TOTAL: &str = "form_links_issued_total";
pub const FORM_LINKS_SWEPT_TOTAL: &str = "form_links_swept_total";
pub const FORM_LINKS_ACTIVE: &str = "form_links_active";

/// Install the Prometheus recorder. Call once at startup.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(HTTP_REQUEST_DURATION_SECONDS, "HTTP request duration in seconds");
    describe_counter!(
        MEASUREMENT_DETAILS_SAVED_TOTAL,
        "Measurement detail rows created or updated, by category"
    );
    describe_counter!(FORM_LINKS_ISSUED_TOTAL, "Form links issued, by form type");
    describe_counter!(FORM_LINKS_SWEPT_TOTAL, "Expired form links removed by the sweep");
    describe_gauge!(FORM_LINKS_ACTIVE, "Form links that have not expired yet");

    Ok(handle)
}

/// GET /metrics
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if let Ok(count) =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM forms WHERE expires_at > ?")
            .bind(db::now())
            .fetch_one(&state.db)
            .await
    {
        gauge!(FORM_LINKS_ACTIVE).set(count as f64);
    }

    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Records `http_requests_total` and `http_request_duration_seconds`
/// labelled by method and matched route.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    // Matched route keeps ids out of the label set
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

pub fn record_details_saved(category: Category, count: usize) {
    counter!(MEASUREMENT_DETAILS_SAVED_TOTAL, "category" => category.as_str()).increment(count as u64);
}

pub fn record_form_issued(form_type: FormType) {
    counter!(FORM_LINKS_ISSUED_TOTAL, "form_type" => form_type.as_str()).increment(1);
}

pub fn record_forms_swept(count: u64) {
    counter!(FORM_LINKS_SWEPT_TOTAL).increment(count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(HTTP_REQUESTS_TOTAL.ends_with("_total"));
        assert!(MEASUREMENT_DETAILS_SAVED_TOTAL.ends_with("_total"));
        assert!(FORM_LINKS_ISSUED_TOTAL.ends_with("_total"));
        assert!(FORM_LINKS_SWEPT_TOTAL.ends_with("_total"));
        assert!(HTTP_REQUEST_DURATION_SECONDS.ends_with("_seconds"));
    }
}
