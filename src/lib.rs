pub mod api;
pub mod config;
pub mod crypto;
pub mod db;
pub mod forms;
pub mod measurements;
pub mod notifications;

#[cfg(test)]
pub(crate) mod test_support;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::api::validation::UniqueCheck;
use crate::forms::FormIssuer;
use crate::measurements::{Category, DetailLinker};
use crate::notifications::OtpDelivery;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics_handle: Option<PrometheusHandle>,
    pub otp_delivery: Arc<dyn OtpDelivery>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool, otp_delivery: Arc<dyn OtpDelivery>) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            config,
            db,
            rate_limiter,
            metrics_handle: None,
            otp_delivery,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    pub fn linker(&self, category: Category) -> DetailLinker {
        DetailLinker::new(self.db.clone(), category)
    }

    pub fn form_issuer(&self) -> FormIssuer {
        FormIssuer::new(
            self.db.clone(),
            self.config.auth.jwt_secret.clone(),
            self.config.forms.clone(),
        )
    }

    pub fn unique_check(&self) -> UniqueCheck {
        UniqueCheck::new(self.db.clone())
    }
}
