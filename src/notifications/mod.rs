//! OTP delivery for account verification.
//!
//! Codes go out by email when SMTP is configured. Without SMTP, or for
//! users without an email address, the code is written to the log so
//! local setups still work.

mod email;

pub use email::SmtpOtpDelivery;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::EmailConfig;
use crate::db::User;

/// Sends a one-time code to a user
#[async_trait]
pub trait OtpDelivery: Send + Sync {
    async fn send_otp(&self, user: &User, code: &str) -> Result<()>;
}

/// Writes codes to the log instead of sending them
pub struct LogOtpDelivery;

#[async_trait]
impl OtpDelivery for LogOtpDelivery {
    async fn send_otp(&self, user: &User, code: &str) -> Result<()> {
        tracing::info!(
            user_id = %user.id,
            phone = %user.phone_number,
            code = %code,
            "OTP issued (no email transport configured)"
        );
        Ok(())
    }
}

/// Pick the delivery channel for the given email settings
pub fn otp_delivery(config: &EmailConfig, ttl_minutes: i64) -> Arc<dyn OtpDelivery> {
    if config.is_configured() {
        Arc::new(SmtpOtpDelivery::new(config.clone(), ttl_minutes))
    } else {
        tracing::warn!("SMTP not configured, OTP codes will be logged");
        Arc::new(LogOtpDelivery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: "u1".to_string(),
            full_name: "Ama Mensah".to_string(),
            phone_number: "0241234567".to_string(),
            email_address: None,
            password_hash: String::new(),
            is_verified: false,
            username: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[tokio::test]
    async fn test_log_delivery_always_succeeds() {
        LogOtpDelivery.send_otp(&user(), "123456").await.unwrap();
    }

    #[tokio::test]
    async fn test_smtp_delivery_falls_back_without_address() {
        let mut config = EmailConfig::default();
        config.smtp_host = Some("smtp.invalid".to_string());
        config.from_address = Some("noreply@example.com".to_string());

        // No email address on the user, so nothing is sent over the network
        let delivery = otp_delivery(&config, 10);
        delivery.send_otp(&user(), "123456").await.unwrap();
    }
}
