//! SMTP transport for OTP emails.

use anyhow::Result;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::{LogOtpDelivery, OtpDelivery};
use crate::config::EmailConfig;
use crate::db::User;

pub struct SmtpOtpDelivery {
    config: EmailConfig,
    ttl_minutes: i64,
}

impl SmtpOtpDelivery {
    pub fn new(config: EmailConfig, ttl_minutes: i64) -> Self {
        Self {
            config,
            ttl_minutes,
        }
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<()> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        let from: Mailbox = format!("{} <{}>", self.config.from_name, from_address).parse()?;
        let to: Mailbox = to_email.parse()?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        mailer.build().send(email).await?;

        tracing::info!(to = %to_email, subject = %subject, "Email sent");
        Ok(())
    }
}

#[async_trait]
impl OtpDelivery for SmtpOtpDelivery {
    async fn send_otp(&self, user: &User, code: &str) -> Result<()> {
        let Some(to_email) = user.email_address.as_deref() else {
            return LogOtpDelivery.send_otp(user, code).await;
        };

        let subject = format!("{} verification code", self.config.from_name);
        self.send_email(
            to_email,
            &subject,
            &render_otp_html(&user.full_name, code, self.ttl_minutes),
            &render_otp_text(&user.full_name, code, self.ttl_minutes),
        )
        .await
    }
}

fn render_otp_html(name: &str, code: &str, ttl_minutes: i64) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family: sans-serif;">
  <p>Hello {name},</p>
  <p>Your verification code is:</p>
  <p style="font-size: 24px; font-weight: bold; letter-spacing: 4px;">{code}</p>
  <p>The code expires in {ttl_minutes} minutes. If you did not create an account, ignore this email.</p>
</body>
</html>"#
    )
}

fn render_otp_text(name: &str, code: &str, ttl_minutes: i64) -> String {
    format!(
        "Hello {name},\n\nYour verification code is: {code}\n\nThe code expires in {ttl_minutes} minutes. If you did not create an account, ignore this email.\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_bodies_contain_code() {
        assert!(render_otp_html("Ama", "042137", 10).contains("042137"));
        let text = render_otp_text("Ama", "042137", 10);
        assert!(text.contains("10 minutes"));
        assert!(text.starts_with("Hello Ama"));
        assert!(text.contains("042137"));
    }
}
