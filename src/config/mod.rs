use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub forms: FormsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_database_file")]
    pub database_file: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            database_file: default_database_file(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_database_file() -> String {
    "tailorbook.db".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for access tokens and form link tokens
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_access_token_ttl_hours")]
    pub access_token_ttl_hours: i64,
    #[serde(default = "default_refresh_token_ttl_days")]
    pub refresh_token_ttl_days: i64,
    #[serde(default = "default_otp_ttl_minutes")]
    pub otp_ttl_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            access_token_ttl_hours: default_access_token_ttl_hours(),
            refresh_token_ttl_days: default_refresh_token_ttl_days(),
            otp_ttl_minutes: default_otp_ttl_minutes(),
        }
    }
}

fn default_jwt_secret() -> String {
    // Tokens will not survive a restart unless a secret is configured
    warn!("No auth.jwt_secret configured, generating an ephemeral one");
    uuid::Uuid::new_v4().to_string()
}

fn default_access_token_ttl_hours() -> i64 {
    3
}

fn default_refresh_token_ttl_days() -> i64 {
    7
}

fn default_otp_ttl_minutes() -> i64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormsConfig {
    /// Page that renders the measurement form; receives `?id=..&token=..`
    #[serde(default = "default_public_form_url")]
    pub public_form_url: String,
    /// Prefix for short links, the short id is appended as a path segment
    #[serde(default = "default_short_url_base")]
    pub short_url_base: String,
    #[serde(default = "default_link_ttl_days")]
    pub link_ttl_days: i64,
    #[serde(default = "default_short_id_length")]
    pub short_id_length: usize,
    #[serde(default = "default_true")]
    pub sweep_enabled: bool,
    /// Cron expression (with seconds) for purging expired links
    #[serde(default = "default_sweep_schedule")]
    pub sweep_schedule: String,
}

impl Default for FormsConfig {
    fn default() -> Self {
        Self {
            public_form_url: default_public_form_url(),
            short_url_base: default_short_url_base(),
            link_ttl_days: default_link_ttl_days(),
            short_id_length: default_short_id_length(),
            sweep_enabled: true,
            sweep_schedule: default_sweep_schedule(),
        }
    }
}

fn default_public_form_url() -> String {
    "http://localhost:4200/forms".to_string()
}

fn default_short_url_base() -> String {
    "http://localhost:8080/api/forms/s".to_string()
}

fn default_link_ttl_days() -> i64 {
    30
}

fn default_short_id_length() -> usize {
    8
}

fn default_sweep_schedule() -> String {
    "0 0 0 * * *".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Requests per window for authenticated API routes
    #[serde(default = "default_api_requests")]
    pub api_requests_per_window: u32,
    /// Requests per window for login, registration and OTP routes
    #[serde(default = "default_auth_requests")]
    pub auth_requests_per_window: u32,
    /// Requests per window for the public form endpoints
    #[serde(default = "default_public_requests")]
    pub public_requests_per_window: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_requests_per_window: default_api_requests(),
            auth_requests_per_window: default_auth_requests(),
            public_requests_per_window: default_public_requests(),
            window_seconds: default_window_seconds(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

fn default_api_requests() -> u32 {
    300
}

fn default_auth_requests() -> u32 {
    20
}

fn default_public_requests() -> u32 {
    60
}

fn default_window_seconds() -> u64 {
    60
}

fn default_cleanup_interval() -> u64 {
    300
}

/// SMTP settings for OTP delivery. Leaving `smtp_host` unset logs codes instead.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    #[serde(default = "default_true")]
    pub smtp_tls: bool,
    pub from_address: Option<String>,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some() && self.from_address.is_some()
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            smtp_tls: true,
            from_address: None,
            from_name: default_from_name(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Tailorbook".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            forms: FormsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            email: EmailConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9000

            [auth]
            jwt_secret = "s3cret"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.jwt_secret, "s3cret");
        assert_eq!(config.auth.otp_ttl_minutes, 10);
        assert_eq!(config.forms.link_ttl_days, 30);
        assert_eq!(config.forms.sweep_schedule, "0 0 0 * * *");
        assert!(config.rate_limit.enabled);
        assert!(!config.email.is_configured());
    }

    #[test]
    fn test_email_configured_requires_host_and_sender() {
        let mut email = EmailConfig::default();
        email.smtp_host = Some("smtp.example.com".to_string());
        assert!(!email.is_configured());
        email.from_address = Some("noreply@example.com".to_string());
        assert!(email.is_configured());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load(Path::new("/nonexistent/tailorbook.toml")).unwrap();
        assert_eq!(config.server.database_file, "tailorbook.db");
    }
}
