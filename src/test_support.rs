//! Fixtures shared by the unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::Config;
use crate::db::{self, DbPool};
use crate::measurements::Category;
use crate::notifications::OtpDelivery;
use crate::AppState;

pub const TEST_SECRET: &str = "test-secret";
pub const TEST_PASSWORD: &str = "Str0ng@Pass";

pub async fn test_pool() -> DbPool {
    db::init_in_memory().await.unwrap()
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.jwt_secret = TEST_SECRET.to_string();
    config.rate_limit.enabled = false;
    config
}

/// Insert a verified user with a company and return its id
pub async fn seed_user(pool: &DbPool, phone: &str, company: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    let now = db::now();
    let password_hash = crate::crypto::hash_password(TEST_PASSWORD).unwrap();

    sqlx::query(
        "INSERT INTO users (id, full_name, phone_number, password_hash, is_verified, created_at, updated_at) VALUES (?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(&id)
    .bind("Kofi Boateng")
    .bind(phone)
    .bind(&password_hash)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO companies (id, user_id, company_name, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&id)
    .bind(company)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .unwrap();

    id
}

pub async fn seed_customer(pool: &DbPool, user_id: &str, phone: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    let now = db::now();

    sqlx::query(
        "INSERT INTO customers (id, user_id, full_name, phone_number, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind("Esi Owusu")
    .bind(phone)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .unwrap();

    id
}

pub async fn seed_definition(
    pool: &DbPool,
    category: Category,
    user_id: &str,
    name: &str,
) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    let now = db::now();

    sqlx::query(&format!(
        "INSERT INTO {} (id, user_id, name, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        category.definitions_table()
    ))
    .bind(&id)
    .bind(user_id)
    .bind(name)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .unwrap();

    id
}

pub async fn count_rows(pool: &DbPool, table: &str) -> i64 {
    let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap();
    count
}

/// Captures OTP codes instead of sending them
#[derive(Default)]
pub struct RecordingOtpDelivery {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingOtpDelivery {
    pub fn last_code(&self) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .last()
            .map(|(_, code)| code.clone())
    }
}

#[async_trait]
impl OtpDelivery for RecordingOtpDelivery {
    async fn send_otp(&self, user: &db::User, code: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((user.id.clone(), code.to_string()));
        Ok(())
    }
}

/// Application state over a fresh in-memory database
pub async fn test_state() -> (Arc<AppState>, Arc<RecordingOtpDelivery>) {
    let pool = test_pool().await;
    let otp = Arc::new(RecordingOtpDelivery::default());
    let state = AppState::new(test_config(), pool, otp.clone());
    (Arc::new(state), otp)
}

/// Bearer header value for `user_id`
pub fn bearer(user_id: &str) -> String {
    let token = crate::crypto::sign_access_token(
        TEST_SECRET,
        user_id,
        chrono::Utc::now(),
        chrono::Duration::hours(1),
    )
    .unwrap();
    format!("Bearer {}", token)
}
