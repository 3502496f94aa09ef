//! Registration, OTP verification, login and the `AuthUser` extractor.
//!
//! Access tokens are HS256 JWTs whose subject is the user id. Refresh
//! tokens are opaque, stored as SHA-256 hashes and rotated on every use.

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    Json,
};
use chrono::{Duration, Utc};
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    validate_email, validate_password, validate_phone, validate_required, validate_username,
    UniqueCheck, UniqueField,
};
use super::ApiResponse;
use crate::crypto;
use crate::db::{
    self, LoginRequest, LoginResponse, Otp, RefreshRequest, RegisterRequest, ResendOtpRequest,
    TokenPair, User, UserResponse, VerifyOtpRequest,
};
use crate::AppState;

/// The authenticated tenant. Every protected handler scopes its queries
/// to `user.id`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
}

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.user.id
    }

    /// Reject a request that names a different tenant than the token
    pub fn ensure_same(&self, claimed: Option<&str>) -> Result<(), ApiError> {
        match claimed {
            Some(id) if id != self.user.id => {
                tracing::warn!(user_id = %self.user.id, claimed = %id, "Cross-tenant request rejected");
                Err(ApiError::forbidden("You cannot act on behalf of another user"))
            }
            _ => Ok(()),
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::unauthorized("Missing bearer token"))?;

        let user_id = crypto::verify_access_token(&state.config.auth.jwt_secret, token)
            .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;

        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(&user_id)
            .fetch_optional(&state.db)
            .await?;

        let user = user.ok_or_else(|| ApiError::unauthorized("User no longer exists"))?;
        Ok(AuthUser { user })
    }
}

fn validate_register_request(req: &RegisterRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("fullName", validate_required(&req.full_name, "Full name", 100))
        .check("phoneNumber", validate_phone(&req.phone_number))
        .check("emailAddress", validate_email(&req.email_address))
        .check("password", validate_password(&req.password))
        .check("username", validate_username(&req.username))
        .check("companyName", validate_required(&req.company_name, "Company name", 100));
    errors.finish()
}

async fn ensure_unique(
    check: &UniqueCheck,
    field: UniqueField,
    value: Option<&str>,
    except_user: Option<&str>,
) -> Result<(), ApiError> {
    if let Some(value) = value {
        if !check.is_unique(field, value, except_user).await? {
            return Err(ApiError::conflict(field.message()));
        }
    }
    Ok(())
}

/// Replace any outstanding codes for the user with a fresh one and send it
async fn issue_otp(state: &AppState, user: &User) -> Result<(), ApiError> {
    let code = crypto::generate_otp();
    let now = Utc::now();
    let expires_at = db::timestamp(now + Duration::minutes(state.config.auth.otp_ttl_minutes));

    let mut tx = state.db.begin().await?;
    sqlx::query("DELETE FROM otps WHERE user_id = ?")
        .bind(&user.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO otps (id, user_id, code, expires_at, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&user.id)
        .bind(&code)
        .bind(&expires_at)
        .bind(db::timestamp(now))
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    // A failed send is recoverable through resend-otp
    if let Err(e) = state.otp_delivery.send_otp(user, &code).await {
        tracing::error!(user_id = %user.id, error = %e, "Failed to deliver OTP");
    }
    Ok(())
}

/// Create an access token and a stored refresh token for the user
async fn issue_tokens(state: &AppState, user_id: &str) -> Result<TokenPair, ApiError> {
    let now = Utc::now();
    let access_token = crypto::sign_access_token(
        &state.config.auth.jwt_secret,
        user_id,
        now,
        Duration::hours(state.config.auth.access_token_ttl_hours),
    )
    .map_err(|e| {
        tracing::error!(error = %e, "Failed to sign access token");
        ApiError::internal("Failed to create session")
    })?;

    let refresh_token = crypto::generate_token();
    sqlx::query(
        "INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(crypto::hash_token(&refresh_token))
    .bind(db::timestamp(now + Duration::days(state.config.auth.refresh_token_ttl_days)))
    .bind(db::timestamp(now))
    .execute(&state.db)
    .await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserResponse>>), ApiError> {
    validate_register_request(&req)?;

    let check = state.unique_check();
    ensure_unique(&check, UniqueField::UserPhone, Some(&req.phone_number), None).await?;
    ensure_unique(&check, UniqueField::UserEmail, req.email_address.as_deref(), None).await?;
    ensure_unique(&check, UniqueField::Username, req.username.as_deref(), None).await?;
    ensure_unique(&check, UniqueField::CompanyName, Some(req.company_name.trim()), None).await?;

    let password_hash = crypto::hash_password(&req.password).map_err(|e| {
        tracing::error!(error = %e, "Failed to hash password");
        ApiError::internal("Failed to create account")
    })?;

    let now = db::now();
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        full_name: req.full_name.trim().to_string(),
        phone_number: req.phone_number.clone(),
        email_address: req.email_address.clone(),
        password_hash,
        is_verified: false,
        username: req.username.clone(),
        created_at: now.clone(),
        updated_at: now.clone(),
    };

    let mut tx = state.db.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO users (id, full_name, phone_number, email_address, password_hash, is_verified, username, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?)
        "#,
    )
    .bind(&user.id)
    .bind(&user.full_name)
    .bind(&user.phone_number)
    .bind(&user.email_address)
    .bind(&user.password_hash)
    .bind(&user.username)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO companies (id, user_id, company_name, added_by, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&user.id)
    .bind(req.company_name.trim())
    .bind(&user.full_name)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(user_id = %user.id, "Registered user");
    issue_otp(&state, &user).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            "Account created. Verify with the code sent to you.",
            UserResponse::from(user),
        )),
    ))
}

/// POST /api/auth/verify-otp
pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&req.user_id)
        .fetch_optional(&state.db)
        .await?;
    let user = user.ok_or_else(|| ApiError::not_found("User not found"))?;

    if user.is_verified {
        return Ok(Json(ApiResponse::new(
            "Account already verified",
            UserResponse::from(user),
        )));
    }

    let otp: Option<Otp> = sqlx::query_as(
        "SELECT * FROM otps WHERE user_id = ? AND expires_at > ? ORDER BY created_at DESC LIMIT 1",
    )
    .bind(&user.id)
    .bind(db::now())
    .fetch_optional(&state.db)
    .await?;

    let valid = otp
        .map(|otp| crypto::constant_time_eq(&otp.code, req.code.trim()))
        .unwrap_or(false);
    if !valid {
        return Err(ApiError::bad_request("Invalid or expired OTP"));
    }

    let mut tx = state.db.begin().await?;
    sqlx::query("UPDATE users SET is_verified = 1, updated_at = ? WHERE id = ?")
        .bind(db::now())
        .bind(&user.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM otps WHERE user_id = ?")
        .bind(&user.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(user_id = %user.id, "Verified user");

    let mut user = user;
    user.is_verified = true;
    Ok(Json(ApiResponse::new(
        "Account verified",
        UserResponse::from(user),
    )))
}

/// POST /api/auth/resend-otp
pub async fn resend_otp(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResendOtpRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&req.user_id)
        .fetch_optional(&state.db)
        .await?;
    let user = user.ok_or_else(|| ApiError::not_found("User not found"))?;

    if user.is_verified {
        return Err(ApiError::bad_request("Account already verified"));
    }

    issue_otp(&state, &user).await?;
    Ok(Json(ApiResponse::new("A new code has been sent", ())))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    let identifier = req.email_phone.trim();
    let user: Option<User> =
        sqlx::query_as("SELECT * FROM users WHERE email_address = ? OR phone_number = ?")
            .bind(identifier)
            .bind(identifier)
            .fetch_optional(&state.db)
            .await?;

    let user = match user {
        Some(u) if crypto::verify_password(&req.password, &u.password_hash) => u,
        _ => {
            tracing::debug!("Login failed for {}", identifier);
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
    };

    if !user.is_verified {
        return Err(ApiError::forbidden("Account has not been verified"));
    }

    let tokens = issue_tokens(&state, &user.id).await?;
    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(ApiResponse::new(
        "Login successful",
        LoginResponse {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            user: UserResponse::from(user),
        },
    )))
}

/// POST /api/auth/refresh
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<ApiResponse<TokenPair>>, ApiError> {
    let token_hash = crypto::hash_token(&req.refresh_token);

    let row: Option<(String, String)> = sqlx::query_as(
        "SELECT id, user_id FROM refresh_tokens WHERE token_hash = ? AND expires_at > ?",
    )
    .bind(&token_hash)
    .bind(db::now())
    .fetch_optional(&state.db)
    .await?;

    let (id, user_id) = row.ok_or_else(|| ApiError::unauthorized("Invalid refresh token"))?;

    sqlx::query("DELETE FROM refresh_tokens WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    let tokens = issue_tokens(&state, &user_id).await?;
    Ok(Json(ApiResponse::new("Token refreshed", tokens)))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = ?")
        .bind(crypto::hash_token(&req.refresh_token))
        .execute(&state.db)
        .await?;

    Ok(Json(ApiResponse::new("Logged out", ())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::create_router;
    use crate::test_support::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn post_json(app: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn registration() -> Value {
        json!({
            "fullName": "Ama Mensah",
            "phoneNumber": "0241234567",
            "emailAddress": "ama@kente.com",
            "password": TEST_PASSWORD,
            "companyName": "Kente Couture"
        })
    }

    #[tokio::test]
    async fn test_register_verify_login_refresh() {
        let (state, otp) = test_state().await;
        let app = create_router(state.clone());

        let (status, body) = post_json(&app, "/api/auth/register", registration()).await;
        assert_eq!(status, StatusCode::CREATED);
        let user_id = body["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["isVerified"], false);
        assert!(body["data"].get("passwordHash").is_none());

        let login = json!({"emailPhone": "0241234567", "password": TEST_PASSWORD});
        let (status, _) = post_json(&app, "/api/auth/login", login.clone()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = post_json(
            &app,
            "/api/auth/verify-otp",
            json!({"userId": user_id, "code": "000000x"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let code = otp.last_code().unwrap();
        let (status, body) = post_json(
            &app,
            "/api/auth/verify-otp",
            json!({"userId": user_id, "code": code}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["isVerified"], true);
        assert_eq!(count_rows(&state.db, "otps").await, 0);

        let (status, body) = post_json(&app, "/api/auth/login", login).await;
        assert_eq!(status, StatusCode::OK);
        let access = body["data"]["accessToken"].as_str().unwrap();
        assert_eq!(
            crypto::verify_access_token(TEST_SECRET, access).as_deref(),
            Some(user_id.as_str())
        );

        let refresh_token = body["data"]["refreshToken"].as_str().unwrap().to_string();
        let (status, body) = post_json(
            &app,
            "/api/auth/refresh",
            json!({"refreshToken": refresh_token}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(body["data"]["refreshToken"], refresh_token);

        // Rotated tokens cannot be replayed
        let (status, _) = post_json(
            &app,
            "/api/auth/refresh",
            json!({"refreshToken": refresh_token}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_bad_input() {
        let (state, _otp) = test_state().await;
        let app = create_router(state);

        let (status, _) = post_json(&app, "/api/auth/register", registration()).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = post_json(&app, "/api/auth/register", registration()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Phone number already exists");

        let mut weak = registration();
        weak["phoneNumber"] = json!("0201234567");
        weak["password"] = json!("weak");
        let (status, body) = post_json(&app, "/api/auth/register", weak).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["details"]["password"].is_array());
    }

    #[tokio::test]
    async fn test_login_with_wrong_password() {
        let (state, _otp) = test_state().await;
        seed_user(&state.db, "0241234567", "Kente Couture").await;
        let app = create_router(state);

        let (status, body) = post_json(
            &app,
            "/api/auth/login",
            json!({"emailPhone": "0241234567", "password": "Wr0ng@Pass"}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "unauthorized");
    }

    #[tokio::test]
    async fn test_protected_route_requires_valid_token() {
        let (state, _otp) = test_state().await;
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/users/me")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/users/me")
                    .header("authorization", "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_ensure_same() {
        let auth = AuthUser {
            user: User {
                id: "u1".to_string(),
                full_name: String::new(),
                phone_number: String::new(),
                email_address: None,
                password_hash: String::new(),
                is_verified: true,
                username: None,
                created_at: String::new(),
                updated_at: String::new(),
            },
        };
        assert!(auth.ensure_same(None).is_ok());
        assert!(auth.ensure_same(Some("u1")).is_ok());
        assert_eq!(
            auth.ensure_same(Some("u2")).unwrap_err().status(),
            StatusCode::FORBIDDEN
        );
    }
}
