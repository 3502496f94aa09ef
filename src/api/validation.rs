//! Input validation for API requests.
//!
//! Format checks are plain functions returning `Result<(), String>` so they
//! can be fed to `ValidationErrorBuilder::check`. Uniqueness checks need the
//! database and live on `UniqueCheck`, which is built from the pool.

use lazy_static::lazy_static;
use regex::Regex;

use crate::db::DbPool;

lazy_static! {
    /// Ghanaian mobile and landline numbers, local or +233 form
    static ref PHONE_REGEX: Regex = Regex::new(
        r"^(?:\+233|0)(?:[2357]\d{8}|[23][2-9]\d{7})$"
    ).unwrap();

    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9-]+(\.[a-zA-Z0-9-]+)*\.[a-zA-Z]{2,}$"
    ).unwrap();

    static ref USERNAME_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9_.]{3,30}$"
    ).unwrap();

    static ref DATE_REGEX: Regex = Regex::new(
        r"^\d{4}-\d{2}-\d{2}$"
    ).unwrap();
}

const PASSWORD_SPECIALS: &str = "@$!%*?&";

pub fn validate_phone(phone: &str) -> Result<(), String> {
    if phone.trim().is_empty() {
        return Err("Phone number is required".to_string());
    }
    if !PHONE_REGEX.is_match(phone) {
        return Err("Invalid phone number".to_string());
    }
    Ok(())
}

/// Validate an email address (optional field)
pub fn validate_email(email: &Option<String>) -> Result<(), String> {
    if let Some(e) = email {
        if e.len() > 254 {
            return Err("Email address is too long".to_string());
        }
        if !EMAIL_REGEX.is_match(e) {
            return Err("Invalid email address".to_string());
        }
    }
    Ok(())
}

pub fn validate_username(username: &Option<String>) -> Result<(), String> {
    if let Some(u) = username {
        if !USERNAME_REGEX.is_match(u) {
            return Err(
                "Username must be 3-30 characters of letters, digits, '_' or '.'".to_string(),
            );
        }
    }
    Ok(())
}

/// At least 8 characters with lower, upper, digit and one of `@$!%*?&`
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }

    let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| PASSWORD_SPECIALS.contains(c));

    if !(has_lowercase && has_uppercase && has_digit && has_special) {
        return Err(format!(
            "Password must contain uppercase, lowercase, a digit and one of {}",
            PASSWORD_SPECIALS
        ));
    }

    Ok(())
}

/// Required free-text field with a length cap
pub fn validate_required(value: &str, label: &str, max_len: usize) -> Result<(), String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(format!("{} is required", label));
    }
    if trimmed.chars().count() > max_len {
        return Err(format!("{} is too long (max {} characters)", label, max_len));
    }
    Ok(())
}

/// Optional free-text field with a length cap
pub fn validate_optional(value: &Option<String>, label: &str, max_len: usize) -> Result<(), String> {
    match value {
        Some(v) if v.chars().count() > max_len => Err(format!(
            "{} is too long (max {} characters)",
            label, max_len
        )),
        _ => Ok(()),
    }
}

/// Validate a UUID format
pub fn validate_uuid(id: &str, field_name: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{} is required", field_name));
    }
    if uuid::Uuid::parse_str(id).is_err() {
        return Err(format!("Invalid {} format", field_name));
    }
    Ok(())
}

/// `YYYY-MM-DD` or a full RFC 3339 timestamp (optional field)
pub fn validate_date(date: &Option<String>, label: &str) -> Result<(), String> {
    let Some(d) = date else {
        return Ok(());
    };

    let valid = if DATE_REGEX.is_match(d) {
        chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d").is_ok()
    } else {
        chrono::DateTime::parse_from_rfc3339(d).is_ok()
    };

    if valid {
        Ok(())
    } else {
        Err(format!("{} must be a date (YYYY-MM-DD)", label))
    }
}

pub fn validate_amount(amount: f64, label: &str) -> Result<(), String> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(format!("{} must be a non-negative number", label));
    }
    Ok(())
}

/// Globally unique user-facing identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    UserPhone,
    UserEmail,
    Username,
    CompanyName,
}

impl UniqueField {
    fn query(&self) -> &'static str {
        match self {
            UniqueField::UserPhone => {
                "SELECT COUNT(*) FROM users WHERE phone_number = ? AND id != ?"
            }
            UniqueField::UserEmail => {
                "SELECT COUNT(*) FROM users WHERE email_address = ? AND id != ?"
            }
            UniqueField::Username => "SELECT COUNT(*) FROM users WHERE username = ? AND id != ?",
            UniqueField::CompanyName => {
                "SELECT COUNT(*) FROM companies WHERE company_name = ? AND user_id != ?"
            }
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            UniqueField::UserPhone => "Phone number already exists",
            UniqueField::UserEmail => "Email address already exists",
            UniqueField::Username => "Username already exists",
            UniqueField::CompanyName => "Company name already exists",
        }
    }
}

/// Uniqueness lookups against the database
#[derive(Clone)]
pub struct UniqueCheck {
    db: DbPool,
}

impl UniqueCheck {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// True when no row other than the one owned by `except_user` holds `value`
    pub async fn is_unique(
        &self,
        field: UniqueField,
        value: &str,
        except_user: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(field.query())
            .bind(value)
            .bind(except_user.unwrap_or(""))
            .fetch_one(&self.db)
            .await?;
        Ok(count == 0)
    }

    /// Customer phone numbers are unique per tenant
    pub async fn customer_phone_is_unique(
        &self,
        user_id: &str,
        phone: &str,
        except_customer: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM customers WHERE user_id = ? AND phone_number = ? AND id != ?",
        )
        .bind(user_id)
        .bind(phone)
        .bind(except_customer.unwrap_or(""))
        .fetch_one(&self.db)
        .await?;
        Ok(count == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("0241234567").is_ok());
        assert!(validate_phone("+233241234567").is_ok());
        assert!(validate_phone("0302345678").is_ok());
        assert!(validate_phone("0141234567").is_err());
        assert!(validate_phone("024123456").is_err());
        assert!(validate_phone("").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email(&None).is_ok());
        assert!(validate_email(&Some("ama@shop.com.gh".to_string())).is_ok());
        assert!(validate_email(&Some("ama@".to_string())).is_err());
        assert!(validate_email(&Some("not an email".to_string())).is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("Str0ng@Pass").is_ok());
        assert!(validate_password("Sh0rt@").is_err());
        assert!(validate_password("nouppercase1@").is_err());
        assert!(validate_password("NoDigits@@").is_err());
        assert!(validate_password("NoSpecial123").is_err());
        // '#' is not in the accepted special set
        assert!(validate_password("Str0ng#Pass").is_err());
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username(&None).is_ok());
        assert!(validate_username(&Some("kofi.tailor".to_string())).is_ok());
        assert!(validate_username(&Some("ko".to_string())).is_err());
        assert!(validate_username(&Some("has space".to_string())).is_err());
    }

    #[test]
    fn test_validate_required_and_optional() {
        assert!(validate_required("Chest", "Name", 10).is_ok());
        assert!(validate_required("   ", "Name", 10).is_err());
        assert!(validate_required("Shoulder to wrist", "Name", 10).is_err());
        assert!(validate_optional(&None, "Address", 5).is_ok());
        assert!(validate_optional(&Some("Accra Central".to_string()), "Address", 5).is_err());
    }

    #[test]
    fn test_validate_date_and_amount() {
        assert!(validate_date(&None, "Date").is_ok());
        assert!(validate_date(&Some("2026-10-17".to_string()), "Date").is_ok());
        assert!(validate_date(&Some("2026-10-17T09:00:00Z".to_string()), "Date").is_ok());
        assert!(validate_date(&Some("2026-13-40".to_string()), "Date").is_err());
        assert!(validate_date(&Some("yesterday".to_string()), "Date").is_err());

        assert!(validate_amount(0.0, "Amount").is_ok());
        assert!(validate_amount(-1.0, "Amount").is_err());
        assert!(validate_amount(f64::INFINITY, "Amount").is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000", "customerId").is_ok());
        assert!(validate_uuid("invalid", "customerId").is_err());
        assert!(validate_uuid("", "customerId").is_err());
    }

    #[tokio::test]
    async fn test_unique_check() {
        let pool = test_pool().await;
        let user_id = seed_user(&pool, "0241234567", "Kente Couture").await;
        let check = UniqueCheck::new(pool.clone());

        assert!(!check
            .is_unique(UniqueField::UserPhone, "0241234567", None)
            .await
            .unwrap());
        assert!(check
            .is_unique(UniqueField::UserPhone, "0241234567", Some(&user_id))
            .await
            .unwrap());
        assert!(!check
            .is_unique(UniqueField::CompanyName, "Kente Couture", None)
            .await
            .unwrap());
        assert!(check
            .is_unique(UniqueField::UserEmail, "new@shop.com", None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_customer_phone_unique_per_tenant() {
        let pool = test_pool().await;
        let user_a = seed_user(&pool, "0241234567", "Kente Couture").await;
        let user_b = seed_user(&pool, "0201234567", "Other Tailors").await;
        let customer = seed_customer(&pool, &user_a, "0551234567").await;
        let check = UniqueCheck::new(pool.clone());

        assert!(!check
            .customer_phone_is_unique(&user_a, "0551234567", None)
            .await
            .unwrap());
        assert!(check
            .customer_phone_is_unique(&user_a, "0551234567", Some(&customer))
            .await
            .unwrap());
        assert!(check
            .customer_phone_is_unique(&user_b, "0551234567", None)
            .await
            .unwrap());
    }
}
