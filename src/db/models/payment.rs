//! Payment records and the derived balance/status.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Paid,
    Partial,
    Unpaid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Partial => "PARTIAL",
            PaymentStatus::Unpaid => "UNPAID",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    MobileMoney,
    BankTransfer,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::MobileMoney => "MOBILE_MONEY",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
            PaymentMethod::Card => "CARD",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub user_id: String,
    pub customer_id: String,
    pub reference_id: Option<String>,
    pub amount_paid: f64,
    pub expected_amount: Option<f64>,
    pub amount_remaining: Option<f64>,
    pub payment_date: Option<String>,
    pub payment_status: Option<String>,
    pub payment_method: Option<String>,
    pub description: Option<String>,
    pub added_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub customer_id: String,
    pub reference_id: Option<String>,
    pub amount_paid: f64,
    pub expected_amount: Option<f64>,
    #[serde(alias = "paymentDate")]
    pub date: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub description: Option<String>,
}

/// Remaining balance and status for a payment.
///
/// Without an expected amount neither can be known.
pub fn derive_balance(
    amount_paid: f64,
    expected_amount: Option<f64>,
) -> (Option<f64>, Option<PaymentStatus>) {
    let Some(expected) = expected_amount else {
        return (None, None);
    };

    let remaining = (expected - amount_paid).max(0.0);
    let status = if amount_paid <= 0.0 {
        PaymentStatus::Unpaid
    } else if remaining == 0.0 {
        PaymentStatus::Paid
    } else {
        PaymentStatus::Partial
    };
    (Some(remaining), Some(status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_balance() {
        assert_eq!(
            derive_balance(100.0, Some(250.0)),
            (Some(150.0), Some(PaymentStatus::Partial))
        );
        assert_eq!(
            derive_balance(250.0, Some(250.0)),
            (Some(0.0), Some(PaymentStatus::Paid))
        );
        assert_eq!(
            derive_balance(300.0, Some(250.0)),
            (Some(0.0), Some(PaymentStatus::Paid))
        );
        assert_eq!(
            derive_balance(0.0, Some(250.0)),
            (Some(250.0), Some(PaymentStatus::Unpaid))
        );
        assert_eq!(derive_balance(80.0, None), (None, None));
    }

    #[test]
    fn test_payment_method_wire_names() {
        let method: PaymentMethod = serde_json::from_str("\"MOBILE_MONEY\"").unwrap();
        assert_eq!(method, PaymentMethod::MobileMoney);
        assert_eq!(method.as_str(), "MOBILE_MONEY");
    }
}
