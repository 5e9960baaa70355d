//! Wire types shared by the checkout server and the browser client.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded by
//! Axum on the server and decoded by the client (and by tests). No business
//! logic lives here beyond small derived helpers.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Route paths
// ---------------------------------------------------------------------------

/// HTTP paths shared by the router and the client.
pub mod paths {
    pub const INDEX: &str = "/";
    pub const COMPLETE: &str = "/complete";
    pub const ORDER: &str = "/order/:id";
    pub const ORDER_PREFIX: &str = "/order/";
    pub const CREATE_PAYMENT_INTENT: &str = "/create-payment-intent";
    pub const SUBMIT_ORDER: &str = "/submit-order";
    pub const HEALTH: &str = "/v1/health";
    pub const STREAM: &str = "/v1/stream";
}

// ---------------------------------------------------------------------------
// POST /create-payment-intent
// ---------------------------------------------------------------------------

/// One line item as sent to the intent endpoint.
///
/// `amount` already has the quantity folded in; `quantity` is informational
/// and may be omitted by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub id: String,
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateIntentRequest {
    pub items: Vec<CheckoutItem>,
}

impl CreateIntentRequest {
    /// Sum of all item amounts in cents. `None` on overflow.
    pub fn total_cents(&self) -> Option<i64> {
        self.items
            .iter()
            .try_fold(0i64, |acc, it| acc.checked_add(it.amount))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateIntentResponse {
    #[serde(rename = "clientSecret")]
    pub client_secret: String,
    #[serde(rename = "dpmCheckerLink")]
    pub dpm_checker_link: String,
}

// ---------------------------------------------------------------------------
// POST /submit-order
// ---------------------------------------------------------------------------

/// Everything the browser had in client-local storage when the payment
/// completed, plus the intent it claims to have paid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOrderRequest {
    #[serde(rename = "localStorageData")]
    pub local_storage_data: Map<String, Value>,
    #[serde(rename = "paymentIntentId")]
    pub payment_intent_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Body of every 4xx/5xx JSON response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// Payment intent status
// ---------------------------------------------------------------------------

/// Provider-side lifecycle status of a payment intent.
///
/// Only the statuses the checkout flow branches on get their own variant;
/// everything else is carried verbatim in `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IntentStatus {
    Succeeded,
    Processing,
    RequiresPaymentMethod,
    Unknown(String),
}

impl IntentStatus {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "succeeded" => Self::Succeeded,
            "processing" => Self::Processing,
            "requires_payment_method" => Self::RequiresPaymentMethod,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Processing => "processing",
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::Unknown(raw) => raw.as_str(),
        }
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl From<String> for IntentStatus {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<IntentStatus> for String {
    fn from(s: IntentStatus) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-visible view of a payment intent, as returned by the provider's
/// browser library. Ephemeral: consumed once per confirmation cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntentView {
    pub id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub status: IntentStatus,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
