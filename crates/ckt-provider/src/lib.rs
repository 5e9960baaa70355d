//! ckt-provider
//!
//! Server-side boundary to the payment provider.
//!
//! - [`PaymentProvider`]: the two calls the server makes (create, retrieve).
//! - [`StripeProvider`]: REST implementation (form-encoded POST, bearer auth).
//!
//! The secret key lives only inside the provider value and is redacted from
//! `Debug`. Errors never include it.

use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use ckt_schemas::IntentStatus;

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Result of creating an intent: the id stays server-side, the client
/// secret goes to the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedIntent {
    pub id: String,
    pub client_secret: String,
}

/// Authoritative intent record, fetched server-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentRecord {
    pub id: String,
    pub status: IntentStatus,
    pub amount: i64,
    pub currency: String,
}

/// Provider diagnostics link shown next to the payment form.
pub fn dpm_checker_link(intent_id: &str) -> String {
    format!(
        "https://dashboard.stripe.com/settings/payment_methods/review?transaction_id={intent_id}"
    )
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ProviderError {
    /// Network or transport failure.
    Transport(String),
    /// The provider rejected the request.
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },
    /// A response payload could not be decoded.
    Decode(String),
    /// Caller passed something the provider would reject anyway.
    InvalidRequest(String),
}

impl ProviderError {
    /// `true` when the provider answered 404 for the requested object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::Api { status: 404, .. })
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Transport(msg) => write!(f, "transport error: {msg}"),
            ProviderError::Api {
                status,
                code: Some(c),
                message,
            } => write!(f, "provider api error status={status} code={c}: {message}"),
            ProviderError::Api {
                status,
                code: None,
                message,
            } => write!(f, "provider api error status={status}: {message}"),
            ProviderError::Decode(msg) => write!(f, "decode error: {msg}"),
            ProviderError::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// Server-side payment provider contract.
///
/// Object-safe so the daemon can hold an `Arc<dyn PaymentProvider>` and tests
/// can swap in a fake.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Create an intent for `amount` minor units of `currency`, with
    /// provider-managed payment methods enabled.
    async fn create_intent(&self, amount: i64, currency: &str)
        -> Result<CreatedIntent, ProviderError>;

    async fn retrieve_intent(&self, id: &str) -> Result<IntentRecord, ProviderError>;
}

// ---------------------------------------------------------------------------
// Stripe REST implementation
// ---------------------------------------------------------------------------

pub struct StripeProvider {
    secret_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl fmt::Debug for StripeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeProvider")
            .field("secret_key", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl StripeProvider {
    pub fn new(secret_key: String) -> Self {
        Self::new_with_base_url(secret_key, DEFAULT_API_BASE.to_string())
    }

    pub fn new_with_base_url(secret_key: String, base_url: String) -> Self {
        Self {
            secret_key,
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn intents_url(&self) -> String {
        format!("{}/v1/payment_intents", self.base_url.trim_end_matches('/'))
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        resp: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !status.is_success() {
            let (code, message) = match serde_json::from_str::<StripeErrorEnvelope>(&body) {
                Ok(env) => (
                    env.error.code,
                    env.error.message.unwrap_or_else(|| "unknown".to_string()),
                ),
                Err(_) => (None, format!("http {}", status.as_u16())),
            };
            return Err(ProviderError::Api {
                status: status.as_u16(),
                code,
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
    ) -> Result<CreatedIntent, ProviderError> {
        if amount <= 0 {
            return Err(ProviderError::InvalidRequest(format!(
                "amount must be positive, got {amount}"
            )));
        }

        let amount_s = amount.to_string();
        let resp = self
            .http
            .post(self.intents_url())
            .bearer_auth(&self.secret_key)
            .form(&[
                ("amount", amount_s.as_str()),
                ("currency", currency),
                ("automatic_payment_methods[enabled]", "true"),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let body: StripeIntent = Self::decode(resp).await?;
        let client_secret = body
            .client_secret
            .ok_or_else(|| ProviderError::Decode("intent has no client_secret".to_string()))?;
        debug!(intent = %body.id, amount, currency, "payment intent created");

        Ok(CreatedIntent {
            id: body.id,
            client_secret,
        })
    }

    async fn retrieve_intent(&self, id: &str) -> Result<IntentRecord, ProviderError> {
        if id.is_empty() || id.contains('/') {
            return Err(ProviderError::InvalidRequest(format!(
                "malformed intent id '{id}'"
            )));
        }

        let resp = self
            .http
            .get(format!("{}/{}", self.intents_url(), id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let body: StripeIntent = Self::decode(resp).await?;
        Ok(IntentRecord {
            id: body.id,
            status: IntentStatus::parse(&body.status),
            amount: body.amount,
            currency: body.currency,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct StripeIntent {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
    status: String,
    #[serde(default)]
    amount: i64,
    #[serde(default)]
    currency: String,
}

#[derive(Debug, Clone, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
struct StripeErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dpm_link_carries_intent_id() {
        assert_eq!(
            dpm_checker_link("pi_123"),
            "https://dashboard.stripe.com/settings/payment_methods/review?transaction_id=pi_123"
        );
    }

    #[test]
    fn debug_redacts_secret_key() {
        let p = StripeProvider::new("sk_test_supersecret".to_string());
        let dbg = format!("{p:?}");
        assert!(!dbg.contains("supersecret"), "got: {dbg}");
    }

    #[test]
    fn api_error_display_includes_code() {
        let e = ProviderError::Api {
            status: 402,
            code: Some("card_declined".to_string()),
            message: "Your card was declined.".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "provider api error status=402 code=card_declined: Your card was declined."
        );
        assert!(!e.is_not_found());
    }

    #[tokio::test]
    async fn non_positive_amount_is_rejected_before_any_call() {
        let p = StripeProvider::new_with_base_url("sk".to_string(), "http://127.0.0.1:1".to_string());
        assert!(matches!(
            p.create_intent(0, "usd").await,
            Err(ProviderError::InvalidRequest(_))
        ));
    }
}
