//! Checkout driver: the async steps around [`PaymentSession`].
//!
//! Each step borrows the session only to read or apply, never across an
//! `.await`, so user actions (cancel, restart) can interleave with network
//! continuations the way they do on a browser event loop.

use std::cell::RefCell;
use std::fmt;

use async_trait::async_trait;
use tracing::{info, warn};

use ckt_cart::CartItem;
use ckt_schemas::{
    CheckoutItem, CreateIntentRequest, CreateIntentResponse, MessageResponse, PaymentIntentView,
    SubmitOrderRequest,
};

use crate::machine::{Applied, PaymentSession, SessionEvent, SessionState, TransitionError};

pub const MSG_PAYMENT_SUCCESSFUL: &str = "Payment successful! Thank you for your order.";

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Server answered with a non-2xx status.
    Http { status: u16 },
    /// Request never completed.
    Network(String),
    /// Response body was not the expected JSON.
    Decode(String),
}

impl BackendError {
    /// Message shown to the user when intent creation fails.
    pub fn intent_message(&self) -> String {
        match self {
            BackendError::Http { status } => format!("Failed to create payment intent: {status}"),
            BackendError::Network(_) => "Failed to communicate with the server.".to_string(),
            BackendError::Decode(_) => "Failed to parse payment intent response.".to_string(),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Http { status } => write!(f, "backend returned http {status}"),
            BackendError::Network(msg) => write!(f, "backend unreachable: {msg}"),
            BackendError::Decode(msg) => write!(f, "backend response decode error: {msg}"),
        }
    }
}

impl std::error::Error for BackendError {}

/// The checkout server, as seen from the browser.
#[async_trait(?Send)]
pub trait CheckoutBackend {
    async fn create_payment_intent(
        &self,
        req: &CreateIntentRequest,
    ) -> Result<CreateIntentResponse, BackendError>;

    async fn submit_order(&self, req: &SubmitOrderRequest) -> Result<MessageResponse, BackendError>;
}

/// Error object returned by the provider's browser library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderClientError {
    pub message: String,
}

impl ProviderClientError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ProviderClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProviderClientError {}

/// The provider's browser library.
#[async_trait(?Send)]
pub trait ProviderClient {
    /// Create and mount the payment form bound to `client_secret`.
    async fn mount_payment_element(&self, client_secret: &str) -> Result<(), ProviderClientError>;

    /// Confirm the mounted form. `Ok` means the provider is redirecting to
    /// `return_url`; an error object means it resolved in-page.
    async fn confirm_payment(&self, return_url: &str) -> Result<(), ProviderClientError>;

    async fn retrieve_intent(&self, client_secret: &str)
        -> Result<PaymentIntentView, ProviderClientError>;
}

// ---------------------------------------------------------------------------
// Page origin / return URL
// ---------------------------------------------------------------------------

/// `window.location` pieces needed to build the return URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOrigin {
    /// Including the trailing colon, e.g. `https:`.
    pub protocol: String,
    pub hostname: String,
    /// Empty for the scheme's default port.
    pub port: String,
}

impl PageOrigin {
    pub fn new(protocol: &str, hostname: &str, port: &str) -> Self {
        Self {
            protocol: protocol.to_string(),
            hostname: hostname.to_string(),
            port: port.to_string(),
        }
    }

    pub fn base_url(&self) -> String {
        let mut base = format!("{}//{}", self.protocol, self.hostname);
        if !self.port.is_empty() {
            base.push(':');
            base.push_str(&self.port);
        }
        base
    }

    /// Completion page URL carrying the client secret.
    pub fn return_url(&self, client_secret: &str) -> String {
        format!("{}/complete?payment_intent={}", self.base_url(), client_secret)
    }
}

/// Intent request body for the current cart. Each line becomes
/// `{id: "<id> X <qty>", amount}`; amounts already include quantity.
pub fn intent_request(items: &[CartItem]) -> CreateIntentRequest {
    CreateIntentRequest {
        items: items
            .iter()
            .map(|it| CheckoutItem {
                id: format!("{} X {}", it.id, it.quantity),
                amount: it.amount,
                quantity: None,
            })
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// What the UI should do after a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Payment form is mounted.
    Ready { dpm_checker_link: String },
    /// Show this message in the payment dialog.
    Message(String),
    /// The step finished under an older generation; leave the UI alone.
    Stale,
}

pub struct CheckoutFlow<B, P> {
    backend: B,
    provider: P,
    origin: PageOrigin,
    session: RefCell<PaymentSession>,
}

impl<B: CheckoutBackend, P: ProviderClient> CheckoutFlow<B, P> {
    pub fn new(backend: B, provider: P, origin: PageOrigin) -> Self {
        Self {
            backend,
            provider,
            origin,
            session: RefCell::new(PaymentSession::new()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn state(&self) -> SessionState {
        self.session.borrow().state().clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.session.borrow().last_error().map(str::to_string)
    }

    fn apply(&self, generation: u64, event: SessionEvent) -> Result<Applied, TransitionError> {
        self.session.borrow_mut().apply(generation, event)
    }

    /// Open the payment dialog: request an intent for `items` and mount the
    /// payment form. Failures surface as a message; nothing is retried.
    pub async fn open_checkout(&self, items: &[CartItem]) -> Result<StepOutcome, TransitionError> {
        let generation = self.session.borrow_mut().start()?;
        let req = intent_request(items);
        info!(generation, items = req.items.len(), "requesting payment intent");

        let resp = match self.backend.create_payment_intent(&req).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "payment intent request failed");
                let message = e.intent_message();
                return self.fail_intent(generation, message);
            }
        };

        if !self.session.borrow().is_current(generation) {
            return Ok(StepOutcome::Stale);
        }

        if let Err(e) = self.provider.mount_payment_element(&resp.client_secret).await {
            warn!(error = %e, "payment form setup failed");
            return self.fail_intent(generation, "Failed to initialize payment elements.".to_string());
        }

        let applied = self.apply(
            generation,
            SessionEvent::IntentCreated {
                client_secret: resp.client_secret,
            },
        )?;
        Ok(match applied {
            Applied::Applied => StepOutcome::Ready {
                dpm_checker_link: resp.dpm_checker_link,
            },
            Applied::Stale => StepOutcome::Stale,
        })
    }

    fn fail_intent(&self, generation: u64, message: String) -> Result<StepOutcome, TransitionError> {
        match self.apply(generation, SessionEvent::IntentFailed { message: message.clone() })? {
            Applied::Applied => Ok(StepOutcome::Message(message)),
            Applied::Stale => Ok(StepOutcome::Stale),
        }
    }

    /// User pressed pay. Confirms with the provider using a return URL
    /// pointing at the completion page.
    pub async fn submit_payment(&self) -> Result<StepOutcome, TransitionError> {
        let (generation, client_secret) = {
            let mut s = self.session.borrow_mut();
            let generation = s.generation();
            s.apply(generation, SessionEvent::Submit)?;
            let secret = s.client_secret().unwrap_or_default().to_string();
            (generation, secret)
        };

        let return_url = self.origin.return_url(&client_secret);
        info!(%return_url, "confirming payment");

        match self.provider.confirm_payment(&return_url).await {
            Ok(()) => {
                if self.session.borrow().is_current(generation) {
                    Ok(StepOutcome::Message(MSG_PAYMENT_SUCCESSFUL.to_string()))
                } else {
                    Ok(StepOutcome::Stale)
                }
            }
            Err(e) => {
                warn!(error = %e, "payment confirmation failed");
                let applied = self.apply(
                    generation,
                    SessionEvent::ConfirmFailed {
                        message: e.message.clone(),
                    },
                )?;
                Ok(match applied {
                    Applied::Applied => StepOutcome::Message(format!("Payment failed: {}", e.message)),
                    Applied::Stale => StepOutcome::Stale,
                })
            }
        }
    }

    /// Close the payment dialog. In-flight continuations become stale.
    pub fn cancel(&self) {
        info!("checkout cancelled");
        self.session.borrow_mut().cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_url_includes_port_only_when_present() {
        let o = PageOrigin::new("https:", "shop.example", "");
        assert_eq!(
            o.return_url("pi_1_secret_2"),
            "https://shop.example/complete?payment_intent=pi_1_secret_2"
        );
        let o = PageOrigin::new("http:", "localhost", "8080");
        assert_eq!(o.base_url(), "http://localhost:8080");
    }

    #[test]
    fn intent_request_folds_quantity_into_id() {
        let items = vec![
            CartItem {
                id: "sku-1".to_string(),
                amount: 1000,
                quantity: 2,
            },
            CartItem {
                id: "shipping-to|Jane|1 Main St|Springfield|IL|62704|US|555-0100".to_string(),
                amount: 1000,
                quantity: 1,
            },
        ];
        let req = intent_request(&items);
        assert_eq!(req.items[0].id, "sku-1 X 2");
        assert_eq!(req.items[0].amount, 1000);
        assert!(req.items[1].id.ends_with(" X 1"));
        assert_eq!(req.total_cents(), Some(2000));
    }

    #[test]
    fn backend_error_messages() {
        assert_eq!(
            BackendError::Http { status: 500 }.intent_message(),
            "Failed to create payment intent: 500"
        );
        assert_eq!(
            BackendError::Network("refused".into()).intent_message(),
            "Failed to communicate with the server."
        );
    }
}
