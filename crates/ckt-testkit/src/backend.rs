//! Checkout server stand-in for browser-side flow tests.

use std::cell::RefCell;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use ckt_provider::dpm_checker_link;
use ckt_schemas::{CreateIntentRequest, CreateIntentResponse, MessageResponse, SubmitOrderRequest};
use ckt_session::{BackendError, CheckoutBackend};

/// Answers intent creation with a scripted response and records every
/// request. `hold_create` makes the next creation wait until released, so a
/// test can act while the request is in flight.
#[derive(Debug)]
pub struct RecordingBackend {
    create: RefCell<Result<CreateIntentResponse, BackendError>>,
    submit: RefCell<Result<MessageResponse, BackendError>>,
    intent_requests: RefCell<Vec<CreateIntentRequest>>,
    orders: RefCell<Vec<SubmitOrderRequest>>,
    gate: RefCell<Option<Arc<Notify>>>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new("pi_rec_1_secret_rec")
    }
}

impl RecordingBackend {
    pub fn new(client_secret: &str) -> Self {
        Self {
            create: RefCell::new(Ok(CreateIntentResponse {
                client_secret: client_secret.to_string(),
                dpm_checker_link: dpm_checker_link("pi_rec_1"),
            })),
            submit: RefCell::new(Ok(MessageResponse {
                message: "Order submitted successfully".to_string(),
            })),
            intent_requests: RefCell::new(Vec::new()),
            orders: RefCell::new(Vec::new()),
            gate: RefCell::new(None),
        }
    }

    pub fn fail_create(&self, err: BackendError) {
        *self.create.borrow_mut() = Err(err);
    }

    pub fn fail_submit(&self, err: BackendError) {
        *self.submit.borrow_mut() = Err(err);
    }

    /// The next `create_payment_intent` blocks until the returned handle is
    /// notified.
    pub fn hold_create(&self) -> Arc<Notify> {
        let n = Arc::new(Notify::new());
        *self.gate.borrow_mut() = Some(Arc::clone(&n));
        n
    }

    pub fn intent_requests(&self) -> Vec<CreateIntentRequest> {
        self.intent_requests.borrow().clone()
    }

    pub fn orders(&self) -> Vec<SubmitOrderRequest> {
        self.orders.borrow().clone()
    }
}

#[async_trait(?Send)]
impl CheckoutBackend for RecordingBackend {
    async fn create_payment_intent(
        &self,
        req: &CreateIntentRequest,
    ) -> Result<CreateIntentResponse, BackendError> {
        self.intent_requests.borrow_mut().push(req.clone());
        let gate = self.gate.borrow_mut().take();
        if let Some(g) = gate {
            g.notified().await;
        }
        self.create.borrow().clone()
    }

    async fn submit_order(&self, req: &SubmitOrderRequest) -> Result<MessageResponse, BackendError> {
        self.orders.borrow_mut().push(req.clone());
        self.submit.borrow().clone()
    }
}
