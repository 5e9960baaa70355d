//! Payment provider fakes.
//!
//! [`FakePaymentProvider`] is the authoritative intent store (server side).
//! [`FakeProviderClient`] plays the browser library and reads/writes the same
//! store, so "the user paid" in the browser is visible to server-side
//! verification.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use ckt_provider::{CreatedIntent, IntentRecord, PaymentProvider, ProviderError};
use ckt_schemas::{IntentStatus, PaymentIntentView};
use ckt_session::{ProviderClient, ProviderClientError};

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    intents: BTreeMap<String, IntentRecord>,
    secrets: BTreeMap<String, String>,
    created: Vec<(i64, String)>,
    retrieve_calls: usize,
    unavailable: bool,
}

#[derive(Debug, Default)]
pub struct FakePaymentProvider {
    inner: Mutex<Inner>,
}

impl FakePaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed an intent directly. Its client secret is `<id>_secret_fake`.
    pub fn insert_intent(&self, id: &str, status: IntentStatus, amount: i64) {
        let mut g = self.lock();
        g.intents.insert(
            id.to_string(),
            IntentRecord {
                id: id.to_string(),
                status,
                amount,
                currency: "usd".to_string(),
            },
        );
        g.secrets.insert(secret_for(id), id.to_string());
    }

    pub fn set_status(&self, id: &str, status: IntentStatus) {
        if let Some(rec) = self.lock().intents.get_mut(id) {
            rec.status = status;
        }
    }

    /// Every call fails with a transport error while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// `(amount, currency)` of every created intent, in order.
    pub fn created(&self) -> Vec<(i64, String)> {
        self.lock().created.clone()
    }

    pub fn retrieve_calls(&self) -> usize {
        self.lock().retrieve_calls
    }

    pub fn intent(&self, id: &str) -> Option<IntentRecord> {
        self.lock().intents.get(id).cloned()
    }

    pub fn id_for_secret(&self, secret: &str) -> Option<String> {
        self.lock().secrets.get(secret).cloned()
    }
}

fn secret_for(id: &str) -> String {
    format!("{id}_secret_fake")
}

#[async_trait]
impl PaymentProvider for FakePaymentProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
    ) -> Result<CreatedIntent, ProviderError> {
        let mut g = self.lock();
        if g.unavailable {
            return Err(ProviderError::Transport("fake provider unavailable".to_string()));
        }
        if amount <= 0 {
            return Err(ProviderError::InvalidRequest(format!(
                "amount must be positive, got {amount}"
            )));
        }
        g.next_id += 1;
        let id = format!("pi_fake_{}", g.next_id);
        let client_secret = secret_for(&id);
        g.created.push((amount, currency.to_string()));
        g.intents.insert(
            id.clone(),
            IntentRecord {
                id: id.clone(),
                status: IntentStatus::RequiresPaymentMethod,
                amount,
                currency: currency.to_string(),
            },
        );
        g.secrets.insert(client_secret.clone(), id.clone());
        Ok(CreatedIntent { id, client_secret })
    }

    async fn retrieve_intent(&self, id: &str) -> Result<IntentRecord, ProviderError> {
        let mut g = self.lock();
        g.retrieve_calls += 1;
        if g.unavailable {
            return Err(ProviderError::Transport("fake provider unavailable".to_string()));
        }
        g.intents.get(id).cloned().ok_or_else(|| ProviderError::Api {
            status: 404,
            code: Some("resource_missing".to_string()),
            message: format!("No such payment_intent: '{id}'"),
        })
    }
}

// ---------------------------------------------------------------------------
// Browser side
// ---------------------------------------------------------------------------

/// What the next `confirm_payment` does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmScript {
    /// The payment goes through with this status and the provider redirects.
    Redirect(IntentStatus),
    /// The provider resolves in-page with this error message.
    Decline(String),
}

#[derive(Debug)]
struct ClientState {
    mounted: Option<String>,
    confirm: ConfirmScript,
    return_urls: Vec<String>,
    fail_mount: bool,
    fail_retrieve: bool,
}

#[derive(Debug)]
pub struct FakeProviderClient {
    provider: Arc<FakePaymentProvider>,
    state: RefCell<ClientState>,
}

impl FakeProviderClient {
    pub fn new(provider: Arc<FakePaymentProvider>) -> Self {
        Self {
            provider,
            state: RefCell::new(ClientState {
                mounted: None,
                confirm: ConfirmScript::Redirect(IntentStatus::Succeeded),
                return_urls: Vec::new(),
                fail_mount: false,
                fail_retrieve: false,
            }),
        }
    }

    pub fn script_confirm(&self, script: ConfirmScript) {
        self.state.borrow_mut().confirm = script;
    }

    pub fn fail_mount(&self, fail: bool) {
        self.state.borrow_mut().fail_mount = fail;
    }

    pub fn fail_retrieve(&self, fail: bool) {
        self.state.borrow_mut().fail_retrieve = fail;
    }

    pub fn mounted_secret(&self) -> Option<String> {
        self.state.borrow().mounted.clone()
    }

    pub fn return_urls(&self) -> Vec<String> {
        self.state.borrow().return_urls.clone()
    }
}

#[async_trait(?Send)]
impl ProviderClient for FakeProviderClient {
    async fn mount_payment_element(&self, client_secret: &str) -> Result<(), ProviderClientError> {
        let mut st = self.state.borrow_mut();
        if st.fail_mount {
            return Err(ProviderClientError::new("elements unavailable"));
        }
        st.mounted = Some(client_secret.to_string());
        Ok(())
    }

    async fn confirm_payment(&self, return_url: &str) -> Result<(), ProviderClientError> {
        let (secret, script) = {
            let mut st = self.state.borrow_mut();
            st.return_urls.push(return_url.to_string());
            let secret = st
                .mounted
                .clone()
                .ok_or_else(|| ProviderClientError::new("no payment element mounted"))?;
            (secret, st.confirm.clone())
        };
        match script {
            ConfirmScript::Redirect(status) => {
                if let Some(id) = self.provider.id_for_secret(&secret) {
                    self.provider.set_status(&id, status);
                }
                Ok(())
            }
            ConfirmScript::Decline(message) => Err(ProviderClientError::new(message)),
        }
    }

    async fn retrieve_intent(
        &self,
        client_secret: &str,
    ) -> Result<PaymentIntentView, ProviderClientError> {
        if self.state.borrow().fail_retrieve {
            return Err(ProviderClientError::new("network error"));
        }
        let id = self
            .provider
            .id_for_secret(client_secret)
            .ok_or_else(|| ProviderClientError::new("No such payment_intent"))?;
        let rec = self
            .provider
            .intent(&id)
            .ok_or_else(|| ProviderClientError::new("No such payment_intent"))?;
        Ok(PaymentIntentView {
            id: rec.id,
            client_secret: Some(client_secret.to_string()),
            status: rec.status,
        })
    }
}
