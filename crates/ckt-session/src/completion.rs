//! Completion page: status lookup after the provider redirects back.
//!
//! Evaluated once per page load. On `succeeded` or `processing` every entry
//! in client-local storage is pushed to the server together with the intent
//! id; the server re-verifies before persisting anything.

use serde_json::{Map, Value};
use tracing::{info, warn};

use ckt_cart::ClientStorage;
use ckt_schemas::{paths, IntentStatus, SubmitOrderRequest};

use crate::flow::{CheckoutBackend, ProviderClient};
use crate::machine::{Outcome, PaymentSession, SessionEvent};

pub const CLIENT_SECRET_PARAM: &str = "payment_intent_client_secret";

pub const COLOR_SUCCESS: &str = "#30B130";
pub const COLOR_INFO: &str = "#6D6E78";
pub const COLOR_ERROR: &str = "#DF1B41";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusIcon {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusDisplay {
    pub text: &'static str,
    pub icon: StatusIcon,
    pub color: &'static str,
}

impl StatusDisplay {
    pub fn for_status(status: &IntentStatus) -> Self {
        match status {
            IntentStatus::Succeeded => Self {
                text: "Payment succeeded",
                icon: StatusIcon::Success,
                color: COLOR_SUCCESS,
            },
            IntentStatus::Processing => Self {
                text: "Your payment is processing.",
                icon: StatusIcon::Info,
                color: COLOR_INFO,
            },
            IntentStatus::RequiresPaymentMethod => Self {
                text: "Your payment was not successful, please try again.",
                icon: StatusIcon::Error,
                color: COLOR_ERROR,
            },
            IntentStatus::Unknown(_) => Self {
                text: "Unknown payment status.",
                icon: StatusIcon::Error,
                color: COLOR_ERROR,
            },
        }
    }

    pub fn error() -> Self {
        Self {
            text: "Something went wrong, please try again.",
            icon: StatusIcon::Error,
            color: COLOR_ERROR,
        }
    }
}

/// Whether an order push was attempted and how it went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderSubmission {
    NotAttempted,
    /// Nothing in local storage to send.
    NoData,
    Accepted(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionView {
    pub display: StatusDisplay,
    pub outcome: Outcome,
    pub intent_id: Option<String>,
    pub raw_status: Option<String>,
    pub order_link: Option<String>,
    /// `false` hides the details table.
    pub details_visible: bool,
    pub submission: OrderSubmission,
}

impl CompletionView {
    fn error() -> Self {
        Self {
            display: StatusDisplay::error(),
            outcome: Outcome::Failed,
            intent_id: None,
            raw_status: None,
            order_link: None,
            details_visible: false,
            submission: OrderSubmission::NotAttempted,
        }
    }
}

/// Value of `name` in a `?a=b&c=d` query string, form-urlencoded decoded.
pub fn query_param(search: &str, name: &str) -> Option<String> {
    url::form_urlencoded::parse(search.trim_start_matches('?').as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Every key in client-local storage; values are JSON-decoded where
/// possible, otherwise kept as the raw string.
pub fn gather_local_storage<S: ClientStorage>(storage: &S) -> Map<String, Value> {
    storage
        .keys()
        .into_iter()
        .filter_map(|k| {
            let raw = storage.get_item(&k)?;
            let v = serde_json::from_str::<Value>(&raw).unwrap_or(Value::String(raw));
            Some((k, v))
        })
        .collect()
}

/// Evaluate the completion page for the query string `search`.
pub async fn evaluate_completion<B, P, S>(
    search: &str,
    provider: &P,
    backend: &B,
    storage: &S,
) -> CompletionView
where
    B: CheckoutBackend,
    P: ProviderClient,
    S: ClientStorage,
{
    let Some(client_secret) = query_param(search, CLIENT_SECRET_PARAM).filter(|s| !s.is_empty())
    else {
        warn!("completion page opened without a client secret");
        return CompletionView::error();
    };

    let mut session = PaymentSession::resume_confirming(client_secret.clone());
    let generation = session.generation();

    let intent = match provider.retrieve_intent(&client_secret).await {
        Ok(i) => i,
        Err(e) => {
            warn!(error = %e, "payment intent retrieval failed");
            if let Err(e) = session.apply(generation, SessionEvent::StatusFailed) {
                warn!(error = %e, "unexpected session transition");
            }
            return CompletionView::error();
        }
    };

    let outcome = Outcome::from_status(&intent.status);
    if let Err(e) = session.apply(generation, SessionEvent::StatusRetrieved(intent.status.clone())) {
        warn!(error = %e, "unexpected session transition");
    }

    let submission = if outcome.submits_order() {
        submit_local_data(backend, storage, &intent.id).await
    } else {
        OrderSubmission::NotAttempted
    };

    CompletionView {
        display: StatusDisplay::for_status(&intent.status),
        outcome,
        order_link: Some(format!("{}{}", paths::ORDER_PREFIX, intent.id)),
        raw_status: Some(intent.status.as_str().to_string()),
        intent_id: Some(intent.id),
        details_visible: true,
        submission,
    }
}

async fn submit_local_data<B: CheckoutBackend, S: ClientStorage>(
    backend: &B,
    storage: &S,
    intent_id: &str,
) -> OrderSubmission {
    let data = gather_local_storage(storage);
    if data.is_empty() {
        info!("no data found in local storage; order not submitted");
        return OrderSubmission::NoData;
    }

    let req = SubmitOrderRequest {
        local_storage_data: data,
        payment_intent_id: intent_id.to_string(),
    };
    match backend.submit_order(&req).await {
        Ok(resp) => {
            info!(intent = %intent_id, message = %resp.message, "order submitted");
            OrderSubmission::Accepted(resp.message)
        }
        Err(e) => {
            warn!(intent = %intent_id, error = %e, "order submission failed");
            OrderSubmission::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ckt_cart::MemoryStorage;

    #[test]
    fn query_param_extracts_and_decodes() {
        let q = "?payment_intent=pi_1&payment_intent_client_secret=pi_1_secret_a%2Bb&redirect_status=succeeded";
        assert_eq!(
            query_param(q, CLIENT_SECRET_PARAM).as_deref(),
            Some("pi_1_secret_a+b")
        );
        assert_eq!(query_param(q, "missing"), None);
        assert_eq!(query_param("", CLIENT_SECRET_PARAM), None);
        assert_eq!(query_param("?a=%zz", "a").as_deref(), Some("%zz"));
        assert_eq!(query_param("a=x+y&b", "a").as_deref(), Some("x y"));
        assert_eq!(query_param("a=x+y&b", "b").as_deref(), Some(""));
    }

    #[test]
    fn gather_decodes_json_and_keeps_raw_strings() {
        let s = MemoryStorage::new();
        s.set_item("cartItems", r#"[{"id":"sku-1","amount":500,"quantity":1}]"#)
            .unwrap();
        s.set_item("note", "leave at door").unwrap();
        s.set_item("count", "3").unwrap();
        let m = gather_local_storage(&s);
        assert_eq!(m["cartItems"][0]["id"], "sku-1");
        assert_eq!(m["note"], "leave at door");
        assert_eq!(m["count"], 3);
    }

    #[test]
    fn status_display_table() {
        let d = StatusDisplay::for_status(&IntentStatus::Succeeded);
        assert_eq!((d.text, d.color, d.icon), ("Payment succeeded", "#30B130", StatusIcon::Success));
        let d = StatusDisplay::for_status(&IntentStatus::Processing);
        assert_eq!(d.color, "#6D6E78");
        assert_eq!(d.icon, StatusIcon::Info);
        let d = StatusDisplay::for_status(&IntentStatus::Unknown("canceled".into()));
        assert_eq!(d.text, "Unknown payment status.");
        assert_eq!(d.color, "#DF1B41");
    }
}
