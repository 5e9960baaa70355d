//! Scenario: orders are persisted only after server-side verification.
//!
//! Invariants:
//! - provider status other than `succeeded` => rejected, no file
//! - `succeeded` => file written, `get` returns the identical payload
//! - malformed ids never reach the provider or the filesystem

use serde_json::{json, Map, Value};

use ckt_orders::{OrderError, OrderStore, WritePolicy};
use ckt_schemas::IntentStatus;
use ckt_testkit::FakePaymentProvider;

fn payload() -> Map<String, Value> {
    let v = json!({
        "cartItems": [
            {"id": "sku-1", "amount": 1000, "quantity": 2},
            {"id": "shipping-to|Jane|1 Main St|Springfield|IL|62704|US|555-0100", "amount": 1000, "quantity": 1}
        ],
        "giftMessage": "Happy birthday"
    });
    match v {
        Value::Object(m) => m,
        _ => unreachable!(),
    }
}

fn files_in(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn unverified_intent_is_rejected_without_a_file() {
    let tmp = tempfile::tempdir().unwrap();
    let orders_dir = tmp.path().join("orders");
    let store = OrderStore::new(&orders_dir, WritePolicy::Overwrite);
    let provider = FakePaymentProvider::new();
    provider.insert_intent("pi_processing", IntentStatus::Processing, 2000);
    provider.insert_intent("pi_declined", IntentStatus::RequiresPaymentMethod, 2000);

    for id in ["pi_processing", "pi_declined"] {
        match store.submit(&provider, id, &payload()).await {
            Err(OrderError::NotSucceeded { id: got, .. }) => assert_eq!(got, id),
            other => panic!("expected NotSucceeded for {id}, got {other:?}"),
        }
    }
    assert_eq!(files_in(&orders_dir), 0);
}

#[tokio::test]
async fn succeeded_intent_round_trips() {
    let tmp = tempfile::tempdir().unwrap();
    let store = OrderStore::new(tmp.path().join("orders"), WritePolicy::Overwrite);
    let provider = FakePaymentProvider::new();
    provider.insert_intent("pi_paid", IntentStatus::Succeeded, 2000);

    let path = store.submit(&provider, "pi_paid", &payload()).await.unwrap();
    assert!(path.ends_with("pi_paid.json"));

    let stored = store.get("pi_paid").unwrap();
    assert_eq!(stored, Value::Object(payload()));
    assert_eq!(provider.retrieve_calls(), 1);
}

#[tokio::test]
async fn unknown_or_unreachable_intent_is_a_verification_error() {
    let tmp = tempfile::tempdir().unwrap();
    let store = OrderStore::new(tmp.path(), WritePolicy::Overwrite);
    let provider = FakePaymentProvider::new();

    match store.submit(&provider, "pi_ghost", &payload()).await {
        Err(OrderError::Verify(e)) => assert!(e.is_not_found()),
        other => panic!("expected Verify, got {other:?}"),
    }

    provider.insert_intent("pi_paid", IntentStatus::Succeeded, 100);
    provider.set_unavailable(true);
    assert!(matches!(
        store.submit(&provider, "pi_paid", &payload()).await,
        Err(OrderError::Verify(_))
    ));
    assert!(matches!(store.get("pi_paid"), Err(OrderError::NotFound(_))));
}

#[tokio::test]
async fn malformed_id_never_reaches_provider() {
    let tmp = tempfile::tempdir().unwrap();
    let store = OrderStore::new(tmp.path(), WritePolicy::Overwrite);
    let provider = FakePaymentProvider::new();

    assert!(matches!(
        store.submit(&provider, "../../etc/passwd", &payload()).await,
        Err(OrderError::InvalidId(_))
    ));
    assert_eq!(provider.retrieve_calls(), 0);
    assert_eq!(files_in(tmp.path()), 0);
}

#[tokio::test]
async fn reject_existing_policy_blocks_resubmission() {
    let tmp = tempfile::tempdir().unwrap();
    let store = OrderStore::new(tmp.path(), WritePolicy::RejectExisting);
    let provider = FakePaymentProvider::new();
    provider.insert_intent("pi_paid", IntentStatus::Succeeded, 2000);

    store.submit(&provider, "pi_paid", &payload()).await.unwrap();
    assert!(matches!(
        store.submit(&provider, "pi_paid", &Map::new()).await,
        Err(OrderError::AlreadyExists(_))
    ));
    assert_eq!(store.get("pi_paid").unwrap(), Value::Object(payload()));
}
