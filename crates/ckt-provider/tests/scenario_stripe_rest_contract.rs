//! Scenario: the REST provider speaks the intent API correctly.
//!
//! - create: form-encoded POST with bearer auth, returns id + client secret
//! - retrieve: GET by id, status mapped onto `IntentStatus`
//! - error envelopes become `ProviderError::Api` with code and status

use httpmock::prelude::*;
use serde_json::json;

use ckt_provider::{PaymentProvider, ProviderError, StripeProvider};
use ckt_schemas::IntentStatus;

const SK: &str = "sk_test_scenario";

#[tokio::test]
async fn create_intent_posts_form_with_bearer_auth() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/payment_intents")
                .header("authorization", format!("Bearer {SK}"))
                .body_contains("amount=2000")
                .body_contains("currency=usd");
            then.status(200).json_body(json!({
                "id": "pi_123",
                "client_secret": "pi_123_secret_abc",
                "status": "requires_payment_method",
                "amount": 2000,
                "currency": "usd"
            }));
        })
        .await;

    let p = StripeProvider::new_with_base_url(SK.to_string(), server.base_url());
    let created = p.create_intent(2000, "usd").await.unwrap();

    mock.assert_async().await;
    assert_eq!(created.id, "pi_123");
    assert_eq!(created.client_secret, "pi_123_secret_abc");
}

#[tokio::test]
async fn retrieve_intent_maps_status() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/payment_intents/pi_ok");
            then.status(200).json_body(json!({
                "id": "pi_ok",
                "status": "succeeded",
                "amount": 1500,
                "currency": "usd"
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/payment_intents/pi_odd");
            then.status(200).json_body(json!({
                "id": "pi_odd",
                "status": "requires_capture",
                "amount": 1500,
                "currency": "usd"
            }));
        })
        .await;

    let p = StripeProvider::new_with_base_url(SK.to_string(), server.base_url());

    let ok = p.retrieve_intent("pi_ok").await.unwrap();
    assert_eq!(ok.status, IntentStatus::Succeeded);
    assert_eq!(ok.amount, 1500);

    let odd = p.retrieve_intent("pi_odd").await.unwrap();
    assert_eq!(odd.status, IntentStatus::Unknown("requires_capture".to_string()));
}

#[tokio::test]
async fn error_envelope_becomes_api_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/payment_intents/pi_missing");
            then.status(404).json_body(json!({
                "error": {
                    "code": "resource_missing",
                    "message": "No such payment_intent: 'pi_missing'",
                    "type": "invalid_request_error"
                }
            }));
        })
        .await;

    let p = StripeProvider::new_with_base_url(SK.to_string(), server.base_url());
    let err = p.retrieve_intent("pi_missing").await.unwrap_err();

    assert!(err.is_not_found());
    match &err {
        ProviderError::Api { status, code, .. } => {
            assert_eq!(*status, 404);
            assert_eq!(code.as_deref(), Some("resource_missing"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    assert!(!err.to_string().contains(SK));
}

#[tokio::test]
async fn non_json_failure_body_still_reports_status() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/payment_intents");
            then.status(502).body("bad gateway");
        })
        .await;

    let p = StripeProvider::new_with_base_url(SK.to_string(), server.base_url());
    match p.create_intent(100, "usd").await {
        Err(ProviderError::Api { status: 502, .. }) => {}
        other => panic!("expected 502 Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_provider_is_a_transport_error() {
    // Nothing listens on port 1.
    let p = StripeProvider::new_with_base_url(SK.to_string(), "http://127.0.0.1:1".to_string());
    assert!(matches!(
        p.retrieve_intent("pi_x").await,
        Err(ProviderError::Transport(_))
    ));
}
