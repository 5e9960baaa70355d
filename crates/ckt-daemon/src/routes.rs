//! Axum router and all HTTP handlers for ckt-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Tests compose the bare router directly.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info, warn};

use ckt_orders::OrderError;
use ckt_provider::{dpm_checker_link, ProviderError};
use ckt_schemas::{
    paths, CreateIntentRequest, CreateIntentResponse, ErrorResponse, HealthResponse,
    MessageResponse, SubmitOrderRequest,
};

use crate::{
    pages::{self, Page, RenderError},
    state::{AppState, BusMsg},
};

pub const MSG_ORDER_SUBMITTED: &str = "Order submitted successfully";

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (tracing) are **not** applied here; `main.rs` attaches
/// them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(paths::INDEX, get(index_page))
        .route(paths::COMPLETE, get(complete_page))
        .route(paths::ORDER, get(order))
        .route(paths::CREATE_PAYMENT_INTENT, post(create_payment_intent))
        .route(paths::SUBMIT_ORDER, post(submit_order))
        .route(paths::HEALTH, get(health))
        .route(paths::STREAM, get(stream))
        .with_state(state)
}

fn error_json(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(msg))).into_response()
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

pub(crate) async fn index_page(State(st): State<Arc<AppState>>) -> Response {
    page_response(&st, Page::Index)
}

pub(crate) async fn complete_page(State(st): State<Arc<AppState>>) -> Response {
    page_response(&st, Page::Complete)
}

fn page_response(st: &AppState, page: Page) -> Response {
    let (status, body) = match pages::render(&st.assets, &st.pages, page) {
        Ok(html) => (StatusCode::OK, html),
        Err(e) => {
            let status = match e {
                RenderError::Asset(_) => StatusCode::SERVICE_UNAVAILABLE,
                RenderError::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            warn!(?page, error = %e, "page unavailable");
            (status, pages::error_page(&e.to_string()))
        }
    };
    (
        status,
        [
            (header::CONTENT_TYPE, "text/html;charset=utf-8"),
            (header::SERVER, ""),
        ],
        body,
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// GET /order/:id
// ---------------------------------------------------------------------------

pub(crate) async fn order(State(st): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match st.orders.read_raw(&id).await {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/json;charset=utf-8"),
                (header::SERVER, ""),
            ],
            bytes,
        )
            .into_response(),
        Err(OrderError::NotFound(_)) => {
            (StatusCode::NOT_FOUND, [(header::SERVER, "")]).into_response()
        }
        Err(e) => {
            error!(intent_id = %id, error = %e, "order read failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "Unable to read order")
        }
    }
}

// ---------------------------------------------------------------------------
// POST /create-payment-intent
// ---------------------------------------------------------------------------

pub(crate) async fn create_payment_intent(
    State(st): State<Arc<AppState>>,
    body: Result<Json<CreateIntentRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e.body_text(), "create-payment-intent: bad body");
            return error_json(StatusCode::BAD_REQUEST, e.body_text());
        }
    };

    let Some(total) = req.total_cents() else {
        return error_json(StatusCode::BAD_REQUEST, "item amounts overflow");
    };

    match st.provider.create_intent(total, &st.currency).await {
        Ok(created) => {
            info!(intent_id = %created.id, amount = total, items = req.items.len(), "payment intent created");
            (
                StatusCode::OK,
                Json(CreateIntentResponse {
                    dpm_checker_link: dpm_checker_link(&created.id),
                    client_secret: created.client_secret,
                }),
            )
                .into_response()
        }
        Err(ProviderError::InvalidRequest(msg)) => {
            warn!(amount = total, %msg, "payment intent refused");
            error_json(StatusCode::BAD_REQUEST, msg)
        }
        Err(e @ ProviderError::Transport(_)) => {
            error!(provider = st.provider.name(), error = %e, "payment intent creation failed");
            error_json(StatusCode::BAD_GATEWAY, e.to_string())
        }
        Err(e) => {
            error!(provider = st.provider.name(), error = %e, "payment intent creation failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// POST /submit-order
// ---------------------------------------------------------------------------

/// Persist an order once the provider confirms the intent succeeded. The
/// status the browser saw is never trusted.
pub(crate) async fn submit_order(
    State(st): State<Arc<AppState>>,
    body: Result<Json<SubmitOrderRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e.body_text(), "submit-order: bad body");
            return error_json(StatusCode::BAD_REQUEST, "Invalid request data");
        }
    };
    let id = req.payment_intent_id.as_str();
    info!(intent_id = %id, keys = req.local_storage_data.len(), "order received");

    match st
        .orders
        .submit(st.provider.as_ref(), id, &req.local_storage_data)
        .await
    {
        Ok(_) => {
            let _ = st.bus.send(BusMsg::OrderStored {
                payment_intent_id: id.to_string(),
            });
            (
                StatusCode::OK,
                Json(MessageResponse {
                    message: MSG_ORDER_SUBMITTED.to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            let (status, msg) = match &e {
                OrderError::InvalidId(_) => (StatusCode::BAD_REQUEST, "Invalid payment intent id"),
                OrderError::NotSucceeded { .. } => (StatusCode::BAD_REQUEST, "Payment not successful"),
                OrderError::AlreadyExists(_) => (StatusCode::CONFLICT, "Order already submitted"),
                OrderError::Verify(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Unable to verify payment"),
                OrderError::NotFound(_) | OrderError::Io { .. } | OrderError::Encode(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "Unable to save order")
                }
            };
            if status.is_server_error() {
                error!(intent_id = %id, error = %e, "order rejected");
            } else {
                warn!(intent_id = %id, error = %e, "order rejected");
            }
            error_json(status, msg)
        }
    }
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(m.event_name()).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
