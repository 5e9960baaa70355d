//! Shared runtime state for ckt-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum; this module owns
//! nothing async itself apart from the heartbeat task.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use ckt_assets::{AssetCache, RefreshReport};
use ckt_orders::OrderStore;
use ckt_provider::PaymentProvider;

use crate::pages::PageIds;

// ---------------------------------------------------------------------------
// BusMsg
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat {
        ts_millis: i64,
    },
    /// A refresh pass that changed or failed something.
    Assets {
        rebuilt: Vec<String>,
        reloaded: Vec<String>,
        failed: Vec<String>,
    },
    OrderStored {
        payment_intent_id: String,
    },
}

impl BusMsg {
    pub fn event_name(&self) -> &'static str {
        match self {
            BusMsg::Heartbeat { .. } => "heartbeat",
            BusMsg::Assets { .. } => "assets",
            BusMsg::OrderStored { .. } => "order",
        }
    }
}

impl From<&RefreshReport> for BusMsg {
    fn from(r: &RefreshReport) -> Self {
        BusMsg::Assets {
            rebuilt: r.rebuilt.clone(),
            reloaded: r.reloaded.clone(),
            failed: r.failed.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub assets: Arc<AssetCache>,
    pub pages: PageIds,
    pub orders: OrderStore,
    pub provider: Arc<dyn PaymentProvider>,
    /// ISO currency every intent is created in, lowercase.
    pub currency: String,
}

impl AppState {
    pub fn new(
        assets: Arc<AssetCache>,
        pages: PageIds,
        orders: OrderStore,
        provider: Arc<dyn PaymentProvider>,
        currency: impl Into<String>,
    ) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(256);
        Self {
            bus,
            build: BuildInfo {
                service: "ckt-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            assets,
            pages,
            orders,
            provider,
            currency: currency.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Refresh callback for [`ckt_assets::spawn_refresher`]. Only passes that
/// rebuilt, reloaded or failed something reach the bus.
pub fn refresh_reporter(bus: broadcast::Sender<BusMsg>) -> impl Fn(&RefreshReport) + Send + 'static {
    move |report| {
        tracing::debug!(?report, "asset refresh");
        if report.touched_content() {
            let _ = bus.send(BusMsg::from(report));
        }
    }
}
