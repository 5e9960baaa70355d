//! ckt-testkit
//!
//! Deterministic in-process fakes for every external seam:
//! - [`FakePaymentProvider`]: server-side provider, intents kept in memory
//! - [`FakeProviderClient`]: browser-side provider library bound to the same intents
//! - [`RecordingBackend`]: checkout server stand-in that records requests
//! - [`ScriptedBuilder`] / [`FakeSourceFs`]: toolchain and filesystem for the asset cache
//!
//! No network, no child processes, no wall-clock dependence.

mod assets;
mod backend;
mod provider;

pub use assets::{FakeSourceFs, ScriptedBuilder, ScriptedStep};
pub use backend::RecordingBackend;
pub use provider::{ConfirmScript, FakePaymentProvider, FakeProviderClient};

/// Cart from the canonical example: two units of `sku-1` at $5.00 plus
/// $10.00 shipping.
pub const EXAMPLE_SHIPPING_ID: &str =
    "shipping-to|Jane|1 Main St|Springfield|IL|62704|US|555-0100";
