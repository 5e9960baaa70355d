//! ckt-client
//!
//! The browser half of the shop, compiled to `wasm32-unknown-unknown` and
//! embedded into the pages by the daemon.
//!
//! - [`render`]: DOM-independent pieces (cart table markup, status icons,
//!   provider options, routing); tested natively
//! - `web` (wasm32 only): `localStorage`, `fetch` and Stripe.js adapters
//!   plus the functions the pages call as `wasm_bindgen.<name>(..)`

pub mod render;

#[cfg(target_arch = "wasm32")]
mod web;

/// Publishable key baked in at build time; the asset builder passes it as
/// `CKT_PUBLISHABLE_KEY`.
pub fn publishable_key() -> &'static str {
    option_env!("CKT_PUBLISHABLE_KEY").unwrap_or("")
}
