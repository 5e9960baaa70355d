//! ckt-daemon library target.
//!
//! Exposes the router, page assembly and state for integration tests.
//! The binary `main.rs` depends on this library target.

pub mod pages;
pub mod routes;
pub mod state;
