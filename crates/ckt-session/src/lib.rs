//! ckt-session
//!
//! Browser-side payment session:
//! - [`machine`]: the pure state machine with generation-guarded continuations
//! - [`flow`]: the async checkout steps and the seams they talk through
//!   ([`CheckoutBackend`], [`ProviderClient`])
//! - [`completion`]: status evaluation on the completion page
//!
//! Everything here is single-threaded (`?Send` futures); the browser event
//! loop is the only executor in production.

pub mod completion;
pub mod flow;
pub mod machine;

pub use completion::{
    evaluate_completion, gather_local_storage, query_param, CompletionView, OrderSubmission,
    StatusDisplay, StatusIcon, CLIENT_SECRET_PARAM, COLOR_ERROR, COLOR_INFO, COLOR_SUCCESS,
};
pub use flow::{
    intent_request, BackendError, CheckoutBackend, CheckoutFlow, PageOrigin, ProviderClient,
    ProviderClientError, StepOutcome, MSG_PAYMENT_SUCCESSFUL,
};
pub use machine::{Applied, Outcome, PaymentSession, SessionEvent, SessionState, TransitionError};
