//! Payment session state machine.
//!
//! # Design
//!
//! One session per checkout attempt. User actions ([`PaymentSession::start`],
//! [`PaymentSession::cancel`]) bump the **generation**; every asynchronous
//! continuation carries the generation it was issued under and is applied via
//! [`PaymentSession::apply`]. A continuation from an older generation is
//! ignored ([`Applied::Stale`]) so a late network response can never
//! overwrite what the user is currently looking at.
//!
//! ```text
//!   start()          IntentCreated        Submit          StatusRetrieved
//!  Idle ──► IntentRequested ──► IntentReady ──► Confirming ──────────► Completed
//!              │   ▲                 ▲              │
//!   IntentFailed└──┘                 └─ConfirmFailed┘
//!
//!   cancel(): any non-terminal state ──► Idle
//! ```

use ckt_schemas::IntentStatus;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// How a confirmed payment ended, as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Processing,
    RequiresPaymentMethod,
    /// Status retrieval failed or the provider reported an unmapped status.
    Failed,
}

impl Outcome {
    pub fn from_status(status: &IntentStatus) -> Self {
        match status {
            IntentStatus::Succeeded => Outcome::Succeeded,
            IntentStatus::Processing => Outcome::Processing,
            IntentStatus::RequiresPaymentMethod => Outcome::RequiresPaymentMethod,
            IntentStatus::Unknown(_) => Outcome::Failed,
        }
    }

    /// Outcomes after which the local data is pushed as an order.
    pub fn submits_order(&self) -> bool {
        matches!(self, Outcome::Succeeded | Outcome::Processing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    IntentRequested,
    IntentReady { client_secret: String },
    Confirming { client_secret: String },
    /// **Terminal** until the next `start()`.
    Completed(Outcome),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::IntentRequested => "IntentRequested",
            SessionState::IntentReady { .. } => "IntentReady",
            SessionState::Confirming { .. } => "Confirming",
            SessionState::Completed(_) => "Completed",
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Continuation results fed back into the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    IntentCreated { client_secret: String },
    /// Intent creation or payment-form setup failed; the message is what the
    /// user sees.
    IntentFailed { message: String },
    /// User pressed pay.
    Submit,
    /// Provider returned an error object in-page instead of redirecting.
    ConfirmFailed { message: String },
    StatusRetrieved(IntentStatus),
    StatusFailed,
}

/// Result of a successful [`PaymentSession::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Applied,
    /// Issued under an older generation; state untouched.
    Stale,
}

// ---------------------------------------------------------------------------
// TransitionError
// ---------------------------------------------------------------------------

/// Returned when an event cannot legally be applied in the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: &'static str,
    pub event: String,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "illegal session transition: {} + {}", self.from, self.event)
    }
}

impl std::error::Error for TransitionError {}

// ---------------------------------------------------------------------------
// PaymentSession
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PaymentSession {
    state: SessionState,
    generation: u64,
    /// Last user-facing failure message; cleared on every successful step.
    last_error: Option<String>,
}

impl Default for PaymentSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            generation: 0,
            last_error: None,
        }
    }

    /// Re-create a session after the provider redirected back to the
    /// completion page: the payment is being confirmed and only the status
    /// is outstanding.
    pub fn resume_confirming(client_secret: impl Into<String>) -> Self {
        Self {
            state: SessionState::Confirming {
                client_secret: client_secret.into(),
            },
            generation: 1,
            last_error: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    pub fn client_secret(&self) -> Option<&str> {
        match &self.state {
            SessionState::IntentReady { client_secret }
            | SessionState::Confirming { client_secret } => Some(client_secret),
            _ => None,
        }
    }

    /// Begin a new attempt. Allowed from every state except `Confirming`
    /// (a confirmation in flight ends in a redirect or an in-page error).
    pub fn start(&mut self) -> Result<u64, TransitionError> {
        if let SessionState::Confirming { .. } = self.state {
            return Err(TransitionError {
                from: self.state.name(),
                event: "Start".to_string(),
            });
        }
        self.generation += 1;
        self.state = SessionState::IntentRequested;
        self.last_error = None;
        Ok(self.generation)
    }

    /// Close the payment UI. Returns to `Idle` and invalidates every
    /// outstanding continuation. A completed session stays completed.
    pub fn cancel(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.generation += 1;
        self.state = SessionState::Idle;
    }

    /// Apply a continuation issued under `generation`.
    ///
    /// # Errors
    /// [`TransitionError`] for an event that is illegal in the current state.
    /// The state is unchanged after an error.
    pub fn apply(
        &mut self,
        generation: u64,
        event: SessionEvent,
    ) -> Result<Applied, TransitionError> {
        if generation != self.generation {
            return Ok(Applied::Stale);
        }

        use SessionEvent::*;
        use SessionState::*;

        let mut error = None;
        let next = match (&self.state, event) {
            (IntentRequested, IntentCreated { client_secret }) => IntentReady { client_secret },

            (IntentRequested, IntentFailed { message }) => {
                self.last_error = Some(message);
                return Ok(Applied::Applied);
            }

            (IntentReady { client_secret }, Submit) => Confirming {
                client_secret: client_secret.clone(),
            },

            // In-page failure: the form stays mounted so the user can retry.
            (Confirming { client_secret }, ConfirmFailed { message }) => {
                error = Some(message);
                IntentReady {
                    client_secret: client_secret.clone(),
                }
            }

            (Confirming { .. }, StatusRetrieved(status)) => {
                Completed(Outcome::from_status(&status))
            }

            (Confirming { .. }, StatusFailed) => Completed(Outcome::Failed),

            (state, ev) => {
                return Err(TransitionError {
                    from: state.name(),
                    event: format!("{ev:?}"),
                });
            }
        };

        self.last_error = error;
        self.state = next;
        Ok(Applied::Applied)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
