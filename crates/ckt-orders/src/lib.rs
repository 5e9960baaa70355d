//! ckt-orders
//!
//! One JSON file per completed order, named `<intent id>.json`, under a
//! fixed directory.
//!
//! # Guarantees
//! - No file is written unless the provider itself reports the intent as
//!   `succeeded`. What the browser claims is never consulted.
//! - Intent ids are validated before they touch the filesystem.
//! - A write lands via temp file + rename, so readers never see a partial
//!   document.
//!
//! Concurrent submissions for the same id are last-write-wins.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::info;

use ckt_provider::{PaymentProvider, ProviderError};
use ckt_schemas::IntentStatus;

pub const MAX_ID_LEN: usize = 255;

/// What happens when an order for an already-stored id is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePolicy {
    #[default]
    Overwrite,
    RejectExisting,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum OrderError {
    /// Id is empty, too long, or contains characters outside `[A-Za-z0-9_]`.
    InvalidId(String),
    /// Provider reports a status other than `succeeded`.
    NotSucceeded { id: String, status: IntentStatus },
    /// `RejectExisting` policy and a file for this id is already stored.
    AlreadyExists(String),
    /// Provider lookup failed.
    Verify(ProviderError),
    NotFound(String),
    Io { path: PathBuf, source: io::Error },
    Encode(String),
}

impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderError::InvalidId(id) => write!(f, "invalid payment intent id '{id}'"),
            OrderError::NotSucceeded { id, status } => {
                write!(f, "payment intent {id} has status '{status}', not succeeded")
            }
            OrderError::AlreadyExists(id) => write!(f, "order {id} already exists"),
            OrderError::Verify(e) => write!(f, "payment verification failed: {e}"),
            OrderError::NotFound(id) => write!(f, "order {id} not found"),
            OrderError::Io { path, source } => {
                write!(f, "order storage error at {}: {source}", path.display())
            }
            OrderError::Encode(msg) => write!(f, "order encode error: {msg}"),
        }
    }
}

impl std::error::Error for OrderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OrderError::Verify(e) => Some(e),
            OrderError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> OrderError {
    let path = path.to_path_buf();
    move |source| OrderError::Io { path, source }
}

/// Accept only `[A-Za-z0-9_]{1,255}`. Provider intent ids fit this shape.
pub fn validate_intent_id(id: &str) -> Result<(), OrderError> {
    let ok = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if ok {
        Ok(())
    } else {
        Err(OrderError::InvalidId(id.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OrderStore {
    dir: PathBuf,
    policy: WritePolicy,
}

impl OrderStore {
    pub fn new(dir: impl Into<PathBuf>, policy: WritePolicy) -> Self {
        Self {
            dir: dir.into(),
            policy,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn policy(&self) -> WritePolicy {
        self.policy
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Verify `intent_id` with the provider, then persist `payload` under it.
    pub async fn submit(
        &self,
        provider: &dyn PaymentProvider,
        intent_id: &str,
        payload: &Map<String, Value>,
    ) -> Result<PathBuf, OrderError> {
        validate_intent_id(intent_id)?;

        let record = provider
            .retrieve_intent(intent_id)
            .await
            .map_err(OrderError::Verify)?;
        if !record.status.is_succeeded() {
            return Err(OrderError::NotSucceeded {
                id: intent_id.to_string(),
                status: record.status,
            });
        }

        let store = self.clone();
        let id = intent_id.to_string();
        let payload = payload.clone();
        self.blocking(move || store.write(&id, &payload)).await
    }

    /// [`get_raw`](Self::get_raw) on the blocking pool, for async handlers.
    pub async fn read_raw(&self, intent_id: &str) -> Result<Vec<u8>, OrderError> {
        let store = self.clone();
        let id = intent_id.to_string();
        self.blocking(move || store.get_raw(&id)).await
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, OrderError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, OrderError> + Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| OrderError::Io {
                path: self.dir.clone(),
                source: io::Error::other(e),
            })?
    }

    /// Persist without verification. Callers must have verified the intent.
    pub fn write(&self, intent_id: &str, payload: &Map<String, Value>) -> Result<PathBuf, OrderError> {
        validate_intent_id(intent_id)?;

        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;

        let path = self.path_for(intent_id);
        if self.policy == WritePolicy::RejectExisting && path.exists() {
            return Err(OrderError::AlreadyExists(intent_id.to_string()));
        }

        let bytes = serde_json::to_vec_pretty(payload).map_err(|e| OrderError::Encode(e.to_string()))?;

        let tmp = self.dir.join(format!(".{intent_id}.json.tmp"));
        fs::write(&tmp, &bytes).map_err(io_err(&tmp))?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(OrderError::Io { path, source: e });
        }

        info!(intent = %intent_id, path = %path.display(), bytes = bytes.len(), "order stored");
        Ok(path)
    }

    /// Raw stored document, byte for byte.
    pub fn get_raw(&self, intent_id: &str) -> Result<Vec<u8>, OrderError> {
        validate_intent_id(intent_id).map_err(|_| OrderError::NotFound(intent_id.to_string()))?;
        let path = self.path_for(intent_id);
        match fs::read(&path) {
            Ok(b) => Ok(b),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(OrderError::NotFound(intent_id.to_string()))
            }
            Err(source) => Err(OrderError::Io { path, source }),
        }
    }

    pub fn get(&self, intent_id: &str) -> Result<Value, OrderError> {
        let raw = self.get_raw(intent_id)?;
        serde_json::from_slice(&raw).map_err(|e| OrderError::Encode(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
