//! Asset-cache fakes: an in-memory source tree with explicit mtimes and a
//! toolchain that follows a script.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;

use ckt_assets::{BuildError, BuildRequest, Builder, SourceFs};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Default)]
pub struct FakeSourceFs {
    files: Mutex<HashMap<PathBuf, (SystemTime, Vec<u8>)>>,
}

impl FakeSourceFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, path: impl Into<PathBuf>, mtime: SystemTime, bytes: impl Into<Vec<u8>>) {
        lock(&self.files).insert(path.into(), (mtime, bytes.into()));
    }

    /// Move a file's mtime without changing its bytes.
    pub fn touch(&self, path: impl AsRef<Path>, mtime: SystemTime) {
        if let Some(entry) = lock(&self.files).get_mut(path.as_ref()) {
            entry.0 = mtime;
        }
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        lock(&self.files).remove(path.as_ref());
    }
}

impl SourceFs for FakeSourceFs {
    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        lock(&self.files)
            .get(path)
            .map(|(t, _)| *t)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        lock(&self.files)
            .get(path)
            .map(|(_, b)| b.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }
}

/// One scripted build result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedStep {
    Artifact(Vec<u8>),
    Fail(String),
}

/// Pops one [`ScriptedStep`] per build. With the script exhausted every build
/// succeeds with `<name>#<call>:<embed>`.
#[derive(Debug, Default)]
pub struct ScriptedBuilder {
    script: Mutex<VecDeque<ScriptedStep>>,
    requests: Mutex<Vec<BuildRequest>>,
    calls: AtomicUsize,
}

impl ScriptedBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, step: ScriptedStep) {
        lock(&self.script).push_back(step);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<BuildRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl Builder for ScriptedBuilder {
    async fn build(&self, req: &BuildRequest) -> Result<Bytes, BuildError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.requests).push(req.clone());
        let step = lock(&self.script).pop_front();
        match step {
            Some(ScriptedStep::Artifact(bytes)) => Ok(Bytes::from(bytes)),
            Some(ScriptedStep::Fail(stderr)) => Err(BuildError::Failed {
                status: "exit status: 1".to_string(),
                stderr,
            }),
            None => Ok(Bytes::from(format!("{}#{n}:{}", req.name, req.embed))),
        }
    }
}
