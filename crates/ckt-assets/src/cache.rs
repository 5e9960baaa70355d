//! In-memory asset store with staleness-driven refresh.
//!
//! Entries live in a fixed arena addressed by [`AssetId`]. Content swaps
//! happen under a short write lock; compilation and file access run with no
//! lock held (file access on the blocking pool), so a slow toolchain never
//! blocks request handlers.
//!
//! # Rebuild rules
//! - `Reload`: re-read from disk when the source mtime is newer than `built_at`.
//! - `Compile`: rebuilt via the [`Builder`] under the same condition. At most
//!   one build per entry is in flight; a failed build keeps the previous
//!   content and is not retried until the source changes again.
//!
//! A compiled entry may carry **glue**: a side output the toolchain writes to
//! disk (the JS loader generated for exactly this module). Glue is read after
//! a successful build and swapped in the same write section as the module,
//! so a reader never pairs a module with glue from another build.
//!
//! On success `built_at` is set to the source mtime observed before the build,
//! so an edit made while compiling is picked up on the next tick.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Instant, SystemTime};

use bytes::Bytes;
use tracing::{error, info, warn};

use crate::builder::{BuildRequest, Builder, ToolchainKind};
use crate::human_size;
use crate::source::SourceFs;

/// Handle to one registered entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildPolicy {
    Reload {
        source: PathBuf,
    },
    Compile {
        source: PathBuf,
        toolchain: ToolchainKind,
        /// Side output of the build, read back after each success.
        glue: Option<PathBuf>,
    },
}

impl RebuildPolicy {
    fn source(&self) -> &Path {
        match self {
            RebuildPolicy::Reload { source } | RebuildPolicy::Compile { source, .. } => source,
        }
    }
}

/// Read-only view of one entry.
#[derive(Debug, Clone)]
pub struct AssetEntry {
    pub name: String,
    pub content: Option<Bytes>,
    pub glue: Option<Bytes>,
    pub source_mod_time: Option<SystemTime>,
    pub built_at: Option<SystemTime>,
    pub needs_compile: bool,
    pub uses_alt_toolchain: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    /// The entry has never been built successfully.
    NotReady { name: String },
    UnknownAsset,
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetError::NotReady { name } => write!(f, "asset '{name}' is not built yet"),
            AssetError::UnknownAsset => write!(f, "unknown asset id"),
        }
    }
}

impl std::error::Error for AssetError {}

/// What one refresh pass did, by entry name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub rebuilt: Vec<String>,
    pub reloaded: Vec<String>,
    pub failed: Vec<String>,
    /// Skipped because a build for the same entry was already running.
    pub busy: Vec<String>,
    /// Source went missing this pass. An entry whose source stays missing is
    /// listed once, not on every pass.
    pub missing: Vec<String>,
}

impl RefreshReport {
    /// Some entry's served content changed, or a rebuild or reload failed.
    pub fn touched_content(&self) -> bool {
        !(self.rebuilt.is_empty() && self.reloaded.is_empty() && self.failed.is_empty())
    }

    pub fn is_quiet(&self) -> bool {
        !self.touched_content() && self.busy.is_empty() && self.missing.is_empty()
    }
}

#[derive(Debug, Default)]
struct EntryState {
    content: Option<Bytes>,
    glue: Option<Bytes>,
    source_mod_time: Option<SystemTime>,
    built_at: Option<SystemTime>,
    /// Source mtime of the last failed build; that version is not retried.
    failed_source: Option<SystemTime>,
    source_missing: bool,
}

struct Slot {
    name: String,
    policy: RebuildPolicy,
    state: RwLock<EntryState>,
    building: AtomicBool,
}

impl Slot {
    fn read(&self) -> RwLockReadGuard<'_, EntryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, EntryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Clears the in-flight flag when the build future finishes or is dropped.
struct BuildGuard<'a>(&'a AtomicBool);

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct AssetCache {
    slots: Vec<Slot>,
    builder: Arc<dyn Builder>,
    fs: Arc<dyn SourceFs>,
    embed: String,
}

impl fmt::Debug for AssetCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetCache")
            .field("entries", &self.slots.iter().map(|s| &s.name).collect::<Vec<_>>())
            .finish()
    }
}

impl AssetCache {
    /// `embed` is handed to every compile (the publishable key).
    pub fn new(builder: Arc<dyn Builder>, fs: Arc<dyn SourceFs>, embed: impl Into<String>) -> Self {
        Self {
            slots: Vec::new(),
            builder,
            fs,
            embed: embed.into(),
        }
    }

    fn push(&mut self, name: &str, policy: RebuildPolicy, state: EntryState) -> AssetId {
        self.slots.push(Slot {
            name: name.to_string(),
            policy,
            state: RwLock::new(state),
            building: AtomicBool::new(false),
        });
        AssetId(self.slots.len() - 1)
    }

    /// Register content seeded from the binary that is replaced whenever
    /// `source` on disk is newer than the seed.
    pub fn insert_reloadable(
        &mut self,
        name: &str,
        source: impl Into<PathBuf>,
        seed: impl Into<Bytes>,
    ) -> AssetId {
        let state = EntryState {
            content: Some(seed.into()),
            built_at: Some(SystemTime::now()),
            ..EntryState::default()
        };
        self.push(name, RebuildPolicy::Reload { source: source.into() }, state)
    }

    /// Register an entry produced by the toolchain. It has no content until
    /// its first successful build.
    pub fn insert_compiled(
        &mut self,
        name: &str,
        source: impl Into<PathBuf>,
        toolchain: ToolchainKind,
    ) -> AssetId {
        let policy = RebuildPolicy::Compile {
            source: source.into(),
            toolchain,
            glue: None,
        };
        self.push(name, policy, EntryState::default())
    }

    /// Like [`insert_compiled`](Self::insert_compiled), and every successful
    /// build also picks up the file the toolchain wrote at `glue`. A build
    /// that leaves no glue behind counts as failed.
    pub fn insert_compiled_with_glue(
        &mut self,
        name: &str,
        source: impl Into<PathBuf>,
        toolchain: ToolchainKind,
        glue: impl Into<PathBuf>,
    ) -> AssetId {
        let policy = RebuildPolicy::Compile {
            source: source.into(),
            toolchain,
            glue: Some(glue.into()),
        };
        self.push(name, policy, EntryState::default())
    }

    fn slot(&self, id: AssetId) -> Result<&Slot, AssetError> {
        self.slots.get(id.0).ok_or(AssetError::UnknownAsset)
    }

    /// Current content of an entry.
    pub fn get(&self, id: AssetId) -> Result<Bytes, AssetError> {
        self.get_with_glue(id).map(|(content, _)| content)
    }

    /// Content and glue of an entry, taken under one read lock so both come
    /// from the same build.
    pub fn get_with_glue(&self, id: AssetId) -> Result<(Bytes, Option<Bytes>), AssetError> {
        let slot = self.slot(id)?;
        let st = slot.read();
        match &st.content {
            Some(content) => Ok((content.clone(), st.glue.clone())),
            None => Err(AssetError::NotReady {
                name: slot.name.clone(),
            }),
        }
    }

    pub fn find(&self, name: &str) -> Option<AssetId> {
        self.slots.iter().position(|s| s.name == name).map(AssetId)
    }

    pub fn entry(&self, id: AssetId) -> Result<AssetEntry, AssetError> {
        let slot = self.slot(id)?;
        let st = slot.read();
        Ok(AssetEntry {
            name: slot.name.clone(),
            content: st.content.clone(),
            glue: st.glue.clone(),
            source_mod_time: st.source_mod_time,
            built_at: st.built_at,
            needs_compile: matches!(slot.policy, RebuildPolicy::Compile { .. }),
            uses_alt_toolchain: matches!(
                slot.policy,
                RebuildPolicy::Compile {
                    toolchain: ToolchainKind::Alt,
                    ..
                }
            ),
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    // ---------------------------------------------------------------------
    // Refresh
    // ---------------------------------------------------------------------

    /// One pass over every entry: stat sources, rebuild or reload the stale.
    pub async fn refresh(&self) -> RefreshReport {
        let mut report = RefreshReport::default();
        for slot in &self.slots {
            self.refresh_slot(slot, &mut report).await;
        }
        report
    }

    async fn stat(&self, path: &Path) -> io::Result<SystemTime> {
        let fs = Arc::clone(&self.fs);
        let path = path.to_path_buf();
        off_thread(move || fs.modified(&path)).await
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let fs = Arc::clone(&self.fs);
        let path = path.to_path_buf();
        off_thread(move || fs.read(&path)).await
    }

    async fn refresh_slot(&self, slot: &Slot, report: &mut RefreshReport) {
        let source = slot.policy.source();

        let mtime = match self.stat(source).await {
            Ok(t) => t,
            Err(e) => {
                let mut st = slot.write();
                if !st.source_missing {
                    warn!(asset = %slot.name, path = %source.display(), error = %e, "source unavailable; keeping current content");
                    st.source_missing = true;
                    report.missing.push(slot.name.clone());
                }
                st.source_mod_time = Some(SystemTime::now());
                return;
            }
        };

        {
            let mut st = slot.write();
            if st.source_missing {
                info!(asset = %slot.name, path = %source.display(), "source available again");
                st.source_missing = false;
            }
            st.source_mod_time = Some(mtime);

            let stale = st.content.is_none() || st.built_at.map_or(true, |b| mtime > b);
            if !stale || st.failed_source == Some(mtime) {
                return;
            }
        }

        match &slot.policy {
            RebuildPolicy::Reload { source } => self.reload(slot, source, mtime, report).await,
            RebuildPolicy::Compile {
                source,
                toolchain,
                glue,
            } => {
                self.compile(slot, source, *toolchain, glue.as_deref(), mtime, report)
                    .await
            }
        }
    }

    async fn reload(&self, slot: &Slot, source: &Path, mtime: SystemTime, report: &mut RefreshReport) {
        match self.read(source).await {
            Ok(bytes) => {
                let size = bytes.len();
                let mut st = slot.write();
                st.content = Some(Bytes::from(bytes));
                st.built_at = Some(mtime);
                drop(st);
                info!(asset = %slot.name, size = %human_size(size), "reloaded from disk");
                report.reloaded.push(slot.name.clone());
            }
            Err(e) => {
                warn!(asset = %slot.name, path = %source.display(), error = %e, "reload failed; keeping current content");
                report.failed.push(slot.name.clone());
            }
        }
    }

    async fn compile(
        &self,
        slot: &Slot,
        source: &Path,
        toolchain: ToolchainKind,
        glue: Option<&Path>,
        mtime: SystemTime,
        report: &mut RefreshReport,
    ) {
        if slot
            .building
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            report.busy.push(slot.name.clone());
            return;
        }
        let _guard = BuildGuard(&slot.building);

        let req = BuildRequest {
            name: slot.name.clone(),
            source: source.to_path_buf(),
            toolchain,
            embed: self.embed.clone(),
        };

        info!(asset = %slot.name, toolchain = ?toolchain, "compiling");
        let started = Instant::now();
        let result = self.builder.build(&req).await;
        let elapsed = started.elapsed();

        let bytes = match result {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => {
                slot.write().failed_source = Some(mtime);
                error!(asset = %slot.name, "build produced an empty artifact; keeping previous content");
                report.failed.push(slot.name.clone());
                return;
            }
            Err(e) => {
                slot.write().failed_source = Some(mtime);
                error!(asset = %slot.name, error = %e, elapsed_ms = elapsed.as_millis() as u64, "build failed; keeping previous content");
                report.failed.push(slot.name.clone());
                return;
            }
        };

        let glue = match glue {
            None => None,
            Some(path) => match self.read(path).await {
                Ok(g) => Some(Bytes::from(g)),
                Err(e) => {
                    slot.write().failed_source = Some(mtime);
                    error!(asset = %slot.name, path = %path.display(), error = %e, "build left no loader glue; keeping previous content");
                    report.failed.push(slot.name.clone());
                    return;
                }
            },
        };

        let size = bytes.len();
        let mut st = slot.write();
        st.content = Some(bytes);
        if glue.is_some() {
            st.glue = glue;
        }
        st.built_at = Some(mtime);
        st.failed_source = None;
        drop(st);
        info!(
            asset = %slot.name,
            elapsed_ms = elapsed.as_millis() as u64,
            size = %human_size(size),
            "compiled"
        );
        report.rebuilt.push(slot.name.clone());
    }
}

/// Run a filesystem call on the blocking pool.
async fn off_thread<T, F>(f: F) -> io::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> io::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(io::Error::other)?
}
