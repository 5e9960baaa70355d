//! Scenario: at most one build per entry is in flight.
//!
//! While a build is running, a concurrent refresh reports the entry as busy
//! and does not start a second build. Readers keep getting the old content.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Notify;

use ckt_assets::{AssetCache, AssetError, BuildError, BuildRequest, Builder, SourceFs, ToolchainKind};

struct FixedFs;

impl SourceFs for FixedFs {
    fn modified(&self, _path: &Path) -> io::Result<SystemTime> {
        Ok(SystemTime::UNIX_EPOCH + Duration::from_secs(42))
    }
    fn read(&self, _path: &Path) -> io::Result<Vec<u8>> {
        Ok(b"src".to_vec())
    }
}

struct GatedBuilder {
    calls: AtomicUsize,
    started: Notify,
    release: Notify,
}

#[async_trait]
impl Builder for GatedBuilder {
    async fn build(&self, _req: &BuildRequest) -> Result<Bytes, BuildError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        self.release.notified().await;
        Ok(Bytes::from_static(b"artifact"))
    }
}

#[tokio::test]
async fn concurrent_refresh_skips_in_flight_build() {
    let builder = Arc::new(GatedBuilder {
        calls: AtomicUsize::new(0),
        started: Notify::new(),
        release: Notify::new(),
    });
    let mut cache = AssetCache::new(builder.clone(), Arc::new(FixedFs), "pk");
    let id = cache.insert_compiled("client.wasm", "client.src", ToolchainKind::Standard);
    let cache = Arc::new(cache);

    let first = tokio::spawn({
        let cache = Arc::clone(&cache);
        async move { cache.refresh().await }
    });
    builder.started.notified().await;

    assert!(matches!(cache.get(id), Err(AssetError::NotReady { .. })));

    let second = cache.refresh().await;
    assert_eq!(second.busy, vec!["client.wasm"]);
    assert_eq!(builder.calls.load(Ordering::SeqCst), 1);

    builder.release.notify_one();
    let first = first.await.unwrap();
    assert_eq!(first.rebuilt, vec!["client.wasm"]);
    assert_eq!(&cache.get(id).unwrap()[..], b"artifact");

    let third = cache.refresh().await;
    assert!(third.is_quiet(), "{third:?}");
    assert_eq!(builder.calls.load(Ordering::SeqCst), 1);
}
