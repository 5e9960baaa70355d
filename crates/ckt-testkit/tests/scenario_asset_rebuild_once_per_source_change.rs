//! Scenario: asset cache rebuild accounting.
//!
//! Invariants:
//! - a compiled entry has no content (NotReady) until its first build
//! - source mtime T1 > builtAt T0 triggers exactly one rebuild, builtAt = T1
//! - no further rebuild while the source stays at T1
//! - a failed rebuild leaves content and builtAt untouched

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use ckt_assets::{AssetCache, AssetError, ToolchainKind};
use ckt_testkit::{FakeSourceFs, ScriptedBuilder, ScriptedStep};

fn at(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
}

#[tokio::test]
async fn one_rebuild_per_source_change() {
    let fs = Arc::new(FakeSourceFs::new());
    let builder = Arc::new(ScriptedBuilder::new());
    let mut cache = AssetCache::new(builder.clone(), fs.clone(), "pk_test_abc");
    let id = cache.insert_compiled("client.wasm", "client/main.src", ToolchainKind::Standard);

    assert!(matches!(cache.get(id), Err(AssetError::NotReady { .. })));

    fs.put("client/main.src", at(0), "v0");
    let r = cache.refresh().await;
    assert_eq!(r.rebuilt, vec!["client.wasm"]);
    assert_eq!(cache.entry(id).unwrap().built_at, Some(at(0)));
    assert_eq!(builder.calls(), 1);

    fs.touch("client/main.src", at(30));
    let r = cache.refresh().await;
    assert_eq!(r.rebuilt, vec!["client.wasm"]);
    assert_eq!(cache.entry(id).unwrap().built_at, Some(at(30)));
    assert_eq!(builder.calls(), 2);

    for _ in 0..5 {
        cache.refresh().await;
    }
    assert_eq!(builder.calls(), 2, "no rebuild without a source change");

    let req = &builder.requests()[0];
    assert_eq!(req.embed, "pk_test_abc");
    assert_eq!(req.toolchain, ToolchainKind::Standard);
}

#[tokio::test]
async fn failed_rebuild_keeps_last_good_artifact() {
    let fs = Arc::new(FakeSourceFs::new());
    let builder = Arc::new(ScriptedBuilder::new());
    builder.push(ScriptedStep::Artifact(b"good".to_vec()));
    builder.push(ScriptedStep::Fail("undefined: foo".to_string()));

    let mut cache = AssetCache::new(builder.clone(), fs.clone(), "pk");
    let id = cache.insert_compiled("client.wasm", "main.src", ToolchainKind::Alt);

    fs.put("main.src", at(0), "ok");
    cache.refresh().await;
    let before = cache.entry(id).unwrap();

    fs.put("main.src", at(10), "broken");
    let r = cache.refresh().await;
    assert_eq!(r.failed, vec!["client.wasm"]);

    let after = cache.entry(id).unwrap();
    assert_eq!(after.content, before.content);
    assert_eq!(after.built_at, before.built_at);
    assert_eq!(&cache.get(id).unwrap()[..], b"good");
    assert!(after.uses_alt_toolchain);
}

#[tokio::test]
async fn first_build_failure_stays_not_ready() {
    let fs = Arc::new(FakeSourceFs::new());
    let builder = Arc::new(ScriptedBuilder::new());
    builder.push(ScriptedStep::Fail("syntax error".to_string()));

    let mut cache = AssetCache::new(builder.clone(), fs.clone(), "pk");
    let id = cache.insert_compiled("client.wasm", "main.src", ToolchainKind::Standard);

    fs.put("main.src", at(0), "bad");
    cache.refresh().await;
    assert!(matches!(cache.get(id), Err(AssetError::NotReady { .. })));

    fs.put("main.src", at(1), "fixed");
    cache.refresh().await;
    assert!(cache.get(id).is_ok());
}

#[tokio::test]
async fn pages_reload_only_when_disk_copy_is_newer() {
    let fs = Arc::new(FakeSourceFs::new());
    let mut cache = AssetCache::new(Arc::new(ScriptedBuilder::new()), fs.clone(), "");
    let id = cache.insert_reloadable("index.html", "index.html", "<html>embedded</html>");

    fs.put("index.html", at(0), "<html>stale disk copy</html>");
    cache.refresh().await;
    assert_eq!(&cache.get(id).unwrap()[..], b"<html>embedded</html>");

    let later = SystemTime::now() + Duration::from_secs(120);
    fs.put("index.html", later, "<html>edited</html>");
    let r = cache.refresh().await;
    assert_eq!(r.reloaded, vec!["index.html"]);
    assert_eq!(&cache.get(id).unwrap()[..], b"<html>edited</html>");
    assert!(!cache.entry(id).unwrap().needs_compile);
}
