//! ckt-assets
//!
//! Holds every served artifact in memory and keeps it fresh:
//! - embedded pages re-read when the on-disk copy is newer
//! - the client bundle recompiled through an external toolchain, together
//!   with the loader glue that toolchain writes next to it
//!
//! Handlers call [`AssetCache::get`]; a background task started with
//! [`spawn_refresher`] calls [`AssetCache::refresh`] on a fixed interval.

mod builder;
mod cache;
mod source;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub use builder::{BuildError, BuildRequest, Builder, CommandBuilder, Toolchain, ToolchainKind};
pub use cache::{AssetCache, AssetEntry, AssetError, AssetId, RebuildPolicy, RefreshReport};
pub use source::{DiskFs, SourceFs};

/// Run [`AssetCache::refresh`] every `interval` until the task is aborted.
///
/// A pass that overruns the interval delays the next tick instead of bursting.
/// `on_report` sees every non-quiet pass.
pub fn spawn_refresher<F>(cache: Arc<AssetCache>, interval: Duration, on_report: F) -> JoinHandle<()>
where
    F: Fn(&RefreshReport) + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = cache.refresh().await;
            if !report.is_quiet() {
                on_report(&report);
            }
        }
    })
}

/// Format a byte count for logs: `512 bytes`, `1.50 KB`, `2.00 MB`.
pub fn human_size(n: usize) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let f = n as f64;
    if f >= MB {
        format!("{:.2} MB", f / MB)
    } else if f >= KB {
        format!("{:.2} KB", f / KB)
    } else {
        format!("{n} bytes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_size_picks_unit() {
        assert_eq!(human_size(512), "512 bytes");
        assert_eq!(human_size(1536), "1.50 KB");
        assert_eq!(human_size(2 * 1024 * 1024), "2.00 MB");
    }
}
