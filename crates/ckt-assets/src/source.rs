//! Filesystem seam for asset sources.

use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Stat and read asset sources.
///
/// Production code uses [`DiskFs`]; tests substitute an in-memory clock-free
/// implementation so staleness can be driven explicitly.
pub trait SourceFs: Send + Sync {
    fn modified(&self, path: &Path) -> io::Result<SystemTime>;
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiskFs;

impl SourceFs for DiskFs {
    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        std::fs::metadata(path)?.modified()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}
