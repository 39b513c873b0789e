//! Shared scan statistics.
//!
//! Counters are plain atomics shared across workers; relaxed ordering is
//! sufficient since they are only read after the results channel closes
//! (or for progress display, where staleness is acceptable).

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters accumulated across every worker in a scan run.
#[derive(Debug, Default)]
pub struct ScanStats {
    files: AtomicU64,
    bytes: AtomicU64,
    query_nanos: AtomicU64,
    data_load_nanos: AtomicU64,
    list_files_nanos: AtomicU64,
    branches: AtomicU64,
    repos: AtomicU64,
}

impl ScanStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_file(&self, size: u64) {
        self.files.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(size, Ordering::Relaxed);
    }

    pub(crate) fn add_query_nanos(&self, nanos: u64) {
        self.query_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    pub(crate) fn add_data_load_nanos(&self, nanos: u64) {
        self.data_load_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    pub(crate) fn add_list_files_nanos(&self, nanos: u64) {
        self.list_files_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    pub(crate) fn add_branches(&self, count: u64) {
        self.branches.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn add_repo(&self) {
        self.repos.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn files(&self) -> u64 {
        self.files.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn query_nanos(&self) -> u64 {
        self.query_nanos.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn data_load_nanos(&self) -> u64 {
        self.data_load_nanos.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn list_files_nanos(&self) -> u64 {
        self.list_files_nanos.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn branches(&self) -> u64 {
        self.branches.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn repos(&self) -> u64 {
        self.repos.load(Ordering::Relaxed)
    }
}
