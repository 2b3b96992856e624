//! State shared between a download worker and the host-thread ticks.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;

use crate::asset::{Placement, PlacementArgs};

/// File size reported until the server sends a Content-Length
pub const UNKNOWN_FILE_SIZE: u64 = 1_000_000_000_000_000;

/// Progress and error channel of one download.
///
/// Workers only write; the host thread only reads, except for
/// [`ThreadCom::add_placements`] which coalesces repeat requests.
#[derive(Debug)]
pub struct ThreadCom {
    file_size: AtomicU64,
    downloaded: AtomicU64,
    progress: AtomicU8,
    error: AtomicBool,
    report: Mutex<String>,
    passargs: Mutex<PlacementArgs>,
}

impl ThreadCom {
    pub fn new(passargs: PlacementArgs) -> Self {
        Self {
            file_size: AtomicU64::new(UNKNOWN_FILE_SIZE),
            downloaded: AtomicU64::new(0),
            progress: AtomicU8::new(0),
            error: AtomicBool::new(false),
            report: Mutex::new(String::new()),
            passargs: Mutex::new(passargs),
        }
    }

    /// Total size in bytes, `None` while unknown
    pub fn file_size(&self) -> Option<u64> {
        match self.file_size.load(Ordering::Relaxed) {
            UNKNOWN_FILE_SIZE => None,
            size => Some(size),
        }
    }

    pub fn set_file_size(&self, size: u64) {
        self.file_size.store(size, Ordering::Relaxed);
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }

    /// Record the running byte count and advance the percentage.
    /// Progress never moves backwards.
    pub fn record_downloaded(&self, total: u64) {
        self.downloaded.store(total, Ordering::Relaxed);
        if let Some(size) = self.file_size().filter(|size| *size > 0) {
            let percent = (u128::from(total) * 100 / u128::from(size)).min(100) as u8;
            self.progress.fetch_max(percent, Ordering::Relaxed);
        }
    }

    /// Whole percent, 0..=100
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Relaxed)
    }

    pub fn complete(&self) {
        self.progress.store(100, Ordering::Relaxed);
    }

    /// Store a human-readable failure and raise the error flag
    pub fn fail(&self, report: impl Into<String>) {
        *self.report.lock().unwrap_or_else(|e| e.into_inner()) = report.into();
        self.error.store(true, Ordering::Release);
    }

    pub fn has_error(&self) -> bool {
        self.error.load(Ordering::Acquire)
    }

    pub fn report(&self) -> String {
        self.report
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn passargs(&self) -> PlacementArgs {
        self.passargs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Append placements from a repeat request for the same asset
    pub fn add_placements(&self, placements: impl IntoIterator<Item = Placement>) {
        self.passargs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .placements
            .extend(placements);
    }
}
