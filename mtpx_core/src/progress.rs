//! Transfer progress accounting.

use crate::object::FileInfo;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime};

const BYTES_PER_MB: f64 = 1_000_000.0;

/// Percentage of `sent` over `total`, in `0.0..=100.0`.
///
/// A zero total yields 0.
pub fn percent(sent: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (sent as f64 / total as f64 * 100.0).min(100.0)
}

/// Transfer rate in MB/s for `bytes` moved in `elapsed`.
///
/// Returns `previous` when no time has elapsed.
pub fn transfer_rate(bytes: u64, elapsed: Duration, previous: f64) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return previous;
    }
    bytes as f64 / BYTES_PER_MB / secs
}

/// Byte counters with a derived percentage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferSizeInfo {
    pub total: u64,
    pub sent: u64,
    pub progress: f64,
}

impl TransferSizeInfo {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            sent: 0,
            progress: 0.0,
        }
    }

    /// Record `sent` bytes, never moving backwards.
    pub fn update(&mut self, sent: u64) {
        self.sent = self.sent.max(sent);
        self.progress = percent(self.sent, self.total);
    }
}

/// Totals computed before a transfer starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub files: u64,
    pub directories: u64,
    pub size: u64,
}

/// Snapshot handed to the progress callback after every chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressInfo {
    /// The file being transferred.
    pub file_info: FileInfo,
    pub start_time: SystemTime,
    pub latest_sent_time: SystemTime,
    /// MB/s over the last chunk.
    pub speed: f64,
    /// From preprocessing, 0 otherwise.
    pub total_files: u64,
    /// From preprocessing, 0 otherwise.
    pub total_directories: u64,
    pub files_sent: u64,
    pub directories_sent: u64,
    pub files_sent_progress: f64,
    pub active_file_size: TransferSizeInfo,
    pub bulk_file_size: TransferSizeInfo,
}

/// Keeps the running [`ProgressInfo`] of one transfer invocation.
pub(crate) struct ProgressTracker {
    info: ProgressInfo,
    last_sample: Instant,
    reported: bool,
}

impl ProgressTracker {
    pub fn new(totals: Totals) -> Self {
        let now = SystemTime::now();
        Self {
            info: ProgressInfo {
                file_info: FileInfo::root(),
                start_time: now,
                latest_sent_time: now,
                speed: 0.0,
                total_files: totals.files,
                total_directories: totals.directories,
                files_sent: 0,
                directories_sent: 0,
                files_sent_progress: 0.0,
                active_file_size: TransferSizeInfo::default(),
                bulk_file_size: TransferSizeInfo::new(totals.size),
            },
            last_sample: Instant::now(),
            reported: false,
        }
    }

    pub fn info(&self) -> &ProgressInfo {
        &self.info
    }

    /// Start accounting for a new file.
    pub fn begin_file(&mut self, file_info: FileInfo) {
        self.info.active_file_size = TransferSizeInfo::new(file_info.size);
        self.info.file_info = file_info;
        self.reported = false;
        self.last_sample = Instant::now();
    }

    /// Record a chunk report from the store.
    pub fn chunk(&mut self, total: u64, sent: u64) {
        let active = &mut self.info.active_file_size;
        active.total = active.total.max(total);
        let before = active.sent;
        active.update(sent);
        let delta = active.sent - before;

        self.advance(delta);
        self.reported = true;
    }

    /// Close the active file.
    ///
    /// Returns true when the caller owes one more callback because the
    /// store never reported the file as complete.
    pub fn complete_file(&mut self) -> bool {
        let active = self.info.active_file_size;
        let owed = !self.reported || active.sent < active.total;
        if owed {
            self.info.active_file_size.update(active.total);
            self.advance(active.total - active.sent);
            self.reported = true;
        }

        self.info.files_sent += 1;
        self.info.files_sent_progress = percent(self.info.files_sent, self.info.total_files);
        owed
    }

    pub fn directory_sent(&mut self) {
        self.info.directories_sent += 1;
    }

    fn advance(&mut self, delta: u64) {
        let now = Instant::now();
        self.info.speed = transfer_rate(delta, now - self.last_sample, self.info.speed);
        self.last_sample = now;
        self.info.latest_sent_time = SystemTime::now();

        let bulk = &mut self.info.bulk_file_size;
        let sent = bulk.sent + delta;
        bulk.update(sent);
    }
}
