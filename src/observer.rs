//! Progress reporting for downloads.
//!
//! The downloader reports `(blocks, block_size, total)` triples to a
//! [`ProgressObserver`]. [`ConsoleObserver`] turns them into a fixed width
//! bar that is redrawn in place.
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

/// Number of cells in the rendered bar.
pub const BAR_WIDTH: usize = 20;

/// One progress report from the transfer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Blocks received so far (the last one may be partial).
    pub blocks: u64,
    pub block_size: u64,
    /// Size announced by the server, if any.
    pub total: Option<u64>,
}

impl Progress {
    /// Bytes accounted for by `blocks`, capped at the announced total.
    pub fn transferred(&self) -> u64 {
        let bytes = self.blocks.saturating_mul(self.block_size);
        match self.total {
            Some(total) => bytes.min(total),
            None => bytes,
        }
    }

    /// `floor(transferred / total * 100)`, `None` when the total is unknown.
    ///
    /// A total smaller than one block reads 100 after the first block, and an
    /// empty file is complete from the start.
    pub fn percent(&self) -> Option<u64> {
        self.scaled(100, false)
    }

    /// Number of `#` cells: `round(transferred / total * BAR_WIDTH)`.
    fn filled_cells(&self) -> Option<usize> {
        self.scaled(BAR_WIDTH as u64, true).map(|cells| cells as usize)
    }

    /// `transferred / total * scale`, floored or rounded half up.
    fn scaled(&self, scale: u64, round: bool) -> Option<u64> {
        let total = self.total?;
        if total == 0 {
            return Some(scale);
        }
        let numerator = u128::from(self.transferred()) * u128::from(scale);
        let total = u128::from(total);
        let value = if round {
            (2 * numerator + total) / (2 * total)
        } else {
            numerator / total
        };
        Some(value.min(u128::from(scale)) as u64)
    }

    /// Renders `[#####               ] 25%`, or the byte count when the total is unknown.
    pub fn render(&self) -> String {
        match (self.filled_cells(), self.percent()) {
            (Some(filled), Some(percent)) => format!(
                "[{}{}] {}%",
                "#".repeat(filled),
                " ".repeat(BAR_WIDTH - filled),
                percent
            ),
            _ => format!("{} bytes", self.transferred()),
        }
    }
}

/// Receives progress reports from the transfer loop.
pub trait ProgressObserver: Send + Sync {
    fn update(&self, progress: Progress);
    fn finish(&self) {}
}

/// Draws progress on the terminal through an `indicatif` bar.
pub struct ConsoleObserver {
    pub pb: ProgressBar,
}

impl ConsoleObserver {
    /// A bar labelled with `label`, e.g. the file being downloaded.
    pub fn new(label: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::with_template("{prefix} {msg}").unwrap());
        pb.set_prefix(label.to_string());
        Self { pb }
    }

    pub fn hidden() -> Self {
        Self {
            pb: ProgressBar::hidden(),
        }
    }
}

impl ProgressObserver for ConsoleObserver {
    fn update(&self, progress: Progress) {
        self.pb.set_message(progress.render());
    }

    fn finish(&self) {
        self.pb.finish();
    }
}

/// Keeps every report; used by tests and for quiet runs.
#[derive(Default)]
pub struct RecordingObserver {
    reports: Mutex<Vec<Progress>>,
}

impl RecordingObserver {
    pub fn reports(&self) -> Vec<Progress> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ProgressObserver for RecordingObserver {
    fn update(&self, progress: Progress) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(progress);
        }
    }
}
