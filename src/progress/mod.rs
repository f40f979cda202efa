//! Progress tracking for transfer runs
//!
//! Every update is logged as a line with the running count, the share of
//! the expected total and the throughput. On interactive terminals a
//! progress bar can be shown as well.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Progress tracker for transfer runs
///
/// Tracks record processing progress against an optional expected total.
pub struct ProgressTracker {
    /// Number of records processed so far
    processed: AtomicU64,
    /// Expected number of records, once known
    total: Option<u64>,
    /// Start time of the operation
    start_time: Instant,
    /// Progress bar (optional, can be disabled)
    bar: Option<ProgressBar>,
}

impl ProgressTracker {
    /// Create a new progress tracker
    ///
    /// # Arguments
    /// * `total` - Total number of records if known (None for unknown)
    /// * `enable_bar` - Whether to display a progress bar
    ///
    /// # Returns
    /// * `Self` - New progress tracker instance
    pub fn new(total: Option<u64>, enable_bar: bool) -> Self {
        let bar = enable_bar.then(|| {
            let bar = ProgressBar::new_spinner();
            bar.set_style(spinner_style());
            if let Some(n) = total {
                bar.set_length(n);
                bar.set_style(bar_style());
            }
            bar
        });

        Self {
            processed: AtomicU64::new(0),
            total,
            start_time: Instant::now(),
            bar,
        }
    }

    /// Set the expected total once the store reports it
    pub fn set_total(&mut self, total: u64) {
        if self.total == Some(total) {
            return;
        }
        self.total = Some(total);
        if let Some(ref bar) = self.bar {
            bar.set_length(total);
            bar.set_style(bar_style());
        }
    }

    /// Expected total, if known
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Records processed so far
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Update progress with new count
    ///
    /// # Arguments
    /// * `count` - Total number of records processed so far
    pub fn update(&self, count: u64) {
        self.processed.store(count, Ordering::Relaxed);
        let rate = self.rate(count);

        match self.percent(count) {
            Some(percent) => info!(
                "Processed {} ({:.4}%) records ({:.0} records per second)",
                count, percent, rate
            ),
            None => info!("Processed {} records ({:.0} records per second)", count, rate),
        }

        if let Some(ref bar) = self.bar {
            bar.set_position(count);
            bar.set_message(format!("({:.0} records/sec)", rate));
        }
    }

    /// Finish and clear the progress bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }

    /// Share of the expected total, in percent
    ///
    /// A zero total counts as complete.
    pub fn percent(&self, count: u64) -> Option<f64> {
        self.total.map(|total| {
            if total == 0 {
                100.0
            } else {
                count as f64 * 100.0 / total as f64
            }
        })
    }

    fn rate(&self, count: u64) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            count as f64 / elapsed
        } else {
            0.0
        }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {pos} records {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}
