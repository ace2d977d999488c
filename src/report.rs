//! Progress reports emitted by the training driver.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Periodic in-epoch progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub epoch: usize,
    pub epochs: usize,
    pub batch: usize,
    pub batches_per_epoch: usize,
    pub d_loss: f32,
    pub g_loss: f32,
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Epoch {}/{}] [Batch {}/{}] [D loss: {:.6}] [G loss: {:.6}]",
            self.epoch, self.epochs, self.batch, self.batches_per_epoch, self.d_loss, self.g_loss
        )
    }
}

/// End-of-epoch summary: running loss averages and the epoch's FID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    pub epoch: usize,
    pub epochs: usize,
    pub avg_d_loss: f32,
    pub avg_g_loss: f32,
    pub fid: f64,
}

impl fmt::Display for EpochReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Epoch {}/{}\tAvg D loss: {:.4}\tAvg G loss: {:.4}\tFID: {:.4}",
            self.epoch, self.epochs, self.avg_d_loss, self.avg_g_loss, self.fid
        )
    }
}

/// Where the driver sends its reports.
pub trait ProgressSink {
    fn batch(&mut self, report: &BatchReport);
    fn epoch(&mut self, report: &EpochReport);
}

/// Formats reports and logs them at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn batch(&mut self, report: &BatchReport) {
        tracing::info!("{report}");
    }

    fn epoch(&mut self, report: &EpochReport) {
        tracing::info!("{report}");
    }
}

/// Keeps every report in memory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectingSink {
    pub batches: Vec<BatchReport>,
    pub epochs: Vec<EpochReport>,
}

impl ProgressSink for CollectingSink {
    fn batch(&mut self, report: &BatchReport) {
        self.batches.push(report.clone());
    }

    fn epoch(&mut self, report: &EpochReport) {
        self.epochs.push(report.clone());
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for &mut S {
    fn batch(&mut self, report: &BatchReport) {
        (**self).batch(report);
    }

    fn epoch(&mut self, report: &EpochReport) {
        (**self).epoch(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_strings_carry_indices_and_metrics() {
        let b = BatchReport {
            epoch: 1,
            epochs: 50,
            batch: 200,
            batches_per_epoch: 937,
            d_loss: 1.25,
            g_loss: 0.5,
        };
        assert_eq!(
            b.to_string(),
            "[Epoch 1/50] [Batch 200/937] [D loss: 1.250000] [G loss: 0.500000]"
        );

        let e = EpochReport {
            epoch: 3,
            epochs: 50,
            avg_d_loss: 1.0,
            avg_g_loss: 2.0,
            fid: 12.5,
        };
        assert_eq!(
            e.to_string(),
            "Epoch 3/50\tAvg D loss: 1.0000\tAvg G loss: 2.0000\tFID: 12.5000"
        );
    }
}
