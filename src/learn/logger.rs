use std::path::{Path, PathBuf};

use tensorboard_rs::summary_writer::SummaryWriter;

use crate::learn::ProgressReporter;

/// Reporter for Tensorboard
///
/// Writes the batch and epoch training losses as scalars into the run's
/// log directory. The directory is written to but never read back.
pub struct TensorboardReporter {
    writer: Option<SummaryWriter>,
    logdir: PathBuf,
    batches_per_epoch: usize,
    current_epoch: usize,
}

impl TensorboardReporter {
    /// Create a new TensorboardReporter
    pub fn new(logdir: impl AsRef<Path>) -> Self {
        Self {
            writer: None,
            logdir: logdir.as_ref().to_path_buf(),
            batches_per_epoch: 0,
            current_epoch: 0,
        }
    }
}

impl ProgressReporter for TensorboardReporter {
    fn run_start(&mut self, _n_epochs: usize, batches_per_epoch: usize) {
        // create a new writer
        self.writer = Some(SummaryWriter::new(&self.logdir));
        self.batches_per_epoch = batches_per_epoch;
    }

    fn epoch_start(&mut self, epoch: usize) {
        self.current_epoch = epoch;
    }

    fn batch_done(&mut self, batch: usize, loss: f64) {
        if let Some(writer) = &mut self.writer {
            let step = self.current_epoch.saturating_sub(1) * self.batches_per_epoch + batch;
            writer.add_scalar("batch_loss", loss as f32, step);
        }
    }

    fn epoch_done(&mut self, epoch: usize, mean_loss: f64) {
        if let Some(writer) = &mut self.writer {
            writer.add_scalar("loss", mean_loss as f32, epoch);
        }
    }

    fn run_end(&mut self) {
        // close the writer
        self.writer = None;
    }
}
