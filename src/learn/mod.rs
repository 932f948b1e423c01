/// Logger for training.
pub mod logger;

use std::fmt::Write;
use std::path::Path;

use indicatif::{MultiProgress, ProgressBar, ProgressState, ProgressStyle};

/// A trait for reporting progress during training.
#[allow(unused_variables)]
pub trait ProgressReporter {
    /// Called once before the first epoch.
    fn run_start(&mut self, n_epochs: usize, batches_per_epoch: usize) {}
    /// Called when an epoch starts.
    fn epoch_start(&mut self, epoch: usize) {}
    /// Called when a batch has been processed.
    fn batch_done(&mut self, batch: usize, loss: f64) {}
    /// Called when an epoch ends with the mean training loss of the epoch.
    fn epoch_done(&mut self, epoch: usize, mean_loss: f64) {}
    /// Called when a weights checkpoint has been written.
    fn checkpoint_saved(&mut self, epoch: usize, path: &Path) {}
    /// Called once after the last epoch.
    fn run_end(&mut self) {}
}

/// Training observer: fans progress events out to its reporters.
#[derive(Default)]
pub struct Observer {
    reporters: Vec<Box<dyn ProgressReporter>>,
}

impl Observer {
    /// Add a reporter to the observer.
    pub fn with(mut self, reporter: Box<dyn ProgressReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }
}

impl ProgressReporter for Observer {
    fn run_start(&mut self, n_epochs: usize, batches_per_epoch: usize) {
        for reporter in &mut self.reporters {
            reporter.run_start(n_epochs, batches_per_epoch);
        }
    }

    fn epoch_start(&mut self, epoch: usize) {
        for reporter in &mut self.reporters {
            reporter.epoch_start(epoch);
        }
    }

    fn batch_done(&mut self, batch: usize, loss: f64) {
        for reporter in &mut self.reporters {
            reporter.batch_done(batch, loss);
        }
    }

    fn epoch_done(&mut self, epoch: usize, mean_loss: f64) {
        for reporter in &mut self.reporters {
            reporter.epoch_done(epoch, mean_loss);
        }
    }

    fn checkpoint_saved(&mut self, epoch: usize, path: &Path) {
        for reporter in &mut self.reporters {
            reporter.checkpoint_saved(epoch, path);
        }
    }

    fn run_end(&mut self) {
        for reporter in &mut self.reporters {
            reporter.run_end();
        }
    }
}

/// Progress reporter that uses the `indicatif` crate to display progress bars.
pub struct PbProgressReporter {
    mb: MultiProgress,
    epoch_bar: Option<ProgressBar>,
    train_bar: Option<ProgressBar>,
    batches_per_epoch: usize,
}

impl Default for PbProgressReporter {
    fn default() -> Self {
        PbProgressReporter {
            mb: MultiProgress::new(),
            epoch_bar: None,
            train_bar: None,
            batches_per_epoch: 0,
        }
    }
}

impl ProgressReporter for PbProgressReporter {
    fn run_start(&mut self, n_epochs: usize, batches_per_epoch: usize) {
        let epoch_bar = self.mb.add(ProgressBar::new(n_epochs as u64));
        epoch_bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} MASTER   {bar:20.cyan/blue} [Epoch {pos:>4}/{len:4} {elapsed_precise} < {eta_precise}] {msg}")
                .unwrap()
                .progress_chars("##-"),
        );
        epoch_bar.tick();
        self.epoch_bar = Some(epoch_bar);
        self.batches_per_epoch = batches_per_epoch;
    }

    fn epoch_start(&mut self, epoch: usize) {
        let train_bar = self.mb.add(ProgressBar::new(self.batches_per_epoch as u64));
        train_bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} TRAINING {bar:20.green/blue} [{pos:>7}/{len:7} {elapsed_precise} < {eta_precise}, {per_sec_short:.2}] {msg}")
                .unwrap()
                .with_key("per_sec_short",
                          |state: &ProgressState, w: &mut dyn Write|
                              write!(w, "{:>7.1}/s", state.per_sec()).unwrap())
                .progress_chars("##-"),
        );
        train_bar.set_message(format!("Epoch {}", epoch));
        train_bar.tick();
        self.train_bar = Some(train_bar);
    }

    fn batch_done(&mut self, batch: usize, loss: f64) {
        if let Some(train_bar) = &self.train_bar {
            train_bar.set_position(batch as u64);
            train_bar.set_message(format!("loss {:.4}", loss));
        }
    }

    fn epoch_done(&mut self, epoch: usize, mean_loss: f64) {
        if let Some(train_bar) = &self.train_bar {
            train_bar.finish_and_clear();
        }
        self.train_bar = None;

        if let Some(epoch_bar) = &self.epoch_bar {
            epoch_bar.set_position(epoch as u64);
            epoch_bar.set_message(format!("Epoch {} loss: {:.4}", epoch, mean_loss));
        }
    }

    fn checkpoint_saved(&mut self, _epoch: usize, path: &Path) {
        self.mb
            .println(format!("[i] checkpoint written: {}", path.display()))
            .ok();
    }

    fn run_end(&mut self) {
        if let Some(epoch_bar) = &self.epoch_bar {
            epoch_bar.finish(); // keep the bar
        }
        self.epoch_bar = None;
    }
}
