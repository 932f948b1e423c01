use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tch::nn::VarStore;

/// Monitored-loss checkpointing: a weights snapshot is written only when
/// the training loss improves on the best value seen so far.
///
/// Checkpoints are named after the epoch and the loss value, e.g.
/// `weights-improvement-03-1.9871.safetensors`.
pub struct BestLossCheckpoint {
    dir: PathBuf,
    best_loss: Option<f64>,
}

impl BestLossCheckpoint {
    /// Create a new checkpointer writing into `dir`. The directory is
    /// created if it does not exist.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("unable to create checkpoint directory '{}'", dir.display()))?;
        Ok(Self {
            dir,
            best_loss: None,
        })
    }

    /// Return the best loss seen so far.
    pub fn best_loss(&self) -> Option<f64> {
        self.best_loss
    }

    /// Save the weights if `loss` improves on the best loss seen so far.
    /// Returns the path of the written checkpoint, or `None` when the loss
    /// did not improve.
    pub fn save_if_improved(
        &mut self,
        vs: &VarStore,
        epoch: usize,
        loss: f64,
    ) -> Result<Option<PathBuf>> {
        let improved = match self.best_loss {
            Some(best) => loss < best,
            None => true,
        };
        if !improved {
            return Ok(None);
        }
        self.best_loss = Some(loss);

        let path = self
            .dir
            .join(format!("weights-improvement-{epoch:02}-{loss:.4}.safetensors"));
        vs.save(&path)
            .with_context(|| format!("unable to write checkpoint '{}'", path.display()))?;

        Ok(Some(path))
    }
}
