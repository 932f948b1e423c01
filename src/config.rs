use clap::{Parser, ValueEnum};

/// Torch device to use.
#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum Device {
    /// CPU
    #[default]
    Cpu,
    /// CUDA if available
    Cuda,
    /// MPS
    #[cfg(target_arch = "aarch64")]
    Mps,
}

/// Parameters of the training run.
#[derive(Parser, Debug, Clone)]
pub struct TrainingParameters {
    /// Window length: the number of prior characters the model sees
    #[arg(long, default_value_t = 20)]
    pub seq_len: usize,
    /// Width of the recurrent layer
    #[arg(long, default_value_t = 256)]
    pub hidden_size: i64,
    /// Dropout probability
    #[arg(short = 'D', long, default_value_t = 0.2)]
    pub dropout: f64,
    /// Learning rate
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,
    /// Number of epochs
    #[arg(long, default_value_t = 1)]
    pub n_epochs: usize,
    /// Batch size
    #[arg(long, default_value_t = 128)]
    pub batch_size: usize,

    /// Rng seed for the dataloader
    #[arg(long, default_value_t = 142)]
    pub dataloader_rng_seed: u64,

    /// Prompt to use for an example after the training
    #[arg(long)]
    pub prompt: Option<String>,
}

/// Arguments of the training job.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Corpus path
    #[arg(long, default_value = "data/wonderland.txt")]
    pub train_file: String,

    /// Output directory for logs, checkpoints and the final model
    #[arg(long, default_value = "./tmp/wonderland")]
    pub job_dir: String,

    /// The device to use
    #[arg(short, long, default_value = "cpu")]
    pub device: Device,

    /// Training parameters
    #[clap(flatten)]
    pub training_params: TrainingParameters,
}

/// The configuration for the fit loop
pub struct LearnConfig {
    /// The number of epochs to train
    pub n_epochs: usize,
    /// The learning rate
    pub lr: f64,
    /// The rng seed for the dataloader shuffle
    pub dataloader_rng_seed: u64,
}
