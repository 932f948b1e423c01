//! # The `charlstm` crate

/// The `actions` module contains the training job: from corpus to final
/// model artifact.
pub mod actions;

/// The `checkpoint` module contains the monitored-loss weights
/// checkpointing.
pub mod checkpoint;

/// The `config` module contains the command line arguments.
pub mod config;

/// The `data` module contains the structs and functions for loading the
/// corpus, building the vocabulary and generating batches.
pub mod data;

/// The `learn` module contains the structs and functions for reporting the
/// training progress.
pub mod learn;

/// The `model` module contains the structs and functions for the model.
pub mod model;
