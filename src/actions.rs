use std::path::Path;

use anyhow::{Context, Result};
use rand_chacha::rand_core::SeedableRng;
use tch::nn::{OptimizerConfig, VarStore};

use crate::checkpoint::BestLossCheckpoint;
use crate::config::{Args, LearnConfig};
use crate::data::{load_corpus, Loader, Vocab};
use crate::learn::logger::TensorboardReporter;
use crate::learn::{Observer, PbProgressReporter, ProgressReporter};
use crate::model::{loss, CharLstm, CharLstmConfig, NextCharModel};

/// Train the model: the whole batch job, from corpus to final artifact.
pub fn train(device: tch::Device, args: Args) -> Result<()> {
    let job_dir = Path::new(&args.job_dir);

    // the log directory is written to but never consumed here
    let logs_path = job_dir
        .join("logs")
        .join(chrono::Local::now().to_rfc3339());
    println!("Using logs path located at {}", logs_path.display());

    // Load the data
    let corpus = load_corpus(&args.train_file)?;

    // build the vocabulary
    let vocab = Vocab::new(&corpus);
    println!("Total characters: {}", corpus.chars().count());
    println!("Total vocab: {}", vocab.size());

    let params = &args.training_params;
    let mut loader = Loader::new(
        &corpus,
        vocab.clone(),
        params.seq_len,
        params.batch_size,
        device,
    )?;
    println!("Total patterns: {}", loader.n_samples());

    let vs = VarStore::new(device);
    let model = CharLstm::new(
        &vs.root(),
        CharLstmConfig {
            vocab_size: vocab.size() as i64,
            seq_len: params.seq_len,
            hidden_size: params.hidden_size,
            dropout: params.dropout,
        },
    );

    // number of parameters
    let nb_params = vs
        .trainable_variables()
        .iter()
        .map(|t| t.size().iter().product::<i64>())
        .sum::<i64>();
    println!("nb parameters: {}", nb_params);

    let mut observer = Observer::default()
        .with(Box::<PbProgressReporter>::default())
        .with(Box::new(TensorboardReporter::new(&logs_path)));

    let mut checkpoint = BestLossCheckpoint::new(job_dir)?;

    let learn_config = LearnConfig {
        n_epochs: params.n_epochs,
        lr: params.lr,
        dataloader_rng_seed: params.dataloader_rng_seed,
    };

    let final_loss = fit(
        learn_config,
        &mut loader,
        &vs,
        &model,
        &mut observer,
        &mut checkpoint,
    )?;
    println!("final loss: {:.4}", final_loss);

    // save the final model under a fixed subpath of the job directory
    let model_dir = job_dir.join("model");
    std::fs::create_dir_all(&model_dir)
        .with_context(|| format!("unable to create model directory '{}'", model_dir.display()))?;
    let model_path = model_dir.join("model.safetensors");
    vs.save(&model_path)
        .with_context(|| format!("unable to save model '{}'", model_path.display()))?;
    println!("model saved to {}", model_path.display());

    if let Some(prompt) = &params.prompt {
        match generate(&model, &vocab, prompt, 200) {
            Some(gen) => println!("[i] after training: [{}]...{}", prompt, gen),
            None => println!("[i] prompt shares no characters with the corpus, skipping"),
        }
    }

    Ok(())
}

/// The fit loop: one pass per epoch over shuffled batches, Adam steps on the
/// categorical cross-entropy, a running mean of the training loss, and a
/// weights checkpoint whenever that mean improves.
///
/// Returns the mean training loss of the last epoch.
pub fn fit(
    config: LearnConfig,
    loader: &mut Loader,
    vs: &VarStore,
    model: &dyn NextCharModel,
    observer: &mut Observer,
    checkpoint: &mut BestLossCheckpoint,
) -> Result<f64> {
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(config.dataloader_rng_seed);

    let mut opt = tch::nn::Adam::default().build(vs, config.lr)?;

    observer.run_start(config.n_epochs, loader.n_batches());

    let mut mean_loss = f64::INFINITY;
    for epoch in 1..=config.n_epochs {
        observer.epoch_start(epoch);

        // Reshuffle the samples
        loader.shuffle(&mut rng);

        let mut total_loss = 0.0;
        let mut n_batches = 0;
        while let Some((xs, ys)) = loader.next_batch() {
            let logits = model.forward_t(&xs, true);
            let batch_loss = loss(&logits, &ys);

            opt.zero_grad();
            batch_loss.backward();
            opt.step();

            total_loss += f64::from(&batch_loss);
            n_batches += 1;

            observer.batch_done(n_batches, total_loss / n_batches as f64);
        }

        mean_loss = total_loss / n_batches as f64;
        observer.epoch_done(epoch, mean_loss);

        if let Some(path) = checkpoint.save_if_improved(vs, epoch, mean_loss)? {
            observer.checkpoint_saved(epoch, &path);
        }
    }

    observer.run_end();

    Ok(mean_loss)
}

/// Generate text: sample a continuation of the prompt and decode it.
///
/// Characters of the prompt that are not part of the vocabulary are dropped
/// before encoding. Returns `None` when nothing of the prompt survives.
pub fn generate(
    model: &dyn NextCharModel,
    vocab: &Vocab,
    prompt: &str,
    max_len: usize,
) -> Option<String> {
    let prompt: String = prompt
        .to_lowercase()
        .chars()
        .filter(|c| vocab.chars().contains(c))
        .collect();
    if prompt.is_empty() {
        return None;
    }

    let seed = vocab.encode(&prompt);
    let out = model.generate(&seed, max_len);

    Some(vocab.decode(&out))
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use tch::nn::ModuleT;

    use super::*;

    fn fox_corpus() -> String {
        // lower-case pangram repeated until it is longer than a window plus
        // its next character
        let mut corpus = String::new();
        while corpus.len() <= 21 {
            corpus.push_str(&"The quick brown fox jumps over the lazy dog. ".to_lowercase());
        }
        corpus
    }

    #[test]
    #[serial]
    fn test_preprocessing_end_to_end() {
        let corpus = fox_corpus();
        let vocab = Vocab::new(&corpus);

        // the vocabulary is exactly the distinct characters used
        let mut expected: Vec<char> = corpus.chars().collect();
        expected.sort();
        expected.dedup();
        assert_eq!(vocab.chars(), &expected);
        assert!(vocab.chars().contains(&' '));

        let loader = Loader::new(&corpus, vocab.clone(), 20, 128, tch::Device::Cpu).unwrap();
        assert_eq!(loader.n_samples(), corpus.chars().count() - 20);

        // the model output width is the vocabulary size
        let vs = VarStore::new(tch::Device::Cpu);
        let model = CharLstm::new(
            &vs.root(),
            CharLstmConfig {
                vocab_size: vocab.size() as i64,
                seq_len: 20,
                hidden_size: 16,
                dropout: 0.2,
            },
        );
        let mut loader = loader;
        let (xs, ys) = loader.next_batch().unwrap();
        let logits = model.forward_t(&xs, false);
        assert_eq!(logits.size()[1], vocab.size() as i64);
        assert_eq!(ys.size()[1], vocab.size() as i64);
    }

    #[test]
    #[serial]
    fn test_fit_checkpoints_and_returns_finite_loss() {
        let corpus = fox_corpus();
        let vocab = Vocab::new(&corpus);
        let mut loader = Loader::new(&corpus, vocab, 10, 8, tch::Device::Cpu).unwrap();

        let vs = VarStore::new(tch::Device::Cpu);
        let model = CharLstm::new(
            &vs.root(),
            CharLstmConfig {
                vocab_size: loader.vocab().size() as i64,
                seq_len: 10,
                hidden_size: 8,
                dropout: 0.0,
            },
        );

        let dir = tempfile::tempdir().unwrap();
        let mut checkpoint = BestLossCheckpoint::new(dir.path()).unwrap();
        let mut observer = Observer::default();

        let config = LearnConfig {
            n_epochs: 2,
            lr: 1e-2,
            dataloader_rng_seed: 142,
        };

        let final_loss = fit(
            config,
            &mut loader,
            &vs,
            &model,
            &mut observer,
            &mut checkpoint,
        )
        .unwrap();

        assert!(final_loss.is_finite());
        assert!(final_loss > 0.0);

        // the first epoch always improves on nothing, so at least one
        // checkpoint exists
        let n_checkpoints = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with("weights-improvement-")
            })
            .count();
        assert!(n_checkpoints >= 1);
    }

    #[test]
    #[serial]
    fn test_generate_decodes_to_vocabulary_characters() {
        let corpus = fox_corpus();
        let vocab = Vocab::new(&corpus);

        let vs = VarStore::new(tch::Device::Cpu);
        let model = CharLstm::new(
            &vs.root(),
            CharLstmConfig {
                vocab_size: vocab.size() as i64,
                seq_len: 10,
                hidden_size: 8,
                dropout: 0.0,
            },
        );

        let gen = generate(&model, &vocab, "The LAZY dog", 25).unwrap();
        assert_eq!(gen.chars().count(), 25);
        assert!(gen.chars().all(|c| vocab.chars().contains(&c)));

        // a prompt entirely outside the vocabulary is rejected
        assert!(generate(&model, &vocab, "0123456789", 10).is_none());
    }
}
