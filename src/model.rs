use tch::nn::{self, ModuleT, RNN};
use tch::{IndexOp, Kind, Tensor};

use crate::data::normalize;

/// CharLstm configuration.
#[derive(Debug, Clone, Copy)]
pub struct CharLstmConfig {
    /// The vocabulary size.
    pub vocab_size: i64,
    /// The window length.
    pub seq_len: usize,
    /// The width of the recurrent layer.
    pub hidden_size: i64,
    /// The dropout probability applied after the recurrent layer.
    pub dropout: f64,
}

impl Default for CharLstmConfig {
    fn default() -> Self {
        Self {
            vocab_size: 0,
            seq_len: 20,
            hidden_size: 256,
            dropout: 0.2,
        }
    }
}

/// CharLstm predicts the next character from a fixed window of prior
/// characters: one LSTM layer over the time steps, dropout on its last
/// hidden state, and a linear head sized to the vocabulary.
///
/// Inputs are `[batch, seq_len, 1]` floats in [0, 1]; outputs are logits of
/// shape `[batch, vocab_size]`.
#[derive(Debug)]
pub struct CharLstm {
    /// The recurrent layer
    lstm: nn::LSTM,
    /// The output head
    head: nn::Linear,
    /// Dropout probability
    dropout: f64,
    /// The vocabulary size
    vocab_size: i64,
    /// The window length
    seq_len: usize,
    device: tch::Device,
}

impl CharLstm {
    /// Create a new CharLstm
    /// # Arguments
    /// * `vs` - The path to the module.
    /// * `config` - The model configuration. See [CharLstmConfig].
    pub fn new(vs: &nn::Path, config: CharLstmConfig) -> Self {
        let CharLstmConfig {
            vocab_size,
            seq_len,
            hidden_size,
            dropout,
        } = config;

        // one feature channel per time step
        let lstm = nn::lstm(vs / "lstm", 1, hidden_size, Default::default());
        let head = nn::linear(vs / "head", hidden_size, vocab_size, Default::default());

        Self {
            lstm,
            head,
            dropout,
            vocab_size,
            seq_len,
            device: vs.device(),
        }
    }
}

impl nn::ModuleT for CharLstm {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let (b, t, _c) = xs.size3().unwrap();

        let (out, _state) = self.lstm.seq(xs); // [batch, seq_len, hidden]
        assert_eq!(out.size()[0], b);
        assert_eq!(out.size()[1], t);

        // only the last time step feeds the head
        let last = out.i((.., -1, ..)); // [batch, hidden]
        let last = last.dropout(self.dropout, train);

        let logits = last.apply(&self.head); // [batch, vocab_size]
        assert_eq!(logits.size(), &[b, self.vocab_size]);
        logits
    }
}

/// NextCharModel predicts a distribution over the next character given a
/// window of prior characters.
pub trait NextCharModel: nn::ModuleT {
    /// Compute the probability of the next character.
    ///
    /// # Arguments
    /// - xs: normalized windows of shape \[batch_size, x, 1\]; x <= `seq_len`
    ///
    /// # Returns
    /// the probability of the next character of shape \[batch_size,
    /// vocab_size\]
    fn probabilities(&self, xs: &Tensor) -> Tensor;

    /// Return the window length the model was trained with.
    fn seq_len(&self) -> usize;

    /// Return the vocabulary size.
    fn vocab_size(&self) -> i64;

    /// Sample a continuation of `max_len` characters from an
    /// integer-encoded seed.
    fn generate(&self, seed: &[i64], max_len: usize) -> Vec<i64>;
}

impl NextCharModel for CharLstm {
    fn probabilities(&self, xs: &Tensor) -> Tensor {
        self.forward_t(xs, false)
            .softmax(-1, Kind::Float)
            .detach()
    }

    fn seq_len(&self) -> usize {
        self.seq_len
    }

    fn vocab_size(&self) -> i64 {
        self.vocab_size
    }

    fn generate(&self, seed: &[i64], max_len: usize) -> Vec<i64> {
        assert!(!seed.is_empty(), "generate needs a non-empty seed");

        let mut context = seed.to_vec();
        let mut out = Vec::with_capacity(max_len);

        for _ in 0..max_len {
            // the window slides over the tail of the context
            let start = context.len().saturating_sub(self.seq_len);
            let window = normalize(&context[start..], self.vocab_size as usize);
            let xs = Tensor::from_slice(&window)
                .view([1, window.len() as i64, 1])
                .to(self.device);

            let probs = self.probabilities(&xs);
            let next = probs.multinomial(1, true).int64_value(&[0, 0]);

            out.push(next);
            context.push(next);
        }

        out
    }
}

/// Categorical cross-entropy between logits and one-hot targets, averaged
/// over the batch.
pub fn loss(logits: &Tensor, targets: &Tensor) -> Tensor {
    let b = logits.size()[0];
    -(targets * logits.log_softmax(-1, Kind::Float)).sum(Kind::Float) / b as f64
}
