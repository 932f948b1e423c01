use anyhow::{ensure, Context, Result};
use rand::prelude::*;
use rayon::prelude::*;
use tch::Tensor;

/// Read a corpus file and lower-case it.
pub fn load_corpus(path: &str) -> Result<String> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read corpus file '{}'", path))?;
    Ok(data.to_lowercase())
}

/// Vocabulary: the sorted set of distinct characters of the corpus,
/// mapped bijectively to `0..vocab_size`.
#[derive(Clone, Debug)]
pub struct Vocab {
    chars: Vec<char>,
}

impl Vocab {
    /// Create a new vocabulary from a string
    pub fn new(data: &str) -> Self {
        let mut chars: Vec<char> = data.chars().collect();
        chars.sort();
        chars.dedup();
        Self { chars }
    }

    /// Encode a character
    fn encode_char(&self, c: char) -> i64 {
        // the vocabulary is derived from the corpus it encodes
        self.chars
            .iter()
            .position(|&x| x == c)
            .expect("character not in vocabulary") as i64
    }

    /// Decode a character
    fn decode_char(&self, i: i64) -> char {
        self.chars[i as usize]
    }

    /// Encode a string
    pub fn encode(&self, s: &str) -> Vec<i64> {
        let chars: Vec<char> = s.chars().collect();
        chars.par_iter().map(|&c| self.encode_char(c)).collect()
    }

    /// Decode a string
    pub fn decode(&self, v: &[i64]) -> String {
        v.iter().map(|&i| self.decode_char(i)).collect()
    }

    /// Return the size of the vocabulary
    pub fn size(&self) -> usize {
        self.chars.len()
    }

    /// Return a reference to the characters
    pub fn chars(&self) -> &Vec<char> {
        &self.chars
    }
}

/// Rescale integer codes into [0, 1] by dividing by the vocabulary size.
pub fn normalize(encoded: &[i64], vocab_size: usize) -> Vec<f32> {
    encoded
        .iter()
        .map(|&i| i as f32 / vocab_size as f32)
        .collect()
}

/// One-hot encode a vocabulary index: a `vocab_size`-long vector with a
/// single 1 at `index`.
pub fn one_hot_row(index: i64, vocab_size: usize) -> Vec<f32> {
    let mut row = vec![0.0; vocab_size];
    row[index as usize] = 1.0;
    row
}

type Batch = (Tensor, Tensor);

/// Sliding-window dataloader.
///
/// A sample is a window of `seq_len` consecutive characters; its target is
/// the single character immediately following the window. The window
/// advances one character at a time, so there are `corpus_len - seq_len`
/// samples.
///
/// Batches are tuples `(xs, ys)`:
/// - `xs` is a `batch_size x seq_len x 1` float tensor of codes rescaled
///   into [0, 1],
/// - `ys` is a `batch_size x vocab_size` float tensor of one-hot targets.
///
/// The last batch may be smaller than `batch_size`.
#[derive(Clone)]
pub struct Loader {
    data: Vec<i64>,
    vocab: Vocab,
    batch_size: usize,
    seq_len: usize,
    /// The number of batches, final partial batch included
    n_batches: usize,
    /// The number of windows of length `seq_len` followed by one more character
    n_samples: usize,
    /// The order in which the samples are picked to make the batches
    order: Option<Vec<usize>>,
    /// The current position in the order
    pos: usize,
    device: tch::Device,
}

impl Loader {
    /// Create a new data loader from a corpus and its vocabulary.
    ///
    /// Fails if the corpus is not longer than the window: no sample can be
    /// built from it.
    pub fn new(
        corpus: &str,
        vocab: Vocab,
        seq_len: usize,
        batch_size: usize,
        device: tch::Device,
    ) -> Result<Self> {
        let data = vocab.encode(corpus);
        ensure!(
            data.len() > seq_len,
            "corpus has {} characters but the sliding window needs at least {}",
            data.len(),
            seq_len + 1
        );
        let n_samples = data.len() - seq_len;
        let n_batches = n_samples.div_ceil(batch_size);

        Ok(Self {
            data,
            vocab,
            batch_size,
            seq_len,
            n_batches,
            n_samples,
            order: None,
            pos: 0,
            device,
        })
    }

    /// Return a reference to the vocabulary
    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    /// Return the number of batches
    pub fn n_batches(&self) -> usize {
        self.n_batches
    }

    /// Return the number of samples
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Return the window length
    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    /// Return the integer-encoded corpus
    pub fn encoded(&self) -> &[i64] {
        &self.data
    }

    /// Pick a random order for the samples and rewind the loader.
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        let mut order: Vec<usize> = (0..self.n_samples).collect();
        order.shuffle(rng);
        self.order = Some(order);
        self.pos = 0;
    }

    /// Returns the next batch, or `None` once the samples are exhausted.
    /// If `shuffle` has been called, the order of the samples is random.
    /// Otherwise, the samples are returned in the order of the corpus.
    pub fn next_batch(&mut self) -> Option<Batch> {
        if self.pos >= self.n_samples {
            return None;
        }

        let this_batch = usize::min(self.batch_size, self.n_samples - self.pos);
        let vocab_size = self.vocab.size();

        let mut xs = Vec::with_capacity(this_batch * self.seq_len);
        let mut ys = Vec::with_capacity(this_batch * vocab_size);

        for i in 0..this_batch {
            let pos = match &self.order {
                Some(order) => order[self.pos + i],
                None => self.pos + i,
            };
            let window = &self.data[pos..pos + self.seq_len];
            let target = self.data[pos + self.seq_len];
            xs.extend(normalize(window, vocab_size));
            ys.extend(one_hot_row(target, vocab_size));
        }

        self.pos += this_batch;

        // [batch, seq_len, 1] and [batch, vocab_size]
        let xs = Tensor::from_slice(&xs)
            .view([this_batch as i64, self.seq_len as i64, 1])
            .to(self.device);
        let ys = Tensor::from_slice(&ys)
            .view([this_batch as i64, vocab_size as i64])
            .to(self.device);

        Some((xs, ys))
    }
}

#[cfg(test)]
mod tests {
    use rand_chacha::rand_core::SeedableRng;

    use super::*;

    #[test]
    fn test_vocab_sorted_distinct() {
        let vocab = Vocab::new("cabbage");
        assert_eq!(vocab.chars(), &vec!['a', 'b', 'c', 'e', 'g']);
        assert_eq!(vocab.size(), 5);
    }

    #[test]
    fn test_vocab_round_trip() {
        let corpus = "the quick brown fox jumps over the lazy dog";
        let vocab = Vocab::new(corpus);
        let encoded = vocab.encode(&corpus[3..23]);
        assert_eq!(vocab.decode(&encoded), &corpus[3..23]);
    }

    #[test]
    fn test_encoded_values_in_range() {
        let corpus = "abcabcabcabcabcabcabcx";
        let vocab = Vocab::new(corpus);
        let encoded = vocab.encode(corpus);
        assert!(encoded.iter().all(|&i| i >= 0 && i < vocab.size() as i64));
    }

    #[test]
    fn test_normalize_in_unit_interval() {
        let corpus = "hello world";
        let vocab = Vocab::new(corpus);
        let encoded = vocab.encode(corpus);
        let normalized = normalize(&encoded, vocab.size());
        assert_eq!(normalized.len(), encoded.len());
        assert!(normalized.iter().all(|&x| (0.0..=1.0).contains(&x)));
        // the largest code maps to (size - 1) / size
        let max = normalized.iter().cloned().fold(f32::MIN, f32::max);
        let expected = (vocab.size() as f32 - 1.0) / vocab.size() as f32;
        assert!((max - expected).abs() < 1e-6);
    }

    #[test]
    fn test_one_hot_row() {
        let row = one_hot_row(3, 7);
        assert_eq!(row.len(), 7);
        assert_eq!(row.iter().filter(|&&x| x == 1.0).count(), 1);
        assert_eq!(row[3], 1.0);
        assert_eq!(row.iter().sum::<f32>(), 1.0);
    }

    #[test]
    fn test_window_count() {
        // 22 characters, window of 20 -> 2 samples
        let corpus = "abcabcabcabcabcabcabcx";
        assert_eq!(corpus.len(), 22);
        let vocab = Vocab::new(corpus);
        let loader = Loader::new(corpus, vocab, 20, 128, tch::Device::Cpu).unwrap();
        assert_eq!(loader.seq_len(), 20);
        assert_eq!(loader.n_samples(), corpus.len() - 20);
        assert_eq!(loader.n_batches(), 1);
    }

    #[test]
    fn test_corpus_too_short() {
        let corpus = "too short";
        let vocab = Vocab::new(corpus);
        let res = Loader::new(corpus, vocab, 20, 128, tch::Device::Cpu);
        assert!(res.is_err());
    }

    #[test]
    fn test_loader_batches() {
        // [a, b, c, d, e, f, g] -> windows of 3, batches of 2
        // samples: (abc, d), (bcd, e), (cde, f), (def, g)
        let corpus = "abcdefg";
        let vocab = Vocab::new(corpus);
        let mut loader = Loader::new(corpus, vocab, 3, 2, tch::Device::Cpu).unwrap();

        assert_eq!(loader.n_samples(), 4);
        assert_eq!(loader.n_batches(), 2);
        // the loader holds the integer-encoded corpus
        assert_eq!(loader.encoded(), &[0, 1, 2, 3, 4, 5, 6]);

        let (xs, ys) = loader.next_batch().unwrap();
        assert_eq!(xs.size(), &[2, 3, 1]);
        assert_eq!(ys.size(), &[2, 7]);

        // first window is "abc" -> [0, 1, 2] / 7
        let first: Vec<f32> = xs.view(-1).try_into().unwrap();
        assert_eq!(&first[0..3], [0.0, 1.0 / 7.0, 2.0 / 7.0].as_slice());
        // first target is 'd' -> one-hot at 3
        let targets: Vec<f32> = ys.view(-1).try_into().unwrap();
        assert_eq!(targets[3], 1.0);
        assert_eq!(targets[0..7].iter().sum::<f32>(), 1.0);

        let (xs, ys) = loader.next_batch().unwrap();
        assert_eq!(xs.size(), &[2, 3, 1]);
        assert_eq!(ys.size(), &[2, 7]);
        assert!(loader.next_batch().is_none());
    }

    #[test]
    fn test_loader_partial_final_batch() {
        // 4 samples, batches of 3 -> a full batch then a batch of 1
        let corpus = "abcdefg";
        let vocab = Vocab::new(corpus);
        let mut loader = Loader::new(corpus, vocab, 3, 3, tch::Device::Cpu).unwrap();

        assert_eq!(loader.n_samples(), 4);
        assert_eq!(loader.n_batches(), 2);

        let (xs, _) = loader.next_batch().unwrap();
        assert_eq!(xs.size(), &[3, 3, 1]);
        let (xs, _) = loader.next_batch().unwrap();
        assert_eq!(xs.size(), &[1, 3, 1]);
        assert!(loader.next_batch().is_none());
    }

    #[test]
    fn test_loader_shuffle_covers_all_samples() {
        let corpus = "abcdefghij";
        let vocab = Vocab::new(corpus);
        let mut loader = Loader::new(corpus, vocab, 3, 2, tch::Device::Cpu).unwrap();
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(123);

        loader.shuffle(&mut rng);

        let mut n = 0;
        while let Some((xs, _)) = loader.next_batch() {
            n += xs.size()[0];
        }
        assert_eq!(n as usize, loader.n_samples());
    }
}
