use std::collections::BTreeMap;

use burn::{
    data::dataloader,
    nn::attention::generate_padding_mask,
    tensor::{backend::Backend, Bool, Int, Tensor},
};
use derive_new::new;
use tokenizers::Tokenizer;

use crate::{
    pipelines::sequence_labeling::{self, PAD_LABEL_ID, PARTIAL_LABEL, PARTIAL_LABEL_ID},
    utils::tensors::{lengths_to_mask, pad_to},
};

use super::Item;

/// An inference batch for sequence labeling
#[derive(Debug, Clone, new)]
pub struct Infer<B: Backend> {
    /// Tokenized text as 2D tensor: [batch_size, max_seq_length]
    pub tokens: Tensor<B, 2, Int>,

    /// Padding mask for the tokenized text containing booleans for padding locations
    pub mask_pad: Tensor<B, 2, Bool>,

    /// Position of the first sub-word token of every word: [batch_size, max_words]
    pub word_index: Tensor<B, 2, Int>,

    /// True for real words, false for padding: [batch_size, max_words]
    pub word_mask: Tensor<B, 2, Bool>,
}

/// A training batch for sequence labeling
#[derive(Clone, Debug, new)]
pub struct Train<B: Backend> {
    /// Model input, including the context words when items carry them
    pub input: Infer<B>,

    /// Label ids for every word, padded with `PAD_LABEL_ID`: [batch_size, max_words]
    pub targets: Tensor<B, 2, Int>,

    /// The same words without their context, present for multi-view training
    pub origin: Option<Infer<B>>,
}

/// Token ids and word alignment of a single sequence
#[derive(Debug, Clone, PartialEq)]
struct Encoded {
    token_ids: Vec<usize>,

    /// Position of the first token of every kept word
    word_starts: Vec<usize>,
}

/// Struct for batching sequence labeling items
#[derive(Clone)]
pub struct Batcher<B: Backend> {
    /// Tokenizer for converting text to token IDs
    pub tokenizer: Tokenizer,

    /// Maximum sequence length for tokenized text
    pub max_seq_length: usize,

    /// ID of the padding token
    pub pad_token_id: usize,

    /// A mapping from label ids to label names
    pub id2label: BTreeMap<usize, String>,

    /// A mapping from label names to label ids
    pub label2id: BTreeMap<String, usize>,

    /// Build the origin view of items that carry context
    pub multiview: bool,

    /// Device on which to perform computation (e.g., CPU or CUDA device)
    pub device: B::Device,
}

impl<B: Backend> Batcher<B> {
    /// Creates a new batcher
    pub fn new(
        tokenizer: Tokenizer,
        config: sequence_labeling::Config,
        device: B::Device,
    ) -> Self {
        let label2id = config
            .id2label
            .iter()
            .map(|(id, label)| (label.clone(), *id))
            .collect();

        Self {
            tokenizer,
            pad_token_id: config.pad_token_id,
            max_seq_length: config.max_seq_len.unwrap_or(config.max_position_embeddings),
            id2label: config.id2label,
            label2id,
            multiview: config.options.multiview,
            device,
        }
    }

    /// Tokenize the words followed by their context, keeping track of where every word starts
    fn encode(&self, words: &[String], context: &[String]) -> Encoded {
        let sequence: Vec<String> = words.iter().chain(context).cloned().collect();

        let encoding = self
            .tokenizer
            .encode(sequence, true)
            .expect("unable to encode");

        let mut token_ids: Vec<_> = encoding
            .get_ids()
            .iter()
            .take(self.max_seq_length)
            .map(|t| *t as usize)
            .collect();

        if token_ids.is_empty() {
            token_ids.push(self.pad_token_id);
        }

        let mut starts = vec![None; words.len()];
        for (position, word) in encoding
            .get_word_ids()
            .iter()
            .take(self.max_seq_length)
            .enumerate()
        {
            if let Some(word) = word.map(|w| w as usize) {
                if word < words.len() && starts[word].is_none() {
                    starts[word] = Some(position);
                }
            }
        }

        // Words after the last one that survived truncation are dropped, and words that
        // produced no tokens share the start of the previous word. A sentence keeps at least its
        // first word, anchored on position 0, so every row has something to label.
        let kept = starts
            .iter()
            .rposition(Option::is_some)
            .map_or(words.len().min(1), |last| last + 1);

        let mut previous = 0;
        let word_starts = starts
            .into_iter()
            .take(kept)
            .map(|start| {
                previous = start.unwrap_or(previous);
                previous
            })
            .collect();

        Encoded {
            token_ids,
            word_starts,
        }
    }

    /// Map label names to ids, with partial labels marked as unknown
    fn label_ids(&self, labels: &[String], num_words: usize) -> Vec<i64> {
        labels
            .iter()
            .take(num_words)
            .map(|label| {
                if label == PARTIAL_LABEL {
                    PARTIAL_LABEL_ID
                } else {
                    self.label2id.get(label).copied().unwrap_or(0) as i64
                }
            })
            .collect()
    }

    /// Pad encoded sequences into an inference batch, keeping `lengths[i]` words of row `i`
    fn collate(&self, encoded: Vec<Encoded>, lengths: &[usize]) -> Infer<B> {
        let max_words = lengths.iter().copied().max().unwrap_or(0).max(1);

        let mut token_ids_list = Vec::with_capacity(encoded.len());
        let mut word_starts_list = Vec::with_capacity(encoded.len());

        for (sequence, length) in encoded.into_iter().zip(lengths) {
            token_ids_list.push(sequence.token_ids);
            word_starts_list.push(
                sequence
                    .word_starts
                    .into_iter()
                    .take(*length)
                    .map(|start| start as i64)
                    .collect(),
            );
        }

        let padding = generate_padding_mask(
            self.pad_token_id,
            token_ids_list,
            Some(self.max_seq_length),
            &self.device,
        );

        Infer {
            tokens: padding.tensor,
            mask_pad: padding.mask,
            word_index: pad_to::<B>(0, word_starts_list, max_words, &self.device),
            word_mask: lengths_to_mask::<B>(lengths, max_words, &self.device),
        }
    }
}

/// Implement Batcher trait for Batcher struct for inference on pre-split words
impl<B: Backend> dataloader::batcher::Batcher<Vec<String>, Infer<B>> for Batcher<B> {
    /// Collects a list of word sequences into an inference batch
    fn batch(&self, items: Vec<Vec<String>>) -> Infer<B> {
        let encoded: Vec<_> = items.iter().map(|words| self.encode(words, &[])).collect();
        let lengths: Vec<_> = encoded.iter().map(|e| e.word_starts.len()).collect();

        self.collate(encoded, &lengths)
    }
}

/// Implement Batcher trait for Batcher struct for training
impl<B: Backend, I: Item> dataloader::batcher::Batcher<I, Train<B>> for Batcher<B> {
    /// Collects a vector of sequence labeling items into a training batch
    fn batch(&self, items: Vec<I>) -> Train<B> {
        let batch_size = items.len();

        let with_origin = self.multiview && items.iter().any(|item| !item.context().is_empty());

        let mut augmented = Vec::with_capacity(batch_size);
        let mut origin = Vec::with_capacity(batch_size);
        let mut lengths = Vec::with_capacity(batch_size);
        let mut label_ids_list = Vec::with_capacity(batch_size);

        for item in items {
            let view = self.encode(item.words(), item.context());

            // Both views must label the same words
            let mut length = view.word_starts.len();
            if with_origin {
                let plain = self.encode(item.words(), &[]);
                length = length.min(plain.word_starts.len());
                origin.push(plain);
            }

            label_ids_list.push(self.label_ids(item.labels(), length));
            lengths.push(length);
            augmented.push(view);
        }

        let input = self.collate(augmented, &lengths);
        let [_, max_words] = input.word_mask.dims();

        // Pad the labels to match the word-level sequence length
        let targets = pad_to::<B>(PAD_LABEL_ID, label_ids_list, max_words, &self.device);

        let origin = with_origin.then(|| self.collate(origin, &lengths));

        Train {
            input,
            targets,
            origin,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use burn::{backend::NdArray, data::dataloader::batcher::Batcher as _};
    use pretty_assertions::assert_eq;
    use tokenizers::{models::wordlevel::WordLevel, normalizers::bert::BertNormalizer};

    use super::*;
    use crate::pipelines::sequence_labeling::config::Options;

    type TestBackend = NdArray<f32>;

    #[derive(Clone, Debug)]
    struct Sentence {
        words: Vec<String>,
        labels: Vec<String>,
        context: Vec<String>,
    }

    impl Sentence {
        fn new(words: &str, labels: &str, context: &str) -> Self {
            let split = |s: &str| s.split_whitespace().map(String::from).collect();

            Self {
                words: split(words),
                labels: split(labels),
                context: split(context),
            }
        }
    }

    impl Item for Sentence {
        fn words(&self) -> &[String] {
            &self.words
        }

        fn labels(&self) -> &[String] {
            &self.labels
        }

        fn context(&self) -> &[String] {
            &self.context
        }
    }

    fn tokenizer() -> Tokenizer {
        tokenizer_with(None)
    }

    fn tokenizer_with(normalizer: Option<BertNormalizer>) -> Tokenizer {
        let vocab: HashMap<String, u32> = ["[PAD]", "[UNK]", "john", "lives", "in", "paris", "he", "is", "happy"]
            .iter()
            .enumerate()
            .map(|(i, word)| (word.to_string(), i as u32))
            .collect();

        let model = WordLevel::builder()
            .vocab(vocab)
            .unk_token("[UNK]".to_string())
            .build()
            .unwrap();

        let mut tokenizer = Tokenizer::new(model);
        if let Some(normalizer) = normalizer {
            tokenizer.with_normalizer(normalizer);
        }

        tokenizer
    }

    fn batcher(multiview: bool, max_seq_len: usize) -> Batcher<TestBackend> {
        let id2label = ["O", "B-PER", "B-LOC"]
            .iter()
            .enumerate()
            .map(|(i, label)| (i, label.to_string()))
            .collect();

        let config = sequence_labeling::Config {
            pad_token_id: 0,
            max_position_embeddings: 512,
            hidden_size: 8,
            max_seq_len: Some(max_seq_len),
            id2label,
            options: Options::new().with_multiview(multiview),
        };

        Batcher::new(tokenizer(), config, Default::default())
    }

    fn ints(tensor: Tensor<TestBackend, 2, Int>) -> Vec<i64> {
        tensor.into_data().convert::<i64>().value
    }

    #[test]
    fn aligns_words_and_pads_labels() {
        let batcher = batcher(false, 16);

        let batch: Train<TestBackend> = batcher.batch(vec![
            Sentence::new("john lives in paris", "B-PER O O B-LOC", ""),
            Sentence::new("he is", "O PARTIAL", ""),
        ]);

        assert_eq!(batch.input.tokens.dims(), [2, 4]);
        assert_eq!(ints(batch.input.word_index), vec![0, 1, 2, 3, 0, 1, 0, 0]);
        assert_eq!(
            batch.input.word_mask.into_data().value,
            vec![true, true, true, true, true, true, false, false]
        );
        assert_eq!(
            ints(batch.targets),
            vec![1, 0, 0, 2, 0, PARTIAL_LABEL_ID, PAD_LABEL_ID, PAD_LABEL_ID]
        );
        assert!(batch.origin.is_none());
    }

    #[test]
    fn builds_the_origin_view_for_multiview_training() {
        let batcher = batcher(true, 16);

        let batch: Train<TestBackend> = batcher.batch(vec![
            Sentence::new("john lives", "B-PER O", "he is happy"),
            Sentence::new("paris", "B-LOC", ""),
        ]);

        // The augmented view carries the context tokens, but only the words are labeled
        assert_eq!(batch.input.tokens.dims(), [2, 5]);
        assert_eq!(batch.input.word_mask.dims(), [2, 2]);

        let origin = batch.origin.unwrap();
        assert_eq!(origin.tokens.dims(), [2, 2]);
        assert_eq!(
            origin.word_mask.into_data().value,
            vec![true, true, true, false]
        );
        assert_eq!(ints(batch.targets), vec![1, 0, 2, PAD_LABEL_ID]);
    }

    #[test]
    fn drops_words_lost_to_truncation() {
        let batcher = batcher(false, 2);

        let batch: Train<TestBackend> =
            batcher.batch(vec![Sentence::new("john lives in paris", "B-PER O O B-LOC", "")]);

        assert_eq!(batch.input.tokens.dims(), [1, 2]);
        assert_eq!(ints(batch.targets), vec![1, 0]);
    }

    #[test]
    fn batches_raw_words_for_inference() {
        let batcher = batcher(false, 16);

        let batch: Infer<TestBackend> = batcher.batch(vec![
            vec!["paris".to_string()],
            vec!["john".to_string(), "is".to_string(), "happy".to_string()],
        ]);

        assert_eq!(batch.word_index.dims(), [2, 3]);
        assert_eq!(
            batch.word_mask.into_data().value,
            vec![true, false, false, true, true, true]
        );
    }

    #[test]
    fn keeps_one_word_for_sentences_without_tokens() {
        let mut batcher = batcher(false, 16);
        batcher.tokenizer = tokenizer_with(Some(BertNormalizer::default()));

        let batch: Train<TestBackend> = batcher.batch(vec![
            Sentence::new("paris", "B-LOC", ""),
            Sentence::new("\u{200b}", "O", ""),
        ]);

        assert_eq!(batch.input.tokens.dims(), [2, 1]);
        assert_eq!(ints(batch.input.word_index), vec![0, 0]);
        assert_eq!(batch.input.word_mask.into_data().value, vec![true, true]);
        assert_eq!(ints(batch.targets), vec![2, 0]);

        let batch: Infer<TestBackend> = batcher.batch(vec![vec!["\u{200b}".to_string()]]);

        assert_eq!(batch.word_mask.into_data().value, vec![true]);
    }
}
