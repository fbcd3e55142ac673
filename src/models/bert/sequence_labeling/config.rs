//! Adapt BERT to the Sequence Labeling pipeline

use std::{collections::BTreeMap, path::PathBuf};

use bert_burn::model::BertModelConfig;
use burn::{config::Config as _, tensor::backend::Backend};

use crate::pipelines::sequence_labeling::{self, HeadConfig, HeadError, Options, Training};

use super::Model;

/// The Model Configuration
#[derive(burn::config::Config)]
pub struct Config {
    // -- Fields copied from BertModelConfig because #[serde(flatten)] is not supported yet
    /// Number of attention heads in the multi-head attention
    pub num_attention_heads: usize,
    /// Number of transformer encoder layers/blocks
    pub num_hidden_layers: usize,
    /// Layer normalization epsilon
    pub layer_norm_eps: f64,
    /// Size of bert embedding (e.g., 768 for roberta-base)
    pub hidden_size: usize,
    /// Size of the intermediate position wise feedforward layer
    pub intermediate_size: usize,
    /// Size of the vocabulary
    pub vocab_size: usize,
    /// Max position embeddings, in RoBERTa equal to max_seq_len + 2 (514), for BERT equal to max_seq_len(512)
    pub max_position_embeddings: usize,
    /// Identifier for sentence type in input (e.g., 0 for single sentence, 1 for pair)
    pub type_vocab_size: usize,
    /// Dropout value across layers, typically 0.1
    pub hidden_dropout_prob: f64,
    /// BERT model name (roberta)
    pub model_type: String,
    /// Index of the padding token
    pub pad_token_id: usize,
    /// Maximum sequence length for the tokenizer
    pub max_seq_len: Option<usize>,
    /// Whether to add a pooling layer to the model
    pub with_pooling_layer: Option<bool>,
    // -- End fields copied from BertModelConfig
    /// A map from label ids to label names
    pub id2label: BTreeMap<usize, String>,

    /// Options for the labeling head
    #[config(default = "Options::new()")]
    pub options: Options,
}

impl Config {
    /// Build the configuration from a BERT config, a label vocabulary, and head options
    pub fn new_with_labels(model: BertModelConfig, labels: &[String], options: Options) -> Self {
        let id2label = labels
            .iter()
            .enumerate()
            .map(|(i, s)| (i, s.trim().to_string()))
            .collect();

        Config::new(
            model.num_attention_heads,
            model.num_hidden_layers,
            model.layer_norm_eps,
            model.hidden_size,
            model.intermediate_size,
            model.vocab_size,
            model.max_position_embeddings,
            model.type_vocab_size,
            model.hidden_dropout_prob,
            model.model_type,
            model.pad_token_id,
            id2label,
        )
        .with_max_seq_len(model.max_seq_len)
        .with_with_pooling_layer(model.with_pooling_layer)
        .with_options(options)
    }

    /// Get the Bert model configuration
    pub fn get_bert_config(&self) -> BertModelConfig {
        BertModelConfig::new(
            self.num_attention_heads,
            self.num_hidden_layers,
            self.layer_norm_eps,
            self.hidden_size,
            self.intermediate_size,
            self.vocab_size,
            self.max_position_embeddings,
            self.type_vocab_size,
            self.hidden_dropout_prob,
            self.model_type.clone(),
            self.pad_token_id,
        )
        .with_max_seq_len(self.max_seq_len)
        .with_with_pooling_layer(self.with_pooling_layer)
    }

    /// Get the labeling head configuration
    pub fn get_head_config(&self) -> HeadConfig {
        HeadConfig::new(self.hidden_size, self.id2label.len()).with_options(self.options.clone())
    }

    /// Initialize the model
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<Model<B>, HeadError> {
        let head = self.get_head_config().init(device)?;

        Ok(Model {
            model: self.get_bert_config().init(device),
            head,
        })
    }
}

impl sequence_labeling::ModelConfig for Config {
    /// Load a pretrained model configuration
    fn load_pretrained(
        config_file: PathBuf,
        labels: &[String],
        training: &Training,
    ) -> anyhow::Result<Self> {
        let mut bert_config = BertModelConfig::load(config_file)
            .map_err(|e| anyhow!("Unable to load Hugging Face Config file: {}", e))?;

        // Word representations come from the hidden states, so the pooler is unused
        bert_config.with_pooling_layer = Some(false);
        bert_config.hidden_dropout_prob = training.hidden_dropout_prob;
        bert_config.max_seq_len = Some(
            training
                .max_seq_len
                .min(bert_config.max_seq_len.unwrap_or(bert_config.max_position_embeddings)),
        );

        let model_config = Config::new_with_labels(bert_config, labels, training.options.clone());

        if model_config.id2label.is_empty() {
            return Err(anyhow!("Labels are not defined in the model configuration"));
        }

        Ok(model_config)
    }

    fn get_config(&self) -> sequence_labeling::Config {
        sequence_labeling::Config {
            pad_token_id: self.pad_token_id,
            max_position_embeddings: self.max_position_embeddings,
            hidden_size: self.hidden_size,
            max_seq_len: self.max_seq_len,
            id2label: self.id2label.clone(),
            options: self.options.clone(),
        }
    }
}
