use std::collections::BTreeMap;

use burn::LearningRate;

use crate::modules::MultiViewLossType;

/// The common model configuration properties needed for the pipeline
#[derive(Debug, Clone)]
pub struct Config {
    /// The padding token ID
    pub pad_token_id: usize,

    /// The max position embeddings
    pub max_position_embeddings: usize,

    /// The size of the hidden state
    pub hidden_size: usize,

    /// An optional max sequence length, if different from max position embeddings
    pub max_seq_len: Option<usize>,

    /// A mapping from label ids to label names
    pub id2label: BTreeMap<usize, String>,

    /// Options for the labeling head
    pub options: Options,
}

/// Options for the labeling head, shared by every encoder
#[derive(burn::config::Config, Debug)]
pub struct Options {
    /// Probability of dropping a whole word embedding before the projection
    #[config(default = 0.0)]
    pub word_dropout: f64,

    /// Decode with a CRF instead of a per-token argmax
    #[config(default = true)]
    pub use_crf: bool,

    /// Train the CRF on partially annotated sequences
    #[config(default = false)]
    pub partial: bool,

    /// Add a consistency loss between the augmented and the origin view of each input
    #[config(default = false)]
    pub multiview: bool,

    /// The multi-view consistency loss
    #[config(default = "MultiViewLossType::Kl")]
    pub mv_loss_type: MultiViewLossType,

    /// Softmax temperature of the consistency loss
    #[config(default = 1.0)]
    pub temperature: f64,

    /// Weight of the supervised losses against the consistency loss
    #[config(default = 0.5)]
    pub mv_interpolation: f64,
}

/// Location of the dataset splits
#[derive(burn::config::Config, Debug)]
pub struct Data {
    /// Training split
    pub train: String,

    /// Validation split
    pub valid: String,

    /// Optional test split, evaluated after training
    pub test: Option<String>,
}

/// Define configuration struct for the experiment
#[derive(burn::config::Config, Debug)]
pub struct Training {
    /// Batch size
    #[config(default = 16)]
    pub batch_size: usize,

    /// Number of epochs
    #[config(default = 10)]
    pub num_epochs: usize,

    /// Adam epsilon
    #[config(default = 1e-8)]
    pub adam_epsilon: f32,

    /// Initial learning rate
    #[config(default = 5e-5)]
    pub learning_rate: LearningRate,

    /// Warmup steps for the learning rate scheduler
    #[config(default = 0)]
    pub warmup_steps: usize,

    /// Dropout rate
    #[config(default = 0.1)]
    pub hidden_dropout_prob: f64,

    /// Maximum sequence length in sub-word tokens
    #[config(default = 512)]
    pub max_seq_len: usize,

    /// Random seed for everything
    #[config(default = 42)]
    pub seed: u64,

    /// Number of data loader workers, defaulting to the available parallelism
    pub num_workers: Option<usize>,

    /// The location of the top-level output directory
    #[config(default = "\"experiments\".to_string()")]
    pub output_dir: String,

    /// Model name (e.g., "bert-base-cased")
    #[config(default = "\"bert-base-cased\".to_string()")]
    pub model_name: String,

    /// Dataset splits
    pub data: Data,

    /// Options for the labeling head
    #[config(default = "Options::new()")]
    pub options: Options,
}

impl Training {
    /// Parse an experiment from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Render the experiment as YAML
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
