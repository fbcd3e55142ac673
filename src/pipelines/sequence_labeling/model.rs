use std::{fmt::Display, path::PathBuf};

use burn::{
    module::AutodiffModule,
    tensor::backend::{AutodiffBackend, Backend},
    train::TrainStep,
};

use crate::pipelines::sequence_labeling;

use super::{
    batcher::{Infer, Train},
    config::Training,
    HeadError, Output,
};

/// A trait for models that can be used for Sequence Labeling
pub trait Model<B: AutodiffBackend>:
    AutodiffModule<B> + TrainStep<Train<B>, Output<B>> + Display
{
    /// The model configuration
    type Config: ModelConfig;

    /// Initialize a model with random weights
    fn from_config(config: &Self::Config, device: &B::Device) -> Result<Self, HeadError>;

    /// Load a pretrained encoder from a file, with a freshly initialized labeling head
    fn load_from_safetensors(
        device: &B::Device,
        model_file: PathBuf,
        config: Self::Config,
    ) -> anyhow::Result<Self>;
}

/// A trait for models that can predict label ids for a batch of words
pub trait Tagger<B: Backend> {
    /// Decode one label id per word, trimmed to each row's word count
    fn tag(&self, input: Infer<B>) -> Result<Vec<Vec<usize>>, HeadError>;
}

/// A trait for configs that can be used for Sequence Labeling models
pub trait ModelConfig: burn::config::Config + Clone {
    /// Load a pretrained model configuration, adding the label set and head options
    fn load_pretrained(
        config_file: PathBuf,
        labels: &[String],
        training: &Training,
    ) -> anyhow::Result<Self>;

    /// Return the Config needed for the sequence labeling pipeline
    fn get_config(&self) -> sequence_labeling::Config;
}
