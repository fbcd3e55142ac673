use burn::{
    config::Config as _,
    data::dataloader::batcher::Batcher as BatcherTrait,
    module::{AutodiffModule, Module},
    record::{CompactRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use tokenizers::Tokenizer;

use super::{batcher::Infer, Batcher, Model, ModelConfig, Tagger};

/// Define inference function
///
/// Returns one label per word for every sample. Samples longer than the model's maximum
/// sequence length get labels for the words that fit, and empty samples get no labels.
pub fn infer<B: AutodiffBackend, M: Model<B> + 'static>(
    device: B::Device,          // Device on which to perform computation (e.g., CPU or CUDA device)
    artifact_dir: &str,         // The directory a trained model was saved to
    model_name: &str,           // The name of the model (e.g., "bert-base-cased")
    samples: Vec<Vec<String>>,  // Pre-split sentences for inference
) -> anyhow::Result<(Vec<Vec<String>>, M::Config)>
where
    M::InnerModule: Tagger<B::InnerBackend>,
{
    // Load experiment configuration
    let model_config = M::Config::load(format!("{artifact_dir}/config.json").as_str())
        .map_err(|e| anyhow!("Unable to load config file: {}", e))?;

    // Initialize tokenizer
    let tokenizer = Tokenizer::from_pretrained(model_name, None)
        .map_err(|e| anyhow!("Unable to load tokenizer for {}: {}", model_name, e))?;

    // Initialize batcher for batching samples
    let batcher =
        Batcher::<B::InnerBackend>::new(tokenizer, model_config.get_config(), device.clone());

    // Load trained model weights
    let record = CompactRecorder::new()
        .load(format!("{artifact_dir}/model").into(), &device)
        .map_err(|e| anyhow!("Unable to load trained model weights: {}", e))?;

    // Create model using loaded weights, without dropout
    let model = M::from_config(&model_config, &device)?
        .load_record(record)
        .valid();

    let mut labels = vec![Vec::new(); samples.len()];

    let (positions, samples): (Vec<_>, Vec<_>) = samples
        .into_iter()
        .enumerate()
        .filter(|(_, words)| !words.is_empty())
        .unzip();

    if samples.is_empty() {
        return Ok((labels, model_config));
    }

    let batch: Infer<B::InnerBackend> = batcher.batch(samples);

    let predictions = model.tag(batch)?;

    for (position, predicted) in positions.into_iter().zip(predictions) {
        labels[position] = predicted
            .into_iter()
            .map(|id| {
                batcher
                    .id2label
                    .get(&id)
                    .cloned()
                    .unwrap_or_else(|| id.to_string())
            })
            .collect();
    }

    // Return the labels, and the config for reference
    Ok((labels, model_config))
}
