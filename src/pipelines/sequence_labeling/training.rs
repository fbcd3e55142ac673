use burn::{
    config::Config as _,
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    lr_scheduler::noam::NoamLrSchedulerConfig,
    module::{AutodiffModule, Module},
    optim::AdamWConfig,
    record::{CompactRecorder, Recorder},
    tensor::backend::AutodiffBackend,
    train::{
        metric::{AccuracyMetric, CudaMetric, LearningRateMetric, LossMetric},
        LearnerBuilder, ValidStep,
    },
};
use derive_new::new;
use tokenizers::Tokenizer;

use crate::utils::{hugging_face::download_hf_model, renderer::LogRenderer};

use super::{
    batcher::Train, evaluate, Batcher, Item, Model, ModelConfig, Output, Scores, Tagger, Training,
};

/// Where and how to run an experiment
#[derive(Debug, Clone, new)]
pub struct Run {
    /// Directory to save the checkpoints, model, and config files
    pub artifact_dir: String,

    /// An optional model record to start from instead of the fresh labeling head
    pub checkpoint: Option<String>,

    /// Render metrics in the terminal UI instead of the log
    pub use_tui: bool,
}

/// Define train function
///
/// Returns the test scores when a test split is given.
pub async fn train<B, M, I, D>(
    devices: Vec<B::Device>,  // Devices on which to perform computation (e.g., CPU or CUDA device)
    dataset_train: D,         // Training dataset
    dataset_valid: D,         // Validation dataset
    dataset_test: Option<D>,  // Test dataset, evaluated once training is done
    labels: Vec<String>,      // Label vocabulary, in label id order
    config: Training,         // Experiment configuration
    run: Run,                 // Output locations
) -> anyhow::Result<Option<Scores>>
where
    B: AutodiffBackend,
    M: Model<B> + 'static,
    I: Item + 'static,
    D: Dataset<I> + 'static,
    M::InnerModule: ValidStep<Train<B::InnerBackend>, Output<B::InnerBackend>>
        + Tagger<B::InnerBackend>,
{
    let device = devices
        .first()
        .ok_or_else(|| anyhow!("No device was given for training"))?
        .clone();

    B::seed(config.seed);

    let (config_file, model_file) = download_hf_model(&config.model_name).await?;

    let model_config = M::Config::load_pretrained(config_file, &labels, &config)
        .map_err(|e| anyhow!("Unable to load pre-trained model config file: {}", e))?;

    let pipeline_config = model_config.get_config();
    let num_labels = pipeline_config.id2label.len();

    if num_labels == 0 {
        return Err(anyhow!("Labels are not defined in the model configuration"));
    }

    let mut model = M::load_from_safetensors(&device, model_file, model_config.clone())?;

    if let Some(checkpoint) = &run.checkpoint {
        log::info!("Loading model record from {checkpoint}");

        let record = CompactRecorder::new()
            .load(checkpoint.into(), &device)
            .map_err(|e| anyhow!("Unable to load checkpoint {}: {}", checkpoint, e))?;

        model = model.load_record(record);
    }

    log::info!("{model}");

    // Initialize tokenizer
    let tokenizer = Tokenizer::from_pretrained(&config.model_name, None)
        .map_err(|e| anyhow!("Unable to load tokenizer for {}: {}", config.model_name, e))?;

    // Initialize batchers for training and validation data. Validation only scores the
    // primary view.
    let batcher_train =
        Batcher::<B>::new(tokenizer.clone(), pipeline_config.clone(), device.clone());
    let mut batcher_valid =
        Batcher::<B::InnerBackend>::new(tokenizer, pipeline_config, device.clone());
    batcher_valid.multiview = false;

    let num_workers = match config.num_workers {
        Some(workers) => workers,
        None => std::thread::available_parallelism()?.into(),
    };

    // Initialize data loaders for training and validation data
    let dataloader_train = DataLoaderBuilder::new(batcher_train)
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(num_workers)
        .build(dataset_train);

    let dataloader_valid = DataLoaderBuilder::new(batcher_valid.clone())
        .batch_size(config.batch_size * 2)
        .num_workers(num_workers)
        .build(dataset_valid);

    // Initialize optimizer
    let optimizer = AdamWConfig::new().with_epsilon(config.adam_epsilon).init();

    // Initialize learning rate scheduler
    let lr_scheduler = NoamLrSchedulerConfig::new(config.learning_rate)
        .with_warmup_steps(config.warmup_steps)
        .with_model_size(model_config.get_config().hidden_size)
        .init();

    // Initialize learner
    let mut builder = LearnerBuilder::new(&run.artifact_dir)
        .metric_train(CudaMetric::new())
        .metric_valid(CudaMetric::new())
        .metric_train_numeric(AccuracyMetric::new().with_pad_token(num_labels))
        .metric_valid_numeric(AccuracyMetric::new().with_pad_token(num_labels))
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .metric_train_numeric(LearningRateMetric::new())
        .with_file_checkpointer(CompactRecorder::new())
        .devices(devices)
        .num_epochs(config.num_epochs)
        .summary();

    if !run.use_tui {
        builder = builder.renderer(LogRenderer::new());
    }

    let learner = builder.build(model, optimizer, lr_scheduler);

    // Train the model
    let model_trained = learner.fit(dataloader_train, dataloader_valid);

    // Save the configurations and the trained model
    model_config
        .save(format!("{}/config.json", run.artifact_dir))
        .map_err(|e| anyhow!("Unable to save model config: {}", e))?;

    tokio::fs::write(
        format!("{}/experiment.yaml", run.artifact_dir),
        config.to_yaml()?,
    )
    .await?;

    CompactRecorder::new()
        .record(
            model_trained.clone().into_record(),
            format!("{}/model", run.artifact_dir).into(),
        )
        .map_err(|e| anyhow!("Unable to save trained model weights: {}", e))?;

    log::info!("Saved the trained model to {}", run.artifact_dir);

    let Some(dataset_test) = dataset_test else {
        return Ok(None);
    };

    let scores = evaluate(
        &model_trained.valid(),
        &batcher_valid,
        &dataset_test,
        config.batch_size * 2,
    )?;

    log::info!("Test scores:\n{scores}");

    tokio::fs::write(
        format!("{}/test_scores.txt", run.artifact_dir),
        scores.to_string(),
    )
    .await?;

    Ok(Some(scores))
}
