//! Command line tool to train a sequence labeling model from an experiment file

use std::path::{Path, PathBuf};

use anyhow::anyhow;
use burn::backend::{Autodiff, LibTorch};
use burn_sequence_labeling::{
    cli::{device::parse_device, init_logging, models::Model},
    datasets::{self, label_vocabulary},
    models::bert,
    pipelines::sequence_labeling::{self, training::Run, Training},
    utils::files::prepare_output_dir,
};
use pico_args::Arguments;

const HELP: &str = "\
Usage: train CONFIG_PATH [OPTIONS]

Arguments:
  CONFIG_PATH               The experiment file (YAML)

Options:
  -h, --help                Print help
  -n, --run-name            Name of the run directory (defaults to the config file name)
  -d, --device              Device to train on: cpu, cuda, cuda:N, or mps (defaults to cpu)
  -f, --force               Replace the run directory if it already exists
  -c, --checkpoint-path     A model record to start training from
  --seed                    Override the random seed of the experiment
  --no-tui                  Disable TUI
";

#[derive(Debug)]
struct Args {
    config_path: PathBuf,
    run_name: Option<String>,
    device: String,
    force: bool,
    checkpoint_path: Option<String>,
    seed: Option<u64>,
    use_tui: bool,
}

impl Args {
    fn parse() -> anyhow::Result<Option<Self>> {
        let mut pargs = Arguments::from_env();

        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            return Ok(None);
        }

        let args = Args {
            run_name: pargs.opt_value_from_str(["-n", "--run-name"])?,
            device: pargs
                .opt_value_from_str(["-d", "--device"])?
                .unwrap_or_else(|| "cpu".to_string()),
            force: pargs.contains(["-f", "--force"]),
            checkpoint_path: pargs.opt_value_from_str(["-c", "--checkpoint-path"])?,
            seed: pargs.opt_value_from_str("--seed")?,
            use_tui: !(pargs.contains("--no-tui")),
            config_path: pargs.free_from_str().map_err(|e| match e {
                pico_args::Error::MissingArgument => {
                    anyhow!("Missing required argument: CONFIG_PATH")
                }
                _ => anyhow!("{}", e),
            })?,
        };

        Ok(Some(args))
    }
}

/// The run name defaults to the experiment file name without its extension
fn run_name(args: &Args) -> anyhow::Result<String> {
    if let Some(name) = &args.run_name {
        return Ok(name.clone());
    }

    args.config_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Unable to derive a run name from {:?}", args.config_path))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let Some(args) = Args::parse()? else {
        print!("{}", HELP);

        return Ok(());
    };

    let yaml = tokio::fs::read_to_string(&args.config_path)
        .await
        .map_err(|e| anyhow!("Unable to read {:?}: {}", args.config_path, e))?;

    let mut config = Training::from_yaml(&yaml)?;

    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    // Only BERT-architecture encoders are supported
    let model = Model::try_from(config.model_name.as_str())?;
    log::info!("Using the {} encoder {}", model.model_type(), model);

    let device = parse_device(&args.device)?;

    let train = datasets::Dataset::load(&config.data.train).await?;
    let valid = datasets::Dataset::load(&config.data.valid).await?;
    let test = match &config.data.test {
        Some(path) => Some(datasets::Dataset::load(path).await?),
        None => None,
    };

    let labels = label_vocabulary([&train, &valid].into_iter().chain(test.as_ref()));
    log::info!("Labels: {}", labels.join(", "));

    let artifact_dir = Path::new(&config.output_dir).join(run_name(&args)?);
    prepare_output_dir(&artifact_dir, args.force).await?;

    let artifact_dir = artifact_dir
        .to_str()
        .ok_or_else(|| anyhow!("Output directory {:?} is not valid UTF-8", artifact_dir))?
        .to_string();

    let run = Run::new(artifact_dir, args.checkpoint_path.clone(), args.use_tui);

    let scores = sequence_labeling::train::<
        Autodiff<LibTorch>,
        bert::sequence_labeling::Model<Autodiff<LibTorch>>,
        datasets::Item,
        datasets::Dataset,
    >(vec![device], train, valid, test, labels, config, run)
    .await?;

    if let Some(scores) = scores {
        print!("{}", scores);
    }

    Ok(())
}
