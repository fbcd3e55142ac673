//! Command line tool to tag sentences with a trained model

use anyhow::{anyhow, Result};
use burn::backend::{Autodiff, LibTorch};
use burn_sequence_labeling::{
    cli::{device::parse_device, init_logging, models::Model},
    models::bert,
    pipelines::sequence_labeling::infer,
    utils::files::read_file,
};
use pico_args::Arguments;
use tokio::io::{self, AsyncBufReadExt};

const HELP: &str = "\
Usage: infer ARTIFACT_DIR [OPTIONS]

Arguments:
  ARTIFACT_DIR         The run directory of a trained model

Options:
  -h, --help           Print help
  -m, --model          The pretrained model used for training (defaults to 'bert-base-cased')
  -d, --device         Device to run on: cpu, cuda, cuda:N, or mps (defaults to cpu)
  -i, --input          A file with one whitespace-separated sentence per line (defaults to stdin)
";

#[derive(Debug)]
struct Args {
    /// Prints the usage menu
    help: bool,

    /// The run directory of a trained model
    artifact_dir: String,

    /// The model to use
    model: Option<String>,

    /// The device to use
    device: Option<String>,

    /// Input file
    input: Option<String>,
}

fn parse_args() -> Result<Args, pico_args::Error> {
    let mut pargs = Arguments::from_env();

    let help = pargs.contains(["-h", "--help"]);
    let model = pargs.opt_value_from_str(["-m", "--model"])?;
    let device = pargs.opt_value_from_str(["-d", "--device"])?;
    let input = pargs.opt_value_from_str(["-i", "--input"])?;

    let artifact_dir = if help {
        String::new()
    } else {
        pargs.free_from_str()?
    };

    Ok(Args {
        help,
        artifact_dir,
        model,
        device,
        input,
    })
}

async fn read_stdin() -> io::Result<Vec<String>> {
    let mut lines = io::BufReader::new(io::stdin()).lines();
    let mut result = Vec::new();

    while let Some(line) = lines.next_line().await? {
        result.push(line);
    }

    Ok(result)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let args = parse_args()?;

    if args.help {
        println!("{}", HELP);
        return Ok(());
    }

    let model = Model::try_from(args.model.as_deref().unwrap_or("bert-base-cased"))?;
    let device = parse_device(args.device.as_deref().unwrap_or("cpu"))?;

    let lines = match &args.input {
        Some(path) => read_file(path)
            .await
            .map_err(|e| anyhow!("Unable to read {}: {}", path, e))?,
        None => read_stdin().await?,
    };

    let samples: Vec<Vec<String>> = lines
        .iter()
        .map(|line| line.split_whitespace().map(str::to_string).collect())
        .collect();

    // Get model predictions
    let (labels, _config) = infer::<
        Autodiff<LibTorch>,
        bert::sequence_labeling::Model<Autodiff<LibTorch>>,
    >(device, &args.artifact_dir, &model.to_string(), samples.clone())?;

    // Print every word with its label, or "_" for words past the model's maximum length
    for (words, labels) in samples.iter().zip(labels) {
        let tagged: Vec<String> = words
            .iter()
            .enumerate()
            .map(|(i, word)| format!("{}/{}", word, labels.get(i).map_or("_", String::as_str)))
            .collect();

        println!("{}", tagged.join(" "));
    }

    Ok(())
}
