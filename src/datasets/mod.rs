use std::{collections::BTreeSet, fmt::Display, path::Path};

use burn::data::dataset::{self, InMemDataset};
use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::{
    pipelines::sequence_labeling::{self, PARTIAL_LABEL},
    utils::files::read_file,
};

/// CoNLL column files
pub mod conll;

/// JSON-lines files
pub mod json_lines;

/// A sentence with one label per word
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, new)]
pub struct Item {
    /// The words of the sentence
    pub words: Vec<String>,

    /// The label of every word
    pub labels: Vec<String>,

    /// Extra words that condition the encoder without being labeled
    #[serde(default)]
    pub context: Vec<String>,
}

impl sequence_labeling::Item for Item {
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

/// Supported file formats
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Format {
    /// Whitespace-separated columns, the last one holding the label
    Conll,

    /// One `{"words", "labels", "context"}` object per line
    JsonLines,
}

impl Format {
    /// Pick the format from a file extension, defaulting to CoNLL
    pub fn from_path(path: &str) -> Self {
        match Path::new(path).extension().and_then(|e| e.to_str()) {
            Some("jsonl" | "json") => Format::JsonLines,
            _ => Format::Conll,
        }
    }

    /// Parse the lines of a file in this format
    pub fn parse<S: AsRef<str>>(&self, lines: &[S]) -> Result<Vec<Item>, DatasetError> {
        match self {
            Format::Conll => conll::parse(lines),
            Format::JsonLines => json_lines::parse(lines),
        }
    }
}

impl TryFrom<&str> for Format {
    type Error = DatasetError;

    /// Try to convert a format name to a Format
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "conll" => Ok(Format::Conll),
            "jsonl" | "json_lines" => Ok(Format::JsonLines),
            _ => Err(DatasetError::UnknownFormat(value.to_string())),
        }
    }
}

impl Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Format::Conll => "conll",
            Format::JsonLines => "jsonl",
        };

        write!(f, "{}", name)
    }
}

/// A labeled dataset held in memory
pub struct Dataset {
    /// Underlying In-Memory dataset
    dataset: InMemDataset<Item>,
}

/// Implement the Dataset trait for labeled sentences
impl dataset::Dataset<Item> for Dataset {
    /// Returns a specific item from the dataset
    fn get(&self, index: usize) -> Option<Item> {
        self.dataset.get(index)
    }

    /// Returns the length of the dataset
    fn len(&self) -> usize {
        self.dataset.len()
    }
}

impl Dataset {
    /// Wrap parsed items
    pub fn from_items(items: Vec<Item>) -> Self {
        Self {
            dataset: InMemDataset::new(items),
        }
    }

    /// Read a dataset file, choosing the format from its extension
    pub async fn load(path: &str) -> Result<Self, DatasetError> {
        let format = Format::from_path(path);

        let lines = read_file(path)
            .await
            .map_err(|source| DatasetError::Io {
                path: path.to_string(),
                source,
            })?;

        let items = format.parse(&lines)?;

        log::info!("Loaded {} sentences from {} ({})", items.len(), path, format);

        Ok(Self::from_items(items))
    }

    /// All labels used in the dataset
    pub fn labels(&self) -> BTreeSet<String> {
        dataset::Dataset::iter(self)
            .flat_map(|item| item.labels)
            .collect()
    }
}

/// Build the label vocabulary of several datasets
///
/// `O` comes first when present so that it gets id 0, followed by the other labels in sorted
/// order. The partial annotation marker is not a label.
pub fn label_vocabulary<'a>(datasets: impl IntoIterator<Item = &'a Dataset>) -> Vec<String> {
    let labels: BTreeSet<String> = datasets
        .into_iter()
        .flat_map(|dataset| dataset.labels())
        .filter(|label| label != PARTIAL_LABEL)
        .collect();

    let outside = labels.contains("O").then(|| "O".to_string());

    outside
        .into_iter()
        .chain(labels.into_iter().filter(|label| label != "O"))
        .collect()
}

/// Dataset Error
#[derive(thiserror::Error, Debug)]
pub enum DatasetError {
    /// The file could not be read
    #[error("unable to read {path}: {source}")]
    Io {
        /// The file path
        path: String,

        /// The underlying error
        source: std::io::Error,
    },

    /// A line is not valid JSON
    #[error("line {line}: {source}")]
    Json {
        /// 1-based line number
        line: usize,

        /// The underlying error
        source: serde_json::Error,
    },

    /// A line does not hold a valid example
    #[error("line {line}: {message}")]
    Malformed {
        /// 1-based line number
        line: usize,

        /// What is wrong with the line
        message: String,
    },

    /// No format found for the given string
    #[error("no dataset format found for {0}")]
    UnknownFormat(String),
}

#[cfg(test)]
mod tests {
    use burn::data::dataset::Dataset as _;
    use pretty_assertions::assert_eq;

    use super::*;

    fn item(labels: &[&str]) -> Item {
        Item::new(
            labels.iter().map(|_| "w".to_string()).collect(),
            labels.iter().map(|l| l.to_string()).collect(),
            Vec::new(),
        )
    }

    #[test]
    fn picks_the_format_from_the_extension() {
        assert_eq!(Format::from_path("data/train.jsonl"), Format::JsonLines);
        assert_eq!(Format::from_path("data/train.json"), Format::JsonLines);
        assert_eq!(Format::from_path("data/train.txt"), Format::Conll);
        assert_eq!(Format::from_path("data/train"), Format::Conll);
        assert_eq!(Format::try_from("JSONL").unwrap(), Format::JsonLines);
        assert!(Format::try_from("csv").is_err());
    }

    #[test]
    fn builds_the_label_vocabulary() {
        let train = Dataset::from_items(vec![
            item(&["B-PER", "O", "PARTIAL"]),
            item(&["B-LOC", "I-LOC"]),
        ]);
        let valid = Dataset::from_items(vec![item(&["O", "B-MISC"])]);

        assert_eq!(train.len(), 2);
        assert_eq!(
            label_vocabulary([&train, &valid]),
            vec!["O", "B-LOC", "B-MISC", "B-PER", "I-LOC"]
        );
    }

    #[test]
    fn vocabulary_without_an_outside_label() {
        let train = Dataset::from_items(vec![item(&["PER", "LOC"])]);

        assert_eq!(label_vocabulary([&train]), vec!["LOC", "PER"]);
    }
}
