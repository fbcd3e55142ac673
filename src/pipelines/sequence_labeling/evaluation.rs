//! Span-level evaluation of predicted label sequences.
//!
//! Chunks are read from BIO, BIOES or BILOU tags in lenient mode, as conlleval does. Tags are
//! normalized first: `L-` and `U-` become `E-` and `S-`, and tags without a prefix other than `O`
//! are read as `I-` tags. Gold positions labeled `PARTIAL` are not scored.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
};

use burn::{
    data::{dataloader::batcher::Batcher as _, dataset::Dataset},
    tensor::backend::Backend,
};
use rusev::{
    classification_report, Average, ClassMetrics, ComputationError, DivByZeroStrat, SchemeType,
};

use super::{batcher::Train, Batcher, HeadError, Item, Tagger, PARTIAL_LABEL};

/// Evaluation Errors
#[derive(thiserror::Error, Debug)]
pub enum EvaluationError {
    /// The model failed to tag a batch
    #[error(transparent)]
    Head(#[from] HeadError),

    /// The span scores could not be computed
    #[error("unable to score spans: {0}")]
    Scores(#[from] ComputationError<String>),
}

/// Rewrite a tag with one of the `B`, `I`, `E`, `S` prefixes
fn normalize_tag(tag: &str) -> String {
    if tag == "O" {
        return tag.to_string();
    }

    match tag.split_once(['-', '_']) {
        Some((prefix, kind)) if !kind.is_empty() => match prefix {
            "B" | "I" | "E" | "S" => format!("{prefix}-{kind}"),
            "L" => format!("E-{kind}"),
            "U" => format!("S-{kind}"),
            _ => format!("I-{tag}"),
        },
        _ => format!("I-{tag}"),
    }
}

/// Precision, recall and F1 of one chunk type or of all of them
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Score {
    /// Correct chunks over predicted chunks
    pub precision: f64,

    /// Correct chunks over gold chunks
    pub recall: f64,

    /// Harmonic mean of precision and recall
    pub f1: f64,

    /// Number of gold chunks
    pub support: usize,
}

impl From<&ClassMetrics> for Score {
    fn from(metrics: &ClassMetrics) -> Self {
        Score {
            precision: metrics.precision as f64,
            recall: metrics.recall as f64,
            f1: metrics.fscore as f64,
            support: metrics.support,
        }
    }
}

/// Results of an evaluation run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scores {
    /// Micro-averaged chunk scores
    pub micro: Score,

    /// Scores for every chunk type seen in the gold or predicted tags
    pub per_type: BTreeMap<String, Score>,

    /// Fraction of words whose predicted tag matches the gold tag
    pub accuracy: f64,
}

impl fmt::Display for Scores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "accuracy: {:.4}, precision: {:.4}, recall: {:.4}, f1: {:.4}",
            self.accuracy, self.micro.precision, self.micro.recall, self.micro.f1
        )?;

        for (label, score) in &self.per_type {
            writeln!(
                f,
                "{label:>12}: precision: {:.4}, recall: {:.4}, f1: {:.4}, support: {}",
                score.precision, score.recall, score.f1, score.support
            )?;
        }

        Ok(())
    }
}

/// Accumulates gold and predicted tag sequences over many sentences
#[derive(Debug, Clone, Default)]
pub struct SpanCounter {
    gold: Vec<Vec<String>>,
    predicted: Vec<Vec<String>>,
    correct_tokens: usize,
    total_tokens: usize,
}

impl SpanCounter {
    /// Add one sentence. Extra predicted or gold tags beyond the shorter sequence are ignored.
    pub fn update<G: AsRef<str>, P: AsRef<str>>(&mut self, gold: &[G], predicted: &[P]) {
        let (gold, predicted): (Vec<_>, Vec<_>) = gold
            .iter()
            .zip(predicted)
            .filter(|(g, _)| g.as_ref() != PARTIAL_LABEL)
            .map(|(g, p)| (normalize_tag(g.as_ref()), normalize_tag(p.as_ref())))
            .unzip();

        if gold.is_empty() {
            return;
        }

        self.total_tokens += gold.len();
        self.correct_tokens += gold.iter().zip(&predicted).filter(|(g, p)| g == p).count();

        self.gold.push(gold);
        self.predicted.push(predicted);
    }

    /// Compute the scores of everything seen so far
    pub fn scores(&self) -> Result<Scores, ComputationError<String>> {
        let accuracy = if self.total_tokens == 0 {
            0.0
        } else {
            self.correct_tokens as f64 / self.total_tokens as f64
        };

        let has_chunks = self
            .gold
            .iter()
            .chain(&self.predicted)
            .flatten()
            .any(|tag| tag != "O");

        if !has_chunks {
            return Ok(Scores {
                accuracy,
                ..Scores::default()
            });
        }

        fn as_strs(sequences: &[Vec<String>]) -> Vec<Vec<&str>> {
            sequences
                .iter()
                .map(|tags| tags.iter().map(String::as_str).collect())
                .collect()
        }

        let report = classification_report(
            as_strs(&self.gold),
            as_strs(&self.predicted),
            None,
            DivByZeroStrat::ReplaceBy0,
            SchemeType::IOB2,
            false,
            false,
            false,
        )?;

        let mut scores = Scores {
            accuracy,
            ..Scores::default()
        };

        for metrics in HashSet::<ClassMetrics>::from(report).iter() {
            match metrics.average {
                Average::None => {
                    scores.per_type.insert(metrics.class.clone(), metrics.into());
                }
                Average::Micro => scores.micro = metrics.into(),
                _ => {}
            }
        }

        Ok(scores)
    }
}

/// Tag every item of a dataset and score the result against its labels
///
/// Items are batched with their context, as during training. Words lost to truncation are not
/// scored.
pub fn evaluate<B, M, I, D>(
    model: &M,
    batcher: &Batcher<B>,
    dataset: &D,
    batch_size: usize,
) -> Result<Scores, EvaluationError>
where
    B: Backend,
    M: Tagger<B>,
    I: Item,
    D: Dataset<I>,
{
    let mut counter = SpanCounter::default();
    let batch_size = batch_size.max(1);

    let mut start = 0;
    while start < dataset.len() {
        let end = (start + batch_size).min(dataset.len());
        let items: Vec<I> = (start..end).filter_map(|i| dataset.get(i)).collect();
        start = end;

        let items: Vec<I> = items.into_iter().filter(|item| !item.words().is_empty()).collect();
        if items.is_empty() {
            continue;
        }

        let batch: Train<B> = batcher.batch(items.clone());
        let predictions = model.tag(batch.input)?;

        for (item, predicted) in items.iter().zip(predictions) {
            let predicted: Vec<&str> = predicted
                .into_iter()
                .map(|id| batcher.id2label.get(&id).map_or("O", String::as_str))
                .collect();

            counter.update(item.labels(), &predicted);
        }

        log::debug!("Evaluated {} of {} items", end, dataset.len());
    }

    Ok(counter.scores()?)
}
