/// Pipeline and experiment configuration
pub mod config;

/// Common model traits for sequence labeling
pub mod model;

/// Batcher
pub mod batcher;

/// Sequence Labeling Items
pub mod item;

/// Labeling head shared by every encoder
pub mod head;

/// Training output with metric adaptors
pub mod output;

/// Span-level evaluation
pub mod evaluation;

/// Sequence Labeling Training
pub mod training;

/// Sequence Labeling Inference
pub mod inference;

pub use batcher::Batcher;
pub use config::{Config, Options, Training};
pub use evaluation::{evaluate, EvaluationError, Scores};
pub use head::{Head, HeadConfig, HeadError, View};
pub use inference::infer;
pub use item::Item;
pub use model::{Model, ModelConfig, Tagger};
pub use output::Output;
pub use training::train;

/// Label id of padded positions, skipped by every loss and metric
pub const PAD_LABEL_ID: i64 = -100;

/// Label id of words whose label is unknown in partially annotated data
pub const PARTIAL_LABEL_ID: i64 = -1;

/// Label name marking a word as unannotated
pub const PARTIAL_LABEL: &str = "PARTIAL";
