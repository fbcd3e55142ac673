/// BERT for Sequence Labeling Configuration
pub mod config;

/// BERT for Sequence Labeling
pub mod model;

/// Training routine
pub mod train;

pub use config::Config;
pub use model::{Model, ModelRecord};
