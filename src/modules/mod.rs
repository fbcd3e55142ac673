/// Conditional Random Fields
pub mod crf;

/// Word dropout
pub mod word_dropout;

/// Multi-view consistency training
pub mod multiview;

pub use crf::{Crf, CrfConfig, CrfError, Reduction};
pub use multiview::{MultiViewError, MultiViewLoss, MultiViewLossConfig, MultiViewLossType};
pub use word_dropout::{WordDropout, WordDropoutConfig};
