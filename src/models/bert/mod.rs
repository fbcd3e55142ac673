/// BERT for Sequence Labeling (such as named entity recognition)
pub mod sequence_labeling;
