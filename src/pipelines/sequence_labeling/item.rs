use std::fmt::Debug;

/// A trait for items that can be used for sequence labeling
pub trait Item: Send + Sync + Clone + Debug {
    /// Returns the pre-split words of the item
    fn words(&self) -> &[String];

    /// Returns one label name per word
    fn labels(&self) -> &[String];

    /// Returns extra words that condition the encoder without being labeled
    ///
    /// When present, the model sees the words followed by this context (the augmented view),
    /// and multi-view training compares it with the words alone (the origin view).
    fn context(&self) -> &[String] {
        &[]
    }
}
