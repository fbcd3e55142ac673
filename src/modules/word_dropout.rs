use burn::{
    config::Config,
    module::Module,
    tensor::{backend::Backend, Distribution, Tensor},
};

/// Configuration to create a [word dropout](WordDropout) layer
#[derive(Config, Debug)]
pub struct WordDropoutConfig {
    /// The probability of dropping an entire token embedding
    pub prob: f64,
}

/// Zeroes whole token embeddings instead of individual features
///
/// Applied only while training (on an autodiff backend). Kept embeddings are not rescaled.
#[derive(Module, Clone, Debug)]
pub struct WordDropout {
    prob: f64,
}

impl WordDropoutConfig {
    /// Initialize a new [word dropout](WordDropout) module
    pub fn init(&self) -> WordDropout {
        WordDropout { prob: self.prob }
    }
}

impl WordDropout {
    /// Applies the forward pass on the input tensor
    ///
    /// # Shapes
    ///
    /// - input: `[batch_size, seq_length, d_model]`
    /// - output: `[batch_size, seq_length, d_model]`
    pub fn forward<B: Backend>(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        if !B::ad_enabled() || self.prob == 0.0 {
            return input;
        }

        let [batch_size, seq_length, _] = input.dims();

        let keep = Tensor::<B, 3>::random(
            [batch_size, seq_length, 1],
            Distribution::Bernoulli(1.0 - self.prob),
            &input.device(),
        );

        input.mul(keep)
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::{Autodiff, NdArray};
    use pretty_assertions::assert_eq;

    use super::*;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<TestBackend>;

    #[test]
    fn is_identity_during_inference() {
        let device = Default::default();
        let dropout = WordDropoutConfig::new(0.9).init();

        let input = Tensor::<TestBackend, 3>::ones([2, 5, 4], &device);

        let output = dropout.forward(input.clone());

        assert_eq!(output.into_data(), input.into_data());
    }

    #[test]
    fn drops_whole_tokens_while_training() {
        let device = Default::default();
        let dropout = WordDropoutConfig::new(0.5).init();

        let input = Tensor::<TestAutodiffBackend, 3>::ones([4, 16, 8], &device);

        let output = dropout.forward(input).into_data().value;

        let mut dropped = 0;
        for token in output.chunks(8) {
            let first = token[0];

            // Every feature of a token shares the same fate
            assert!(token.iter().all(|value| *value == first));
            assert!(first == 0.0 || first == 1.0);

            if first == 0.0 {
                dropped += 1;
            }
        }

        assert!(dropped > 0 && dropped < 64);
    }

    #[test]
    fn zero_probability_keeps_everything() {
        let device = Default::default();
        let dropout = WordDropoutConfig::new(0.0).init();

        let input = Tensor::<TestAutodiffBackend, 3>::ones([2, 3, 4], &device);

        let output = dropout.forward(input).into_data().value;

        assert!(output.into_iter().all(|value| value == 1.0));
    }
}
