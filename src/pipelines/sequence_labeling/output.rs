use burn::{
    tensor::{backend::Backend, Int, Tensor},
    train::metric::{AccuracyInput, Adaptor, LossInput},
};
use derive_new::new;

/// Sequence labeling output adapted for multiple metrics.
#[derive(new)]
pub struct Output<B: Backend> {
    /// The loss.
    pub loss: Tensor<B, 1>,

    /// The label logits of the primary view: `[batch_size, max_words, num_labels]`
    pub output: Tensor<B, 3>,

    /// The word labels, negative where unknown or padded.
    pub targets: Tensor<B, 2, Int>,
}

impl<B: Backend> Output<B> {
    /// The number of labels, used as the accuracy metric's pad token
    pub fn num_labels(&self) -> usize {
        let [_, _, num_labels] = self.output.dims();

        num_labels
    }

    /// Flat targets where negative ids are moved to `num_labels`, which the metric skips as padding
    fn metric_targets(&self) -> Tensor<B, 1, Int> {
        let [batch_size, seq_length] = self.targets.dims();

        self.targets
            .clone()
            .mask_fill(self.targets.clone().lower_elem(0), self.num_labels() as i64)
            .reshape([batch_size * seq_length])
    }
}

impl<B: Backend> Adaptor<AccuracyInput<B>> for Output<B> {
    fn adapt(&self) -> AccuracyInput<B> {
        let [batch_size, seq_length, num_labels] = self.output.dims();

        AccuracyInput::new(
            self.output
                .clone()
                .reshape([batch_size * seq_length, num_labels]),
            self.metric_targets(),
        )
    }
}

impl<B: Backend> Adaptor<LossInput<B>> for Output<B> {
    fn adapt(&self) -> LossInput<B> {
        LossInput::new(self.loss.clone())
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use pretty_assertions::assert_eq;

    use super::*;

    type TestBackend = NdArray<f32>;

    #[test]
    fn negative_targets_become_the_pad_id() {
        let device = Default::default();

        let output = Output::<TestBackend>::new(
            Tensor::zeros([1], &device),
            Tensor::zeros([2, 2, 3], &device),
            Tensor::from_ints([[1, -1], [2, -100]], &device),
        );

        assert_eq!(output.num_labels(), 3);
        assert_eq!(
            output.metric_targets().into_data().convert::<i64>().value,
            vec![1, 3, 2, 3]
        );
    }
}
