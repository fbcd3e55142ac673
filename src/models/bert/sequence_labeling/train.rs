use burn::{
    tensor::backend::{AutodiffBackend, Backend},
    train::{TrainOutput, TrainStep, ValidStep},
};

use crate::pipelines::sequence_labeling::{batcher, Output};

use super::Model;

/// Define training step
impl<B: AutodiffBackend> TrainStep<batcher::Train<B>, Output<B>> for Model<B> {
    fn step(&self, item: batcher::Train<B>) -> TrainOutput<Output<B>> {
        // Run forward pass, calculate gradients and return them along with the output
        let output = self
            .forward(item)
            .expect("batches built by the batcher are valid head inputs");
        let grads = output.loss.backward();

        TrainOutput::new(self, grads, output)
    }
}

/// Define validation step
impl<B: Backend> ValidStep<batcher::Train<B>, Output<B>> for Model<B> {
    fn step(&self, item: batcher::Train<B>) -> Output<B> {
        // Run forward pass and return the output
        self.forward_primary(item)
            .expect("batches built by the batcher are valid head inputs")
    }
}
