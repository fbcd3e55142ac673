use std::path::PathBuf;

use bert_burn::{
    data::BertInferenceBatch,
    model::{BertModel, BertModelOutput},
};
use burn::{
    module::Module,
    tensor::{
        backend::{AutodiffBackend, Backend},
        Tensor,
    },
};
use derive_new::new;

use crate::{
    models::bert::sequence_labeling::Config,
    pipelines::sequence_labeling::{
        self,
        batcher::{Infer, Train},
        Head, HeadError, Output, View,
    },
    utils::tensors::select_positions,
};

/// BERT for Sequence Labeling
#[derive(Module, Debug, new)]
pub struct Model<B: Backend> {
    /// The base BERT model
    pub model: BertModel<B>,

    /// Word dropout, projection, and decoder
    pub head: Head<B>,
}

/// Define model behavior
impl<B: Backend> Model<B> {
    /// Encode a batch and keep the hidden state of the first sub-word of every word
    ///
    /// Output shape: `[batch_size, max_words, hidden_size]`
    pub fn embed(&self, input: Infer<B>) -> Tensor<B, 3> {
        let BertModelOutput { hidden_states, .. } = self.model.forward(BertInferenceBatch {
            tokens: input.tokens,
            mask_pad: input.mask_pad,
        });

        select_positions(hidden_states, input.word_index)
    }

    /// Label logits of one view of a batch
    pub fn view(&self, input: Infer<B>) -> View<B> {
        let mask = input.word_mask.clone();

        View {
            logits: self.head.logits(self.embed(input)),
            mask,
        }
    }

    /// Defines forward pass for training, including the origin view when the batch carries it
    pub fn forward(&self, item: Train<B>) -> Result<Output<B>, HeadError> {
        let view = self.view(item.input);
        let output = view.logits.clone();

        let origin = match (&self.head.multiview, item.origin) {
            (Some(_), Some(origin)) => Some(self.view(origin)),
            _ => None,
        };

        let loss = self
            .head
            .training_loss(view, item.targets.clone(), origin)?;

        Ok(Output::new(loss, output, item.targets))
    }

    /// Defines forward pass for validation, scoring the primary view only
    pub fn forward_primary(&self, item: Train<B>) -> Result<Output<B>, HeadError> {
        let View { logits, mask } = self.view(item.input);

        let loss = self
            .head
            .loss(logits.clone(), item.targets.clone(), mask)?;

        Ok(Output::new(loss, logits, item.targets))
    }

    /// Defines forward pass for inference
    pub fn tag(&self, input: Infer<B>) -> Result<Vec<Vec<usize>>, HeadError> {
        let View { logits, mask } = self.view(input);

        self.head.decode(logits, mask)
    }
}

impl<B: Backend> sequence_labeling::Tagger<B> for Model<B> {
    fn tag(&self, input: Infer<B>) -> Result<Vec<Vec<usize>>, HeadError> {
        self.tag(input)
    }
}

impl<B: AutodiffBackend> sequence_labeling::Model<B> for Model<B> {
    /// The model configuration
    type Config = Config;

    fn from_config(config: &Self::Config, device: &B::Device) -> Result<Self, HeadError> {
        config.init(device)
    }

    /// Load a model from a file
    fn load_from_safetensors(
        device: &B::Device,
        model_file: PathBuf,
        config: Self::Config,
    ) -> anyhow::Result<Self> {
        let model = config.init(device)?;

        let record = BertModel::from_safetensors(model_file, device, config.get_bert_config());

        Ok(Model {
            model: model.model.load_record(record),
            head: model.head,
        })
    }
}

#[cfg(test)]
mod tests {
    use bert_burn::model::BertModelConfig;
    use burn::{
        backend::{Autodiff, NdArray},
        tensor::{Int, Tensor},
    };
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        pipelines::sequence_labeling::{Options, PAD_LABEL_ID},
        utils::tensors::lengths_to_mask,
    };

    type TestBackend = NdArray<f32>;
    type AutodiffTestBackend = Autodiff<TestBackend>;

    fn config(options: Options) -> Config {
        let labels: Vec<String> = ["O", "B-PER", "I-PER"].iter().map(|s| s.to_string()).collect();

        Config::new_with_labels(
            BertModelConfig::new(2, 1, 1e-12, 8, 16, 20, 16, 2, 0.0, "bert".to_string(), 0),
            &labels,
            options,
        )
    }

    /// Two sentences: 3 words over 5 tokens, and 1 word over 2 tokens
    fn batch<B: Backend>(device: &B::Device) -> Train<B> {
        let tokens = Tensor::<B, 2, Int>::from_ints([[2, 3, 4, 5, 6], [7, 8, 0, 0, 0]], device);
        let mask_pad = lengths_to_mask::<B>(&[5, 2], 5, device).bool_not();
        let word_index = Tensor::<B, 2, Int>::from_ints([[0, 2, 3], [0, 0, 0]], device);
        let word_mask = lengths_to_mask::<B>(&[3, 1], 3, device);

        let targets = Tensor::<B, 2, Int>::from_ints(
            [[1, 2, 0], [0, PAD_LABEL_ID, PAD_LABEL_ID]],
            device,
        );

        Train::new(Infer::new(tokens, mask_pad, word_index, word_mask), targets, None)
    }

    #[test]
    fn embeds_one_vector_per_word() {
        let device = Default::default();
        let model = config(Options::new()).init::<TestBackend>(&device).unwrap();

        let embeddings = model.embed(batch::<TestBackend>(&device).input);

        assert_eq!(embeddings.dims(), [2, 3, 8]);
    }

    #[test]
    fn tags_every_word() {
        let device = Default::default();

        for use_crf in [true, false] {
            let model = config(Options::new().with_use_crf(use_crf))
                .init::<TestBackend>(&device)
                .unwrap();

            let tags = model.tag(batch::<TestBackend>(&device).input).unwrap();

            assert_eq!(tags.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 1]);
            assert!(tags.iter().flatten().all(|tag| *tag < 3));
        }
    }

    #[test]
    fn training_loss_has_gradients() {
        let device = Default::default();
        let model = config(Options::new().with_word_dropout(0.1).with_multiview(true))
            .init::<AutodiffTestBackend>(&device)
            .unwrap();

        let mut item = batch::<AutodiffTestBackend>(&device);
        item.origin = Some(item.input.clone());

        let output = model.forward(item).unwrap();

        assert_eq!(output.output.dims(), [2, 3, 3]);

        let grads = output.loss.backward();
        let weight = model.head.linear.weight.val();

        assert!(weight.grad(&grads).is_some());
    }
}
