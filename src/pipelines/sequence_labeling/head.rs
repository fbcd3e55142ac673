//! The encoder-independent part of a sequence labeling model: word dropout, the linear
//! projection to label logits, the decoder (CRF, partial CRF or argmax), and the multi-view
//! loss combiner.

use burn::{
    config::Config,
    module::Module,
    nn::{Linear, LinearConfig},
    tensor::{activation::log_softmax, backend::Backend, Bool, Int, Tensor},
};

use crate::{
    modules::{
        Crf, CrfConfig, CrfError, MultiViewError, MultiViewLoss, MultiViewLossConfig,
        MultiViewLossType, Reduction, WordDropout, WordDropoutConfig,
    },
    utils::tensors::mask_lengths,
};

use super::config::Options;

/// Head Errors
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum HeadError {
    /// The head was configured without labels
    #[error("labels are not defined in the model configuration")]
    NoLabels,

    /// CRF posteriors were requested without a CRF decoder
    #[error("the crf_kl multi-view loss requires use_crf")]
    PosteriorWithoutCrf,

    /// Word dropout probability out of range
    #[error("word dropout must be in [0, 1), got {0}")]
    WordDropout(f64),

    /// The CRF rejected its input
    #[error(transparent)]
    Crf(#[from] CrfError),

    /// The consistency loss could not be computed
    #[error(transparent)]
    MultiView(#[from] MultiViewError),
}

/// Configuration to create a sequence labeling [head](Head)
#[derive(Config, Debug)]
pub struct HeadConfig {
    /// Size of the input embeddings
    pub hidden_size: usize,

    /// Number of labels
    pub num_labels: usize,

    /// Decoder and regularization options
    #[config(default = "Options::new()")]
    pub options: Options,
}

/// Logits and mask of one view of a batch
#[derive(Debug, Clone)]
pub struct View<B: Backend> {
    /// Label logits: `[batch_size, seq_length, num_labels]`
    pub logits: Tensor<B, 3>,

    /// True on real words: `[batch_size, seq_length]`
    pub mask: Tensor<B, 2, Bool>,
}

/// Sequence labeling head
#[derive(Module, Debug)]
pub struct Head<B: Backend> {
    /// Optional word dropout on the input embeddings
    pub dropout: Option<WordDropout>,

    /// Projection from embeddings to label logits
    pub linear: Linear<B>,

    /// CRF decoder, or a per-token argmax when absent
    pub crf: Option<Crf<B>>,

    /// Multi-view loss combiner, when multi-view training is enabled
    pub multiview: Option<MultiViewLoss>,

    /// Total number of labels
    pub num_labels: usize,
}

impl HeadConfig {
    /// Initialize a new [head](Head)
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<Head<B>, HeadError> {
        let options = &self.options;

        if self.num_labels == 0 {
            return Err(HeadError::NoLabels);
        }

        if !(0.0..1.0).contains(&options.word_dropout) {
            return Err(HeadError::WordDropout(options.word_dropout));
        }

        if options.multiview && options.mv_loss_type == MultiViewLossType::CrfKl && !options.use_crf
        {
            return Err(HeadError::PosteriorWithoutCrf);
        }

        let dropout =
            (options.word_dropout > 0.0).then(|| WordDropoutConfig::new(options.word_dropout).init());

        let crf = options.use_crf.then(|| {
            CrfConfig::new(self.num_labels)
                .with_partial(options.partial)
                .init(device)
        });

        let multiview = options.multiview.then(|| {
            MultiViewLossConfig::new()
                .with_loss_type(options.mv_loss_type)
                .with_temperature(options.temperature)
                .with_interpolation(options.mv_interpolation)
                .init()
        });

        Ok(Head {
            dropout,
            linear: LinearConfig::new(self.hidden_size, self.num_labels).init(device),
            crf,
            multiview,
            num_labels: self.num_labels,
        })
    }
}

impl<B: Backend> Head<B> {
    /// Project embeddings to label logits
    ///
    /// # Shapes
    ///
    /// - embeddings: `[batch_size, seq_length, hidden_size]`
    /// - output: `[batch_size, seq_length, num_labels]`
    pub fn logits(&self, embeddings: Tensor<B, 3>) -> Tensor<B, 3> {
        let embeddings = match &self.dropout {
            Some(dropout) => dropout.forward(embeddings),
            None => embeddings,
        };

        self.linear.forward(embeddings)
    }

    /// Supervised loss of one view
    ///
    /// With a CRF this is the negative mean sequence log-likelihood, where targets outside the
    /// mask are zeroed and unknown targets count as label 0 unless the CRF is partial. Otherwise
    /// it is the mean token cross-entropy, skipping negative targets (padding and partial labels).
    pub fn loss(
        &self,
        logits: Tensor<B, 3>,
        targets: Tensor<B, 2, Int>,
        mask: Tensor<B, 2, Bool>,
    ) -> Result<Tensor<B, 1>, HeadError> {
        match &self.crf {
            Some(crf) => {
                let targets = targets.mul(mask.clone().int());

                // Only a partial CRF can marginalize over unknown labels
                let targets = if crf.partial {
                    targets
                } else {
                    targets.clamp_min(0)
                };

                Ok(crf.forward(logits, targets, mask, Reduction::Mean)?.neg())
            }
            None => Ok(cross_entropy(logits, targets)),
        }
    }

    /// Training loss for a batch, blending in the origin view when multi-view training is on
    ///
    /// The augmented `view` is the primary input. When an `origin` view is given and multi-view
    /// training is enabled, the result is
    /// `λ (loss + origin_loss) + (1 - λ) KL(augmented || origin)`.
    pub fn training_loss(
        &self,
        view: View<B>,
        targets: Tensor<B, 2, Int>,
        origin: Option<View<B>>,
    ) -> Result<Tensor<B, 1>, HeadError> {
        let loss = self.loss(view.logits.clone(), targets.clone(), view.mask.clone())?;

        let (multiview, origin) = match (&self.multiview, origin) {
            (Some(multiview), Some(origin)) => (multiview, origin),
            _ => return Ok(loss),
        };

        let origin_loss = self.loss(origin.logits.clone(), targets, origin.mask.clone())?;

        let consistency =
            multiview.consistency(view.logits, origin.logits, origin.mask, self.crf.as_ref())?;

        Ok(multiview.combine(loss, origin_loss, consistency))
    }

    /// Decode label ids for every row, trimmed to the row's mask length
    pub fn decode(
        &self,
        logits: Tensor<B, 3>,
        mask: Tensor<B, 2, Bool>,
    ) -> Result<Vec<Vec<usize>>, HeadError> {
        if let Some(crf) = &self.crf {
            return Ok(crf.decode(logits, mask)?);
        }

        let [_, seq_length, _] = logits.dims();

        let predictions = logits.argmax(2).into_data().convert::<i64>().value;

        let paths = mask_lengths(mask)
            .into_iter()
            .enumerate()
            .map(|(row, length)| {
                predictions[row * seq_length..row * seq_length + length]
                    .iter()
                    .map(|label| *label as usize)
                    .collect()
            })
            .collect();

        Ok(paths)
    }
}

/// Mean token cross-entropy over non-negative targets
fn cross_entropy<B: Backend>(logits: Tensor<B, 3>, targets: Tensor<B, 2, Int>) -> Tensor<B, 1> {
    let [batch_size, seq_length, _] = logits.dims();

    let weights = targets.clone().greater_equal_elem(0).float();

    let picked = log_softmax(logits, 2)
        .gather(2, targets.clamp_min(0).reshape([batch_size, seq_length, 1]))
        .reshape([batch_size, seq_length]);

    let count = weights.clone().sum().clamp_min(1.0);

    picked.mul(weights).sum().neg().div(count)
}
