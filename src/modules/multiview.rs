use burn::{
    config::Config,
    module::Module,
    tensor::{activation::log_softmax, backend::Backend, Bool, Tensor},
};
use serde::{Deserialize, Serialize};

use super::crf::{Crf, CrfError};

/// The distributions compared by the consistency loss
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiViewLossType {
    /// KL divergence between the per-token label distributions
    #[default]
    Kl,

    /// KL divergence between the per-token CRF posteriors
    CrfKl,
}

/// Multi-view Errors
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MultiViewError {
    /// CRF posteriors were requested from a model without a CRF
    #[error("the crf_kl multi-view loss requires a CRF decoder")]
    MissingCrf,

    /// The posterior computation failed
    #[error(transparent)]
    Crf(#[from] CrfError),
}

/// Configuration to create a [multi-view loss](MultiViewLoss)
#[derive(Config, Debug)]
pub struct MultiViewLossConfig {
    /// Which distributions to compare
    #[config(default = "MultiViewLossType::Kl")]
    pub loss_type: MultiViewLossType,

    /// Softmax temperature
    #[config(default = 1.0)]
    pub temperature: f64,

    /// Weight of the supervised losses against the consistency loss
    #[config(default = 0.5)]
    pub interpolation: f64,
}

/// Blends supervised losses from two views of an input with a KL consistency loss between them
#[derive(Module, Clone, Debug)]
pub struct MultiViewLoss {
    posterior: bool,
    temperature: f64,
    interpolation: f64,
}

impl MultiViewLossConfig {
    /// Initialize a new [multi-view loss](MultiViewLoss)
    pub fn init(&self) -> MultiViewLoss {
        MultiViewLoss {
            posterior: self.loss_type == MultiViewLossType::CrfKl,
            temperature: self.temperature,
            interpolation: self.interpolation,
        }
    }
}

impl MultiViewLoss {
    /// The configured loss type
    pub fn loss_type(&self) -> MultiViewLossType {
        if self.posterior {
            MultiViewLossType::CrfKl
        } else {
            MultiViewLossType::Kl
        }
    }

    /// KL divergence from the augmented view's distribution to the origin view's, summed over
    /// unmasked tokens and divided by the batch size
    ///
    /// The augmented view acts as a fixed target: no gradient flows through `ext_logits`.
    ///
    /// # Shapes
    ///
    /// - ext_logits: `[batch_size, seq_length, num_labels]`
    /// - origin_logits: `[batch_size, seq_length, num_labels]`
    /// - mask: `[batch_size, seq_length]`
    /// - output: `[1]`
    pub fn consistency<B: Backend>(
        &self,
        ext_logits: Tensor<B, 3>,
        origin_logits: Tensor<B, 3>,
        mask: Tensor<B, 2, Bool>,
        crf: Option<&Crf<B>>,
    ) -> Result<Tensor<B, 1>, MultiViewError> {
        let [batch_size, seq_length, _] = ext_logits.dims();
        let ext_logits = ext_logits.detach();

        let (ext, origin) = if self.posterior {
            let crf = crf.ok_or(MultiViewError::MissingCrf)?;

            (
                crf.compute_posterior(ext_logits, mask.clone())?,
                crf.compute_posterior(origin_logits, mask.clone())?,
            )
        } else {
            (ext_logits, origin_logits)
        };

        let temperature = self.temperature;

        let divergence = kl_divergence(
            log_softmax(origin.div_scalar(temperature), 2),
            log_softmax(ext.div_scalar(temperature), 2),
        );

        Ok(divergence
            .mul(mask.float().reshape([batch_size, seq_length, 1]))
            .mul_scalar(temperature * temperature)
            .sum()
            .div_scalar(batch_size as f64))
    }

    /// `λ (loss + origin_loss) + (1 - λ) consistency`
    pub fn combine<B: Backend>(
        &self,
        loss: Tensor<B, 1>,
        origin_loss: Tensor<B, 1>,
        consistency: Tensor<B, 1>,
    ) -> Tensor<B, 1> {
        loss.add(origin_loss)
            .mul_scalar(self.interpolation)
            .add(consistency.mul_scalar(1.0 - self.interpolation))
    }
}

/// Pointwise `p * (log p - log q)` from log-probabilities, without reduction
pub fn kl_divergence<B: Backend, const D: usize>(
    input_log_probs: Tensor<B, D>,
    target_log_probs: Tensor<B, D>,
) -> Tensor<B, D> {
    target_log_probs
        .clone()
        .exp()
        .mul(target_log_probs.sub(input_log_probs))
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{modules::crf::CrfConfig, utils::tensors::lengths_to_mask};

    type TestBackend = NdArray<f32>;

    fn logits(device: &<TestBackend as Backend>::Device) -> (Tensor<TestBackend, 3>, Tensor<TestBackend, 3>) {
        let ext = Tensor::from_floats(
            [[[2.0, 0.0, -1.0], [0.5, 0.5, 0.0]], [[0.0, 1.0, 0.0], [3.0, 3.0, 3.0]]],
            device,
        );
        let origin = Tensor::from_floats(
            [[[0.0, 1.0, 0.0], [0.5, -0.5, 1.0]], [[1.0, 1.0, 0.0], [-3.0, 0.0, 3.0]]],
            device,
        );

        (ext, origin)
    }

    #[test]
    fn identical_views_are_consistent() {
        let device = Default::default();
        let loss = MultiViewLossConfig::new().init();

        let (ext, _) = logits(&device);
        let mask = lengths_to_mask::<TestBackend>(&[2, 2], 2, &device);

        let value = loss
            .consistency(ext.clone(), ext, mask, None)
            .unwrap()
            .into_scalar();

        assert!(value.abs() < 1e-6);
    }

    #[test]
    fn consistency_matches_the_manual_computation() {
        let device = Default::default();
        let loss = MultiViewLossConfig::new().with_temperature(2.0).init();

        let (ext, origin) = logits(&device);
        let mask = lengths_to_mask::<TestBackend>(&[2, 1], 2, &device);

        let value = loss
            .consistency(ext.clone(), origin.clone(), mask, None)
            .unwrap()
            .into_scalar();

        let softmax = |row: &[f32]| {
            let total: f32 = row.iter().map(|v| (v / 2.0).exp()).sum();
            row.iter().map(|v| (v / 2.0).exp() / total).collect::<Vec<_>>()
        };

        let ext = ext.into_data().value;
        let origin = origin.into_data().value;

        let mut expected = 0.0;
        // Only the unmasked tokens: both tokens of row 0 and the first token of row 1
        for token in [0, 1, 2] {
            let p = softmax(&ext[token * 3..token * 3 + 3]);
            let q = softmax(&origin[token * 3..token * 3 + 3]);

            expected += p
                .iter()
                .zip(q.iter())
                .map(|(p, q)| p * (p.ln() - q.ln()))
                .sum::<f32>();
        }
        expected = expected * 4.0 / 2.0;

        assert!((value - expected).abs() < 1e-5, "{value} != {expected}");
    }

    #[test]
    fn combines_losses_by_interpolation() {
        let device = Default::default();
        let loss = MultiViewLossConfig::new().with_interpolation(0.25).init();

        let combined = loss
            .combine(
                Tensor::<TestBackend, 1>::from_floats([1.0], &device),
                Tensor::from_floats([3.0], &device),
                Tensor::from_floats([2.0], &device),
            )
            .into_scalar();

        assert_eq!(combined, 0.25 * 4.0 + 0.75 * 2.0);
    }

    #[test]
    fn posterior_consistency_needs_a_crf() {
        let device = Default::default();
        let loss = MultiViewLossConfig::new()
            .with_loss_type(MultiViewLossType::CrfKl)
            .init();

        assert_eq!(loss.loss_type(), MultiViewLossType::CrfKl);

        let (ext, origin) = logits(&device);
        let mask = lengths_to_mask::<TestBackend>(&[2, 2], 2, &device);

        assert_eq!(
            loss.consistency(ext.clone(), origin.clone(), mask.clone(), None)
                .unwrap_err(),
            MultiViewError::MissingCrf
        );

        let crf = CrfConfig::new(3).init::<TestBackend>(&device);
        let value = loss
            .consistency(ext, origin, mask, Some(&crf))
            .unwrap()
            .into_scalar();

        assert!(value.is_finite() && value >= 0.0);
    }
}
