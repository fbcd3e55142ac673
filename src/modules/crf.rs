//! Linear-chain Conditional Random Field over batch-first emission scores.
//!
//! Training maximizes the sequence log-likelihood through the forward (log-sum-exp)
//! recurrence, decoding uses Viterbi, and [`Crf::compute_posterior`] runs forward-backward to
//! produce per-position log marginals. All recurrences are batched over the sequence dimension
//! and built from differentiable tensor operations, so gradients reach both the emissions and
//! the transition parameters.

use burn::{
    config::Config,
    module::{Module, Param},
    nn::Initializer,
    tensor::{backend::Backend, Bool, Int, Tensor},
};

use crate::utils::tensors::{blend, log_sum_exp, mask_lengths};

/// Score given to tags that a partial annotation rules out
pub const IMPOSSIBLE_SCORE: f64 = -10_000.0;

/// How per-sequence log-likelihoods are reduced
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum Reduction {
    /// One value per sequence
    None,
    /// Sum over the batch
    #[default]
    Sum,
    /// Mean over the batch
    Mean,
    /// Sum over the batch divided by the number of unmasked tokens
    TokenMean,
}

/// CRF Errors
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CrfError {
    /// The emission scores do not end in a `num_tags` dimension
    #[error("expected last dimension of emissions to be {expected}, got {actual}")]
    NumTags {
        /// Number of tags the CRF was built with
        expected: usize,
        /// Size of the last emissions dimension
        actual: usize,
    },

    /// A tags or mask tensor disagrees with the emissions on batch or sequence size
    #[error("the first two dimensions of emissions and {name} must match, got {emissions:?} and {other:?}")]
    Shape {
        /// The mismatched tensor
        name: &'static str,
        /// `[batch_size, seq_length]` of the emissions
        emissions: [usize; 2],
        /// `[batch_size, seq_length]` of the other tensor
        other: [usize; 2],
    },

    /// Some row has padding on its first timestep
    #[error("mask of the first timestep must all be on")]
    EmptySequence,

    /// Some row has an unmasked position after a masked one
    #[error("mask must be a contiguous prefix of each sequence")]
    NonContiguousMask,
}

/// Configuration to create a [CRF](Crf) layer
#[derive(Config, Debug)]
pub struct CrfConfig {
    /// Number of tags
    pub num_tags: usize,

    /// Train against partially annotated sequences, where negative tags mark unknown positions
    #[config(default = false)]
    pub partial: bool,

    /// Initializer for all transition scores
    #[config(default = "Initializer::Uniform{min: -0.1, max: 0.1}")]
    pub initializer: Initializer,
}

/// Linear-chain CRF
#[derive(Module, Debug)]
pub struct Crf<B: Backend> {
    /// Scores for starting a sequence with each tag: `[num_tags]`
    pub start_transitions: Param<Tensor<B, 1>>,

    /// Scores for ending a sequence with each tag: `[num_tags]`
    pub end_transitions: Param<Tensor<B, 1>>,

    /// `transitions[i, j]` is the score of moving from tag `i` to tag `j`
    pub transitions: Param<Tensor<B, 2>>,

    /// Number of tags
    pub num_tags: usize,

    /// Whether the log-likelihood marginalizes unknown tags
    pub partial: bool,
}

impl CrfConfig {
    /// Initialize a new [CRF](Crf) module
    pub fn init<B: Backend>(&self, device: &B::Device) -> Crf<B> {
        Crf {
            start_transitions: self.initializer.init([self.num_tags], device),
            end_transitions: self.initializer.init([self.num_tags], device),
            transitions: self.initializer.init([self.num_tags, self.num_tags], device),
            num_tags: self.num_tags,
            partial: self.partial,
        }
    }
}

impl<B: Backend> Crf<B> {
    /// Compute the log-likelihood of `tags` given the `emissions`
    ///
    /// # Shapes
    ///
    /// - emissions: `[batch_size, seq_length, num_tags]`
    /// - tags: `[batch_size, seq_length]`
    /// - mask: `[batch_size, seq_length]`, true on real tokens
    /// - output: `[batch_size]` for [Reduction::None], `[1]` otherwise
    ///
    /// In partial mode, negative tags are unknown and every tag is allowed at those positions.
    pub fn forward(
        &self,
        emissions: Tensor<B, 3>,
        tags: Tensor<B, 2, Int>,
        mask: Tensor<B, 2, Bool>,
        reduction: Reduction,
    ) -> Result<Tensor<B, 1>, CrfError> {
        self.validate(&emissions, Some(&tags), &mask)?;

        let log_likelihood = if self.partial {
            let constrained = self.constrain(emissions.clone(), tags);

            self.compute_normalizer(constrained, mask.clone())
                .sub(self.compute_normalizer(emissions, mask.clone()))
        } else {
            self.compute_score(emissions.clone(), tags, mask.clone())
                .sub(self.compute_normalizer(emissions, mask.clone()))
        };

        Ok(match reduction {
            Reduction::None => log_likelihood,
            Reduction::Sum => log_likelihood.sum(),
            Reduction::Mean => log_likelihood.mean(),
            Reduction::TokenMean => {
                let tokens = mask.float().sum();

                log_likelihood.sum().div(tokens)
            }
        })
    }

    /// Find the most likely tag sequence of every row using the Viterbi algorithm
    ///
    /// Each returned sequence has exactly as many tags as its row has unmasked positions.
    pub fn decode(
        &self,
        emissions: Tensor<B, 3>,
        mask: Tensor<B, 2, Bool>,
    ) -> Result<Vec<Vec<usize>>, CrfError> {
        let [batch_size, seq_length, num_tags] = emissions.dims();

        if batch_size == 0 || seq_length == 0 {
            return Ok(vec![Vec::new(); batch_size]);
        }

        self.validate(&emissions, None, &mask)?;

        let transitions = self.transitions.val().unsqueeze::<3>();

        let mut score = self.start_transitions.val().unsqueeze::<2>().add(step(&emissions, 0));
        let mut history = Vec::with_capacity(seq_length - 1);

        for i in 1..seq_length {
            // [batch_size, previous tag, current tag]
            let candidates = score
                .clone()
                .unsqueeze_dim::<3>(2)
                .add(transitions.clone())
                .add(step(&emissions, i).unsqueeze_dim::<3>(1));

            let best = candidates
                .clone()
                .max_dim(1)
                .reshape([batch_size, num_tags]);

            history.push(candidates.argmax(1));

            score = blend(step_mask(&mask, i), best, score);
        }

        let score = score
            .add(self.end_transitions.val().unsqueeze::<2>())
            .into_data()
            .convert::<f32>()
            .value;

        // [batch_size, seq_length - 1, num_tags] on the host for backtracking
        let history = if history.is_empty() {
            Vec::new()
        } else {
            Tensor::cat(history, 1).into_data().convert::<i64>().value
        };

        let lengths = mask_lengths(mask);

        let paths = lengths
            .into_iter()
            .enumerate()
            .map(|(row, length)| {
                if length == 0 {
                    return Vec::new();
                }

                let last_scores = &score[row * num_tags..(row + 1) * num_tags];
                let mut best_tag = argmax(last_scores);

                let mut path = Vec::with_capacity(length);
                path.push(best_tag);

                for i in (1..length).rev() {
                    let offset = (row * (seq_length - 1) + (i - 1)) * num_tags;
                    best_tag = history[offset + best_tag] as usize;
                    path.push(best_tag);
                }

                path.reverse();
                path
            })
            .collect();

        Ok(paths)
    }

    /// Per-position log marginal probabilities of every tag, computed with forward-backward
    ///
    /// Positions outside the mask hold unspecified values.
    ///
    /// # Shapes
    ///
    /// - emissions: `[batch_size, seq_length, num_tags]`
    /// - output: `[batch_size, seq_length, num_tags]`
    pub fn compute_posterior(
        &self,
        emissions: Tensor<B, 3>,
        mask: Tensor<B, 2, Bool>,
    ) -> Result<Tensor<B, 3>, CrfError> {
        self.validate(&emissions, None, &mask)?;

        let [batch_size, seq_length, num_tags] = emissions.dims();
        let device = emissions.device();

        let transitions = self.transitions.val().unsqueeze::<3>();
        let end = self.end_transitions.val().unsqueeze::<2>();

        // Forward pass
        let mut alpha = self.start_transitions.val().unsqueeze::<2>().add(step(&emissions, 0));
        let mut alphas = vec![alpha.clone()];

        for i in 1..seq_length {
            let next = log_sum_exp(alpha.clone().unsqueeze_dim::<3>(2).add(transitions.clone()), 1)
                .reshape([batch_size, num_tags])
                .add(step(&emissions, i));

            alpha = blend(step_mask(&mask, i), next, alpha);
            alphas.push(alpha.clone());
        }

        let log_partition = log_sum_exp(alpha.add(end.clone()), 1);

        // Backward pass, where a position followed by padding closes its sequence
        let closing = Tensor::<B, 2>::zeros([batch_size, num_tags], &device).add(end);

        let mut beta = closing.clone();
        let mut betas = vec![beta.clone()];

        for i in (0..seq_length - 1).rev() {
            let ahead = step(&emissions, i + 1).add(beta.clone()).unsqueeze_dim::<3>(1);
            let next = log_sum_exp(transitions.clone().add(ahead), 2).reshape([batch_size, num_tags]);

            beta = blend(step_mask(&mask, i + 1), next, closing.clone());
            betas.push(beta.clone());
        }

        betas.reverse();

        let stack = |steps: Vec<Tensor<B, 2>>| {
            Tensor::cat(
                steps
                    .into_iter()
                    .map(|step| step.reshape([batch_size, 1, num_tags]))
                    .collect(),
                1,
            )
        };

        Ok(stack(alphas)
            .add(stack(betas))
            .sub(log_partition.unsqueeze_dim::<3>(2)))
    }

    /// Score of the given tag paths
    fn compute_score(
        &self,
        emissions: Tensor<B, 3>,
        tags: Tensor<B, 2, Int>,
        mask: Tensor<B, 2, Bool>,
    ) -> Tensor<B, 1> {
        let [batch_size, seq_length, num_tags] = emissions.dims();
        let weights = mask.clone().float();

        let emitted = emissions
            .gather(2, tags.clone().reshape([batch_size, seq_length, 1]))
            .reshape([batch_size, seq_length])
            .mul(weights.clone())
            .sum_dim(1)
            .reshape([batch_size]);

        let first_tags = tags.clone().slice([0..batch_size, 0..1]).reshape([batch_size]);
        let mut score = emitted.add(self.start_transitions.val().select(0, first_tags));

        if seq_length > 1 {
            let steps = seq_length - 1;

            let from = tags.clone().slice([0..batch_size, 0..steps]);
            let to = tags.clone().slice([0..batch_size, 1..seq_length]);
            let pairs = from
                .mul_scalar(num_tags as i64)
                .add(to)
                .reshape([batch_size * steps]);

            let transitions = self
                .transitions
                .val()
                .reshape([num_tags * num_tags])
                .select(0, pairs)
                .reshape([batch_size, steps])
                .mul(weights.slice([0..batch_size, 1..seq_length]))
                .sum_dim(1)
                .reshape([batch_size]);

            score = score.add(transitions);
        }

        let seq_ends = mask.int().sum_dim(1).sub_scalar(1);
        let last_tags = tags.gather(1, seq_ends).reshape([batch_size]);

        score.add(self.end_transitions.val().select(0, last_tags))
    }

    /// Log-partition over all tag paths
    fn compute_normalizer(&self, emissions: Tensor<B, 3>, mask: Tensor<B, 2, Bool>) -> Tensor<B, 1> {
        let [batch_size, seq_length, num_tags] = emissions.dims();

        let transitions = self.transitions.val().unsqueeze::<3>();

        let mut score = self.start_transitions.val().unsqueeze::<2>().add(step(&emissions, 0));

        for i in 1..seq_length {
            let next = log_sum_exp(
                score
                    .clone()
                    .unsqueeze_dim::<3>(2)
                    .add(transitions.clone())
                    .add(step(&emissions, i).unsqueeze_dim::<3>(1)),
                1,
            )
            .reshape([batch_size, num_tags]);

            score = blend(step_mask(&mask, i), next, score);
        }

        log_sum_exp(score.add(self.end_transitions.val().unsqueeze::<2>()), 1).reshape([batch_size])
    }

    /// Penalize every tag a partial annotation rules out
    fn constrain(&self, emissions: Tensor<B, 3>, tags: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch_size, seq_length, num_tags] = emissions.dims();
        let device = emissions.device();

        let known = tags
            .clone()
            .greater_equal_elem(0)
            .float()
            .reshape([batch_size, seq_length, 1]);

        let one_hot = Tensor::<B, 3>::zeros([batch_size, seq_length, num_tags], &device).scatter(
            2,
            tags.clamp_min(0).reshape([batch_size, seq_length, 1]),
            Tensor::ones([batch_size, seq_length, 1], &device),
        );

        let allowed = one_hot
            .mul(known.clone())
            .add(known.neg().add_scalar(1.0));

        emissions.add(allowed.neg().add_scalar(1.0).mul_scalar(IMPOSSIBLE_SCORE))
    }

    fn validate(
        &self,
        emissions: &Tensor<B, 3>,
        tags: Option<&Tensor<B, 2, Int>>,
        mask: &Tensor<B, 2, Bool>,
    ) -> Result<(), CrfError> {
        let [batch_size, seq_length, num_tags] = emissions.dims();

        if num_tags != self.num_tags {
            return Err(CrfError::NumTags {
                expected: self.num_tags,
                actual: num_tags,
            });
        }

        if let Some(tags) = tags {
            if tags.dims() != [batch_size, seq_length] {
                return Err(CrfError::Shape {
                    name: "tags",
                    emissions: [batch_size, seq_length],
                    other: tags.dims(),
                });
            }
        }

        if mask.dims() != [batch_size, seq_length] {
            return Err(CrfError::Shape {
                name: "mask",
                emissions: [batch_size, seq_length],
                other: mask.dims(),
            });
        }

        if seq_length == 0 {
            return Err(CrfError::EmptySequence);
        }

        let flags = mask.clone().into_data().value;

        for row in flags.chunks(seq_length) {
            if !row[0] {
                return Err(CrfError::EmptySequence);
            }

            let length = row.iter().take_while(|on| **on).count();

            if row[length..].iter().any(|on| *on) {
                return Err(CrfError::NonContiguousMask);
            }
        }

        Ok(())
    }
}

/// Emission scores of timestep `i`: `[batch_size, num_tags]`
fn step<B: Backend>(emissions: &Tensor<B, 3>, i: usize) -> Tensor<B, 2> {
    let [batch_size, _, num_tags] = emissions.dims();

    emissions
        .clone()
        .slice([0..batch_size, i..i + 1])
        .reshape([batch_size, num_tags])
}

/// Mask of timestep `i` as floats: `[batch_size, 1]`
fn step_mask<B: Backend>(mask: &Tensor<B, 2, Bool>, i: usize) -> Tensor<B, 2> {
    let [batch_size, _] = mask.dims();

    mask.clone().slice([0..batch_size, i..i + 1]).float()
}

fn argmax(scores: &[f32]) -> usize {
    scores
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, best_score), (tag, score)| {
            if *score > best_score {
                (tag, *score)
            } else {
                (best, best_score)
            }
        })
        .0
}
