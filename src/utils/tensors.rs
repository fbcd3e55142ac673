use burn::tensor::{backend::Backend, Bool, Data, ElementConversion, Int, Shape, Tensor};

/// Generate padding to a specific max length, typically to correlate with tokenized sequences
pub fn pad_to<B: Backend>(
    pad_value: i64,
    values_list: Vec<Vec<i64>>,
    seq_length: usize,
    device: &B::Device,
) -> Tensor<B, 2, Int> {
    let batch_size = values_list.len();

    let mut flat: Vec<B::IntElem> = Vec::with_capacity(batch_size * seq_length);

    for values in values_list {
        let length = values.len().min(seq_length);

        flat.extend(values.into_iter().take(length).map(|v| v.elem::<B::IntElem>()));
        flat.extend((length..seq_length).map(|_| pad_value.elem::<B::IntElem>()));
    }

    Tensor::from_data(Data::new(flat, Shape::new([batch_size, seq_length])), device)
}

/// Build a `[batch_size, seq_length]` mask that is true on the first `length` positions of each
/// row
pub fn lengths_to_mask<B: Backend>(
    lengths: &[usize],
    seq_length: usize,
    device: &B::Device,
) -> Tensor<B, 2, Bool> {
    let flags = lengths
        .iter()
        .map(|length| {
            let length = (*length).min(seq_length);

            let mut row = vec![1_i64; length];
            row.resize(seq_length, 0);
            row
        })
        .collect();

    pad_to::<B>(0, flags, seq_length, device).greater_elem(0)
}

/// Count the number of true positions of each row in a `[batch_size, seq_length]` mask
pub fn mask_lengths<B: Backend>(mask: Tensor<B, 2, Bool>) -> Vec<usize> {
    mask.int()
        .sum_dim(1)
        .into_data()
        .convert::<i64>()
        .value
        .into_iter()
        .map(|length| length.max(0) as usize)
        .collect()
}

/// Numerically stable `log(sum(exp(x)))` along `dim`, keeping the reduced dimension with size 1
pub fn log_sum_exp<B: Backend, const D: usize>(tensor: Tensor<B, D>, dim: usize) -> Tensor<B, D> {
    let max = tensor.clone().max_dim(dim).detach();

    tensor
        .sub(max.clone())
        .exp()
        .sum_dim(dim)
        .log()
        .add(max)
}

/// Blend two tensors row by row: rows where `step_mask` is 1.0 take `updated`, others keep
/// `previous`
pub fn blend<B: Backend, const D: usize>(
    step_mask: Tensor<B, D>,
    updated: Tensor<B, D>,
    previous: Tensor<B, D>,
) -> Tensor<B, D> {
    let keep = step_mask.clone().neg().add_scalar(1.0);

    updated.mul(step_mask).add(previous.mul(keep))
}

/// Pick one row of `states` per index in `positions`, batch by batch
///
/// # Shapes
///
/// - states: `[batch_size, seq_length, hidden_size]`
/// - positions: `[batch_size, num_positions]`, each in `0..seq_length`
/// - output: `[batch_size, num_positions, hidden_size]`
pub fn select_positions<B: Backend>(
    states: Tensor<B, 3>,
    positions: Tensor<B, 2, Int>,
) -> Tensor<B, 3> {
    let [batch_size, seq_length, hidden_size] = states.dims();
    let [_, num_positions] = positions.dims();

    let offsets = Tensor::<B, 1, Int>::arange(0..batch_size as i64, &positions.device())
        .mul_scalar(seq_length as i64)
        .reshape([batch_size, 1]);

    let flat = positions.add(offsets).reshape([batch_size * num_positions]);

    states
        .reshape([batch_size * seq_length, hidden_size])
        .select(0, flat)
        .reshape([batch_size, num_positions, hidden_size])
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use pretty_assertions::assert_eq;

    use super::*;

    type TestBackend = NdArray<f32>;

    #[test]
    fn pads_and_truncates_rows() {
        let device = Default::default();

        let tensor = pad_to::<TestBackend>(-100, vec![vec![1, 2], vec![3, 4, 5, 6]], 3, &device);

        assert_eq!(tensor.dims(), [2, 3]);
        assert_eq!(
            tensor.into_data().convert::<i64>().value,
            vec![1, 2, -100, 3, 4, 5]
        );
    }

    #[test]
    fn builds_prefix_masks() {
        let device = Default::default();

        let mask = lengths_to_mask::<TestBackend>(&[2, 0, 4], 3, &device);

        assert_eq!(
            mask.clone().into_data().value,
            vec![true, true, false, false, false, false, true, true, true]
        );
        assert_eq!(mask_lengths(mask), vec![2, 0, 3]);
    }

    #[test]
    fn log_sum_exp_matches_the_naive_formula() {
        let device = Default::default();

        let tensor = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 3.0], [-1.0, 0.0, 500.0]], &device);

        let result = log_sum_exp(tensor, 1).into_data().convert::<f32>().value;

        let expected = (1.0_f32.exp() + 2.0_f32.exp() + 3.0_f32.exp()).ln();
        assert!((result[0] - expected).abs() < 1e-5);

        // The large entry dominates and must not overflow
        assert!((result[1] - 500.0).abs() < 1e-3);
    }

    #[test]
    fn selects_positions_within_each_row() {
        let device = Default::default();

        let states = Tensor::<TestBackend, 3>::from_floats(
            [[[0.0, 0.5], [1.0, 1.5], [2.0, 2.5]], [[3.0, 3.5], [4.0, 4.5], [5.0, 5.5]]],
            &device,
        );
        let positions = Tensor::<TestBackend, 2, Int>::from_ints([[1, 2], [0, 0]], &device);

        let result = select_positions(states, positions);

        assert_eq!(result.dims(), [2, 2, 2]);
        assert_eq!(
            result.into_data().convert::<f32>().value,
            vec![1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 3.0, 3.5]
        );
    }

    #[test]
    fn blends_rows_by_mask() {
        let device = Default::default();

        let mask = Tensor::<TestBackend, 2>::from_floats([[1.0], [0.0]], &device);
        let updated = Tensor::<TestBackend, 2>::from_floats([[1.0, 1.0], [1.0, 1.0]], &device);
        let previous = Tensor::<TestBackend, 2>::from_floats([[5.0, 5.0], [5.0, 5.0]], &device);

        let result = blend(mask, updated, previous).into_data().convert::<f32>().value;

        assert_eq!(result, vec![1.0, 1.0, 5.0, 5.0]);
    }
}
