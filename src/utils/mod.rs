use burn::prelude::*;

pub mod loss;
pub mod metric;

/// Added to L2 norms before dividing.
pub const NORM_EPS: f32 = 1e-10;

/// Divides each row by its L2 norm (plus [`NORM_EPS`]).
///
/// # Shapes
///   - Input [batch, d]
///   - Output [batch, d]
pub fn l2_normalize<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    let norm = x.clone().powf_scalar(2.0).sum_dim(1).sqrt() + NORM_EPS;
    x / norm
}

/// Mean over the sequence dimension, ignoring padded positions.
///
/// Rows that are entirely padding pool to zero.
///
/// # Shapes
///   - Input `x` [batch, sequence, d]
///   - Input `pad_mask` [batch, sequence], `true` at padding
///   - Output [batch, d]
pub fn masked_mean<B: Backend>(x: Tensor<B, 3>, pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 2> {
    let [batch, sequence, d] = x.dims();
    debug_assert_eq!([batch, sequence], pad_mask.dims());

    let keep = pad_mask.bool_not().float().unsqueeze_dim::<3>(2);
    let summed = (x * keep.clone()).sum_dim(1).squeeze_dim::<2>(1);
    let counts = keep.sum_dim(1).squeeze_dim::<2>(1).clamp_min(1.0);
    let pooled = summed / counts;
    debug_assert_eq!([batch, d], pooled.dims());
    pooled
}

/// Max over the last dimension.
///
/// # Shapes
///   - Input [batch, channels, sequence]
///   - Output [batch, channels]
pub fn max_over_time<B: Backend>(x: Tensor<B, 3>) -> Tensor<B, 2> {
    x.max_dim(2).squeeze_dim::<2>(2)
}

/// Stands in for padded steps before taking a max; below any activation.
const MASKED_MAX_FILL: f32 = -1.0e4;

/// Max over the sequence dimension, ignoring padded positions.
///
/// Rows that are entirely padding pool to zero.
///
/// # Shapes
///   - Input `x` [batch, sequence, d]
///   - Input `pad_mask` [batch, sequence], `true` at padding
///   - Output [batch, d]
pub fn masked_max_over_time<B: Backend>(
    x: Tensor<B, 3>,
    pad_mask: Tensor<B, 2, Bool>,
) -> Tensor<B, 2> {
    let [batch, sequence, d] = x.dims();
    debug_assert_eq!([batch, sequence], pad_mask.dims());

    let all_padding = pad_mask
        .clone()
        .bool_not()
        .int()
        .sum_dim(1)
        .equal_elem(0)
        .expand([batch, d]);
    let pad_mask = pad_mask.unsqueeze_dim::<3>(2).expand([batch, sequence, d]);
    let pooled = x
        .mask_fill(pad_mask, MASKED_MAX_FILL)
        .max_dim(1)
        .squeeze_dim::<2>(1)
        .mask_fill(all_padding, 0.0);
    debug_assert_eq!([batch, d], pooled.dims());
    pooled
}

/// `true` on the diagonal of an `[n, n]` matrix.
pub fn diagonal_mask<B: Backend>(n: usize, device: &B::Device) -> Tensor<B, 2, Bool> {
    let mask: Vec<bool> = (0..n * n).map(|i| i / n == i % n).collect();
    Tensor::from_data(TensorData::new(mask, [n, n]), device)
}

/// Compares tensor contents against `expected` within `1e-4`.
#[cfg(test)]
pub(crate) fn assert_close<B: Backend, const D: usize>(actual: Tensor<B, D>, expected: &[f32]) {
    let actual = actual.into_data().convert::<f32>().to_vec::<f32>().unwrap();
    assert_eq!(actual.len(), expected.len(), "{actual:?} != {expected:?}");
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-4, "{actual:?} != {expected:?}");
    }
}
