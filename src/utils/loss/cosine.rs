use crate::utils::diagonal_mask;
use burn::prelude::*;

/// Configuration to create a [Cosine loss](CosineLoss) using the [init function](CosineLossConfig::init).
#[derive(Config, Debug)]
pub struct CosineLossConfig {
    /// How far the matching pair must score above the hardest non-matching one.
    #[config(default = 1.0)]
    pub margin: f64,
}

impl CosineLossConfig {
    /// Initialize [Cosine loss](CosineLoss).
    pub fn init(&self) -> CosineLoss {
        CosineLoss {
            margin: self.margin,
        }
    }
}

/// Max-margin loss over a batch similarity matrix.
///
/// Row `i` holds the cosine similarities of description `i` against every code
/// snippet of the batch, and snippet `i` is its match. Per row:
///
/// ```ignore
/// lossᵢ = max(0, margin − sᵢᵢ + maxⱼ≠ᵢ relu(sᵢⱼ))
/// ```
///
/// Should be created using [CosineLossConfig]
#[derive(Module, Clone, Debug)]
pub struct CosineLoss {
    pub margin: f64,
}

impl Default for CosineLoss {
    fn default() -> Self {
        CosineLossConfig::new().init()
    }
}

impl CosineLoss {
    /// Compute the criterion on the similarity matrix, averaged over the rows.
    ///
    /// # Shapes
    ///
    /// - similarity: `[batch_size, batch_size]`
    /// - output: `[1]`
    pub fn forward<B: Backend>(&self, similarity: Tensor<B, 2>) -> Tensor<B, 1> {
        self.forward_no_reduction(similarity).mean()
    }

    /// Compute the per-row criterion.
    ///
    /// # Shapes
    ///
    /// - similarity: `[batch_size, batch_size]`
    /// - output: `[batch_size]`
    pub fn forward_no_reduction<B: Backend>(&self, similarity: Tensor<B, 2>) -> Tensor<B, 1> {
        let [batch, batch_] = similarity.dims();
        assert_eq!(batch, batch_, "similarity matrix must be square");
        let diag = diagonal_mask::<B>(batch, &similarity.device());

        let positive = similarity
            .clone()
            .mask_fill(diag.clone().bool_not(), 0.0)
            .sum_dim(1);
        // the diagonal is excluded; a batch of one has no negatives
        let hardest_negative = similarity.clamp_min(0.0).mask_fill(diag, 0.0).max_dim(1);

        (hardest_negative - positive + self.margin)
            .clamp_min(0.0)
            .squeeze_dim::<1>(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::assert_close;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn perfect_separation_only_pays_margin_gap() {
        let device = Default::default();
        let s = Tensor::<TestBackend, 2>::from_floats([[1.0, -0.5], [-0.2, 1.0]], &device);
        let loss = CosineLossConfig::new().init();
        // negatives are clamped at zero, positives at one
        assert_close(loss.forward_no_reduction(s.clone()), &[0.0, 0.0]);

        let loss = CosineLossConfig::new().with_margin(1.5).init();
        assert_close(loss.forward(s), &[0.5]);
    }

    #[test]
    fn hardest_negative_drives_the_loss() {
        let device = Default::default();
        let s = Tensor::<TestBackend, 2>::from_floats(
            [[0.5, 0.8, 0.1], [0.0, 0.9, 0.3], [0.2, 0.2, 0.2]],
            &device,
        );
        let loss = CosineLoss::default();
        // 1 - 0.5 + 0.8, 1 - 0.9 + 0.3, 1 - 0.2 + 0.2
        assert_close(loss.forward_no_reduction(s.clone()), &[1.3, 0.4, 1.0]);
        assert_close(loss.forward(s), &[0.9]);
    }

    #[test]
    fn single_pair_has_no_negatives() {
        let device = Default::default();
        let s = Tensor::<TestBackend, 2>::from_floats([[0.25]], &device);
        assert_close(CosineLoss::default().forward(s), &[0.75]);
    }
}
