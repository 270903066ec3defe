use crate::utils::diagonal_mask;
use burn::prelude::*;
use burn::tensor::ElementConversion;
use burn::train::metric::state::{FormatOptions, NumericMetricState};
use burn::train::metric::{
    Metric, MetricMetadata, MetricName, Numeric, NumericEntry, SerializedEntry,
};
use core::marker::PhantomData;

/// Mean reciprocal rank of the matching pairs on the diagonal.
///
/// The rank of row `i` counts every column scoring at least `sᵢᵢ`, the match
/// included, so ties rank pessimistically.
///
/// # Shapes
///   - similarity [batch, batch]
///   - output [1]
pub fn mrr<B: Backend>(similarity: Tensor<B, 2>) -> Tensor<B, 1> {
    let [batch, batch_] = similarity.dims();
    assert_eq!(batch, batch_, "similarity matrix must be square");
    let diag = diagonal_mask::<B>(batch, &similarity.device());

    let correct = similarity
        .clone()
        .mask_fill(diag.bool_not(), 0.0)
        .sum_dim(1)
        .expand([batch, batch]);
    let ranks = similarity.greater_equal(correct).float().sum_dim(1);
    ranks.recip().mean()
}

/// Input of [`MrrMetric`].
pub struct MrrInput<B: Backend> {
    /// # Shape
    /// [batch, batch]
    pub similarity: Tensor<B, 2>,
}

impl<B: Backend> MrrInput<B> {
    pub fn new(similarity: Tensor<B, 2>) -> Self {
        Self { similarity }
    }
}

/// [`mrr`] tracked across batches, weighted by batch size.
#[derive(Clone)]
pub struct MrrMetric<B: Backend> {
    state: NumericMetricState,
    _b: PhantomData<B>,
}

impl<B: Backend> MrrMetric<B> {
    pub fn new() -> Self {
        Self {
            state: NumericMetricState::new(),
            _b: PhantomData,
        }
    }
}

impl<B: Backend> Default for MrrMetric<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Metric for MrrMetric<B> {
    type Input = MrrInput<B>;

    fn update(&mut self, input: &MrrInput<B>, _metadata: &MetricMetadata) -> SerializedEntry {
        let [batch_size, _] = input.similarity.dims();
        let value = mrr(input.similarity.clone()).into_scalar().elem::<f64>();
        self.state.update(
            value,
            batch_size,
            FormatOptions::new(self.name()).precision(4),
        )
    }

    fn clear(&mut self) {
        self.state.reset()
    }

    fn name(&self) -> MetricName {
        std::sync::Arc::new("MRR".to_string())
    }
}

impl<B: Backend> Numeric for MrrMetric<B> {
    fn value(&self) -> NumericEntry {
        self.state.current_value()
    }

    fn running_value(&self) -> NumericEntry {
        self.state.running_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::assert_close;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn ranks_are_reciprocated_and_averaged() {
        let device = Default::default();
        let s = Tensor::<TestBackend, 2>::from_floats(
            [[0.9, 0.1, 0.2], [0.5, 0.4, 0.6], [0.3, 0.3, 0.3]],
            &device,
        );
        // ranks 1, 3, 3 (ties count against the match)
        assert_close(mrr(s), &[(1.0 + 1.0 / 3.0 + 1.0 / 3.0) / 3.0]);
    }

    #[test]
    fn metric_averages_batches() {
        let device = Default::default();
        let meta = MetricMetadata {
            progress: burn::data::dataloader::Progress::new(0, 4),
            epoch: 1,
            epoch_total: 1,
            iteration: 0,
            lr: None,
        };
        let mut metric = MrrMetric::<TestBackend>::new();

        let perfect = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0], [0.0, 1.0]], &device);
        metric.update(&MrrInput::new(perfect), &meta);
        assert!((metric.value().current() - 1.0).abs() < 1e-6);

        // both rows rank their match second
        let swapped = Tensor::<TestBackend, 2>::from_floats([[0.0, 1.0], [1.0, 0.0]], &device);
        metric.update(&MrrInput::new(swapped), &meta);
        assert!((metric.value().current() - 0.5).abs() < 1e-6);
        assert!((metric.running_value().current() - 0.75).abs() < 1e-6);

        metric.clear();
        let perfect = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0], [0.0, 1.0]], &device);
        metric.update(&MrrInput::new(perfect), &meta);
        assert!((metric.running_value().current() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn identity_is_perfect() {
        let device = Default::default();
        let s = Tensor::<TestBackend, 2>::from_floats(
            [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            &device,
        );
        assert_close(mrr(s), &[1.0]);
    }
}
