//! Token n-gram encoder.
//!
//! One convolution per kernel size slides over the embedded tokens, each
//! detecting n-grams of its width; max-pooling over time keeps the strongest
//! match of every filter.
//!
//! References:
//! - https://arxiv.org/abs/1408.5882

use crate::utils::max_over_time;
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::{Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;

#[derive(Config, Debug)]
pub struct CnnEncoderConfig {
    pub vocab_size: usize,
    /// Token sequences are padded or truncated to this length.
    pub max_seq_length: usize,
    pub emb_size: usize,
    pub output_units: usize,
    /// Every size must not exceed `max_seq_length`.
    #[config(default = "vec![2, 3, 4]")]
    pub conv_kernel_sizes: Vec<usize>,
    /// Filters per kernel size.
    #[config(default = 64)]
    pub conv_n_filters: usize,
    #[config(default = 0.1)]
    pub dropout_rate: f64,
}

impl CnnEncoderConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> CnnEncoder<B> {
        let convs = self
            .conv_kernel_sizes
            .iter()
            .map(|&kernel_size| {
                Conv1dConfig::new(self.emb_size, self.conv_n_filters, kernel_size).init(device)
            })
            .collect();
        let pooled_size = self.conv_n_filters * self.conv_kernel_sizes.len();
        CnnEncoder {
            embedding: EmbeddingConfig::new(self.vocab_size, self.emb_size).init(device),
            convs,
            dropout: DropoutConfig::new(self.dropout_rate).init(),
            output: LinearConfig::new(pooled_size, self.output_units).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct CnnEncoder<B: Backend> {
    pub embedding: Embedding<B>,
    pub convs: Vec<Conv1d<B>>,
    pub dropout: Dropout,
    pub output: Linear<B>,
}

impl<B: Backend> CnnEncoder<B> {
    pub fn output_units(&self) -> usize {
        let [_pooled, output_units] = self.output.weight.dims();
        output_units
    }

    /// # Shapes
    ///   - Input [batch, sequence]
    ///   - Output [batch, output_units]
    pub fn forward(&self, tokens: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let [batch, sequence] = tokens.dims();
        let [_vocab, emb_size] = self.embedding.weight.dims();

        let x = self.embedding.forward(tokens);
        debug_assert_eq!([batch, sequence, emb_size], x.dims());
        let x = x.swap_dims(1, 2);

        let pooled: Vec<Tensor<B, 2>> = self
            .convs
            .iter()
            .map(|conv| {
                let [n_filters, _emb_size, kernel_size] = conv.weight.dims();
                assert!(
                    sequence >= kernel_size,
                    "sequence of {sequence} tokens is shorter than kernel size {kernel_size}"
                );
                let x = relu(conv.forward(x.clone()));
                debug_assert_eq!([batch, n_filters, sequence - kernel_size + 1], x.dims());
                max_over_time(x)
            })
            .collect();

        let x = Tensor::cat(pooled, 1);
        let x = self.dropout.forward(x);
        self.output.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn encodes_to_output_units() {
        let device = Default::default();
        let encoder = CnnEncoderConfig::new(20, 6, 8, 5)
            .with_conv_kernel_sizes(vec![2, 3])
            .with_conv_n_filters(4)
            .init::<TestBackend>(&device);
        assert_eq!(encoder.convs.len(), 2);
        assert_eq!(encoder.output.weight.dims(), [8, 5]);

        let tokens = Tensor::<TestBackend, 2, Int>::from_ints(
            [[2, 3, 4, 0, 0, 0], [5, 6, 7, 8, 9, 10]],
            &device,
        );
        let out = encoder.forward(tokens);
        assert_eq!(out.dims(), [2, 5]);
        assert_eq!(encoder.output_units(), 5);
    }

    #[test]
    #[should_panic]
    fn rejects_sequences_shorter_than_a_kernel() {
        let device = Default::default();
        let encoder = CnnEncoderConfig::new(20, 6, 8, 5)
            .with_conv_kernel_sizes(vec![4])
            .init::<TestBackend>(&device);
        let tokens = Tensor::<TestBackend, 2, Int>::from_ints([[2, 3]], &device);
        encoder.forward(tokens);
    }
}
