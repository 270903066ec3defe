//! Transformer (BERT-style) encoder.

use crate::text::PAD_ID;
use crate::utils::masked_mean;
use burn::nn::transformer::{TransformerEncoder, TransformerEncoderConfig, TransformerEncoderInput};
use burn::nn::{
    Dropout, DropoutConfig, Embedding, EmbeddingConfig, LayerNorm, LayerNormConfig, Linear,
    LinearConfig,
};
use burn::prelude::*;

#[derive(Config, Debug)]
pub struct BertEncoderConfig {
    pub vocab_size: usize,
    /// Longest accepted sequence, also the number of learned positions.
    pub max_seq_length: usize,
    /// Must be divisible by `att_heads`.
    pub hidden_size: usize,
    pub output_units: usize,
    #[config(default = 2)]
    pub num_layers: usize,
    #[config(default = 4)]
    pub att_heads: usize,
    #[config(default = 0.1)]
    pub hidden_dropout: f64,
}

impl BertEncoderConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> BertEncoder<B> {
        let d_ff = 4 * self.hidden_size;
        BertEncoder {
            token_embedding: EmbeddingConfig::new(self.vocab_size, self.hidden_size).init(device),
            position_embedding: EmbeddingConfig::new(self.max_seq_length, self.hidden_size)
                .init(device),
            norm: LayerNormConfig::new(self.hidden_size).init(device),
            dropout: DropoutConfig::new(self.hidden_dropout).init(),
            transformer: TransformerEncoderConfig::new(
                self.hidden_size,
                d_ff,
                self.att_heads,
                self.num_layers,
            )
            .with_dropout(self.hidden_dropout)
            .init(device),
            output: LinearConfig::new(self.hidden_size, self.output_units).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct BertEncoder<B: Backend> {
    pub token_embedding: Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub norm: LayerNorm<B>,
    pub dropout: Dropout,
    pub transformer: TransformerEncoder<B>,
    pub output: Linear<B>,
}

impl<B: Backend> BertEncoder<B> {
    pub fn output_units(&self) -> usize {
        let [_hidden, output_units] = self.output.weight.dims();
        output_units
    }

    /// Padding tokens are masked out of attention and pooling.
    ///
    /// # Shapes
    ///   - Input [batch, sequence], with `sequence <= max_seq_length`
    ///   - Output [batch, output_units]
    pub fn forward(&self, tokens: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let [batch, sequence] = tokens.dims();
        let [max_seq_length, hidden] = self.position_embedding.weight.dims();
        assert!(
            sequence <= max_seq_length,
            "sequence of {sequence} tokens exceeds the {max_seq_length} learned positions"
        );
        let device = tokens.device();

        let pad_mask = tokens.clone().equal_elem(PAD_ID);
        let x = self.token_embedding.forward(tokens);
        debug_assert_eq!([batch, sequence, hidden], x.dims());

        let positions = Tensor::<B, 1, Int>::arange(0..sequence as i64, &device).unsqueeze::<2>();
        let positions = self
            .position_embedding
            .forward(positions)
            .expand([batch, sequence, hidden]);

        let x = self.dropout.forward(self.norm.forward(x + positions));
        let x = self
            .transformer
            .forward(TransformerEncoderInput::new(x).mask_pad(pad_mask.clone()));
        debug_assert_eq!([batch, sequence, hidden], x.dims());

        let pooled = masked_mean(x, pad_mask);
        self.output.forward(pooled)
    }
}
