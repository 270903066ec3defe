//! API-call-sequence encoder.
//!
//! A snippet is seen through three views sharing one token embedding: its
//! function name, the ordered sequence of API calls it makes, and the bag of
//! its body tokens. Only the API sequence is order-aware (through an LSTM).
//! Padding is excluded from every view, so a snippet encodes the same whatever
//! the configured maximum lengths.
//!
//! References:
//! - https://guxd.github.io/papers/deepcs.pdf

use crate::text::PAD_ID;
use crate::utils::{masked_max_over_time, masked_mean};
use burn::nn::{
    Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig, Lstm, LstmConfig,
};
use burn::prelude::*;

#[derive(Config, Debug)]
pub struct ApiEncoderConfig {
    pub vocab_size: usize,
    pub emb_size: usize,
    pub output_units: usize,
    #[config(default = 16)]
    pub max_fname_length: usize,
    #[config(default = 32)]
    pub max_api_length: usize,
    #[config(default = 256)]
    pub max_tok_length: usize,
    /// Applied to the concatenated views.
    #[config(default = 0.1)]
    pub dropout_rate: f64,
    #[config(default = 128)]
    pub lstm_units: usize,
    /// Applied to the LSTM outputs of every step.
    #[config(default = 0.1)]
    pub lstm_rec_dropout_rate: f64,
}

impl ApiEncoderConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ApiEncoder<B> {
        let joint_size = self.emb_size + self.lstm_units + self.emb_size;
        ApiEncoder {
            embedding: EmbeddingConfig::new(self.vocab_size, self.emb_size).init(device),
            lstm: LstmConfig::new(self.emb_size, self.lstm_units, true).init(device),
            lstm_dropout: DropoutConfig::new(self.lstm_rec_dropout_rate).init(),
            dropout: DropoutConfig::new(self.dropout_rate).init(),
            output: LinearConfig::new(joint_size, self.output_units).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct ApiEncoder<B: Backend> {
    pub embedding: Embedding<B>,
    pub lstm: Lstm<B>,
    pub lstm_dropout: Dropout,
    pub dropout: Dropout,
    pub output: Linear<B>,
}

impl<B: Backend> ApiEncoder<B> {
    pub fn output_units(&self) -> usize {
        let [_joint, output_units] = self.output.weight.dims();
        output_units
    }

    /// # Shapes
    ///   - Input `fnames` [batch, fname_len]
    ///   - Input `apis` [batch, api_len]
    ///   - Input `tokens` [batch, tok_len]
    ///   - Output [batch, output_units]
    pub fn forward(
        &self,
        fnames: Tensor<B, 2, Int>,
        apis: Tensor<B, 2, Int>,
        tokens: Tensor<B, 2, Int>,
    ) -> Tensor<B, 2> {
        let [batch, _fname_len] = fnames.dims();
        let [batch_, api_len] = apis.dims();
        let [batch__, _tok_len] = tokens.dims();
        assert_eq!(batch, batch_);
        assert_eq!(batch, batch__);
        let [_vocab, emb_size] = self.embedding.weight.dims();

        let fname = self.bag_of_tokens(fnames);
        let tokens = self.bag_of_tokens(tokens);

        let api_pad_mask = apis.clone().equal_elem(PAD_ID);
        let x = self.embedding.forward(apis);
        let (x, _state) = self.lstm.forward(x, None);
        let [_batch, _api_len, lstm_units] = x.dims();
        debug_assert_eq!([batch, api_len, lstm_units], x.dims());
        let x = self.lstm_dropout.forward(x);
        // apis are left-aligned, so the outputs kept never saw padding
        let api = masked_max_over_time(x, api_pad_mask);
        debug_assert_eq!([batch, lstm_units], api.dims());

        let x = Tensor::cat(vec![fname, api, tokens], 1);
        debug_assert_eq!([batch, emb_size + lstm_units + emb_size], x.dims());
        let x = self.dropout.forward(x);
        self.output.forward(x)
    }

    fn bag_of_tokens(&self, ids: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let pad_mask = ids.clone().equal_elem(PAD_ID);
        masked_mean(self.embedding.forward(ids), pad_mask)
    }
}
