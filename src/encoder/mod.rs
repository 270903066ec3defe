mod api;
mod bert;
mod cnn;

pub use api::{ApiEncoder, ApiEncoderConfig};
pub use bert::{BertEncoder, BertEncoderConfig};
pub use cnn::{CnnEncoder, CnnEncoderConfig};

use crate::error::ReqVerError;
use burn::prelude::*;

/// Source-code encoder selected by [`EncoderKind`](crate::config::EncoderKind).
#[derive(Module, Debug)]
pub enum CodeEncoder<B: Backend> {
    NGram(CnnEncoder<B>),
    Api(ApiEncoder<B>),
    Bert(BertEncoder<B>),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum CodeEncoderConfig {
    NGram(CnnEncoderConfig),
    Api(ApiEncoderConfig),
    Bert(BertEncoderConfig),
}

impl CodeEncoderConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> CodeEncoder<B> {
        match self {
            CodeEncoderConfig::NGram(config) => CodeEncoder::NGram(config.init(device)),
            CodeEncoderConfig::Api(config) => CodeEncoder::Api(config.init(device)),
            CodeEncoderConfig::Bert(config) => CodeEncoder::Bert(config.init(device)),
        }
    }
}

/// Batched source-code input, shaped for one of the encoders.
#[derive(Clone, Debug)]
pub enum CodeInput<B: Backend> {
    /// Body tokens, for the n-gram and transformer encoders.
    ///
    /// # Shape
    /// [batch, tok_len]
    Tokens(Tensor<B, 2, Int>),
    /// The three views of the api encoder.
    ///
    /// # Shapes
    /// [batch, fname_len], [batch, api_len], [batch, tok_len]
    Api {
        fnames: Tensor<B, 2, Int>,
        apis: Tensor<B, 2, Int>,
        tokens: Tensor<B, 2, Int>,
    },
}

impl<B: Backend> CodeInput<B> {
    pub fn batch_size(&self) -> usize {
        match self {
            CodeInput::Tokens(tokens) | CodeInput::Api { tokens, .. } => tokens.dims()[0],
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            CodeInput::Tokens(_) => "token",
            CodeInput::Api { .. } => "api",
        }
    }
}

impl<B: Backend> CodeEncoder<B> {
    pub fn name(&self) -> &'static str {
        match self {
            CodeEncoder::NGram(_) => "n-gram",
            CodeEncoder::Api(_) => "api",
            CodeEncoder::Bert(_) => "bert",
        }
    }

    pub fn output_units(&self) -> usize {
        match self {
            CodeEncoder::NGram(encoder) => encoder.output_units(),
            CodeEncoder::Api(encoder) => encoder.output_units(),
            CodeEncoder::Bert(encoder) => encoder.output_units(),
        }
    }

    /// # Shapes
    ///   - Output [batch, output_units]
    pub fn forward(&self, input: CodeInput<B>) -> Result<Tensor<B, 2>, ReqVerError> {
        match (self, input) {
            (CodeEncoder::NGram(encoder), CodeInput::Tokens(tokens)) => Ok(encoder.forward(tokens)),
            (CodeEncoder::Bert(encoder), CodeInput::Tokens(tokens)) => Ok(encoder.forward(tokens)),
            (
                CodeEncoder::Api(encoder),
                CodeInput::Api {
                    fnames,
                    apis,
                    tokens,
                },
            ) => Ok(encoder.forward(fnames, apis, tokens)),
            (encoder, input) => Err(ReqVerError::InputMismatch {
                encoder: encoder.name(),
                input: input.kind(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn dispatches_on_the_configured_encoder() {
        let device = Default::default();
        let encoder = CodeEncoderConfig::Bert(
            BertEncoderConfig::new(10, 4, 8, 3).with_num_layers(1).with_att_heads(2),
        )
        .init::<TestBackend>(&device);
        assert_eq!(encoder.name(), "bert");
        assert_eq!(encoder.output_units(), 3);

        let tokens = Tensor::<TestBackend, 2, Int>::from_ints([[2, 3, 0, 0]], &device);
        let out = encoder.forward(CodeInput::Tokens(tokens.clone())).unwrap();
        assert_eq!(out.dims(), [1, 3]);

        let input = CodeInput::Api {
            fnames: tokens.clone(),
            apis: tokens.clone(),
            tokens,
        };
        assert_eq!(input.batch_size(), 1);
        assert!(matches!(
            encoder.forward(input),
            Err(ReqVerError::InputMismatch {
                encoder: "bert",
                input: "api"
            })
        ));
    }

    #[test]
    fn api_encoder_rejects_plain_tokens() {
        let device = Default::default();
        let encoder =
            CodeEncoderConfig::Api(ApiEncoderConfig::new(10, 4, 3)).init::<TestBackend>(&device);
        let tokens = Tensor::<TestBackend, 2, Int>::from_ints([[2, 3]], &device);
        assert!(encoder.forward(CodeInput::Tokens(tokens)).is_err());
    }
}
