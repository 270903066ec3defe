use crate::encoder::{ApiEncoderConfig, BertEncoderConfig, CnnEncoderConfig, CodeEncoderConfig};
use crate::error::ReqVerError;
use burn::prelude::*;

/// Which architecture encodes the source code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum EncoderKind {
    /// Convolutions over token n-grams.
    #[default]
    #[serde(rename = "n-gram")]
    NGram,
    /// Function name, API-call sequence and body tokens.
    #[serde(rename = "api")]
    Api,
    /// Transformer encoder over the code tokens.
    #[serde(rename = "bert")]
    Bert,
}

impl EncoderKind {
    pub fn name(&self) -> &'static str {
        match self {
            EncoderKind::NGram => "n-gram",
            EncoderKind::Api => "api",
            EncoderKind::Bert => "bert",
        }
    }
}

impl std::str::FromStr for EncoderKind {
    type Err = ReqVerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "n-gram" => Ok(EncoderKind::NGram),
            "api" => Ok(EncoderKind::Api),
            "bert" => Ok(EncoderKind::Bert),
            other => Err(ReqVerError::InvalidConfig(format!(
                "unknown model `{other}`, expected one of n-gram, api, bert"
            ))),
        }
    }
}

/// Hyper-parameters of the whole dual encoder.
///
/// `desc_*` fields configure the description encoder, `sc_*` fields the source-code
/// encoder. Only the `sc_*` fields relevant to [`Self::model`] are used.
#[derive(Config, Debug)]
pub struct ReqVerConfig {
    #[config(default = "EncoderKind::NGram")]
    pub model: EncoderKind,

    /// Size of the shared embedding space.
    #[config(default = 128)]
    pub output_units: usize,

    #[config(default = 64)]
    pub desc_max_seq_len: usize,
    #[config(default = 2)]
    pub desc_bert_layers: usize,
    #[config(default = 128)]
    pub desc_bert_hidden_size: usize,
    #[config(default = 4)]
    pub desc_bert_heads: usize,

    #[config(default = 256)]
    pub sc_max_tok_len: usize,
    #[config(default = 16)]
    pub sc_max_fname_len: usize,
    #[config(default = 32)]
    pub sc_max_api_len: usize,
    /// Token embedding width of the n-gram and api encoders.
    #[config(default = 128)]
    pub emb_size: usize,

    /// One convolution is created per kernel size.
    #[config(default = "vec![2, 3, 4]")]
    pub sc_conv_kernel_sizes: Vec<usize>,
    #[config(default = 64)]
    pub sc_conv_n_filters: usize,

    /// Dropout shared by every encoder, the description encoder included.
    #[config(default = 0.1)]
    pub sc_dropout_rate: f64,

    #[config(default = 128)]
    pub sc_rnn_units: usize,
    #[config(default = 0.1)]
    pub sc_rnn_dropout_rate: f64,

    #[config(default = 2)]
    pub sc_bert_layers: usize,
    #[config(default = 128)]
    pub sc_bert_hidden_size: usize,
    #[config(default = 4)]
    pub sc_bert_heads: usize,
}

impl ReqVerConfig {
    /// Name of the joint model, e.g. `reqver_n-gram_model`.
    pub fn model_name(&self) -> String {
        format!("reqver_{}_model", self.model.name())
    }

    /// Rejects settings that cannot produce a working model.
    pub fn validate(&self) -> Result<(), ReqVerError> {
        let invalid = |msg: String| Err(ReqVerError::InvalidConfig(msg));
        if self.output_units == 0 {
            return invalid("output_units must be positive".into());
        }
        for (name, rate) in [
            ("sc_dropout_rate", self.sc_dropout_rate),
            ("sc_rnn_dropout_rate", self.sc_rnn_dropout_rate),
        ] {
            if !(0.0..1.0).contains(&rate) {
                return invalid(format!("{name} must be in [0, 1), got {rate}"));
            }
        }
        check_transformer(
            "desc",
            self.desc_max_seq_len,
            self.desc_bert_layers,
            self.desc_bert_hidden_size,
            self.desc_bert_heads,
        )?;
        match self.model {
            EncoderKind::NGram => {
                if self.emb_size == 0 || self.sc_conv_n_filters == 0 {
                    return invalid("emb_size and sc_conv_n_filters must be positive".into());
                }
                if self.sc_conv_kernel_sizes.is_empty() {
                    return invalid("sc_conv_kernel_sizes must not be empty".into());
                }
                for &k in &self.sc_conv_kernel_sizes {
                    if k == 0 || k > self.sc_max_tok_len {
                        return invalid(format!(
                            "kernel size {k} must be in 1..={}",
                            self.sc_max_tok_len
                        ));
                    }
                }
            }
            EncoderKind::Api => {
                if self.emb_size == 0 || self.sc_rnn_units == 0 {
                    return invalid("emb_size and sc_rnn_units must be positive".into());
                }
                if self.sc_max_fname_len == 0
                    || self.sc_max_api_len == 0
                    || self.sc_max_tok_len == 0
                {
                    return invalid("api encoder sequence lengths must be positive".into());
                }
            }
            EncoderKind::Bert => check_transformer(
                "sc",
                self.sc_max_tok_len,
                self.sc_bert_layers,
                self.sc_bert_hidden_size,
                self.sc_bert_heads,
            )?,
        }
        Ok(())
    }

    /// The description encoder is always transformer-based.
    pub fn desc_encoder_config(&self, desc_vocab_size: usize) -> BertEncoderConfig {
        BertEncoderConfig::new(
            desc_vocab_size,
            self.desc_max_seq_len,
            self.desc_bert_hidden_size,
            self.output_units,
        )
        .with_num_layers(self.desc_bert_layers)
        .with_att_heads(self.desc_bert_heads)
        .with_hidden_dropout(self.sc_dropout_rate)
    }

    pub fn sc_encoder_config(&self, sc_vocab_size: usize) -> CodeEncoderConfig {
        match self.model {
            EncoderKind::NGram => CodeEncoderConfig::NGram(
                CnnEncoderConfig::new(
                    sc_vocab_size,
                    self.sc_max_tok_len,
                    self.emb_size,
                    self.output_units,
                )
                .with_conv_kernel_sizes(self.sc_conv_kernel_sizes.clone())
                .with_conv_n_filters(self.sc_conv_n_filters)
                .with_dropout_rate(self.sc_dropout_rate),
            ),
            EncoderKind::Api => CodeEncoderConfig::Api(
                ApiEncoderConfig::new(sc_vocab_size, self.emb_size, self.output_units)
                    .with_max_fname_length(self.sc_max_fname_len)
                    .with_max_api_length(self.sc_max_api_len)
                    .with_max_tok_length(self.sc_max_tok_len)
                    .with_dropout_rate(self.sc_dropout_rate)
                    .with_lstm_units(self.sc_rnn_units)
                    .with_lstm_rec_dropout_rate(self.sc_rnn_dropout_rate),
            ),
            EncoderKind::Bert => CodeEncoderConfig::Bert(
                BertEncoderConfig::new(
                    sc_vocab_size,
                    self.sc_max_tok_len,
                    self.sc_bert_hidden_size,
                    self.output_units,
                )
                .with_num_layers(self.sc_bert_layers)
                .with_att_heads(self.sc_bert_heads)
                .with_hidden_dropout(self.sc_dropout_rate),
            ),
        }
    }
}

fn check_transformer(
    scope: &str,
    max_seq_len: usize,
    layers: usize,
    hidden: usize,
    heads: usize,
) -> Result<(), ReqVerError> {
    if max_seq_len == 0 || layers == 0 || hidden == 0 || heads == 0 {
        return Err(ReqVerError::InvalidConfig(format!(
            "{scope} transformer sizes must be positive"
        )));
    }
    if hidden % heads != 0 {
        return Err(ReqVerError::InvalidConfig(format!(
            "{scope} hidden size {hidden} is not divisible by {heads} heads"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ReqVerConfig::new();
        config.validate().unwrap();
        assert_eq!(config.model_name(), "reqver_n-gram_model");
    }

    #[test]
    fn rejects_inconsistent_settings() {
        let config = ReqVerConfig::new().with_sc_conv_kernel_sizes(vec![]);
        assert!(config.validate().is_err());

        let config = ReqVerConfig::new()
            .with_sc_max_tok_len(3)
            .with_sc_conv_kernel_sizes(vec![2, 5]);
        assert!(config.validate().is_err());

        let config = ReqVerConfig::new()
            .with_model(EncoderKind::Bert)
            .with_sc_bert_hidden_size(30)
            .with_sc_bert_heads(4);
        assert!(config.validate().is_err());

        let config = ReqVerConfig::new().with_sc_dropout_rate(1.0);
        assert!(config.validate().is_err());

        // kernel sizes are irrelevant for the api encoder
        let config = ReqVerConfig::new()
            .with_model(EncoderKind::Api)
            .with_sc_conv_kernel_sizes(vec![]);
        config.validate().unwrap();
    }

    #[test]
    fn encoder_kind_names() {
        for kind in [EncoderKind::NGram, EncoderKind::Api, EncoderKind::Bert] {
            assert_eq!(kind.name().parse::<EncoderKind>().unwrap(), kind);
        }
        assert!("lstm".parse::<EncoderKind>().is_err());
    }

    #[test]
    fn config_json_uses_model_names() {
        let config = ReqVerConfig::new().with_model(EncoderKind::Api);
        let json = config.to_string();
        assert!(json.contains("\"api\""));
        let back: ReqVerConfig = ReqVerConfig::load_binary(json.as_bytes()).unwrap();
        assert_eq!(back.model, EncoderKind::Api);
    }
}
