//! Joins the description and source-code encoders into one scoring model.

use crate::config::ReqVerConfig;
use crate::encoder::{BertEncoder, CodeEncoder, CodeInput};
use crate::error::ReqVerError;
use crate::text::{NUM_RESERVED, Vocab};
use crate::utils::l2_normalize;
use burn::prelude::*;

#[derive(Module, Debug)]
pub struct ReqVerModel<B: Backend> {
    pub desc_encoder: BertEncoder<B>,
    pub sc_encoder: CodeEncoder<B>,
}

impl ReqVerConfig {
    /// Validates the configuration and returns the initialized model.
    ///
    /// The vocabulary sizes count every id, the reserved ones included; a
    /// vocabulary holding nothing but the reserved ids is rejected.
    pub fn init<B: Backend>(
        &self,
        desc_vocab_size: usize,
        sc_vocab_size: usize,
        device: &B::Device,
    ) -> Result<ReqVerModel<B>, ReqVerError> {
        self.validate()?;
        if desc_vocab_size <= NUM_RESERVED {
            return Err(ReqVerError::EmptyVocab("desc"));
        }
        if sc_vocab_size <= NUM_RESERVED {
            return Err(ReqVerError::EmptyVocab("sc"));
        }
        tracing::debug!(
            name = %self.model_name(),
            desc_vocab_size,
            sc_vocab_size,
            "building model"
        );
        Ok(ReqVerModel {
            desc_encoder: self.desc_encoder_config(desc_vocab_size).init(device),
            sc_encoder: self.sc_encoder_config(sc_vocab_size).init(device),
        })
    }

    /// [`init`](Self::init) sized by the vocabularies the batcher encodes with.
    pub fn init_with_vocabs<B: Backend>(
        &self,
        desc_vocab: &Vocab,
        sc_vocab: &Vocab,
        device: &B::Device,
    ) -> Result<ReqVerModel<B>, ReqVerError> {
        self.init(desc_vocab.len(), sc_vocab.len(), device)
    }
}

impl<B: Backend> ReqVerModel<B> {
    /// Embeds descriptions alone.
    ///
    /// # Shapes
    ///   - Input [batch, desc_len]
    ///   - Output [batch, output_units]
    pub fn encode_desc(&self, desc: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        self.desc_encoder.forward(desc)
    }

    /// Embeds source code alone.
    ///
    /// # Shapes
    ///   - Output [batch, output_units]
    pub fn encode_code(&self, code: CodeInput<B>) -> Result<Tensor<B, 2>, ReqVerError> {
        self.sc_encoder.forward(code)
    }

    /// Cosine similarity of every description against every snippet of the batch.
    ///
    /// Entry `[i, j]` scores description `i` against snippet `j`; aligned pairs lie
    /// on the diagonal.
    ///
    /// # Shapes
    ///   - Input `desc` [batch, desc_len]
    ///   - Output [batch, batch]
    pub fn forward(
        &self,
        desc: Tensor<B, 2, Int>,
        code: CodeInput<B>,
    ) -> Result<Tensor<B, 2>, ReqVerError> {
        let [batch, _desc_len] = desc.dims();
        let (desc, code) = self.normalized_pair(desc, code)?;
        let [batch_code, _units] = code.dims();
        let similarity = desc.matmul(code.transpose());
        debug_assert_eq!([batch, batch_code], similarity.dims());
        Ok(similarity)
    }

    /// Cosine similarity of each description with its own snippet only.
    ///
    /// # Shapes
    ///   - Input `desc` [batch, desc_len]
    ///   - Output [batch]
    pub fn pair_scores(
        &self,
        desc: Tensor<B, 2, Int>,
        code: CodeInput<B>,
    ) -> Result<Tensor<B, 1>, ReqVerError> {
        let (desc, code) = self.normalized_pair(desc, code)?;
        Ok((desc * code).sum_dim(1).squeeze_dim::<1>(1))
    }

    fn normalized_pair(
        &self,
        desc: Tensor<B, 2, Int>,
        code: CodeInput<B>,
    ) -> Result<(Tensor<B, 2>, Tensor<B, 2>), ReqVerError> {
        let [batch, _desc_len] = desc.dims();
        assert_eq!(
            batch,
            code.batch_size(),
            "descriptions and snippets must be batched in pairs"
        );
        let desc = l2_normalize(self.encode_desc(desc));
        let code = l2_normalize(self.encode_code(code)?);
        assert_eq!(
            desc.dims()[1],
            code.dims()[1],
            "both encoders must project to the same output_units"
        );
        Ok((desc, code))
    }
}
