//! Requirement/code pairs, their dataset and batcher.

use crate::config::{EncoderKind, ReqVerConfig};
use crate::encoder::CodeInput;
use crate::error::ReqVerError;
use crate::text::{Vocab, tokenize};
use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::{Dataset, InMemDataset};
use burn::prelude::*;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

/// A description paired with the code that implements it.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReqVerItem {
    pub desc: String,
    pub code: String,
    /// Name of the implementing function, used by the api encoder.
    #[serde(default)]
    pub fname: Option<String>,
    /// API calls made by the code, in call order, used by the api encoder.
    #[serde(default)]
    pub apis: Vec<String>,
}

impl ReqVerItem {
    pub fn new(desc: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            desc: desc.into(),
            code: code.into(),
            fname: None,
            apis: Vec::new(),
        }
    }

    pub fn with_fname(mut self, fname: impl Into<String>) -> Self {
        self.fname = Some(fname.into());
        self
    }

    pub fn with_apis<S: Into<String>>(mut self, apis: impl IntoIterator<Item = S>) -> Self {
        self.apis = apis.into_iter().map(Into::into).collect();
        self
    }

    fn api_tokens(&self) -> Vec<String> {
        self.apis.iter().flat_map(|api| tokenize(api)).collect()
    }
}

/// In-memory pairs, cheap to clone.
#[derive(Clone)]
pub struct ReqVerDataset {
    dataset: Arc<InMemDataset<ReqVerItem>>,
}

impl ReqVerDataset {
    pub fn new(items: Vec<ReqVerItem>) -> Self {
        Self {
            dataset: Arc::new(InMemDataset::new(items)),
        }
    }

    /// Reads one json-encoded [`ReqVerItem`] per line, skipping blank lines.
    pub fn from_jsonl(path: impl AsRef<Path>) -> Result<Self, ReqVerError> {
        let path = path.as_ref();
        let io_err = |source| ReqVerError::Io {
            path: path.into(),
            source,
        };
        let file = std::fs::File::open(path).map_err(io_err)?;
        let mut items = Vec::new();
        for (i, line) in std::io::BufReader::new(file).lines().enumerate() {
            let line = line.map_err(io_err)?;
            if line.trim().is_empty() {
                continue;
            }
            let item = serde_json::from_str(&line).map_err(|source| ReqVerError::Parse {
                path: path.into(),
                line: i + 1,
                source,
            })?;
            items.push(item);
        }
        tracing::debug!(?path, items = items.len(), "loaded dataset");
        Ok(Self::new(items))
    }

    /// Splits off the last `fraction` of the items, e.g. for validation.
    pub fn split(self, fraction: f64) -> (Self, Self) {
        let mut items = self.to_vec();
        let tail = ((items.len() as f64) * fraction.clamp(0.0, 1.0)).round() as usize;
        let rest = items.split_off(items.len() - tail);
        (Self::new(items), Self::new(rest))
    }

    pub fn to_vec(&self) -> Vec<ReqVerItem> {
        self.dataset.iter().collect()
    }
}

impl std::fmt::Debug for ReqVerDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqVerDataset")
            .field("len", &self.dataset.len())
            .finish()
    }
}

impl Dataset<ReqVerItem> for ReqVerDataset {
    fn get(&self, index: usize) -> Option<ReqVerItem> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

/// Builds the description and source-code vocabularies.
///
/// The source-code vocabulary covers body tokens, function names and api calls,
/// since the api encoder embeds all three with one table.
pub fn build_vocabs(items: &[ReqVerItem], min_count: usize, max_size: usize) -> (Vocab, Vocab) {
    let desc_docs: Vec<Vec<String>> = items.iter().map(|item| tokenize(&item.desc)).collect();
    let sc_docs: Vec<Vec<String>> = items
        .iter()
        .map(|item| {
            let mut tokens = tokenize(&item.code);
            if let Some(fname) = &item.fname {
                tokens.extend(tokenize(fname));
            }
            tokens.extend(item.api_tokens());
            tokens
        })
        .collect();
    let desc_vocab = Vocab::build(desc_docs.iter().map(Vec::as_slice), min_count, max_size);
    let sc_vocab = Vocab::build(sc_docs.iter().map(Vec::as_slice), min_count, max_size);
    (desc_vocab, sc_vocab)
}

#[derive(Clone, Debug)]
pub struct ReqVerBatch<B: Backend> {
    /// # Shape
    /// [batch_size, desc_max_seq_len]
    pub desc: Tensor<B, 2, Int>,
    pub code: CodeInput<B>,
}

/// Turns items into padded id tensors.
#[derive(Clone, Debug)]
pub struct ReqVerBatcher {
    pub model: EncoderKind,
    pub desc_vocab: Arc<Vocab>,
    pub sc_vocab: Arc<Vocab>,
    pub desc_max_seq_len: usize,
    pub sc_max_tok_len: usize,
    pub sc_max_fname_len: usize,
    pub sc_max_api_len: usize,
}

impl ReqVerBatcher {
    pub fn new(config: &ReqVerConfig, desc_vocab: Arc<Vocab>, sc_vocab: Arc<Vocab>) -> Self {
        Self {
            model: config.model,
            desc_vocab,
            sc_vocab,
            desc_max_seq_len: config.desc_max_seq_len,
            sc_max_tok_len: config.sc_max_tok_len,
            sc_max_fname_len: config.sc_max_fname_len,
            sc_max_api_len: config.sc_max_api_len,
        }
    }

    /// Encodes descriptions alone, e.g. retrieval queries.
    pub fn desc_tensor<B: Backend>(&self, descs: &[&str], device: &B::Device) -> Tensor<B, 2, Int> {
        let rows = descs
            .iter()
            .map(|desc| self.desc_vocab.encode(&tokenize(desc), self.desc_max_seq_len))
            .collect();
        ids_tensor(rows, self.desc_max_seq_len, device)
    }

    /// Encodes code alone, e.g. to fill a retrieval index.
    pub fn code_input<B: Backend>(&self, items: &[ReqVerItem], device: &B::Device) -> CodeInput<B> {
        let encode = |tokens: Vec<String>, max_len| self.sc_vocab.encode(&tokens, max_len);
        let tokens = items
            .iter()
            .map(|item| encode(tokenize(&item.code), self.sc_max_tok_len))
            .collect();
        let tokens = ids_tensor(tokens, self.sc_max_tok_len, device);
        match self.model {
            EncoderKind::NGram | EncoderKind::Bert => CodeInput::Tokens(tokens),
            EncoderKind::Api => {
                let fnames = items
                    .iter()
                    .map(|item| {
                        let fname = item.fname.as_deref().map(tokenize).unwrap_or_default();
                        encode(fname, self.sc_max_fname_len)
                    })
                    .collect();
                let apis = items
                    .iter()
                    .map(|item| encode(item.api_tokens(), self.sc_max_api_len))
                    .collect();
                CodeInput::Api {
                    fnames: ids_tensor(fnames, self.sc_max_fname_len, device),
                    apis: ids_tensor(apis, self.sc_max_api_len, device),
                    tokens,
                }
            }
        }
    }
}

impl<B: Backend> Batcher<B, ReqVerItem, ReqVerBatch<B>> for ReqVerBatcher {
    fn batch(&self, items: Vec<ReqVerItem>, device: &B::Device) -> ReqVerBatch<B> {
        let descs: Vec<&str> = items.iter().map(|item| item.desc.as_str()).collect();
        ReqVerBatch {
            desc: self.desc_tensor(&descs, device),
            code: self.code_input(&items, device),
        }
    }
}

fn ids_tensor<B: Backend>(rows: Vec<Vec<i64>>, width: usize, device: &B::Device) -> Tensor<B, 2, Int> {
    let batch = rows.len();
    let ids: Vec<i64> = rows.into_iter().flatten().collect();
    debug_assert_eq!(batch * width, ids.len());
    let data = TensorData::new(ids, [batch, width]).convert::<B::IntElem>();
    Tensor::from_data(data, device)
}
