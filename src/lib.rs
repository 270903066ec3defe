pub mod config;
pub mod data;
pub mod encoder;
pub mod error;
pub mod model;
pub mod retrieval;
pub mod text;
pub mod training;
pub mod utils;

pub mod prelude {
    pub use crate::config::{EncoderKind, ReqVerConfig};
    pub use crate::data::{ReqVerBatch, ReqVerBatcher, ReqVerDataset, ReqVerItem, build_vocabs};
    pub use crate::encoder::*;
    pub use crate::error::ReqVerError;
    pub use crate::model::ReqVerModel;
    pub use crate::retrieval::{Hit, RetrievalIndex};
    pub use crate::text::{Vocab, tokenize};
    pub use crate::training::{EpochSummary, ReqVerOutput, TrainingConfig};
}
