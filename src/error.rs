use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReqVerError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The code input variant does not fit the configured source-code encoder.
    #[error("the {encoder} encoder cannot consume {input} input")]
    InputMismatch {
        encoder: &'static str,
        input: &'static str,
    },

    /// Only the reserved tokens are present.
    #[error("vocabulary `{0}` is empty")]
    EmptyVocab(&'static str),

    #[error("dataset `{0}` is empty")]
    EmptyDataset(&'static str),

    #[error("queries have {query} units but the index stores {index}")]
    WidthMismatch { query: usize, index: usize },

    #[error("failed to read {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path:?}:{line}: malformed record")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to (de)serialize json")]
    Json(#[from] serde_json::Error),

    #[error("tensor data conversion failed: {0:?}")]
    TensorData(burn::tensor::DataError),
}

impl From<burn::tensor::DataError> for ReqVerError {
    fn from(err: burn::tensor::DataError) -> Self {
        ReqVerError::TensorData(err)
    }
}
