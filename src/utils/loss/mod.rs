mod cosine;

pub use cosine::{CosineLoss, CosineLossConfig};
