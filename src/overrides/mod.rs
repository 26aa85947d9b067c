//! Override extraction and classification

pub mod nested;
pub mod normalizer;

pub use nested::ApplicableNested;
pub use normalizer::{normalize, NormalizeError};
