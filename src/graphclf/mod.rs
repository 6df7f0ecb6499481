//! Graph classification: data preparation, models and the training loop.

pub mod architectures;
pub mod data;
pub mod error;
pub mod settings;
pub mod train;

pub use error::{GraphClfError, Result};
