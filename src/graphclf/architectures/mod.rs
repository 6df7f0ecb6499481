//! Graph embedding networks, classifier head and their composition.

pub mod classifier;
pub mod embedding;
pub mod init;
pub mod mlp;

pub use classifier::{ClassifierConfig, ClassifierOutput, GraphClassifier};
pub use embedding::{EmbedGraphs, EmbeddingConfig, EmbeddingKind, GraphEmbedding};
pub use init::{SeededInit, SeededLinear};
pub use mlp::MlpClassifier;
