//! graphclf-rs: graph classification with structure2vec / DGCNN embeddings,
//! learning-rate trials and patience-based early stopping.

pub mod graphclf;

/// Small synthetic graphs and datasets for tests and benches.
pub mod test_utils;

pub use graphclf::architectures::{ClassifierConfig, EmbeddingKind, GraphClassifier};
pub use graphclf::data::{DatasetSource, FeatureBuilder, GraphRecord, GraphSplits, JsonDatasetSource};
pub use graphclf::error::{GraphClfError, Result};
pub use graphclf::settings::Settings;
pub use graphclf::train::{CheckpointStore, ResultWriter, TrainingConfig, TrainingController};
