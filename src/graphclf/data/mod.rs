//! Graph records, batching and feature preparation.

pub mod batch;
pub mod dataset;
pub mod features;
pub mod graph;

pub use batch::GraphBatch;
pub use dataset::{DatasetSource, GraphSplits, JsonDatasetSource};
pub use features::{FeatureBuilder, PresenceFlags};
pub use graph::GraphRecord;
