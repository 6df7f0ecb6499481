//! Error type shared by every stage of the pipeline.
//!
//! Nothing here is retried: each variant is a hard stop for the run.

use burn::record::RecorderError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphClfError>;

#[derive(Debug, Error)]
pub enum GraphClfError {
    #[error("unknown gm {0}")]
    UnknownModel(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unsupported device mode '{0}' for this build")]
    UnsupportedDevice(String),

    #[error("node tag {tag} of graph {graph} is outside [0, {feat_dim})")]
    TagOutOfRange {
        graph: usize,
        tag: usize,
        feat_dim: usize,
    },

    #[error(
        "graph {graph} disagrees with the batch on node {field} presence \
         (expected present = {expected})"
    )]
    MixedPresence {
        graph: usize,
        field: &'static str,
        expected: bool,
    },

    #[error("graph {graph}: {detail}")]
    MalformedGraph { graph: usize, detail: String },

    #[error("cannot build features for an empty batch")]
    EmptyBatch,

    #[error("evaluation processed {processed} samples, expected {expected}")]
    SampleCountMismatch { processed: usize, expected: usize },

    #[error("non-finite loss {loss} at batch {batch}")]
    NonFiniteLoss { batch: usize, loss: f32 },

    #[error("no learning-rate trials were configured")]
    NoTrials,

    #[error("trial {trial} never improved on the validation set, no checkpoint was written")]
    NoCheckpoint { trial: usize },

    #[error("checkpoint of trial {trial} not found at {path:?}")]
    MissingCheckpoint { trial: usize, path: PathBuf },

    #[error("checkpoint recorder failure: {0}")]
    Recorder(#[from] RecorderError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("dataset parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Settings(#[from] config::ConfigError),
}
