//! Checkpoint persistence, decoupled from the epoch loop.
//!
//! The controller reports every strict validation improvement to a
//! [`TrialObserver`]; the observer decides where the snapshot lives and how
//! to hand it back once the winning trial is known.

use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    module::{AutodiffModule, Module},
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::backend::AutodiffBackend,
};
use tracing::debug;

use crate::graphclf::architectures::classifier::GraphClassifier;
use crate::graphclf::error::{GraphClfError, Result};

/// Extension appended by the recorder.
pub const CHECKPOINT_EXTENSION: &str = "mpk";

/// A strict improvement of a trial's validation loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Improvement {
    pub trial: usize,
    pub epoch: usize,
    pub validation_loss: f64,
}

pub trait TrialObserver<B: AutodiffBackend> {
    /// Snapshot `model`; returns the checkpoint location recorded on the trial.
    fn on_improvement(&mut self, improvement: &Improvement, model: &GraphClassifier<B>) -> Result<PathBuf>;

    /// Load the snapshot `trial` took through
    /// [`on_improvement`](Self::on_improvement) into `template`, an
    /// evaluation-mode classifier of the same shape.
    fn restore(
        &self,
        trial: usize,
        checkpoint: &Path,
        template: GraphClassifier<B::InnerBackend>,
    ) -> Result<GraphClassifier<B::InnerBackend>>;
}

/// On-disk checkpoints named `<data>_<seed>_<fold>_<trial>`.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    folder: PathBuf,
    data: String,
    seed: u64,
    fold: usize,
}

impl CheckpointStore {
    pub fn new(folder: impl Into<PathBuf>, data: impl Into<String>, seed: u64, fold: usize) -> Self {
        Self {
            folder: folder.into(),
            data: data.into(),
            seed,
            fold,
        }
    }

    /// Path handed to the recorder, without the extension it appends.
    pub fn path(&self, trial: usize) -> PathBuf {
        self.folder
            .join(format!("{}_{}_{}_{}", self.data, self.seed, self.fold, trial))
    }

    /// File actually present on disk for `path`.
    pub fn file_on_disk(path: &Path) -> PathBuf {
        path.with_extension(CHECKPOINT_EXTENSION)
    }

    fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
        NamedMpkFileRecorder::new()
    }
}

impl<B: AutodiffBackend> TrialObserver<B> for CheckpointStore {
    fn on_improvement(&mut self, improvement: &Improvement, model: &GraphClassifier<B>) -> Result<PathBuf> {
        fs::create_dir_all(&self.folder)?;
        let path = self.path(improvement.trial);
        // the inner module holds the same parameters without the autodiff graph
        model.valid().save_file(path.clone(), &Self::recorder())?;
        debug!(
            "checkpoint for trial {} epoch {} written to {:?}",
            improvement.trial, improvement.epoch, path
        );
        Ok(path)
    }

    fn restore(
        &self,
        trial: usize,
        checkpoint: &Path,
        template: GraphClassifier<B::InnerBackend>,
    ) -> Result<GraphClassifier<B::InnerBackend>> {
        let file = Self::file_on_disk(checkpoint);
        if !file.exists() {
            return Err(GraphClfError::MissingCheckpoint { trial, path: file });
        }
        let device = template.head().device();
        Ok(template.load_file(checkpoint.to_path_buf(), &Self::recorder(), &device)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphclf::architectures::classifier::ClassifierConfig;
    use crate::graphclf::architectures::embedding::{EmbeddingConfig, EmbeddingKind};
    use crate::graphclf::data::graph::GraphRecord;
    use crate::test_utils::path_vs_cycle_graphs;
    use burn::backend::Autodiff;
    use burn::tensor::backend::Backend;
    use burn_ndarray::NdArray;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray<f32>>;
    type InnerBackend = NdArray<f32>;

    fn config() -> ClassifierConfig {
        let embedding = EmbeddingConfig::new(EmbeddingKind::MeanField, vec![8], 0, 3).with_max_lv(2);
        ClassifierConfig::new(embedding, 3, 8, 2)
    }

    #[test]
    fn test_path_naming() {
        let store = CheckpointStore::new("/tmp/models", "MUTAG", 3, 7);
        assert_eq!(store.path(2), PathBuf::from("/tmp/models/MUTAG_3_7_2"));
        assert_eq!(
            CheckpointStore::file_on_disk(&store.path(2)),
            PathBuf::from("/tmp/models/MUTAG_3_7_2.mpk")
        );
    }

    #[test]
    fn test_save_then_restore_reproduces_outputs() {
        let dir = TempDir::new().unwrap();
        let device = <TestBackend as Backend>::Device::default();
        let mut store = CheckpointStore::new(dir.path().join("nested"), "toy", 1, 0);

        let trained = config().init::<TestBackend>(5, &device).unwrap();
        let improvement = Improvement {
            trial: 0,
            epoch: 3,
            validation_loss: 0.4,
        };
        let path = TrialObserver::<TestBackend>::on_improvement(&mut store, &improvement, &trained).unwrap();
        assert!(CheckpointStore::file_on_disk(&path).exists());

        // a template built from a different seed starts from different weights
        let template = config().init::<InnerBackend>(99, &device).unwrap();
        let restored = TrialObserver::<TestBackend>::restore(&store, 0, &path, template).unwrap();

        let graphs = path_vs_cycle_graphs(3, 4);
        let batch: Vec<&GraphRecord> = graphs.iter().collect();
        let expected: Vec<f32> = trained.valid().forward(&batch).unwrap().output.into_data().iter::<f32>().collect();
        let actual: Vec<f32> = restored.forward(&batch).unwrap().output.into_data().iter::<f32>().collect();
        for (e, a) in expected.iter().zip(&actual) {
            assert_relative_eq!(*e, *a, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_restore_without_checkpoint_fails() {
        let dir = TempDir::new().unwrap();
        let device = <TestBackend as Backend>::Device::default();
        let store = CheckpointStore::new(dir.path(), "toy", 1, 0);
        let template = config().init::<InnerBackend>(1, &device).unwrap();

        let result = TrialObserver::<TestBackend>::restore(&store, 0, &store.path(0), template);
        assert!(matches!(result, Err(GraphClfError::MissingCheckpoint { .. })));
    }
}
