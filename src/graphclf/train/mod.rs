//! Epoch loop, early stopping, checkpointing and the trial controller.

pub mod checkpoint;
pub mod controller;
pub mod early_stopping;
pub mod epoch;
pub mod report;

pub use checkpoint::{CheckpointStore, Improvement, TrialObserver};
pub use controller::{select_best_trial, winner_checkpoint, TrainingConfig, TrainingController, TrainingOutcome, TrialRecord};
pub use early_stopping::{EarlyStopping, EpochVerdict};
pub use epoch::{EpochAccumulator, EpochRunner, EpochStats};
pub use report::{ResultWriter, RunReport};
