//! Learning-rate trials, model selection and final test evaluation.
//!
//! ```text
//! for each learning rate (trial):
//!     fresh classifier + Adam
//!     for epoch in 0..num_epochs:
//!         shuffle train indices, train one epoch, evaluate validation
//!         improved -> observer snapshot | patience exhausted -> stop trial
//! pick the first trial with the lowest best validation loss
//! restore its snapshot into a fresh evaluation-mode classifier
//! evaluate on test, persist result line and report block
//! ```

use std::path::PathBuf;

use burn::{
    config::Config,
    module::AutodiffModule,
    optim::AdamConfig,
    tensor::backend::AutodiffBackend,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{info, warn};

use super::checkpoint::{Improvement, TrialObserver};
use super::early_stopping::EarlyStopping;
use super::epoch::{EpochRunner, EpochStats};
use super::report::{ResultWriter, RunReport};
use crate::graphclf::architectures::classifier::{ClassifierConfig, GraphClassifier};
use crate::graphclf::data::dataset::GraphSplits;
use crate::graphclf::error::{GraphClfError, Result as ClfResult};

/// Every RNG of a run is seeded with `seed * SEED_MULTIPLIER`.
pub const SEED_MULTIPLIER: u64 = 10;

#[derive(Config, Debug)]
pub struct TrainingConfig {
    pub classifier: ClassifierConfig,
    /// One trial per entry, in order.
    pub learning_rates: Vec<f64>,
    #[config(default = 50)]
    pub batch_size: usize,
    #[config(default = 1000)]
    pub num_epochs: usize,
    #[config(default = 10)]
    pub patience: usize,
    #[config(default = 1)]
    pub seed: u64,
    #[config(default = 1)]
    pub fold: usize,
}

impl TrainingConfig {
    pub fn effective_seed(&self) -> u64 {
        self.seed.wrapping_mul(SEED_MULTIPLIER)
    }
}

/// Outcome of one learning-rate trial.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialRecord {
    pub learning_rate: f64,
    pub best_loss: f64,
    pub epochs: usize,
    /// Validation loss of every epoch run, in order.
    pub validation_losses: Vec<f64>,
    /// Last snapshot written for this trial, `None` if it never improved.
    pub checkpoint: Option<PathBuf>,
}

/// Index of the first trial holding the minimum best loss.
pub fn select_best_trial(trials: &[TrialRecord]) -> ClfResult<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, trial) in trials.iter().enumerate() {
        match best {
            Some((_, loss)) if !(trial.best_loss < loss) => {}
            _ => best = Some((index, trial.best_loss)),
        }
    }
    best.map(|(index, _)| index).ok_or(GraphClfError::NoTrials)
}

/// Snapshot of the selected trial; a trial without one cannot be restored.
pub fn winner_checkpoint(trials: &[TrialRecord], best_trial: usize) -> ClfResult<PathBuf> {
    trials
        .get(best_trial)
        .and_then(|trial| trial.checkpoint.clone())
        .ok_or(GraphClfError::NoCheckpoint { trial: best_trial })
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub trials: Vec<TrialRecord>,
    pub best_trial: usize,
    pub test: EpochStats,
}

impl TrainingOutcome {
    pub fn report(&self, config: &TrainingConfig) -> RunReport {
        let winner = &self.trials[self.best_trial];
        RunReport {
            seed: config.seed,
            fold: config.fold,
            trial: self.best_trial,
            learning_rate: winner.learning_rate,
            best_validation_loss: winner.best_loss,
            epochs: winner.epochs,
            test_loss: self.test.loss,
            test_accuracy: self.test.accuracy,
        }
    }
}

pub struct TrainingController {
    config: TrainingConfig,
    runner: EpochRunner,
}

impl TrainingController {
    pub fn new(config: TrainingConfig) -> ClfResult<Self> {
        if config.learning_rates.is_empty() {
            return Err(GraphClfError::NoTrials);
        }
        if let Some(lr) = config.learning_rates.iter().find(|lr| !(**lr > 0.0) || !lr.is_finite()) {
            return Err(GraphClfError::InvalidConfig(format!(
                "learning rate must be positive and finite, got {lr}"
            )));
        }
        let runner = EpochRunner::new(config.batch_size)?;
        Ok(Self { config, runner })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Runs one trial to completion and reports every improvement to `observer`.
    pub fn run_trial<B, O>(
        &self,
        trial: usize,
        learning_rate: f64,
        splits: &GraphSplits,
        observer: &mut O,
        device: &B::Device,
    ) -> ClfResult<TrialRecord>
    where
        B: AutodiffBackend,
        O: TrialObserver<B>,
    {
        let seed = self.config.effective_seed();
        let mut rng = StdRng::seed_from_u64(seed);

        let mut model = self.config.classifier.init::<B>(seed, device)?;
        let mut optimizer = AdamConfig::new().init::<B, GraphClassifier<B>>();

        let mut train_indices: Vec<usize> = (0..splits.train.len()).collect();
        let validation_indices: Vec<usize> = (0..splits.validation.len()).collect();

        let mut stopping = EarlyStopping::new(self.config.patience);
        let mut checkpoint = None;
        let mut validation_losses = Vec::new();

        info!("trial {} with learning rate {}", trial, learning_rate);
        for epoch in 0..self.config.num_epochs {
            train_indices.shuffle(&mut rng);
            let (trained, train_stats) =
                self.runner
                    .train(model, &mut optimizer, learning_rate, &splits.train, &train_indices)?;
            model = trained;
            info!(
                "average training of epoch {}: loss {:.5} acc {:.5}",
                epoch, train_stats.loss, train_stats.accuracy
            );

            let validation_stats = self
                .runner
                .evaluate(&model.valid(), &splits.validation, &validation_indices)?;
            info!(
                "average validation of epoch {}: loss {:.5} acc {:.5}",
                epoch, validation_stats.loss, validation_stats.accuracy
            );

            validation_losses.push(validation_stats.loss);

            let verdict = stopping.observe(validation_stats.loss);
            if verdict.is_improvement() {
                let improvement = Improvement {
                    trial,
                    epoch,
                    validation_loss: validation_stats.loss,
                };
                checkpoint = Some(observer.on_improvement(&improvement, &model)?);
            }
            if verdict.should_stop() {
                info!(
                    "trial {} stopped early after {} epochs (patience {})",
                    trial,
                    stopping.epochs(),
                    self.config.patience
                );
                break;
            }
        }

        if checkpoint.is_none() {
            warn!("trial {} never improved its validation loss", trial);
        }

        Ok(TrialRecord {
            learning_rate,
            best_loss: stopping.best_loss(),
            epochs: stopping.epochs(),
            validation_losses,
            checkpoint,
        })
    }

    /// Every trial, selection of the winner and its test evaluation.
    pub fn run<B, O>(&self, splits: &GraphSplits, observer: &mut O, device: &B::Device) -> ClfResult<TrainingOutcome>
    where
        B: AutodiffBackend,
        O: TrialObserver<B>,
    {
        info!("# train: {}, # test: {}", splits.train.len(), splits.test.len());
        info!("Patience value: {}", self.config.patience);

        let mut trials = Vec::with_capacity(self.config.learning_rates.len());
        for (trial, &learning_rate) in self.config.learning_rates.iter().enumerate() {
            trials.push(self.run_trial::<B, O>(trial, learning_rate, splits, observer, device)?);
        }

        let best_trial = select_best_trial(&trials)?;
        let winner = &trials[best_trial];
        info!(
            "selected trial {} (learning rate {}, validation loss {:.5})",
            best_trial, winner.learning_rate, winner.best_loss
        );

        let checkpoint = winner_checkpoint(&trials, best_trial)?;
        let template = self
            .config
            .classifier
            .init::<B::InnerBackend>(self.config.effective_seed(), device)?;
        let model = observer.restore(best_trial, &checkpoint, template)?;

        let test_indices: Vec<usize> = (0..splits.test.len()).collect();
        let test = self.runner.evaluate(&model, &splits.test, &test_indices)?;
        info!("test: loss {:.5} acc {:.5}", test.loss, test.accuracy);

        Ok(TrainingOutcome {
            trials,
            best_trial,
            test,
        })
    }

    /// [`run`](Self::run), then append the result line and report block.
    pub fn run_and_persist<B, O>(
        &self,
        splits: &GraphSplits,
        observer: &mut O,
        writer: &ResultWriter,
        device: &B::Device,
    ) -> ClfResult<TrainingOutcome>
    where
        B: AutodiffBackend,
        O: TrialObserver<B>,
    {
        let outcome = self.run::<B, O>(splits, observer, device)?;
        writer.persist(&outcome.report(&self.config))?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphclf::architectures::embedding::{EmbeddingConfig, EmbeddingKind};

    fn record(best_loss: f64) -> TrialRecord {
        TrialRecord {
            learning_rate: 0.01,
            best_loss,
            epochs: 3,
            validation_losses: vec![best_loss; 3],
            checkpoint: None,
        }
    }

    fn config(learning_rates: Vec<f64>) -> TrainingConfig {
        let embedding = EmbeddingConfig::new(EmbeddingKind::MeanField, vec![4], 0, 3);
        TrainingConfig::new(ClassifierConfig::new(embedding, 3, 4, 2), learning_rates)
    }

    #[test]
    fn test_selection_prefers_first_minimum() {
        let trials = vec![record(0.5), record(0.3), record(0.3)];
        assert_eq!(select_best_trial(&trials).unwrap(), 1);
    }

    #[test]
    fn test_selection_skips_never_improved_trials() {
        let trials = vec![record(f64::INFINITY), record(0.9)];
        assert_eq!(select_best_trial(&trials).unwrap(), 1);
    }

    #[test]
    fn test_winner_without_checkpoint_is_reported() {
        let mut trials = vec![record(0.5), record(0.3)];
        trials[0].checkpoint = Some(PathBuf::from("models/toy_1_1_0"));

        assert_eq!(winner_checkpoint(&trials, 0).unwrap(), PathBuf::from("models/toy_1_1_0"));
        let err = winner_checkpoint(&trials, 1).unwrap_err();
        assert!(matches!(err, GraphClfError::NoCheckpoint { trial: 1 }));
        assert_eq!(
            err.to_string(),
            "trial 1 never improved on the validation set, no checkpoint was written"
        );
    }

    #[test]
    fn test_selection_of_nothing_fails() {
        assert!(matches!(select_best_trial(&[]), Err(GraphClfError::NoTrials)));
    }

    #[test]
    fn test_controller_rejects_bad_learning_rates() {
        assert!(matches!(
            TrainingController::new(config(vec![])),
            Err(GraphClfError::NoTrials)
        ));
        assert!(matches!(
            TrainingController::new(config(vec![0.01, -1.0])),
            Err(GraphClfError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_seed_is_spread() {
        assert_eq!(config(vec![0.1]).with_seed(3).effective_seed(), 30);
    }

    #[test]
    fn test_report_uses_winner() {
        let cfg = config(vec![0.1, 0.01]).with_seed(2).with_fold(4);
        let outcome = TrainingOutcome {
            trials: vec![
                TrialRecord { learning_rate: 0.1, best_loss: 0.8, epochs: 5, ..record(0.8) },
                TrialRecord { learning_rate: 0.01, best_loss: 0.4, epochs: 9, ..record(0.4) },
            ],
            best_trial: 1,
            test: EpochStats { loss: 0.5, accuracy: 0.75, last_batch_accuracy: 1.0, samples: 4 },
        };
        let report = outcome.report(&cfg);
        assert_eq!(report.trial, 1);
        assert_eq!(report.epochs, 9);
        assert_eq!(report.learning_rate, 0.01);
        assert_eq!((report.seed, report.fold), (2, 4));
        assert_eq!(report.test_accuracy, 0.75);
    }
}
