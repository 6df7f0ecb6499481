/// What the controller should do after an epoch's validation loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochVerdict {
    /// Strictly better than every earlier epoch; snapshot the parameters.
    Improved,
    /// Improved, and a patience of zero ends the trial right after the snapshot.
    ImprovedAndStop,
    NoImprovement,
    /// Patience exhausted; the trial ends here.
    Stop,
}

impl EpochVerdict {
    pub fn is_improvement(self) -> bool {
        matches!(self, Self::Improved | Self::ImprovedAndStop)
    }

    pub fn should_stop(self) -> bool {
        matches!(self, Self::ImprovedAndStop | Self::Stop)
    }
}

/// Patience-based early stopping on validation loss.
///
/// The counter of non-improving epochs is compared with the patience after
/// every observation, so a patience of zero ends the trial after its first epoch.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best_loss: f64,
    patience_count: usize,
    epochs: usize,
    improvements: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best_loss: f64::INFINITY,
            patience_count: 0,
            epochs: 0,
            improvements: 0,
        }
    }

    pub fn observe(&mut self, validation_loss: f64) -> EpochVerdict {
        self.epochs += 1;

        let improved = validation_loss < self.best_loss;
        if improved {
            self.best_loss = validation_loss;
            self.patience_count = 0;
            self.improvements += 1;
        } else {
            self.patience_count += 1;
        }

        let exhausted = self.patience_count >= self.patience;
        match (improved, exhausted) {
            (true, false) => EpochVerdict::Improved,
            (true, true) => EpochVerdict::ImprovedAndStop,
            (false, false) => EpochVerdict::NoImprovement,
            (false, true) => EpochVerdict::Stop,
        }
    }

    /// `f64::INFINITY` until the first observation that is not NaN.
    pub fn best_loss(&self) -> f64 {
        self.best_loss
    }

    pub fn epochs(&self) -> usize {
        self.epochs
    }

    pub fn improvements(&self) -> usize {
        self.improvements
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replay(losses: &[f64], patience: usize) -> (Vec<EpochVerdict>, EarlyStopping) {
        let mut stopping = EarlyStopping::new(patience);
        let mut verdicts = Vec::new();
        for &loss in losses {
            let verdict = stopping.observe(loss);
            verdicts.push(verdict);
            if verdict.should_stop() {
                break;
            }
        }
        (verdicts, stopping)
    }

    #[test]
    fn test_plateau_stops_after_patience() {
        let (verdicts, stopping) = replay(&[5.0, 4.0, 4.0, 4.0, 1.0], 2);
        assert_eq!(
            verdicts,
            vec![
                EpochVerdict::Improved,
                EpochVerdict::Improved,
                EpochVerdict::NoImprovement,
                EpochVerdict::Stop
            ]
        );
        assert_eq!(stopping.epochs(), 4);
        assert_eq!(stopping.improvements(), 2);
        assert_eq!(stopping.best_loss(), 4.0);
    }

    #[test]
    fn test_improvement_resets_patience() {
        let (verdicts, stopping) = replay(&[3.0, 3.5, 2.0, 2.5, 2.4], 2);
        assert_eq!(verdicts.last(), Some(&EpochVerdict::Stop));
        assert_eq!(stopping.epochs(), 5);
        assert_eq!(stopping.best_loss(), 2.0);
    }

    #[test]
    fn test_large_first_loss_still_improves() {
        let mut stopping = EarlyStopping::new(3);
        assert_eq!(stopping.observe(42.0), EpochVerdict::Improved);
    }

    #[test]
    fn test_nan_never_improves() {
        let mut stopping = EarlyStopping::new(1);
        assert_eq!(stopping.observe(f64::NAN), EpochVerdict::Stop);
        assert!(stopping.best_loss().is_infinite());
    }

    #[test]
    fn test_zero_patience_stops_after_first_improvement() {
        let (verdicts, stopping) = replay(&[5.0, 4.0, 3.0], 0);
        assert_eq!(verdicts, vec![EpochVerdict::ImprovedAndStop]);
        assert!(verdicts[0].is_improvement());
        assert_eq!(stopping.epochs(), 1);
        assert_eq!(stopping.improvements(), 1);
        assert_eq!(stopping.best_loss(), 5.0);
    }

    #[test]
    fn test_verdict_helpers() {
        assert!(EpochVerdict::Improved.is_improvement());
        assert!(!EpochVerdict::Improved.should_stop());
        assert!(!EpochVerdict::NoImprovement.is_improvement());
        assert!(!EpochVerdict::Stop.is_improvement());
        assert!(EpochVerdict::Stop.should_stop());
    }
}
