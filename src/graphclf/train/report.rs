//! Append-only result and report files.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::graphclf::error::Result;

const REPORT_SEPARATOR: &str = "==========================";

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub seed: u64,
    pub fold: usize,
    pub trial: usize,
    pub learning_rate: f64,
    pub best_validation_loss: f64,
    pub epochs: usize,
    pub test_loss: f64,
    pub test_accuracy: f64,
}

impl RunReport {
    pub fn report_block(&self) -> String {
        format!(
            "Random {}, Fold {}\n\
             OPTIMAL TRIAL: {} (learning rate {})\n\
             OPTIMAL LOSS: {}\n\
             Number of epochs: {}\n\
             {}\n",
            self.seed,
            self.fold,
            self.trial,
            self.learning_rate,
            self.best_validation_loss,
            self.epochs,
            REPORT_SEPARATOR
        )
    }
}

#[derive(Debug, Clone)]
pub struct ResultWriter {
    result_file: PathBuf,
    report_file: PathBuf,
}

impl ResultWriter {
    pub fn new(result_file: impl Into<PathBuf>, report_file: impl Into<PathBuf>) -> Self {
        Self {
            result_file: result_file.into(),
            report_file: report_file.into(),
        }
    }

    /// One accuracy line to the result file, one block to the report file.
    pub fn persist(&self, report: &RunReport) -> Result<()> {
        append(&self.result_file, &format!("{}\n", report.test_accuracy))?;
        info!("Going to save parameters values");
        append(&self.report_file, &report.report_block())?;
        Ok(())
    }
}

fn append(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(text.as_bytes())?;
    Ok(())
}
