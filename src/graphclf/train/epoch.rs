//! One pass over a dataset, in training or evaluation mode.

use burn::{
    optim::{GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion,
    },
};
use tracing::debug;

use crate::graphclf::architectures::classifier::GraphClassifier;
use crate::graphclf::data::graph::GraphRecord;
use crate::graphclf::error::{GraphClfError, Result};

/// Aggregate of one epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochStats {
    /// Sample-weighted mean loss.
    pub loss: f64,
    /// Sample-weighted mean accuracy.
    pub accuracy: f64,
    /// Raw accuracy of the final batch.
    pub last_batch_accuracy: f32,
    pub samples: usize,
}

/// Running sums weighted by batch size.
#[derive(Debug, Default, Clone)]
pub struct EpochAccumulator {
    loss_sum: f64,
    accuracy_sum: f64,
    samples: usize,
    last_batch_accuracy: f32,
}

impl EpochAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, batch_size: usize, loss: f32, accuracy: f32) {
        self.loss_sum += loss as f64 * batch_size as f64;
        self.accuracy_sum += accuracy as f64 * batch_size as f64;
        self.samples += batch_size;
        self.last_batch_accuracy = accuracy;
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    /// An empty epoch averages to zero.
    pub fn finish(&self) -> EpochStats {
        let denom = self.samples.max(1) as f64;
        EpochStats {
            loss: self.loss_sum / denom,
            accuracy: self.accuracy_sum / denom,
            last_batch_accuracy: self.last_batch_accuracy,
            samples: self.samples,
        }
    }
}

/// Splits an index order into batches and drives the classifier over them.
#[derive(Debug, Clone, Copy)]
pub struct EpochRunner {
    batch_size: usize,
}

impl EpochRunner {
    pub fn new(batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(GraphClfError::InvalidConfig(
                "batch_size must be positive".to_string(),
            ));
        }
        Ok(Self { batch_size })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Consecutive chunks of `indices`, the last one possibly shorter.
    pub fn batches<'a>(
        &self,
        graphs: &'a [GraphRecord],
        indices: &[usize],
    ) -> Result<Vec<Vec<&'a GraphRecord>>> {
        indices
            .chunks(self.batch_size)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|&i| {
                        graphs.get(i).ok_or_else(|| {
                            GraphClfError::InvalidConfig(format!(
                                "sample index {i} is outside a dataset of {} graphs",
                                graphs.len()
                            ))
                        })
                    })
                    .collect()
            })
            .collect()
    }

    /// Training pass: one optimizer step per batch.
    ///
    /// Gradients are computed fresh from each batch loss, so nothing carries
    /// over between steps.
    pub fn train<B, O>(
        &self,
        mut model: GraphClassifier<B>,
        optimizer: &mut O,
        learning_rate: f64,
        graphs: &[GraphRecord],
        indices: &[usize],
    ) -> Result<(GraphClassifier<B>, EpochStats)>
    where
        B: AutodiffBackend,
        O: Optimizer<GraphClassifier<B>, B>,
    {
        let mut acc = EpochAccumulator::new();

        for (position, batch) in self.batches(graphs, indices)?.into_iter().enumerate() {
            let out = model.forward(&batch)?;
            let loss_value: f32 = out.loss.clone().into_scalar().elem();
            if !loss_value.is_finite() {
                return Err(GraphClfError::NonFiniteLoss {
                    batch: position,
                    loss: loss_value,
                });
            }

            let grads = GradientsParams::from_grads(out.loss.backward(), &model);
            model = optimizer.step(learning_rate, model, grads);

            debug!("batch {}: loss {:.5} acc {:.5}", position, loss_value, out.accuracy);
            acc.push(out.batch_size, loss_value, out.accuracy);
        }

        Ok((model, acc.finish()))
    }

    /// Evaluation pass: no parameter is touched and every index is visited once.
    pub fn evaluate<B: Backend>(
        &self,
        model: &GraphClassifier<B>,
        graphs: &[GraphRecord],
        indices: &[usize],
    ) -> Result<EpochStats> {
        let mut acc = EpochAccumulator::new();

        for (position, batch) in self.batches(graphs, indices)?.into_iter().enumerate() {
            let out = model.forward(&batch)?;
            let loss_value: f32 = out.loss.into_scalar().elem();
            debug!("eval batch {}: loss {:.5} acc {:.5}", position, loss_value, out.accuracy);
            acc.push(out.batch_size, loss_value, out.accuracy);
        }

        if acc.samples() != indices.len() {
            return Err(GraphClfError::SampleCountMismatch {
                processed: acc.samples(),
                expected: indices.len(),
            });
        }
        Ok(acc.finish())
    }
}
