//! Node feature construction for a batch of graphs.
//!
//! The batch is flattened into one dense `[total_nodes, width]` matrix whose row
//! blocks follow batch order. The width depends on which per-node data the
//! dataset carries:
//!
//! | tags | attributes | columns                         |
//! |------|------------|---------------------------------|
//! | yes  | yes        | one-hot(tag) ++ attributes      |
//! | yes  | no         | one-hot(tag)                    |
//! | no   | yes        | attributes                      |
//! | no   | no         | a single constant `1.0` column  |
//!
//! Host-side construction keeps this a pure function of the batch and
//! `feat_dim`; tensors are only materialised on the requested device at the end.

use burn::tensor::{backend::Backend, Int, Tensor, TensorData};

use super::graph::GraphRecord;
use crate::graphclf::error::{GraphClfError, Result};

/// Which per-node data a batch carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceFlags {
    pub tags: bool,
    pub features: bool,
}

impl PresenceFlags {
    pub fn of(graph: &GraphRecord) -> Self {
        Self {
            tags: graph.node_tags().is_some(),
            features: graph.node_features().is_some(),
        }
    }

    /// Resolve the flags shared by every graph of the batch.
    ///
    /// The first graph decides; any later graph that disagrees is rejected.
    pub fn for_batch(batch: &[&GraphRecord]) -> Result<Self> {
        let first = batch.first().ok_or(GraphClfError::EmptyBatch)?;
        let flags = Self::of(first);

        for (position, graph) in batch.iter().enumerate().skip(1) {
            let other = Self::of(graph);
            if other.tags != flags.tags {
                return Err(GraphClfError::MixedPresence {
                    graph: position,
                    field: "tags",
                    expected: flags.tags,
                });
            }
            if other.features != flags.features {
                return Err(GraphClfError::MixedPresence {
                    graph: position,
                    field: "features",
                    expected: flags.features,
                });
            }
        }

        Ok(flags)
    }

    /// Column count of the node feature matrix under these flags.
    pub fn output_width(&self, feat_dim: usize, attr_dim: usize) -> usize {
        match (self.tags, self.features) {
            (true, true) => feat_dim + attr_dim,
            (true, false) => feat_dim,
            (false, true) => attr_dim,
            (false, false) => 1,
        }
    }
}

/// Row-major dense node feature matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFeatureMatrix {
    pub rows: usize,
    pub cols: usize,
    pub values: Vec<f32>,
}

impl NodeFeatureMatrix {
    pub fn row(&self, index: usize) -> &[f32] {
        &self.values[index * self.cols..(index + 1) * self.cols]
    }

    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        Tensor::from_data(
            TensorData::new(self.values.clone(), [self.rows, self.cols]),
            device,
        )
    }
}

/// Host-side output of the feature builder.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub features: NodeFeatureMatrix,
    pub labels: Vec<i64>,
    pub flags: PresenceFlags,
}

impl PreparedBatch {
    pub fn labels_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 1, Int> {
        Tensor::from_data(
            TensorData::new(self.labels.clone(), [self.labels.len()]),
            device,
        )
    }
}

/// Converts batches of graph records into `(node features, labels)`.
#[derive(Debug, Clone, Copy)]
pub struct FeatureBuilder {
    feat_dim: usize,
}

impl FeatureBuilder {
    /// `feat_dim` is the tag vocabulary size (one-hot width).
    pub fn new(feat_dim: usize) -> Self {
        Self { feat_dim }
    }

    pub fn prepare(&self, batch: &[&GraphRecord]) -> Result<PreparedBatch> {
        let flags = PresenceFlags::for_batch(batch)?;
        let total_nodes: usize = batch.iter().map(|g| g.num_nodes()).sum();
        let labels: Vec<i64> = batch.iter().map(|g| g.label() as i64).collect();

        let attr_dim = if flags.features { batch[0].attr_dim() } else { 0 };
        let width = flags.output_width(self.feat_dim, attr_dim);

        let values = match (flags.tags, flags.features) {
            (false, false) => vec![1.0; total_nodes],
            _ => {
                let mut values = vec![0.0f32; total_nodes * width];
                let mut row = 0;
                for (position, graph) in batch.iter().enumerate() {
                    for node in 0..graph.num_nodes() {
                        let out = &mut values[row * width..(row + 1) * width];
                        let mut col = 0;
                        if let Some(tags) = graph.node_tags() {
                            let tag = tags[node];
                            if tag >= self.feat_dim {
                                return Err(GraphClfError::TagOutOfRange {
                                    graph: position,
                                    tag,
                                    feat_dim: self.feat_dim,
                                });
                            }
                            // assignment, so a repeated tag can never count twice
                            out[tag] = 1.0;
                            col = self.feat_dim;
                        }
                        if let Some(attrs) = graph.node_features() {
                            if attrs.ncols() != attr_dim {
                                return Err(GraphClfError::MalformedGraph {
                                    graph: position,
                                    detail: format!(
                                        "attribute width {} differs from batch width {}",
                                        attrs.ncols(),
                                        attr_dim
                                    ),
                                });
                            }
                            for (j, value) in attrs.row(node).iter().enumerate() {
                                out[col + j] = *value;
                            }
                        }
                        row += 1;
                    }
                }
                values
            }
        };

        Ok(PreparedBatch {
            features: NodeFeatureMatrix {
                rows: total_nodes,
                cols: width,
                values,
            },
            labels,
            flags,
        })
    }

    /// Build device tensors: `[total_nodes, width]` features and `[batch]` labels.
    pub fn build<B: Backend>(
        &self,
        batch: &[&GraphRecord],
        device: &B::Device,
    ) -> Result<(Tensor<B, 2>, Tensor<B, 1, Int>)> {
        let prepared = self.prepare(batch)?;
        Ok((
            prepared.features.to_tensor(device),
            prepared.labels_tensor(device),
        ))
    }
}
