//! Graph embedding networks.
//!
//! A batch of graphs plus its `[total_nodes, num_node_feats]` node features is
//! mapped to one `[num_graphs, output_dim]` embedding. Three variants exist and
//! one is picked when the classifier is built:
//!
//! - `mean_field`: structure2vec mean-field message passing over nodes
//! - `loopy_bp`: structure2vec loopy belief propagation over directed edges
//! - `DGCNN`: graph convolutions followed by SortPooling and 1-D convolutions

pub mod loopy_bp;
pub mod mean_field;
pub mod sort_pooling;

use std::fmt;
use std::str::FromStr;

use burn::{
    config::Config,
    module::Module,
    tensor::{backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};

pub use loopy_bp::LoopyBpEmbedding;
pub use mean_field::MeanFieldEmbedding;
pub use sort_pooling::SortPoolingEmbedding;

use super::init::SeededInit;
use crate::graphclf::data::batch::GraphBatch;
use crate::graphclf::error::{GraphClfError, Result as ClfResult};

/// Common contract of every embedding variant.
pub trait EmbedGraphs<B: Backend> {
    /// `edge_features`, when given, has one row per directed edge in
    /// [`GraphBatch::directed_edges`] order.
    fn embed(
        &self,
        batch: &GraphBatch,
        node_features: Tensor<B, 2>,
        edge_features: Option<Tensor<B, 2>>,
    ) -> Tensor<B, 2>;

    /// Width of each graph's embedding.
    fn output_dim(&self) -> usize;
}

/// Embedding variant names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingKind {
    #[serde(rename = "mean_field")]
    MeanField,
    #[serde(rename = "loopy_bp")]
    LoopyBp,
    #[serde(rename = "DGCNN")]
    Dgcnn,
}

impl EmbeddingKind {
    pub fn name(&self) -> &'static str {
        match self {
            EmbeddingKind::MeanField => "mean_field",
            EmbeddingKind::LoopyBp => "loopy_bp",
            EmbeddingKind::Dgcnn => "DGCNN",
        }
    }
}

impl fmt::Display for EmbeddingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EmbeddingKind {
    type Err = GraphClfError;

    fn from_str(s: &str) -> ClfResult<Self> {
        match s {
            "mean_field" => Ok(EmbeddingKind::MeanField),
            "loopy_bp" => Ok(EmbeddingKind::LoopyBp),
            "DGCNN" => Ok(EmbeddingKind::Dgcnn),
            other => Err(GraphClfError::UnknownModel(other.to_string())),
        }
    }
}

/// Construction parameters shared by the three variants.
#[derive(Config, Debug)]
pub struct EmbeddingConfig {
    pub kind: EmbeddingKind,
    /// Message-passing variants use the first entry, DGCNN one layer per entry.
    pub latent_dims: Vec<usize>,
    /// Output projection width; 0 keeps the variant's natural width.
    pub output_dim: usize,
    pub num_node_feats: usize,
    #[config(default = 0)]
    pub num_edge_feats: usize,
    #[config(default = 4)]
    pub max_lv: usize,
    #[config(default = 30)]
    pub sortpooling_k: usize,
}

impl EmbeddingConfig {
    pub fn init<B: Backend>(&self, init: &SeededInit<B>) -> ClfResult<GraphEmbedding<B>> {
        if self.latent_dims.is_empty() || self.latent_dims.contains(&0) {
            return Err(GraphClfError::InvalidConfig(format!(
                "latent_dim must be non-empty and positive, got {:?}",
                self.latent_dims
            )));
        }
        if self.num_node_feats == 0 {
            return Err(GraphClfError::InvalidConfig(
                "node feature width must be positive".to_string(),
            ));
        }

        let embedding = match self.kind {
            EmbeddingKind::MeanField => GraphEmbedding::MeanField(MeanFieldEmbedding::new(self, init)),
            EmbeddingKind::LoopyBp => GraphEmbedding::LoopyBp(LoopyBpEmbedding::new(self, init)),
            EmbeddingKind::Dgcnn => GraphEmbedding::SortPooling(SortPoolingEmbedding::new(self, init)?),
        };
        Ok(embedding)
    }
}

/// The embedding owned by a classifier, tagged by variant.
#[derive(Module, Debug)]
pub enum GraphEmbedding<B: Backend> {
    MeanField(MeanFieldEmbedding<B>),
    LoopyBp(LoopyBpEmbedding<B>),
    SortPooling(SortPoolingEmbedding<B>),
}

impl<B: Backend> GraphEmbedding<B> {
    pub fn kind(&self) -> EmbeddingKind {
        match self {
            GraphEmbedding::MeanField(_) => EmbeddingKind::MeanField,
            GraphEmbedding::LoopyBp(_) => EmbeddingKind::LoopyBp,
            GraphEmbedding::SortPooling(_) => EmbeddingKind::Dgcnn,
        }
    }
}

impl<B: Backend> EmbedGraphs<B> for GraphEmbedding<B> {
    fn embed(
        &self,
        batch: &GraphBatch,
        node_features: Tensor<B, 2>,
        edge_features: Option<Tensor<B, 2>>,
    ) -> Tensor<B, 2> {
        match self {
            GraphEmbedding::MeanField(m) => m.embed(batch, node_features, edge_features),
            GraphEmbedding::LoopyBp(m) => m.embed(batch, node_features, edge_features),
            GraphEmbedding::SortPooling(m) => m.embed(batch, node_features, edge_features),
        }
    }

    fn output_dim(&self) -> usize {
        match self {
            GraphEmbedding::MeanField(m) => m.output_dim(),
            GraphEmbedding::LoopyBp(m) => m.output_dim(),
            GraphEmbedding::SortPooling(m) => m.output_dim(),
        }
    }
}
