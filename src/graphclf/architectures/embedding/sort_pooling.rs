//! DGCNN: stacked graph convolutions, SortPooling and a 1-D convolution head.
//!
//! ```text
//! Z_l = tanh(W_l (A Z_{l-1} + Z_{l-1}) / (deg + 1))     Z_0 = x
//! Z   = [Z_1 | ... | Z_L]                               [N, Σ latent]
//! S   = top-k rows of each graph by the last column, zero padded to k
//! S   -> Conv1d(1, 16, Σ, stride Σ) -> relu -> MaxPool1d(2, 2)
//!     -> Conv1d(16, 32, 5) -> relu -> flatten          [G, (k/2 - 4) * 32]
//! y   = relu(relu(W_out .))   when an output width is set
//! ```

use burn::{
    module::{Ignored, Module},
    nn::{
        conv::Conv1d,
        pool::{MaxPool1d, MaxPool1dConfig},
    },
    tensor::{
        activation::{relu, tanh},
        backend::Backend,
        Int, Tensor, TensorData,
    },
};

use super::{EmbedGraphs, EmbeddingConfig};
use crate::graphclf::architectures::init::{SeededInit, SeededLinear};
use crate::graphclf::data::batch::GraphBatch;
use crate::graphclf::data::dataset::MIN_SORTPOOLING_K;
use crate::graphclf::error::{GraphClfError, Result};

const CONV1D_CHANNELS: [usize; 2] = [16, 32];
const CONV1D_SECOND_KERNEL: usize = 5;

#[derive(Module, Debug)]
pub struct SortPoolingEmbedding<B: Backend> {
    graph_convs: Vec<SeededLinear<B>>,
    conv1d_first: Conv1d<B>,
    maxpool: MaxPool1d,
    conv1d_second: Conv1d<B>,
    out: Option<SeededLinear<B>>,
    k: Ignored<usize>,
    total_latent_dim: Ignored<usize>,
    dense_dim: Ignored<usize>,
}

impl<B: Backend> SortPoolingEmbedding<B> {
    pub fn new(config: &EmbeddingConfig, init: &SeededInit<B>) -> Result<Self> {
        let k = config.sortpooling_k;
        if k < MIN_SORTPOOLING_K {
            return Err(GraphClfError::InvalidConfig(format!(
                "sortpooling_k must be at least {MIN_SORTPOOLING_K}, got {k}"
            )));
        }

        let total_latent_dim: usize = config.latent_dims.iter().sum();
        let mut input_dim = config.num_node_feats + config.num_edge_feats;
        let graph_convs = config
            .latent_dims
            .iter()
            .enumerate()
            .map(|(layer, &width)| {
                let conv = init.linear(input_dim, width, true, 200 + layer as u64);
                input_dim = width;
                conv
            })
            .collect();

        let conv1d_first = init.conv1d(1, CONV1D_CHANNELS[0], total_latent_dim, total_latent_dim, 500);
        let maxpool = MaxPool1dConfig::new(2).with_stride(2).init();
        let conv1d_second = init.conv1d(CONV1D_CHANNELS[0], CONV1D_CHANNELS[1], CONV1D_SECOND_KERNEL, 1, 501);

        let dense_dim = (k / 2 - CONV1D_SECOND_KERNEL + 1) * CONV1D_CHANNELS[1];
        let out = (config.output_dim > 0).then(|| init.linear(dense_dim, config.output_dim, true, 300));

        Ok(Self {
            graph_convs,
            conv1d_first,
            maxpool,
            conv1d_second,
            out,
            k: Ignored(k),
            total_latent_dim: Ignored(total_latent_dim),
            dense_dim: Ignored(dense_dim),
        })
    }

    pub fn k(&self) -> usize {
        *self.k
    }

    /// Concatenated outputs of every graph convolution layer, `[N, Σ latent]`.
    fn graph_convolutions(&self, batch: &GraphBatch, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = input.device();
        let edge_index = batch.edge_index::<B>(&device);
        let degrees = batch.degrees_plus_one::<B>(&device);

        let mut current = input;
        let mut layers = Vec::with_capacity(self.graph_convs.len());
        for conv in &self.graph_convs {
            let neighbours = match &edge_index {
                Some(index) => index.neighbour_sum(current.clone()),
                None => current.zeros_like(),
            };
            let pooled = neighbours + current;
            let linear = conv.forward(pooled);
            current = tanh(linear / degrees.clone());
            layers.push(current.clone());
        }
        Tensor::cat(layers, 1)
    }
}

/// Row indices of the SortPooling output, `k` per graph.
///
/// Each graph's nodes are ranked by `values` in descending order, ties going to
/// the lower node index. Graphs with fewer than `k` nodes are padded with
/// `padding_index`, which callers point at an all-zero row.
pub fn sortpool_indices(
    values: &[f32],
    graph_sizes: &[usize],
    offsets: &[usize],
    k: usize,
    padding_index: usize,
) -> Vec<i64> {
    let mut indices = Vec::with_capacity(graph_sizes.len() * k);
    for (&size, &offset) in graph_sizes.iter().zip(offsets) {
        let mut order: Vec<usize> = (offset..offset + size).collect();
        order.sort_by(|&a, &b| values[b].total_cmp(&values[a]).then(a.cmp(&b)));

        let kept = size.min(k);
        indices.extend(order[..kept].iter().map(|&node| node as i64));
        indices.extend(std::iter::repeat(padding_index as i64).take(k - kept));
    }
    indices
}

impl<B: Backend> EmbedGraphs<B> for SortPoolingEmbedding<B> {
    fn embed(
        &self,
        batch: &GraphBatch,
        node_features: Tensor<B, 2>,
        edge_features: Option<Tensor<B, 2>>,
    ) -> Tensor<B, 2> {
        let device = node_features.device();
        let num_graphs = batch.num_graphs();
        let total_nodes = batch.total_nodes();
        let k = *self.k;
        let width = *self.total_latent_dim;

        let input = match edge_features {
            Some(edges) => {
                let pooled = match batch.edge_index::<B>(&device) {
                    Some(index) => index.edge_to_node(edges),
                    None => Tensor::zeros([total_nodes, edges.dims()[1]], &device),
                };
                Tensor::cat(vec![node_features, pooled], 1)
            }
            None => node_features,
        };

        let layers = self.graph_convolutions(batch, input);

        let sort_channel: Vec<f32> = layers
            .clone()
            .slice([0..total_nodes, width - 1..width])
            .into_data()
            .iter::<f32>()
            .collect();
        let indices = sortpool_indices(&sort_channel, batch.graph_sizes(), batch.offsets(), k, total_nodes);
        let index_count = indices.len();
        let index_tensor = Tensor::<B, 1, Int>::from_data(TensorData::new(indices, [index_count]), &device);

        let padded = Tensor::cat(vec![layers, Tensor::zeros([1, width], &device)], 0);
        let pooled = padded.select(0, index_tensor).reshape([num_graphs, 1, k * width]);

        let conv = relu(self.conv1d_first.forward(pooled));
        let conv = self.maxpool.forward(conv);
        let conv = relu(self.conv1d_second.forward(conv));
        let dense = conv.reshape([num_graphs, *self.dense_dim]);

        match &self.out {
            Some(out) => relu(relu(out.forward(dense))),
            None => relu(dense),
        }
    }

    fn output_dim(&self) -> usize {
        self.out.as_ref().map_or(*self.dense_dim, |out| out.output_dim())
    }
}
