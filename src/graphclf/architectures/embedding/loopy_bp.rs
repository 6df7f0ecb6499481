use burn::{
    module::{Ignored, Module},
    tensor::{activation::relu, backend::Backend, Tensor},
};

use super::{EmbedGraphs, EmbeddingConfig};
use crate::graphclf::architectures::init::{SeededInit, SeededLinear};
use crate::graphclf::data::batch::GraphBatch;

/// structure2vec loopy belief propagation embedding.
///
/// Messages live on directed edges. Edge `u -> v` is refreshed from every
/// message entering `u` except the one coming back from `v`:
///
/// ```text
/// m0  = N2E W_n2l x (+ W_e2l e)
/// h_t = relu(W_conv (E2E h_{t-1}) + m0)      t = 1..max_lv
/// z   = relu(E2N h_T)
/// y   = relu(P relu(W_out z))
/// ```
///
/// A batch without any edge has no messages; every node then reads zeros.
#[derive(Module, Debug)]
pub struct LoopyBpEmbedding<B: Backend> {
    w_n2l: SeededLinear<B>,
    w_e2l: Option<SeededLinear<B>>,
    conv: SeededLinear<B>,
    out: Option<SeededLinear<B>>,
    latent_dim: Ignored<usize>,
    max_lv: Ignored<usize>,
}

impl<B: Backend> LoopyBpEmbedding<B> {
    pub fn new(config: &EmbeddingConfig, init: &SeededInit<B>) -> Self {
        let latent_dim = config.latent_dims[0];

        Self {
            w_n2l: init.linear(config.num_node_feats, latent_dim, true, 100),
            w_e2l: (config.num_edge_feats > 0)
                .then(|| init.linear(config.num_edge_feats, latent_dim, true, 101)),
            conv: init.linear(latent_dim, latent_dim, true, 102),
            out: (config.output_dim > 0).then(|| init.linear(latent_dim, config.output_dim, true, 300)),
            latent_dim: Ignored(latent_dim),
            max_lv: Ignored(config.max_lv),
        }
    }

    fn node_messages(
        &self,
        batch: &GraphBatch,
        node_features: Tensor<B, 2>,
        edge_features: Option<Tensor<B, 2>>,
    ) -> Tensor<B, 2> {
        let device = node_features.device();
        let node_linear = self.w_n2l.forward(node_features);

        let Some(index) = batch.edge_index::<B>(&device) else {
            return Tensor::zeros([batch.total_nodes(), *self.latent_dim], &device);
        };

        let mut input_message = index.node_to_edge(node_linear);
        if let (Some(w_e2l), Some(edges)) = (&self.w_e2l, edge_features) {
            input_message = input_message + w_e2l.forward(edges);
        }

        let mut current = relu(input_message.clone());
        for _ in 0..*self.max_lv {
            let pooled = index.edge_to_edge(current);
            current = relu(self.conv.forward(pooled) + input_message.clone());
        }

        relu(index.edge_to_node(current))
    }
}

impl<B: Backend> EmbedGraphs<B> for LoopyBpEmbedding<B> {
    fn embed(
        &self,
        batch: &GraphBatch,
        node_features: Tensor<B, 2>,
        edge_features: Option<Tensor<B, 2>>,
    ) -> Tensor<B, 2> {
        let hidden = self.node_messages(batch, node_features, edge_features);

        let node_out = match &self.out {
            Some(out) => relu(out.forward(hidden)),
            None => hidden,
        };
        relu(batch.sum_pool(node_out))
    }

    fn output_dim(&self) -> usize {
        self.out.as_ref().map_or(*self.latent_dim, |out| out.output_dim())
    }
}
