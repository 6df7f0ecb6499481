use burn::{
    module::{Ignored, Module},
    tensor::{activation::relu, backend::Backend, Tensor},
};

use super::{EmbedGraphs, EmbeddingConfig};
use crate::graphclf::architectures::init::{SeededInit, SeededLinear};
use crate::graphclf::data::batch::GraphBatch;

/// structure2vec mean-field embedding.
///
/// ```text
/// m0  = W_n2l x (+ E2N W_e2l e)
/// h0  = relu(m0)
/// h_t = relu(W_conv (A h_{t-1}) + m0)        t = 1..max_lv
/// y   = relu(P relu(W_out h_T))               P sums each graph's nodes
/// ```
#[derive(Module, Debug)]
pub struct MeanFieldEmbedding<B: Backend> {
    w_n2l: SeededLinear<B>,
    w_e2l: Option<SeededLinear<B>>,
    conv: SeededLinear<B>,
    out: Option<SeededLinear<B>>,
    latent_dim: Ignored<usize>,
    max_lv: Ignored<usize>,
}

impl<B: Backend> MeanFieldEmbedding<B> {
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
}

impl<B: Backend> EmbedGraphs<B> for MeanFieldEmbedding<B> {
    fn embed(
        &self,
        batch: &GraphBatch,
        node_features: Tensor<B, 2>,
        edge_features: Option<Tensor<B, 2>>,
    ) -> Tensor<B, 2> {
        let device = node_features.device();
        let edge_index = batch.edge_index::<B>(&device);

        let mut input_message = self.w_n2l.forward(node_features);
        if let (Some(w_e2l), Some(edges), Some(index)) = (&self.w_e2l, edge_features, &edge_index) {
            input_message = input_message + index.edge_to_node(w_e2l.forward(edges));
        }

        let mut current = relu(input_message.clone());
        for _ in 0..*self.max_lv {
            let pooled = match &edge_index {
                Some(index) => index.neighbour_sum(current),
                None => current.zeros_like(),
            };
            current = relu(self.conv.forward(pooled) + input_message.clone());
        }

        let node_out = match &self.out {
            Some(out) => relu(out.forward(current)),
            None => current,
        };
        relu(batch.sum_pool(node_out))
    }

    fn output_dim(&self) -> usize {
        self.out.as_ref().map_or(*self.latent_dim, |out| out.output_dim())
    }
}
