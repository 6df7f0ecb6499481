use burn::{
    config::Config,
    module::{Ignored, Module},
    tensor::{backend::Backend, Tensor},
};

use super::embedding::{EmbedGraphs, EmbeddingConfig, GraphEmbedding};
use super::init::SeededInit;
use super::mlp::MlpClassifier;
use crate::graphclf::data::batch::GraphBatch;
use crate::graphclf::data::features::FeatureBuilder;
use crate::graphclf::data::graph::GraphRecord;
use crate::graphclf::error::{GraphClfError, Result as ClfResult};

/// Everything needed to build a fresh [`GraphClassifier`].
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    pub embedding: EmbeddingConfig,
    /// Tag vocabulary size used for one-hot node features.
    pub feat_dim: usize,
    pub hidden: usize,
    pub num_class: usize,
    #[config(default = false)]
    pub dropout: bool,
}

impl ClassifierConfig {
    /// Builds the embedding first; the head input width follows its output width.
    pub fn init<B: Backend>(&self, seed: u64, device: &B::Device) -> ClfResult<GraphClassifier<B>> {
        if self.hidden == 0 || self.num_class == 0 {
            return Err(GraphClfError::InvalidConfig(format!(
                "hidden ({}) and num_class ({}) must be positive",
                self.hidden, self.num_class
            )));
        }

        let init = SeededInit::<B>::new(seed, device.clone());
        let embedding = self.embedding.init(&init)?;
        let head = MlpClassifier::new(embedding.output_dim(), self.hidden, self.num_class, self.dropout, &init);

        Ok(GraphClassifier {
            embedding,
            head,
            features: Ignored(FeatureBuilder::new(self.feat_dim)),
        })
    }
}

/// Result of a forward pass over one batch of graphs.
#[derive(Debug, Clone)]
pub struct ClassifierOutput<B: Backend> {
    /// `[batch, num_class]` log-probabilities.
    pub output: Tensor<B, 2>,
    pub loss: Tensor<B, 1>,
    pub accuracy: f32,
    pub batch_size: usize,
}

/// Embedding network plus classifier head.
#[derive(Module, Debug)]
pub struct GraphClassifier<B: Backend> {
    embedding: GraphEmbedding<B>,
    head: MlpClassifier<B>,
    features: Ignored<FeatureBuilder>,
}

impl<B: Backend> GraphClassifier<B> {
    pub fn embedding(&self) -> &GraphEmbedding<B> {
        &self.embedding
    }

    pub fn head(&self) -> &MlpClassifier<B> {
        &self.head
    }

    pub fn forward(&self, graphs: &[&GraphRecord]) -> ClfResult<ClassifierOutput<B>> {
        let device = self.head.device();
        let (node_features, labels) = self.features.build::<B>(graphs, &device)?;
        let batch = GraphBatch::new(graphs);

        let embeddings = self.embedding.embed(&batch, node_features, None);
        let head = self.head.forward(embeddings, labels);

        Ok(ClassifierOutput {
            output: head.log_probs,
            loss: head.loss,
            accuracy: head.accuracy,
            batch_size: graphs.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphclf::architectures::embedding::EmbeddingKind;
    use crate::graphclf::error::GraphClfError;
    use crate::test_utils::{path_vs_cycle_graphs, tagged_graph};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn config(kind: EmbeddingKind) -> ClassifierConfig {
        let embedding = EmbeddingConfig::new(kind, vec![8, 8, 1], 0, 3)
            .with_max_lv(2)
            .with_sortpooling_k(10);
        ClassifierConfig::new(embedding, 3, 16, 2)
    }

    #[test]
    fn test_forward_every_variant() {
        let device = <TestBackend as Backend>::Device::default();
        let graphs = path_vs_cycle_graphs(4, 4);
        let batch: Vec<&GraphRecord> = graphs.iter().collect();

        for kind in [EmbeddingKind::MeanField, EmbeddingKind::LoopyBp, EmbeddingKind::Dgcnn] {
            let model = config(kind).init::<TestBackend>(1, &device).unwrap();
            let out = model.forward(&batch).unwrap();

            assert_eq!(out.output.dims(), [4, 2]);
            assert_eq!(out.batch_size, 4);
            assert!((0.0..=1.0).contains(&out.accuracy));
            assert!(out.loss.into_scalar().is_finite());
        }
    }

    #[test]
    fn test_same_seed_gives_same_output() {
        let device = <TestBackend as Backend>::Device::default();
        let graphs = path_vs_cycle_graphs(2, 5);
        let batch: Vec<&GraphRecord> = graphs.iter().collect();

        let a = config(EmbeddingKind::MeanField).init::<TestBackend>(9, &device).unwrap();
        let b = config(EmbeddingKind::MeanField).init::<TestBackend>(9, &device).unwrap();
        assert_eq!(
            a.forward(&batch).unwrap().output.into_data(),
            b.forward(&batch).unwrap().output.into_data()
        );
    }

    #[test]
    fn test_head_width_follows_embedding() {
        let device = <TestBackend as Backend>::Device::default();
        let model = config(EmbeddingKind::Dgcnn).init::<TestBackend>(1, &device).unwrap();
        assert_eq!(model.head().input_size(), model.embedding().output_dim());
        assert_eq!(model.head().input_size(), 32);
    }

    #[test]
    fn test_bad_tag_surfaces_from_forward() {
        let device = <TestBackend as Backend>::Device::default();
        let model = config(EmbeddingKind::MeanField).init::<TestBackend>(1, &device).unwrap();
        let graph = tagged_graph(2, &[(0, 1)], &[0, 3], 0);
        assert!(matches!(
            model.forward(&[&graph]),
            Err(GraphClfError::TagOutOfRange { tag: 3, .. })
        ));
    }

    #[test]
    fn test_zero_hidden_is_rejected() {
        let device = <TestBackend as Backend>::Device::default();
        let mut cfg = config(EmbeddingKind::MeanField);
        cfg.hidden = 0;
        assert!(matches!(
            cfg.init::<TestBackend>(1, &device),
            Err(GraphClfError::InvalidConfig(_))
        ));
    }
}
