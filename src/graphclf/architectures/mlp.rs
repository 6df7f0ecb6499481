//! Classifier head: two dense layers over the graph embeddings.

use burn::{
    module::Module,
    nn::{loss::CrossEntropyLossConfig, Dropout, DropoutConfig},
    tensor::{
        activation::{log_softmax, relu},
        backend::Backend,
        ElementConversion, Int, Tensor,
    },
};

use super::init::{SeededInit, SeededLinear};

const DROPOUT_PROB: f64 = 0.5;

/// Output of one head forward pass.
#[derive(Debug, Clone)]
pub struct HeadOutput<B: Backend> {
    /// `[batch, num_class]` log-probabilities.
    pub log_probs: Tensor<B, 2>,
    /// Scalar mean negative log-likelihood.
    pub loss: Tensor<B, 1>,
    /// Fraction of graphs whose predicted class equals the label.
    pub accuracy: f32,
}

/// `Linear(input, hidden) -> relu -> [dropout] -> Linear(hidden, num_class)`.
///
/// Dropout is only active on autodiff backends, so a model obtained through
/// `AutodiffModule::valid` evaluates deterministically.
#[derive(Module, Debug)]
pub struct MlpClassifier<B: Backend> {
    h1: SeededLinear<B>,
    h2: SeededLinear<B>,
    dropout: Option<Dropout>,
}

impl<B: Backend> MlpClassifier<B> {
    pub fn new(input_size: usize, hidden_size: usize, num_class: usize, with_dropout: bool, init: &SeededInit<B>) -> Self {
        Self {
            h1: init.linear(input_size, hidden_size, true, 400),
            h2: init.linear(hidden_size, num_class, true, 401),
            dropout: with_dropout.then(|| DropoutConfig::new(DROPOUT_PROB).init()),
        }
    }

    pub fn input_size(&self) -> usize {
        self.h1.input_dim()
    }

    pub fn num_class(&self) -> usize {
        self.h2.output_dim()
    }

    pub fn device(&self) -> B::Device {
        self.h1.device()
    }

    pub fn logits(&self, embeddings: Tensor<B, 2>) -> Tensor<B, 2> {
        let hidden = relu(self.h1.forward(embeddings));
        let hidden = match &self.dropout {
            Some(dropout) => dropout.forward(hidden),
            None => hidden,
        };
        self.h2.forward(hidden)
    }

    pub fn forward(&self, embeddings: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> HeadOutput<B> {
        let logits = self.logits(embeddings);
        let log_probs = log_softmax(logits, 1);

        // log_softmax is idempotent, so cross entropy over log-probabilities is NLL
        let loss = CrossEntropyLossConfig::new()
            .init(&log_probs.device())
            .forward(log_probs.clone(), labels.clone());

        let predictions = argmax_tie_break_smallest(log_probs.clone());
        let batch_size = labels.dims()[0];
        let correct: i64 = predictions.equal(labels).int().sum().into_scalar().elem();
        let accuracy = if batch_size == 0 { 0.0 } else { correct as f32 / batch_size as f32 };

        HeadOutput {
            log_probs,
            loss,
            accuracy,
        }
    }
}

/// Row-wise argmax over `[batch, C]`; ties resolve to the smallest class index.
///
/// Each column is shifted down by `idx * eps` with `eps = 1e-6 * (1 + max|x|)`,
/// small enough to never reorder distinct values yet enough to split exact ties.
pub fn argmax_tie_break_smallest<B: Backend>(scores: Tensor<B, 2>) -> Tensor<B, 1, Int> {
    let [batch, num_classes] = scores.dims();
    let device = scores.device();

    let max_abs: f32 = scores.clone().abs().max().into_scalar().elem();
    let eps = 1e-6 * (1.0 + max_abs);

    let class_idx = Tensor::<B, 1, Int>::arange(0..num_classes as i64, &device)
        .float()
        .unsqueeze_dim::<2>(0);
    let adjusted = scores.detach() - class_idx * eps;

    adjusted.argmax(1).reshape([batch])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_argmax_ties_go_to_smallest_index() {
        let device = <TestBackend as Backend>::Device::default();
        let scores = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![0.5f32, 0.5, 0.1, 0.2, 0.9, 0.9], [2, 3]),
            &device,
        );
        let idx: Vec<i64> = argmax_tie_break_smallest(scores)
            .into_data()
            .iter::<i64>()
            .collect();
        assert_eq!(idx, vec![0, 1]);
    }

    #[test]
    fn test_forward_produces_log_probabilities() {
        let device = <TestBackend as Backend>::Device::default();
        let init = SeededInit::<TestBackend>::new(4, device.clone());
        let head = MlpClassifier::new(6, 8, 3, false, &init);
        assert_eq!(head.input_size(), 6);
        assert_eq!(head.num_class(), 3);

        let embeddings = Tensor::<TestBackend, 2>::ones([4, 6], &device);
        let labels = Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![0i64, 1, 2, 1], [4]), &device);
        let out = head.forward(embeddings, labels);

        assert_eq!(out.log_probs.dims(), [4, 3]);
        let row_mass: Vec<f32> = out.log_probs.exp().sum_dim(1).into_data().iter::<f32>().collect();
        for mass in row_mass {
            assert_relative_eq!(mass, 1.0, epsilon = 1e-5);
        }
        let loss: f32 = out.loss.into_scalar();
        assert!(loss.is_finite() && loss > 0.0);
        // identical rows predict one class, which matches at most two labels
        assert!(out.accuracy <= 0.5);
    }

    #[test]
    fn test_accuracy_counts_matching_predictions() {
        let device = <TestBackend as Backend>::Device::default();
        let init = SeededInit::<TestBackend>::new(4, device.clone());
        let head = MlpClassifier::new(2, 4, 2, true, &init);

        let embeddings = Tensor::<TestBackend, 2>::zeros([3, 2], &device);
        let predicted: Vec<i64> = argmax_tie_break_smallest(head.logits(embeddings.clone()))
            .into_data()
            .iter::<i64>()
            .collect();
        let labels = Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(predicted, [3]), &device);

        // dropout is a no-op without autodiff
        assert_eq!(head.forward(embeddings, labels).accuracy, 1.0);
    }
}
