// tests/epoch_runner.rs - Training and evaluation passes over a toy dataset
use burn::{backend::Autodiff, module::AutodiffModule, optim::AdamConfig, tensor::backend::Backend};
use burn_ndarray::NdArray;

use graphclf_rs::graphclf::architectures::{ClassifierConfig, EmbeddingConfig, EmbeddingKind, GraphClassifier};
use graphclf_rs::graphclf::train::EpochRunner;
use graphclf_rs::test_utils::path_vs_cycle_graphs;
use graphclf_rs::GraphRecord;

type TestBackend = Autodiff<NdArray<f32>>;

fn classifier(kind: EmbeddingKind) -> ClassifierConfig {
    let embedding = EmbeddingConfig::new(kind, vec![8, 8, 1], 0, 3)
        .with_max_lv(2)
        .with_sortpooling_k(10);
    ClassifierConfig::new(embedding, 3, 16, 2).with_dropout(true)
}

/// Outputs on a fixed batch; any parameter change shows up here.
fn fingerprint(model: &GraphClassifier<NdArray<f32>>, graphs: &[GraphRecord]) -> Vec<f32> {
    let batch: Vec<&GraphRecord> = graphs.iter().collect();
    model.forward(&batch).unwrap().output.into_data().iter::<f32>().collect()
}

#[test]
fn test_evaluation_visits_every_sample_once() {
    let device = <TestBackend as Backend>::Device::default();
    let graphs = path_vs_cycle_graphs(11, 4);
    let model = classifier(EmbeddingKind::MeanField)
        .init::<NdArray<f32>>(1, &device)
        .unwrap();
    let runner = EpochRunner::new(4).unwrap();

    let indices: Vec<usize> = (0..graphs.len()).collect();
    let stats = runner.evaluate(&model, &graphs, &indices).unwrap();

    assert_eq!(stats.samples, 11);
    assert!(stats.loss.is_finite());
    assert!((0.0..=1.0).contains(&stats.accuracy));
}

#[test]
fn test_evaluation_leaves_parameters_untouched() {
    let device = <TestBackend as Backend>::Device::default();
    let graphs = path_vs_cycle_graphs(6, 4);
    let model = classifier(EmbeddingKind::LoopyBp)
        .init::<NdArray<f32>>(2, &device)
        .unwrap();
    let runner = EpochRunner::new(2).unwrap();

    let before = fingerprint(&model, &graphs);
    let first = runner.evaluate(&model, &graphs, &[0, 1, 2, 3, 4, 5]).unwrap();
    let second = runner.evaluate(&model, &graphs, &[0, 1, 2, 3, 4, 5]).unwrap();

    assert_eq!(before, fingerprint(&model, &graphs));
    assert_eq!(first, second);
}

#[test]
fn test_training_updates_parameters_and_reports_every_sample() {
    let device = <TestBackend as Backend>::Device::default();
    let graphs = path_vs_cycle_graphs(10, 4);
    let runner = EpochRunner::new(3).unwrap();

    for kind in [EmbeddingKind::MeanField, EmbeddingKind::LoopyBp, EmbeddingKind::Dgcnn] {
        let model = classifier(kind).init::<TestBackend>(3, &device).unwrap();
        let before = fingerprint(&model.valid(), &graphs);
        let mut optimizer = AdamConfig::new().init::<TestBackend, GraphClassifier<TestBackend>>();

        let indices: Vec<usize> = (0..graphs.len()).rev().collect();
        let (model, stats) = runner
            .train(model, &mut optimizer, 0.01, &graphs, &indices)
            .unwrap();

        assert_eq!(stats.samples, 10, "variant {kind}");
        assert!(stats.loss.is_finite(), "variant {kind}");
        assert_ne!(before, fingerprint(&model.valid(), &graphs), "variant {kind}");
    }
}

#[test]
fn test_training_lowers_loss_on_a_separable_problem() {
    let device = <TestBackend as Backend>::Device::default();
    let graphs = path_vs_cycle_graphs(16, 4);
    let runner = EpochRunner::new(4).unwrap();
    let indices: Vec<usize> = (0..graphs.len()).collect();

    let embedding = EmbeddingConfig::new(EmbeddingKind::MeanField, vec![16], 0, 3).with_max_lv(2);
    let mut model = ClassifierConfig::new(embedding, 3, 16, 2)
        .init::<TestBackend>(4, &device)
        .unwrap();
    let mut optimizer = AdamConfig::new().init::<TestBackend, GraphClassifier<TestBackend>>();

    let initial = runner.evaluate(&model.valid(), &graphs, &indices).unwrap();
    for _ in 0..30 {
        let (trained, _) = runner
            .train(model, &mut optimizer, 0.01, &graphs, &indices)
            .unwrap();
        model = trained;
    }
    let trained = runner.evaluate(&model.valid(), &graphs, &indices).unwrap();

    assert!(
        trained.loss < initial.loss,
        "loss went from {} to {}",
        initial.loss,
        trained.loss
    );
}
