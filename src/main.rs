use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use burn::backend::Autodiff;
use burn::tensor::backend::AutodiffBackend;
use burn_ndarray::{NdArray, NdArrayDevice};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use graphclf_rs::graphclf::settings::{parse_latent_dims, DeviceMode, Settings};
use graphclf_rs::{
    CheckpointStore, DatasetSource, GraphSplits, JsonDatasetSource, ResultWriter, TrainingConfig, TrainingController,
};

/// Train a graph classifier over one or more learning rates and evaluate the best one.
#[derive(Parser, Debug)]
#[command(name = "graphclf")]
#[command(version)]
struct Cli {
    /// TOML settings file (defaults to ./graphclf.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Embedding variant: mean_field, loopy_bp or DGCNN
    #[arg(long)]
    gm: Option<String>,

    /// Latent layer sizes, e.g. 32-32-32-1
    #[arg(long)]
    latent_dim: Option<String>,

    #[arg(long)]
    out_dim: Option<usize>,

    #[arg(long)]
    feat_dim: Option<usize>,

    #[arg(long)]
    attr_dim: Option<usize>,

    #[arg(long)]
    hidden: Option<usize>,

    #[arg(long)]
    num_class: Option<usize>,

    #[arg(long)]
    dropout: Option<bool>,

    /// Integer k, or a fraction of graph sizes when <= 1
    #[arg(long)]
    sortpooling_k: Option<f64>,

    #[arg(long)]
    max_lv: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    num_epochs: Option<usize>,

    #[arg(long)]
    patience: Option<usize>,

    /// One trial per value; comma separated or repeated
    #[arg(long, value_delimiter = ',')]
    learning_rate: Vec<f64>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    fold: Option<usize>,

    /// cpu or gpu
    #[arg(long)]
    mode: Option<String>,

    /// Dataset name used in checkpoint file names
    #[arg(long)]
    data: Option<String>,

    /// JSON dataset document
    #[arg(long)]
    dataset: Option<PathBuf>,

    #[arg(long)]
    model_folder: Option<PathBuf>,

    #[arg(long)]
    result_file: Option<PathBuf>,

    #[arg(long)]
    result_paras: Option<PathBuf>,
}

impl Cli {
    fn apply(self, settings: &mut Settings) -> Result<()> {
        let model = &mut settings.model;
        if let Some(gm) = self.gm {
            model.gm = gm;
        }
        if let Some(latent_dim) = self.latent_dim {
            model.latent_dim = parse_latent_dims(&latent_dim)?;
        }
        override_with(&mut model.out_dim, self.out_dim);
        override_with(&mut model.feat_dim, self.feat_dim);
        override_with(&mut model.attr_dim, self.attr_dim);
        override_with(&mut model.hidden, self.hidden);
        override_with(&mut model.num_class, self.num_class);
        override_with(&mut model.dropout, self.dropout);
        override_with(&mut model.sortpooling_k, self.sortpooling_k);
        override_with(&mut model.max_lv, self.max_lv);

        let training = &mut settings.training;
        override_with(&mut training.batch_size, self.batch_size);
        override_with(&mut training.num_epochs, self.num_epochs);
        override_with(&mut training.patience, self.patience);
        if !self.learning_rate.is_empty() {
            training.learning_rate = self.learning_rate;
        }
        override_with(&mut training.seed, self.seed);
        override_with(&mut training.fold, self.fold);
        if let Some(mode) = self.mode {
            training.mode = mode.parse()?;
        }

        override_with(&mut settings.data.data, self.data);
        override_with(&mut settings.data.dataset, self.dataset);
        override_with(&mut settings.output.model_folder, self.model_folder);
        override_with(&mut settings.output.result_file, self.result_file);
        override_with(&mut settings.output.result_paras, self.result_paras);
        Ok(())
    }
}

fn override_with<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    cli.apply(&mut settings)?;
    settings.validate()?;

    let source = JsonDatasetSource::new(settings.data.data.clone(), &settings.data.dataset);
    let splits = source
        .load()
        .with_context(|| format!("loading dataset {:?}", settings.data.dataset))?;
    let config = settings.training_config(&splits)?;

    match settings.training.mode {
        DeviceMode::Cpu => train::<Autodiff<NdArray<f32>>>(&settings, source.name(), config, &splits, &NdArrayDevice::default()),
        DeviceMode::Gpu => train_gpu(&settings, source.name(), config, &splits),
    }
}

#[cfg(feature = "wgpu")]
fn train_gpu(settings: &Settings, data: &str, config: TrainingConfig, splits: &GraphSplits) -> Result<()> {
    use burn_wgpu::{Wgpu, WgpuDevice};

    train::<Autodiff<Wgpu>>(settings, data, config, splits, &WgpuDevice::default())
}

#[cfg(not(feature = "wgpu"))]
fn train_gpu(_settings: &Settings, _data: &str, _config: TrainingConfig, _splits: &GraphSplits) -> Result<()> {
    Err(graphclf_rs::GraphClfError::UnsupportedDevice("gpu (rebuild with --features wgpu)".to_string()).into())
}

fn train<B: AutodiffBackend>(
    settings: &Settings,
    data: &str,
    config: TrainingConfig,
    splits: &GraphSplits,
    device: &B::Device,
) -> Result<()> {
    let (seed, fold) = (config.seed, config.fold);
    let controller = TrainingController::new(config)?;
    let mut store = CheckpointStore::new(&settings.output.model_folder, data, seed, fold);
    let writer = ResultWriter::new(&settings.output.result_file, &settings.output.result_paras);

    let outcome = controller.run_and_persist::<B, _>(splits, &mut store, &writer, device)?;
    info!(
        "trial {} won; test accuracy {:.5} written to {:?}",
        outcome.best_trial, outcome.test.accuracy, settings.output.result_file
    );
    Ok(())
}
