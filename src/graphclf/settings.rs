//! Run settings.
//!
//! Layering, lowest priority first: built-in defaults, a TOML file, then
//! `GRAPHCLF__<SECTION>__<KEY>` environment variables. The binary applies its
//! command-line flags on top. Settings are turned into explicit component
//! configs by [`Settings::training_config`]; nothing reads them globally.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::graphclf::architectures::classifier::ClassifierConfig;
use crate::graphclf::architectures::embedding::{EmbeddingConfig, EmbeddingKind};
use crate::graphclf::data::dataset::GraphSplits;
use crate::graphclf::data::features::PresenceFlags;
use crate::graphclf::error::{GraphClfError, Result};
use crate::graphclf::train::controller::TrainingConfig;

/// Configuration file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "graphclf";

/// Compute device for training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceMode {
    Cpu,
    Gpu,
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMode::Cpu => f.write_str("cpu"),
            DeviceMode::Gpu => f.write_str("gpu"),
        }
    }
}

impl FromStr for DeviceMode {
    type Err = GraphClfError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cpu" => Ok(DeviceMode::Cpu),
            "gpu" => Ok(DeviceMode::Gpu),
            other => Err(GraphClfError::UnsupportedDevice(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSettings {
    /// Dataset name, used to key checkpoint files.
    pub data: String,
    /// JSON dataset document.
    pub dataset: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Embedding variant: `mean_field`, `loopy_bp` or `DGCNN`.
    pub gm: String,
    pub latent_dim: Vec<usize>,
    /// Embedding output width; 0 keeps the variant's natural width.
    pub out_dim: usize,
    /// Tag vocabulary size; 0 infers it from the dataset.
    pub feat_dim: usize,
    /// Continuous attribute width; 0 infers it from the dataset.
    pub attr_dim: usize,
    pub hidden: usize,
    /// Number of classes; 0 infers it from the dataset.
    pub num_class: usize,
    pub dropout: bool,
    /// Integer k, or a fraction `<= 1` resolved against graph sizes.
    pub sortpooling_k: f64,
    pub max_lv: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSettings {
    pub batch_size: usize,
    pub num_epochs: usize,
    pub patience: usize,
    /// One trial per learning rate.
    pub learning_rate: Vec<f64>,
    pub seed: u64,
    pub fold: usize,
    pub mode: DeviceMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSettings {
    pub model_folder: PathBuf,
    pub result_file: PathBuf,
    pub result_paras: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub data: DataSettings,
    pub model: ModelSettings,
    pub training: TrainingSettings,
    pub output: OutputSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data: DataSettings {
                data: "dataset".to_string(),
                dataset: PathBuf::from("data/dataset.json"),
            },
            model: ModelSettings {
                gm: "DGCNN".to_string(),
                latent_dim: vec![32, 32, 32, 1],
                out_dim: 0,
                feat_dim: 0,
                attr_dim: 0,
                hidden: 128,
                num_class: 0,
                dropout: true,
                sortpooling_k: 0.6,
                max_lv: 4,
            },
            training: TrainingSettings {
                batch_size: 50,
                num_epochs: 1000,
                patience: 10,
                learning_rate: vec![0.0001],
                seed: 1,
                fold: 1,
                mode: DeviceMode::Cpu,
            },
            output: OutputSettings {
                model_folder: PathBuf::from("models"),
                result_file: PathBuf::from("results/acc_results.txt"),
                result_paras: PathBuf::from("results/paras.txt"),
            },
        }
    }
}

impl Settings {
    /// Load settings; an explicit `config_file` must exist, the default one may not.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let defaults = Settings::default();
        let file = match config_file {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = Config::builder()
            .set_default("data.data", defaults.data.data)?
            .set_default("data.dataset", defaults.data.dataset.to_string_lossy().to_string())?
            .set_default("model.gm", defaults.model.gm)?
            .set_default("model.latent_dim", to_i64(&defaults.model.latent_dim))?
            .set_default("model.out_dim", defaults.model.out_dim as i64)?
            .set_default("model.feat_dim", defaults.model.feat_dim as i64)?
            .set_default("model.attr_dim", defaults.model.attr_dim as i64)?
            .set_default("model.hidden", defaults.model.hidden as i64)?
            .set_default("model.num_class", defaults.model.num_class as i64)?
            .set_default("model.dropout", defaults.model.dropout)?
            .set_default("model.sortpooling_k", defaults.model.sortpooling_k)?
            .set_default("model.max_lv", defaults.model.max_lv as i64)?
            .set_default("training.batch_size", defaults.training.batch_size as i64)?
            .set_default("training.num_epochs", defaults.training.num_epochs as i64)?
            .set_default("training.patience", defaults.training.patience as i64)?
            .set_default("training.learning_rate", defaults.training.learning_rate)?
            .set_default("training.seed", defaults.training.seed as i64)?
            .set_default("training.fold", defaults.training.fold as i64)?
            .set_default("training.mode", defaults.training.mode.to_string())?
            .set_default("output.model_folder", defaults.output.model_folder.to_string_lossy().to_string())?
            .set_default("output.result_file", defaults.output.result_file.to_string_lossy().to_string())?
            .set_default("output.result_paras", defaults.output.result_paras.to_string_lossy().to_string())?
            .add_source(file)
            .add_source(
                Environment::with_prefix("GRAPHCLF")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("model.latent_dim")
                    .with_list_parse_key("training.learning_rate"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn embedding_kind(&self) -> Result<EmbeddingKind> {
        self.model.gm.parse()
    }

    pub fn validate(&self) -> Result<()> {
        self.embedding_kind()?;
        let checks = [
            (self.model.latent_dim.is_empty(), "latent_dim must not be empty"),
            (self.model.hidden == 0, "hidden must be positive"),
            (self.training.batch_size == 0, "batch_size must be positive"),
            (self.training.learning_rate.is_empty(), "at least one learning_rate is required"),
            (!(self.model.sortpooling_k > 0.0), "sortpooling_k must be positive"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(GraphClfError::InvalidConfig(message.to_string())),
            None => Ok(()),
        }
    }

    /// Resolve data-dependent values and build the trainer's config.
    ///
    /// Zero `feat_dim`, `attr_dim` or `num_class` are inferred from `splits`;
    /// the node feature width follows the presence flags of the first graph.
    pub fn training_config(&self, splits: &GraphSplits) -> Result<TrainingConfig> {
        self.validate()?;
        let kind = self.embedding_kind()?;
        let first = splits.all().next().ok_or_else(|| {
            GraphClfError::InvalidConfig("dataset contains no graphs".to_string())
        })?;

        let inferred = splits.infer_dims();
        let or_inferred = |configured: usize, derived: usize| if configured > 0 { configured } else { derived };
        let feat_dim = or_inferred(self.model.feat_dim, inferred.feat_dim);
        let attr_dim = or_inferred(self.model.attr_dim, inferred.attr_dim);
        let num_class = or_inferred(self.model.num_class, inferred.num_class);

        let num_node_feats = PresenceFlags::of(first).output_width(feat_dim, attr_dim);
        let sortpooling_k = match kind {
            EmbeddingKind::Dgcnn => splits.resolve_sortpooling_k(self.model.sortpooling_k)?,
            _ => self.model.sortpooling_k.round().max(1.0) as usize,
        };

        let embedding = EmbeddingConfig::new(kind, self.model.latent_dim.clone(), self.model.out_dim, num_node_feats)
            .with_max_lv(self.model.max_lv)
            .with_sortpooling_k(sortpooling_k);
        let classifier = ClassifierConfig::new(embedding, feat_dim, self.model.hidden, num_class)
            .with_dropout(self.model.dropout);

        Ok(TrainingConfig::new(classifier, self.training.learning_rate.clone())
            .with_batch_size(self.training.batch_size)
            .with_num_epochs(self.training.num_epochs)
            .with_patience(self.training.patience)
            .with_seed(self.training.seed)
            .with_fold(self.training.fold))
    }
}

/// Parse the `32-32-32-1` layer list syntax.
pub fn parse_latent_dims(text: &str) -> Result<Vec<usize>> {
    text.split('-')
        .map(|part| {
            part.trim()
                .parse::<usize>()
                .map_err(|_| GraphClfError::InvalidConfig(format!("bad latent_dim entry '{part}' in '{text}'")))
        })
        .collect()
}

fn to_i64(values: &[usize]) -> Vec<i64> {
    values.iter().map(|&v| v as i64).collect()
}
