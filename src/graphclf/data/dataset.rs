//! Dataset splits and the sources that produce them.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::graph::GraphRecord;
use crate::graphclf::error::{GraphClfError, Result};

/// Smallest k for which the sort-pooling convolution stack keeps a positive width.
pub const MIN_SORTPOOLING_K: usize = 10;

/// Three disjoint ordered sequences of graphs.
#[derive(Debug, Clone)]
pub struct GraphSplits {
    pub train: Vec<GraphRecord>,
    pub validation: Vec<GraphRecord>,
    pub test: Vec<GraphRecord>,
}

/// Dimensions derived from the data itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetDims {
    /// Tag vocabulary size (max tag + 1), zero if no graph has tags.
    pub feat_dim: usize,
    /// Continuous attribute width, zero if no graph has attributes.
    pub attr_dim: usize,
    /// Number of classes (max label + 1).
    pub num_class: usize,
}

impl GraphSplits {
    pub fn new(train: Vec<GraphRecord>, validation: Vec<GraphRecord>, test: Vec<GraphRecord>) -> Self {
        Self {
            train,
            validation,
            test,
        }
    }

    pub fn all(&self) -> impl Iterator<Item = &GraphRecord> {
        self.train.iter().chain(&self.validation).chain(&self.test)
    }

    pub fn infer_dims(&self) -> DatasetDims {
        let mut dims = DatasetDims {
            feat_dim: 0,
            attr_dim: 0,
            num_class: 0,
        };
        for graph in self.all() {
            if let Some(max_tag) = graph.node_tags().and_then(|tags| tags.iter().max()) {
                dims.feat_dim = dims.feat_dim.max(max_tag + 1);
            }
            dims.attr_dim = dims.attr_dim.max(graph.attr_dim());
            dims.num_class = dims.num_class.max(graph.label() + 1);
        }
        dims
    }

    /// Resolve the sort-pooling k.
    ///
    /// Values `<= 1` are a fraction: k becomes the node count at that quantile of
    /// the train and test graphs sorted by size. Larger values are taken as-is.
    pub fn resolve_sortpooling_k(&self, requested: f64) -> Result<usize> {
        if !(requested > 0.0) {
            return Err(GraphClfError::InvalidConfig(format!(
                "sortpooling_k must be positive, got {requested}"
            )));
        }

        let k = if requested <= 1.0 {
            let mut sizes: Vec<usize> = self
                .train
                .iter()
                .chain(&self.test)
                .map(GraphRecord::num_nodes)
                .collect();
            if sizes.is_empty() {
                return Err(GraphClfError::InvalidConfig(
                    "cannot derive sortpooling_k from an empty dataset".to_string(),
                ));
            }
            sizes.sort_unstable();
            let position = (requested * sizes.len() as f64).ceil() as usize;
            sizes[position.max(1) - 1]
        } else {
            requested.round() as usize
        };

        if k < MIN_SORTPOOLING_K {
            warn!(
                "sortpooling k {} is below the minimum of {}, clamping",
                k, MIN_SORTPOOLING_K
            );
        }
        let k = k.max(MIN_SORTPOOLING_K);
        info!("k used in SortPooling is: {}", k);
        Ok(k)
    }
}

/// Anything that can hand the trainer its three splits.
pub trait DatasetSource {
    /// Name used to key checkpoint files.
    fn name(&self) -> &str;

    fn load(&self) -> Result<GraphSplits>;
}

/// Serialized form of one graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEntry {
    pub num_nodes: usize,
    pub label: usize,
    #[serde(default)]
    pub edges: Vec<(usize, usize)>,
    #[serde(default)]
    pub node_tags: Option<Vec<usize>>,
    /// Row-major, one inner vector per node.
    #[serde(default)]
    pub node_features: Option<Vec<Vec<f32>>>,
}

impl GraphEntry {
    pub fn into_record(self, index: usize) -> Result<GraphRecord> {
        let tag_graph = |err: GraphClfError| match err {
            GraphClfError::MalformedGraph { detail, .. } => GraphClfError::MalformedGraph {
                graph: index,
                detail,
            },
            other => other,
        };

        let mut record = GraphRecord::new(self.num_nodes, &self.edges, self.label).map_err(tag_graph)?;
        if let Some(tags) = self.node_tags {
            record = record.with_node_tags(tags).map_err(tag_graph)?;
        }
        if let Some(rows) = self.node_features {
            let width = rows.first().map_or(0, Vec::len);
            if rows.iter().any(|row| row.len() != width) {
                return Err(GraphClfError::MalformedGraph {
                    graph: index,
                    detail: "node feature rows have different widths".to_string(),
                });
            }
            let flat: Vec<f32> = rows.iter().flatten().copied().collect();
            let matrix = DMatrix::from_row_slice(rows.len(), width, &flat);
            record = record.with_node_features(matrix).map_err(tag_graph)?;
        }
        Ok(record)
    }
}

/// Serialized form of a whole dataset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetFile {
    pub train: Vec<GraphEntry>,
    pub validation: Vec<GraphEntry>,
    pub test: Vec<GraphEntry>,
}

impl DatasetFile {
    pub fn into_splits(self) -> Result<GraphSplits> {
        let convert = |entries: Vec<GraphEntry>| -> Result<Vec<GraphRecord>> {
            entries
                .into_iter()
                .enumerate()
                .map(|(i, entry)| entry.into_record(i))
                .collect()
        };
        Ok(GraphSplits::new(
            convert(self.train)?,
            convert(self.validation)?,
            convert(self.test)?,
        ))
    }
}

/// Reads a [`DatasetFile`] from a JSON document.
#[derive(Debug, Clone)]
pub struct JsonDatasetSource {
    name: String,
    path: PathBuf,
}

impl JsonDatasetSource {
    pub fn new(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl DatasetSource for JsonDatasetSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<GraphSplits> {
        let reader = BufReader::new(File::open(&self.path)?);
        let file: DatasetFile = serde_json::from_reader(reader)?;
        let splits = file.into_splits()?;
        info!(
            "# train: {}, # validation: {}, # test: {}",
            splits.train.len(),
            splits.validation.len(),
            splits.test.len()
        );
        Ok(splits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{attributed_graph, plain_graph, tagged_graph};
    use std::io::Write;

    fn sized(sizes: &[usize]) -> Vec<GraphRecord> {
        sizes.iter().map(|&n| plain_graph(n, &[], 0)).collect()
    }

    #[test]
    fn test_infer_dims() {
        let splits = GraphSplits::new(
            vec![tagged_graph(2, &[(0, 1)], &[0, 4], 2)],
            vec![attributed_graph(1, &[], None, &[1.0, 2.0, 3.0], 3, 0)],
            vec![plain_graph(1, &[], 1)],
        );
        assert_eq!(
            splits.infer_dims(),
            DatasetDims {
                feat_dim: 5,
                attr_dim: 3,
                num_class: 3
            }
        );
    }

    #[test]
    fn test_fractional_k_uses_train_and_test_quantile() {
        let train = sized(&[12, 30, 11, 40]);
        let test = sized(&[20]);
        // validation sizes never take part
        let splits = GraphSplits::new(train, sized(&[1000]), test);
        // sorted: 11 12 20 30 40, ceil(0.5 * 5) = 3 -> 20
        assert_eq!(splits.resolve_sortpooling_k(0.5).unwrap(), 20);
        assert_eq!(splits.resolve_sortpooling_k(1.0).unwrap(), 40);
    }

    #[test]
    fn test_integer_k_and_clamp() {
        let splits = GraphSplits::new(sized(&[3, 4]), vec![], sized(&[5]));
        assert_eq!(splits.resolve_sortpooling_k(35.0).unwrap(), 35);
        assert_eq!(splits.resolve_sortpooling_k(0.5).unwrap(), MIN_SORTPOOLING_K);
        assert!(splits.resolve_sortpooling_k(0.0).is_err());
    }

    #[test]
    fn test_json_source_loads_all_splits() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "train": [{{"num_nodes": 2, "label": 1, "edges": [[0, 1]], "node_tags": [0, 1]}}],
                "validation": [{{"num_nodes": 1, "label": 0, "node_tags": [1]}}],
                "test": [{{"num_nodes": 2, "label": 0, "edges": [[0, 1]], "node_tags": [1, 1],
                          "node_features": [[0.5], [1.5]]}}]
            }}"#
        )
        .unwrap();

        let source = JsonDatasetSource::new("toy", file.path());
        assert_eq!(source.name(), "toy");
        let splits = source.load().unwrap();
        assert_eq!(splits.train.len(), 1);
        assert_eq!(splits.train[0].num_edges(), 1);
        assert_eq!(splits.validation[0].node_tags(), Some(&[1][..]));
        assert_eq!(splits.test[0].attr_dim(), 1);
    }

    #[test]
    fn test_bad_entry_reports_its_index() {
        let file = DatasetFile {
            train: vec![
                GraphEntry {
                    num_nodes: 1,
                    label: 0,
                    edges: vec![],
                    node_tags: None,
                    node_features: None,
                },
                GraphEntry {
                    num_nodes: 1,
                    label: 0,
                    edges: vec![(0, 3)],
                    node_tags: None,
                    node_features: None,
                },
            ],
            ..Default::default()
        };
        let err = file.into_splits().unwrap_err();
        assert!(matches!(err, GraphClfError::MalformedGraph { graph: 1, .. }));
    }
}
