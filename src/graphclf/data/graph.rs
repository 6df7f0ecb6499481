//! Immutable per-sample graph record.

use nalgebra::DMatrix;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

use crate::graphclf::error::{GraphClfError, Result};

/// One labelled graph.
///
/// The structure is an undirected petgraph; node order inside the record is the
/// petgraph node index order and every per-node attribute (tags, feature rows)
/// follows it.
#[derive(Debug, Clone)]
pub struct GraphRecord {
    structure: UnGraph<(), ()>,
    label: usize,
    node_tags: Option<Vec<usize>>,
    node_features: Option<DMatrix<f32>>,
}

impl GraphRecord {
    /// Build a record from a node count, an undirected edge list and a class label.
    pub fn new(num_nodes: usize, edges: &[(usize, usize)], label: usize) -> Result<Self> {
        if num_nodes == 0 {
            return Err(GraphClfError::MalformedGraph {
                graph: 0,
                detail: "a graph needs at least one node".to_string(),
            });
        }

        let mut structure = UnGraph::with_capacity(num_nodes, edges.len());
        for _ in 0..num_nodes {
            structure.add_node(());
        }
        for &(u, v) in edges {
            if u >= num_nodes || v >= num_nodes {
                return Err(GraphClfError::MalformedGraph {
                    graph: 0,
                    detail: format!("edge ({u}, {v}) references a node outside 0..{num_nodes}"),
                });
            }
            structure.add_edge(NodeIndex::new(u), NodeIndex::new(v), ());
        }

        Ok(Self {
            structure,
            label,
            node_tags: None,
            node_features: None,
        })
    }

    /// Attach categorical node labels, one per node.
    pub fn with_node_tags(mut self, tags: Vec<usize>) -> Result<Self> {
        if tags.len() != self.num_nodes() {
            return Err(GraphClfError::MalformedGraph {
                graph: 0,
                detail: format!(
                    "{} node tags supplied for {} nodes",
                    tags.len(),
                    self.num_nodes()
                ),
            });
        }
        self.node_tags = Some(tags);
        Ok(self)
    }

    /// Attach a continuous attribute matrix of shape `(num_nodes, attr_dim)`.
    pub fn with_node_features(mut self, features: DMatrix<f32>) -> Result<Self> {
        if features.nrows() != self.num_nodes() {
            return Err(GraphClfError::MalformedGraph {
                graph: 0,
                detail: format!(
                    "feature matrix has {} rows for {} nodes",
                    features.nrows(),
                    self.num_nodes()
                ),
            });
        }
        self.node_features = Some(features);
        Ok(self)
    }

    pub fn num_nodes(&self) -> usize {
        self.structure.node_count()
    }

    pub fn num_edges(&self) -> usize {
        self.structure.edge_count()
    }

    pub fn label(&self) -> usize {
        self.label
    }

    pub fn node_tags(&self) -> Option<&[usize]> {
        self.node_tags.as_deref()
    }

    pub fn node_features(&self) -> Option<&DMatrix<f32>> {
        self.node_features.as_ref()
    }

    /// Width of the continuous attributes, zero when absent.
    pub fn attr_dim(&self) -> usize {
        self.node_features.as_ref().map_or(0, |m| m.ncols())
    }

    /// Undirected edges as `(source, target)` local node indices.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.structure
            .edge_references()
            .map(|e| (e.source().index(), e.target().index()))
    }

    /// Number of incident edge endpoints of `node` (a self loop counts twice).
    pub fn degree(&self, node: usize) -> usize {
        self.structure.edges(NodeIndex::new(node)).fold(0, |acc, e| {
            if e.source() == e.target() {
                acc + 2
            } else {
                acc + 1
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accessors() {
        let g = GraphRecord::new(3, &[(0, 1), (1, 2)], 1)
            .unwrap()
            .with_node_tags(vec![0, 2, 1])
            .unwrap();

        assert_eq!(g.num_nodes(), 3);
        assert_eq!(g.num_edges(), 2);
        assert_eq!(g.label(), 1);
        assert_eq!(g.node_tags(), Some(&[0, 2, 1][..]));
        assert!(g.node_features().is_none());
        assert_eq!(g.attr_dim(), 0);
        assert_eq!(g.degree(1), 2);
        assert_eq!(g.degree(0), 1);
    }

    #[test]
    fn test_rejects_edge_outside_graph() {
        let err = GraphRecord::new(2, &[(0, 2)], 0).unwrap_err();
        assert!(matches!(err, GraphClfError::MalformedGraph { .. }));
    }

    #[test]
    fn test_rejects_zero_nodes() {
        assert!(GraphRecord::new(0, &[], 0).is_err());
    }

    #[test]
    fn test_rejects_tag_length_mismatch() {
        let g = GraphRecord::new(2, &[(0, 1)], 0).unwrap();
        assert!(g.with_node_tags(vec![0]).is_err());
    }

    #[test]
    fn test_rejects_feature_row_mismatch() {
        let g = GraphRecord::new(2, &[(0, 1)], 0).unwrap();
        let features = DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 3.0]);
        assert!(g.with_node_features(features).is_err());
    }

    #[test]
    fn test_self_loop_degree() {
        let g = GraphRecord::new(1, &[(0, 0)], 0).unwrap();
        assert_eq!(g.degree(0), 2);
        assert_eq!(g.edges().collect::<Vec<_>>(), vec![(0, 0)]);
    }
}
