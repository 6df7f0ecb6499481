// Test utilities for building small graph datasets
//
// Shared by unit tests, integration tests and benches. Everything here is
// deterministic: no RNG is involved, datasets are derived from their index.

use nalgebra::DMatrix;

use crate::graphclf::data::dataset::GraphSplits;
use crate::graphclf::data::graph::GraphRecord;

/// Graph without node tags or attributes.
pub fn plain_graph(num_nodes: usize, edges: &[(usize, usize)], label: usize) -> GraphRecord {
    GraphRecord::new(num_nodes, edges, label).expect("valid test graph")
}

/// Graph carrying categorical node tags.
pub fn tagged_graph(
    num_nodes: usize,
    edges: &[(usize, usize)],
    tags: &[usize],
    label: usize,
) -> GraphRecord {
    plain_graph(num_nodes, edges, label)
        .with_node_tags(tags.to_vec())
        .expect("tag count matches node count")
}

/// Graph carrying continuous attributes (row-major `values`) and optional tags.
pub fn attributed_graph(
    num_nodes: usize,
    edges: &[(usize, usize)],
    tags: Option<&[usize]>,
    values: &[f32],
    attr_dim: usize,
    label: usize,
) -> GraphRecord {
    let mut graph = plain_graph(num_nodes, edges, label);
    if let Some(tags) = tags {
        graph = graph
            .with_node_tags(tags.to_vec())
            .expect("tag count matches node count");
    }
    graph
        .with_node_features(DMatrix::from_row_slice(num_nodes, attr_dim, values))
        .expect("feature rows match node count")
}

/// Path graph `0 - 1 - ... - (n-1)`.
pub fn path_edges(num_nodes: usize) -> Vec<(usize, usize)> {
    (1..num_nodes).map(|i| (i - 1, i)).collect()
}

/// Cycle graph over `num_nodes` nodes.
pub fn cycle_edges(num_nodes: usize) -> Vec<(usize, usize)> {
    let mut edges = path_edges(num_nodes);
    if num_nodes > 2 {
        edges.push((num_nodes - 1, 0));
    }
    edges
}

/// Two-class toy problem: label 0 graphs are paths, label 1 graphs are cycles.
///
/// Node tags are the node degree capped at 2, so `feat_dim = 3`. Graph sizes
/// cycle through `min_nodes..min_nodes + 4`.
pub fn path_vs_cycle_graphs(count: usize, min_nodes: usize) -> Vec<GraphRecord> {
    (0..count)
        .map(|i| {
            let n = min_nodes + i % 4;
            let label = i % 2;
            let edges = if label == 0 { path_edges(n) } else { cycle_edges(n) };
            let graph = plain_graph(n, &edges, label);
            let tags: Vec<usize> = (0..n).map(|v| graph.degree(v).min(2)).collect();
            graph.with_node_tags(tags).expect("tag count matches node count")
        })
        .collect()
}

/// Train/validation/test splits of the path-vs-cycle problem.
pub fn path_vs_cycle_splits(train: usize, validation: usize, test: usize) -> GraphSplits {
    GraphSplits::new(
        path_vs_cycle_graphs(train, 4),
        path_vs_cycle_graphs(validation, 5),
        path_vs_cycle_graphs(test, 6),
    )
}
