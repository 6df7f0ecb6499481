//! Structural view of a batch of graphs.
//!
//! Graphs are laid out block-diagonally: graph `i` owns the node rows
//! `offsets[i]..offsets[i] + graph_sizes[i]`. Message passing never builds an
//! `N x N` operator; it gathers rows along the directed edge list with
//! `select` and scatter-adds them back with `select_assign`, so memory grows
//! with the number of edges.

use burn::tensor::{backend::Backend, Int, Tensor, TensorData};

use super::graph::GraphRecord;

#[derive(Debug, Clone)]
pub struct GraphBatch {
    graph_sizes: Vec<usize>,
    offsets: Vec<usize>,
    /// Undirected edges in global node numbering.
    edges: Vec<(usize, usize)>,
    degrees: Vec<usize>,
}

/// Gather/scatter indices over the directed edges of a batch.
///
/// Directed edge `2i` is the undirected edge `i` as stored, `2i + 1` its reverse.
#[derive(Debug, Clone)]
pub struct EdgeIndex<B: Backend> {
    sources: Tensor<B, 1, Int>,
    targets: Tensor<B, 1, Int>,
    reverse: Tensor<B, 1, Int>,
    num_nodes: usize,
}

impl<B: Backend> EdgeIndex<B> {
    pub fn num_edges(&self) -> usize {
        self.sources.dims()[0]
    }

    /// `[N, D] -> [E, D]`: edge `u -> v` reads node `u`.
    pub fn node_to_edge(&self, nodes: Tensor<B, 2>) -> Tensor<B, 2> {
        nodes.select(0, self.sources.clone())
    }

    /// `[E, D] -> [N, D]`: node `v` sums every edge `u -> v`.
    pub fn edge_to_node(&self, edges: Tensor<B, 2>) -> Tensor<B, 2> {
        let [_, width] = edges.dims();
        Tensor::zeros([self.num_nodes, width], &edges.device()).select_assign(0, self.targets.clone(), edges)
    }

    /// `[E, D] -> [E, D]`: edge `u -> v` sums every `w -> u` except `v -> u`.
    pub fn edge_to_edge(&self, edges: Tensor<B, 2>) -> Tensor<B, 2> {
        let incoming = self.node_to_edge(self.edge_to_node(edges.clone()));
        incoming - edges.select(0, self.reverse.clone())
    }

    /// `[N, D] -> [N, D]`: each node sums its neighbours, parallel edges counted.
    pub fn neighbour_sum(&self, nodes: Tensor<B, 2>) -> Tensor<B, 2> {
        self.edge_to_node(self.node_to_edge(nodes))
    }
}

impl GraphBatch {
    pub fn new(batch: &[&GraphRecord]) -> Self {
        let mut graph_sizes = Vec::with_capacity(batch.len());
        let mut offsets = Vec::with_capacity(batch.len());
        let mut edges = Vec::new();
        let mut degrees = Vec::new();

        let mut offset = 0;
        for graph in batch {
            graph_sizes.push(graph.num_nodes());
            offsets.push(offset);
            edges.extend(graph.edges().map(|(u, v)| (u + offset, v + offset)));
            degrees.extend((0..graph.num_nodes()).map(|node| graph.degree(node)));
            offset += graph.num_nodes();
        }

        Self {
            graph_sizes,
            offsets,
            edges,
            degrees,
        }
    }

    pub fn num_graphs(&self) -> usize {
        self.graph_sizes.len()
    }

    pub fn total_nodes(&self) -> usize {
        self.degrees.len()
    }

    pub fn graph_sizes(&self) -> &[usize] {
        &self.graph_sizes
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn degrees(&self) -> &[usize] {
        &self.degrees
    }

    /// Both orientations of every undirected edge; `2i` and `2i + 1` are reverses.
    pub fn directed_edges(&self) -> Vec<(usize, usize)> {
        self.edges
            .iter()
            .flat_map(|&(u, v)| [(u, v), (v, u)])
            .collect()
    }

    /// Edge indices, or `None` when the batch has no edges at all.
    pub fn edge_index<B: Backend>(&self, device: &B::Device) -> Option<EdgeIndex<B>> {
        let directed = self.directed_edges();
        if directed.is_empty() {
            return None;
        }

        let sources: Vec<i64> = directed.iter().map(|&(u, _)| u as i64).collect();
        let targets: Vec<i64> = directed.iter().map(|&(_, v)| v as i64).collect();
        let reverse: Vec<i64> = (0..directed.len()).map(|idx| (idx ^ 1) as i64).collect();

        Some(EdgeIndex {
            sources: index_tensor(sources, device),
            targets: index_tensor(targets, device),
            reverse: index_tensor(reverse, device),
            num_nodes: self.total_nodes(),
        })
    }

    /// `[N, D] -> [G, D]`: sum of each graph's node rows.
    pub fn sum_pool<B: Backend>(&self, nodes: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = nodes.device();
        let [_, width] = nodes.dims();
        let graph_ids: Vec<i64> = self
            .graph_sizes
            .iter()
            .enumerate()
            .flat_map(|(graph, &size)| std::iter::repeat(graph as i64).take(size))
            .collect();

        Tensor::zeros([self.num_graphs(), width], &device).select_assign(0, index_tensor(graph_ids, &device), nodes)
    }

    /// `[N, 1]` column of `degree + 1`.
    pub fn degrees_plus_one<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        let values: Vec<f32> = self.degrees.iter().map(|&d| d as f32 + 1.0).collect();
        Tensor::from_data(TensorData::new(values, [self.total_nodes(), 1]), device)
    }
}

fn index_tensor<B: Backend>(indices: Vec<i64>, device: &B::Device) -> Tensor<B, 1, Int> {
    let len = indices.len();
    Tensor::from_data(TensorData::new(indices, [len]), device)
}
