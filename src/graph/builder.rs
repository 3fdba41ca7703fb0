// graph/builder.rs
// Phase 2: Graph builder - turns a similarity matrix into a sparse k-NN region graph

use super::matrix::FeatureMatrix;
use super::similarity::{similarity, SimilarityMetric, SimilarityOutcome};
use super::{NodeId, RegionGraph};
use crate::error::{Error, Result};
use tracing::debug;

/// Output of graph construction; the similarity matrix is handed back so
/// later stages need not recompute it.
#[derive(Debug, Clone)]
pub struct BuiltGraph {
    pub graph: RegionGraph,
    pub similarity: SimilarityOutcome,
}

pub struct GraphBuilder {
    k: usize,
    metric: SimilarityMetric,
}

impl GraphBuilder {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            metric: SimilarityMetric::Cosine,
        }
    }

    pub fn with_metric(mut self, metric: SimilarityMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Build the k-NN graph over the rows of `features`
    pub fn build(&self, features: &FeatureMatrix) -> Result<BuiltGraph> {
        if self.k == 0 {
            return Err(Error::Configuration(
                "neighbor count k must be at least 1".to_string(),
            ));
        }

        let outcome = similarity(features, self.metric);
        let n = features.nrows();
        let mut graph = RegionGraph::with_nodes(n, self.k, outcome.used);

        for i in 0..n {
            for (j, weight) in self.nearest(&outcome, i) {
                // Non-positive similarity never becomes an edge
                graph.add_edge(i, j, weight);
            }
        }

        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            k = self.k,
            "k-NN graph built"
        );

        Ok(BuiltGraph {
            graph,
            similarity: outcome,
        })
    }

    /// Top-k other nodes by descending similarity; ties go to the lower index
    fn nearest(&self, outcome: &SimilarityOutcome, i: NodeId) -> Vec<(NodeId, f64)> {
        let mut candidates: Vec<(NodeId, f64)> = outcome
            .matrix
            .row(i)
            .iter()
            .copied()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .collect();

        // Stable sort keeps index order among equal similarities
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        candidates.truncate(self.k);
        candidates
    }
}

/// Build a k-NN graph with the given metric
pub fn build_graph(
    features: &FeatureMatrix,
    k: usize,
    metric: SimilarityMetric,
) -> Result<BuiltGraph> {
    GraphBuilder::new(k).with_metric(metric).build(features)
}
