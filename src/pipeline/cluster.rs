// pipeline/cluster.rs
// Phase 3: Community detection - two partitioning strategies over the same region graph

mod leiden;
mod louvain;
mod network;

pub use leiden::Leiden;
pub use louvain::Louvain;

use crate::graph::{NodeId, RegionGraph};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Available partitioning strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Louvain,
    Leiden,
}

impl StrategyKind {
    /// Instantiate the strategy at the given modularity resolution
    pub fn partitioner(self, resolution: f64) -> Box<dyn Partitioner> {
        match self {
            StrategyKind::Louvain => Box::new(Louvain::new().with_resolution(resolution)),
            StrategyKind::Leiden => Box::new(Leiden::new().with_resolution(resolution)),
        }
    }
}

/// Total assignment of nodes to dense community ids
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partition {
    membership: Vec<usize>,
}

impl Partition {
    /// Build from arbitrary labels; ids are renumbered `0..c` in order of
    /// first appearance by node id.
    pub fn from_labels(labels: &[usize]) -> Self {
        let mut remap: HashMap<usize, usize> = HashMap::new();
        let membership = labels
            .iter()
            .map(|label| {
                let next = remap.len();
                *remap.entry(*label).or_insert(next)
            })
            .collect();
        Self { membership }
    }

    /// Every node in its own community
    pub fn singletons(node_count: usize) -> Self {
        Self {
            membership: (0..node_count).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.membership.len()
    }

    pub fn is_empty(&self) -> bool {
        self.membership.is_empty()
    }

    pub fn community_of(&self, node: NodeId) -> Option<usize> {
        self.membership.get(node).copied()
    }

    pub fn membership(&self) -> &[usize] {
        &self.membership
    }

    pub fn community_count(&self) -> usize {
        self.membership.iter().max().map(|m| m + 1).unwrap_or(0)
    }

    /// Members of each community, ascending
    pub fn communities(&self) -> Vec<Vec<NodeId>> {
        let mut groups = vec![Vec::new(); self.community_count()];
        for (node, &community) in self.membership.iter().enumerate() {
            groups[community].push(node);
        }
        groups
    }
}

/// A community detection strategy.
///
/// Implementations must be deterministic for a given graph and seed and must
/// return a total partition even for graphs without edges.
pub trait Partitioner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Partition `graph`, returning the partition and its modularity
    fn run(&self, graph: &RegionGraph, seed: u64) -> (Partition, f64);
}

/// Modularity of `partition` on `graph`:
/// `sum_c [ L_c / m - resolution * (d_c / 2m)^2 ]`.
///
/// Zero for a graph without edge weight.
pub fn modularity(graph: &RegionGraph, partition: &Partition, resolution: f64) -> f64 {
    let total: f64 = graph.edges.iter().map(|e| e.weight).sum();
    if total <= 0.0 {
        return 0.0;
    }

    let count = partition.community_count();
    let mut internal = vec![0.0; count];
    let mut degree = vec![0.0; count];

    for edge in &graph.edges {
        let (Some(cu), Some(cv)) = (
            partition.community_of(edge.source),
            partition.community_of(edge.target),
        ) else {
            continue;
        };
        degree[cu] += edge.weight;
        degree[cv] += edge.weight;
        if cu == cv {
            internal[cu] += edge.weight;
        }
    }

    internal
        .iter()
        .zip(&degree)
        .map(|(l, d)| l / total - resolution * (d / (2.0 * total)).powi(2))
        .sum()
}

/// Partitions and scores from both strategies
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub partition_a: Partition,
    pub partition_b: Partition,
    pub score_a: f64,
    pub score_b: f64,
}

/// Runs exactly two partitioners over the same graph
pub struct CommunityDetector {
    strategy_a: Box<dyn Partitioner>,
    strategy_b: Box<dyn Partitioner>,
    parallel: bool,
}

impl CommunityDetector {
    pub fn new(strategy_a: Box<dyn Partitioner>, strategy_b: Box<dyn Partitioner>) -> Self {
        Self {
            strategy_a,
            strategy_b,
            parallel: false,
        }
    }

    pub fn from_kinds(a: StrategyKind, b: StrategyKind, resolution: f64) -> Self {
        Self::new(a.partitioner(resolution), b.partitioner(resolution))
    }

    /// Run the strategies concurrently; each only reads the shared graph
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn strategy_names(&self) -> (&'static str, &'static str) {
        (self.strategy_a.name(), self.strategy_b.name())
    }

    pub fn detect(&self, graph: &RegionGraph, seed: u64) -> Detection {
        let ((partition_a, score_a), (partition_b, score_b)) = if self.parallel {
            rayon::join(
                || self.strategy_a.run(graph, seed),
                || self.strategy_b.run(graph, seed),
            )
        } else {
            (
                self.strategy_a.run(graph, seed),
                self.strategy_b.run(graph, seed),
            )
        };

        info!(
            "Modularity -> {}: {:.4} ({} communities) | {}: {:.4} ({} communities)",
            self.strategy_a.name(),
            score_a,
            partition_a.community_count(),
            self.strategy_b.name(),
            score_b,
            partition_b.community_count()
        );

        Detection {
            partition_a,
            partition_b,
            score_a,
            score_b,
        }
    }
}
