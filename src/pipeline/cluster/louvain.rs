// pipeline/cluster/louvain.rs
// Phase 3: Louvain modularity optimization (Blondel et al. 2008)
//
// Alternates greedy local moving with aggregation of the communities found,
// until local moving leaves every node where it is.

use super::network::{relabel, Network};
use super::{modularity, Partition, Partitioner};
use crate::graph::RegionGraph;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

/// Levels beyond this are not attempted
const MAX_LEVELS: usize = 32;

#[derive(Debug, Clone)]
pub struct Louvain {
    resolution: f64,
}

impl Louvain {
    pub fn new() -> Self {
        Self { resolution: 1.0 }
    }

    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }
}

impl Default for Louvain {
    fn default() -> Self {
        Self::new()
    }
}

impl Partitioner for Louvain {
    fn name(&self) -> &'static str {
        "louvain"
    }

    fn run(&self, graph: &RegionGraph, seed: u64) -> (Partition, f64) {
        let n = graph.node_count();
        let mut net = Network::from_graph(graph);
        if net.total_weight <= 0.0 {
            return (Partition::singletons(n), 0.0);
        }

        let mut rng = StdRng::seed_from_u64(seed);
        // Original node -> node of the current level
        let mut assignment: Vec<usize> = (0..n).collect();

        for level in 0..MAX_LEVELS {
            let mut membership: Vec<usize> = (0..net.len()).collect();
            if !net.move_nodes(&mut membership, self.resolution, &mut rng) {
                break;
            }

            let (membership, count) = relabel(&membership);
            for node in assignment.iter_mut() {
                *node = membership[*node];
            }
            debug!(level, communities = count, "louvain level aggregated");
            net = net.aggregate(&membership, count);
        }

        let partition = Partition::from_labels(&assignment);
        let score = modularity(graph, &partition, self.resolution);
        (partition, score)
    }
}
