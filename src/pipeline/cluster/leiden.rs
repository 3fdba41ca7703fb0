// pipeline/cluster/leiden.rs
// Phase 3: Leiden community detection (Traag, Waltman & van Eck 2019)
//
// Same local moving as Louvain, followed by a refinement phase: each
// community is rebuilt from singletons by merging only well-connected
// sub-communities, and the *refined* partition is what gets aggregated. The
// final partition is split into connected pieces, so every community returned
// is internally connected.

use super::network::{relabel, split_disconnected, Network};
use super::{modularity, Partition, Partitioner};
use crate::graph::RegionGraph;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

const MAX_LEVELS: usize = 32;

/// Randomness of the refinement merge choice; lower is greedier
const DEFAULT_THETA: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct Leiden {
    resolution: f64,
    theta: f64,
}

impl Leiden {
    pub fn new() -> Self {
        Self {
            resolution: 1.0,
            theta: DEFAULT_THETA,
        }
    }

    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_theta(mut self, theta: f64) -> Self {
        self.theta = theta;
        self
    }

    /// Rebuild each community of `membership` from singletons, merging a
    /// node only into a well-connected sub-community of its own community.
    /// Returns dense refined labels and their count.
    fn refine(
        &self,
        net: &Network,
        membership: &[usize],
        community_count: usize,
        rng: &mut StdRng,
    ) -> (Vec<usize>, usize) {
        let n = net.len();
        let two_m = 2.0 * net.total_weight;
        let gamma = self.resolution;

        let mut community_strength = vec![0.0; community_count];
        for v in 0..n {
            community_strength[membership[v]] += net.strength[v];
        }

        let mut refined: Vec<usize> = (0..n).collect();
        let mut sub_strength = net.strength.clone();
        // Weight from each sub-community to the rest of its community
        let mut external: Vec<f64> = (0..n)
            .map(|v| {
                net.adj[v]
                    .iter()
                    .filter(|(u, _)| membership[*u] == membership[v])
                    .map(|(_, w)| w)
                    .sum()
            })
            .collect();
        let mut alone = vec![true; n];

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);

        let mut weight_to = vec![0.0; n];
        let mut touched: Vec<usize> = Vec::new();

        for v in order {
            if !alone[v] {
                continue;
            }
            let c = membership[v];
            let k_v = net.strength[v];
            let total_c = community_strength[c];

            if external[v] < gamma * k_v * (total_c - k_v) / two_m {
                continue;
            }

            for &(u, w) in &net.adj[v] {
                if membership[u] != c {
                    continue;
                }
                let t = refined[u];
                if weight_to[t] == 0.0 {
                    touched.push(t);
                }
                weight_to[t] += w;
            }

            // Staying alone has gain 0 and is always a candidate
            let mut candidates: Vec<(usize, f64)> = vec![(v, 0.0)];
            for &t in &touched {
                let s_t = sub_strength[t];
                if external[t] < gamma * s_t * (total_c - s_t) / two_m {
                    continue;
                }
                let gain = weight_to[t] - gamma * k_v * s_t / two_m;
                if gain >= 0.0 {
                    candidates.push((t, gain));
                }
            }

            let chosen = self.choose(&candidates, rng);
            if chosen != v {
                let w_vt = weight_to[chosen];
                refined[v] = chosen;
                sub_strength[chosen] += k_v;
                sub_strength[v] = 0.0;
                external[chosen] += external[v] - 2.0 * w_vt;
                external[v] = 0.0;
                alone[v] = false;
                alone[chosen] = false;
            }

            for &t in &touched {
                weight_to[t] = 0.0;
            }
            touched.clear();
        }

        relabel(&refined)
    }

    /// Pick a candidate with probability proportional to `exp(gain / theta)`
    fn choose(&self, candidates: &[(usize, f64)], rng: &mut StdRng) -> usize {
        let best = candidates
            .iter()
            .map(|&(_, g)| g)
            .fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = candidates
            .iter()
            .map(|&(_, g)| ((g - best) / self.theta).exp())
            .collect();
        let total: f64 = weights.iter().sum();

        let mut draw = rng.gen::<f64>() * total;
        for (&(t, _), w) in candidates.iter().zip(&weights) {
            if draw < *w {
                return t;
            }
            draw -= w;
        }
        candidates[candidates.len() - 1].0
    }
}

impl Default for Leiden {
    fn default() -> Self {
        Self::new()
    }
}

impl Partitioner for Leiden {
    fn name(&self) -> &'static str {
        "leiden"
    }

    fn run(&self, graph: &RegionGraph, seed: u64) -> (Partition, f64) {
        let n = graph.node_count();
        let mut net = Network::from_graph(graph);
        if net.total_weight <= 0.0 {
            return (Partition::singletons(n), 0.0);
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut assignment: Vec<usize> = (0..n).collect();
        let mut membership: Vec<usize> = (0..n).collect();

        for level in 0..MAX_LEVELS {
            net.move_nodes(&mut membership, self.resolution, &mut rng);
            let (dense, count) = relabel(&membership);
            membership = dense;
            if count == net.len() {
                break;
            }

            let (mut refined, mut refined_count) =
                self.refine(&net, &membership, count, &mut rng);
            if refined_count == net.len() {
                // Refinement merged nothing; aggregate the communities directly
                refined = membership.clone();
                refined_count = count;
            }

            let mut next = vec![0; refined_count];
            for v in 0..net.len() {
                next[refined[v]] = membership[v];
            }
            for node in assignment.iter_mut() {
                *node = refined[*node];
            }

            debug!(
                level,
                communities = count,
                refined = refined_count,
                "leiden level aggregated"
            );
            net = net.aggregate(&refined, refined_count);
            membership = next;
        }

        let labels: Vec<usize> = assignment.iter().map(|&a| membership[a]).collect();
        let partition = Partition::from_labels(&split_disconnected(graph, &labels));
        let score = modularity(graph, &partition, self.resolution);
        (partition, score)
    }
}
