// pipeline/cluster/network.rs
// Phase 3: Weighted working graph shared by the partitioning strategies
// Nodes of an aggregated network are communities of the level below.

use crate::graph::RegionGraph;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, VecDeque};

/// Gains smaller than this are treated as ties
pub(super) const GAIN_EPSILON: f64 = 1e-12;

/// Upper bound on local-moving sweeps per level
const MAX_SWEEPS: usize = 64;

#[derive(Debug, Clone)]
pub(super) struct Network {
    /// Neighbor lists without self-loops; both directions present
    pub adj: Vec<Vec<(usize, f64)>>,
    /// Weight folded into each node by aggregation
    pub self_loops: Vec<f64>,
    /// Weighted degree, self-loops counted twice
    pub strength: Vec<f64>,
    /// Total edge weight `m`
    pub total_weight: f64,
}

impl Network {
    pub fn from_graph(graph: &RegionGraph) -> Self {
        let adj = graph.adjacency();
        let strength = adj
            .iter()
            .map(|n| n.iter().map(|(_, w)| w).sum::<f64>())
            .collect();
        Self {
            self_loops: vec![0.0; adj.len()],
            adj,
            strength,
            total_weight: graph.edges.iter().map(|e| e.weight).sum(),
        }
    }

    pub fn len(&self) -> usize {
        self.adj.len()
    }

    /// Collapse every community of `membership` (dense ids below `count`) into
    /// a single node.
    pub fn aggregate(&self, membership: &[usize], count: usize) -> Network {
        let mut self_loops = vec![0.0; count];
        let mut between: BTreeMap<(usize, usize), f64> = BTreeMap::new();

        for u in 0..self.len() {
            let cu = membership[u];
            self_loops[cu] += self.self_loops[u];
            for &(v, w) in &self.adj[u] {
                if u >= v {
                    continue;
                }
                let cv = membership[v];
                if cu == cv {
                    self_loops[cu] += w;
                } else {
                    *between.entry((cu.min(cv), cu.max(cv))).or_insert(0.0) += w;
                }
            }
        }

        let mut adj = vec![Vec::new(); count];
        for ((a, b), w) in between {
            adj[a].push((b, w));
            adj[b].push((a, w));
        }

        let strength = (0..count)
            .map(|c| 2.0 * self_loops[c] + adj[c].iter().map(|(_, w)| w).sum::<f64>())
            .collect();

        Network {
            adj,
            self_loops,
            strength,
            total_weight: self.total_weight,
        }
    }

    /// Greedy local moving. Nodes are visited in a seeded random order and
    /// moved to the neighboring community with the largest strictly positive
    /// modularity gain, until a sweep moves nothing.
    ///
    /// `membership` ids must be below `self.len()`. Returns whether any node
    /// changed community.
    pub fn move_nodes(&self, membership: &mut [usize], resolution: f64, rng: &mut StdRng) -> bool {
        let n = self.len();
        let two_m = 2.0 * self.total_weight;
        let mut totals = vec![0.0; n];
        for v in 0..n {
            totals[membership[v]] += self.strength[v];
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);

        let mut weight_to = vec![0.0; n];
        let mut touched: Vec<usize> = Vec::new();
        let mut changed = false;

        for _ in 0..MAX_SWEEPS {
            let mut moved = false;

            for &v in &order {
                let current = membership[v];
                let k_v = self.strength[v];

                for &(u, w) in &self.adj[v] {
                    let c = membership[u];
                    if weight_to[c] == 0.0 {
                        touched.push(c);
                    }
                    weight_to[c] += w;
                }

                totals[current] -= k_v;
                let mut best = current;
                let mut best_gain = weight_to[current] - resolution * totals[current] * k_v / two_m;

                for &c in &touched {
                    let gain = weight_to[c] - resolution * totals[c] * k_v / two_m;
                    if gain > best_gain + GAIN_EPSILON {
                        best = c;
                        best_gain = gain;
                    }
                }

                totals[best] += k_v;
                if best != current {
                    membership[v] = best;
                    moved = true;
                    changed = true;
                }

                for &c in &touched {
                    weight_to[c] = 0.0;
                }
                touched.clear();
            }

            if !moved {
                break;
            }
        }

        changed
    }
}

/// Renumber labels densely by first appearance; returns the count
pub(super) fn relabel(labels: &[usize]) -> (Vec<usize>, usize) {
    let mut remap = vec![usize::MAX; labels.iter().max().map(|m| m + 1).unwrap_or(0)];
    let mut next = 0;
    let dense = labels
        .iter()
        .map(|&l| {
            if remap[l] == usize::MAX {
                remap[l] = next;
                next += 1;
            }
            remap[l]
        })
        .collect();
    (dense, next)
}

/// Split communities that are not connected inside themselves into their
/// connected pieces. Never lowers modularity since the pieces share no edges.
pub(super) fn split_disconnected(graph: &RegionGraph, labels: &[usize]) -> Vec<usize> {
    let adj = graph.adjacency();
    let mut split = vec![usize::MAX; labels.len()];
    let mut next = 0;

    for start in 0..labels.len() {
        if split[start] != usize::MAX {
            continue;
        }
        split[start] = next;
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for &(neighbor, _) in &adj[node] {
                if split[neighbor] == usize::MAX && labels[neighbor] == labels[start] {
                    split[neighbor] = next;
                    queue.push_back(neighbor);
                }
            }
        }
        next += 1;
    }

    split
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::similarity::SimilarityMetric;
    use rand::SeedableRng;

    fn path(n: usize) -> RegionGraph {
        let mut g = RegionGraph::with_nodes(n, 1, SimilarityMetric::Cosine);
        for i in 1..n {
            g.add_edge(i - 1, i, 1.0);
        }
        g
    }

    #[test]
    fn test_aggregate_preserves_weight() {
        let net = Network::from_graph(&path(4));
        let agg = net.aggregate(&[0, 0, 1, 1], 2);

        assert_eq!(agg.len(), 2);
        assert_eq!(agg.self_loops, vec![1.0, 1.0]);
        assert_eq!(agg.adj[0], vec![(1, 1.0)]);
        assert_eq!(agg.total_weight, 3.0);

        let total_strength: f64 = agg.strength.iter().sum();
        assert!((total_strength - 2.0 * agg.total_weight).abs() < 1e-12);
    }

    #[test]
    fn test_relabel() {
        assert_eq!(relabel(&[4, 4, 1, 0, 1]), (vec![0, 0, 1, 2, 1], 3));
        assert_eq!(relabel(&[]), (vec![], 0));
    }

    #[test]
    fn test_split_disconnected() {
        // 0-1 and 2-3 are separate components sharing a label
        let mut g = RegionGraph::with_nodes(4, 1, SimilarityMetric::Cosine);
        g.add_edge(0, 1, 1.0);
        g.add_edge(2, 3, 1.0);
        assert_eq!(split_disconnected(&g, &[0, 0, 0, 0]), vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_move_nodes_merges_pairs() {
        let mut g = RegionGraph::with_nodes(4, 1, SimilarityMetric::Cosine);
        g.add_edge(0, 1, 1.0);
        g.add_edge(2, 3, 1.0);
        let net = Network::from_graph(&g);
        let mut membership: Vec<usize> = (0..4).collect();
        let mut rng = StdRng::seed_from_u64(3);

        assert!(net.move_nodes(&mut membership, 1.0, &mut rng));
        assert_eq!(membership[0], membership[1]);
        assert_eq!(membership[2], membership[3]);
        assert_ne!(membership[0], membership[2]);
    }
}
