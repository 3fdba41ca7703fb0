// pipeline/analyze.rs
// Phase 4: Boundary analysis
// Finds strong similarity edges that a detected community split cuts through

use crate::graph::{NodeId, RegionGraph};
use crate::pipeline::cluster::Partition;
use serde::{Deserialize, Serialize};

/// A graph edge crossing communities with weight above the threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeakBoundary {
    pub source: NodeId,
    pub target: NodeId,
    pub weight: f64,
}

/// Scan every edge once, in the graph's canonical order, keeping those whose
/// endpoints sit in different communities and whose weight is strictly above
/// `threshold`.
///
/// Nodes the partition does not cover are treated as not crossing anything.
pub fn find_weak_boundaries(
    graph: &RegionGraph,
    partition: &Partition,
    threshold: f64,
) -> Vec<WeakBoundary> {
    graph
        .edges
        .iter()
        .filter(|edge| {
            match (
                partition.community_of(edge.source),
                partition.community_of(edge.target),
            ) {
                (Some(a), Some(b)) => a != b && edge.weight > threshold,
                _ => false,
            }
        })
        .map(|edge| WeakBoundary {
            source: edge.source,
            target: edge.target,
            weight: edge.weight,
        })
        .collect()
}

/// Summary counts for logging
#[derive(Debug, Clone, PartialEq)]
pub struct BoundarySummary {
    pub crossing_edges: usize,
    pub weak_boundaries: usize,
}

/// Count every crossing edge alongside the weak ones
pub fn summarize(graph: &RegionGraph, partition: &Partition, weak: &[WeakBoundary]) -> BoundarySummary {
    let crossing_edges = graph
        .edges
        .iter()
        .filter(|e| partition.community_of(e.source) != partition.community_of(e.target))
        .count();

    BoundarySummary {
        crossing_edges,
        weak_boundaries: weak.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::similarity::SimilarityMetric;

    fn sample() -> (RegionGraph, Partition) {
        let mut g = RegionGraph::with_nodes(5, 2, SimilarityMetric::Cosine);
        g.add_edge(0, 1, 0.95);
        g.add_edge(1, 2, 0.85);
        g.add_edge(2, 3, 0.8);
        g.add_edge(3, 4, 0.99);
        g.add_edge(0, 4, 0.5);
        let p = Partition::from_labels(&[0, 0, 1, 1, 2]);
        (g, p)
    }

    #[test]
    fn test_only_crossing_heavy_edges() {
        let (g, p) = sample();
        let weak = find_weak_boundaries(&g, &p, 0.8);

        assert_eq!(
            weak,
            vec![
                WeakBoundary {
                    source: 1,
                    target: 2,
                    weight: 0.85
                },
                WeakBoundary {
                    source: 3,
                    target: 4,
                    weight: 0.99
                },
            ]
        );
    }

    #[test]
    fn test_threshold_is_strict() {
        let (g, p) = sample();
        let weak = find_weak_boundaries(&g, &p, 0.85);
        assert_eq!(weak.len(), 1);
        assert_eq!(weak[0].weight, 0.99);
    }

    #[test]
    fn test_monotonic_in_threshold() {
        let (g, p) = sample();
        let mut previous = usize::MAX;
        for step in 0..=20 {
            let threshold = step as f64 * 0.05;
            let count = find_weak_boundaries(&g, &p, threshold).len();
            assert!(count <= previous);
            previous = count;
        }
    }

    #[test]
    fn test_single_community_has_no_boundaries() {
        let (g, _) = sample();
        let p = Partition::from_labels(&[0; 5]);
        assert!(find_weak_boundaries(&g, &p, 0.0).is_empty());
    }

    #[test]
    fn test_summary_counts() {
        let (g, p) = sample();
        let weak = find_weak_boundaries(&g, &p, 0.8);
        let summary = summarize(&g, &p, &weak);
        assert_eq!(summary.crossing_edges, 3);
        assert_eq!(summary.weak_boundaries, 2);
    }
}
