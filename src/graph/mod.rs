// graph/mod.rs
// Phase 2: Region graph - one node per feature-matrix row, weighted similarity edges

pub mod builder;
pub mod matrix;
pub mod similarity;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Node identifier; equal to the region's row index in the feature matrix
pub type NodeId = usize;

/// Undirected weighted graph over region indices
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "StoredGraph")]
pub struct RegionGraph {
    /// Nodes, indexed by their id
    pub nodes: Vec<RegionNode>,

    /// Edges in canonical (insertion) order
    pub edges: Vec<Edge>,

    /// Metadata about the graph
    pub metadata: GraphMetadata,

    /// Normalized (low, high) endpoint pair -> position in `edges`
    #[serde(skip)]
    edge_index: HashMap<(NodeId, NodeId), usize>,
}

/// Serialized form; the edge index is rebuilt on load
#[derive(Deserialize)]
struct StoredGraph {
    nodes: Vec<RegionNode>,
    edges: Vec<Edge>,
    metadata: GraphMetadata,
}

impl From<StoredGraph> for RegionGraph {
    fn from(stored: StoredGraph) -> Self {
        let mut graph = Self {
            nodes: stored.nodes,
            edges: stored.edges,
            metadata: stored.metadata,
            edge_index: HashMap::new(),
        };
        graph.rebuild_index();
        graph
    }
}

/// Metadata about the graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub knn_k: usize,
    pub metric: similarity::SimilarityMetric,
    pub created_at: String,
}

/// Graph node with an opaque back-reference to the external row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionNode {
    pub id: NodeId,
    pub region_id: Option<String>,
}

/// Undirected edge; `source` is the node whose neighbor selection created it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub weight: f64,
}

impl Edge {
    /// Create a new edge
    pub fn new(source: NodeId, target: NodeId, weight: f64) -> Self {
        Self {
            source,
            target,
            weight,
        }
    }

    /// The endpoint opposite `node`
    pub fn other(&self, node: NodeId) -> NodeId {
        if self.source == node {
            self.target
        } else {
            self.source
        }
    }
}

fn edge_key(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl RegionGraph {
    /// Create a graph with `node_count` nodes and no edges
    pub fn with_nodes(node_count: usize, knn_k: usize, metric: similarity::SimilarityMetric) -> Self {
        Self {
            nodes: (0..node_count)
                .map(|id| RegionNode { id, region_id: None })
                .collect(),
            edges: Vec::new(),
            metadata: GraphMetadata {
                knn_k,
                metric,
                created_at: chrono::Utc::now().to_rfc3339(),
            },
            edge_index: HashMap::new(),
        }
    }

    /// Attach external identifiers, positionally
    pub fn set_region_ids(&mut self, region_ids: &[String]) {
        for (node, region_id) in self.nodes.iter_mut().zip(region_ids) {
            node.region_id = Some(region_id.clone());
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Add an undirected edge.
    ///
    /// Returns `false` without touching the graph for self-loops, unknown
    /// endpoints, weights that are not strictly positive, and pairs that are
    /// already connected in either orientation (the first weight is kept).
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, weight: f64) -> bool {
        if source == target
            || source >= self.nodes.len()
            || target >= self.nodes.len()
            || !(weight > 0.0)
        {
            return false;
        }

        let key = edge_key(source, target);
        if self.edge_index.contains_key(&key) {
            return false;
        }

        self.edge_index.insert(key, self.edges.len());
        self.edges.push(Edge::new(source, target, weight));
        true
    }

    /// Re-derive the endpoint lookup from `edges`; the first edge of a pair wins
    fn rebuild_index(&mut self) {
        self.edge_index.clear();
        for (idx, edge) in self.edges.iter().enumerate() {
            self.edge_index
                .entry(edge_key(edge.source, edge.target))
                .or_insert(idx);
        }
    }

    /// Weight of the edge between two nodes, if any
    pub fn edge_weight(&self, a: NodeId, b: NodeId) -> Option<f64> {
        self.edge_index
            .get(&edge_key(a, b))
            .map(|&idx| self.edges[idx].weight)
    }

    /// Adjacency lists with weights; each edge appears under both endpoints
    pub fn adjacency(&self) -> Vec<Vec<(NodeId, f64)>> {
        let mut adj = vec![Vec::new(); self.nodes.len()];
        for edge in &self.edges {
            adj[edge.source].push((edge.target, edge.weight));
            adj[edge.target].push((edge.source, edge.weight));
        }
        adj
    }

    /// Number of edges touching `node`
    pub fn degree(&self, node: NodeId) -> usize {
        self.edges
            .iter()
            .filter(|e| e.source == node || e.target == node)
            .count()
    }

    /// Label every node with a component id, numbered by lowest member
    pub fn connected_components(&self) -> Vec<usize> {
        let adj = self.adjacency();
        let mut labels = vec![usize::MAX; self.nodes.len()];
        let mut next = 0;

        for start in 0..self.nodes.len() {
            if labels[start] != usize::MAX {
                continue;
            }
            labels[start] = next;
            let mut queue = VecDeque::from([start]);
            while let Some(node) = queue.pop_front() {
                for &(neighbor, _) in &adj[node] {
                    if labels[neighbor] == usize::MAX {
                        labels[neighbor] = next;
                        queue.push_back(neighbor);
                    }
                }
            }
            next += 1;
        }

        labels
    }

    /// Serialize graph to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save graph to file
    pub fn save_to_file(&self, path: &str) -> crate::error::Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Get statistics about the graph
    pub fn stats(&self) -> GraphStats {
        let mut degrees = vec![0usize; self.nodes.len()];
        for edge in &self.edges {
            degrees[edge.source] += 1;
            degrees[edge.target] += 1;
        }

        let components = self
            .connected_components()
            .iter()
            .copied()
            .max()
            .map(|m| m + 1)
            .unwrap_or(0);

        let mean_degree = if self.nodes.is_empty() {
            0.0
        } else {
            2.0 * self.edges.len() as f64 / self.nodes.len() as f64
        };

        GraphStats {
            total_nodes: self.nodes.len(),
            total_edges: self.edges.len(),
            isolated_nodes: degrees.iter().filter(|&&d| d == 0).count(),
            components,
            mean_degree,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub isolated_nodes: usize,
    pub components: usize,
    pub mean_degree: f64,
}
