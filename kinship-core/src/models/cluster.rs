use serde::{Deserialize, Serialize};

use super::graph::{GraphEdge, GraphMetadata, GraphNode, NodeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClusterAlgorithm {
    /// Group users by a single representative skill.
    #[default]
    SkillBased,
    /// Label propagation over the graph's edges.
    #[serde(alias = "louvain")]
    Structural,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: usize,
    pub label: String,
    pub color: String,
    pub node_ids: Vec<String>,
    pub dominant_type: Option<NodeType>,
    pub top_skills: Vec<String>,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteredGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub metadata: GraphMetadata,
    pub clusters: Vec<Cluster>,
}
