use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    User,
    Skill,
    Community,
    Event,
    Project,
    Company,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::User => "user",
            NodeType::Skill => "skill",
            NodeType::Community => "community",
            NodeType::Event => "event",
            NodeType::Project => "project",
            NodeType::Company => "company",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewType {
    Personal,
    Ecosystem,
    Discover,
    Similarity,
    Clustered,
    Community,
    Roadmap,
}

/// Where the connection topology of a graph came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphSource {
    Mirror,
    Relational,
    /// The mirror could not be read and no fallback ran. Treat the graph as
    /// incomplete, not as "no relationships".
    Unavailable,
}

/// A node of an assembled graph. Built per query, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub label: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub size: f64,
    pub color: String,
    pub image_url: Option<String>,
    pub cluster: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: String,
    pub weight: Option<f64>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub center_node: Option<String>,
    pub view_type: ViewType,
    /// Node count before truncation to the requested limit.
    pub total_nodes: usize,
    pub total_edges: usize,
    pub truncated: bool,
    pub source: GraphSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub metadata: GraphMetadata,
}

/// Members of one community and the accepted connections among them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityGraph {
    pub community_id: Uuid,
    pub community_name: String,
    pub graph: KnowledgeGraph,
    pub member_count: usize,
    /// Accepted edges over possible member pairs, in [0, 1].
    pub connection_density: f64,
}
