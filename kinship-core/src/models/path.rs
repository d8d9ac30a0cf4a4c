use serde::{Deserialize, Serialize};

use super::graph::{GraphSource, NodeType};
use super::user::UserSummary;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub label: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathResult {
    pub found: bool,
    pub path: Vec<PathNode>,
    pub edges: Vec<PathEdge>,
    /// Hop count of the returned path.
    pub length: usize,
    pub relationship_types: Vec<String>,
    /// Sum of edge costs; only set by the weighted strategy.
    pub total_cost: Option<f64>,
}

impl PathResult {
    pub fn not_found() -> Self {
        Self {
            found: false,
            path: vec![],
            edges: vec![],
            length: 0,
            relationship_types: vec![],
            total_cost: None,
        }
    }
}

/// Degree of separation over accepted connections only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionPath {
    /// Users along the route, endpoints included.
    pub path: Vec<UserSummary>,
    /// Hops between the endpoints; -1 when no route was found.
    pub degree: i32,
    pub source: GraphSource,
}

impl ConnectionPath {
    pub fn none(source: GraphSource) -> Self {
        Self {
            path: vec![],
            degree: -1,
            source,
        }
    }
}
