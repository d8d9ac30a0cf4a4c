//! Operation envelope: every call a caller can issue against the service,
//! tagged by `action`, and the uniform response wrapper.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PathStrategy;
use crate::error::KinshipError;
use crate::models::{ClusterAlgorithm, NodeType, ViewType};

pub const API_VERSION: &str = "0.1.0";

/// One operation plus the identity of the caller issuing it (`actor`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum KinshipRequest {
    Ping,
    Health,

    // Connection lifecycle
    SendRequest {
        actor: Uuid,
        addressee_id: Uuid,
        message: Option<String>,
    },
    AcceptRequest {
        actor: Uuid,
        connection_id: Uuid,
    },
    DeclineRequest {
        actor: Uuid,
        connection_id: Uuid,
    },
    RemoveConnection {
        actor: Uuid,
        connection_id: Uuid,
    },

    // Connection queries
    ConnectionStatus {
        actor: Uuid,
        other_id: Uuid,
    },
    ListConnections {
        actor: Uuid,
        status: Option<String>,
        limit: Option<i64>,
        offset: Option<i64>,
    },
    PendingRequests {
        actor: Uuid,
    },
    MutualConnections {
        actor: Uuid,
        other_id: Uuid,
        limit: Option<usize>,
    },
    NetworkStats {
        actor: Uuid,
    },

    // Graph reads
    AssembleGraph {
        actor: Uuid,
        /// Defaults to the actor.
        center_id: Option<Uuid>,
        view: ViewType,
        depth: Option<u32>,
        node_types: Option<Vec<NodeType>>,
        limit: Option<usize>,
    },
    FindPath {
        actor: Uuid,
        /// Defaults to the actor.
        source_id: Option<Uuid>,
        target_id: Uuid,
        max_depth: Option<u32>,
        strategy: Option<PathStrategy>,
    },
    ComputeSimilarities {
        actor: Uuid,
        min_similarity: Option<f64>,
        limit: Option<usize>,
    },
    SimilarityGraph {
        actor: Uuid,
        min_similarity: Option<f64>,
        limit: Option<usize>,
    },
    ClusterGraph {
        actor: Uuid,
        algorithm: Option<ClusterAlgorithm>,
        min_cluster_size: Option<usize>,
        limit: Option<usize>,
    },
    UsersWithSkill {
        actor: Uuid,
        skill_name: String,
        limit: Option<usize>,
    },
    CommunityGraph {
        actor: Uuid,
        community_id: Uuid,
    },
    SkillRoadmap {
        actor: Uuid,
        skill_name: String,
    },
    /// Degree of separation over accepted connections only.
    ConnectionPath {
        actor: Uuid,
        target_id: Uuid,
        max_depth: Option<u32>,
    },

    // Mirror maintenance
    SyncUser {
        user_id: Uuid,
    },
}

impl KinshipRequest {
    pub fn action(&self) -> &'static str {
        match self {
            KinshipRequest::Ping => "ping",
            KinshipRequest::Health => "health",
            KinshipRequest::SendRequest { .. } => "send_request",
            KinshipRequest::AcceptRequest { .. } => "accept_request",
            KinshipRequest::DeclineRequest { .. } => "decline_request",
            KinshipRequest::RemoveConnection { .. } => "remove_connection",
            KinshipRequest::ConnectionStatus { .. } => "connection_status",
            KinshipRequest::ListConnections { .. } => "list_connections",
            KinshipRequest::PendingRequests { .. } => "pending_requests",
            KinshipRequest::MutualConnections { .. } => "mutual_connections",
            KinshipRequest::NetworkStats { .. } => "network_stats",
            KinshipRequest::AssembleGraph { .. } => "assemble_graph",
            KinshipRequest::FindPath { .. } => "find_path",
            KinshipRequest::ComputeSimilarities { .. } => "compute_similarities",
            KinshipRequest::SimilarityGraph { .. } => "similarity_graph",
            KinshipRequest::ClusterGraph { .. } => "cluster_graph",
            KinshipRequest::UsersWithSkill { .. } => "users_with_skill",
            KinshipRequest::CommunityGraph { .. } => "community_graph",
            KinshipRequest::SkillRoadmap { .. } => "skill_roadmap",
            KinshipRequest::ConnectionPath { .. } => "connection_path",
            KinshipRequest::SyncUser { .. } => "sync_user",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KinshipResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Taxonomy kind from `KinshipError::kind`, set on errors.
    pub error_kind: Option<String>,
    pub version: String,
}

impl KinshipResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            error_kind: None,
            version: API_VERSION.to_string(),
        }
    }

    pub fn err(kind: &str, msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            error_kind: Some(kind.to_string()),
            version: API_VERSION.to_string(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(serde_json::json!({"pong": true}))
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

impl From<KinshipError> for KinshipResponse {
    fn from(e: KinshipError) -> Self {
        Self::err(e.kind(), e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parses_from_tagged_json() {
        let actor = Uuid::new_v4();
        let raw = serde_json::json!({
            "action": "assemble_graph",
            "actor": actor,
            "view": "ecosystem",
            "node_types": ["user", "skill"]
        });
        let request: KinshipRequest = serde_json::from_value(raw).unwrap();
        match request {
            KinshipRequest::AssembleGraph {
                actor: a,
                view,
                node_types,
                depth,
                ..
            } => {
                assert_eq!(a, actor);
                assert_eq!(view, ViewType::Ecosystem);
                assert_eq!(node_types, Some(vec![NodeType::User, NodeType::Skill]));
                assert_eq!(depth, None);
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_cluster_request_accepts_louvain_alias() {
        let raw = serde_json::json!({
            "action": "cluster_graph",
            "actor": Uuid::new_v4(),
            "algorithm": "louvain"
        });
        let request: KinshipRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(request.action(), "cluster_graph");
        match request {
            KinshipRequest::ClusterGraph { algorithm, .. } => {
                assert_eq!(algorithm, Some(ClusterAlgorithm::Structural));
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_graph_store_requests_parse() {
        let raw = serde_json::json!({
            "action": "connection_path",
            "actor": Uuid::new_v4(),
            "target_id": Uuid::new_v4()
        });
        let request: KinshipRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(request.action(), "connection_path");

        let raw = serde_json::json!({
            "action": "skill_roadmap",
            "actor": Uuid::new_v4(),
            "skill_name": "Rust"
        });
        let request: KinshipRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(request.action(), "skill_roadmap");
    }

    #[test]
    fn test_error_response_keeps_kind() {
        let response: KinshipResponse = KinshipError::Authorization("only the addressee may accept".into()).into();
        assert!(!response.is_ok());
        assert_eq!(response.error_kind.as_deref(), Some("authorization"));
        assert!(response.error.unwrap().contains("addressee"));
    }

    #[test]
    fn test_pong() {
        let response = KinshipResponse::pong();
        assert!(response.is_ok());
        assert_eq!(response.data.unwrap()["pong"], true);
        assert_eq!(KinshipRequest::Ping.action(), "ping");
    }
}
