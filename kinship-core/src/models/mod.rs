pub mod affiliation;
pub mod cluster;
pub mod connection;
pub mod embedding;
pub mod graph;
pub mod path;
pub mod roadmap;
pub mod similarity;
pub mod user;

pub use affiliation::{Affiliations, CommunityRecord, EventRecord, SkillRecord};
pub use cluster::{Cluster, ClusterAlgorithm, ClusteredGraph};
pub use connection::{AcceptedEdge, Connection, ConnectionRow, ConnectionState, ConnectionStatus, Direction, NetworkStats};
pub use embedding::ProfileEmbedding;
pub use graph::{CommunityGraph, GraphEdge, GraphMetadata, GraphNode, GraphSource, KnowledgeGraph, NodeType, ViewType};
pub use path::{ConnectionPath, PathEdge, PathNode, PathResult};
pub use roadmap::{RoadmapStep, SkillFrequency, SkillRoadmap};
pub use similarity::{SimilarityProfile, SimilarityReport};
pub use user::UserSummary;
