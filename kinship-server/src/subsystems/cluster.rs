//! Clustering of a user's ecosystem graph.

use std::collections::HashMap;

use kinship_core::clustering::cluster_graph;
use kinship_core::models::{ClusterAlgorithm, ClusteredGraph, NodeType, ViewType};
use kinship_core::KinshipError;
use uuid::Uuid;

use super::{assemble, directory};
use crate::state::Kinship;

/// Hop depth of the graph that gets clustered.
const CLUSTER_GRAPH_DEPTH: u32 = 2;

/// Assemble the ecosystem graph around `center` at depth 2 and cluster it.
pub async fn cluster_for_user(
    kinship: &Kinship,
    center: Uuid,
    algorithm: Option<ClusterAlgorithm>,
    min_cluster_size: Option<usize>,
    limit: Option<usize>,
) -> Result<ClusteredGraph, KinshipError> {
    let config = &kinship.config.clustering;
    let algorithm = algorithm.unwrap_or_default();
    let min_cluster_size = min_cluster_size.unwrap_or(config.min_cluster_size).max(1);

    let graph = assemble::assemble(
        kinship,
        center,
        ViewType::Ecosystem,
        Some(CLUSTER_GRAPH_DEPTH),
        None,
        limit,
    )
    .await?;

    let user_ids: Vec<Uuid> = graph
        .nodes
        .iter()
        .filter(|n| n.node_type == NodeType::User)
        .filter_map(|n| n.id.parse().ok())
        .collect();
    let skills: HashMap<String, Vec<String>> = directory::skills_by_user(&kinship.pool, &user_ids)
        .await?
        .into_iter()
        .map(|(id, names)| (id.to_string(), names))
        .collect();

    let clustered = cluster_graph(graph, algorithm, min_cluster_size, &skills, config.key_selection);
    tracing::debug!(
        center = %center,
        algorithm = ?algorithm,
        clusters = clustered.clusters.len(),
        "Graph clustered"
    );
    Ok(clustered)
}
