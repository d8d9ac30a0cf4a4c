//! Community graphs: the members of one community and how they connect.

use kinship_core::assembly::build_community_graph;
use kinship_core::mirror::read_or_empty;
use kinship_core::models::{CommunityGraph, GraphSource};
use kinship_core::KinshipError;
use uuid::Uuid;

use super::directory;
use crate::state::Kinship;

/// Members come from the ledger; the edges among them come from the mirror,
/// or the ledger when the mirror cannot answer and the fallback is enabled.
/// With neither, members are returned without edges and the graph is tagged
/// `Unavailable`.
pub async fn community_graph(kinship: &Kinship, community_id: Uuid) -> Result<CommunityGraph, KinshipError> {
    let community = directory::load_community(&kinship.pool, community_id)
        .await?
        .ok_or_else(|| KinshipError::NotFound(format!("community {}", community_id)))?;
    let members = directory::community_members(&kinship.pool, community_id).await?;
    let ids: Vec<Uuid> = members.iter().map(|m| m.id).collect();

    let mirror = kinship.mirror.as_ref();
    let read = read_or_empty(mirror, "edges_among", mirror.edges_among(&ids)).await;
    let (edges, source) = if read.available {
        (read.value, GraphSource::Mirror)
    } else if kinship.config.assembly.relational_fallback {
        (directory::accepted_edges_among(&kinship.pool, &ids).await?, GraphSource::Relational)
    } else {
        (Vec::new(), GraphSource::Unavailable)
    };

    let graph = build_community_graph(&community, &members, &edges, source);
    tracing::debug!(
        community_id = %community_id,
        members = graph.member_count,
        edges = graph.graph.edges.len(),
        density = graph.connection_density,
        source = ?source,
        "Community graph assembled"
    );
    Ok(graph)
}
