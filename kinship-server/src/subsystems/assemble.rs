//! Graph assembly against the stores: reads the connection topology from the
//! mirror (or the ledger when the mirror cannot answer), loads profiles and
//! affiliations, and hands everything to the pure builders in
//! `kinship_core::assembly`.

use std::collections::HashSet;

use kinship_core::assembly::{build_discover_graph, build_ecosystem_graph, build_personal_graph, MAX_GRAPH_DEPTH};
use kinship_core::mirror::read_or_empty;
use kinship_core::models::{AcceptedEdge, Affiliations, GraphSource, KnowledgeGraph, NodeType, ViewType};
use kinship_core::KinshipError;
use uuid::Uuid;

use super::{directory, similar};
use crate::state::Kinship;

/// Accepted edges within `depth` hops of `center` and where they came from.
pub(crate) async fn connection_topology(
    kinship: &Kinship,
    center: Uuid,
    depth: u32,
) -> Result<(Vec<AcceptedEdge>, GraphSource), KinshipError> {
    let mirror = kinship.mirror.as_ref();
    let read = read_or_empty(mirror, "accepted_edges", mirror.accepted_edges(center, depth)).await;
    if read.available {
        return Ok((read.value, GraphSource::Mirror));
    }
    if !kinship.config.assembly.relational_fallback {
        return Ok((Vec::new(), GraphSource::Unavailable));
    }

    let edges = directory::accepted_edges_within(&kinship.pool, center, depth).await?;
    tracing::debug!(center = %center, depth, edges = edges.len(), "Topology served from ledger");
    Ok((edges, GraphSource::Relational))
}

fn edge_endpoints(center: Uuid, edges: &[AcceptedEdge]) -> Vec<Uuid> {
    let mut seen = HashSet::from([center]);
    let mut ids = vec![center];
    for edge in edges {
        for id in [edge.requester_id, edge.addressee_id] {
            if seen.insert(id) {
                ids.push(id);
            }
        }
    }
    ids
}

/// Build the `view` graph around `center`.
///
/// `depth` is clamped to `1..=3` and `limit` to the configured maximum. The
/// similarity view is delegated with the configured defaults; the clustered,
/// community and roadmap views have their own operations.
pub async fn assemble(
    kinship: &Kinship,
    center: Uuid,
    view: ViewType,
    depth: Option<u32>,
    node_types: Option<&[NodeType]>,
    limit: Option<usize>,
) -> Result<KnowledgeGraph, KinshipError> {
    let settings = &kinship.config.assembly;
    let depth = depth.unwrap_or(settings.default_depth).clamp(1, MAX_GRAPH_DEPTH);
    let limit = limit.unwrap_or(settings.default_limit).clamp(1, settings.max_limit);

    if directory::load_user(&kinship.pool, center).await?.is_none() {
        return Err(KinshipError::NotFound(format!("user {}", center)));
    }

    let graph = match view {
        ViewType::Personal | ViewType::Ecosystem => {
            let (edges, source) = connection_topology(kinship, center, depth).await?;
            let users = directory::load_users(&kinship.pool, &edge_endpoints(center, &edges)).await?;
            let builder = if view == ViewType::Personal {
                build_personal_graph(center, &edges, depth, &users)
            } else {
                let affiliations: Affiliations = directory::load_affiliations(&kinship.pool, center).await?;
                build_ecosystem_graph(center, &edges, depth, &users, &affiliations)
            };
            builder.finish(Some(center), view, source, node_types, limit)
        }
        ViewType::Discover => {
            let mirror = kinship.mirror.as_ref();
            let sample = limit.saturating_sub(1);
            let read = read_or_empty(mirror, "visible_users", mirror.visible_users(center, sample)).await;
            let (visible, source) = if read.available {
                (read.value, GraphSource::Mirror)
            } else if settings.relational_fallback {
                (directory::visible_users(&kinship.pool, center, sample).await?, GraphSource::Relational)
            } else {
                (Vec::new(), GraphSource::Unavailable)
            };

            let mut ids = vec![center];
            ids.extend(visible.iter().copied().filter(|id| *id != center));
            let users = directory::load_users(&kinship.pool, &ids).await?;
            let skills = directory::skills_by_user(&kinship.pool, &ids).await?;
            let communities = directory::communities_by_user(&kinship.pool, &ids).await?;
            build_discover_graph(center, &visible, &users, &skills, &communities)
                .finish(Some(center), view, source, node_types, limit)
        }
        ViewType::Similarity => {
            let config = &kinship.config.similarity;
            similar::similarity_graph(kinship, center, config.default_min_similarity, Some(limit)).await?
        }
        ViewType::Clustered => {
            return Err(KinshipError::Validation(
                "clustered graphs are built by cluster_graph".to_string(),
            ))
        }
        ViewType::Community | ViewType::Roadmap => {
            return Err(KinshipError::Validation(format!(
                "{:?} graphs have their own operation",
                view
            )))
        }
    };

    tracing::debug!(
        center = %center,
        view = ?view,
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        source = ?graph.metadata.source,
        "Graph assembled"
    );
    Ok(graph)
}
