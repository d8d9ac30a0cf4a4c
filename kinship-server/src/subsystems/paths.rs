//! Path finding between two users over accepted connections plus shared
//! attribute edges synthesised for the source and target neighbourhoods, and
//! the connections-only degree of separation served by the mirror.

use kinship_core::config::PathStrategy;
use kinship_core::mirror::read_or_empty;
use kinship_core::models::{ConnectionPath, GraphSource, PathResult};
use kinship_core::pathfinding::{find_route, find_weighted_route, route_to_result, Adjacency, EdgeCosts};
use kinship_core::KinshipError;
use uuid::Uuid;

use super::directory;
use crate::state::Kinship;

/// Shortest route from `source` to `target` within `max_depth` hops.
///
/// `strategy` overrides `pathfinding.strategy`. A depth of zero or above the
/// configured ceiling is clamped. An unknown endpoint yields a
/// not-found result rather than an error, so a self-path is found exactly
/// when the user exists.
pub async fn find_path(
    kinship: &Kinship,
    source: Uuid,
    target: Uuid,
    max_depth: Option<u32>,
    strategy: Option<PathStrategy>,
) -> Result<PathResult, KinshipError> {
    let config = &kinship.config.pathfinding;
    let max_depth = max_depth
        .unwrap_or(config.default_max_depth)
        .clamp(1, config.max_depth.max(1));
    let strategy = strategy.unwrap_or(config.strategy);

    for id in [source, target] {
        if directory::load_user(&kinship.pool, id).await?.is_none() {
            tracing::debug!(user_id = %id, "Path endpoint not found");
            return Ok(PathResult::not_found());
        }
    }

    if source == target {
        let users = directory::load_users(&kinship.pool, &[source]).await?;
        return Ok(route_to_result(find_route(&Adjacency::new(), source, target, max_depth), &users));
    }

    let connections = directory::all_accepted_edges(&kinship.pool).await?;
    let shared_skills = directory::shared_skill_pairs(&kinship.pool, source, target).await?;
    let shared_communities = if config.include_shared_communities {
        directory::shared_community_pairs(&kinship.pool, source, target).await?
    } else {
        Vec::new()
    };
    let adjacency = Adjacency::build(&connections, &shared_skills, &shared_communities);

    let route = match strategy {
        PathStrategy::Hops => find_route(&adjacency, source, target, max_depth),
        PathStrategy::Weighted => find_weighted_route(&adjacency, source, target, max_depth, &EdgeCosts::from(config)),
    };

    let users = match &route {
        Some(route) => directory::load_users(&kinship.pool, &route.nodes).await?,
        None => Default::default(),
    };
    let result = route_to_result(route, &users);

    tracing::debug!(
        source = %source,
        target = %target,
        strategy = ?strategy,
        found = result.found,
        length = result.length,
        "Path search complete"
    );
    Ok(result)
}

/// Degree of separation from `from` to `to` over accepted connections.
///
/// Served by the mirror's shortest-path read; when the mirror cannot answer
/// the ledger is searched instead if `assembly.relational_fallback` is set.
/// Unknown users yield `degree = -1`.
pub async fn connection_path(
    kinship: &Kinship,
    from: Uuid,
    to: Uuid,
    max_depth: Option<u32>,
) -> Result<ConnectionPath, KinshipError> {
    let config = &kinship.config.pathfinding;
    let max_depth = max_depth
        .unwrap_or(config.default_max_depth)
        .clamp(1, config.max_depth.max(1));

    for id in [from, to] {
        if directory::load_user(&kinship.pool, id).await?.is_none() {
            return Ok(ConnectionPath::none(GraphSource::Relational));
        }
    }

    let mirror = kinship.mirror.as_ref();
    let read = read_or_empty(mirror, "connection_path", mirror.connection_path(from, to, max_depth)).await;
    let (ids, source) = if read.available {
        (read.value, GraphSource::Mirror)
    } else if kinship.config.assembly.relational_fallback {
        let adjacency = Adjacency::build(&directory::all_accepted_edges(&kinship.pool).await?, &[], &[]);
        let ids = find_route(&adjacency, from, to, max_depth)
            .map(|route| route.nodes)
            .unwrap_or_default();
        (ids, GraphSource::Relational)
    } else {
        return Ok(ConnectionPath::none(GraphSource::Unavailable));
    };

    if ids.is_empty() {
        return Ok(ConnectionPath::none(source));
    }
    let users = directory::load_users(&kinship.pool, &ids).await?;
    let path: Vec<_> = ids.iter().filter_map(|id| users.get(id).cloned()).collect();
    Ok(ConnectionPath {
        degree: ids.len() as i32 - 1,
        path,
        source,
    })
}
