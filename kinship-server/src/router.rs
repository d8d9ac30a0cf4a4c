use kinship_core::models::ConnectionStatus;
use kinship_core::ops::{KinshipRequest, KinshipResponse};
use kinship_core::KinshipError;
use serde::Serialize;

use crate::state::Kinship;
use crate::subsystems::{assemble, cluster, community, connections, paths, roadmap, similar, sync};

/// Default page size for `list_connections`.
const DEFAULT_PAGE_SIZE: i64 = 50;
const DEFAULT_MUTUAL_LIMIT: usize = 10;

/// Wrap an operation result. Caller errors keep their kind; anything else is
/// logged and reported as `internal`.
fn respond<T: Serialize>(action: &str, result: Result<T, KinshipError>) -> KinshipResponse {
    match result.and_then(|value| serde_json::to_value(value).map_err(KinshipError::from)) {
        Ok(data) => KinshipResponse::ok(data),
        Err(e) => {
            if e.is_caller_error() {
                tracing::debug!(action, error = %e, "Request rejected");
            } else {
                tracing::error!(action, error = %e, "Request failed");
            }
            e.into()
        }
    }
}

pub async fn handle_request(kinship: &Kinship, request: KinshipRequest) -> KinshipResponse {
    let action = request.action();
    match request {
        KinshipRequest::Ping => KinshipResponse::pong(),
        KinshipRequest::Health => handle_health(kinship).await,

        KinshipRequest::SendRequest {
            actor,
            addressee_id,
            message,
        } => respond(action, connections::send_request(kinship, actor, addressee_id, message).await),
        KinshipRequest::AcceptRequest { actor, connection_id } => {
            respond(action, connections::accept(kinship, connection_id, actor).await)
        }
        KinshipRequest::DeclineRequest { actor, connection_id } => {
            respond(action, connections::decline(kinship, connection_id, actor).await)
        }
        KinshipRequest::RemoveConnection { actor, connection_id } => {
            respond(action, connections::remove(kinship, connection_id, actor).await)
        }

        KinshipRequest::ConnectionStatus { actor, other_id } => {
            respond(action, connections::connection_status(kinship, actor, other_id).await)
        }
        KinshipRequest::ListConnections {
            actor,
            status,
            limit,
            offset,
        } => {
            let status = match status.as_deref().map(str::parse::<ConnectionStatus>).transpose() {
                Ok(s) => s,
                Err(e) => return respond::<()>(action, Err(e)),
            };
            respond(
                action,
                connections::list_connections(
                    kinship,
                    actor,
                    status,
                    limit.unwrap_or(DEFAULT_PAGE_SIZE),
                    offset.unwrap_or(0),
                )
                .await,
            )
        }
        KinshipRequest::PendingRequests { actor } => {
            respond(action, connections::pending_requests(kinship, actor).await)
        }
        KinshipRequest::MutualConnections { actor, other_id, limit } => respond(
            action,
            connections::mutual_connections(kinship, actor, other_id, limit.unwrap_or(DEFAULT_MUTUAL_LIMIT)).await,
        ),
        KinshipRequest::NetworkStats { actor } => respond(action, connections::network_stats(kinship, actor).await),

        KinshipRequest::AssembleGraph {
            actor,
            center_id,
            view,
            depth,
            node_types,
            limit,
        } => respond(
            action,
            assemble::assemble(
                kinship,
                center_id.unwrap_or(actor),
                view,
                depth,
                node_types.as_deref(),
                limit,
            )
            .await,
        ),
        KinshipRequest::FindPath {
            actor,
            source_id,
            target_id,
            max_depth,
            strategy,
        } => respond(
            action,
            paths::find_path(kinship, source_id.unwrap_or(actor), target_id, max_depth, strategy).await,
        ),
        KinshipRequest::ComputeSimilarities {
            actor,
            min_similarity,
            limit,
        } => respond(
            action,
            similar::compute_similarities(kinship, actor, min_similarity, limit).await,
        ),
        KinshipRequest::SimilarityGraph {
            actor,
            min_similarity,
            limit,
        } => {
            let min_similarity = min_similarity.unwrap_or(kinship.config.similarity.default_min_similarity);
            respond(action, similar::similarity_graph(kinship, actor, min_similarity, limit).await)
        }
        KinshipRequest::ClusterGraph {
            actor,
            algorithm,
            min_cluster_size,
            limit,
        } => respond(
            action,
            cluster::cluster_for_user(kinship, actor, algorithm, min_cluster_size, limit).await,
        ),
        KinshipRequest::UsersWithSkill { skill_name, limit, .. } => {
            respond(action, similar::users_with_skill(kinship, &skill_name, limit).await)
        }
        KinshipRequest::CommunityGraph { community_id, .. } => {
            respond(action, community::community_graph(kinship, community_id).await)
        }
        KinshipRequest::SkillRoadmap { actor, skill_name } => {
            respond(action, roadmap::skill_roadmap(kinship, actor, &skill_name).await)
        }
        KinshipRequest::ConnectionPath {
            actor,
            target_id,
            max_depth,
        } => respond(action, paths::connection_path(kinship, actor, target_id, max_depth).await),

        KinshipRequest::SyncUser { user_id } => respond(
            action,
            sync::sync_user(kinship, user_id)
                .await
                .map(|()| serde_json::json!({"synced": true, "user_id": user_id})),
        ),
    }
}

async fn handle_health(kinship: &Kinship) -> KinshipResponse {
    let pg_ver = match kinship_core::db::health_check(&kinship.pool).await {
        Ok(v) => v,
        Err(e) => return KinshipResponse::err("internal", format!("DB health check failed: {}", e)),
    };
    let vec_ver = match kinship_core::db::check_pgvector(&kinship.pool).await {
        Ok(v) => v,
        Err(e) => return KinshipResponse::err("internal", format!("pgvector check failed: {}", e)),
    };
    let mirror_up = kinship.mirror.is_available().await;

    KinshipResponse::ok(serde_json::json!({
        "postgresql": pg_ver,
        "pgvector": vec_ver,
        "graph_store": {
            "backend": kinship.mirror.name(),
            "available": mirror_up,
        },
        "status": if mirror_up { "healthy" } else { "degraded" },
    }))
}
