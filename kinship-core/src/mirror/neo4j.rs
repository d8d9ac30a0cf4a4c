//! Neo4j-backed graph mirror.
//!
//! Users are `(:User {id})` nodes. Each unordered pair has at most one
//! `CONNECTED_TO` relationship, always stored from the smaller id to the
//! larger one, carrying `status` and `requester_id`. `MERGE` on that
//! canonical direction makes every write idempotent.

use async_trait::async_trait;
use neo4rs::{query, ConfigBuilder, Graph};
use uuid::Uuid;

use super::{pair_key, GraphMirror, MirrorEvent};
use crate::assembly::MAX_GRAPH_DEPTH;
use crate::config::GraphStoreConfig;
use crate::error::MirrorError;
use crate::models::AcceptedEdge;

pub struct Neo4jMirror {
    graph: Graph,
}

impl Neo4jMirror {
    pub async fn connect(config: &GraphStoreConfig) -> Result<Self, MirrorError> {
        let neo_config = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(config.password.as_str())
            .max_connections(config.max_connections)
            .build()?;
        let graph = Graph::connect(neo_config).await?;

        // Fail fast so the caller can fall back to DisabledMirror.
        graph.run(query("RETURN 1")).await?;

        Ok(Self { graph })
    }

    pub async fn ensure_indexes(&self) -> Result<(), MirrorError> {
        self.graph
            .run(query(
                "CREATE INDEX user_id_index IF NOT EXISTS FOR (u:User) ON (u.id)",
            ))
            .await?;
        Ok(())
    }

    async fn set_edge_status(
        &self,
        requester_id: Uuid,
        addressee_id: Uuid,
        status: &str,
        message: Option<&str>,
    ) -> Result<(), MirrorError> {
        let (lo, hi) = pair_key(requester_id, addressee_id);
        let stamp = match status {
            "pending" => "r.requested_at = datetime(), r.connected_at = null, r.message = $message",
            "accepted" => "r.connected_at = datetime()",
            _ => "r.responded_at = datetime()",
        };
        let q = query(&format!(
            "MERGE (lo:User {{id: $lo}})
             MERGE (hi:User {{id: $hi}})
             MERGE (lo)-[r:CONNECTED_TO]->(hi)
             SET r.status = $status,
                 r.requester_id = $requester_id,
                 {}",
            stamp
        ))
        .param("lo", lo.to_string())
        .param("hi", hi.to_string())
        .param("status", status)
        .param("requester_id", requester_id.to_string())
        .param("message", message.unwrap_or_default());

        self.graph.run(q).await?;
        Ok(())
    }

    async fn collect_ids(&self, q: neo4rs::Query) -> Result<Vec<Uuid>, MirrorError> {
        let mut result = self.graph.execute(q).await?;
        let mut ids = Vec::new();
        while let Some(row) = result.next().await? {
            let id: String = row
                .get("id")
                .map_err(|e| MirrorError::Decode(format!("missing id: {}", e)))?;
            ids.push(parse_id(&id)?);
        }
        Ok(ids)
    }

    /// Decode `lo`, `hi`, `requester_id` rows into accepted edges.
    async fn collect_edges(&self, q: neo4rs::Query) -> Result<Vec<AcceptedEdge>, MirrorError> {
        let mut result = self.graph.execute(q).await?;
        let mut edges = Vec::new();
        while let Some(row) = result.next().await? {
            let lo: String = row
                .get("lo")
                .map_err(|e| MirrorError::Decode(format!("missing lo: {}", e)))?;
            let hi: String = row
                .get("hi")
                .map_err(|e| MirrorError::Decode(format!("missing hi: {}", e)))?;
            let lo = parse_id(&lo)?;
            let hi = parse_id(&hi)?;
            // Edges written before requester_id existed default to lo.
            let requester_id = row
                .get::<String>("requester_id")
                .ok()
                .and_then(|raw| Uuid::parse_str(&raw).ok())
                .unwrap_or(lo);
            let addressee_id = if requester_id == lo { hi } else { lo };
            edges.push(AcceptedEdge {
                requester_id,
                addressee_id,
            });
        }
        Ok(edges)
    }
}

fn parse_id(raw: &str) -> Result<Uuid, MirrorError> {
    Uuid::parse_str(raw).map_err(|e| MirrorError::Decode(format!("bad user id '{}': {}", raw, e)))
}

#[async_trait]
impl GraphMirror for Neo4jMirror {
    async fn apply(&self, event: &MirrorEvent) -> Result<(), MirrorError> {
        match event {
            MirrorEvent::UpsertUser {
                user_id,
                username,
                full_name,
                profile_image_url,
                location,
                show_in_graph,
            } => {
                let q = query(
                    "MERGE (u:User {id: $id})
                     SET u.username = $username,
                         u.full_name = $full_name,
                         u.profile_image_url = $profile_image_url,
                         u.location = $location,
                         u.show_in_graph = $show_in_graph,
                         u.updated_at = datetime()",
                )
                .param("id", user_id.to_string())
                .param("username", username.as_str())
                .param("full_name", full_name.clone().unwrap_or_default())
                .param("profile_image_url", profile_image_url.clone().unwrap_or_default())
                .param("location", location.clone().unwrap_or_default())
                .param("show_in_graph", *show_in_graph);
                self.graph.run(q).await?;
                Ok(())
            }
            MirrorEvent::RequestCreated {
                requester_id,
                addressee_id,
                message,
            } => {
                self.set_edge_status(*requester_id, *addressee_id, "pending", message.as_deref())
                    .await
            }
            MirrorEvent::RequestAccepted {
                requester_id,
                addressee_id,
            } => {
                self.set_edge_status(*requester_id, *addressee_id, "accepted", None)
                    .await
            }
            MirrorEvent::RequestDeclined {
                requester_id,
                addressee_id,
            } => {
                self.set_edge_status(*requester_id, *addressee_id, "declined", None)
                    .await
            }
            MirrorEvent::ConnectionRemoved { user_a, user_b } => {
                let (lo, hi) = pair_key(*user_a, *user_b);
                let q = query(
                    "MATCH (:User {id: $lo})-[r:CONNECTED_TO]-(:User {id: $hi})
                     DELETE r",
                )
                .param("lo", lo.to_string())
                .param("hi", hi.to_string());
                self.graph.run(q).await?;
                Ok(())
            }
        }
    }

    async fn accepted_edges(&self, center: Uuid, depth: u32) -> Result<Vec<AcceptedEdge>, MirrorError> {
        let depth = depth.clamp(1, MAX_GRAPH_DEPTH);
        let q = query(&format!(
            "MATCH path = (center:User {{id: $id}})-[:CONNECTED_TO*1..{}]-(:User)
             WHERE all(r IN relationships(path) WHERE r.status = 'accepted')
             UNWIND relationships(path) AS r
             WITH DISTINCT r
             RETURN startNode(r).id AS lo, endNode(r).id AS hi, r.requester_id AS requester_id
             ORDER BY lo, hi",
            depth
        ))
        .param("id", center.to_string());
        self.collect_edges(q).await
    }

    async fn mutual_connections(&self, a: Uuid, b: Uuid, limit: usize) -> Result<Vec<Uuid>, MirrorError> {
        let q = query(
            "MATCH (:User {id: $a})-[:CONNECTED_TO {status: 'accepted'}]-(m:User)
                   -[:CONNECTED_TO {status: 'accepted'}]-(:User {id: $b})
             RETURN DISTINCT m.id AS id
             ORDER BY id
             LIMIT $limit",
        )
        .param("a", a.to_string())
        .param("b", b.to_string())
        .param("limit", limit as i64);
        self.collect_ids(q).await
    }

    async fn visible_users(&self, center: Uuid, limit: usize) -> Result<Vec<Uuid>, MirrorError> {
        let q = query(
            "MATCH (u:User)
             WHERE u.show_in_graph = true AND u.id <> $id
             RETURN u.id AS id
             ORDER BY id
             LIMIT $limit",
        )
        .param("id", center.to_string())
        .param("limit", limit as i64);
        self.collect_ids(q).await
    }

    async fn connection_path(&self, from: Uuid, to: Uuid, max_depth: u32) -> Result<Vec<Uuid>, MirrorError> {
        if from == to {
            return Ok(vec![from]);
        }
        let q = query(&format!(
            "MATCH path = shortestPath((a:User {{id: $from}})-[:CONNECTED_TO*1..{}]-(b:User {{id: $to}}))
             WHERE all(r IN relationships(path) WHERE r.status = 'accepted')
             RETURN [n IN nodes(path) | n.id] AS ids",
            max_depth.max(1)
        ))
        .param("from", from.to_string())
        .param("to", to.to_string());

        let mut result = self.graph.execute(q).await?;
        match result.next().await? {
            Some(row) => {
                let raw: Vec<String> = row
                    .get("ids")
                    .map_err(|e| MirrorError::Decode(format!("missing ids: {}", e)))?;
                raw.iter().map(|id| parse_id(id)).collect()
            }
            None => Ok(Vec::new()),
        }
    }

    async fn edges_among(&self, members: &[Uuid]) -> Result<Vec<AcceptedEdge>, MirrorError> {
        if members.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = members.iter().map(Uuid::to_string).collect();
        let q = query(
            "MATCH (lo:User)-[r:CONNECTED_TO {status: 'accepted'}]->(hi:User)
             WHERE lo.id IN $ids AND hi.id IN $ids
             RETURN lo.id AS lo, hi.id AS hi, r.requester_id AS requester_id
             ORDER BY lo, hi",
        )
        .param("ids", ids);
        self.collect_edges(q).await
    }

    async fn is_available(&self) -> bool {
        self.graph.run(query("RETURN 1")).await.is_ok()
    }

    fn name(&self) -> &str {
        "neo4j"
    }
}
