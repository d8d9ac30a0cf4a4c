//! Graph mirror: a derived, best-effort projection of the connection ledger.
//!
//! The relational ledger is the source of truth. Every ledger transition is
//! expressed as a `MirrorEvent` and applied to a `GraphMirror`, which serves
//! traversal reads for graph assembly.
//!
//! Contract:
//! - `apply` is idempotent: edges are keyed by the unordered user pair, so
//!   replaying an event never duplicates an edge.
//! - Reads go through `read_or_empty`, which turns any `MirrorError` into an
//!   empty value and a warning. The mirror is never a hard dependency.
//! - The mirror is eventually consistent with the ledger.

pub mod memory;
pub mod neo4j;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{GraphBackend, GraphStoreConfig};
use crate::error::MirrorError;
use crate::models::AcceptedEdge;

pub use memory::MemoryMirror;
pub use neo4j::Neo4jMirror;

/// Canonical ordering of a user pair: `(min, max)`.
pub fn pair_key(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Domain event emitted for every ledger transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MirrorEvent {
    UpsertUser {
        user_id: Uuid,
        username: String,
        full_name: Option<String>,
        profile_image_url: Option<String>,
        location: Option<String>,
        show_in_graph: bool,
    },
    RequestCreated {
        requester_id: Uuid,
        addressee_id: Uuid,
        message: Option<String>,
    },
    RequestAccepted {
        requester_id: Uuid,
        addressee_id: Uuid,
    },
    RequestDeclined {
        requester_id: Uuid,
        addressee_id: Uuid,
    },
    ConnectionRemoved {
        user_a: Uuid,
        user_b: Uuid,
    },
}

impl MirrorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MirrorEvent::UpsertUser { .. } => "upsert_user",
            MirrorEvent::RequestCreated { .. } => "request_created",
            MirrorEvent::RequestAccepted { .. } => "request_accepted",
            MirrorEvent::RequestDeclined { .. } => "request_declined",
            MirrorEvent::ConnectionRemoved { .. } => "connection_removed",
        }
    }

    /// Unordered pair the event touches; `None` for node-only events.
    pub fn pair(&self) -> Option<(Uuid, Uuid)> {
        match self {
            MirrorEvent::UpsertUser { .. } => None,
            MirrorEvent::RequestCreated {
                requester_id,
                addressee_id,
                ..
            }
            | MirrorEvent::RequestAccepted {
                requester_id,
                addressee_id,
            }
            | MirrorEvent::RequestDeclined {
                requester_id,
                addressee_id,
            } => Some(pair_key(*requester_id, *addressee_id)),
            MirrorEvent::ConnectionRemoved { user_a, user_b } => Some(pair_key(*user_a, *user_b)),
        }
    }
}

#[async_trait]
pub trait GraphMirror: Send + Sync {
    /// Apply one ledger transition. Must be idempotent.
    async fn apply(&self, event: &MirrorEvent) -> Result<(), MirrorError>;

    /// Accepted edges on paths of at most `depth` hops from `center`,
    /// ordered by canonical pair.
    async fn accepted_edges(&self, center: Uuid, depth: u32) -> Result<Vec<AcceptedEdge>, MirrorError>;

    /// Users connected (accepted) to both `a` and `b`, ordered by id.
    async fn mutual_connections(&self, a: Uuid, b: Uuid, limit: usize) -> Result<Vec<Uuid>, MirrorError>;

    /// Users other than `center` that opted into graph visibility, ordered by id.
    async fn visible_users(&self, center: Uuid, limit: usize) -> Result<Vec<Uuid>, MirrorError>;

    /// Shortest route over accepted edges of at most `max_depth` hops,
    /// endpoints included. Empty when there is none.
    async fn connection_path(&self, from: Uuid, to: Uuid, max_depth: u32) -> Result<Vec<Uuid>, MirrorError>;

    /// Accepted edges whose endpoints are both in `members`, ordered by
    /// canonical pair.
    async fn edges_among(&self, members: &[Uuid]) -> Result<Vec<AcceptedEdge>, MirrorError>;

    async fn is_available(&self) -> bool;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Mirror used when no graph store is configured or reachable. Every call
/// reports `Unavailable`.
#[derive(Debug, Default)]
pub struct DisabledMirror;

#[async_trait]
impl GraphMirror for DisabledMirror {
    async fn apply(&self, _event: &MirrorEvent) -> Result<(), MirrorError> {
        Err(MirrorError::Unavailable("graph store disabled".to_string()))
    }

    async fn accepted_edges(&self, _center: Uuid, _depth: u32) -> Result<Vec<AcceptedEdge>, MirrorError> {
        Err(MirrorError::Unavailable("graph store disabled".to_string()))
    }

    async fn mutual_connections(&self, _a: Uuid, _b: Uuid, _limit: usize) -> Result<Vec<Uuid>, MirrorError> {
        Err(MirrorError::Unavailable("graph store disabled".to_string()))
    }

    async fn visible_users(&self, _center: Uuid, _limit: usize) -> Result<Vec<Uuid>, MirrorError> {
        Err(MirrorError::Unavailable("graph store disabled".to_string()))
    }

    async fn connection_path(&self, _from: Uuid, _to: Uuid, _max_depth: u32) -> Result<Vec<Uuid>, MirrorError> {
        Err(MirrorError::Unavailable("graph store disabled".to_string()))
    }

    async fn edges_among(&self, _members: &[Uuid]) -> Result<Vec<AcceptedEdge>, MirrorError> {
        Err(MirrorError::Unavailable("graph store disabled".to_string()))
    }

    async fn is_available(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

/// Outcome of a degrade-to-empty read.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorRead<T> {
    pub value: T,
    /// `false` when the mirror failed and `value` is the empty default.
    pub available: bool,
}

/// Run a mirror read; on any error log it and return `T::default()`.
pub async fn read_or_empty<T, F>(mirror: &dyn GraphMirror, operation: &str, read: F) -> MirrorRead<T>
where
    T: Default,
    F: Future<Output = Result<T, MirrorError>>,
{
    match read.await {
        Ok(value) => MirrorRead {
            value,
            available: true,
        },
        Err(e) => {
            tracing::warn!(
                backend = mirror.name(),
                operation,
                error = %e,
                "Graph mirror read failed, returning empty result"
            );
            MirrorRead {
                value: T::default(),
                available: false,
            }
        }
    }
}

/// Apply an event, logging and swallowing failures. Returns whether it landed.
pub async fn apply_best_effort(mirror: &dyn GraphMirror, event: &MirrorEvent) -> bool {
    match mirror.apply(event).await {
        Ok(()) => {
            tracing::debug!(backend = mirror.name(), event = event.name(), "Mirror sync applied");
            true
        }
        Err(e) => {
            tracing::warn!(
                backend = mirror.name(),
                event = event.name(),
                error = %e,
                "Mirror sync failed (ledger write kept)"
            );
            false
        }
    }
}

/// Build the configured mirror. A Neo4j store that cannot be reached at
/// start-up degrades to `DisabledMirror`.
pub async fn create_mirror(config: &GraphStoreConfig) -> Arc<dyn GraphMirror> {
    match config.backend {
        GraphBackend::Neo4j => match Neo4jMirror::connect(config).await {
            Ok(mirror) => {
                if let Err(e) = mirror.ensure_indexes().await {
                    tracing::warn!(error = %e, "Neo4j index creation failed (non-fatal)");
                }
                tracing::info!(uri = %config.uri, "Connected to Neo4j graph mirror");
                Arc::new(mirror)
            }
            Err(e) => {
                tracing::warn!(uri = %config.uri, error = %e, "Neo4j unavailable, graph mirror disabled");
                Arc::new(DisabledMirror)
            }
        },
        GraphBackend::Memory => {
            tracing::info!("Using in-process graph mirror");
            Arc::new(MemoryMirror::new())
        }
        GraphBackend::Disabled => {
            tracing::info!("Graph mirror disabled by config");
            Arc::new(DisabledMirror)
        }
    }
}
