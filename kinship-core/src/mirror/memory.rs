//! In-process graph mirror. Same semantics as the Neo4j mirror, kept in a
//! `BTreeMap` so every read is ordered. Availability can be toggled to
//! simulate an outage.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{pair_key, GraphMirror, MirrorEvent};
use crate::error::MirrorError;
use crate::models::{AcceptedEdge, ConnectionStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeState {
    pub requester_id: Uuid,
    pub status: ConnectionStatus,
    pub message: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryGraph {
    /// user id -> show_in_graph
    users: BTreeMap<Uuid, bool>,
    edges: BTreeMap<(Uuid, Uuid), EdgeState>,
}

impl MemoryGraph {
    fn set_edge(&mut self, requester: Uuid, addressee: Uuid, status: ConnectionStatus, message: Option<String>) {
        self.users.entry(requester).or_insert(false);
        self.users.entry(addressee).or_insert(false);
        let state = self
            .edges
            .entry(pair_key(requester, addressee))
            .or_insert_with(|| EdgeState {
                requester_id: requester,
                status,
                message: None,
            });
        state.requester_id = requester;
        state.status = status;
        if message.is_some() || status == ConnectionStatus::Pending {
            state.message = message;
        }
    }
}

#[derive(Debug)]
pub struct MemoryMirror {
    graph: RwLock<MemoryGraph>,
    available: AtomicBool,
}

impl Default for MemoryMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self {
            graph: RwLock::new(MemoryGraph::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the store going away (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn edge(&self, a: Uuid, b: Uuid) -> Option<EdgeState> {
        self.graph.read().await.edges.get(&pair_key(a, b)).cloned()
    }

    pub async fn edge_count(&self) -> usize {
        self.graph.read().await.edges.len()
    }

    fn accepted_edge(key: (Uuid, Uuid), state: &EdgeState) -> AcceptedEdge {
        let addressee_id = if state.requester_id == key.0 { key.1 } else { key.0 };
        AcceptedEdge {
            requester_id: state.requester_id,
            addressee_id,
        }
    }

    fn check(&self) -> Result<(), MirrorError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MirrorError::Unavailable("memory mirror offline".to_string()))
        }
    }
}

#[async_trait]
impl GraphMirror for MemoryMirror {
    async fn apply(&self, event: &MirrorEvent) -> Result<(), MirrorError> {
        self.check()?;
        let mut graph = self.graph.write().await;
        match event {
            MirrorEvent::UpsertUser {
                user_id,
                show_in_graph,
                ..
            } => {
                graph.users.insert(*user_id, *show_in_graph);
            }
            MirrorEvent::RequestCreated {
                requester_id,
                addressee_id,
                message,
            } => graph.set_edge(*requester_id, *addressee_id, ConnectionStatus::Pending, message.clone()),
            MirrorEvent::RequestAccepted {
                requester_id,
                addressee_id,
            } => graph.set_edge(*requester_id, *addressee_id, ConnectionStatus::Accepted, None),
            MirrorEvent::RequestDeclined {
                requester_id,
                addressee_id,
            } => graph.set_edge(*requester_id, *addressee_id, ConnectionStatus::Declined, None),
            MirrorEvent::ConnectionRemoved { user_a, user_b } => {
                graph.edges.remove(&pair_key(*user_a, *user_b));
            }
        }
        Ok(())
    }

    async fn accepted_edges(&self, center: Uuid, depth: u32) -> Result<Vec<AcceptedEdge>, MirrorError> {
        self.check()?;
        let graph = self.graph.read().await;

        let mut adjacency: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for ((lo, hi), state) in &graph.edges {
            if state.status == ConnectionStatus::Accepted {
                adjacency.entry(*lo).or_default().push(*hi);
                adjacency.entry(*hi).or_default().push(*lo);
            }
        }

        // An edge lies on a path of <= depth hops iff one endpoint sits
        // strictly inside the depth horizon.
        let mut distance: HashMap<Uuid, u32> = HashMap::from([(center, 0)]);
        let mut queue = VecDeque::from([center]);
        let mut keys: BTreeSet<(Uuid, Uuid)> = BTreeSet::new();
        while let Some(node) = queue.pop_front() {
            let d = distance[&node];
            if d >= depth {
                continue;
            }
            for next in adjacency.get(&node).into_iter().flatten() {
                keys.insert(pair_key(node, *next));
                if !distance.contains_key(next) {
                    distance.insert(*next, d + 1);
                    queue.push_back(*next);
                }
            }
        }

        Ok(keys
            .into_iter()
            .map(|key| Self::accepted_edge(key, &graph.edges[&key]))
            .collect())
    }

    async fn mutual_connections(&self, a: Uuid, b: Uuid, limit: usize) -> Result<Vec<Uuid>, MirrorError> {
        self.check()?;
        let graph = self.graph.read().await;
        let neighbours = |user: Uuid| -> BTreeSet<Uuid> {
            graph
                .edges
                .iter()
                .filter(|(key, state)| {
                    state.status == ConnectionStatus::Accepted && (key.0 == user || key.1 == user)
                })
                .map(|(key, _)| if key.0 == user { key.1 } else { key.0 })
                .collect()
        };
        let of_a = neighbours(a);
        let of_b = neighbours(b);
        Ok(of_a.intersection(&of_b).copied().take(limit).collect())
    }

    async fn visible_users(&self, center: Uuid, limit: usize) -> Result<Vec<Uuid>, MirrorError> {
        self.check()?;
        let graph = self.graph.read().await;
        Ok(graph
            .users
            .iter()
            .filter(|(id, visible)| **visible && **id != center)
            .map(|(id, _)| *id)
            .take(limit)
            .collect())
    }

    async fn connection_path(&self, from: Uuid, to: Uuid, max_depth: u32) -> Result<Vec<Uuid>, MirrorError> {
        self.check()?;
        if from == to {
            return Ok(vec![from]);
        }
        let graph = self.graph.read().await;

        // Ordered neighbour sets keep the discovered route stable.
        let mut adjacency: BTreeMap<Uuid, BTreeSet<Uuid>> = BTreeMap::new();
        for ((lo, hi), state) in &graph.edges {
            if state.status == ConnectionStatus::Accepted {
                adjacency.entry(*lo).or_default().insert(*hi);
                adjacency.entry(*hi).or_default().insert(*lo);
            }
        }

        let mut parent: HashMap<Uuid, Uuid> = HashMap::new();
        let mut distance: HashMap<Uuid, u32> = HashMap::from([(from, 0)]);
        let mut queue = VecDeque::from([from]);
        while let Some(node) = queue.pop_front() {
            let d = distance[&node];
            if d >= max_depth {
                continue;
            }
            for next in adjacency.get(&node).into_iter().flatten() {
                if distance.contains_key(next) {
                    continue;
                }
                distance.insert(*next, d + 1);
                parent.insert(*next, node);
                if *next == to {
                    let mut route = vec![to];
                    let mut cursor = to;
                    while let Some(prev) = parent.get(&cursor) {
                        route.push(*prev);
                        cursor = *prev;
                    }
                    route.reverse();
                    return Ok(route);
                }
                queue.push_back(*next);
            }
        }
        Ok(Vec::new())
    }

    async fn edges_among(&self, members: &[Uuid]) -> Result<Vec<AcceptedEdge>, MirrorError> {
        self.check()?;
        let members: BTreeSet<Uuid> = members.iter().copied().collect();
        let graph = self.graph.read().await;
        Ok(graph
            .edges
            .iter()
            .filter(|((lo, hi), state)| {
                state.status == ConnectionStatus::Accepted && members.contains(lo) && members.contains(hi)
            })
            .map(|(key, state)| Self::accepted_edge(*key, state))
            .collect())
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
