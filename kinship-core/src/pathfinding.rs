//! Shortest paths between users over a mixed-edge adjacency.
//!
//! Two edge classes feed the adjacency: accepted connections and shared
//! attributes (skills, optionally communities) synthesized from relational
//! joins around the source and target. Connections are always added first,
//! so for every node direct neighbours precede attribute neighbours. BFS ties
//! therefore resolve toward direct connections.
//!
//! - `find_route` is hop-count BFS, the default strategy.
//! - `find_weighted_route` is Dijkstra with per-class costs, bounded by the
//!   same hop limit. Equal costs resolve by push order.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use uuid::Uuid;

use crate::config::PathfindingConfig;
use crate::models::{AcceptedEdge, NodeType, PathEdge, PathNode, PathResult, UserSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeClass {
    Connection,
    SharedSkill,
    SharedCommunity,
}

impl EdgeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeClass::Connection => "CONNECTED_TO",
            EdgeClass::SharedSkill => "SHARED_SKILL",
            EdgeClass::SharedCommunity => "SHARED_COMMUNITY",
        }
    }
}

/// Two users sharing a named attribute (a skill or a community).
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SharedAttribute {
    pub user_a: Uuid,
    pub user_b: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hop {
    pub to: Uuid,
    pub class: EdgeClass,
    /// Skill or community name for attribute edges.
    pub attribute: Option<String>,
}

/// Undirected adjacency list preserving insertion order per node.
#[derive(Debug, Default)]
pub struct Adjacency {
    neighbours: HashMap<Uuid, Vec<Hop>>,
}

impl Adjacency {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections, then shared skills, then shared communities.
    pub fn build(
        connections: &[AcceptedEdge],
        shared_skills: &[SharedAttribute],
        shared_communities: &[SharedAttribute],
    ) -> Self {
        let mut adjacency = Self::new();
        for edge in connections {
            adjacency.link(edge.requester_id, edge.addressee_id, EdgeClass::Connection, None);
        }
        for shared in shared_skills {
            adjacency.link(
                shared.user_a,
                shared.user_b,
                EdgeClass::SharedSkill,
                Some(shared.name.clone()),
            );
        }
        for shared in shared_communities {
            adjacency.link(
                shared.user_a,
                shared.user_b,
                EdgeClass::SharedCommunity,
                Some(shared.name.clone()),
            );
        }
        adjacency
    }

    pub fn link(&mut self, a: Uuid, b: Uuid, class: EdgeClass, attribute: Option<String>) {
        if a == b {
            return;
        }
        self.neighbours.entry(a).or_default().push(Hop {
            to: b,
            class,
            attribute: attribute.clone(),
        });
        self.neighbours.entry(b).or_default().push(Hop {
            to: a,
            class,
            attribute,
        });
    }

    pub fn contains(&self, node: Uuid) -> bool {
        self.neighbours.contains_key(&node)
    }

    pub fn neighbours(&self, node: Uuid) -> &[Hop] {
        self.neighbours.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteStep {
    pub from: Uuid,
    pub to: Uuid,
    pub class: EdgeClass,
    pub attribute: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// Source first, target last.
    pub nodes: Vec<Uuid>,
    pub steps: Vec<RouteStep>,
    /// Set by the weighted search only.
    pub cost: Option<f64>,
}

impl Route {
    fn single(node: Uuid, cost: Option<f64>) -> Self {
        Self {
            nodes: vec![node],
            steps: vec![],
            cost,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Per-class traversal costs for the weighted strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeCosts {
    pub connection: f64,
    pub shared_skill: f64,
    pub shared_community: f64,
}

impl EdgeCosts {
    pub fn cost(&self, class: EdgeClass) -> f64 {
        match class {
            EdgeClass::Connection => self.connection,
            EdgeClass::SharedSkill => self.shared_skill,
            EdgeClass::SharedCommunity => self.shared_community,
        }
    }
}

impl From<&PathfindingConfig> for EdgeCosts {
    fn from(config: &PathfindingConfig) -> Self {
        Self {
            connection: config.connection_cost,
            shared_skill: config.shared_skill_cost,
            shared_community: config.shared_community_cost,
        }
    }
}

// ============================================================================
// Search
// ============================================================================

/// Walk parent pointers back from `target`.
fn unwind(parents: &HashMap<Uuid, (Uuid, Hop)>, source: Uuid, target: Uuid) -> Route {
    let mut steps = Vec::new();
    let mut cursor = target;
    while cursor != source {
        let Some((prev, hop)) = parents.get(&cursor) else {
            break;
        };
        steps.push(RouteStep {
            from: *prev,
            to: cursor,
            class: hop.class,
            attribute: hop.attribute.clone(),
        });
        cursor = *prev;
    }
    steps.reverse();

    let mut nodes = vec![source];
    nodes.extend(steps.iter().map(|s| s.to));
    Route {
        nodes,
        steps,
        cost: None,
    }
}

/// Minimum-hop route of at most `max_depth` hops.
///
/// The target is checked when a neighbour is generated, so the first route
/// found is the first shortest one in adjacency order.
pub fn find_route(adjacency: &Adjacency, source: Uuid, target: Uuid, max_depth: u32) -> Option<Route> {
    if source == target {
        return Some(Route::single(source, None));
    }
    if max_depth == 0 || !adjacency.contains(source) {
        return None;
    }

    let mut parents: HashMap<Uuid, (Uuid, Hop)> = HashMap::new();
    let mut visited: HashSet<Uuid> = HashSet::from([source]);
    let mut queue: VecDeque<(Uuid, u32)> = VecDeque::from([(source, 0)]);

    while let Some((current, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        for hop in adjacency.neighbours(current) {
            if hop.to == target {
                parents.insert(target, (current, hop.clone()));
                return Some(unwind(&parents, source, target));
            }
            if visited.insert(hop.to) {
                parents.insert(hop.to, (current, hop.clone()));
                queue.push_back((hop.to, depth + 1));
            }
        }
    }

    None
}

#[derive(Debug)]
struct Frontier {
    cost: f64,
    seq: u64,
    node: Uuid,
    hops: u32,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    // Reversed so BinaryHeap pops the cheapest, earliest-pushed entry.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Cheapest route of at most `max_depth` hops under `costs`.
///
/// States are `(node, hops)` so the hop bound never hides a cheaper route
/// that happens to use more hops.
pub fn find_weighted_route(
    adjacency: &Adjacency,
    source: Uuid,
    target: Uuid,
    max_depth: u32,
    costs: &EdgeCosts,
) -> Option<Route> {
    if source == target {
        return Some(Route::single(source, Some(0.0)));
    }
    if max_depth == 0 || !adjacency.contains(source) {
        return None;
    }

    type State = (Uuid, u32);
    let mut best: HashMap<State, f64> = HashMap::from([((source, 0), 0.0)]);
    let mut parents: HashMap<State, (State, Hop)> = HashMap::new();
    let mut settled: HashSet<State> = HashSet::new();
    let mut heap = BinaryHeap::new();
    let mut seq = 0u64;
    heap.push(Frontier {
        cost: 0.0,
        seq,
        node: source,
        hops: 0,
    });

    while let Some(Frontier { cost, node, hops, .. }) = heap.pop() {
        let state = (node, hops);
        if !settled.insert(state) {
            continue;
        }
        if node == target {
            let mut steps = Vec::new();
            let mut cursor = state;
            while let Some((prev, hop)) = parents.get(&cursor) {
                steps.push(RouteStep {
                    from: prev.0,
                    to: cursor.0,
                    class: hop.class,
                    attribute: hop.attribute.clone(),
                });
                cursor = *prev;
            }
            steps.reverse();
            let mut nodes = vec![source];
            nodes.extend(steps.iter().map(|s| s.to));
            return Some(Route {
                nodes,
                steps,
                cost: Some(cost),
            });
        }
        if hops >= max_depth {
            continue;
        }
        for hop in adjacency.neighbours(node) {
            // Revisiting the source can never shorten a route.
            if hop.to == source {
                continue;
            }
            let next = (hop.to, hops + 1);
            let next_cost = cost + costs.cost(hop.class);
            if best.get(&next).map_or(true, |c| next_cost < *c) {
                best.insert(next, next_cost);
                parents.insert(next, (state, hop.clone()));
                seq += 1;
                heap.push(Frontier {
                    cost: next_cost,
                    seq,
                    node: hop.to,
                    hops: hops + 1,
                });
            }
        }
    }

    None
}

// ============================================================================
// Presentation
// ============================================================================

fn step_label(step: &RouteStep) -> String {
    match (step.class, step.attribute.as_deref()) {
        (EdgeClass::Connection, _) => "Connected".to_string(),
        (EdgeClass::SharedSkill, Some(name)) => format!("Shared skill: {}", name),
        (EdgeClass::SharedCommunity, Some(name)) => format!("Shared community: {}", name),
        (EdgeClass::SharedSkill, None) => "Shared skill".to_string(),
        (EdgeClass::SharedCommunity, None) => "Shared community".to_string(),
    }
}

/// Decorate a route with user details. Users missing from `users` are
/// labelled by id.
pub fn route_to_result(route: Option<Route>, users: &HashMap<Uuid, UserSummary>) -> PathResult {
    let Some(route) = route else {
        return PathResult::not_found();
    };

    let path = route
        .nodes
        .iter()
        .map(|id| {
            let user = users.get(id);
            PathNode {
                id: id.to_string(),
                node_type: NodeType::User,
                label: user
                    .map(|u| u.display_name().to_string())
                    .unwrap_or_else(|| id.to_string()),
                image_url: user.and_then(|u| u.profile_image_url.clone()),
            }
        })
        .collect();

    let mut relationship_types: Vec<String> = Vec::new();
    let edges = route
        .steps
        .iter()
        .map(|step| {
            let edge_type = step.class.as_str().to_string();
            if !relationship_types.contains(&edge_type) {
                relationship_types.push(edge_type.clone());
            }
            PathEdge {
                source: step.from.to_string(),
                target: step.to.to_string(),
                edge_type,
                label: Some(step_label(step)),
            }
        })
        .collect();

    PathResult {
        found: true,
        path,
        edges,
        length: route.len(),
        relationship_types,
        total_cost: route.cost,
    }
}

// ============================================================================
// TESTS
// ============================================================================
