//! Graph assembly: pure builders for the personal, ecosystem, discover and
//! similarity views, plus community graphs and skill roadmaps.
//!
//! The store-facing side (mirror reads, relational fallback, affiliation
//! loads) lives in the server crate. Everything here takes already-loaded
//! rows and is deterministic, so assembled graphs are reproducible in tests.
//!
//! Node order is construction order: center, connections in BFS discovery
//! order, then skills, communities and events. Truncation keeps the prefix.

use std::collections::{HashMap, HashSet, VecDeque};

use serde_json::{json, Map};
use uuid::Uuid;

use crate::models::{
    AcceptedEdge, Affiliations, CommunityGraph, CommunityRecord, EventRecord, GraphEdge, GraphMetadata, GraphNode,
    GraphSource, KnowledgeGraph, NodeType, RoadmapStep, SimilarityProfile, SkillFrequency, SkillRecord, SkillRoadmap,
    UserSummary, ViewType,
};

/// Hop bound accepted by every traversal view.
pub const MAX_GRAPH_DEPTH: u32 = 3;

pub const CENTER_NODE_SIZE: f64 = 1.5;
pub const DEFAULT_NODE_SIZE: f64 = 1.0;

// ============================================================================
// Decoration
// ============================================================================

pub fn node_color(node_type: NodeType) -> &'static str {
    match node_type {
        NodeType::User => "#0969da",
        NodeType::Skill => "#2da44e",
        NodeType::Community => "#8250df",
        NodeType::Event => "#bf8700",
        NodeType::Project => "#cf222e",
        NodeType::Company => "#57606a",
    }
}

pub fn node_size(node_type: NodeType, is_center: bool) -> f64 {
    if node_type == NodeType::User && is_center {
        CENTER_NODE_SIZE
    } else {
        DEFAULT_NODE_SIZE
    }
}

/// Color bucket for a similarity score.
pub fn similarity_color(score: f64) -> &'static str {
    if score >= 0.8 {
        "#2da44e"
    } else if score >= 0.6 {
        "#0969da"
    } else if score >= 0.4 {
        "#bf8700"
    } else {
        "#57606a"
    }
}

fn base_node(id: String, node_type: NodeType, label: String, is_center: bool) -> GraphNode {
    GraphNode {
        id,
        node_type,
        label,
        properties: Map::new(),
        size: node_size(node_type, is_center),
        color: node_color(node_type).to_string(),
        image_url: None,
        cluster: None,
    }
}

/// User node. A user missing from the directory is labelled by id so the
/// topology is still complete.
pub fn user_node(id: Uuid, summary: Option<&UserSummary>, is_center: bool) -> GraphNode {
    let label = summary
        .map(|s| s.display_name().to_string())
        .unwrap_or_else(|| id.to_string());
    let mut node = base_node(id.to_string(), NodeType::User, label, is_center);
    if let Some(s) = summary {
        node.properties.insert("username".into(), json!(s.username));
        node.properties.insert("location".into(), json!(s.location));
        node.image_url = s.profile_image_url.clone();
    }
    node.properties.insert("is_current_user".into(), json!(is_center));
    node
}

pub fn skill_node(skill: &SkillRecord) -> GraphNode {
    let mut node = base_node(skill.id.to_string(), NodeType::Skill, skill.name.clone(), false);
    node.properties.insert("category".into(), json!(skill.category));
    node
}

pub fn community_node(community: &CommunityRecord) -> GraphNode {
    let mut node = base_node(
        community.id.to_string(),
        NodeType::Community,
        community.name.clone(),
        false,
    );
    node.properties.insert("category".into(), json!(community.category));
    node.properties.insert("slug".into(), json!(community.slug));
    node.image_url = community.image_url.clone();
    node
}

pub fn event_node(event: &EventRecord) -> GraphNode {
    let mut node = base_node(event.id.to_string(), NodeType::Event, event.name.clone(), false);
    node.properties.insert("event_type".into(), json!(event.event_type));
    node.properties.insert(
        "start_datetime".into(),
        json!(event.start_datetime.map(|t| t.to_rfc3339())),
    );
    node.properties.insert("location_city".into(), json!(event.location_city));
    node.image_url = event.image_url.clone();
    node
}

/// Accepted-connection edge, keyed by the unordered pair.
pub fn connection_edge(edge: &AcceptedEdge) -> GraphEdge {
    let (lo, hi) = crate::mirror::pair_key(edge.requester_id, edge.addressee_id);
    GraphEdge {
        id: format!("conn_{}_{}", lo, hi),
        source: edge.requester_id.to_string(),
        target: edge.addressee_id.to_string(),
        edge_type: "CONNECTED_TO".to_string(),
        weight: None,
        label: Some("Connected".to_string()),
    }
}

fn affiliation_edge(prefix: &str, center: Uuid, target: Uuid, edge_type: &str, label: &str) -> GraphEdge {
    GraphEdge {
        id: format!("{}_{}_{}", prefix, center, target),
        source: center.to_string(),
        target: target.to_string(),
        edge_type: edge_type.to_string(),
        weight: None,
        label: Some(label.to_string()),
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Accumulates nodes and edges in construction order, ignoring repeats.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    node_ids: HashSet<String>,
    edge_ids: HashSet<String>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when a node with the same id was already added.
    pub fn push_node(&mut self, node: GraphNode) -> bool {
        if !self.node_ids.insert(node.id.clone()) {
            return false;
        }
        self.nodes.push(node);
        true
    }

    pub fn push_edge(&mut self, edge: GraphEdge) -> bool {
        if !self.edge_ids.insert(edge.id.clone()) {
            return false;
        }
        self.edges.push(edge);
        true
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Apply the node-type filter (the center always survives), truncate to
    /// `limit` and drop edges left dangling.
    pub fn finish(
        self,
        center: Option<Uuid>,
        view_type: ViewType,
        source: GraphSource,
        node_types: Option<&[NodeType]>,
        limit: usize,
    ) -> KnowledgeGraph {
        let center_id = center.map(|c| c.to_string());

        let mut nodes: Vec<GraphNode> = match node_types {
            Some(types) if !types.is_empty() => self
                .nodes
                .into_iter()
                .filter(|n| types.contains(&n.node_type) || Some(&n.id) == center_id.as_ref())
                .collect(),
            _ => self.nodes,
        };

        let total_nodes = nodes.len();
        let truncated = total_nodes > limit;
        nodes.truncate(limit);

        let kept: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        let edges: Vec<GraphEdge> = self
            .edges
            .into_iter()
            .filter(|e| kept.contains(e.source.as_str()) && kept.contains(e.target.as_str()))
            .collect();

        KnowledgeGraph {
            metadata: GraphMetadata {
                center_node: center_id,
                view_type,
                total_nodes,
                total_edges: edges.len(),
                truncated,
                source,
            },
            nodes,
            edges,
        }
    }
}

// ============================================================================
// Views
// ============================================================================

/// Ego network over accepted connections, at most `depth` hops from `center`.
///
/// Neighbours are visited in the order their edges appear in `edges`. An edge
/// is included when one endpoint lies strictly inside the depth horizon.
pub fn build_personal_graph(
    center: Uuid,
    edges: &[AcceptedEdge],
    depth: u32,
    users: &HashMap<Uuid, UserSummary>,
) -> GraphBuilder {
    let depth = depth.clamp(1, MAX_GRAPH_DEPTH);

    let mut adjacency: HashMap<Uuid, Vec<(Uuid, &AcceptedEdge)>> = HashMap::new();
    for edge in edges {
        adjacency
            .entry(edge.requester_id)
            .or_default()
            .push((edge.addressee_id, edge));
        adjacency
            .entry(edge.addressee_id)
            .or_default()
            .push((edge.requester_id, edge));
    }

    let mut builder = GraphBuilder::new();
    builder.push_node(user_node(center, users.get(&center), true));

    let mut distance: HashMap<Uuid, u32> = HashMap::from([(center, 0)]);
    let mut queue = VecDeque::from([center]);
    while let Some(current) = queue.pop_front() {
        let d = distance[&current];
        if d >= depth {
            continue;
        }
        for (next, edge) in adjacency.get(&current).into_iter().flatten() {
            builder.push_edge(connection_edge(edge));
            if !distance.contains_key(next) {
                distance.insert(*next, d + 1);
                builder.push_node(user_node(*next, users.get(next), false));
                queue.push_back(*next);
            }
        }
    }

    builder
}

/// Personal graph plus the center's own skills, communities and events.
pub fn build_ecosystem_graph(
    center: Uuid,
    edges: &[AcceptedEdge],
    depth: u32,
    users: &HashMap<Uuid, UserSummary>,
    affiliations: &Affiliations,
) -> GraphBuilder {
    let mut builder = build_personal_graph(center, edges, depth, users);

    for skill in &affiliations.skills {
        builder.push_node(skill_node(skill));
        builder.push_edge(affiliation_edge("skill", center, skill.id, "HAS_SKILL", "Has Skill"));
    }
    for community in &affiliations.communities {
        builder.push_node(community_node(community));
        builder.push_edge(affiliation_edge(
            "member",
            center,
            community.id,
            "MEMBER_OF",
            "Member Of",
        ));
    }
    for event in &affiliations.events {
        builder.push_node(event_node(event));
        builder.push_edge(affiliation_edge(
            "attending",
            center,
            event.id,
            "ATTENDING",
            "Attending",
        ));
    }

    builder
}

/// Center plus opted-in users, each annotated with skill and community names.
/// No edges: similarity edges come from the similarity view.
pub fn build_discover_graph(
    center: Uuid,
    visible: &[Uuid],
    users: &HashMap<Uuid, UserSummary>,
    skills: &HashMap<Uuid, Vec<String>>,
    communities: &HashMap<Uuid, Vec<String>>,
) -> GraphBuilder {
    let mut builder = GraphBuilder::new();
    let annotate = |mut node: GraphNode, id: &Uuid| {
        let empty = Vec::new();
        node.properties.insert(
            "skills".into(),
            json!(skills.get(id).unwrap_or(&empty)),
        );
        node.properties.insert(
            "communities".into(),
            json!(communities.get(id).unwrap_or(&empty)),
        );
        node
    };

    builder.push_node(annotate(user_node(center, users.get(&center), true), &center));
    for id in visible.iter().filter(|id| **id != center) {
        builder.push_node(annotate(user_node(*id, users.get(id), false), id));
    }
    builder
}

/// Center plus scored candidates. `SIMILAR_TO` edges run from the center to
/// each candidate; `SHARED_INTERESTS` edges link candidates sharing at least
/// two skills or any community.
pub fn build_similarity_graph(
    center: Uuid,
    center_summary: Option<&UserSummary>,
    profiles: &[SimilarityProfile],
) -> KnowledgeGraph {
    let mut builder = GraphBuilder::new();
    builder.push_node(user_node(center, center_summary, true));

    for profile in profiles {
        let mut properties = Map::new();
        properties.insert("username".into(), json!(profile.username));
        properties.insert("location".into(), json!(profile.location));
        properties.insert("similarity_score".into(), json!(profile.similarity_score));
        properties.insert("shared_skills".into(), json!(profile.shared_skills));
        properties.insert("shared_communities".into(), json!(profile.shared_communities));
        properties.insert("reasons".into(), json!(profile.reasons));

        builder.push_node(GraphNode {
            id: profile.user_id.to_string(),
            node_type: NodeType::User,
            label: profile
                .full_name
                .clone()
                .unwrap_or_else(|| profile.username.clone()),
            properties,
            size: 0.5 + profile.similarity_score,
            color: similarity_color(profile.similarity_score).to_string(),
            image_url: profile.profile_image_url.clone(),
            cluster: None,
        });

        builder.push_edge(GraphEdge {
            id: format!("similar_{}_{}", center, profile.user_id),
            source: center.to_string(),
            target: profile.user_id.to_string(),
            edge_type: "SIMILAR_TO".to_string(),
            weight: Some(profile.similarity_score),
            label: Some(format!("{}% similar", (profile.similarity_score * 100.0) as i64)),
        });
    }

    for (i, a) in profiles.iter().enumerate() {
        for b in &profiles[i + 1..] {
            let shared_skills = count_shared(&a.shared_skills, &b.shared_skills);
            let shared_communities = count_shared(&a.shared_communities, &b.shared_communities);
            if shared_skills >= 2 || shared_communities > 0 {
                let weight = (shared_skills as f64 * 0.1 + shared_communities as f64 * 0.2).min(1.0);
                builder.push_edge(GraphEdge {
                    id: format!("shared_{}_{}", a.user_id, b.user_id),
                    source: a.user_id.to_string(),
                    target: b.user_id.to_string(),
                    edge_type: "SHARED_INTERESTS".to_string(),
                    weight: Some(weight),
                    label: Some(format!(
                        "{} skills, {} communities",
                        shared_skills, shared_communities
                    )),
                });
            }
        }
    }

    let limit = builder.node_count();
    builder.finish(Some(center), ViewType::Similarity, GraphSource::Relational, None, limit)
}

fn count_shared(a: &[String], b: &[String]) -> usize {
    let set: HashSet<&String> = a.iter().collect();
    b.iter().filter(|s| set.contains(s)).count()
}

// ============================================================================
// Community graph
// ============================================================================

/// Share of possible member pairs that are connected.
pub fn connection_density(members: usize, edges: usize) -> f64 {
    if members < 2 {
        return 0.0;
    }
    let possible = (members * (members - 1)) as f64 / 2.0;
    (edges as f64 / possible).min(1.0)
}

/// Members in the given order plus the accepted edges between two members.
/// Edges touching a non-member are dropped.
pub fn build_community_graph(
    community: &CommunityRecord,
    members: &[UserSummary],
    edges: &[AcceptedEdge],
    source: GraphSource,
) -> CommunityGraph {
    let mut builder = GraphBuilder::new();
    let member_ids: HashSet<Uuid> = members.iter().map(|m| m.id).collect();
    for member in members {
        builder.push_node(user_node(member.id, Some(member), false));
    }
    for edge in edges
        .iter()
        .filter(|e| member_ids.contains(&e.requester_id) && member_ids.contains(&e.addressee_id))
    {
        builder.push_edge(connection_edge(edge));
    }

    let limit = builder.node_count();
    let graph = builder.finish(None, ViewType::Community, source, None, limit);
    CommunityGraph {
        community_id: community.id,
        community_name: community.name.clone(),
        member_count: members.len(),
        connection_density: connection_density(members.len(), graph.edges.len()),
        graph,
    }
}

// ============================================================================
// Skill roadmap
// ============================================================================

const ROADMAP_CURRENT_COLOR: &str = "#2da44e";
const ROADMAP_TARGET_COLOR: &str = "#bf8700";
const ROADMAP_STEP_COLOR: &str = "#57606a";

fn roadmap_node_id(skill: &str) -> String {
    format!("skill_{}", skill)
}

fn roadmap_node(skill: &str, color: &str, properties: Map<String, serde_json::Value>) -> GraphNode {
    GraphNode {
        id: roadmap_node_id(skill),
        node_type: NodeType::Skill,
        label: skill.to_string(),
        properties,
        size: DEFAULT_NODE_SIZE,
        color: color.to_string(),
        image_url: None,
        cluster: None,
    }
}

fn leads_to(from: &str, to: &str) -> GraphEdge {
    GraphEdge {
        id: format!("path_{}_{}", from, to),
        source: roadmap_node_id(from),
        target: roadmap_node_id(to),
        edge_type: "LEADS_TO".to_string(),
        weight: None,
        label: Some("Leads to".to_string()),
    }
}

/// Roadmap from the user's `current` skills to `target`.
///
/// Intermediates are the skills most often held by people who hold the
/// target (`co_held`, most frequent first), minus what the user already has.
/// Every current skill leads to every intermediate, and every intermediate
/// leads to the target. A target the user already holds is still the last
/// step, flagged as current.
pub fn build_skill_roadmap(
    target: &str,
    current: &[String],
    co_held: &[SkillFrequency],
    profiles_with_skill: Vec<SimilarityProfile>,
) -> SkillRoadmap {
    let holds_target = current.iter().any(|s| s == target);
    let owned: HashSet<&str> = current.iter().map(String::as_str).collect();
    let starting: Vec<&String> = current.iter().filter(|s| s.as_str() != target).collect();
    let intermediates: Vec<&SkillFrequency> = co_held
        .iter()
        .filter(|s| s.name != target && !owned.contains(s.name.as_str()))
        .collect();

    let mut builder = GraphBuilder::new();
    let mut path = Vec::new();

    for skill in &starting {
        let mut properties = Map::new();
        properties.insert("is_current".into(), json!(true));
        builder.push_node(roadmap_node(skill, ROADMAP_CURRENT_COLOR, properties));
        path.push(RoadmapStep {
            id: roadmap_node_id(skill),
            name: skill.to_string(),
            is_current: true,
            is_target: false,
            frequency: None,
        });
    }

    let mut properties = Map::new();
    properties.insert("is_target".into(), json!(true));
    properties.insert("is_current".into(), json!(holds_target));
    builder.push_node(roadmap_node(target, ROADMAP_TARGET_COLOR, properties));

    for step in &intermediates {
        let mut properties = Map::new();
        properties.insert("frequency".into(), json!(step.frequency));
        builder.push_node(roadmap_node(&step.name, ROADMAP_STEP_COLOR, properties));
        path.push(RoadmapStep {
            id: roadmap_node_id(&step.name),
            name: step.name.clone(),
            is_current: false,
            is_target: false,
            frequency: Some(step.frequency),
        });
    }

    for skill in &starting {
        for step in &intermediates {
            builder.push_edge(leads_to(skill, &step.name));
        }
    }
    for step in &intermediates {
        builder.push_edge(leads_to(&step.name, target));
    }

    path.push(RoadmapStep {
        id: roadmap_node_id(target),
        name: target.to_string(),
        is_current: holds_target,
        is_target: true,
        frequency: None,
    });

    let limit = builder.node_count();
    SkillRoadmap {
        target_skill: target.to_string(),
        current_skills: current.to_vec(),
        path,
        graph: builder.finish(None, ViewType::Roadmap, GraphSource::Relational, None, limit),
        profiles_with_skill,
    }
}

// ============================================================================
// TESTS
// ============================================================================
