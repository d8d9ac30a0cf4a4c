//! Cluster assignment over an assembled graph.
//!
//! Both algorithms share one output shape: nodes with `cluster` set for
//! members of surviving clusters, plus the cluster list. Clusters smaller
//! than `min_cluster_size` are dropped and their nodes stay unassigned.
//! Cluster ids and palette colors follow first appearance in node order.

use std::collections::HashMap;

use crate::config::ClusterKeySelection;
use crate::models::{
    Cluster, ClusterAlgorithm, ClusteredGraph, GraphEdge, GraphNode, KnowledgeGraph, NodeType, ViewType,
};

pub const CLUSTER_PALETTE: [&str; 10] = [
    "#0969da", "#2da44e", "#8250df", "#bf8700", "#cf222e", "#0550ae", "#1a7f37", "#6639ba", "#9a6700",
    "#a40e26",
];

/// Upper bound on label propagation sweeps.
const MAX_PROPAGATION_ROUNDS: usize = 20;
const TOP_SKILLS: usize = 3;

pub fn cluster_color(rank: usize) -> &'static str {
    CLUSTER_PALETTE[rank % CLUSTER_PALETTE.len()]
}

/// Pick the grouping key from a user's skill list.
pub fn cluster_key<'a>(skills: &'a [String], selection: ClusterKeySelection) -> Option<&'a String> {
    match selection {
        ClusterKeySelection::Lexicographic => skills.iter().min(),
        ClusterKeySelection::FirstListed => skills.first(),
    }
}

/// Groups in first-appearance order: `(key, member node ids)`.
type Groups = Vec<(String, Vec<String>)>;

fn push_member(groups: &mut Groups, index: &mut HashMap<String, usize>, key: String, node_id: String) {
    match index.get(&key) {
        Some(&i) => groups[i].1.push(node_id),
        None => {
            index.insert(key.clone(), groups.len());
            groups.push((key, vec![node_id]));
        }
    }
}

fn skill_groups(nodes: &[GraphNode], skills: &HashMap<String, Vec<String>>, selection: ClusterKeySelection) -> Groups {
    let mut groups = Groups::new();
    let mut index = HashMap::new();
    for node in nodes.iter().filter(|n| n.node_type == NodeType::User) {
        let Some(key) = skills.get(&node.id).and_then(|s| cluster_key(s, selection)) else {
            continue;
        };
        push_member(&mut groups, &mut index, key.clone(), node.id.clone());
    }
    groups
}

/// Deterministic label propagation. Nodes are swept in order; each adopts
/// the most frequent label among its neighbours, smallest label on ties.
fn structural_groups(nodes: &[GraphNode], edges: &[GraphEdge]) -> Groups {
    let position: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, n)| (n.id.as_str(), i)).collect();

    let mut neighbours: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for edge in edges {
        if let (Some(&s), Some(&t)) = (position.get(edge.source.as_str()), position.get(edge.target.as_str())) {
            if s != t {
                neighbours[s].push(t);
                neighbours[t].push(s);
            }
        }
    }

    let mut labels: Vec<usize> = (0..nodes.len()).collect();
    for _round in 0..MAX_PROPAGATION_ROUNDS {
        let mut changed = false;
        for i in 0..nodes.len() {
            if neighbours[i].is_empty() {
                continue;
            }
            let mut counts: HashMap<usize, usize> = HashMap::new();
            for &n in &neighbours[i] {
                *counts.entry(labels[n]).or_insert(0) += 1;
            }
            let best = counts
                .into_iter()
                .max_by(|(la, ca), (lb, cb)| ca.cmp(cb).then(lb.cmp(la)))
                .map(|(label, _)| label)
                .unwrap_or(labels[i]);
            if best != labels[i] {
                labels[i] = best;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let mut groups = Groups::new();
    let mut index = HashMap::new();
    for (node, label) in nodes.iter().zip(&labels) {
        push_member(&mut groups, &mut index, label.to_string(), node.id.clone());
    }
    groups
}

/// Most frequent skills across members, ties broken by name.
fn top_skills(members: &[String], skills: &HashMap<String, Vec<String>>) -> Vec<String> {
    let mut counts: HashMap<&String, usize> = HashMap::new();
    for member in members {
        for skill in skills.get(member).into_iter().flatten() {
            *counts.entry(skill).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(&String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|(na, ca), (nb, cb)| cb.cmp(ca).then(na.cmp(nb)));
    ranked.into_iter().take(TOP_SKILLS).map(|(name, _)| name.clone()).collect()
}

fn dominant_type(members: &[String], types: &HashMap<&str, NodeType>) -> Option<NodeType> {
    let mut order: Vec<NodeType> = Vec::new();
    let mut counts: HashMap<NodeType, usize> = HashMap::new();
    for member in members {
        if let Some(t) = types.get(member.as_str()) {
            if !counts.contains_key(t) {
                order.push(*t);
            }
            *counts.entry(*t).or_insert(0) += 1;
        }
    }
    // First-seen wins ties.
    order.into_iter().rev().max_by_key(|t| counts[t])
}

/// Assign clusters to `nodes`. `skills` maps user node ids to skill names.
pub fn cluster_nodes(
    mut nodes: Vec<GraphNode>,
    edges: &[GraphEdge],
    algorithm: ClusterAlgorithm,
    min_cluster_size: usize,
    skills: &HashMap<String, Vec<String>>,
    selection: ClusterKeySelection,
) -> (Vec<GraphNode>, Vec<Cluster>) {
    let groups = match algorithm {
        ClusterAlgorithm::SkillBased => skill_groups(&nodes, skills, selection),
        ClusterAlgorithm::Structural => structural_groups(&nodes, edges),
    };

    let types: HashMap<&str, NodeType> = nodes.iter().map(|n| (n.id.as_str(), n.node_type)).collect();
    let mut clusters: Vec<Cluster> = Vec::new();
    for (key, members) in groups {
        if members.len() < min_cluster_size.max(1) {
            continue;
        }
        let rank = clusters.len();
        let (label, top) = match algorithm {
            ClusterAlgorithm::SkillBased => (key.clone(), vec![key]),
            ClusterAlgorithm::Structural => {
                let top = top_skills(&members, skills);
                let label = top
                    .first()
                    .cloned()
                    .unwrap_or_else(|| format!("Cluster {}", rank + 1));
                (label, top)
            }
        };
        clusters.push(Cluster {
            id: rank,
            label,
            color: cluster_color(rank).to_string(),
            dominant_type: dominant_type(&members, &types),
            top_skills: top,
            size: members.len(),
            node_ids: members,
        });
    }

    let assignment: HashMap<String, usize> = clusters
        .iter()
        .flat_map(|c| c.node_ids.iter().map(move |id| (id.clone(), c.id)))
        .collect();
    for node in &mut nodes {
        node.cluster = assignment.get(&node.id).copied();
    }

    (nodes, clusters)
}

/// Cluster an assembled graph, keeping its edges and provenance.
pub fn cluster_graph(
    graph: KnowledgeGraph,
    algorithm: ClusterAlgorithm,
    min_cluster_size: usize,
    skills: &HashMap<String, Vec<String>>,
    selection: ClusterKeySelection,
) -> ClusteredGraph {
    let KnowledgeGraph {
        nodes,
        edges,
        mut metadata,
    } = graph;
    let (nodes, clusters) = cluster_nodes(nodes, &edges, algorithm, min_cluster_size, skills, selection);
    metadata.view_type = ViewType::Clustered;
    metadata.total_nodes = nodes.len();
    metadata.total_edges = edges.len();
    ClusteredGraph {
        nodes,
        edges,
        metadata,
        clusters,
    }
}

// ============================================================================
// TESTS
// ============================================================================
