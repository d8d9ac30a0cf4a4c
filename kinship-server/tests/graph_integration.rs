mod common;

use kinship_core::config::{PathStrategy, SyncMode};
use kinship_core::models::{ClusterAlgorithm, GraphSource, NodeType, ViewType};
use kinship_server::subsystems::{assemble, cluster, community, paths, roadmap, similar, sync};
use uuid::Uuid;

use common::{add_community, add_skill, connect, make_state, make_user, unique};

// ========================================================================
// TEST 1: personal graph from the mirror, then from the ledger
// ========================================================================
#[tokio::test]
async fn test_personal_graph_degrades_to_ledger() {
    let (mut kinship, mirror) = match make_state(SyncMode::Inline).await {
        Some(s) => s,
        None => {
            eprintln!("Skipping test_personal_graph_degrades_to_ledger: DB unavailable");
            return;
        }
    };
    let center = make_user(&kinship.pool, "Center", None).await;
    let friend = make_user(&kinship.pool, "Friend", None).await;
    let fof = make_user(&kinship.pool, "Friend Of Friend", None).await;
    connect(&kinship, center, friend).await;
    connect(&kinship, friend, fof).await;

    let graph = assemble::assemble(&kinship, center, ViewType::Personal, Some(1), None, None)
        .await
        .unwrap();
    assert_eq!(graph.metadata.source, GraphSource::Mirror);
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.nodes[0].id, center.to_string());
    assert_eq!(graph.nodes[1].label, "Friend");

    let graph = assemble::assemble(&kinship, center, ViewType::Personal, Some(2), None, None)
        .await
        .unwrap();
    assert_eq!(graph.nodes.len(), 3);
    assert_eq!(graph.edges.len(), 2);

    mirror.set_available(false);
    let fallback = assemble::assemble(&kinship, center, ViewType::Personal, Some(2), None, None)
        .await
        .unwrap();
    assert_eq!(fallback.metadata.source, GraphSource::Relational);
    let ids: Vec<&str> = fallback.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, graph.nodes.iter().map(|n| n.id.as_str()).collect::<Vec<_>>());

    kinship.config.assembly.relational_fallback = false;
    let unavailable = assemble::assemble(&kinship, center, ViewType::Personal, Some(2), None, None)
        .await
        .unwrap();
    assert_eq!(unavailable.metadata.source, GraphSource::Unavailable);
    assert_eq!(unavailable.nodes.len(), 1, "only the center survives");
    assert!(unavailable.edges.is_empty());
}

// ========================================================================
// TEST 2: ecosystem graph attaches the center's affiliations
// ========================================================================
#[tokio::test]
async fn test_ecosystem_graph_affiliations() {
    let (kinship, _mirror) = match make_state(SyncMode::Inline).await {
        Some(s) => s,
        None => {
            eprintln!("Skipping test_ecosystem_graph_affiliations: DB unavailable");
            return;
        }
    };
    let center = make_user(&kinship.pool, "Center", None).await;
    let friend = make_user(&kinship.pool, "Friend", None).await;
    connect(&kinship, center, friend).await;
    let skill = unique("Rust");
    let community = unique("rustaceans");
    add_skill(&kinship.pool, center, &skill).await;
    add_skill(&kinship.pool, friend, &unique("Go")).await;
    add_community(&kinship.pool, center, &community).await;

    let graph = assemble::assemble(&kinship, center, ViewType::Ecosystem, None, None, None)
        .await
        .unwrap();
    let types: Vec<NodeType> = graph.nodes.iter().map(|n| n.node_type).collect();
    assert_eq!(types, vec![NodeType::User, NodeType::User, NodeType::Skill, NodeType::Community]);
    assert!(graph.nodes.iter().any(|n| n.label == skill));
    assert!(graph.edges.iter().any(|e| e.edge_type == "HAS_SKILL" && e.source == center.to_string()));
    assert!(graph.edges.iter().any(|e| e.edge_type == "MEMBER_OF"));

    // Filtering keeps the center plus the requested types
    let skills_only = assemble::assemble(
        &kinship,
        center,
        ViewType::Ecosystem,
        None,
        Some(&[NodeType::Skill][..]),
        None,
    )
    .await
    .unwrap();
    assert_eq!(skills_only.nodes.len(), 2);
    assert_eq!(skills_only.edges.len(), 1);

    // Truncation keeps construction order
    let truncated = assemble::assemble(&kinship, center, ViewType::Ecosystem, None, None, Some(2))
        .await
        .unwrap();
    assert!(truncated.metadata.truncated);
    assert_eq!(truncated.metadata.total_nodes, 4);
    assert_eq!(truncated.nodes[1].id, friend.to_string());
}

// ========================================================================
// TEST 3: discover view lists opted-in users only
// ========================================================================
#[tokio::test]
async fn test_discover_graph_visibility() {
    let (kinship, _mirror) = match make_state(SyncMode::Inline).await {
        Some(s) => s,
        None => {
            eprintln!("Skipping test_discover_graph_visibility: DB unavailable");
            return;
        }
    };
    let center = make_user(&kinship.pool, "Center", None).await;
    let visible = make_user(&kinship.pool, "Visible", Some(true)).await;
    let hidden = make_user(&kinship.pool, "Hidden", Some(false)).await;
    let skill = unique("Python");
    add_skill(&kinship.pool, visible, &skill).await;
    for id in [center, visible, hidden] {
        sync::sync_user(&kinship, id).await.unwrap();
    }

    let graph = assemble::assemble(&kinship, center, ViewType::Discover, None, None, None)
        .await
        .unwrap();
    assert_eq!(graph.metadata.source, GraphSource::Mirror);
    let ids: Vec<String> = graph.nodes.iter().map(|n| n.id.clone()).collect();
    assert_eq!(ids, vec![center.to_string(), visible.to_string()]);
    assert_eq!(graph.nodes[1].properties["skills"], serde_json::json!([skill]));
    assert!(graph.edges.is_empty());
}

// ========================================================================
// TEST 4: path finding edge cases
// ========================================================================
#[tokio::test]
async fn test_find_path_cases() {
    let (kinship, _mirror) = match make_state(SyncMode::Inline).await {
        Some(s) => s,
        None => {
            eprintln!("Skipping test_find_path_cases: DB unavailable");
            return;
        }
    };
    let a = make_user(&kinship.pool, "A", None).await;
    let b = make_user(&kinship.pool, "B", None).await;
    let c = make_user(&kinship.pool, "C", None).await;
    let loner = make_user(&kinship.pool, "Loner", None).await;

    // Self-path
    let result = paths::find_path(&kinship, a, a, Some(5), None).await.unwrap();
    assert!(result.found);
    assert_eq!(result.length, 0);
    assert_eq!(result.path.len(), 1);
    assert_eq!(result.path[0].id, a.to_string());

    // No edges of any kind
    let result = paths::find_path(&kinship, a, loner, Some(5), None).await.unwrap();
    assert!(!result.found);
    assert_eq!(result.length, 0);

    // Direct connection beats the shared-skill detour through C
    connect(&kinship, a, b).await;
    let skill = unique("SQL");
    add_skill(&kinship.pool, a, &skill).await;
    add_skill(&kinship.pool, c, &skill).await;
    connect(&kinship, c, b).await;

    let result = paths::find_path(&kinship, a, b, Some(5), None).await.unwrap();
    assert!(result.found);
    assert_eq!(result.length, 1);
    assert_eq!(result.relationship_types, vec!["CONNECTED_TO"]);

    // Shared skill alone is enough to reach C
    let result = paths::find_path(&kinship, a, c, Some(5), Some(PathStrategy::Hops)).await.unwrap();
    assert_eq!(result.length, 1);
    assert_eq!(result.edges[0].edge_type, "SHARED_SKILL");
    assert_eq!(result.edges[0].label.as_deref(), Some(format!("Shared skill: {}", skill).as_str()));

    // Weighted: two connections (2.0) beat one skill edge (2.5)
    let result = paths::find_path(&kinship, a, c, Some(5), Some(PathStrategy::Weighted)).await.unwrap();
    assert_eq!(result.length, 2);
    assert_eq!(result.total_cost, Some(2.0));

    // Unknown endpoints, including an unknown self-path, are simply not found
    let ghost = Uuid::new_v4();
    let result = paths::find_path(&kinship, a, ghost, None, None).await.unwrap();
    assert!(!result.found);
    assert!(result.path.is_empty());
    let result = paths::find_path(&kinship, ghost, ghost, None, None).await.unwrap();
    assert!(!result.found);
    assert_eq!(result.length, 0);
}

// ========================================================================
// TEST 5: skill overlap alone scores 1.0 when all skills are shared
// ========================================================================
#[tokio::test]
async fn test_skill_overlap_similarity() {
    let (kinship, _mirror) = match make_state(SyncMode::Inline).await {
        Some(s) => s,
        None => {
            eprintln!("Skipping test_skill_overlap_similarity: DB unavailable");
            return;
        }
    };
    let python = unique("Python");
    let sql = unique("SQL");
    let u1 = make_user(&kinship.pool, "U1", None).await;
    add_skill(&kinship.pool, u1, &python).await;
    add_skill(&kinship.pool, u1, &sql).await;

    let mut others = Vec::new();
    for i in 2..=5 {
        let u = make_user(&kinship.pool, &format!("U{}", i), None).await;
        add_skill(&kinship.pool, u, &python).await;
        add_skill(&kinship.pool, u, &sql).await;
        others.push(u);
    }
    // One shared skill is not a match
    let weak = make_user(&kinship.pool, "Weak", None).await;
    add_skill(&kinship.pool, weak, &python).await;

    let report = similar::compute_similarities(&kinship, u1, Some(0.0), Some(10)).await.unwrap();
    assert_eq!(report.total, 4);
    let mut found: Vec<Uuid> = report.profiles.iter().map(|p| p.user_id).collect();
    found.sort();
    others.sort();
    assert_eq!(found, others);
    for profile in &report.profiles {
        assert_eq!(profile.similarity_score, 1.0);
        assert_eq!(profile.shared_skills.len(), 2);
        assert_eq!(profile.reasons, vec!["2 shared skills"]);
    }
}

// ========================================================================
// TEST 6: merged scores stay in [0, 1]; graph view mirrors the ranking
// ========================================================================
#[tokio::test]
async fn test_merged_similarity_bounds_and_graph() {
    let (kinship, _mirror) = match make_state(SyncMode::Inline).await {
        Some(s) => s,
        None => {
            eprintln!("Skipping test_merged_similarity_bounds_and_graph: DB unavailable");
            return;
        }
    };
    let skills: Vec<String> = (0..3).map(|i| unique(&format!("skill{}", i))).collect();
    let communities: Vec<String> = (0..4).map(|i| unique(&format!("guild{}", i))).collect();

    let me = make_user(&kinship.pool, "Me", None).await;
    let twin = make_user(&kinship.pool, "Twin", None).await;
    let neighbour = make_user(&kinship.pool, "Neighbour", None).await;
    for user in [me, twin] {
        for s in &skills {
            add_skill(&kinship.pool, user, s).await;
        }
        for c in &communities {
            add_community(&kinship.pool, user, c).await;
        }
    }
    add_community(&kinship.pool, neighbour, &communities[0]).await;
    add_community(&kinship.pool, neighbour, &communities[1]).await;

    let report = similar::compute_similarities(&kinship, me, Some(0.9), Some(10)).await.unwrap();
    assert_eq!(report.profiles.len(), 2);
    for profile in &report.profiles {
        assert!((0.0..=1.0).contains(&profile.similarity_score));
    }
    // Skill 1.0 merged with community 1.0 stays at 1.0
    assert_eq!(report.profiles[0].user_id, twin);
    assert_eq!(report.profiles[0].similarity_score, 1.0);
    assert_eq!(report.profiles[0].reasons.len(), 2);
    // Community-only matches surface below the requested floor
    assert_eq!(report.profiles[1].user_id, neighbour);
    assert!((report.profiles[1].similarity_score - 0.6).abs() < 1e-9);

    let graph = similar::similarity_graph(&kinship, me, 0.9, Some(10)).await.unwrap();
    assert_eq!(graph.metadata.view_type, ViewType::Similarity);
    assert_eq!(graph.nodes.len(), 3);
    let shared = graph
        .edges
        .iter()
        .find(|e| e.edge_type == "SHARED_INTERESTS")
        .expect("twin and neighbour share communities");
    assert_eq!(shared.label.as_deref(), Some("0 skills, 2 communities"));
    assert!(graph.edges.iter().any(|e| e.label.as_deref() == Some("100% similar")));
}

// ========================================================================
// TEST 7: skill clusters below the minimum size get no assignment
// ========================================================================
#[tokio::test]
async fn test_cluster_min_size() {
    let (kinship, _mirror) = match make_state(SyncMode::Inline).await {
        Some(s) => s,
        None => {
            eprintln!("Skipping test_cluster_min_size: DB unavailable");
            return;
        }
    };
    let center = make_user(&kinship.pool, "Center", None).await;
    let big = unique("Alpha");
    let small = unique("Beta");

    let mut big_members = Vec::new();
    for name in ["A1", "A2", "A3"] {
        let u = make_user(&kinship.pool, name, None).await;
        add_skill(&kinship.pool, u, &big).await;
        connect(&kinship, center, u).await;
        big_members.push(u.to_string());
    }
    let mut small_members = Vec::new();
    for name in ["B1", "B2"] {
        let u = make_user(&kinship.pool, name, None).await;
        add_skill(&kinship.pool, u, &small).await;
        connect(&kinship, center, u).await;
        small_members.push(u.to_string());
    }

    let clustered = cluster::cluster_for_user(&kinship, center, Some(ClusterAlgorithm::SkillBased), Some(3), None)
        .await
        .unwrap();
    assert_eq!(clustered.metadata.view_type, ViewType::Clustered);
    assert_eq!(clustered.clusters.len(), 1);
    let only = &clustered.clusters[0];
    assert_eq!(only.label, big);
    assert_eq!(only.size, 3);
    assert_eq!(only.dominant_type, Some(NodeType::User));

    for node in &clustered.nodes {
        if big_members.contains(&node.id) {
            assert_eq!(node.cluster, Some(0));
        } else {
            assert_eq!(node.cluster, None, "node {} should be unclustered", node.label);
        }
    }
    assert!(small_members.iter().all(|id| clustered.nodes.iter().any(|n| &n.id == id)));
}

// ========================================================================
// TEST 8: community graph keeps member-to-member edges only
// ========================================================================
#[tokio::test]
async fn test_community_graph_density_and_fallback() {
    let (mut kinship, mirror) = match make_state(SyncMode::Inline).await {
        Some(s) => s,
        None => {
            eprintln!("Skipping test_community_graph_density_and_fallback: DB unavailable");
            return;
        }
    };
    let name = unique("Rustaceans");
    let a = make_user(&kinship.pool, "A", None).await;
    let b = make_user(&kinship.pool, "B", None).await;
    let c = make_user(&kinship.pool, "C", None).await;
    let outsider = make_user(&kinship.pool, "Outsider", None).await;
    for member in [a, b, c] {
        add_community(&kinship.pool, member, &name).await;
    }
    connect(&kinship, a, b).await;
    connect(&kinship, b, outsider).await;

    let community_id: Uuid = sqlx::query_scalar("SELECT id FROM communities WHERE slug = $1")
        .bind(&name)
        .fetch_one(&kinship.pool)
        .await
        .unwrap();

    let graph = community::community_graph(&kinship, community_id).await.unwrap();
    assert_eq!(graph.community_name, name);
    assert_eq!(graph.member_count, 3);
    assert_eq!(graph.graph.metadata.view_type, ViewType::Community);
    assert_eq!(graph.graph.metadata.source, GraphSource::Mirror);
    assert_eq!(graph.graph.edges.len(), 1);
    assert!((graph.connection_density - 1.0 / 3.0).abs() < 1e-9);
    assert!(!graph.graph.nodes.iter().any(|n| n.id == outsider.to_string()));

    mirror.set_available(false);
    let fallback = community::community_graph(&kinship, community_id).await.unwrap();
    assert_eq!(fallback.graph.metadata.source, GraphSource::Relational);
    assert_eq!(fallback.graph.edges.len(), 1);
    assert_eq!(fallback.connection_density, graph.connection_density);

    kinship.config.assembly.relational_fallback = false;
    let unavailable = community::community_graph(&kinship, community_id).await.unwrap();
    assert_eq!(unavailable.graph.metadata.source, GraphSource::Unavailable);
    assert_eq!(unavailable.member_count, 3);
    assert!(unavailable.graph.edges.is_empty());
    assert_eq!(unavailable.connection_density, 0.0);

    let err = community::community_graph(&kinship, Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

// ========================================================================
// TEST 9: skill roadmap routes through skills held alongside the target
// ========================================================================
#[tokio::test]
async fn test_skill_roadmap_from_co_held_skills() {
    let (kinship, _mirror) = match make_state(SyncMode::Inline).await {
        Some(s) => s,
        None => {
            eprintln!("Skipping test_skill_roadmap_from_co_held_skills: DB unavailable");
            return;
        }
    };
    let base = unique("Python");
    let middle = unique("Statistics");
    let target = unique("Machine Learning");
    let learner = make_user(&kinship.pool, "Learner", None).await;
    add_skill(&kinship.pool, learner, &base).await;
    let mut holders = Vec::new();
    for name in ["Holder One", "Holder Two"] {
        let holder = make_user(&kinship.pool, name, None).await;
        add_skill(&kinship.pool, holder, &target).await;
        add_skill(&kinship.pool, holder, &middle).await;
        holders.push(holder);
    }
    add_skill(&kinship.pool, holders[0], &base).await;

    let result = roadmap::skill_roadmap(&kinship, learner, &target).await.unwrap();
    assert_eq!(result.current_skills, vec![base.clone()]);
    let names: Vec<&str> = result.path.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec![base.as_str(), middle.as_str(), target.as_str()]);
    assert_eq!(result.path[1].frequency, Some(2));
    assert!(result.path[2].is_target);
    assert!(!result.path[2].is_current);
    assert_eq!(result.graph.metadata.view_type, ViewType::Roadmap);
    assert_eq!(result.graph.edges.len(), 2);
    let mut found: Vec<Uuid> = result.profiles_with_skill.iter().map(|p| p.user_id).collect();
    found.sort();
    holders.sort();
    assert_eq!(found, holders);

    let err = roadmap::skill_roadmap(&kinship, learner, "  ").await.unwrap_err();
    assert_eq!(err.kind(), "validation");
    let err = roadmap::skill_roadmap(&kinship, Uuid::new_v4(), &target).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

// ========================================================================
// TEST 10: connection path follows accepted connections only
// ========================================================================
#[tokio::test]
async fn test_connection_path_degrees() {
    let (mut kinship, mirror) = match make_state(SyncMode::Inline).await {
        Some(s) => s,
        None => {
            eprintln!("Skipping test_connection_path_degrees: DB unavailable");
            return;
        }
    };
    let a = make_user(&kinship.pool, "A", None).await;
    let b = make_user(&kinship.pool, "B", None).await;
    let c = make_user(&kinship.pool, "C", None).await;
    let loner = make_user(&kinship.pool, "Loner", None).await;
    connect(&kinship, a, b).await;
    connect(&kinship, b, c).await;

    let result = paths::connection_path(&kinship, a, c, None).await.unwrap();
    assert_eq!(result.source, GraphSource::Mirror);
    assert_eq!(result.degree, 2);
    let ids: Vec<Uuid> = result.path.iter().map(|u| u.id).collect();
    assert_eq!(ids, vec![a, b, c]);

    let result = paths::connection_path(&kinship, a, c, Some(1)).await.unwrap();
    assert_eq!(result.degree, -1);
    assert!(result.path.is_empty());

    let result = paths::connection_path(&kinship, a, a, None).await.unwrap();
    assert_eq!(result.degree, 0);
    assert_eq!(result.path.len(), 1);

    let result = paths::connection_path(&kinship, a, loner, None).await.unwrap();
    assert_eq!(result.degree, -1);

    let result = paths::connection_path(&kinship, a, Uuid::new_v4(), None).await.unwrap();
    assert_eq!(result.degree, -1);

    mirror.set_available(false);
    let fallback = paths::connection_path(&kinship, a, c, None).await.unwrap();
    assert_eq!(fallback.source, GraphSource::Relational);
    assert_eq!(fallback.degree, 2);

    kinship.config.assembly.relational_fallback = false;
    let unavailable = paths::connection_path(&kinship, a, c, None).await.unwrap();
    assert_eq!(unavailable.source, GraphSource::Unavailable);
    assert_eq!(unavailable.degree, -1);
}
