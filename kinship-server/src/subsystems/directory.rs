//! Relational reads shared by the graph subsystems: user summaries,
//! affiliations and the accepted-connection topology.

use std::collections::{HashMap, HashSet};

use kinship_core::mirror::pair_key;
use kinship_core::models::{
    AcceptedEdge, Affiliations, CommunityRecord, EventRecord, SkillFrequency, SkillRecord, UserSummary,
};
use kinship_core::pathfinding::SharedAttribute;
use kinship_core::KinshipError;
use sqlx::PgPool;
use uuid::Uuid;

const USER_SUMMARY_SELECT: &str = "SELECT u.id, u.username, up.full_name, up.profile_image_url, up.location
     FROM users u
     LEFT JOIN user_profiles up ON up.user_id = u.id";

pub async fn load_user(pool: &PgPool, user_id: Uuid) -> Result<Option<UserSummary>, KinshipError> {
    let user = sqlx::query_as::<_, UserSummary>(&format!("{} WHERE u.id = $1", USER_SUMMARY_SELECT))
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn load_users(pool: &PgPool, ids: &[Uuid]) -> Result<HashMap<Uuid, UserSummary>, KinshipError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = sqlx::query_as::<_, UserSummary>(&format!("{} WHERE u.id = ANY($1)", USER_SUMMARY_SELECT))
        .bind(ids)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|u| (u.id, u)).collect())
}

pub async fn is_active_user(pool: &PgPool, user_id: Uuid) -> Result<bool, KinshipError> {
    let active: Option<bool> = sqlx::query_scalar("SELECT is_active FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(active.unwrap_or(false))
}

/// Skills, communities and events of one user, oldest affiliation first.
pub async fn load_affiliations(pool: &PgPool, user_id: Uuid) -> Result<Affiliations, KinshipError> {
    let skills = sqlx::query_as::<_, SkillRecord>(
        "SELECT s.id, s.name, s.category
         FROM user_skills us
         JOIN skills s ON s.id = us.skill_id
         WHERE us.user_id = $1
         ORDER BY us.created_at, s.name",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let communities = sqlx::query_as::<_, CommunityRecord>(
        "SELECT c.id, c.name, c.slug, c.category, c.image_url
         FROM community_members cm
         JOIN communities c ON c.id = cm.community_id
         WHERE cm.user_id = $1
         ORDER BY cm.joined_at, c.name",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let events = sqlx::query_as::<_, EventRecord>(
        "SELECT e.id, e.name, e.event_type, e.start_datetime, e.location_city, e.image_url
         FROM event_registrations er
         JOIN events e ON e.id = er.event_id
         WHERE er.user_id = $1 AND er.status <> 'cancelled'
         ORDER BY e.start_datetime NULLS LAST, e.name",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(Affiliations {
        skills,
        communities,
        events,
    })
}

#[derive(sqlx::FromRow)]
struct NamedRow {
    user_id: Uuid,
    name: String,
}

fn group_names(rows: Vec<NamedRow>) -> HashMap<Uuid, Vec<String>> {
    let mut out: HashMap<Uuid, Vec<String>> = HashMap::new();
    for row in rows {
        out.entry(row.user_id).or_default().push(row.name);
    }
    out
}

/// Skill names per user, alphabetical.
pub async fn skills_by_user(pool: &PgPool, ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<String>>, KinshipError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = sqlx::query_as::<_, NamedRow>(
        "SELECT us.user_id, s.name
         FROM user_skills us
         JOIN skills s ON s.id = us.skill_id
         WHERE us.user_id = ANY($1)
         ORDER BY us.user_id, s.name",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;
    Ok(group_names(rows))
}

/// Community names per user, alphabetical.
pub async fn communities_by_user(pool: &PgPool, ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<String>>, KinshipError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = sqlx::query_as::<_, NamedRow>(
        "SELECT cm.user_id, c.name
         FROM community_members cm
         JOIN communities c ON c.id = cm.community_id
         WHERE cm.user_id = ANY($1)
         ORDER BY cm.user_id, c.name",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;
    Ok(group_names(rows))
}

/// Users opted into graph visibility, by id.
pub async fn visible_users(pool: &PgPool, exclude: Uuid, limit: usize) -> Result<Vec<Uuid>, KinshipError> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        "SELECT u.id
         FROM users u
         JOIN user_profiles up ON up.user_id = u.id
         WHERE u.is_active = TRUE AND up.show_in_graph = TRUE AND u.id <> $1
         ORDER BY u.id
         LIMIT $2",
    )
    .bind(exclude)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

#[derive(sqlx::FromRow)]
struct EdgeRow {
    requester_id: Uuid,
    addressee_id: Uuid,
}

impl From<EdgeRow> for AcceptedEdge {
    fn from(row: EdgeRow) -> Self {
        AcceptedEdge {
            requester_id: row.requester_id,
            addressee_id: row.addressee_id,
        }
    }
}

/// Every accepted connection, by canonical pair.
pub async fn all_accepted_edges(pool: &PgPool) -> Result<Vec<AcceptedEdge>, KinshipError> {
    let rows = sqlx::query_as::<_, EdgeRow>(
        "SELECT requester_id, addressee_id
         FROM connections
         WHERE status = 'accepted'
         ORDER BY LEAST(requester_id, addressee_id), GREATEST(requester_id, addressee_id)",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(AcceptedEdge::from).collect())
}

/// Relational twin of `GraphMirror::accepted_edges`: accepted edges with an
/// endpoint strictly inside `depth` hops of `center`, by canonical pair.
pub async fn accepted_edges_within(pool: &PgPool, center: Uuid, depth: u32) -> Result<Vec<AcceptedEdge>, KinshipError> {
    let mut visited: HashSet<Uuid> = HashSet::from([center]);
    let mut frontier: Vec<Uuid> = vec![center];
    let mut edges: HashMap<(Uuid, Uuid), AcceptedEdge> = HashMap::new();

    for _hop in 0..depth {
        if frontier.is_empty() {
            break;
        }
        let rows = sqlx::query_as::<_, EdgeRow>(
            "SELECT requester_id, addressee_id
             FROM connections
             WHERE status = 'accepted'
               AND (requester_id = ANY($1) OR addressee_id = ANY($1))",
        )
        .bind(&frontier)
        .fetch_all(pool)
        .await?;

        let mut next = Vec::new();
        for row in rows {
            let edge = AcceptedEdge::from(row);
            edges.insert(pair_key(edge.requester_id, edge.addressee_id), edge);
            for id in [edge.requester_id, edge.addressee_id] {
                if visited.insert(id) {
                    next.push(id);
                }
            }
        }
        frontier = next;
    }

    let mut keyed: Vec<((Uuid, Uuid), AcceptedEdge)> = edges.into_iter().collect();
    keyed.sort_by_key(|(key, _)| *key);
    Ok(keyed.into_iter().map(|(_, edge)| edge).collect())
}

/// Relational twin of `GraphMirror::edges_among`.
pub async fn accepted_edges_among(pool: &PgPool, members: &[Uuid]) -> Result<Vec<AcceptedEdge>, KinshipError> {
    if members.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query_as::<_, EdgeRow>(
        "SELECT requester_id, addressee_id
         FROM connections
         WHERE status = 'accepted'
           AND requester_id = ANY($1) AND addressee_id = ANY($1)
         ORDER BY LEAST(requester_id, addressee_id), GREATEST(requester_id, addressee_id)",
    )
    .bind(members)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(AcceptedEdge::from).collect())
}

pub async fn load_community(pool: &PgPool, community_id: Uuid) -> Result<Option<CommunityRecord>, KinshipError> {
    let community = sqlx::query_as::<_, CommunityRecord>(
        "SELECT id, name, slug, category, image_url FROM communities WHERE id = $1",
    )
    .bind(community_id)
    .fetch_optional(pool)
    .await?;
    Ok(community)
}

/// Active members of a community, earliest joiner first.
pub async fn community_members(pool: &PgPool, community_id: Uuid) -> Result<Vec<UserSummary>, KinshipError> {
    let members = sqlx::query_as::<_, UserSummary>(
        "SELECT u.id, u.username, up.full_name, up.profile_image_url, up.location
         FROM community_members cm
         JOIN users u ON u.id = cm.user_id AND u.is_active = TRUE
         LEFT JOIN user_profiles up ON up.user_id = u.id
         WHERE cm.community_id = $1
         ORDER BY cm.joined_at, u.id",
    )
    .bind(community_id)
    .fetch_all(pool)
    .await?;
    Ok(members)
}

/// Skills most often held by active users who hold `skill_name`, most
/// frequent first. The skill itself is excluded.
pub async fn co_held_skills(pool: &PgPool, skill_name: &str, limit: usize) -> Result<Vec<SkillFrequency>, KinshipError> {
    let rows = sqlx::query_as::<_, SkillFrequency>(
        "SELECT s2.name::TEXT AS name, COUNT(DISTINCT us1.user_id) AS frequency
         FROM skills target
         JOIN user_skills us1 ON us1.skill_id = target.id
         JOIN users u ON u.id = us1.user_id AND u.is_active = TRUE
         JOIN user_skills us2 ON us2.user_id = us1.user_id AND us2.skill_id <> target.id
         JOIN skills s2 ON s2.id = us2.skill_id
         WHERE LOWER(target.name) = LOWER($1)
         GROUP BY s2.name
         ORDER BY frequency DESC, s2.name
         LIMIT $2",
    )
    .bind(skill_name)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Pairs sharing a skill where one side is `source` or `target`. Rows for
/// `source` come first.
pub async fn shared_skill_pairs(pool: &PgPool, source: Uuid, target: Uuid) -> Result<Vec<SharedAttribute>, KinshipError> {
    let rows = sqlx::query_as::<_, SharedAttribute>(
        "SELECT us1.user_id AS user_a, us2.user_id AS user_b, s.name
         FROM user_skills us1
         JOIN user_skills us2 ON us2.skill_id = us1.skill_id AND us2.user_id <> us1.user_id
         JOIN skills s ON s.id = us1.skill_id
         JOIN users u ON u.id = us2.user_id AND u.is_active = TRUE
         WHERE us1.user_id IN ($1, $2)
         ORDER BY (us1.user_id = $1) DESC, s.name, us2.user_id",
    )
    .bind(source)
    .bind(target)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn shared_community_pairs(
    pool: &PgPool,
    source: Uuid,
    target: Uuid,
) -> Result<Vec<SharedAttribute>, KinshipError> {
    let rows = sqlx::query_as::<_, SharedAttribute>(
        "SELECT cm1.user_id AS user_a, cm2.user_id AS user_b, c.name
         FROM community_members cm1
         JOIN community_members cm2 ON cm2.community_id = cm1.community_id AND cm2.user_id <> cm1.user_id
         JOIN communities c ON c.id = cm1.community_id
         JOIN users u ON u.id = cm2.user_id AND u.is_active = TRUE
         WHERE cm1.user_id IN ($1, $2)
         ORDER BY (cm1.user_id = $1) DESC, c.name, cm2.user_id",
    )
    .bind(source)
    .bind(target)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
