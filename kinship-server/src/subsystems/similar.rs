//! Similarity signals read from the store and merged with
//! `kinship_core::scoring`.
//!
//! The three signal queries run concurrently; merging always happens in the
//! fixed order embedding, skills, communities.

use kinship_core::assembly::build_similarity_graph;
use kinship_core::models::{KnowledgeGraph, ProfileEmbedding, SimilarityProfile, SimilarityReport};
use kinship_core::scoring::{
    community_overlap_score, community_reason, embedding_reason, expertise_reason, expertise_score, finalize,
    merge_signal, skill_overlap_score, skill_reason, MIN_SHARED_SKILLS,
};
use kinship_core::KinshipError;
use sqlx::PgPool;
use uuid::Uuid;

use super::directory;
use crate::state::Kinship;

/// Candidate visibility shared by every signal query.
const VISIBLE_CANDIDATE: &str = "u.is_active = TRUE AND (up.show_in_graph = TRUE OR up.show_in_graph IS NULL)";

#[derive(sqlx::FromRow)]
struct EmbeddingMatch {
    user_id: Uuid,
    username: String,
    full_name: Option<String>,
    profile_image_url: Option<String>,
    location: Option<String>,
    similarity: Option<f64>,
}

#[derive(sqlx::FromRow)]
struct OverlapMatch {
    user_id: Uuid,
    username: String,
    full_name: Option<String>,
    profile_image_url: Option<String>,
    location: Option<String>,
    shared_count: i64,
    shared_names: Option<Vec<String>>,
}

fn profile(
    user_id: Uuid,
    username: String,
    full_name: Option<String>,
    profile_image_url: Option<String>,
    location: Option<String>,
    score: f64,
) -> SimilarityProfile {
    SimilarityProfile {
        user_id,
        username,
        full_name,
        profile_image_url,
        location,
        similarity_score: score,
        shared_skills: Vec::new(),
        shared_communities: Vec::new(),
        reasons: Vec::new(),
    }
}

/// Cosine similarity against the user's stored vector, filtered by
/// `min_similarity`. Empty when the user has no vector.
async fn embedding_signal(
    pool: &PgPool,
    user_id: Uuid,
    min_similarity: f64,
    limit: usize,
) -> Result<Vec<SimilarityProfile>, KinshipError> {
    let own = sqlx::query_as::<_, ProfileEmbedding>(
        "SELECT user_id, embedding, updated_at FROM profile_embeddings WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    let Some(vector) = own.and_then(|e| e.embedding) else {
        return Ok(Vec::new());
    };

    let rows = sqlx::query_as::<_, EmbeddingMatch>(&format!(
        "SELECT pe.user_id, u.username, up.full_name, up.profile_image_url, up.location,
                1 - (pe.embedding <=> $1) AS similarity
         FROM profile_embeddings pe
         JOIN users u ON u.id = pe.user_id
         LEFT JOIN user_profiles up ON up.user_id = pe.user_id
         WHERE pe.embedding IS NOT NULL
           AND pe.user_id <> $2
           AND {}
           AND 1 - (pe.embedding <=> $1) >= $3
         ORDER BY similarity DESC, pe.user_id
         LIMIT $4",
        VISIBLE_CANDIDATE
    ))
    .bind(&vector)
    .bind(user_id)
    .bind(min_similarity)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let mut p = profile(
                row.user_id,
                row.username,
                row.full_name,
                row.profile_image_url,
                row.location,
                row.similarity.unwrap_or(0.0),
            );
            p.reasons.push(embedding_reason());
            p
        })
        .collect())
}

/// Users sharing at least two of the user's skills.
async fn skill_signal(pool: &PgPool, user_id: Uuid, limit: usize) -> Result<Vec<SimilarityProfile>, KinshipError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_skills WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    if total == 0 {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, OverlapMatch>(&format!(
        "SELECT u.id AS user_id, u.username, up.full_name, up.profile_image_url, up.location,
                COUNT(DISTINCT us.skill_id) AS shared_count,
                ARRAY_AGG(DISTINCT s.name::TEXT) AS shared_names
         FROM users u
         JOIN user_skills us ON us.user_id = u.id
         JOIN skills s ON s.id = us.skill_id
         LEFT JOIN user_profiles up ON up.user_id = u.id
         WHERE u.id <> $1
           AND us.skill_id IN (SELECT skill_id FROM user_skills WHERE user_id = $1)
           AND {}
         GROUP BY u.id, u.username, up.full_name, up.profile_image_url, up.location
         HAVING COUNT(DISTINCT us.skill_id) >= $2
         ORDER BY shared_count DESC, u.id
         LIMIT $3",
        VISIBLE_CANDIDATE
    ))
    .bind(user_id)
    .bind(MIN_SHARED_SKILLS)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let shared = row.shared_count as usize;
            let mut p = profile(
                row.user_id,
                row.username,
                row.full_name,
                row.profile_image_url,
                row.location,
                skill_overlap_score(shared, total as usize),
            );
            p.shared_skills = row.shared_names.unwrap_or_default();
            p.reasons.push(skill_reason(shared));
            p
        })
        .collect())
}

/// Users sharing any community with the user.
async fn community_signal(pool: &PgPool, user_id: Uuid, limit: usize) -> Result<Vec<SimilarityProfile>, KinshipError> {
    let rows = sqlx::query_as::<_, OverlapMatch>(&format!(
        "SELECT u.id AS user_id, u.username, up.full_name, up.profile_image_url, up.location,
                COUNT(DISTINCT cm2.community_id) AS shared_count,
                ARRAY_AGG(DISTINCT c.name::TEXT) AS shared_names
         FROM users u
         JOIN community_members cm2 ON cm2.user_id = u.id
         JOIN communities c ON c.id = cm2.community_id
         JOIN community_members cm1 ON cm1.community_id = cm2.community_id AND cm1.user_id = $1
         LEFT JOIN user_profiles up ON up.user_id = u.id
         WHERE u.id <> $1
           AND {}
         GROUP BY u.id, u.username, up.full_name, up.profile_image_url, up.location
         ORDER BY shared_count DESC, u.id
         LIMIT $2",
        VISIBLE_CANDIDATE
    ))
    .bind(user_id)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let shared = row.shared_count as usize;
            let mut p = profile(
                row.user_id,
                row.username,
                row.full_name,
                row.profile_image_url,
                row.location,
                community_overlap_score(shared),
            );
            p.shared_communities = row.shared_names.unwrap_or_default();
            p.reasons.push(community_reason(shared));
            p
        })
        .collect())
}

/// Rank users similar to `user_id`.
///
/// Only the embedding signal honours `min_similarity`; skill and community
/// matches are merged regardless and may rank below it.
pub async fn compute_similarities(
    kinship: &Kinship,
    user_id: Uuid,
    min_similarity: Option<f64>,
    limit: Option<usize>,
) -> Result<SimilarityReport, KinshipError> {
    let config = &kinship.config.similarity;
    let min_similarity = min_similarity.unwrap_or(config.default_min_similarity);
    if !(0.0..=1.0).contains(&min_similarity) {
        return Err(KinshipError::Validation(format!(
            "min_similarity must be within [0, 1], got {}",
            min_similarity
        )));
    }
    let limit = limit.unwrap_or(config.default_limit).clamp(1, config.max_limit);

    if directory::load_user(&kinship.pool, user_id).await?.is_none() {
        return Err(KinshipError::NotFound(format!("user {}", user_id)));
    }

    let pool = &kinship.pool;
    let (embedding, skills, communities) = futures::try_join!(
        embedding_signal(pool, user_id, min_similarity, limit),
        skill_signal(pool, user_id, limit),
        community_signal(pool, user_id, limit),
    )?;

    tracing::debug!(
        user_id = %user_id,
        embedding = embedding.len(),
        skills = skills.len(),
        communities = communities.len(),
        "Similarity signals loaded"
    );

    let mut merged = Vec::new();
    merge_signal(&mut merged, embedding);
    merge_signal(&mut merged, skills);
    merge_signal(&mut merged, communities);
    let (profiles, total) = finalize(merged, limit);

    Ok(SimilarityReport {
        query_user_id: user_id,
        profiles,
        total,
    })
}

/// Similarity view around `center`: the ranked profiles as a graph.
pub async fn similarity_graph(
    kinship: &Kinship,
    center: Uuid,
    min_similarity: f64,
    limit: Option<usize>,
) -> Result<KnowledgeGraph, KinshipError> {
    let report = compute_similarities(kinship, center, Some(min_similarity), limit).await?;
    let summary = directory::load_user(&kinship.pool, center).await?;
    Ok(build_similarity_graph(center, summary.as_ref(), &report.profiles))
}

#[derive(sqlx::FromRow)]
struct SkillHolder {
    user_id: Uuid,
    username: String,
    full_name: Option<String>,
    profile_image_url: Option<String>,
    location: Option<String>,
    proficiency_level: Option<String>,
    years_experience: Option<i32>,
}

/// Visible holders of a named skill (case-insensitive), strongest first.
pub async fn users_with_skill(
    kinship: &Kinship,
    skill_name: &str,
    limit: Option<usize>,
) -> Result<Vec<SimilarityProfile>, KinshipError> {
    let skill_name = skill_name.trim();
    if skill_name.is_empty() {
        return Err(KinshipError::Validation("skill name must not be empty".to_string()));
    }
    let config = &kinship.config.similarity;
    let limit = limit.unwrap_or(config.default_limit).clamp(1, config.max_limit);

    let rows = sqlx::query_as::<_, SkillHolder>(&format!(
        "SELECT u.id AS user_id, u.username, up.full_name, up.profile_image_url, up.location,
                us.proficiency_level, us.years_experience
         FROM users u
         JOIN user_skills us ON us.user_id = u.id
         JOIN skills s ON s.id = us.skill_id
         LEFT JOIN user_profiles up ON up.user_id = u.id
         WHERE LOWER(s.name) = LOWER($1)
           AND {}
         ORDER BY us.years_experience DESC NULLS LAST, us.proficiency_level DESC NULLS LAST, u.id
         LIMIT $2",
        VISIBLE_CANDIDATE
    ))
    .bind(skill_name)
    .bind(limit as i64)
    .fetch_all(&kinship.pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let level = row.proficiency_level.as_deref();
            let mut p = profile(
                row.user_id,
                row.username,
                row.full_name,
                row.profile_image_url,
                row.location,
                expertise_score(level, row.years_experience),
            );
            p.shared_skills.push(skill_name.to_string());
            p.reasons.push(expertise_reason(skill_name, level));
            p
        })
        .collect())
}
