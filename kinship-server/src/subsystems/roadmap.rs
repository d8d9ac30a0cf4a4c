//! Skill roadmaps: what people who hold a skill tend to hold alongside it.

use kinship_core::assembly::build_skill_roadmap;
use kinship_core::models::SkillRoadmap;
use kinship_core::KinshipError;
use uuid::Uuid;

use super::{directory, similar};
use crate::state::Kinship;

/// Intermediate skills considered, and holders of the target listed.
const ROADMAP_BREADTH: usize = 10;

pub async fn skill_roadmap(kinship: &Kinship, user_id: Uuid, target_skill: &str) -> Result<SkillRoadmap, KinshipError> {
    let target_skill = target_skill.trim();
    if target_skill.is_empty() {
        return Err(KinshipError::Validation("skill name must not be empty".to_string()));
    }
    if directory::load_user(&kinship.pool, user_id).await?.is_none() {
        return Err(KinshipError::NotFound(format!("user {}", user_id)));
    }

    let current = directory::skills_by_user(&kinship.pool, &[user_id])
        .await?
        .remove(&user_id)
        .unwrap_or_default();
    let co_held = directory::co_held_skills(&kinship.pool, target_skill, ROADMAP_BREADTH).await?;
    let holders = similar::users_with_skill(kinship, target_skill, Some(ROADMAP_BREADTH)).await?;

    let roadmap = build_skill_roadmap(target_skill, &current, &co_held, holders);
    tracing::debug!(
        user_id = %user_id,
        target = target_skill,
        steps = roadmap.path.len(),
        holders = roadmap.profiles_with_skill.len(),
        "Skill roadmap built"
    );
    Ok(roadmap)
}
