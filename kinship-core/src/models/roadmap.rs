use serde::{Deserialize, Serialize};

use super::graph::KnowledgeGraph;
use super::similarity::SimilarityProfile;

/// A skill held alongside the roadmap target, with how many target holders
/// also hold it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SkillFrequency {
    pub name: String,
    pub frequency: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadmapStep {
    pub id: String,
    pub name: String,
    pub is_current: bool,
    pub is_target: bool,
    /// Set for intermediate skills only.
    pub frequency: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillRoadmap {
    pub target_skill: String,
    pub current_skills: Vec<String>,
    /// Current skills, then intermediates by frequency, then the target.
    pub path: Vec<RoadmapStep>,
    pub graph: KnowledgeGraph,
    pub profiles_with_skill: Vec<SimilarityProfile>,
}
