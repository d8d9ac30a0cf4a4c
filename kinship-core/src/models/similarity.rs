use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A candidate user scored against the query user. Computed per query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityProfile {
    pub user_id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub location: Option<String>,
    /// Always within [0, 1].
    pub similarity_score: f64,
    pub shared_skills: Vec<String>,
    pub shared_communities: Vec<String>,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityReport {
    pub query_user_id: Uuid,
    pub profiles: Vec<SimilarityProfile>,
    /// Distinct candidates before truncation to the limit.
    pub total: usize,
}
