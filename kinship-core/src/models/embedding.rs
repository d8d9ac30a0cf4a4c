use chrono::{DateTime, Utc};
use pgvector::Vector;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Precomputed profile vector. Generation happens upstream; the graph
/// subsystems only compare them.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProfileEmbedding {
    pub user_id: Uuid,
    pub embedding: Option<Vector>,
    pub updated_at: DateTime<Utc>,
}
