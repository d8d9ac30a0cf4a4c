use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SkillRecord {
    pub id: Uuid,
    pub name: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CommunityRecord {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub category: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventRecord {
    pub id: Uuid,
    pub name: String,
    pub event_type: Option<String>,
    pub start_datetime: Option<DateTime<Utc>>,
    pub location_city: Option<String>,
    pub image_url: Option<String>,
}

/// One-hop affiliations of a single user, in store order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Affiliations {
    pub skills: Vec<SkillRecord>,
    pub communities: Vec<CommunityRecord>,
    pub events: Vec<EventRecord>,
}
