use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::KinshipError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Pending,
    Accepted,
    Declined,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Pending => "pending",
            ConnectionStatus::Accepted => "accepted",
            ConnectionStatus::Declined => "declined",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionStatus {
    type Err = KinshipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ConnectionStatus::Pending),
            "accepted" => Ok(ConnectionStatus::Accepted),
            "declined" => Ok(ConnectionStatus::Declined),
            other => Err(KinshipError::Validation(format!(
                "unknown connection status '{}'",
                other
            ))),
        }
    }
}

/// A row of the `connections` ledger as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConnectionRow {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub addressee_id: Uuid,
    pub status: String,
    pub message: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub addressee_id: Uuid,
    pub status: ConnectionStatus,
    pub message: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl Connection {
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.requester_id == user_id || self.addressee_id == user_id
    }

    /// The participant that is not `user_id`.
    pub fn other_party(&self, user_id: Uuid) -> Uuid {
        if self.requester_id == user_id {
            self.addressee_id
        } else {
            self.requester_id
        }
    }
}

impl TryFrom<ConnectionRow> for Connection {
    type Error = KinshipError;

    fn try_from(row: ConnectionRow) -> Result<Self, Self::Error> {
        Ok(Connection {
            id: row.id,
            requester_id: row.requester_id,
            addressee_id: row.addressee_id,
            status: row.status.parse()?,
            message: row.message,
            requested_at: row.requested_at,
            responded_at: row.responded_at,
        })
    }
}

/// An accepted connection, directed as it was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AcceptedEdge {
    pub requester_id: Uuid,
    pub addressee_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Sent,
    Received,
}

/// Relationship state between a caller and one other user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionState {
    /// `none` when no row exists for the pair.
    pub status: String,
    pub connection_id: Option<Uuid>,
    pub direction: Option<Direction>,
    pub requested_at: Option<DateTime<Utc>>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl ConnectionState {
    pub fn none() -> Self {
        Self {
            status: "none".to_string(),
            connection_id: None,
            direction: None,
            requested_at: None,
            responded_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkStats {
    pub total_connections: i64,
    pub pending_requests: i64,
}
