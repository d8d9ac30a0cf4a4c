//! Connection lifecycle over the relational ledger.
//!
//! Every transition runs in one transaction that locks the affected row,
//! stages the matching `MirrorEvent` (outbox mode) and commits. Inline mode
//! pushes the event after commit. The mirror never decides whether a
//! transition succeeds.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use kinship_core::mirror::{read_or_empty, MirrorEvent};
use kinship_core::models::{Connection, ConnectionRow, ConnectionState, ConnectionStatus, Direction, NetworkStats, UserSummary};
use kinship_core::KinshipError;
use serde::Serialize;
use uuid::Uuid;

use super::{directory, sync};
use crate::state::Kinship;

const CONNECTION_COLUMNS: &str = "id, requester_id, addressee_id, status, message, requested_at, responded_at";

/// Upper bound for a single page of `list_connections`.
pub const MAX_PAGE_SIZE: i64 = 200;

// ============================================================================
// Transitions
// ============================================================================

/// Ask `addressee` to connect.
///
/// A declined row for the pair is revived in the new direction with fresh
/// timestamps. The row lock taken by `FOR UPDATE` serialises concurrent
/// revivals; the unordered-pair unique index serialises concurrent inserts.
pub async fn send_request(
    kinship: &Kinship,
    requester: Uuid,
    addressee: Uuid,
    message: Option<String>,
) -> Result<Connection, KinshipError> {
    if requester == addressee {
        return Err(KinshipError::Validation("cannot send a connection request to yourself".to_string()));
    }
    if !directory::is_active_user(&kinship.pool, addressee).await? {
        return Err(KinshipError::NotFound(format!("user {}", addressee)));
    }

    let mut tx = kinship.pool.begin().await?;

    let existing = sqlx::query_as::<_, ConnectionRow>(&format!(
        "SELECT {} FROM connections
         WHERE (requester_id = $1 AND addressee_id = $2) OR (requester_id = $2 AND addressee_id = $1)
         FOR UPDATE",
        CONNECTION_COLUMNS
    ))
    .bind(requester)
    .bind(addressee)
    .fetch_optional(&mut *tx)
    .await?;

    let row = match existing {
        Some(row) => {
            let current = Connection::try_from(row)?;
            match current.status {
                ConnectionStatus::Accepted => return Err(KinshipError::Conflict("already connected".to_string())),
                ConnectionStatus::Pending => return Err(KinshipError::Conflict("request already pending".to_string())),
                ConnectionStatus::Declined => {
                    sqlx::query_as::<_, ConnectionRow>(&format!(
                        "UPDATE connections
                         SET requester_id = $2, addressee_id = $3, status = 'pending', message = $4,
                             requested_at = NOW(), responded_at = NULL
                         WHERE id = $1
                         RETURNING {}",
                        CONNECTION_COLUMNS
                    ))
                    .bind(current.id)
                    .bind(requester)
                    .bind(addressee)
                    .bind(&message)
                    .fetch_one(&mut *tx)
                    .await?
                }
            }
        }
        None => sqlx::query_as::<_, ConnectionRow>(&format!(
            "INSERT INTO connections (requester_id, addressee_id, status, message)
             VALUES ($1, $2, 'pending', $3)
             ON CONFLICT DO NOTHING
             RETURNING {}",
            CONNECTION_COLUMNS
        ))
        .bind(requester)
        .bind(addressee)
        .bind(&message)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| KinshipError::Conflict("request already pending".to_string()))?,
    };

    let connection = Connection::try_from(row)?;
    let events = [MirrorEvent::RequestCreated {
        requester_id: requester,
        addressee_id: addressee,
        message,
    }];
    sync::stage(&mut tx, &kinship.config.sync, &events).await?;
    tx.commit().await?;
    sync::publish(kinship, &events).await;

    tracing::info!(
        connection_id = %connection.id,
        requester = %requester,
        addressee = %addressee,
        "Connection request sent"
    );
    Ok(connection)
}

pub async fn accept(kinship: &Kinship, connection_id: Uuid, actor: Uuid) -> Result<Connection, KinshipError> {
    respond(kinship, connection_id, actor, ConnectionStatus::Accepted).await
}

pub async fn decline(kinship: &Kinship, connection_id: Uuid, actor: Uuid) -> Result<Connection, KinshipError> {
    respond(kinship, connection_id, actor, ConnectionStatus::Declined).await
}

/// Settle a pending request. Only the addressee may respond.
async fn respond(
    kinship: &Kinship,
    connection_id: Uuid,
    actor: Uuid,
    outcome: ConnectionStatus,
) -> Result<Connection, KinshipError> {
    let mut tx = kinship.pool.begin().await?;

    let pending = lock_with_status(&mut tx, connection_id, ConnectionStatus::Pending)
        .await?
        .ok_or_else(|| KinshipError::NotFound(format!("pending connection request {}", connection_id)))?;

    if pending.addressee_id != actor {
        return Err(KinshipError::Authorization(
            "only the addressee can respond to a connection request".to_string(),
        ));
    }

    let row = sqlx::query_as::<_, ConnectionRow>(&format!(
        "UPDATE connections SET status = $2, responded_at = NOW() WHERE id = $1 RETURNING {}",
        CONNECTION_COLUMNS
    ))
    .bind(connection_id)
    .bind(outcome.as_str())
    .fetch_one(&mut *tx)
    .await?;
    let connection = Connection::try_from(row)?;

    let event = match outcome {
        ConnectionStatus::Accepted => MirrorEvent::RequestAccepted {
            requester_id: connection.requester_id,
            addressee_id: connection.addressee_id,
        },
        _ => MirrorEvent::RequestDeclined {
            requester_id: connection.requester_id,
            addressee_id: connection.addressee_id,
        },
    };
    let events = [event];
    sync::stage(&mut tx, &kinship.config.sync, &events).await?;
    tx.commit().await?;
    sync::publish(kinship, &events).await;

    tracing::info!(connection_id = %connection_id, status = %outcome, "Connection request answered");
    Ok(connection)
}

/// Delete an accepted connection. Either participant may remove it.
pub async fn remove(kinship: &Kinship, connection_id: Uuid, actor: Uuid) -> Result<Connection, KinshipError> {
    let mut tx = kinship.pool.begin().await?;

    let accepted = lock_with_status(&mut tx, connection_id, ConnectionStatus::Accepted)
        .await?
        .ok_or_else(|| KinshipError::NotFound(format!("connection {}", connection_id)))?;

    if !accepted.involves(actor) {
        return Err(KinshipError::Authorization(
            "only a participant can remove a connection".to_string(),
        ));
    }

    sqlx::query("DELETE FROM connections WHERE id = $1")
        .bind(connection_id)
        .execute(&mut *tx)
        .await?;

    let events = [MirrorEvent::ConnectionRemoved {
        user_a: accepted.requester_id,
        user_b: accepted.addressee_id,
    }];
    sync::stage(&mut tx, &kinship.config.sync, &events).await?;
    tx.commit().await?;
    sync::publish(kinship, &events).await;

    tracing::info!(connection_id = %connection_id, removed_by = %actor, "Connection removed");
    Ok(accepted)
}

async fn lock_with_status(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    connection_id: Uuid,
    status: ConnectionStatus,
) -> Result<Option<Connection>, KinshipError> {
    let row = sqlx::query_as::<_, ConnectionRow>(&format!(
        "SELECT {} FROM connections WHERE id = $1 AND status = $2 FOR UPDATE",
        CONNECTION_COLUMNS
    ))
    .bind(connection_id)
    .bind(status.as_str())
    .fetch_optional(&mut **tx)
    .await?;
    row.map(Connection::try_from).transpose()
}

// ============================================================================
// Queries
// ============================================================================

pub async fn connection_status(kinship: &Kinship, user_id: Uuid, other_id: Uuid) -> Result<ConnectionState, KinshipError> {
    let row = sqlx::query_as::<_, ConnectionRow>(&format!(
        "SELECT {} FROM connections
         WHERE (requester_id = $1 AND addressee_id = $2) OR (requester_id = $2 AND addressee_id = $1)",
        CONNECTION_COLUMNS
    ))
    .bind(user_id)
    .bind(other_id)
    .fetch_optional(&kinship.pool)
    .await?;

    let Some(row) = row else {
        return Ok(ConnectionState::none());
    };
    let connection = Connection::try_from(row)?;
    Ok(ConnectionState {
        status: connection.status.as_str().to_string(),
        connection_id: Some(connection.id),
        direction: Some(if connection.requester_id == user_id {
            Direction::Sent
        } else {
            Direction::Received
        }),
        requested_at: Some(connection.requested_at),
        responded_at: connection.responded_at,
    })
}

/// One row of a user's connection list, seen from that user.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionEntry {
    pub connection_id: Uuid,
    pub user: UserSummary,
    pub status: ConnectionStatus,
    pub message: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionPage {
    pub connections: Vec<ConnectionEntry>,
    pub total: i64,
}

/// Page through a user's connections with `status` (default accepted),
/// most recently answered first.
pub async fn list_connections(
    kinship: &Kinship,
    user_id: Uuid,
    status: Option<ConnectionStatus>,
    limit: i64,
    offset: i64,
) -> Result<ConnectionPage, KinshipError> {
    let status = status.unwrap_or(ConnectionStatus::Accepted);
    let limit = limit.clamp(1, MAX_PAGE_SIZE);
    let offset = offset.max(0);

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM connections
         WHERE (requester_id = $1 OR addressee_id = $1) AND status = $2",
    )
    .bind(user_id)
    .bind(status.as_str())
    .fetch_one(&kinship.pool)
    .await?;

    let rows = sqlx::query_as::<_, ConnectionRow>(&format!(
        "SELECT {} FROM connections
         WHERE (requester_id = $1 OR addressee_id = $1) AND status = $2
         ORDER BY responded_at DESC NULLS FIRST, requested_at DESC
         LIMIT $3 OFFSET $4",
        CONNECTION_COLUMNS
    ))
    .bind(user_id)
    .bind(status.as_str())
    .bind(limit)
    .bind(offset)
    .fetch_all(&kinship.pool)
    .await?;

    let connections = rows
        .into_iter()
        .map(Connection::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    let entries = entries_for(kinship, user_id, connections).await?;

    Ok(ConnectionPage {
        connections: entries,
        total,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingRequests {
    pub received: Vec<ConnectionEntry>,
    pub sent: Vec<ConnectionEntry>,
}

/// Pending requests in both directions, newest first.
pub async fn pending_requests(kinship: &Kinship, user_id: Uuid) -> Result<PendingRequests, KinshipError> {
    let rows = sqlx::query_as::<_, ConnectionRow>(&format!(
        "SELECT {} FROM connections
         WHERE (requester_id = $1 OR addressee_id = $1) AND status = 'pending'
         ORDER BY requested_at DESC",
        CONNECTION_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(&kinship.pool)
    .await?;

    let connections = rows
        .into_iter()
        .map(Connection::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    let (sent, received): (Vec<_>, Vec<_>) = connections.into_iter().partition(|c| c.requester_id == user_id);

    Ok(PendingRequests {
        received: entries_for(kinship, user_id, received).await?,
        sent: entries_for(kinship, user_id, sent).await?,
    })
}

async fn entries_for(
    kinship: &Kinship,
    user_id: Uuid,
    connections: Vec<Connection>,
) -> Result<Vec<ConnectionEntry>, KinshipError> {
    let others: Vec<Uuid> = connections.iter().map(|c| c.other_party(user_id)).collect();
    let mut users = directory::load_users(&kinship.pool, &others).await?;

    Ok(connections
        .into_iter()
        .filter_map(|c| {
            let user = users.remove(&c.other_party(user_id))?;
            Some(ConnectionEntry {
                connection_id: c.id,
                user,
                status: c.status,
                message: c.message,
                requested_at: c.requested_at,
                connected_at: c.responded_at,
            })
        })
        .collect())
}

/// Users connected to both `user_id` and `other_id`, by id.
///
/// Served by the mirror; the ledger answers when the mirror cannot.
pub async fn mutual_connections(
    kinship: &Kinship,
    user_id: Uuid,
    other_id: Uuid,
    limit: usize,
) -> Result<Vec<UserSummary>, KinshipError> {
    let mirror = kinship.mirror.as_ref();
    let read = read_or_empty(
        mirror,
        "mutual_connections",
        mirror.mutual_connections(user_id, other_id, limit),
    )
    .await;

    let ids = if read.available {
        read.value
    } else {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT other FROM (
                 SELECT CASE WHEN requester_id = $1 THEN addressee_id ELSE requester_id END AS other
                 FROM connections
                 WHERE status = 'accepted' AND (requester_id = $1 OR addressee_id = $1)
                 INTERSECT
                 SELECT CASE WHEN requester_id = $2 THEN addressee_id ELSE requester_id END AS other
                 FROM connections
                 WHERE status = 'accepted' AND (requester_id = $2 OR addressee_id = $2)
             ) mutual
             ORDER BY other
             LIMIT $3",
        )
        .bind(user_id)
        .bind(other_id)
        .bind(limit as i64)
        .fetch_all(&kinship.pool)
        .await?;
        ids
    };

    let mut users: HashMap<Uuid, UserSummary> = directory::load_users(&kinship.pool, &ids).await?;
    Ok(ids.iter().filter_map(|id| users.remove(id)).collect())
}

/// Counts from the ledger: accepted connections and requests awaiting the
/// user's answer.
pub async fn network_stats(kinship: &Kinship, user_id: Uuid) -> Result<NetworkStats, KinshipError> {
    let (total_connections, pending_requests): (i64, i64) = sqlx::query_as(
        "SELECT
             COUNT(*) FILTER (WHERE status = 'accepted' AND (requester_id = $1 OR addressee_id = $1)),
             COUNT(*) FILTER (WHERE status = 'pending' AND addressee_id = $1)
         FROM connections
         WHERE requester_id = $1 OR addressee_id = $1",
    )
    .bind(user_id)
    .fetch_one(&kinship.pool)
    .await?;

    Ok(NetworkStats {
        total_connections,
        pending_requests,
    })
}
