//! Graph mirror sync: staging ledger transitions and relaying them to the
//! graph store.
//!
//! Two modes, chosen by `sync.mode`:
//! - `outbox` (default): events are written to `mirror_outbox` inside the
//!   same transaction as the ledger change. `run_relay_loop` applies them
//!   later with retry, so a slow or absent graph store never touches the
//!   write path.
//! - `inline`: events are applied right after commit; failures are logged
//!   and dropped.
//!
//! Events for the same pair are applied in commit order. When one fails the
//! rest of that pair waits for the next tick.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use kinship_core::config::{SyncConfig, SyncMode};
use kinship_core::error::MirrorError;
use kinship_core::mirror::{apply_best_effort, GraphMirror, MirrorEvent};
use kinship_core::KinshipError;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use uuid::Uuid;

use crate::state::Kinship;

/// In-tick retries per event before the row is left for a later tick.
const APPLY_RETRIES: usize = 3;

// ============================================================================
// Write path
// ============================================================================

/// Stage events inside the ledger transaction. No-op in inline mode.
pub async fn stage(
    tx: &mut Transaction<'_, Postgres>,
    config: &SyncConfig,
    events: &[MirrorEvent],
) -> Result<(), KinshipError> {
    if config.mode != SyncMode::Outbox {
        return Ok(());
    }
    for event in events {
        sqlx::query("INSERT INTO mirror_outbox (event) VALUES ($1)")
            .bind(serde_json::to_value(event)?)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

/// Apply events after the ledger commit. No-op in outbox mode.
pub async fn publish(kinship: &Kinship, events: &[MirrorEvent]) {
    if kinship.config.sync.mode != SyncMode::Inline {
        return;
    }
    for event in events {
        apply_best_effort(kinship.mirror.as_ref(), event).await;
    }
}

/// Re-project one user's profile into the mirror.
pub async fn sync_user(kinship: &Kinship, user_id: Uuid) -> Result<(), KinshipError> {
    let event = user_event(&kinship.pool, user_id)
        .await?
        .ok_or_else(|| KinshipError::NotFound(format!("user {}", user_id)))?;

    let mut tx = kinship.pool.begin().await?;
    stage(&mut tx, &kinship.config.sync, std::slice::from_ref(&event)).await?;
    tx.commit().await?;
    publish(kinship, std::slice::from_ref(&event)).await;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    full_name: Option<String>,
    profile_image_url: Option<String>,
    location: Option<String>,
    show_in_graph: bool,
}

impl From<UserRow> for MirrorEvent {
    fn from(row: UserRow) -> Self {
        MirrorEvent::UpsertUser {
            user_id: row.id,
            username: row.username,
            full_name: row.full_name,
            profile_image_url: row.profile_image_url,
            location: row.location,
            show_in_graph: row.show_in_graph,
        }
    }
}

const USER_ROW_SELECT: &str = "SELECT u.id, u.username, up.full_name, up.profile_image_url, up.location,
            COALESCE(up.show_in_graph, FALSE) AS show_in_graph
     FROM users u
     LEFT JOIN user_profiles up ON up.user_id = u.id";

async fn user_event(pool: &PgPool, user_id: Uuid) -> Result<Option<MirrorEvent>, KinshipError> {
    let row = sqlx::query_as::<_, UserRow>(&format!("{} WHERE u.id = $1 AND u.is_active = TRUE", USER_ROW_SELECT))
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(MirrorEvent::from))
}

// ============================================================================
// Outbox relay
// ============================================================================

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayReport {
    pub applied: usize,
    pub failed: usize,
    /// Rows held back because an earlier event for the same pair failed.
    pub deferred: usize,
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: Uuid,
    event: serde_json::Value,
}

/// A store that is down is not retried within a tick; the tick pauses and
/// the claimed rows are released.
fn is_retryable(error: &MirrorError) -> bool {
    !matches!(error, MirrorError::Unavailable(_))
}

/// Drain one batch of pending outbox rows.
///
/// Rows are claimed with `FOR UPDATE SKIP LOCKED`, so concurrent relays never
/// apply the same row twice. An unreachable store ends the tick without
/// charging an attempt; other failures count toward `max_attempts`.
pub async fn run_relay_tick(pool: &PgPool, mirror: &dyn GraphMirror, config: &SyncConfig) -> Result<RelayReport> {
    let mut tx = pool.begin().await?;
    let rows = sqlx::query_as::<_, OutboxRow>(
        "SELECT id, event
         FROM mirror_outbox
         WHERE processed_at IS NULL AND attempts < $1
         ORDER BY seq
         LIMIT $2
         FOR UPDATE SKIP LOCKED",
    )
    .bind(config.max_attempts)
    .bind(config.batch_size)
    .fetch_all(&mut *tx)
    .await?;

    let mut report = RelayReport::default();
    let mut blocked: HashSet<(Uuid, Uuid)> = HashSet::new();

    for row in rows {
        let event: MirrorEvent = match serde_json::from_value(row.event) {
            Ok(e) => e,
            Err(e) => {
                tracing::error!(outbox_id = %row.id, error = %e, "Undecodable outbox event, parking row");
                sqlx::query("UPDATE mirror_outbox SET attempts = $2, last_error = $3 WHERE id = $1")
                    .bind(row.id)
                    .bind(config.max_attempts)
                    .bind(e.to_string())
                    .execute(&mut *tx)
                    .await?;
                report.failed += 1;
                continue;
            }
        };

        if let Some(pair) = event.pair() {
            if blocked.contains(&pair) {
                report.deferred += 1;
                continue;
            }
        }

        let strategy = ExponentialBackoff::from_millis(config.retry_base_ms)
            .max_delay(Duration::from_secs(2))
            .map(jitter)
            .take(APPLY_RETRIES);

        match RetryIf::spawn(strategy, || mirror.apply(&event), is_retryable).await {
            Ok(()) => {
                sqlx::query(
                    "UPDATE mirror_outbox
                     SET processed_at = NOW(), attempts = attempts + 1, last_error = NULL
                     WHERE id = $1",
                )
                .bind(row.id)
                .execute(&mut *tx)
                .await?;
                report.applied += 1;
            }
            Err(MirrorError::Unavailable(reason)) => {
                tracing::warn!(backend = mirror.name(), reason = %reason, "Graph store unavailable, relay paused");
                report.deferred += 1;
                break;
            }
            Err(e) => {
                tracing::warn!(outbox_id = %row.id, event = event.name(), error = %e, "Mirror apply failed");
                sqlx::query("UPDATE mirror_outbox SET attempts = attempts + 1, last_error = $2 WHERE id = $1")
                    .bind(row.id)
                    .bind(e.to_string())
                    .execute(&mut *tx)
                    .await?;
                if let Some(pair) = event.pair() {
                    blocked.insert(pair);
                }
                report.failed += 1;
            }
        }
    }

    tx.commit().await?;
    Ok(report)
}

/// Run the outbox relay until shutdown. Returns immediately in inline mode.
pub async fn run_relay_loop(
    pool: PgPool,
    mirror: Arc<dyn GraphMirror>,
    config: SyncConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    if config.mode != SyncMode::Outbox {
        tracing::info!("Mirror relay not started: inline sync mode");
        return;
    }

    let mut ticker = interval(Duration::from_secs(config.relay_interval_seconds.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_s = config.relay_interval_seconds,
        batch_size = config.batch_size,
        backend = mirror.name(),
        "Mirror relay started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match run_relay_tick(&pool, mirror.as_ref(), &config).await {
                    Ok(report) => {
                        if report.applied > 0 || report.failed > 0 {
                            tracing::info!(
                                applied = report.applied,
                                failed = report.failed,
                                deferred = report.deferred,
                                "Mirror relay tick complete"
                            );
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Mirror relay tick failed"),
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Mirror relay shutting down");
                break;
            }
        }
    }
}

// ============================================================================
// Backfill
// ============================================================================

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackfillReport {
    pub users: usize,
    pub connections: usize,
    pub failed: usize,
}

#[derive(sqlx::FromRow)]
struct LedgerRow {
    requester_id: Uuid,
    addressee_id: Uuid,
    status: String,
    message: Option<String>,
}

/// Replay every active user and connection row straight into the mirror.
/// Safe to repeat: every mirror write is keyed by identity.
pub async fn backfill_mirror(pool: &PgPool, mirror: &dyn GraphMirror) -> Result<BackfillReport> {
    let mut report = BackfillReport::default();

    let users = sqlx::query_as::<_, UserRow>(&format!(
        "{} WHERE u.is_active = TRUE ORDER BY u.created_at, u.id",
        USER_ROW_SELECT
    ))
    .fetch_all(pool)
    .await?;
    for user in users {
        if apply_best_effort(mirror, &MirrorEvent::from(user)).await {
            report.users += 1;
        } else {
            report.failed += 1;
        }
    }

    let rows = sqlx::query_as::<_, LedgerRow>(
        "SELECT requester_id, addressee_id, status, message
         FROM connections
         ORDER BY requested_at, id",
    )
    .fetch_all(pool)
    .await?;
    for row in rows {
        let created = MirrorEvent::RequestCreated {
            requester_id: row.requester_id,
            addressee_id: row.addressee_id,
            message: row.message,
        };
        let settled = match row.status.as_str() {
            "accepted" => Some(MirrorEvent::RequestAccepted {
                requester_id: row.requester_id,
                addressee_id: row.addressee_id,
            }),
            "declined" => Some(MirrorEvent::RequestDeclined {
                requester_id: row.requester_id,
                addressee_id: row.addressee_id,
            }),
            _ => None,
        };

        let mut ok = apply_best_effort(mirror, &created).await;
        if let Some(event) = settled {
            ok = ok && apply_best_effort(mirror, &event).await;
        }
        if ok {
            report.connections += 1;
        } else {
            report.failed += 1;
        }
    }

    tracing::info!(
        users = report.users,
        connections = report.connections,
        failed = report.failed,
        "Mirror backfill complete"
    );
    Ok(report)
}
