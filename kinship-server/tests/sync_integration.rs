mod common;

use std::sync::Arc;

use kinship_core::config::SyncMode;
use kinship_core::mirror::{DisabledMirror, GraphMirror, MemoryMirror};
use kinship_core::models::ConnectionStatus;
use kinship_server::subsystems::{connections, sync};
use kinship_server::Kinship;
use sqlx::PgPool;
use uuid::Uuid;

use common::{connect, make_state, make_user};

async fn outbox_rows_for(pool: &PgPool, requester: Uuid) -> Vec<(String, Option<chrono::DateTime<chrono::Utc>>)> {
    sqlx::query_as(
        "SELECT event->>'event', processed_at
         FROM mirror_outbox
         WHERE event->>'requester_id' = $1
         ORDER BY seq",
    )
    .bind(requester.to_string())
    .fetch_all(pool)
    .await
    .unwrap()
}

/// Tick until a pass applies nothing new.
async fn drain(kinship: &Kinship, mirror: &dyn GraphMirror) -> sync::RelayReport {
    let mut total = sync::RelayReport::default();
    for _ in 0..20 {
        let report = sync::run_relay_tick(&kinship.pool, mirror, &kinship.config.sync).await.unwrap();
        total.applied += report.applied;
        total.failed += report.failed;
        total.deferred += report.deferred;
        if report.applied == 0 {
            break;
        }
    }
    total
}

// ========================================================================
// TEST 1: outbox rows are written with the ledger and relayed later,
//         surviving a mirror outage
// ========================================================================
#[tokio::test]
async fn test_outbox_relay_applies_in_order() {
    let (mut kinship, mirror) = match make_state(SyncMode::Outbox).await {
        Some(s) => s,
        None => {
            eprintln!("Skipping test_outbox_relay_applies_in_order: DB unavailable");
            return;
        }
    };
    kinship.config.sync.batch_size = 1000;
    let a = make_user(&kinship.pool, "Ada", None).await;
    let b = make_user(&kinship.pool, "Brook", None).await;

    connect(&kinship, a, b).await;

    // Nothing reaches the mirror on the write path
    assert!(mirror.edge(a, b).await.is_none());
    let rows = outbox_rows_for(&kinship.pool, a).await;
    let names: Vec<&str> = rows.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["request_created", "request_accepted"]);
    assert!(rows.iter().all(|(_, processed)| processed.is_none()));

    // Store down: the tick pauses without charging attempts
    mirror.set_available(false);
    let report = sync::run_relay_tick(&kinship.pool, mirror.as_ref(), &kinship.config.sync).await.unwrap();
    assert_eq!(report.applied, 0);
    let attempts: Vec<i32> = sqlx::query_scalar(
        "SELECT attempts FROM mirror_outbox WHERE event->>'requester_id' = $1",
    )
    .bind(a.to_string())
    .fetch_all(&kinship.pool)
    .await
    .unwrap();
    assert!(attempts.iter().all(|n| *n == 0));

    // Store back: both events land, in commit order
    mirror.set_available(true);
    let report = drain(&kinship, mirror.as_ref()).await;
    assert!(report.applied >= 2);
    let edge = mirror.edge(a, b).await.expect("edge relayed");
    assert_eq!(edge.status, ConnectionStatus::Accepted);
    let rows = outbox_rows_for(&kinship.pool, a).await;
    assert!(rows.iter().all(|(_, processed)| processed.is_some()));

    // Removal flows the same way
    let connection_id: Uuid = sqlx::query_scalar("SELECT id FROM connections WHERE requester_id = $1")
        .bind(a)
        .fetch_one(&kinship.pool)
        .await
        .unwrap();
    connections::remove(&kinship, connection_id, b).await.unwrap();
    drain(&kinship, mirror.as_ref()).await;
    assert!(mirror.edge(a, b).await.is_none());
}

// ========================================================================
// TEST 2: a dead mirror never blocks ledger writes in inline mode
// ========================================================================
#[tokio::test]
async fn test_inline_writes_survive_disabled_mirror() {
    let (kinship, _mirror) = match make_state(SyncMode::Inline).await {
        Some(s) => s,
        None => {
            eprintln!("Skipping test_inline_writes_survive_disabled_mirror: DB unavailable");
            return;
        }
    };
    let kinship = Kinship::new(kinship.pool.clone(), Arc::new(DisabledMirror), kinship.config.clone());
    let a = make_user(&kinship.pool, "Ada", None).await;
    let b = make_user(&kinship.pool, "Brook", None).await;

    let accepted = connect(&kinship, a, b).await;
    assert_eq!(accepted.status, ConnectionStatus::Accepted);

    let state = connections::connection_status(&kinship, b, a).await.unwrap();
    assert_eq!(state.status, "accepted");
    let mutual = connections::mutual_connections(&kinship, a, b, 10).await.unwrap();
    assert!(mutual.is_empty());
}

// ========================================================================
// TEST 3: backfill rebuilds an empty mirror from the ledger
// ========================================================================
#[tokio::test]
async fn test_backfill_rebuilds_mirror() {
    let (kinship, _mirror) = match make_state(SyncMode::Inline).await {
        Some(s) => s,
        None => {
            eprintln!("Skipping test_backfill_rebuilds_mirror: DB unavailable");
            return;
        }
    };
    let a = make_user(&kinship.pool, "Ada", Some(true)).await;
    let b = make_user(&kinship.pool, "Brook", None).await;
    let c = make_user(&kinship.pool, "Cy", None).await;
    connect(&kinship, a, b).await;
    let pending = connections::send_request(&kinship, c, a, None).await.unwrap();
    connections::decline(&kinship, pending.id, a).await.unwrap();

    let fresh = MemoryMirror::new();
    let report = sync::backfill_mirror(&kinship.pool, &fresh).await.unwrap();
    assert_eq!(report.failed, 0);
    assert!(report.users >= 3);
    assert!(report.connections >= 2);

    assert_eq!(fresh.edge(a, b).await.map(|e| e.status), Some(ConnectionStatus::Accepted));
    assert_eq!(fresh.edge(a, c).await.map(|e| e.status), Some(ConnectionStatus::Declined));
    let visible = fresh.visible_users(b, usize::MAX).await.unwrap();
    assert!(visible.contains(&a));
    assert!(!visible.contains(&c));
}

// ========================================================================
// TEST 4: an unavailable store pauses the tick without backoff or
//         charging attempts
// ========================================================================
#[tokio::test]
async fn test_unavailable_store_pauses_tick_immediately() {
    let (kinship, mirror) = match make_state(SyncMode::Outbox).await {
        Some(s) => s,
        None => {
            eprintln!("Skipping test_unavailable_store_pauses_tick_immediately: DB unavailable");
            return;
        }
    };
    let a = make_user(&kinship.pool, "Ada", None).await;
    let b = make_user(&kinship.pool, "Brook", None).await;
    connections::send_request(&kinship, a, b, None).await.unwrap();

    mirror.set_available(false);
    let mut slow = kinship.config.sync.clone();
    slow.retry_base_ms = 2_000;

    let started = std::time::Instant::now();
    let report = sync::run_relay_tick(&kinship.pool, mirror.as_ref(), &slow).await.unwrap();
    assert!(started.elapsed() < std::time::Duration::from_millis(1_500));
    assert_eq!(report.applied, 0);
    assert!(report.deferred >= 1);

    let attempts: Vec<i32> = sqlx::query_scalar(
        "SELECT attempts FROM mirror_outbox WHERE event->>'requester_id' = $1",
    )
    .bind(a.to_string())
    .fetch_all(&kinship.pool)
    .await
    .unwrap();
    assert!(!attempts.is_empty());
    assert!(attempts.iter().all(|n| *n == 0));
}
