//! Process-wide service container.
//!
//! Built once by the binary (or a test) and passed by reference to every
//! subsystem. Cloning is cheap: the pool and mirror are shared handles.

use std::sync::Arc;

use kinship_core::mirror::{create_mirror, GraphMirror};
use kinship_core::{KinshipConfig, KinshipError};
use sqlx::PgPool;

#[derive(Clone)]
pub struct Kinship {
    pub pool: PgPool,
    pub mirror: Arc<dyn GraphMirror>,
    pub config: KinshipConfig,
}

impl Kinship {
    pub fn new(pool: PgPool, mirror: Arc<dyn GraphMirror>, config: KinshipConfig) -> Self {
        Self {
            pool,
            mirror,
            config,
        }
    }

    /// Open the pool and the configured graph mirror. Only the relational
    /// store is required; mirror failures degrade to a disabled mirror.
    pub async fn connect(config: KinshipConfig) -> Result<Self, KinshipError> {
        config.validate()?;
        let pool = kinship_core::db::create_pool(&config.database).await?;
        let mirror = create_mirror(&config.graph_store).await;
        tracing::info!(mirror = mirror.name(), sync = ?config.sync.mode, "Kinship service ready");
        Ok(Self::new(pool, mirror, config))
    }
}
