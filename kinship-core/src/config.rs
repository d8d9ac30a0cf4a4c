use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Clone)]
pub struct KinshipConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub graph_store: GraphStoreConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub assembly: AssemblyConfig,
    #[serde(default)]
    pub pathfinding: PathfindingConfig,
    #[serde(default)]
    pub similarity: SimilarityConfig,
    #[serde(default)]
    pub clustering: ClusteringConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GraphBackend {
    Neo4j,
    Memory,
    Disabled,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphStoreConfig {
    pub backend: GraphBackend,
    pub uri: String,
    pub user: String,
    pub password: String,
    pub max_connections: usize,
}

impl Default for GraphStoreConfig {
    fn default() -> Self {
        Self {
            backend: GraphBackend::Disabled,
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: String::new(),
            max_connections: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Push to the mirror right after the ledger commit, in the same request.
    Inline,
    /// Record the event in `mirror_outbox` inside the ledger transaction and
    /// let the relay apply it.
    Outbox,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    pub mode: SyncMode,
    pub relay_interval_seconds: u64,
    pub batch_size: i64,
    pub max_attempts: i32,
    pub retry_base_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::Outbox,
            relay_interval_seconds: 5,
            batch_size: 100,
            max_attempts: 8,
            retry_base_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssemblyConfig {
    pub default_depth: u32,
    pub default_limit: usize,
    pub max_limit: usize,
    pub relational_fallback: bool,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            default_depth: 2,
            default_limit: 100,
            max_limit: 500,
            relational_fallback: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PathStrategy {
    /// Unweighted BFS; every edge class costs one hop.
    #[default]
    Hops,
    /// Dijkstra over per-edge-class costs.
    Weighted,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathfindingConfig {
    pub default_max_depth: u32,
    pub max_depth: u32,
    pub strategy: PathStrategy,
    pub connection_cost: f64,
    pub shared_skill_cost: f64,
    pub shared_community_cost: f64,
    pub include_shared_communities: bool,
}

impl Default for PathfindingConfig {
    fn default() -> Self {
        Self {
            default_max_depth: 5,
            max_depth: 10,
            strategy: PathStrategy::Hops,
            connection_cost: 1.0,
            shared_skill_cost: 2.5,
            shared_community_cost: 3.0,
            include_shared_communities: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SimilarityConfig {
    pub default_min_similarity: f64,
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            default_min_similarity: 0.6,
            default_limit: 20,
            max_limit: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClusterKeySelection {
    /// Smallest skill name wins; stable across runs.
    #[default]
    Lexicographic,
    /// First skill in the order the store returned it.
    FirstListed,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClusteringConfig {
    pub min_cluster_size: usize,
    pub key_selection: ClusterKeySelection,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: 3,
            key_selection: ClusterKeySelection::Lexicographic,
        }
    }
}

impl KinshipConfig {
    /// Load from a TOML file, then apply `KINSHIP__SECTION__KEY` overrides.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("KINSHIP").separator("__"))
            .build()?;
        let config: Self = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse an in-memory TOML document. No environment overrides.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        let config: Self = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the services would otherwise clamp into a panic or
    /// feed to the weighted search as negative costs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(msg: String) -> Result<(), ConfigError> {
            Err(ConfigError::Message(msg))
        }

        if self.sync.relay_interval_seconds == 0 {
            return invalid("sync.relay_interval_seconds must be at least 1".into());
        }
        if self.sync.batch_size < 1 || self.sync.max_attempts < 1 {
            return invalid("sync.batch_size and sync.max_attempts must be at least 1".into());
        }

        let a = &self.assembly;
        if a.max_limit == 0 {
            return invalid("assembly.max_limit must be at least 1".into());
        }
        if a.default_limit > a.max_limit {
            return invalid(format!(
                "assembly.default_limit ({}) exceeds assembly.max_limit ({})",
                a.default_limit, a.max_limit
            ));
        }

        let p = &self.pathfinding;
        if p.max_depth == 0 {
            return invalid("pathfinding.max_depth must be at least 1".into());
        }
        if p.default_max_depth > p.max_depth {
            return invalid(format!(
                "pathfinding.default_max_depth ({}) exceeds pathfinding.max_depth ({})",
                p.default_max_depth, p.max_depth
            ));
        }
        for (name, cost) in [
            ("connection_cost", p.connection_cost),
            ("shared_skill_cost", p.shared_skill_cost),
            ("shared_community_cost", p.shared_community_cost),
        ] {
            if !cost.is_finite() || cost < 0.0 {
                return invalid(format!("pathfinding.{} must be a finite, non-negative number", name));
            }
        }

        let sim = &self.similarity;
        if sim.max_limit == 0 {
            return invalid("similarity.max_limit must be at least 1".into());
        }
        if sim.default_limit > sim.max_limit {
            return invalid(format!(
                "similarity.default_limit ({}) exceeds similarity.max_limit ({})",
                sim.default_limit, sim.max_limit
            ));
        }
        if !(0.0..=1.0).contains(&sim.default_min_similarity) {
            return invalid(format!(
                "similarity.default_min_similarity ({}) must be within [0, 1]",
                sim.default_min_similarity
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = KinshipConfig::from_toml_str(
            r#"
            [database]
            url = "postgresql://localhost/kinship"
            max_connections = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.graph_store.backend, GraphBackend::Disabled);
        assert_eq!(config.sync.mode, SyncMode::Outbox);
        assert_eq!(config.assembly.default_limit, 100);
        assert!(config.assembly.relational_fallback);
        assert_eq!(config.pathfinding.strategy, PathStrategy::Hops);
        assert!((config.similarity.default_min_similarity - 0.6).abs() < 1e-9);
        assert_eq!(config.clustering.min_cluster_size, 3);
        assert_eq!(config.clustering.key_selection, ClusterKeySelection::Lexicographic);
    }

    #[test]
    fn test_enum_sections_parse_snake_case() {
        let config = KinshipConfig::from_toml_str(
            r#"
            [database]
            url = "postgresql://localhost/kinship"
            max_connections = 5

            [graph_store]
            backend = "memory"
            uri = "bolt://graph:7687"
            user = "neo4j"
            password = "secret"
            max_connections = 4

            [sync]
            mode = "inline"
            relay_interval_seconds = 1
            batch_size = 10
            max_attempts = 3
            retry_base_ms = 5

            [pathfinding]
            default_max_depth = 4
            max_depth = 6
            strategy = "weighted"
            connection_cost = 1.0
            shared_skill_cost = 2.0
            shared_community_cost = 2.0
            include_shared_communities = true

            [clustering]
            min_cluster_size = 2
            key_selection = "first_listed"
            "#,
        )
        .unwrap();

        assert_eq!(config.graph_store.backend, GraphBackend::Memory);
        assert_eq!(config.sync.mode, SyncMode::Inline);
        assert_eq!(config.pathfinding.strategy, PathStrategy::Weighted);
        assert!(config.pathfinding.include_shared_communities);
        assert_eq!(config.clustering.key_selection, ClusterKeySelection::FirstListed);
    }

    const DB: &str = "[database]\nurl = \"postgresql://localhost/kinship\"\nmax_connections = 5\n";

    fn rejects(extra: &str) -> String {
        match KinshipConfig::from_toml_str(&format!("{}{}", DB, extra)) {
            Ok(_) => panic!("config accepted:\n{}", extra),
            Err(e) => e.to_string(),
        }
    }

    #[test]
    fn test_validate_rejects_zero_max_limits() {
        let err = rejects("[assembly]\ndefault_depth = 2\ndefault_limit = 0\nmax_limit = 0\nrelational_fallback = true\n");
        assert!(err.contains("assembly.max_limit"), "{}", err);

        let err = rejects("[similarity]\ndefault_min_similarity = 0.5\ndefault_limit = 0\nmax_limit = 0\n");
        assert!(err.contains("similarity.max_limit"), "{}", err);
    }

    #[test]
    fn test_validate_rejects_defaults_above_max() {
        let err = rejects("[assembly]\ndefault_depth = 2\ndefault_limit = 600\nmax_limit = 500\nrelational_fallback = true\n");
        assert!(err.contains("assembly.default_limit"), "{}", err);

        let err = rejects("[similarity]\ndefault_min_similarity = 0.5\ndefault_limit = 30\nmax_limit = 10\n");
        assert!(err.contains("similarity.default_limit"), "{}", err);
    }

    #[test]
    fn test_validate_rejects_bad_path_settings() {
        let paths = |default_max_depth: u32, max_depth: u32, skill_cost: &str| -> String {
            format!(
                "[pathfinding]\ndefault_max_depth = {}\nmax_depth = {}\nstrategy = \"weighted\"\n\
                 connection_cost = 1.0\nshared_skill_cost = {}\nshared_community_cost = 3.0\n\
                 include_shared_communities = false\n",
                default_max_depth, max_depth, skill_cost
            )
        };
        assert!(rejects(&paths(6, 5, "2.5")).contains("default_max_depth"));
        assert!(rejects(&paths(0, 0, "2.5")).contains("pathfinding.max_depth"));
        assert!(rejects(&paths(5, 10, "-1.0")).contains("shared_skill_cost"));

        let mut config = KinshipConfig::from_toml_str(DB).unwrap();
        config.pathfinding.connection_cost = f64::NAN;
        assert!(config.validate().is_err());
        config.pathfinding.connection_cost = f64::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_min_similarity_out_of_range() {
        for value in ["1.5", "-0.1"] {
            let err = rejects(&format!(
                "[similarity]\ndefault_min_similarity = {}\ndefault_limit = 20\nmax_limit = 100\n",
                value
            ));
            assert!(err.contains("default_min_similarity"), "{}", err);
        }
    }

    #[test]
    fn test_validate_accepts_defaults() {
        let config = KinshipConfig::from_toml_str(DB).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_database_section_fails() {
        assert!(KinshipConfig::from_toml_str("[service]\nlog_level = \"debug\"\n").is_err());
    }
}
