use thiserror::Error;

#[derive(Error, Debug)]
pub enum KinshipError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl KinshipError {
    /// Stable machine-readable kind. The first four are caller errors; the
    /// rest collapse to `internal`.
    pub fn kind(&self) -> &'static str {
        match self {
            KinshipError::NotFound(_) => "not_found",
            KinshipError::Validation(_) => "validation",
            KinshipError::Conflict(_) => "conflict",
            KinshipError::Authorization(_) => "authorization",
            _ => "internal",
        }
    }

    pub fn is_caller_error(&self) -> bool {
        self.kind() != "internal"
    }
}

/// Failures talking to the graph-query store. Never surfaced to callers of
/// read operations; see `mirror::read_or_empty`.
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Graph store unavailable: {0}")]
    Unavailable(String),

    #[error("Graph store query failed: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Graph store returned malformed data: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_for_caller_errors() {
        assert_eq!(KinshipError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(KinshipError::Validation("x".into()).kind(), "validation");
        assert_eq!(KinshipError::Conflict("x".into()).kind(), "conflict");
        assert_eq!(KinshipError::Authorization("x".into()).kind(), "authorization");
        assert!(KinshipError::Conflict("x".into()).is_caller_error());
    }

    #[test]
    fn test_kind_for_internal_errors() {
        let err = KinshipError::from(serde_json::from_str::<u32>("nope").unwrap_err());
        assert_eq!(err.kind(), "internal");
        assert!(!err.is_caller_error());

        let err = KinshipError::from(config::ConfigError::Message("bad".into()));
        assert_eq!(err.kind(), "internal");
    }
}
