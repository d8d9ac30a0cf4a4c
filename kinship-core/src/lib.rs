pub mod assembly;
pub mod clustering;
pub mod config;
pub mod db;
pub mod error;
pub mod mirror;
pub mod models;
pub mod ops;
pub mod pathfinding;
pub mod scoring;

pub use config::KinshipConfig;
pub use error::{KinshipError, MirrorError};
pub use mirror::{create_mirror, GraphMirror, MirrorEvent};
pub use ops::{KinshipRequest, KinshipResponse};
