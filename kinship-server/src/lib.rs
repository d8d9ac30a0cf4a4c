pub mod router;
pub mod state;
pub mod subsystems;

pub use state::Kinship;
