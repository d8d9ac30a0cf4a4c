pub mod assemble;
pub mod cluster;
pub mod community;
pub mod connections;
pub mod directory;
pub mod paths;
pub mod roadmap;
pub mod similar;
pub mod sync;
