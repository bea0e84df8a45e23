pub mod config;
pub mod daemon_state;
pub mod embedding;
pub mod embedding_cache;
pub mod status;
