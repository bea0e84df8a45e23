pub mod not_found;
pub mod ping;
pub mod search;
pub mod shutdown;
pub mod stats;
