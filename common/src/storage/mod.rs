pub mod snapshot;
pub mod sync;
pub mod types;
