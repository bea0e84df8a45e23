#![allow(clippy::missing_docs_in_private_items)]

pub mod config;
pub mod engine;
pub mod hybrid;
pub mod keyword;
pub mod query_cache;
pub mod scoring;
pub mod vector;

pub use config::RetrievalTuning;
pub use engine::SearchEngine;
pub use query_cache::{normalize_query, QueryCache};
