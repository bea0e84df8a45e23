#![allow(clippy::missing_docs_in_private_items)]

pub mod chunker;
pub mod pipeline;
pub mod source;

pub use chunker::{chunk_document, ChunkerConfig};
pub use pipeline::{BuildReport, IndexBuilder};
pub use source::{DocumentSource, JsonFileSource};
