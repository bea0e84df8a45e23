pub mod chunk;
pub mod document;
pub mod search_result;

pub use chunk::Chunk;
pub use document::Document;
pub use search_result::{IndexStats, SearchResult};
