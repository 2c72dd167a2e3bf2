//! Data types shared by indexing, querying and the HTTP layer

pub mod document;
pub mod search;

pub use document::{line_offsets, Document, Field, FileMeta, SymbolEntry};
pub use search::{LineSnippet, ProjectFailure, SearchHit, SearchRequest, SearchResults};
