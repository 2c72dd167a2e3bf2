pub mod analysis;
pub mod api;
pub mod cancel;
pub mod catalog;
pub mod config;
pub mod document;
pub mod error;
pub mod metrics;
pub mod models;
pub mod query;
pub mod scheduler;
pub mod segment;
pub mod suggest;
pub mod testing;

pub use analysis::AnalyzerSet;
pub use cancel::CancelToken;
pub use catalog::Catalog;
pub use config::{CatalogConfig, IndexSettings, IndexingProfile, Similarity};
pub use error::{Result, SourcedexError};
pub use models::*;
pub use query::{QueryExecutor, SearchTarget};
pub use scheduler::{IndexScheduler, IndexingReport};
pub use segment::{Generation, ProjectIndex};
pub use suggest::{SuggestRequest, SuggestResponse, Suggester};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
