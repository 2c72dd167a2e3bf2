//! Query planning and execution
//!
//! A [`SearchRequest`](crate::models::SearchRequest) carries one query string
//! per field. Each string is parsed with a Lucene-style grammar:
//!
//! - terms and `"quoted phrases"`
//! - prefixes (`get_*`) and wildcards (`f?o*`)
//! - `AND`, `OR`, `NOT`, `+`, `-` and parentheses; juxtaposition means AND
//! - `field:value` qualifiers (`defs:main`) inside any field's text
//!
//! The parsed fields are lowered into a tree of [`QueryNode`]s, combined with
//! AND, planned once against corpus statistics of all queried projects and
//! executed per segment.

pub mod ast;
pub mod builder;
pub mod context;
pub mod executor;
pub mod nodes;
pub mod planner;
pub mod query_string;
pub mod scoring;
pub mod snippet;

#[cfg(test)]
pub(crate) mod testutil;

pub use ast::{MatchNoneQuery, QueryNode};
pub use builder::QueryBuilder;
pub use context::QueryContext;
pub use executor::{QueryExecutor, SearchTarget};
pub use nodes::{AllDocsQuery, BoolQuery, PhraseQuery, PrefixQuery, TermQuery, WildcardQuery};
pub use planner::{QueryPlan, QueryPlanner};
pub use query_string::{parse_query, ParsedQuery};
pub use scoring::{CorpusStats, Scorer};
