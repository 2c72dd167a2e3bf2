//! Lucene-style query string parser
//!
//! Supports syntax like:
//! - `open AND NOT close`
//! - `"socket timeout"`
//! - `get*`, `f?o*`
//! - `defs:main OR refs:(start stop)`
//! - `+required -excluded`
//!
//! Errors are [`SourcedexError::QueryParse`](crate::SourcedexError::QueryParse)
//! with the byte offset of the offending token.

pub mod lexer;
pub mod parser;

pub use lexer::{Lexer, Spanned, Token};
pub use parser::{parse_query, unescape, ParsedQuery, QueryStringParser};
