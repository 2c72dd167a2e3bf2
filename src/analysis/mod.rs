//! Per-language analyzers
//!
//! Every analyzer turns a file's text into a lazy, finite token stream with
//! byte offsets and a symbol classification. Streams are restartable: calling
//! [`Analyzer::tokenize`] again yields the same sequence from the start.
//!
//! # Families
//!
//! - `CLikeAnalyzer`: brace languages (C, C++, Java, Rust, Go, JS/TS, C#)
//! - `ScriptAnalyzer`: `#`-comment scripting languages (Python, Ruby, shell, Perl, Lua, Tcl)
//! - `MarkupAnalyzer`: tag based documents (HTML, XML)
//! - `PlainAnalyzer`: Unicode word segmentation, also the fallback for malformed input
//!
//! [`AnalyzerSet::select`] picks one from the path and a content sniff.

pub mod detect;
mod c_like;
mod markup;
mod plain;
mod prose;
mod scanner;
mod script;

pub use c_like::CLikeAnalyzer;
pub use detect::{detect_language, is_binary, Family, Language};
pub use markup::MarkupAnalyzer;
pub use plain::{words, PlainAnalyzer};
pub use prose::ProseAnalyzer;
pub use script::ScriptAnalyzer;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AnalyzerConfig;

/// Lexical class of a token
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    Word,
    SymbolDefinition,
    SymbolReference,
    Comment,
    StringLiteral,
    Whitespace,
}

impl TokenKind {
    pub fn is_symbol(&self) -> bool {
        matches!(self, TokenKind::SymbolDefinition | TokenKind::SymbolReference)
    }
}

/// A token borrowed from the analyzed text
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    /// Byte offset of the first byte
    pub start: usize,
    /// Byte offset one past the last byte
    pub end: usize,
    pub kind: TokenKind,
    /// Name of the enclosing definition, for symbol tokens
    pub scope: Option<&'a str>,
}

impl<'a> Token<'a> {
    pub fn new(text: &'a str, start: usize, kind: TokenKind) -> Self {
        Self {
            text,
            start,
            end: start + text.len(),
            kind,
            scope: None,
        }
    }
}

/// Role of a symbol occurrence
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SymbolRole {
    Definition,
    Reference,
}

/// Context an analyzer needs to classify one identifier
#[derive(Clone, Debug, Default)]
pub struct SymbolSite<'a> {
    pub name: &'a str,
    /// Previous identifier or keyword on the same statement
    pub previous: Option<&'a str>,
    /// Next significant punctuation character, if the next token is punctuation
    pub next: Option<char>,
    /// First significant character after the parenthesised list that follows the name
    pub after_parens: Option<char>,
    /// The identifier is inside a function body
    pub in_function: bool,
    /// The identifier is the first significant token on its line
    pub line_start: bool,
    /// First identifier of the unbroken type-shaped run this identifier ends,
    /// e.g. `static` in `static long total`
    pub declaration_head: Option<&'a str>,
}

/// Failure while tokenizing malformed input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("unterminated {what} starting at byte {offset}")]
    Unterminated { what: &'static str, offset: usize },

    #[error("nesting deeper than {limit} at byte {offset}")]
    TooDeep { limit: usize, offset: usize },
}

/// Lazy token stream produced by an analyzer
pub type TokenStream<'a> = Box<dyn Iterator<Item = Result<Token<'a>, AnalysisError>> + 'a>;

/// Capability set shared by all analyzers
pub trait Analyzer: Send + Sync {
    /// Stable identifier stored with each document
    fn id(&self) -> &'static str;

    /// Bumped whenever tokenization output changes
    fn version(&self) -> u32;

    /// Tokenize `text` from the beginning
    fn tokenize<'a>(&'a self, text: &'a str) -> TokenStream<'a>;

    /// Decide whether an identifier is a definition, a reference, or plain text
    fn classify_symbol(&self, site: &SymbolSite<'_>) -> Option<SymbolRole>;
}

/// The analyzers available to the document builder
pub struct AnalyzerSet {
    c_like: CLikeAnalyzer,
    script: ScriptAnalyzer,
    markup: MarkupAnalyzer,
    plain: PlainAnalyzer,
    prose: ProseAnalyzer,
    config: AnalyzerConfig,
}

impl AnalyzerSet {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            c_like: CLikeAnalyzer::new(),
            script: ScriptAnalyzer::new(),
            markup: MarkupAnalyzer::new(),
            plain: PlainAnalyzer::new(),
            prose: ProseAnalyzer::new(&config.prose),
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Pick the language and analyzer for a file
    ///
    /// Pure function of the path and the leading bytes of the content.
    pub fn select(&self, path: &str, head: &[u8]) -> (Language, &dyn Analyzer) {
        let language = detect_language(path, head);
        (language, self.for_family(language.family()))
    }

    pub fn for_family(&self, family: Family) -> &dyn Analyzer {
        match family {
            Family::CLike => &self.c_like,
            Family::Script => &self.script,
            Family::Markup => &self.markup,
            Family::Plain | Family::Binary => &self.plain,
        }
    }

    /// Analyzer used when a language analyzer rejects its input
    pub fn fallback(&self) -> &dyn Analyzer {
        &self.plain
    }

    pub fn prose(&self) -> &ProseAnalyzer {
        &self.prose
    }
}

impl Default for AnalyzerSet {
    fn default() -> Self {
        Self::new(&AnalyzerConfig::default())
    }
}
