//! Document builder
//!
//! Turns one file's bytes into an index-ready [`BuiltDocument`]: the
//! [`Document`] record, field postings with positions, the symbol table and
//! any warnings raised along the way. Building is a pure function of its
//! inputs and performs no I/O, so identical bytes analyzed by the same
//! analyzer version always produce identical output.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{trace, warn};

use crate::analysis::{
    words, Analyzer, AnalyzerSet, Language, SymbolRole, Token, TokenKind,
};
use crate::config::AnalyzerConfig;
use crate::models::{line_offsets, Document, Field, FileMeta, SymbolEntry};

/// Postings of one document keyed by field and term, positions ascending
pub type FieldPostings = BTreeMap<(Field, String), Vec<u32>>;

/// Gap left between consecutive history messages in `hist` positions
const HISTORY_POSITION_GAP: u32 = 2;

/// Output of [`DocumentBuilder::build`]
#[derive(Clone, Debug, PartialEq)]
pub struct BuiltDocument {
    pub document: Document,
    pub postings: FieldPostings,
    pub symbols: Vec<SymbolEntry>,
    pub warnings: Vec<String>,
}

impl BuiltDocument {
    /// Number of content postings, excluding `path` and `type`
    pub fn content_posting_count(&self) -> usize {
        self.postings
            .keys()
            .filter(|(field, _)| !matches!(field, Field::Path | Field::Type))
            .count()
    }
}

pub struct DocumentBuilder {
    analyzers: Arc<AnalyzerSet>,
}

impl DocumentBuilder {
    pub fn new(analyzers: Arc<AnalyzerSet>) -> Self {
        Self { analyzers }
    }

    pub fn analyzers(&self) -> &AnalyzerSet {
        &self.analyzers
    }

    /// Build the index representation of one file
    ///
    /// Never fails: malformed content degrades to plain-text tokenization and
    /// undecodable or binary content to a metadata-only document.
    pub fn build(
        &self,
        project: &str,
        path: &str,
        bytes: &[u8],
        meta: FileMeta,
        history: &[String],
    ) -> BuiltDocument {
        let config = self.analyzers.config();
        let head = &bytes[..bytes.len().min(config.sniff_bytes)];
        let (language, analyzer) = self.analyzers.select(path, head);

        let mut document = Document {
            project: project.to_string(),
            path: path.to_string(),
            content_hash: content_hash(bytes),
            mtime_ms: meta.mtime_ms,
            size: meta.size,
            language,
            analyzer: analyzer.id().to_string(),
            analyzer_version: analyzer.version(),
            line_offsets: vec![0],
            line_first_token: Vec::new(),
            token_count: 0,
            metadata_only: false,
        };
        let mut warnings = Vec::new();
        let mut fields = FieldAccumulator::new(config);
        let mut symbols = Vec::new();

        match decode_content(language, bytes, config, &mut warnings) {
            Some(text) => {
                document.line_offsets = line_offsets(text);
                let tokens = match run_analyzer(analyzer, text) {
                    Ok(tokens) => tokens,
                    Err(reason) => {
                        warn!(project, path, analyzer = analyzer.id(), %reason, "analyzer failed, indexing as plain text");
                        warnings.push(format!(
                            "{} analyzer failed: {}; indexed as plain text",
                            analyzer.id(),
                            reason
                        ));
                        run_analyzer(self.analyzers.fallback(), text).unwrap_or_default()
                    }
                };
                let mut lines = LineTable::new(&document.line_offsets);
                for token in &tokens {
                    index_token(token, &document, &mut fields, &mut lines, &mut symbols);
                }
                document.line_first_token = lines.finish(fields.full_count());
                document.token_count = fields.full_count();
            }
            None => {
                document.metadata_only = true;
                document.line_first_token = vec![0];
            }
        }

        for term in path_terms(path) {
            fields.push(Field::Path, term);
        }
        fields.push(Field::Type, language.id().to_string());
        index_history(history, &self.analyzers, &mut fields);

        trace!(
            project,
            path,
            language = language.id(),
            tokens = document.token_count,
            symbols = symbols.len(),
            "document built"
        );

        BuiltDocument {
            document,
            postings: fields.into_postings(),
            symbols,
            warnings,
        }
    }
}

/// Hex SHA-256 of file content
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Lower-cased path components as indexed in the `path` field
pub fn path_terms(path: &str) -> Vec<String> {
    path.split(|c: char| c == '/' || c == '.' || c == '\\')
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn decode_content<'b>(
    language: Language,
    bytes: &'b [u8],
    config: &AnalyzerConfig,
    warnings: &mut Vec<String>,
) -> Option<&'b str> {
    if language == Language::Binary {
        return None;
    }
    if bytes.len() as u64 > config.max_file_bytes {
        warnings.push(format!(
            "file is larger than {} bytes; indexed by name only",
            config.max_file_bytes
        ));
        return None;
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => Some(text),
        Err(e) => {
            warnings.push(format!("content is not valid UTF-8 ({}); indexed by name only", e));
            None
        }
    }
}

/// Collect a full token stream, turning errors and panics into a reason
fn run_analyzer<'a>(analyzer: &'a dyn Analyzer, text: &'a str) -> Result<Vec<Token<'a>>, String> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        analyzer.tokenize(text).collect::<Result<Vec<_>, _>>()
    }));
    match outcome {
        Ok(Ok(tokens)) => Ok(tokens),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic".to_string())),
    }
}

fn index_token(
    token: &Token<'_>,
    document: &Document,
    fields: &mut FieldAccumulator<'_>,
    lines: &mut LineTable<'_>,
    symbols: &mut Vec<SymbolEntry>,
) {
    match token.kind {
        TokenKind::Whitespace => {}
        TokenKind::Word => fields.push_full(token.text, token.start, lines),
        TokenKind::Comment | TokenKind::StringLiteral => {
            for (offset, word) in words(token.text) {
                fields.push_full(word, token.start + offset, lines);
            }
        }
        TokenKind::SymbolDefinition | TokenKind::SymbolReference => {
            fields.push_full(token.text, token.start, lines);
            let (field, role) = if token.kind == TokenKind::SymbolDefinition {
                (Field::Defs, SymbolRole::Definition)
            } else {
                (Field::Refs, SymbolRole::Reference)
            };
            if fields.accepts(token.text) {
                fields.push(field, token.text.to_string());
                symbols.push(SymbolEntry {
                    name: token.text.to_string(),
                    line: document.line_of_offset(token.start),
                    role,
                    scope: token.scope.map(str::to_string),
                });
            }
        }
    }
}

fn index_history(history: &[String], analyzers: &AnalyzerSet, fields: &mut FieldAccumulator<'_>) {
    let mut base = 0u32;
    for message in history {
        let mut last = None;
        for (term, position) in analyzers.prose().terms_with_positions(message) {
            fields.push_at(Field::Hist, term, base + position);
            last = Some(base + position);
        }
        if let Some(last) = last {
            base = last + HISTORY_POSITION_GAP;
        }
    }
}

/// Per-field postings with running positions
struct FieldAccumulator<'c> {
    config: &'c AnalyzerConfig,
    postings: FieldPostings,
    next_position: BTreeMap<Field, u32>,
}

impl<'c> FieldAccumulator<'c> {
    fn new(config: &'c AnalyzerConfig) -> Self {
        Self {
            config,
            postings: BTreeMap::new(),
            next_position: BTreeMap::new(),
        }
    }

    fn accepts(&self, text: &str) -> bool {
        let len = text.chars().count();
        len >= self.config.min_token_length && len <= self.config.max_token_length
    }

    fn full_count(&self) -> u32 {
        self.next_position.get(&Field::Full).copied().unwrap_or(0)
    }

    fn push(&mut self, field: Field, term: String) {
        let position = self.next_position.get(&field).copied().unwrap_or(0);
        self.push_at(field, term, position);
    }

    fn push_at(&mut self, field: Field, term: String, position: u32) {
        if term.is_empty() {
            return;
        }
        let positions = self.postings.entry((field, term)).or_default();
        if positions.last().map_or(true, |&last| last < position) {
            positions.push(position);
        }
        let next = self.next_position.entry(field).or_insert(0);
        *next = (*next).max(position + 1);
    }

    fn push_full(&mut self, text: &str, offset: usize, lines: &mut LineTable<'_>) {
        if !self.accepts(text) {
            return;
        }
        let ordinal = self.full_count();
        lines.advance(offset, ordinal);
        self.push(Field::Full, text.to_lowercase());
    }

    fn into_postings(self) -> FieldPostings {
        self.postings
    }
}

/// Builds the first-token ordinal of each line while tokens stream by
struct LineTable<'d> {
    line_offsets: &'d [u32],
    first_token: Vec<u32>,
}

impl<'d> LineTable<'d> {
    fn new(line_offsets: &'d [u32]) -> Self {
        Self {
            line_offsets,
            first_token: Vec::with_capacity(line_offsets.len()),
        }
    }

    /// Record that the token with `ordinal` starts at byte `offset`
    fn advance(&mut self, offset: usize, ordinal: u32) {
        while let Some(&start) = self.line_offsets.get(self.first_token.len()) {
            if start as usize > offset {
                break;
            }
            self.first_token.push(ordinal);
        }
    }

    fn finish(mut self, total: u32) -> Vec<u32> {
        self.first_token.resize(self.line_offsets.len(), total);
        self.first_token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> DocumentBuilder {
        DocumentBuilder::new(Arc::new(AnalyzerSet::default()))
    }

    fn meta(bytes: &[u8]) -> FileMeta {
        FileMeta {
            size: bytes.len() as u64,
            mtime_ms: 1_700_000_000_000,
        }
    }

    fn build(path: &str, text: &[u8]) -> BuiltDocument {
        builder().build("demo", path, text, meta(text), &[])
    }

    fn has(built: &BuiltDocument, field: Field, term: &str) -> bool {
        built.postings.contains_key(&(field, term.to_string()))
    }

    #[test]
    fn test_definition_and_reference_postings() {
        let text = b"int foo(void) {\n  return bar();\n}\n";
        let built = build("src/a.c", text);

        assert!(has(&built, Field::Defs, "foo"));
        assert!(has(&built, Field::Refs, "bar"));
        assert!(has(&built, Field::Full, "return"));
        assert!(has(&built, Field::Path, "src"));
        assert!(has(&built, Field::Path, "a"));
        assert!(has(&built, Field::Path, "c"));
        assert!(has(&built, Field::Type, "c"));

        assert_eq!(
            built.symbols,
            vec![
                SymbolEntry {
                    name: "foo".to_string(),
                    line: 1,
                    role: SymbolRole::Definition,
                    scope: None,
                },
                SymbolEntry {
                    name: "bar".to_string(),
                    line: 2,
                    role: SymbolRole::Reference,
                    scope: Some("foo".to_string()),
                },
            ]
        );
        assert!(built.warnings.is_empty());
        assert_eq!(built.document.line_count(), 3);
    }

    #[test]
    fn test_symbol_case_kept_full_case_folded() {
        let built = build("Main.java", b"class HttpServer {}\n");
        assert!(has(&built, Field::Defs, "HttpServer"));
        assert!(has(&built, Field::Full, "httpserver"));
        assert!(!has(&built, Field::Full, "HttpServer"));
    }

    #[test]
    fn test_positions_strictly_increase() {
        let built = build("x.c", b"int x = x + x; /* x */\n");
        let positions = &built.postings[&(Field::Full, "x".to_string())];
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(positions.len(), 4);
    }

    #[test]
    fn test_empty_file_has_no_content_postings() {
        let built = build("empty.c", b"");
        assert_eq!(built.content_posting_count(), 0);
        assert!(has(&built, Field::Path, "empty"));
        assert!(!built.document.metadata_only);
        assert_eq!(built.document.token_count, 0);
        assert!(built.symbols.is_empty());
    }

    #[test]
    fn test_binary_is_metadata_only() {
        let built = build("lib/blob.bin", &[0x7f, b'E', b'L', b'F', 0, 0, 1]);
        assert!(built.document.metadata_only);
        assert_eq!(built.document.language, Language::Binary);
        assert_eq!(built.content_posting_count(), 0);
        assert!(has(&built, Field::Path, "blob"));
        assert!(has(&built, Field::Type, "binary"));
    }

    #[test]
    fn test_invalid_utf8_is_metadata_only_with_warning() {
        let built = build("latin1.txt", b"caf\xe9 au lait");
        assert!(built.document.metadata_only);
        assert_eq!(built.warnings.len(), 1);
        assert!(has(&built, Field::Path, "latin1"));
    }

    #[test]
    fn test_malformed_file_falls_back_to_plain_text() {
        let built = build("broken.c", b"int ok;\n/* never closed\nfoo bar\n");
        assert_eq!(built.warnings.len(), 1);
        assert!(built.warnings[0].contains("c-like"));
        assert!(!built.document.metadata_only);
        assert!(has(&built, Field::Full, "foo"));
        assert!(has(&built, Field::Path, "broken"));
        assert!(built.symbols.is_empty());
    }

    #[test]
    fn test_plain_text_indexes_dotted_parts() {
        let built = build("notes.txt", b"call config.load here\n");
        assert!(has(&built, Field::Full, "config"));
        assert!(has(&built, Field::Full, "load"));
        assert!(!has(&built, Field::Full, "config.load"));

        let fallback = build("broken.c", b"/* open\nuse Config.Load now\n");
        assert_eq!(fallback.warnings.len(), 1);
        assert!(has(&fallback, Field::Full, "config"));
        assert!(has(&fallback, Field::Full, "load"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let text = b"fn main() {\n    let v = compute(1, 2);\n    println!(\"{}\", v);\n}\n";
        let first = build("src/main.rs", text);
        let second = build("src/main.rs", text);
        assert_eq!(first, second);
        assert_eq!(
            bincode::serialize(&first.postings).unwrap(),
            bincode::serialize(&second.postings).unwrap()
        );
    }

    #[test]
    fn test_positions_map_back_to_lines() {
        let built = build("notes.txt", b"alpha beta\n\ngamma\n");
        let gamma = built.postings[&(Field::Full, "gamma".to_string())][0];
        assert_eq!(built.document.line_of_position(gamma), 3);
        let beta = built.postings[&(Field::Full, "beta".to_string())][0];
        assert_eq!(built.document.line_of_position(beta), 1);
    }

    #[test]
    fn test_history_terms_are_stemmed() {
        let history = vec!["Fixed crashes in the parser".to_string()];
        let built = builder().build("demo", "a.py", b"x = 1\n", meta(b"x = 1\n"), &history);
        assert!(has(&built, Field::Hist, "crash"));
        assert!(has(&built, Field::Hist, "parser"));
        assert!(!has(&built, Field::Hist, "the"));
    }

    #[test]
    fn test_content_hash() {
        assert_eq!(
            content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
