//! Shared lexer and symbol classifier for the code analyzers.
//!
//! `Scanner` splits text into raw lexemes driven by a per-family [`Syntax`].
//! `SymbolStream` layers scope tracking and a bounded lookahead on top of it
//! and asks the owning analyzer to classify each identifier.

use std::collections::VecDeque;

use super::{AnalysisError, Analyzer, SymbolRole, SymbolSite, Token, TokenKind};

/// Lookahead cap when searching for the end of a parameter list
const LOOKAHEAD_LIMIT: usize = 4096;

/// Maximum brace nesting accepted before the input is rejected
const MAX_DEPTH: usize = 512;

/// A string delimiter pair
pub(crate) struct StringDelim {
    pub open: &'static str,
    pub close: &'static str,
    pub multiline: bool,
    pub escapes: bool,
    /// Treat the opener as punctuation when no close follows within this many chars
    pub max_len: Option<usize>,
}

/// Comment and string syntax of a language family
pub(crate) struct Syntax {
    pub line_comments: &'static [&'static str],
    pub block_comments: &'static [(&'static str, &'static str)],
    pub strings: &'static [StringDelim],
    pub ident_extra: &'static [char],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Lexeme {
    Space,
    Comment,
    Str,
    Ident,
    Number,
    Punct(char),
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Raw<'a> {
    pub kind: Lexeme,
    pub text: &'a str,
    pub start: usize,
}

pub(crate) struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    syntax: &'static Syntax,
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a str, syntax: &'static Syntax) -> Self {
        Self { src, pos: 0, syntax }
    }

    fn is_ident_start(&self, c: char) -> bool {
        c.is_alphabetic() || c == '_' || self.syntax.ident_extra.contains(&c)
    }

    fn is_ident_char(&self, c: char) -> bool {
        c.is_alphanumeric() || c == '_' || self.syntax.ident_extra.contains(&c)
    }

    fn scan_while(&self, from: usize, pred: impl Fn(char) -> bool) -> usize {
        self.src[from..]
            .char_indices()
            .find(|&(_, c)| !pred(c))
            .map(|(i, _)| from + i)
            .unwrap_or(self.src.len())
    }

    fn emit(&mut self, kind: Lexeme, end: usize) -> Raw<'a> {
        let raw = Raw {
            kind,
            text: &self.src[self.pos..end],
            start: self.pos,
        };
        self.pos = end;
        raw
    }

    fn scan_string(&self, delim: &StringDelim) -> Result<Option<usize>, AnalysisError> {
        let body_start = self.pos + delim.open.len();
        let rest = &self.src[body_start..];
        let mut chars = rest.char_indices();
        let mut count = 0usize;
        while let Some((i, c)) = chars.next() {
            count += 1;
            if let Some(limit) = delim.max_len {
                if count > limit {
                    return Ok(None);
                }
            }
            if delim.escapes && c == '\\' {
                chars.next();
                continue;
            }
            if rest[i..].starts_with(delim.close) {
                return Ok(Some(body_start + i + delim.close.len()));
            }
            if c == '\n' && !delim.multiline {
                if delim.max_len.is_some() {
                    return Ok(None);
                }
                return Ok(Some(body_start + i));
            }
        }
        if delim.multiline {
            Err(AnalysisError::Unterminated {
                what: "string literal",
                offset: self.pos,
            })
        } else if delim.max_len.is_some() {
            Ok(None)
        } else {
            Ok(Some(self.src.len()))
        }
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Result<Raw<'a>, AnalysisError>;

    fn next(&mut self) -> Option<Self::Item> {
        let src = self.src;
        let rest = &src[self.pos..];
        let c = rest.chars().next()?;

        if c.is_whitespace() {
            let end = self.scan_while(self.pos, char::is_whitespace);
            return Some(Ok(self.emit(Lexeme::Space, end)));
        }

        for (open, close) in self.syntax.block_comments {
            if rest.starts_with(open) {
                return match rest[open.len()..].find(close) {
                    Some(i) => {
                        let end = self.pos + open.len() + i + close.len();
                        Some(Ok(self.emit(Lexeme::Comment, end)))
                    }
                    None => {
                        let offset = self.pos;
                        self.pos = self.src.len();
                        Some(Err(AnalysisError::Unterminated {
                            what: "block comment",
                            offset,
                        }))
                    }
                };
            }
        }

        for marker in self.syntax.line_comments {
            if rest.starts_with(marker) {
                let end = rest.find('\n').map(|i| self.pos + i).unwrap_or(self.src.len());
                return Some(Ok(self.emit(Lexeme::Comment, end)));
            }
        }

        for delim in self.syntax.strings {
            if rest.starts_with(delim.open) {
                match self.scan_string(delim) {
                    Ok(Some(end)) => return Some(Ok(self.emit(Lexeme::Str, end))),
                    Ok(None) => break,
                    Err(e) => {
                        self.pos = self.src.len();
                        return Some(Err(e));
                    }
                }
            }
        }

        if self.is_ident_start(c) {
            let end = self.scan_while(self.pos, |ch| self.is_ident_char(ch));
            return Some(Ok(self.emit(Lexeme::Ident, end)));
        }
        if c.is_ascii_digit() {
            let end = self.scan_while(self.pos, |ch| ch.is_alphanumeric() || ch == '.' || ch == '_');
            return Some(Ok(self.emit(Lexeme::Number, end)));
        }
        let end = self.pos + c.len_utf8();
        Some(Ok(self.emit(Lexeme::Punct(c), end)))
    }
}

/// How definitions open and close scopes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ScopeMode {
    /// `{` and `}` delimit scopes
    Braces,
    /// A definition's scope lasts while lines are indented deeper than it
    Indent,
}

struct OpenScope<'a> {
    name: Option<&'a str>,
    function: bool,
    indent: usize,
}

/// Token stream that classifies identifiers with the owning analyzer
pub(crate) struct SymbolStream<'a> {
    scanner: Scanner<'a>,
    analyzer: &'a dyn Analyzer,
    mode: ScopeMode,
    lookahead: VecDeque<Result<Raw<'a>, AnalysisError>>,
    finished: bool,
    scopes: Vec<OpenScope<'a>>,
    pending_scope: Option<(&'a str, bool)>,
    previous: Option<&'a str>,
    line_start: bool,
    indent: usize,
    run_head: Option<&'a str>,
    run_broken: bool,
    colon_pending: bool,
    directive: bool,
}

impl<'a> SymbolStream<'a> {
    pub fn new(
        text: &'a str,
        syntax: &'static Syntax,
        analyzer: &'a dyn Analyzer,
        mode: ScopeMode,
    ) -> Self {
        Self {
            scanner: Scanner::new(text, syntax),
            analyzer,
            mode,
            lookahead: VecDeque::new(),
            finished: false,
            scopes: Vec::new(),
            pending_scope: None,
            previous: None,
            line_start: true,
            indent: 0,
            run_head: None,
            run_broken: false,
            colon_pending: false,
            directive: false,
        }
    }

    fn pop_raw(&mut self) -> Option<Result<Raw<'a>, AnalysisError>> {
        self.lookahead.pop_front().or_else(|| self.scanner.next())
    }

    fn peek_at(&mut self, idx: usize) -> Option<&Result<Raw<'a>, AnalysisError>> {
        while self.lookahead.len() <= idx {
            let raw = self.scanner.next()?;
            self.lookahead.push_back(raw);
        }
        self.lookahead.get(idx)
    }

    fn current_scope(&self) -> Option<&'a str> {
        self.scopes.iter().rev().find_map(|s| s.name)
    }

    fn in_function(&self) -> bool {
        self.scopes.iter().any(|s| s.function)
    }

    /// Next significant punctuation and the first character after a following `(...)` list
    fn look_past(&mut self) -> (Option<char>, Option<char>) {
        let indent_mode = self.mode == ScopeMode::Indent;
        let mut next = None;
        let mut depth = 0usize;
        let mut closed = false;
        let mut trailing = 0usize;
        let mut idx = 0;

        while idx < LOOKAHEAD_LIMIT {
            let raw = match self.peek_at(idx) {
                Some(Ok(raw)) => *raw,
                _ => break,
            };
            idx += 1;
            match raw.kind {
                Lexeme::Comment => continue,
                Lexeme::Space => {
                    if indent_mode && raw.text.contains('\n') && (closed || next.is_none()) {
                        break;
                    }
                }
                Lexeme::Punct(c) if next.is_none() => {
                    next = Some(c);
                    if c != '(' {
                        break;
                    }
                    depth = 1;
                }
                _ if next.is_none() => break,
                Lexeme::Punct(c) if !closed => match c {
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            closed = true;
                        }
                    }
                    _ => {}
                },
                _ if !closed => {}
                Lexeme::Ident | Lexeme::Number => {}
                Lexeme::Punct('(') if !indent_mode => trailing += 1,
                Lexeme::Punct(')') if trailing > 0 => trailing -= 1,
                Lexeme::Punct(c) if c != ')' && is_signature_punct(c) && !indent_mode => {}
                Lexeme::Punct(c) => return (next, Some(c)),
                Lexeme::Str => break,
            }
        }
        (next, None)
    }

    fn on_newline(&mut self, text: &str) {
        if let Some(i) = text.rfind('\n') {
            self.line_start = true;
            self.indent = text[i + 1..].chars().count();
            if self.mode == ScopeMode::Indent || self.directive {
                self.previous = None;
                self.restart_run();
            }
            self.directive = false;
        }
    }

    fn restart_run(&mut self) {
        self.run_head = None;
        self.run_broken = false;
        self.colon_pending = false;
    }

    /// Identifiers joined only by whitespace, `::` and pointer, reference,
    /// generic or array punctuation form one run
    fn track_run(&mut self, c: char) {
        match c {
            '{' | '}' | ';' | '(' | ')' | ',' => self.restart_run(),
            ':' => self.colon_pending = !self.colon_pending,
            '*' | '&' | '<' | '>' | '[' | ']' if !self.colon_pending => {}
            _ => {
                self.run_broken = true;
                self.colon_pending = false;
            }
        }
    }

    fn on_punct(&mut self, c: char, offset: usize) -> Result<(), AnalysisError> {
        if c == '#' && self.line_start {
            self.directive = true;
        }
        self.line_start = false;
        self.track_run(c);
        match c {
            '{' if self.mode == ScopeMode::Braces => {
                if self.scopes.len() >= MAX_DEPTH {
                    return Err(AnalysisError::TooDeep {
                        limit: MAX_DEPTH,
                        offset,
                    });
                }
                let (name, function) = match self.pending_scope.take() {
                    Some((name, function)) => (Some(name), function),
                    None => (None, false),
                };
                self.scopes.push(OpenScope {
                    name,
                    function,
                    indent: self.indent,
                });
                self.previous = None;
            }
            '}' if self.mode == ScopeMode::Braces => {
                self.scopes.pop();
                self.previous = None;
            }
            ';' => {
                self.pending_scope = None;
                self.previous = None;
            }
            '(' | ')' | ',' | '=' => self.previous = None,
            _ => {}
        }
        Ok(())
    }

    fn on_ident(&mut self, raw: Raw<'a>) -> Token<'a> {
        if self.mode == ScopeMode::Indent && self.line_start {
            let indent = self.indent;
            while self.scopes.last().map(|s| s.indent >= indent).unwrap_or(false) {
                self.scopes.pop();
            }
        }

        if self.colon_pending {
            self.run_broken = true;
            self.colon_pending = false;
        }
        let declaration_head = if self.run_broken { None } else { self.run_head };

        let (next, after_parens) = self.look_past();
        let site = SymbolSite {
            name: raw.text,
            previous: self.previous,
            next,
            after_parens,
            in_function: self.in_function(),
            line_start: self.line_start,
            declaration_head,
        };
        let role = self.analyzer.classify_symbol(&site);
        let scope = self.current_scope();

        let kind = match role {
            Some(SymbolRole::Definition) => {
                let function = next == Some('(');
                match self.mode {
                    ScopeMode::Braces => {
                        if next == Some('{') || after_parens == Some('{') {
                            self.pending_scope = Some((raw.text, function));
                        }
                    }
                    ScopeMode::Indent => self.scopes.push(OpenScope {
                        name: Some(raw.text),
                        function,
                        indent: self.indent,
                    }),
                }
                TokenKind::SymbolDefinition
            }
            Some(SymbolRole::Reference) => TokenKind::SymbolReference,
            None => TokenKind::Word,
        };

        self.previous = Some(raw.text);
        self.line_start = false;
        if self.run_head.is_none() {
            self.run_head = Some(raw.text);
        }

        let mut token = Token::new(raw.text, raw.start, kind);
        if kind.is_symbol() {
            token.scope = scope;
        }
        token
    }
}

fn is_signature_punct(c: char) -> bool {
    matches!(
        c,
        '-' | '>' | '<' | ':' | '&' | '*' | ',' | '\'' | '[' | ']' | '.' | '?' | '!'
    )
}

impl<'a> Iterator for SymbolStream<'a> {
    type Item = Result<Token<'a>, AnalysisError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let raw = match self.pop_raw()? {
                Ok(raw) => raw,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            };
            match raw.kind {
                Lexeme::Space => {
                    self.on_newline(raw.text);
                    return Some(Ok(Token::new(raw.text, raw.start, TokenKind::Whitespace)));
                }
                Lexeme::Comment => {
                    return Some(Ok(Token::new(raw.text, raw.start, TokenKind::Comment)));
                }
                Lexeme::Str => {
                    self.line_start = false;
                    self.previous = None;
                    self.run_broken = true;
                    return Some(Ok(Token::new(raw.text, raw.start, TokenKind::StringLiteral)));
                }
                Lexeme::Number => {
                    self.line_start = false;
                    self.run_broken = true;
                    return Some(Ok(Token::new(raw.text, raw.start, TokenKind::Word)));
                }
                Lexeme::Punct(c) => {
                    if let Err(e) = self.on_punct(c, raw.start) {
                        self.finished = true;
                        return Some(Err(e));
                    }
                }
                Lexeme::Ident => return Some(Ok(self.on_ident(raw))),
            }
        }
    }
}
