//! Lexer for query string syntax
//!
//! Tokenizes Lucene-style query strings into tokens carrying their byte
//! span, so parse errors and autocomplete can point into the original text.

use crate::error::SourcedexError;
use crate::models::Field;
use crate::Result;

/// Token types for query string parsing
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Unquoted word, backslash escapes kept as written
    Term(String),
    /// Contents of a double-quoted phrase, escapes resolved
    Quoted(String),
    And,
    Or,
    Not,
    /// `field:` separator, only produced after a known field name
    Colon,
    LeftParen,
    RightParen,
    /// Required clause marker
    Plus,
    /// Excluded clause marker
    Minus,
    Eof,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Term(t) => format!("'{}'", t),
            Token::Quoted(t) => format!("\"{}\"", t),
            Token::And => "'AND'".to_string(),
            Token::Or => "'OR'".to_string(),
            Token::Not => "'NOT'".to_string(),
            Token::Colon => "':'".to_string(),
            Token::LeftParen => "'('".to_string(),
            Token::RightParen => "')'".to_string(),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Eof => "end of query".to_string(),
        }
    }
}

/// A token with its byte range in the input
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

/// Lexer for tokenizing query strings
pub struct Lexer<'a> {
    field: Field,
    input: &'a str,
    position: usize,
    /// The previous term stopped in front of a qualifier colon
    at_qualifier: bool,
}

impl<'a> Lexer<'a> {
    /// `field` only labels errors
    pub fn new(field: Field, input: &'a str) -> Self {
        Self {
            field,
            input,
            position: 0,
            at_qualifier: false,
        }
    }

    /// Get the next token from the input
    pub fn next_token(&mut self) -> Result<Spanned> {
        self.skip_whitespace();

        let start = self.position;
        let Some(ch) = self.current_char() else {
            return Ok(self.spanned(Token::Eof, start));
        };

        let token = match ch {
            '(' => {
                self.advance();
                Token::LeftParen
            }
            ')' => {
                self.advance();
                Token::RightParen
            }
            ':' if self.at_qualifier => {
                self.advance();
                self.at_qualifier = false;
                Token::Colon
            }
            '+' => {
                self.advance();
                Token::Plus
            }
            '-' => {
                self.advance();
                Token::Minus
            }
            '"' => {
                self.advance();
                self.read_quoted(start)?
            }
            _ => self.read_term(),
        };
        Ok(self.spanned(token, start))
    }

    /// Every token up to and including `Eof`
    pub fn tokenize(mut self) -> Result<Vec<Spanned>> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token()?;
            let done = spanned.token == Token::Eof;
            tokens.push(spanned);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn spanned(&self, token: Token, start: usize) -> Spanned {
        Spanned {
            token,
            start,
            end: self.position,
        }
    }

    fn read_term(&mut self) -> Token {
        let start = self.position;
        while let Some(ch) = self.current_char() {
            if ch == '\\' {
                self.advance();
                if self.current_char().is_some() {
                    self.advance();
                }
                continue;
            }
            if ch.is_whitespace() || matches!(ch, '(' | ')' | '"') {
                break;
            }
            // `defs:foo` qualifies, `std::vector` is one term
            if ch == ':' && self.input[start..self.position].parse::<Field>().is_ok() {
                self.at_qualifier = true;
                break;
            }
            self.advance();
        }

        let term = &self.input[start..self.position];
        match term {
            "AND" | "&&" => Token::And,
            "OR" | "||" => Token::Or,
            "NOT" => Token::Not,
            _ => Token::Term(term.to_string()),
        }
    }

    fn read_quoted(&mut self, start: usize) -> Result<Token> {
        let mut s = String::new();
        while let Some(ch) = self.current_char() {
            self.advance();
            match ch {
                '"' => return Ok(Token::Quoted(s)),
                '\\' => {
                    if let Some(escaped) = self.current_char() {
                        s.push(escaped);
                        self.advance();
                    }
                }
                _ => s.push(ch),
            }
        }

        Err(SourcedexError::parse(
            self.field.name(),
            start,
            "unterminated quoted phrase",
        ))
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if !ch.is_whitespace() {
                break;
            }
            self.advance();
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.position += ch.len_utf8();
        }
    }
}
