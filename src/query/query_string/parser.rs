//! Recursive descent parser for query strings
//!
//! # Grammar
//!
//! ```text
//! query       := or_expr EOF
//! or_expr     := and_expr (OR and_expr)*
//! and_expr    := unary (AND? unary)*
//! unary       := (NOT | '-') primary | '+'? primary
//! primary     := '(' or_expr ')' | FIELD ':' value | value
//! value       := '(' or_expr ')' | QUOTED | TERM
//! ```
//!
//! Adjacent clauses are combined with AND.

use super::lexer::{Lexer, Spanned, Token};
use crate::error::SourcedexError;
use crate::models::Field;
use crate::Result;

/// Syntax tree of one field's query text
///
/// Text is kept as written; per-field normalization happens when the tree is
/// lowered into executable query nodes.
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedQuery {
    Term {
        field: Field,
        text: String,
        offset: usize,
    },
    Prefix {
        field: Field,
        prefix: String,
        offset: usize,
    },
    /// `*` and `?` wildcards anywhere but a lone trailing `*`
    Wildcard {
        field: Field,
        pattern: String,
        offset: usize,
    },
    Phrase {
        field: Field,
        text: String,
        offset: usize,
    },
    MatchAll,
    Bool {
        must: Vec<ParsedQuery>,
        should: Vec<ParsedQuery>,
        must_not: Vec<ParsedQuery>,
    },
}

impl ParsedQuery {
    fn and(must: Vec<ParsedQuery>, must_not: Vec<ParsedQuery>) -> Self {
        if must.len() == 1 && must_not.is_empty() {
            return must.into_iter().next().unwrap_or(ParsedQuery::MatchAll);
        }
        ParsedQuery::Bool {
            must,
            should: Vec::new(),
            must_not,
        }
    }
}

/// Parser for Lucene-style query strings
pub struct QueryStringParser {
    field: Field,
    tokens: Vec<Spanned>,
    position: usize,
}

impl QueryStringParser {
    /// Parser for text entered in `field`; qualifiers may switch fields
    pub fn new(field: Field, input: &str) -> Result<Self> {
        let tokens = Lexer::new(field, input).tokenize()?;
        Ok(Self {
            field,
            tokens,
            position: 0,
        })
    }

    /// Parse the whole input
    pub fn parse(&mut self) -> Result<ParsedQuery> {
        if self.current() == &Token::Eof {
            return Err(self.error("empty query"));
        }
        let query = self.parse_or_expr(self.field)?;
        if self.current() != &Token::Eof {
            return Err(self.error(format!("unexpected {}", self.current().describe())));
        }
        Ok(query)
    }

    /// or_expr := and_expr (OR and_expr)*
    fn parse_or_expr(&mut self, field: Field) -> Result<ParsedQuery> {
        let mut clauses = vec![self.parse_and_expr(field)?];
        while self.current() == &Token::Or {
            self.advance();
            clauses.push(self.parse_and_expr(field)?);
        }

        if clauses.len() == 1 {
            Ok(clauses.remove(0))
        } else {
            Ok(ParsedQuery::Bool {
                must: Vec::new(),
                should: clauses,
                must_not: Vec::new(),
            })
        }
    }

    /// and_expr := unary (AND? unary)*
    fn parse_and_expr(&mut self, field: Field) -> Result<ParsedQuery> {
        let mut must = Vec::new();
        let mut must_not = Vec::new();

        loop {
            let (negated, clause) = self.parse_unary(field)?;
            if negated {
                must_not.push(clause);
            } else {
                must.push(clause);
            }

            if self.current() == &Token::And {
                self.advance();
            } else if !self.is_start_of_clause() {
                break;
            }
        }

        Ok(ParsedQuery::and(must, must_not))
    }

    /// unary := (NOT | '-') primary | '+'? primary
    fn parse_unary(&mut self, field: Field) -> Result<(bool, ParsedQuery)> {
        match self.current() {
            Token::Not | Token::Minus => {
                self.advance();
                Ok((true, self.parse_primary(field)?))
            }
            Token::Plus => {
                self.advance();
                Ok((false, self.parse_primary(field)?))
            }
            _ => Ok((false, self.parse_primary(field)?)),
        }
    }

    /// primary := '(' or_expr ')' | FIELD ':' value | value
    fn parse_primary(&mut self, field: Field) -> Result<ParsedQuery> {
        if let Token::Term(name) = self.current() {
            if self.peek() == &Token::Colon {
                let qualified = name
                    .parse::<Field>()
                    .map_err(|_| self.error(format!("unknown field '{}'", name)))?;
                self.advance();
                self.advance();
                return self.parse_value(qualified);
            }
        }
        self.parse_value(field)
    }

    /// value := '(' or_expr ')' | QUOTED | TERM
    fn parse_value(&mut self, field: Field) -> Result<ParsedQuery> {
        let offset = self.offset();
        match self.current().clone() {
            Token::LeftParen => {
                self.advance();
                if self.current() == &Token::RightParen {
                    return Err(self.error("empty group"));
                }
                let inner = self.parse_or_expr(field)?;
                if self.current() != &Token::RightParen {
                    return Err(self.error(format!(
                        "expected ')' but found {}",
                        self.current().describe()
                    )));
                }
                self.advance();
                Ok(inner)
            }
            Token::Quoted(text) => {
                self.advance();
                Ok(ParsedQuery::Phrase {
                    field,
                    text,
                    offset,
                })
            }
            Token::Term(raw) => {
                self.advance();
                Ok(classify_term(field, &raw, offset))
            }
            other => Err(self.error(format!("expected a term but found {}", other.describe()))),
        }
    }

    fn is_start_of_clause(&self) -> bool {
        matches!(
            self.current(),
            Token::Term(_)
                | Token::Quoted(_)
                | Token::LeftParen
                | Token::Plus
                | Token::Minus
                | Token::Not
        )
    }

    fn current(&self) -> &Token {
        self.tokens
            .get(self.position)
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.position + 1)
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.position)
            .or_else(|| self.tokens.last())
            .map(|s| s.start)
            .unwrap_or(0)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> SourcedexError {
        SourcedexError::parse(self.field.name(), self.offset(), message)
    }
}

/// Parse one field's text
pub fn parse_query(field: Field, input: &str) -> Result<ParsedQuery> {
    QueryStringParser::new(field, input)?.parse()
}

fn classify_term(field: Field, raw: &str, offset: usize) -> ParsedQuery {
    if raw == "*" {
        return ParsedQuery::MatchAll;
    }

    let mut wildcards = Vec::new();
    let mut escaped = false;
    for (i, ch) in raw.char_indices() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == '*' || ch == '?' {
            wildcards.push((i, ch));
        }
    }

    match wildcards.as_slice() {
        [] => ParsedQuery::Term {
            field,
            text: unescape(raw),
            offset,
        },
        [(i, '*')] if *i == raw.len() - 1 => ParsedQuery::Prefix {
            field,
            prefix: unescape(&raw[..*i]),
            offset,
        },
        _ => ParsedQuery::Wildcard {
            field,
            pattern: raw.to_string(),
            offset,
        },
    }
}

/// Drop backslash escapes
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}
