//! Analyzer for tag based documents.

use super::{AnalysisError, Analyzer, SymbolRole, SymbolSite, Token, TokenKind, TokenStream};

/// Analyzer for HTML and XML
///
/// Tag names, attribute names and text words become `Word` tokens, attribute
/// values become `StringLiteral`. Markup has no symbols.
#[derive(Debug, Default)]
pub struct MarkupAnalyzer;

impl MarkupAnalyzer {
    pub const VERSION: u32 = 1;

    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for MarkupAnalyzer {
    fn id(&self) -> &'static str {
        "markup"
    }

    fn version(&self) -> u32 {
        Self::VERSION
    }

    fn tokenize<'a>(&'a self, text: &'a str) -> TokenStream<'a> {
        Box::new(MarkupStream {
            src: text,
            pos: 0,
            in_tag: false,
            failed: false,
        })
    }

    fn classify_symbol(&self, _site: &SymbolSite<'_>) -> Option<SymbolRole> {
        None
    }
}

struct MarkupStream<'a> {
    src: &'a str,
    pos: usize,
    in_tag: bool,
    failed: bool,
}

impl<'a> MarkupStream<'a> {
    fn run(&self, pred: impl Fn(char) -> bool) -> usize {
        self.src[self.pos..]
            .char_indices()
            .find(|&(_, c)| !pred(c))
            .map(|(i, _)| self.pos + i)
            .unwrap_or(self.src.len())
    }

    fn emit(&mut self, kind: TokenKind, end: usize) -> Token<'a> {
        let token = Token::new(&self.src[self.pos..end], self.pos, kind);
        self.pos = end;
        token
    }

    fn fail(&mut self, what: &'static str) -> AnalysisError {
        self.failed = true;
        AnalysisError::Unterminated {
            what,
            offset: self.pos,
        }
    }
}

impl<'a> Iterator for MarkupStream<'a> {
    type Item = Result<Token<'a>, AnalysisError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let src = self.src;
            let rest = &src[self.pos..];
            let c = rest.chars().next()?;

            if c.is_whitespace() {
                let end = self.run(char::is_whitespace);
                return Some(Ok(self.emit(TokenKind::Whitespace, end)));
            }
            if rest.starts_with("<!--") {
                return match rest[4..].find("-->") {
                    Some(i) => {
                        let end = self.pos + 4 + i + 3;
                        Some(Ok(self.emit(TokenKind::Comment, end)))
                    }
                    None => Some(Err(self.fail("comment"))),
                };
            }
            if rest.starts_with("<![CDATA[") {
                return match rest.find("]]>") {
                    Some(i) => {
                        let end = self.pos + i + 3;
                        Some(Ok(self.emit(TokenKind::StringLiteral, end)))
                    }
                    None => Some(Err(self.fail("CDATA section"))),
                };
            }

            if self.in_tag {
                if c == '"' || c == '\'' {
                    return match rest[1..].find(c) {
                        Some(i) => {
                            let end = self.pos + 1 + i + 1;
                            Some(Ok(self.emit(TokenKind::StringLiteral, end)))
                        }
                        None => Some(Err(self.fail("attribute value"))),
                    };
                }
                if c == '>' {
                    self.in_tag = false;
                }
            } else if c == '<' {
                self.in_tag = true;
            }

            // `xml:lang`, `og.title` and `data-id` split into their parts,
            // as query text does
            if c.is_alphanumeric() || c == '_' {
                let end = self.run(|ch| ch.is_alphanumeric() || ch == '_');
                return Some(Ok(self.emit(TokenKind::Word, end)));
            }
            self.pos += c.len_utf8();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<(TokenKind, String)> {
        let analyzer = MarkupAnalyzer::new();
        analyzer
            .tokenize(text)
            .map(|t| t.unwrap())
            .filter(|t| t.kind != TokenKind::Whitespace)
            .map(|t| (t.kind, t.text.to_string()))
            .collect()
    }

    fn owned(expected: &[(TokenKind, &str)]) -> Vec<(TokenKind, String)> {
        expected.iter().map(|(k, s)| (*k, s.to_string())).collect()
    }

    #[test]
    fn test_tags_attributes_and_text() {
        let out = tokens("<a href=\"x.html\">Read more</a>");
        assert_eq!(
            out,
            owned(&[
                (TokenKind::Word, "a"),
                (TokenKind::Word, "href"),
                (TokenKind::StringLiteral, "\"x.html\""),
                (TokenKind::Word, "Read"),
                (TokenKind::Word, "more"),
                (TokenKind::Word, "a"),
            ])
        );
    }

    #[test]
    fn test_comment() {
        let out = tokens("<!-- note --><p/>");
        assert_eq!(&out[..2], &owned(&[(TokenKind::Comment, "<!-- note -->"), (TokenKind::Word, "p")])[..]);
    }

    #[test]
    fn test_unterminated_comment_fails_once() {
        let analyzer = MarkupAnalyzer::new();
        let results: Vec<_> = analyzer.tokenize("<p>hi</p><!-- open").collect();
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
        assert!(results.last().unwrap().is_err());
    }

    #[test]
    fn test_qualified_names_split_into_parts() {
        let out = tokens("<html xml:lang=\"en\" data-id=\"7\">");
        assert_eq!(
            out,
            owned(&[
                (TokenKind::Word, "html"),
                (TokenKind::Word, "xml"),
                (TokenKind::Word, "lang"),
                (TokenKind::StringLiteral, "\"en\""),
                (TokenKind::Word, "data"),
                (TokenKind::Word, "id"),
                (TokenKind::StringLiteral, "\"7\""),
            ])
        );
    }
}
