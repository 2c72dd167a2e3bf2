use unicode_segmentation::UnicodeSegmentation;

use super::{Analyzer, SymbolRole, SymbolSite, Token, TokenKind, TokenStream};

/// Word segmentation without symbol recognition
#[derive(Debug, Default)]
pub struct PlainAnalyzer;

impl PlainAnalyzer {
    pub const VERSION: u32 = 1;

    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for PlainAnalyzer {
    fn id(&self) -> &'static str {
        "plain"
    }

    fn version(&self) -> u32 {
        Self::VERSION
    }

    fn tokenize<'a>(&'a self, text: &'a str) -> TokenStream<'a> {
        Box::new(
            text.split_word_bound_indices()
                .filter_map(|(start, segment)| {
                    if segment.chars().any(char::is_alphanumeric) {
                        Some((start, segment, TokenKind::Word))
                    } else if segment.chars().all(char::is_whitespace) {
                        Some((start, segment, TokenKind::Whitespace))
                    } else {
                        None
                    }
                })
                .flat_map(|(start, segment, kind)| {
                    split_identifier_parts(start, segment)
                        .map(move |(at, part)| Ok(Token::new(part, at, kind)))
                }),
        )
    }

    fn classify_symbol(&self, _site: &SymbolSite<'_>) -> Option<SymbolRole> {
        None
    }
}

/// Words of a comment, string literal or other free text, with byte offsets
pub fn words(text: &str) -> impl Iterator<Item = (usize, &str)> + '_ {
    text.split_word_bound_indices()
        .filter(|(_, w)| w.chars().any(char::is_alphanumeric))
        .flat_map(|(start, w)| split_identifier_parts(start, w))
}

// UAX#29 keeps `config.load` and `a:b` together as one word
fn split_identifier_parts(start: usize, word: &str) -> impl Iterator<Item = (usize, &str)> + '_ {
    word.split(|c: char| c == '.' || c == ':')
        .scan(start, |offset, part| {
            let at = *offset;
            *offset += part.len() + 1;
            Some((at, part))
        })
        .filter(|(_, part)| !part.is_empty())
}
