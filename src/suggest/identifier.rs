//! Locating the identifier under the caret in a field's query text

use crate::error::SourcedexError;
use crate::models::Field;
use crate::Result;

/// The token being completed and the query text around it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Located {
    /// Whole token containing the caret, without operators or qualifiers
    pub identifier: String,
    /// Part of the identifier before the caret, trailing `*` removed
    pub prefix: String,
    /// Byte range of the identifier in the field text
    pub start: usize,
    pub end: usize,
    /// Field text with the identifier removed
    pub remainder: String,
}

impl Located {
    /// Whether the prefix holds `*` or `?` and must be matched as a pattern
    pub fn is_pattern(&self) -> bool {
        has_unescaped_wildcard(&self.prefix)
    }
}

fn is_boundary(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '"')
}

/// Find the token of `text` containing byte offset `caret`
///
/// A caret right after a token belongs to that token. Leading `+`/`-` and a
/// `field:` qualifier are not part of the identifier.
pub fn locate(text: &str, caret: usize) -> Result<Located> {
    if caret > text.len() || !text.is_char_boundary(caret) {
        return Err(SourcedexError::InvalidRequest(format!(
            "caret {} is outside the query text of {} bytes",
            caret,
            text.len()
        )));
    }

    let mut start = text[..caret]
        .char_indices()
        .rev()
        .find(|&(_, c)| is_boundary(c))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let end = text[caret..]
        .char_indices()
        .find(|&(_, c)| is_boundary(c))
        .map(|(i, _)| caret + i)
        .unwrap_or(text.len());

    let token_start = start;
    while start < caret && text[start..].starts_with(['+', '-']) {
        start += 1;
    }
    if let Some(colon) = text[start..caret].find(':') {
        let qualifier = &text[start..start + colon];
        if qualifier.parse::<Field>().is_ok() {
            start += colon + 1;
        }
    }

    let identifier = text[start..end].to_string();
    let mut prefix = text[start..caret].to_string();
    let trailing_star = prefix
        .strip_suffix('*')
        .filter(|stem| !stem.ends_with('\\') && !has_unescaped_wildcard(stem))
        .map(str::len);
    if let Some(len) = trailing_star {
        prefix.truncate(len);
    }

    let before = text[..token_start].trim_end();
    let after = text[end..].trim_start();
    let remainder = match (before.is_empty(), after.is_empty()) {
        (false, false) => format!("{} {}", before, after),
        _ => format!("{}{}", before, after),
    };

    Ok(Located {
        identifier,
        prefix,
        start,
        end,
        remainder,
    })
}

fn has_unescaped_wildcard(text: &str) -> bool {
    let mut escaped = false;
    for c in text.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '*' | '?' => return true,
            _ => {}
        }
    }
    false
}
