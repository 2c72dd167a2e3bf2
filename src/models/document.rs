use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::analysis::{Language, SymbolRole};
use crate::error::SourcedexError;

/// Searchable fields of an indexed file
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    /// Case-folded words of code, comments and strings
    Full,
    /// Symbol definitions, case-sensitive
    Defs,
    /// Symbol references, case-sensitive
    Refs,
    /// Lower-cased path components
    Path,
    /// Stemmed history messages
    Hist,
    /// Language id
    Type,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Full,
        Field::Defs,
        Field::Refs,
        Field::Path,
        Field::Hist,
        Field::Type,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::Full => "full",
            Field::Defs => "defs",
            Field::Refs => "refs",
            Field::Path => "path",
            Field::Hist => "hist",
            Field::Type => "type",
        }
    }

    /// Single-byte prefix of this field's keys in the term dictionary
    pub fn code(&self) -> u8 {
        match self {
            Field::Full => b'f',
            Field::Defs => b'd',
            Field::Refs => b'r',
            Field::Path => b'p',
            Field::Hist => b'h',
            Field::Type => b't',
        }
    }

    pub fn from_code(code: u8) -> Option<Field> {
        Field::ALL.iter().copied().find(|f| f.code() == code)
    }

    /// Symbol fields keep the exact case of identifiers
    pub fn is_case_sensitive(&self) -> bool {
        matches!(self, Field::Defs | Field::Refs)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = SourcedexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .iter()
            .copied()
            .find(|f| f.name() == s)
            .ok_or_else(|| SourcedexError::UnknownField(s.to_string()))
    }
}

/// File system facts about a file at indexing time
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub size: u64,
    /// Last modification, milliseconds since the Unix epoch
    pub mtime_ms: u64,
}

/// One indexed version of a file
///
/// Documents are immutable once committed. A re-index writes a new version
/// into a new segment and tombstones the old one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub project: String,
    /// Path relative to the project root, `/`-separated
    pub path: String,
    /// Hex SHA-256 of the file content
    pub content_hash: String,
    pub mtime_ms: u64,
    pub size: u64,
    pub language: Language,
    pub analyzer: String,
    pub analyzer_version: u32,
    /// Byte offset of the start of each line
    pub line_offsets: Vec<u32>,
    /// Ordinal of the first `full` token at or after each line start
    pub line_first_token: Vec<u32>,
    /// Number of `full` tokens, the document length used in scoring
    pub token_count: u32,
    /// Content was not tokenized (binary, undecodable or oversized)
    pub metadata_only: bool,
}

impl Document {
    pub fn line_count(&self) -> u32 {
        self.line_offsets.len() as u32
    }

    /// 1-based line containing a byte offset
    pub fn line_of_offset(&self, offset: usize) -> u32 {
        let idx = self.line_offsets.partition_point(|&start| start as usize <= offset);
        idx.max(1) as u32
    }

    /// 1-based line containing the `full` token with this ordinal
    pub fn line_of_position(&self, position: u32) -> u32 {
        let idx = self.line_first_token.partition_point(|&first| first <= position);
        idx.max(1) as u32
    }

    /// File name component of the path
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// A definition or reference of a symbol within one document
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolEntry {
    pub name: String,
    /// 1-based line number
    pub line: u32,
    pub role: SymbolRole,
    /// Name of the enclosing definition, `None` at file scope
    pub scope: Option<String>,
}

/// Byte offsets of line starts
pub fn line_offsets(text: &str) -> Vec<u32> {
    std::iter::once(0)
        .chain(
            text.bytes()
                .enumerate()
                .filter(|&(_, b)| b == b'\n')
                .map(|(i, _)| (i + 1) as u32)
                .filter(|&start| (start as usize) < text.len()),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with_lines(text: &str, line_first_token: Vec<u32>) -> Document {
        Document {
            project: "p".to_string(),
            path: "dir/a.c".to_string(),
            content_hash: String::new(),
            mtime_ms: 0,
            size: text.len() as u64,
            language: Language::C,
            analyzer: "c-like".to_string(),
            analyzer_version: 1,
            line_offsets: line_offsets(text),
            line_first_token,
            token_count: 5,
            metadata_only: false,
        }
    }

    #[test]
    fn test_field_names_and_codes() {
        for field in Field::ALL {
            assert_eq!(field.name().parse::<Field>().unwrap(), field);
            assert_eq!(Field::from_code(field.code()), Some(field));
        }
        assert!(matches!("nope".parse::<Field>(), Err(SourcedexError::UnknownField(_))));
    }

    #[test]
    fn test_line_offsets() {
        assert_eq!(line_offsets(""), vec![0]);
        assert_eq!(line_offsets("a\nbc\n"), vec![0, 2]);
        assert_eq!(line_offsets("a\n\nb"), vec![0, 2, 3]);
    }

    #[test]
    fn test_line_of_offset() {
        let doc = doc_with_lines("int a;\nint b;\n", vec![0, 2]);
        assert_eq!(doc.line_count(), 2);
        assert_eq!(doc.line_of_offset(0), 1);
        assert_eq!(doc.line_of_offset(6), 1);
        assert_eq!(doc.line_of_offset(7), 2);
        assert_eq!(doc.file_name(), "a.c");
    }

    #[test]
    fn test_line_of_position_skips_empty_lines() {
        // line 1: tokens 0..3, line 2: empty, line 3: tokens 3..5
        let doc = doc_with_lines("a b c\n\nd e\n", vec![0, 3, 3]);
        assert_eq!(doc.line_of_position(0), 1);
        assert_eq!(doc.line_of_position(2), 1);
        assert_eq!(doc.line_of_position(3), 3);
        assert_eq!(doc.line_of_position(4), 3);
    }
}
