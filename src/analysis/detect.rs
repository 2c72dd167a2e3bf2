//! Language detection from file names and content.

use serde::{Deserialize, Serialize};

/// Languages recognised by the analyzer set
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    C,
    Cpp,
    CSharp,
    Go,
    Java,
    JavaScript,
    Rust,
    TypeScript,
    Lua,
    Perl,
    Python,
    Ruby,
    Shell,
    Tcl,
    Html,
    Xml,
    PlainText,
    Binary,
}

/// Analyzer family a language is handled by
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Family {
    CLike,
    Script,
    Markup,
    Plain,
    Binary,
}

impl Language {
    /// Identifier indexed in the `type` field
    pub fn id(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cxx",
            Language::CSharp => "csharp",
            Language::Go => "golang",
            Language::Java => "java",
            Language::JavaScript => "javascript",
            Language::Rust => "rust",
            Language::TypeScript => "typescript",
            Language::Lua => "lua",
            Language::Perl => "perl",
            Language::Python => "python",
            Language::Ruby => "ruby",
            Language::Shell => "sh",
            Language::Tcl => "tcl",
            Language::Html => "html",
            Language::Xml => "xml",
            Language::PlainText => "plain",
            Language::Binary => "binary",
        }
    }

    pub fn family(&self) -> Family {
        match self {
            Language::C
            | Language::Cpp
            | Language::CSharp
            | Language::Go
            | Language::Java
            | Language::JavaScript
            | Language::Rust
            | Language::TypeScript => Family::CLike,
            Language::Lua
            | Language::Perl
            | Language::Python
            | Language::Ruby
            | Language::Shell
            | Language::Tcl => Family::Script,
            Language::Html | Language::Xml => Family::Markup,
            Language::PlainText => Family::Plain,
            Language::Binary => Family::Binary,
        }
    }

    pub fn from_id(id: &str) -> Option<Language> {
        ALL.iter().copied().find(|l| l.id() == id)
    }
}

const ALL: &[Language] = &[
    Language::C,
    Language::Cpp,
    Language::CSharp,
    Language::Go,
    Language::Java,
    Language::JavaScript,
    Language::Rust,
    Language::TypeScript,
    Language::Lua,
    Language::Perl,
    Language::Python,
    Language::Ruby,
    Language::Shell,
    Language::Tcl,
    Language::Html,
    Language::Xml,
    Language::PlainText,
    Language::Binary,
];

const EXTENSIONS: &[(&str, Language)] = &[
    ("c", Language::C),
    ("h", Language::C),
    ("cc", Language::Cpp),
    ("cpp", Language::Cpp),
    ("cxx", Language::Cpp),
    ("hh", Language::Cpp),
    ("hpp", Language::Cpp),
    ("hxx", Language::Cpp),
    ("cs", Language::CSharp),
    ("go", Language::Go),
    ("java", Language::Java),
    ("js", Language::JavaScript),
    ("jsx", Language::JavaScript),
    ("mjs", Language::JavaScript),
    ("rs", Language::Rust),
    ("ts", Language::TypeScript),
    ("tsx", Language::TypeScript),
    ("lua", Language::Lua),
    ("pl", Language::Perl),
    ("pm", Language::Perl),
    ("py", Language::Python),
    ("rb", Language::Ruby),
    ("sh", Language::Shell),
    ("bash", Language::Shell),
    ("ksh", Language::Shell),
    ("zsh", Language::Shell),
    ("tcl", Language::Tcl),
    ("htm", Language::Html),
    ("html", Language::Html),
    ("xhtml", Language::Html),
    ("xml", Language::Xml),
    ("xsd", Language::Xml),
    ("xsl", Language::Xml),
    ("svg", Language::Xml),
    ("pom", Language::Xml),
];

const FILE_NAMES: &[(&str, Language)] = &[
    ("makefile", Language::Shell),
    ("gnumakefile", Language::Shell),
    ("dockerfile", Language::Shell),
    ("cmakelists.txt", Language::Shell),
    ("rakefile", Language::Ruby),
    ("gemfile", Language::Ruby),
];

const BINARY_EXTENSIONS: &[&str] = &[
    "a", "bin", "class", "dll", "dylib", "exe", "gif", "gz", "ico", "jar", "jpeg", "jpg", "o",
    "obj", "pdf", "png", "pyc", "so", "tar", "tgz", "war", "woff", "woff2", "xz", "zip",
];

const SHEBANGS: &[(&str, Language)] = &[
    ("python", Language::Python),
    ("perl", Language::Perl),
    ("ruby", Language::Ruby),
    ("node", Language::JavaScript),
    ("lua", Language::Lua),
    ("tclsh", Language::Tcl),
    ("bash", Language::Shell),
    ("zsh", Language::Shell),
    ("ksh", Language::Shell),
    ("sh", Language::Shell),
];

/// Detect the language of a file from its path and leading bytes
pub fn detect_language(path: &str, head: &[u8]) -> Language {
    let name = path.rsplit('/').next().unwrap_or(path).to_ascii_lowercase();
    let extension = name.rsplit_once('.').map(|(_, ext)| ext);

    if let Some(ext) = extension {
        if BINARY_EXTENSIONS.contains(&ext) {
            return Language::Binary;
        }
    }
    if is_binary(head) {
        return Language::Binary;
    }
    if let Some((_, language)) = FILE_NAMES.iter().find(|(n, _)| *n == name) {
        return *language;
    }
    if let Some(ext) = extension {
        if let Some((_, language)) = EXTENSIONS.iter().find(|(e, _)| *e == ext) {
            return *language;
        }
    }
    if let Some(language) = sniff_shebang(head) {
        return language;
    }
    if sniff_markup(head) {
        return Language::Xml;
    }
    Language::PlainText
}

/// NUL bytes or a high share of control characters mean binary content
pub fn is_binary(head: &[u8]) -> bool {
    if head.is_empty() {
        return false;
    }
    if head.contains(&0) {
        return true;
    }
    let control = head
        .iter()
        .filter(|&&b| b < 0x09 || (b > 0x0d && b < 0x20) || b == 0x7f)
        .count();
    control * 10 > head.len()
}

fn sniff_shebang(head: &[u8]) -> Option<Language> {
    let first_line = head.split(|&b| b == b'\n').next()?;
    let line = std::str::from_utf8(first_line).ok()?;
    let interpreter_line = line.strip_prefix("#!")?;
    let mut parts = interpreter_line.split_whitespace();
    let mut program = parts.next()?.rsplit('/').next()?;
    if program == "env" {
        program = parts.find(|p| !p.starts_with('-'))?;
    }
    SHEBANGS
        .iter()
        .find(|(prefix, _)| program.starts_with(prefix))
        .map(|(_, language)| *language)
}

fn sniff_markup(head: &[u8]) -> bool {
    let trimmed = head
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|i| &head[i..])
        .unwrap_or(&[]);
    trimmed.starts_with(b"<?xml") || trimmed.starts_with(b"<!DOCTYPE") || trimmed.starts_with(b"<html")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_known_extensions() {
        assert_eq!(detect_language("a.c", b""), Language::C);
        assert_eq!(detect_language("dir/lib.rs", b""), Language::Rust);
        assert_eq!(detect_language("App.JAVA", b""), Language::Java);
        assert_eq!(detect_language("build/Makefile", b"all:\n"), Language::Shell);
        assert_eq!(detect_language("notes.txt", b"hello"), Language::PlainText);
    }

    #[test]
    fn test_detect_binary() {
        assert_eq!(detect_language("logo.png", b"abc"), Language::Binary);
        assert_eq!(detect_language("blob", &[0x7f, b'E', b'L', b'F', 0, 1]), Language::Binary);
        assert!(!is_binary(b""));
        assert!(!is_binary("héllo wörld\n".as_bytes()));
    }

    #[test]
    fn test_detect_shebang_with_env() {
        assert_eq!(detect_language("tool", b"#!/usr/bin/env -S perl -w\n"), Language::Perl);
        assert_eq!(detect_language("run", b"#!/bin/bash\necho hi\n"), Language::Shell);
    }

    #[test]
    fn test_sniff_markup() {
        assert_eq!(detect_language("page", b"  <?xml version=\"1.0\"?>"), Language::Xml);
    }

    #[test]
    fn test_language_ids_round_trip() {
        for language in ALL {
            assert_eq!(Language::from_id(language.id()), Some(*language));
        }
    }
}
