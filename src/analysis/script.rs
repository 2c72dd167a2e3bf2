//! Analyzer for `#`-comment scripting languages.

use super::scanner::{ScopeMode, StringDelim, SymbolStream, Syntax};
use super::{Analyzer, SymbolRole, SymbolSite, TokenStream};

static SCRIPT_SYNTAX: Syntax = Syntax {
    line_comments: &["#"],
    block_comments: &[],
    strings: &[
        StringDelim {
            open: "\"\"\"",
            close: "\"\"\"",
            multiline: true,
            escapes: true,
            max_len: None,
        },
        StringDelim {
            open: "'''",
            close: "'''",
            multiline: true,
            escapes: true,
            max_len: None,
        },
        StringDelim {
            open: "\"",
            close: "\"",
            multiline: false,
            escapes: true,
            max_len: None,
        },
        StringDelim {
            open: "'",
            close: "'",
            multiline: false,
            escapes: true,
            max_len: None,
        },
        StringDelim {
            open: "`",
            close: "`",
            multiline: false,
            escapes: true,
            max_len: None,
        },
    ],
    ident_extra: &[],
};

const DEFINITION_INTRODUCERS: &[&str] = &["class", "def", "function", "module", "proc", "sub"];

const KEYWORDS: &[&str] = &[
    "and", "as", "assert", "async", "await", "begin", "break", "case", "class", "continue",
    "def", "del", "do", "done", "elif", "else", "elsif", "end", "ensure", "esac", "except",
    "export", "False", "fi", "finally", "for", "from", "function", "global", "if", "import",
    "in", "is", "lambda", "local", "module", "my", "nil", "None", "nonlocal", "not", "or",
    "our", "pass", "proc", "raise", "require", "rescue", "return", "self", "sub", "then",
    "True", "try", "unless", "until", "use", "while", "with", "yield",
];

/// Analyzer for Python, Ruby, Perl, shell, Lua and Tcl
#[derive(Debug, Default)]
pub struct ScriptAnalyzer;

impl ScriptAnalyzer {
    pub const VERSION: u32 = 1;

    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for ScriptAnalyzer {
    fn id(&self) -> &'static str {
        "script"
    }

    fn version(&self) -> u32 {
        Self::VERSION
    }

    fn tokenize<'a>(&'a self, text: &'a str) -> TokenStream<'a> {
        Box::new(SymbolStream::new(text, &SCRIPT_SYNTAX, self, ScopeMode::Indent))
    }

    fn classify_symbol(&self, site: &SymbolSite<'_>) -> Option<SymbolRole> {
        if let Some(previous) = site.previous {
            if DEFINITION_INTRODUCERS.contains(&previous) {
                return Some(SymbolRole::Definition);
            }
        }
        if KEYWORDS.contains(&site.name) {
            return None;
        }
        // shell: `name() {`
        if site.line_start && site.next == Some('(') && site.after_parens == Some('{') {
            return Some(SymbolRole::Definition);
        }
        Some(SymbolRole::Reference)
    }
}
