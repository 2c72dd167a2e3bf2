//! Analyzer for brace-delimited languages.

use super::scanner::{ScopeMode, StringDelim, SymbolStream, Syntax};
use super::{Analyzer, SymbolRole, SymbolSite, TokenStream};

static C_LIKE_SYNTAX: Syntax = Syntax {
    line_comments: &["//"],
    block_comments: &[("/*", "*/")],
    strings: &[
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
            max_len: Some(12),
        },
        StringDelim {
            open: "`",
            close: "`",
            multiline: true,
            escapes: true,
            max_len: None,
        },
    ],
    ident_extra: &['$'],
};

const KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "auto", "await", "bool", "boolean", "break", "byte", "case",
    "catch", "chan", "char", "class", "const", "continue", "crate", "default", "defer", "define",
    "delete", "do", "double", "dyn", "elif", "else", "endif", "enum", "export", "extends",
    "extern", "false", "final", "float", "fn", "for", "friend", "from", "func", "go", "goto",
    "if", "ifdef", "ifndef", "impl", "implements", "import", "in", "include", "inline",
    "instanceof", "int", "interface", "let", "long", "loop", "match", "mod", "move", "mut",
    "namespace", "native", "new", "nil", "null", "nullptr", "NULL", "override", "package",
    "pragma", "private", "protected", "pub", "public", "range", "ref", "register", "restrict",
    "return", "select", "self", "Self", "short", "signed", "sizeof", "static", "struct",
    "super", "switch", "synchronized", "template", "this", "throw", "throws", "trait",
    "true", "try", "type", "typedef", "typename", "typeof", "undef", "union", "unsafe",
    "unsigned", "use", "using", "var", "virtual", "void", "volatile", "where", "while",
    "yield", "function",
];

/// Keywords whose next identifier is being defined
const DEFINITION_INTRODUCERS: &[&str] = &[
    "class", "define", "enum", "fn", "func", "function", "interface", "mod", "namespace",
    "struct", "trait", "type", "union",
];

/// Keywords that may open or extend the type of a declaration
const DECLARATION_KEYWORDS: &[&str] = &[
    "auto", "bool", "boolean", "byte", "char", "class", "const", "double", "enum", "export",
    "extern", "final", "float", "inline", "int", "let", "long", "mut", "private", "protected",
    "pub", "public", "register", "short", "signed", "static", "struct", "typedef", "union",
    "unsigned", "var", "void", "volatile",
];

/// Keywords that put a following call in expression position
const EXPRESSION_KEYWORDS: &[&str] = &[
    "await", "case", "else", "if", "in", "match", "new", "return", "throw", "while", "yield",
];

/// Analyzer for C, C++, Java, Rust, Go, JavaScript, TypeScript and C#
#[derive(Debug, Default)]
pub struct CLikeAnalyzer;

impl CLikeAnalyzer {
    pub const VERSION: u32 = 1;

    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for CLikeAnalyzer {
    fn id(&self) -> &'static str {
        "c-like"
    }

    fn version(&self) -> u32 {
        Self::VERSION
    }

    fn tokenize<'a>(&'a self, text: &'a str) -> TokenStream<'a> {
        Box::new(SymbolStream::new(text, &C_LIKE_SYNTAX, self, ScopeMode::Braces))
    }

    fn classify_symbol(&self, site: &SymbolSite<'_>) -> Option<SymbolRole> {
        if KEYWORDS.contains(&site.name) {
            return None;
        }
        if let Some(previous) = site.previous {
            if DEFINITION_INTRODUCERS.contains(&previous) {
                return Some(SymbolRole::Definition);
            }
        }
        if is_declarator(site) {
            return Some(SymbolRole::Definition);
        }
        let expression = site
            .previous
            .map(|p| EXPRESSION_KEYWORDS.contains(&p))
            .unwrap_or(false);
        if site.next == Some('(')
            && site.after_parens == Some('{')
            && !site.in_function
            && !expression
        {
            return Some(SymbolRole::Definition);
        }
        Some(SymbolRole::Reference)
    }
}

/// A type name followed by the declared name: `int counter;`, `size_t n = 0`,
/// `struct point *p,` or a parameter `char *name)`
fn is_declarator(site: &SymbolSite<'_>) -> bool {
    let type_like = |word: &str| DECLARATION_KEYWORDS.contains(&word) || !KEYWORDS.contains(&word);
    match (site.declaration_head, site.previous) {
        (Some(head), Some(previous)) => {
            type_like(head)
                && type_like(previous)
                && matches!(site.next, Some(';' | '=' | ',' | '[' | ')' | ':'))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Token, TokenKind};

    fn symbols(text: &str) -> Vec<(String, TokenKind, Option<String>)> {
        let analyzer = CLikeAnalyzer::new();
        analyzer
            .tokenize(text)
            .map(|t| t.unwrap())
            .filter(|t: &Token<'_>| t.kind.is_symbol())
            .map(|t| (t.text.to_string(), t.kind, t.scope.map(str::to_string)))
            .collect()
    }

    #[test]
    fn test_function_definition_and_call() {
        let out = symbols("int foo(void) { return 1; }\nint bar(void) { return foo(); }\n");
        assert_eq!(
            out,
            vec![
                ("foo".to_string(), TokenKind::SymbolDefinition, None),
                ("bar".to_string(), TokenKind::SymbolDefinition, None),
                ("foo".to_string(), TokenKind::SymbolReference, Some("bar".to_string())),
            ]
        );
    }

    #[test]
    fn test_prototype_is_not_definition() {
        let out = symbols("int foo(int x);");
        assert_eq!(out[0], ("foo".to_string(), TokenKind::SymbolReference, None));
    }

    #[test]
    fn test_type_definitions_and_members() {
        let out = symbols("struct point { int x; };\n#define LIMIT 10\n");
        assert_eq!(out[0], ("point".to_string(), TokenKind::SymbolDefinition, None));
        assert_eq!(
            out[1],
            ("x".to_string(), TokenKind::SymbolDefinition, Some("point".to_string()))
        );
        assert_eq!(out[2], ("LIMIT".to_string(), TokenKind::SymbolDefinition, None));
    }

    #[test]
    fn test_java_method_in_class_scope() {
        let out = symbols("class Greeter {\n  public void greet() throws IOException {\n    say();\n  }\n}\n");
        assert_eq!(out[0].0, "Greeter");
        assert_eq!(out[0].1, TokenKind::SymbolDefinition);
        assert_eq!(
            out[1],
            ("greet".to_string(), TokenKind::SymbolDefinition, Some("Greeter".to_string()))
        );
        let say = out.iter().find(|s| s.0 == "say").unwrap();
        assert_eq!(say.1, TokenKind::SymbolReference);
        assert_eq!(say.2.as_deref(), Some("greet"));
    }

    #[test]
    fn test_rust_signature_with_return_type() {
        let out = symbols("fn parse(input: &str) -> Result<(), Error> {\n    match lex(input) { _ => {} }\n}\n");
        assert_eq!(out[0], ("parse".to_string(), TokenKind::SymbolDefinition, None));
        let lex = out.iter().find(|s| s.0 == "lex").unwrap();
        assert_eq!(lex.1, TokenKind::SymbolReference);
        assert_eq!(lex.2.as_deref(), Some("parse"));
    }

    #[test]
    fn test_keywords_are_plain_words() {
        let analyzer = CLikeAnalyzer::new();
        let word = analyzer
            .tokenize("return x;")
            .map(|t| t.unwrap())
            .find(|t| t.text == "return")
            .unwrap();
        assert_eq!(word.kind, TokenKind::Word);
    }

    #[test]
    fn test_unterminated_comment_is_an_error() {
        let analyzer = CLikeAnalyzer::new();
        let results: Vec<_> = analyzer.tokenize("int x; /* oops").collect();
        assert!(results.iter().any(|r| r.is_err()));
    }

    fn roles(text: &str) -> Vec<(String, TokenKind)> {
        symbols(text).into_iter().map(|(name, kind, _)| (name, kind)).collect()
    }

    #[test]
    fn test_global_declarations_are_definitions() {
        let out = roles("#include <stdio.h>\nint counter;\nstatic long total = 0;\nconst char *names[4];\n");
        assert_eq!(
            out,
            vec![
                ("stdio".to_string(), TokenKind::SymbolReference),
                ("h".to_string(), TokenKind::SymbolReference),
                ("counter".to_string(), TokenKind::SymbolDefinition),
                ("total".to_string(), TokenKind::SymbolDefinition),
                ("names".to_string(), TokenKind::SymbolDefinition),
            ]
        );
    }

    #[test]
    fn test_struct_members_and_typedef() {
        let out = symbols("typedef struct point {\n  int x, y;\n  size_t len;\n} point_t;\n");
        let kind_of = |name: &str| out.iter().find(|s| s.0 == name).map(|s| s.1);
        assert_eq!(kind_of("point"), Some(TokenKind::SymbolDefinition));
        assert_eq!(kind_of("x"), Some(TokenKind::SymbolDefinition));
        assert_eq!(kind_of("len"), Some(TokenKind::SymbolDefinition));
        assert_eq!(kind_of("size_t"), Some(TokenKind::SymbolReference));
        let len = out.iter().find(|s| s.0 == "len").unwrap();
        assert_eq!(len.2.as_deref(), Some("point"));
    }

    #[test]
    fn test_locals_and_parameters() {
        let out = roles("int sum(int count) {\n  size_t i = 0;\n  total = count * scale;\n  return i;\n}\n");
        assert_eq!(
            out,
            vec![
                ("sum".to_string(), TokenKind::SymbolDefinition),
                ("count".to_string(), TokenKind::SymbolDefinition),
                ("size_t".to_string(), TokenKind::SymbolReference),
                ("i".to_string(), TokenKind::SymbolDefinition),
                ("total".to_string(), TokenKind::SymbolReference),
                ("count".to_string(), TokenKind::SymbolReference),
                ("scale".to_string(), TokenKind::SymbolReference),
                ("i".to_string(), TokenKind::SymbolReference),
            ]
        );
    }

    #[test]
    fn test_member_access_is_not_a_declaration() {
        let out = roles("void f(struct req *r) {\n  r->size;\n  r.len = 1;\n  std::string name;\n}\n");
        let kinds: Vec<_> = out.iter().filter(|s| s.0 != "f" && s.0 != "req" && s.0 != "r").collect();
        assert_eq!(
            kinds,
            vec![
                &("size".to_string(), TokenKind::SymbolReference),
                &("len".to_string(), TokenKind::SymbolReference),
                &("std".to_string(), TokenKind::SymbolReference),
                &("string".to_string(), TokenKind::SymbolReference),
                &("name".to_string(), TokenKind::SymbolDefinition),
            ]
        );
    }
}
