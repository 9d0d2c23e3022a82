//! Parser component (spec §4.C): multi-language symbol/import extraction with
//! a structured-grammar backend per language and a regex-based fallback.
//!
//! Global invariants enforced:
//! - Deterministic parsing order
//! - Formatting, comments, and whitespace must not affect results

use crate::language::Language;

/// A symbol extracted from one file, before parent-name resolution to an id
/// (spec §4.C: "nested symbols reference their parent by name").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedSymbol {
    pub name: String,
    pub kind: ExtractedKind,
    pub start_line: usize,
    pub end_line: usize,
    pub start_col: usize,
    pub end_col: usize,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub parent_name: Option<String>,
    /// True when `end_line` (and the col fields) were approximated by the
    /// regex fallback rather than derived from a true end-of-body span.
    pub span_approximate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractedKind {
    Module,
    Class,
    Function,
    Method,
}

impl From<ExtractedKind> for crate::model::SymbolKind {
    fn from(kind: ExtractedKind) -> Self {
        match kind {
            ExtractedKind::Module => crate::model::SymbolKind::Module,
            ExtractedKind::Class => crate::model::SymbolKind::Class,
            ExtractedKind::Function => crate::model::SymbolKind::Function,
            ExtractedKind::Method => crate::model::SymbolKind::Method,
        }
    }
}

/// One logical import statement (spec §4.C).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractedImport {
    pub module: String,
    pub names: Vec<String>,
    pub alias: Option<String>,
    pub line: usize,
    pub is_relative: bool,
}

/// The Parser's output for one file: symbols, imports, and non-fatal errors.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParseResult {
    pub symbols: Vec<ExtractedSymbol>,
    pub imports: Vec<ExtractedImport>,
    pub errors: Vec<String>,
}

/// A structured-grammar backend for one language.
///
/// Implementations must not panic on malformed input; a parse failure should
/// surface as `Err` so the dispatcher in [`parse_file`] can fall back to the
/// regex backend, never as a panic.
pub trait LanguageParser {
    fn parse(&self, source: &str, filename: &str) -> anyhow::Result<ParseResult>;
}

/// Dispatch to the structured backend for `language`, falling back to regex
/// extraction when the backend is unavailable or fails. Unsupported
/// languages get an empty `ParseResult` (spec §4.C).
pub fn parse_file(language: Language, source: &str, filename: &str) -> ParseResult {
    match language {
        Language::Python => {
            match crate::language::python::PythonParser::new().and_then(|p| p.parse(source, filename)) {
                Ok(result) => result,
                Err(_) => crate::language::regex_fallback::parse_python_regex(source),
            }
        }
        Language::Javascript | Language::Typescript => {
            match crate::language::ecmascript::ECMAScriptParser::new().parse(source, filename) {
                Ok(result) => result,
                Err(_) => crate::language::regex_fallback::parse_ecmascript_regex(source),
            }
        }
        _ => ParseResult::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparseable_language_is_empty() {
        let result = parse_file(Language::Markdown, "# hi", "README.md");
        assert!(result.symbols.is_empty());
        assert!(result.imports.is_empty());
    }

    #[test]
    fn python_dispatch_finds_function() {
        let result = parse_file(Language::Python, "def f():\n    pass\n", "a.py");
        assert_eq!(result.symbols.len(), 1);
        assert_eq!(result.symbols[0].name, "f");
    }

    #[test]
    fn typescript_dispatch_finds_function() {
        let result = parse_file(Language::Typescript, "function f() { return 1; }", "a.ts");
        assert_eq!(result.symbols.len(), 1);
        assert_eq!(result.symbols[0].name, "f");
    }
}
