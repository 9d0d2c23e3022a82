//! Language detection: extension → language table (spec §6.2), and the
//! structured-parser backends for the languages the Parser component (§4.C)
//! actually extracts symbols from.

pub mod ecmascript;
pub mod python;
pub mod regex_fallback;

use std::path::Path;

use serde::{Deserialize, Serialize};

/// All languages the scanner can *tag* a file with (spec §6.2). Only
/// [`Language::Python`], [`Language::Javascript`] and [`Language::Typescript`]
/// have a Parser backend (§4.C); the rest are scan-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Python,
    Javascript,
    Typescript,
    Rust,
    Go,
    Java,
    C,
    Cpp,
    Csharp,
    Ruby,
    Php,
    Swift,
    Kotlin,
    Scala,
    Sql,
    Shell,
    Html,
    Css,
    Scss,
    Json,
    Yaml,
    Toml,
    Xml,
    Markdown,
    Rst,
    Vue,
    Svelte,
    R,
    Sass,
    Less,
    Text,
}

impl Language {
    /// Detect language from a dot-free extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        Some(match ext.as_str() {
            "py" => Language::Python,
            "js" | "jsx" => Language::Javascript,
            "ts" | "tsx" => Language::Typescript,
            "rs" => Language::Rust,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "hpp" => Language::Cpp,
            "cs" => Language::Csharp,
            "rb" => Language::Ruby,
            "php" => Language::Php,
            "swift" => Language::Swift,
            "kt" => Language::Kotlin,
            "scala" => Language::Scala,
            "sql" => Language::Sql,
            "sh" | "bash" | "zsh" => Language::Shell,
            "html" | "htm" => Language::Html,
            "css" => Language::Css,
            "scss" => Language::Scss,
            "json" => Language::Json,
            "yaml" | "yml" => Language::Yaml,
            "toml" => Language::Toml,
            "xml" => Language::Xml,
            "md" | "mdx" => Language::Markdown,
            "rst" => Language::Rst,
            "vue" => Language::Vue,
            "svelte" => Language::Svelte,
            "r" => Language::R,
            "sass" => Language::Sass,
            "less" => Language::Less,
            "txt" => Language::Text,
            _ => return None,
        })
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Whether the Parser component (§4.C) has an extraction backend for
    /// this language; all other languages are scan-only.
    pub fn is_parseable(&self) -> bool {
        matches!(
            self,
            Language::Python | Language::Javascript | Language::Typescript
        )
    }
}
