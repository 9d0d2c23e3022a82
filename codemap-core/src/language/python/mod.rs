//! Python language support: structured symbol/import extraction using the
//! tree-sitter-python grammar.

pub mod parser;

pub use parser::PythonParser;
