//! Python structured parser using tree-sitter (spec §4.C).

use anyhow::Context;
use tree_sitter::{Node, Parser};

use crate::parser::{ExtractedImport, ExtractedKind, ExtractedSymbol, LanguageParser, ParseResult};

/// Python parser using tree-sitter.
pub struct PythonParser;

impl PythonParser {
    pub fn new() -> anyhow::Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .context("failed to set Python grammar for parser")?;
        Ok(PythonParser)
    }
}

impl LanguageParser for PythonParser {
    fn parse(&self, source: &str, filename: &str) -> anyhow::Result<ParseResult> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .context("failed to set Python grammar")?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| anyhow::anyhow!("failed to parse Python file: {filename}"))?;

        let mut result = ParseResult::default();
        visit(tree.root_node(), source, None, &mut result);
        Ok(result)
    }
}

fn text<'a>(node: Node, source: &'a str) -> &'a str {
    &source[node.start_byte()..node.end_byte()]
}

fn visit(node: Node, source: &str, parent_class: Option<&str>, result: &mut ParseResult) {
    match node.kind() {
        "class_definition" => {
            if let Some(name_node) = node
                .child_by_field_name("name")
                .or_else(|| find_child_by_kind(node, "identifier"))
            {
                let name = text(name_node, source).to_string();
                let docstring = docstring_from_body(node, source);
                result.symbols.push(ExtractedSymbol {
                    name: name.clone(),
                    kind: ExtractedKind::Class,
                    start_line: node.start_position().row + 1,
                    end_line: node.end_position().row + 1,
                    start_col: node.start_position().column,
                    end_col: node.end_position().column,
                    signature: Some(format!("class {name}")),
                    docstring,
                    parent_name: None,
                    span_approximate: false,
                });
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    visit(child, source, Some(&name), result);
                }
                return;
            }
        }
        "function_definition" | "async_function_definition" => {
            if let Some(name_node) = node
                .child_by_field_name("name")
                .or_else(|| find_child_by_kind(node, "identifier"))
            {
                let name = text(name_node, source).to_string();
                let params = node
                    .child_by_field_name("parameters")
                    .map(|p| text(p, source).to_string())
                    .unwrap_or_else(|| "()".to_string());
                let docstring = docstring_from_body(node, source);
                let (kind, parent_name) = match parent_class {
                    Some(p) => (ExtractedKind::Method, Some(p.to_string())),
                    None => (ExtractedKind::Function, None),
                };
                result.symbols.push(ExtractedSymbol {
                    name: name.clone(),
                    kind,
                    start_line: node.start_position().row + 1,
                    end_line: node.end_position().row + 1,
                    start_col: node.start_position().column,
                    end_col: node.end_position().column,
                    signature: Some(format!("def {name}{params}")),
                    docstring,
                    parent_name,
                    span_approximate: false,
                });
            }
        }
        "import_statement" => {
            visit_import_statement(node, source, &mut result.imports);
        }
        "import_from_statement" => {
            visit_import_from_statement(node, source, &mut result.imports);
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        visit(child, source, parent_class, result);
    }
}

fn visit_import_statement(node: Node, source: &str, imports: &mut Vec<ExtractedImport>) {
    let line = node.start_position().row + 1;
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "dotted_name" => imports.push(ExtractedImport {
                module: text(child, source).to_string(),
                names: vec![],
                alias: None,
                line,
                is_relative: false,
            }),
            "aliased_import" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    imports.push(ExtractedImport {
                        module: text(name_node, source).to_string(),
                        names: vec![],
                        alias: child
                            .child_by_field_name("alias")
                            .map(|a| text(a, source).to_string()),
                        line,
                        is_relative: false,
                    });
                }
            }
            _ => {}
        }
    }
}

fn visit_import_from_statement(node: Node, source: &str, imports: &mut Vec<ExtractedImport>) {
    let line = node.start_position().row + 1;
    let mut module = String::new();
    let mut is_relative = false;
    let mut names = Vec::new();

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "relative_import" | "import_prefix" => {
                is_relative = true;
                module.push_str(text(child, source));
            }
            "dotted_name" => {
                if module.is_empty() || (is_relative && module.chars().all(|c| c == '.')) {
                    module.push_str(text(child, source));
                } else {
                    names.push(text(child, source).to_string());
                }
            }
            "wildcard_import" => names.push("*".to_string()),
            "aliased_import" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    names.push(text(name_node, source).to_string());
                }
            }
            "identifier" => {
                names.push(text(child, source).to_string());
            }
            _ => {}
        }
    }

    if !module.is_empty() {
        imports.push(ExtractedImport {
            module,
            names,
            alias: None,
            line,
            is_relative,
        });
    }
}

fn docstring_from_body(def_node: Node, source: &str) -> Option<String> {
    let body = def_node.child_by_field_name("body")?;
    let first_stmt = body.named_child(0)?;
    if first_stmt.kind() != "expression_statement" {
        return None;
    }
    let string_node = find_child_by_kind(first_stmt, "string")?;
    let raw = text(string_node, source);
    Some(strip_quotes(raw))
}

fn strip_quotes(raw: &str) -> String {
    let trimmed = raw.trim();
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|s| s.strip_suffix(quote))
        {
            return inner.trim().to_string();
        }
    }
    trimmed.to_string()
}

fn find_child_by_kind<'a>(node: Node<'a>, kind: &str) -> Option<Node<'a>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).find(|c| c.kind() == kind)
}
