//! Regex-based fallback extraction (spec §4.C), used when the structured
//! backend for a language is unavailable or fails to parse. Must never
//! raise; unrecognized constructs simply produce no symbol.
//!
//! Grounded on the indentation-block and pattern set of the reference
//! implementation's Python fallback parser (`parser.py`'s
//! `_parse_python_regex`/`_parse_js_regex`/`_find_block_end`/
//! `_extract_docstring`).

use regex::Regex;

use crate::parser::{ExtractedImport, ExtractedKind, ExtractedSymbol, ParseResult};

pub fn parse_python_regex(source: &str) -> ParseResult {
    let mut result = ParseResult::default();
    let lines: Vec<&str> = source.split('\n').collect();

    let class_re = Regex::new(r"^class\s+(\w+)(?:\s*\([^)]*\))?\s*:").unwrap();
    let func_re = Regex::new(r"^(\s*)def\s+(\w+)\s*(\([^)]*\))\s*(?:->.*?)?\s*:").unwrap();
    let import_from_re = Regex::new(r"^(?:from\s+([\w.]+)\s+)?import\s+(.+)$").unwrap();

    let mut current_class: Option<String> = None;

    for (i, line) in lines.iter().enumerate() {
        let line_num = i + 1;
        let stripped = line.trim();

        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        if let Some(caps) = import_from_re.captures(stripped) {
            let from_module = caps.get(1).map(|m| m.as_str());
            let rest = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            if let Some(from_module) = from_module {
                let names: Vec<String> = rest
                    .split(',')
                    .map(|n| n.trim().split(" as ").next().unwrap_or("").trim().to_string())
                    .collect();
                result.imports.push(ExtractedImport {
                    module: from_module.to_string(),
                    names,
                    alias: None,
                    line: line_num,
                    is_relative: from_module.starts_with('.'),
                });
            } else {
                for raw in rest.split(',') {
                    let item = raw.trim();
                    let (module, alias) = match item.split_once(" as ") {
                        Some((m, a)) => (m.trim().to_string(), Some(a.trim().to_string())),
                        None => (item.to_string(), None),
                    };
                    result.imports.push(ExtractedImport {
                        module,
                        names: vec![],
                        alias,
                        line: line_num,
                        is_relative: false,
                    });
                }
            }
            continue;
        }

        if let Some(caps) = class_re.captures(stripped) {
            let name = caps[1].to_string();
            current_class = Some(name.clone());
            let end_line = find_block_end(&lines, i);
            let docstring = extract_docstring(&lines, i + 1);
            result.symbols.push(ExtractedSymbol {
                name: name.clone(),
                kind: ExtractedKind::Class,
                start_line: line_num,
                end_line,
                start_col: 0,
                end_col: 0,
                signature: Some(format!("class {name}")),
                docstring,
                parent_name: None,
                span_approximate: true,
            });
            continue;
        }

        if let Some(caps) = func_re.captures(line) {
            let indent = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let name = caps[2].to_string();
            let params = caps.get(3).map(|m| m.as_str()).unwrap_or("()");
            let end_line = find_block_end(&lines, i);
            let docstring = extract_docstring(&lines, i + 1);
            let is_method = !indent.is_empty() && current_class.is_some();
            let kind = if is_method {
                ExtractedKind::Method
            } else {
                ExtractedKind::Function
            };
            result.symbols.push(ExtractedSymbol {
                name: name.clone(),
                kind,
                start_line: line_num,
                end_line,
                start_col: 0,
                end_col: 0,
                signature: Some(format!("def {name}{params}")),
                docstring,
                parent_name: if is_method { current_class.clone() } else { None },
                span_approximate: true,
            });
        }
    }

    result
}

fn find_block_end(lines: &[&str], start_idx: usize) -> usize {
    if start_idx >= lines.len() {
        return start_idx + 1;
    }
    let def_line = lines[start_idx];
    let def_indent = def_line.len() - def_line.trim_start().len();

    for (i, line) in lines.iter().enumerate().skip(start_idx + 1) {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let current_indent = line.len() - line.trim_start().len();
        if current_indent <= def_indent {
            return i + 1;
        }
    }
    lines.len()
}

fn extract_docstring(lines: &[&str], start_idx: usize) -> Option<String> {
    if start_idx >= lines.len() {
        return None;
    }
    for i in start_idx..lines.len().min(start_idx + 3) {
        let line = lines[i].trim();
        if line.is_empty() {
            continue;
        }
        for quote in ["\"\"\"", "'''"] {
            if let Some(rest) = line.strip_prefix(quote) {
                if let Some(body) = rest.strip_suffix(quote) {
                    if !body.is_empty() || rest.len() > quote.len() {
                        return Some(body.trim().to_string());
                    }
                }
                let mut doc_lines = vec![rest.to_string()];
                for later in lines.iter().skip(i + 1) {
                    if let Some(end) = later.find(quote) {
                        doc_lines.push(later[..end].to_string());
                        return Some(doc_lines.join("\n").trim().to_string());
                    }
                    doc_lines.push(later.to_string());
                }
                return Some(doc_lines.join("\n").trim().to_string());
            }
        }
        break;
    }
    None
}

pub fn parse_ecmascript_regex(source: &str) -> ParseResult {
    let mut result = ParseResult::default();
    let lines: Vec<&str> = source.split('\n').collect();

    let func_re = Regex::new(r"(?:export\s+)?(?:async\s+)?function\s+(\w+)\s*\([^)]*\)").unwrap();
    let arrow_re =
        Regex::new(r"(?:export\s+)?(?:const|let|var)\s+(\w+)\s*=\s*(?:async\s+)?\([^)]*\)\s*=>").unwrap();
    let class_re = Regex::new(r"(?:export\s+)?class\s+(\w+)").unwrap();
    let import_re =
        Regex::new(r#"import\s+(?:\{([^}]+)\}|(\w+))\s+from\s+['"]([^'"]+)['"]"#).unwrap();

    for (i, line) in lines.iter().enumerate() {
        let line_num = i + 1;
        let stripped = line.trim();

        if let Some(caps) = import_re.captures(stripped) {
            let named = caps.get(1).map(|m| m.as_str());
            let default = caps.get(2).map(|m| m.as_str());
            let module = caps[3].to_string();
            let names: Vec<String> = if let Some(named) = named {
                named
                    .split(',')
                    .map(|n| n.trim().split(" as ").next().unwrap_or("").trim().to_string())
                    .collect()
            } else if let Some(default) = default {
                vec![default.to_string()]
            } else {
                vec![]
            };
            result.imports.push(ExtractedImport {
                module: module.clone(),
                names,
                alias: None,
                line: line_num,
                is_relative: module.starts_with('.'),
            });
            continue;
        }

        if let Some(caps) = class_re.captures(stripped) {
            let name = caps[1].to_string();
            result.symbols.push(ExtractedSymbol {
                name: name.clone(),
                kind: ExtractedKind::Class,
                start_line: line_num,
                end_line: line_num,
                start_col: 0,
                end_col: 0,
                signature: Some(format!("class {name}")),
                docstring: None,
                parent_name: None,
                span_approximate: true,
            });
            continue;
        }

        if let Some(caps) = func_re.captures(stripped) {
            let name = caps[1].to_string();
            let signature = stripped.split('{').next().unwrap_or(stripped).trim().to_string();
            result.symbols.push(ExtractedSymbol {
                name,
                kind: ExtractedKind::Function,
                start_line: line_num,
                end_line: line_num,
                start_col: 0,
                end_col: 0,
                signature: Some(signature),
                docstring: None,
                parent_name: None,
                span_approximate: true,
            });
            continue;
        }

        if let Some(caps) = arrow_re.captures(stripped) {
            let name = caps[1].to_string();
            result.symbols.push(ExtractedSymbol {
                name: name.clone(),
                kind: ExtractedKind::Function,
                start_line: line_num,
                end_line: line_num,
                start_col: 0,
                end_col: 0,
                signature: Some(format!("const {name} = () =>")),
                docstring: None,
                parent_name: None,
                span_approximate: true,
            });
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_regex_finds_function() {
        let result = parse_python_regex("def foo(x):\n    return x\n");
        assert_eq!(result.symbols.len(), 1);
        assert_eq!(result.symbols[0].name, "foo");
        assert!(result.symbols[0].span_approximate);
    }

    #[test]
    fn python_regex_finds_method_with_parent() {
        let source = "class Widget:\n    def render(self):\n        pass\n";
        let result = parse_python_regex(source);
        assert_eq!(result.symbols.len(), 2);
        assert_eq!(result.symbols[1].parent_name.as_deref(), Some("Widget"));
    }

    #[test]
    fn python_regex_relative_import() {
        let result = parse_python_regex("from .util import helper\n");
        assert_eq!(result.imports.len(), 1);
        assert!(result.imports[0].is_relative);
    }

    #[test]
    fn ecmascript_regex_finds_function_and_class() {
        let source = "export class Foo {}\nfunction bar() {}\n";
        let result = parse_ecmascript_regex(source);
        assert_eq!(result.symbols.len(), 2);
        assert!(result.symbols.iter().all(|s| s.span_approximate));
    }

    #[test]
    fn ecmascript_regex_finds_import() {
        let source = "import { useState } from 'react';\n";
        let result = parse_ecmascript_regex(source);
        assert_eq!(result.imports.len(), 1);
        assert_eq!(result.imports[0].module, "react");
    }
}
