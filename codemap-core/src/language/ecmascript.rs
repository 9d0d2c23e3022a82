//! ECMAScript (TypeScript/JavaScript) structured parser using SWC (spec §4.C).
//!
//! Global invariants enforced:
//! - Deterministic parsing order
//! - Formatting, comments, and whitespace must not affect results

use swc_common::{sync::Lrc, FileName, SourceMap, Span};
use swc_ecma_ast::{
    ClassDecl, ClassMember, FnDecl, ImportDecl, ImportSpecifier, Module, VarDeclarator,
};
use swc_ecma_parser::{lexer::Lexer, EsVersion, Parser as SwcParser, StringInput, Syntax};
use swc_ecma_visit::{Visit, VisitWith};

use crate::parser::{ExtractedImport, ExtractedKind, ExtractedSymbol, LanguageParser, ParseResult};

/// ECMAScript parser using SWC. Determines TS-vs-JS and JSX-vs-plain syntax
/// from the file extension, same as the original lexer configuration.
pub struct ECMAScriptParser;

impl ECMAScriptParser {
    pub fn new() -> Self {
        ECMAScriptParser
    }
}

impl Default for ECMAScriptParser {
    fn default() -> Self {
        Self::new()
    }
}

fn syntax_for_file(filename: &str) -> Syntax {
    if filename.ends_with(".tsx") || filename.ends_with(".mtsx") || filename.ends_with(".ctsx") {
        Syntax::Typescript(swc_ecma_parser::TsSyntax {
            tsx: true,
            decorators: false,
            dts: false,
            ..Default::default()
        })
    } else if filename.ends_with(".ts") || filename.ends_with(".mts") || filename.ends_with(".cts") {
        let is_dts = filename.ends_with(".d.ts");
        Syntax::Typescript(swc_ecma_parser::TsSyntax {
            tsx: false,
            decorators: false,
            dts: is_dts,
            ..Default::default()
        })
    } else if filename.ends_with(".jsx") || filename.ends_with(".mjsx") || filename.ends_with(".cjsx") {
        Syntax::Es(swc_ecma_parser::EsSyntax {
            jsx: true,
            decorators: false,
            ..Default::default()
        })
    } else {
        Syntax::Es(swc_ecma_parser::EsSyntax {
            jsx: false,
            decorators: false,
            ..Default::default()
        })
    }
}

fn parse_module(source: &str, filename: &str) -> anyhow::Result<(Module, Lrc<SourceMap>)> {
    let cm: Lrc<SourceMap> = Default::default();
    let syntax = syntax_for_file(filename);
    let source_file = cm.new_source_file(FileName::Custom(filename.into()).into(), source.to_string());
    let input = StringInput::from(&*source_file);
    let lexer = Lexer::new(syntax, EsVersion::Es2022, input, None);
    let mut parser = SwcParser::new_from(lexer);
    let module = parser.parse_module().map_err(|e| {
        anyhow::anyhow!("parse error: {}", e.kind().msg()).context(format!("failed to parse {filename}"))
    })?;
    Ok((module, cm))
}

impl LanguageParser for ECMAScriptParser {
    fn parse(&self, source: &str, filename: &str) -> anyhow::Result<ParseResult> {
        let (module, cm) = parse_module(source, filename)?;
        let mut collector = SymbolCollector {
            cm: &cm,
            parent_stack: Vec::new(),
            result: ParseResult::default(),
        };
        module.visit_with(&mut collector);
        Ok(collector.result)
    }
}

struct SymbolCollector<'a> {
    cm: &'a SourceMap,
    parent_stack: Vec<String>,
    result: ParseResult,
}

impl<'a> SymbolCollector<'a> {
    fn snippet_head(&self, span: Span) -> String {
        match self.cm.span_to_snippet(span) {
            Ok(text) => text.split('{').next().unwrap_or(&text).trim().to_string(),
            Err(_) => String::new(),
        }
    }

    fn push(&mut self, name: String, kind: ExtractedKind, span: Span, signature: String) {
        let lo = self.cm.lookup_char_pos(span.lo());
        let hi = self.cm.lookup_char_pos(span.hi());
        let parent_name = if matches!(kind, ExtractedKind::Method) {
            self.parent_stack.last().cloned()
        } else {
            None
        };
        self.result.symbols.push(ExtractedSymbol {
            name,
            kind,
            start_line: lo.line,
            end_line: hi.line,
            start_col: lo.col.0,
            end_col: hi.col.0,
            signature: Some(signature),
            docstring: None,
            parent_name,
            span_approximate: false,
        });
    }
}

impl<'a> Visit for SymbolCollector<'a> {
    fn visit_fn_decl(&mut self, node: &FnDecl) {
        let name = node.ident.sym.to_string();
        let signature = self.snippet_head(node.function.span);
        self.push(name, ExtractedKind::Function, node.function.span, signature);
        node.visit_children_with(self);
    }

    fn visit_class_decl(&mut self, node: &ClassDecl) {
        let name = node.ident.sym.to_string();
        self.push(
            name.clone(),
            ExtractedKind::Class,
            node.class.span,
            format!("class {name}"),
        );
        self.parent_stack.push(name);
        node.visit_children_with(self);
        self.parent_stack.pop();
    }

    fn visit_class_member(&mut self, node: &ClassMember) {
        if let ClassMember::Method(method) = node {
            if let Some(name) = method.key.as_ident() {
                let signature = self.snippet_head(method.function.span);
                self.push(
                    name.sym.to_string(),
                    ExtractedKind::Method,
                    method.function.span,
                    signature,
                );
            }
        }
        node.visit_children_with(self);
    }

    fn visit_var_declarator(&mut self, node: &VarDeclarator) {
        if let (Some(ident), Some(init)) = (node.name.as_ident(), node.init.as_ref()) {
            let is_arrow_or_fn = init.as_arrow().is_some() || init.as_fn_expr().is_some();
            if is_arrow_or_fn {
                let signature = format!("const {} = (...) =>", ident.id.sym);
                self.push(
                    ident.id.sym.to_string(),
                    ExtractedKind::Function,
                    node.span,
                    signature,
                );
            }
        }
        node.visit_children_with(self);
    }

    fn visit_import_decl(&mut self, node: &ImportDecl) {
        let module = node.src.value.to_string();
        let mut names = Vec::new();
        for spec in &node.specifiers {
            match spec {
                ImportSpecifier::Named(named) => names.push(named.local.sym.to_string()),
                ImportSpecifier::Default(default) => names.push(default.local.sym.to_string()),
                ImportSpecifier::Namespace(_) => names.push("*".to_string()),
            }
        }
        let lo = self.cm.lookup_char_pos(node.span.lo());
        self.result.imports.push(ExtractedImport {
            module: module.clone(),
            names,
            alias: None,
            line: lo.line,
            is_relative: module.starts_with('.'),
        });
        node.visit_children_with(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_top_level_function() {
        let parser = ECMAScriptParser::new();
        let result = parser.parse("function foo() { return 42; }", "test.ts").unwrap();
        assert_eq!(result.symbols.len(), 1);
        assert_eq!(result.symbols[0].name, "foo");
        assert_eq!(result.symbols[0].kind, ExtractedKind::Function);
    }

    #[test]
    fn finds_class_and_methods() {
        let parser = ECMAScriptParser::new();
        let source = "class MyClass {\n  method1() { return 1; }\n  method2() { return 2; }\n}";
        let result = parser.parse(source, "test.ts").unwrap();
        assert_eq!(result.symbols.len(), 3);
        assert_eq!(result.symbols[0].name, "MyClass");
        assert_eq!(result.symbols[1].parent_name.as_deref(), Some("MyClass"));
        assert_eq!(result.symbols[2].parent_name.as_deref(), Some("MyClass"));
    }

    #[test]
    fn finds_typed_function_signature() {
        let parser = ECMAScriptParser::new();
        let source = "function typed(x: number): string { return x.toString(); }";
        let result = parser.parse(source, "test.ts").unwrap();
        assert_eq!(result.symbols.len(), 1);
        assert_eq!(result.symbols[0].name, "typed");
    }

    #[test]
    fn finds_jsx_component() {
        let parser = ECMAScriptParser::new();
        let source = "function Component() { return <div>Hello</div>; }";
        let result = parser.parse(source, "test.tsx").unwrap();
        assert_eq!(result.symbols.len(), 1);
        assert_eq!(result.symbols[0].name, "Component");
    }

    #[test]
    fn import_statement_is_extracted() {
        let parser = ECMAScriptParser::new();
        let source = "import { useState } from 'react';\nimport Default from './local';";
        let result = parser.parse(source, "test.ts").unwrap();
        assert_eq!(result.imports.len(), 2);
        assert_eq!(result.imports[0].module, "react");
        assert!(!result.imports[0].is_relative);
        assert!(result.imports[1].is_relative);
    }

    #[test]
    fn invalid_syntax_is_an_error() {
        let parser = ECMAScriptParser::new();
        let result = parser.parse("function foo() { return }}}", "test.ts");
        assert!(result.is_err());
    }

    #[test]
    fn empty_file_has_no_symbols() {
        let parser = ECMAScriptParser::new();
        let result = parser.parse("", "test.ts").unwrap();
        assert!(result.symbols.is_empty());
    }

    #[test]
    fn deterministic_ordering_by_source_position() {
        let source = "function zzz() { return 3; }\nfunction aaa() { return 1; }\nfunction mmm() { return 2; }";
        let parser1 = ECMAScriptParser::new();
        let result1 = parser1.parse(source, "test.ts").unwrap();
        let parser2 = ECMAScriptParser::new();
        let result2 = parser2.parse(source, "test.ts").unwrap();
        let names1: Vec<_> = result1.symbols.iter().map(|s| s.name.clone()).collect();
        let names2: Vec<_> = result2.symbols.iter().map(|s| s.name.clone()).collect();
        assert_eq!(names1, names2);
        assert_eq!(names1, vec!["zzz", "aaa", "mmm"]);
    }
}
