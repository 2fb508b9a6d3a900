//! First parser pass: collects top-level function and class headers so that
//! calls may refer to definitions that appear later in the file.

use rustc_hash::{FxHashMap, FxHashSet};

use super::error::{ParseError, ParseResult};
use crate::builtins::Builtin;
use crate::lexer::{Span, Token, TokenKind};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassSignature {
    /// Method name to parameter count, not counting `self`.
    pub methods: FxHashMap<String, usize>,
}

impl ClassSignature {
    pub fn constructor_arity(&self) -> usize {
        self.methods.get("__init__").copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signatures {
    pub functions: FxHashMap<String, usize>,
    pub classes: FxHashMap<String, ClassSignature>,
}

struct Header<'a> {
    name: &'a str,
    name_span: Span,
    params: Vec<&'a str>,
}

struct Cursor<'t, 'a> {
    tokens: &'t [Token<'a>],
    index: usize,
}

impl<'t, 'a> Cursor<'t, 'a> {
    fn kind(&self) -> Option<&'t TokenKind<'a>> {
        self.tokens.get(self.index).map(|token| &token.kind)
    }

    fn span(&self) -> Span {
        self.tokens
            .get(self.index)
            .or(self.tokens.last())
            .map(|token| token.span)
            .unwrap_or_default()
    }

    fn error(&self, expected: &str) -> ParseError {
        let found = self
            .kind()
            .map(ToString::to_string)
            .unwrap_or_else(|| "end of input".to_string());
        ParseError::new(format!("Expected {expected}, got {found}"), self.span())
    }

    fn expect(&mut self, kind: &TokenKind<'_>, expected: &str) -> ParseResult<()> {
        if self.kind() == Some(kind) {
            self.index += 1;
            Ok(())
        } else {
            Err(self.error(expected))
        }
    }

    fn identifier(&mut self, expected: &str) -> ParseResult<(&'a str, Span)> {
        if let Some(TokenKind::Identifier(name)) = self.kind() {
            let span = self.span();
            self.index += 1;
            Ok((*name, span))
        } else {
            Err(self.error(expected))
        }
    }

    /// Reads `def name(a, b, ...)` starting at the `def` keyword.
    fn def_header(&mut self) -> ParseResult<Header<'a>> {
        self.expect(&TokenKind::Def, "'def'")?;
        let (name, name_span) = self.identifier("function name")?;
        self.expect(&TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        let mut seen = FxHashSet::default();
        while self.kind() != Some(&TokenKind::RParen) {
            let (param, span) = self.identifier("parameter name")?;
            if !seen.insert(param) {
                return Err(ParseError::new(
                    format!("duplicate parameter '{param}' in function '{name}'"),
                    span,
                ));
            }
            params.push(param);
            if self.kind() == Some(&TokenKind::Comma) {
                self.index += 1;
            } else {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(Header {
            name,
            name_span,
            params,
        })
    }

    /// Reads `class Name` or `class Name()` starting at the `class` keyword.
    fn class_header(&mut self) -> ParseResult<(&'a str, Span)> {
        self.expect(&TokenKind::Class, "'class'")?;
        let (name, span) = self.identifier("class name")?;
        if self.kind() == Some(&TokenKind::LParen) {
            self.index += 1;
            if self.kind() != Some(&TokenKind::RParen) {
                return Err(ParseError::new(
                    format!("class '{name}': inheritance is not supported"),
                    self.span(),
                ));
            }
            self.index += 1;
        }
        Ok((name, span))
    }
}

fn is_reserved(name: &str) -> bool {
    Builtin::from_name(name).is_some() || matches!(name, "print" | "range")
}

pub fn scan(tokens: &[Token<'_>]) -> ParseResult<Signatures> {
    let mut signatures = Signatures::default();
    let mut cursor = Cursor { tokens, index: 0 };
    let mut depth = 0usize;
    let mut current_class: Option<String> = None;

    while let Some(kind) = cursor.kind() {
        match kind {
            TokenKind::Indent => depth += 1,
            TokenKind::Dedent => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    current_class = None;
                }
            }
            TokenKind::Def if depth == 0 => {
                current_class = None;
                let header = cursor.def_header()?;
                let name = header.name;
                if is_reserved(name) {
                    return Err(ParseError::new(
                        format!("function '{name}' shadows a builtin"),
                        header.name_span,
                    ));
                }
                if signatures.functions.contains_key(name) {
                    return Err(ParseError::new(
                        format!("Duplicate function definition '{name}'"),
                        header.name_span,
                    ));
                }
                if signatures.classes.contains_key(name) {
                    return Err(ParseError::new(
                        format!("name '{name}' is defined as both a class and a function"),
                        header.name_span,
                    ));
                }
                signatures
                    .functions
                    .insert(name.to_string(), header.params.len());
                continue;
            }
            TokenKind::Def if depth == 1 && current_class.is_some() => {
                let header = cursor.def_header()?;
                let class_name = current_class.as_deref().unwrap_or_default();
                if header.params.first() != Some(&"self") {
                    return Err(ParseError::new(
                        format!(
                            "method '{}' of class '{class_name}' must take 'self' as its first parameter",
                            header.name
                        ),
                        header.name_span,
                    ));
                }
                let class = signatures
                    .classes
                    .entry(class_name.to_string())
                    .or_default();
                if class
                    .methods
                    .insert(header.name.to_string(), header.params.len() - 1)
                    .is_some()
                {
                    return Err(ParseError::new(
                        format!(
                            "Duplicate method definition '{}' in class '{class_name}'",
                            header.name
                        ),
                        header.name_span,
                    ));
                }
                continue;
            }
            TokenKind::Class if depth == 0 => {
                let (name, span) = cursor.class_header()?;
                if is_reserved(name) {
                    return Err(ParseError::new(
                        format!("class '{name}' shadows a builtin"),
                        span,
                    ));
                }
                if signatures.classes.contains_key(name) {
                    return Err(ParseError::new(
                        format!("Duplicate class definition '{name}'"),
                        span,
                    ));
                }
                if signatures.functions.contains_key(name) {
                    return Err(ParseError::new(
                        format!("name '{name}' is defined as both a function and a class"),
                        span,
                    ));
                }
                signatures
                    .classes
                    .insert(name.to_string(), ClassSignature::default());
                current_class = Some(name.to_string());
                continue;
            }
            _ => {}
        }
        cursor.index += 1;
    }

    Ok(signatures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use indoc::indoc;

    fn scan_source(source: &str) -> ParseResult<Signatures> {
        let tokens = tokenize(source).expect("tokenize should succeed");
        scan(&tokens)
    }

    #[test]
    fn collects_functions_and_methods() {
        let source = indoc! {"
            print(later(1, 2))
            def later(a, b):
                return a + b
            class Counter:
                count = 0
                def __init__(self, start):
                    self.count = start
                def bump(self):
                    self.count = self.count + 1
            def after():
                return 0
        "};
        let signatures = scan_source(source).expect("scan should succeed");
        assert_eq!(signatures.functions.get("later"), Some(&2));
        assert_eq!(signatures.functions.get("after"), Some(&0));
        let counter = &signatures.classes["Counter"];
        assert_eq!(counter.constructor_arity(), 1);
        assert_eq!(counter.methods.get("bump"), Some(&0));
        assert!(!signatures.functions.contains_key("bump"));
    }

    #[test]
    fn rejects_duplicate_functions() {
        let source = "def f():\n    pass\ndef f():\n    pass\n";
        let err = scan_source(source).expect_err("duplicate should fail");
        assert_eq!(err.message, "Duplicate function definition 'f'");
        assert_eq!(err.line, 3);
    }

    #[test]
    fn rejects_class_function_clash() {
        let source = "class A:\n    pass\ndef A():\n    pass\n";
        let err = scan_source(source).expect_err("clash should fail");
        assert!(err.message.contains("both a class and a function"));
    }

    #[test]
    fn rejects_inheritance() {
        let err = scan_source("class A(B):\n    pass\n").expect_err("inheritance should fail");
        assert!(err.message.contains("inheritance is not supported"));
    }

    #[test]
    fn rejects_method_without_self() {
        let source = "class A:\n    def m(x):\n        pass\n";
        let err = scan_source(source).expect_err("missing self should fail");
        assert!(err.message.contains("must take 'self'"));
    }

    #[test]
    fn rejects_duplicate_parameters() {
        let err = scan_source("def f(a, a):\n    pass\n").expect_err("duplicate param");
        assert!(err.message.contains("duplicate parameter 'a'"));
    }
}
