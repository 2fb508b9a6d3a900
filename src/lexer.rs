use std::borrow::Cow;
use std::{iter::Peekable, str::CharIndices};

pub use self::error::{LexError, LexResult};
pub use self::token::{Span, Token, TokenKind};

mod error;
mod token;

/// Streaming tokenizer for the indentation-sensitive source language.
///
/// Layout is turned into `Newline`, `Indent` and `Dedent` tokens. Blank and
/// comment-only lines produce nothing, and newlines inside brackets are
/// ignored so expressions may span lines.
pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    indent_stack: Vec<usize>,
    pending_tokens: Vec<Token<'a>>,
    at_line_start: bool,
    line_has_tokens: bool,
    bracket_depth: usize,
    eof_reached: bool,
    finished: bool,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            indent_stack: vec![0],
            pending_tokens: Vec::new(),
            at_line_start: true,
            line_has_tokens: false,
            bracket_depth: 0,
            eof_reached: false,
            finished: false,
            line: 1,
            column: 1,
        }
    }

    pub fn next_token(&mut self) -> LexResult<Token<'a>> {
        if let Some(token) = self.pending_tokens.pop() {
            return Ok(token);
        }

        if self.eof_reached {
            return Ok(Token::new(TokenKind::EOF, self.here()));
        }

        if self.at_line_start && self.bracket_depth == 0 {
            self.at_line_start = false;
            let Some(indent_level) = self.measure_indentation()? else {
                return Ok(self.finish());
            };
            let current_indent = self.current_indent();
            let span = self.here();

            if indent_level > current_indent {
                self.indent_stack.push(indent_level);
                return Ok(Token::new(TokenKind::Indent, span));
            }
            if indent_level < current_indent {
                while let Some(&top) = self.indent_stack.last()
                    && top > indent_level
                {
                    self.indent_stack.pop();
                    self.pending_tokens.push(Token::new(TokenKind::Dedent, span));
                }
                if self.current_indent() != indent_level {
                    return Err(LexError::InvalidDedent {
                        indent_level,
                        line: span.line,
                        column: span.column,
                    });
                }
                if let Some(token) = self.pending_tokens.pop() {
                    return Ok(token);
                }
            }
        }

        self.skip_whitespace();

        let Some(&(start, ch)) = self.chars.peek() else {
            return Ok(self.finish());
        };
        let line = self.line;
        let column = self.column;

        if ch == '\n' {
            self.advance_char();
            self.at_line_start = true;
            self.line_has_tokens = false;
            return Ok(Token::new(
                TokenKind::Newline,
                Span {
                    start,
                    end: start + 1,
                    line,
                    column,
                },
            ));
        }

        self.line_has_tokens = true;
        let kind = match ch {
            '"' | '\'' => self.read_string(start, line, column, ch)?,
            c if c.is_ascii_alphabetic() || c == '_' => self.read_identifier(start),
            c if c.is_ascii_digit() => self.read_number(start, line, column)?,
            '.' if self.peek_second().is_some_and(|c| c.is_ascii_digit()) => {
                self.read_number(start, line, column)?
            }
            _ => self.read_operator(ch, line, column)?,
        };

        Ok(Token::new(
            kind,
            Span {
                start,
                end: self.current_index(),
                line,
                column,
            },
        ))
    }

    /// Counts the leading spaces of the next non-blank line, consuming blank
    /// and comment-only lines on the way. Returns `None` at end of input.
    fn measure_indentation(&mut self) -> LexResult<Option<usize>> {
        loop {
            let mut count = 0;
            while let Some(&(_, c)) = self.chars.peek() {
                match c {
                    ' ' => {
                        self.advance_char();
                        count += 1;
                    }
                    '\t' => {
                        return Err(LexError::TabIndentation {
                            line: self.line,
                            column: self.column,
                        });
                    }
                    '\r' => {
                        self.advance_char();
                    }
                    _ => break,
                }
            }

            match self.chars.peek() {
                None => return Ok(None),
                Some(&(_, '\n')) => {
                    self.advance_char();
                }
                Some(&(_, '#')) => self.skip_comment(),
                Some(_) => return Ok(Some(count)),
            }
        }
    }

    /// Queues the closing `Newline` (when the last line lacks one) and one
    /// `Dedent` per open block, then returns the first of them or `EOF`.
    fn finish(&mut self) -> Token<'a> {
        self.eof_reached = true;
        let span = self.here();
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.pending_tokens.push(Token::new(TokenKind::Dedent, span));
        }
        if self.line_has_tokens {
            self.line_has_tokens = false;
            self.pending_tokens.push(Token::new(TokenKind::Newline, span));
        }
        self.pending_tokens
            .pop()
            .unwrap_or_else(|| Token::new(TokenKind::EOF, span))
    }

    fn skip_whitespace(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            match c {
                ' ' | '\t' | '\r' => {
                    self.advance_char();
                }
                '#' => self.skip_comment(),
                '\n' if self.bracket_depth > 0 => {
                    self.advance_char();
                }
                _ => break,
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.advance_char();
        }
    }

    fn read_identifier(&mut self, start: usize) -> TokenKind<'a> {
        self.advance_char();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance_char();
            } else {
                break;
            }
        }

        let ident = &self.input[start..self.current_index()];
        TokenKind::keyword(ident).unwrap_or(TokenKind::Identifier(ident))
    }

    fn read_number(&mut self, start: usize, line: usize, column: usize) -> LexResult<TokenKind<'a>> {
        let mut is_float = false;
        self.consume_digits();

        if self.peek_char() == Some('.') {
            is_float = true;
            self.advance_char();
            self.consume_digits();
        }

        if matches!(self.peek_char(), Some('e' | 'E')) {
            let mut lookahead = self.chars.clone();
            lookahead.next();
            let after_sign = match lookahead.peek() {
                Some(&(_, '+' | '-')) => {
                    lookahead.next();
                    lookahead.peek().map(|&(_, c)| c)
                }
                other => other.map(|&(_, c)| c),
            };
            if after_sign.is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.advance_char();
                if matches!(self.peek_char(), Some('+' | '-')) {
                    self.advance_char();
                }
                self.consume_digits();
            }
        }

        let literal = &self.input[start..self.current_index()];
        if is_float {
            return match literal.parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(TokenKind::Float(literal)),
                _ => Err(LexError::InvalidFloatLiteral {
                    literal: literal.to_string(),
                    line,
                    column,
                }),
            };
        }

        if literal.len() > 1 && literal.starts_with('0') && literal.bytes().any(|b| b != b'0') {
            return Err(LexError::InvalidIntegerLiteral {
                literal: literal.to_string(),
                line,
                column,
            });
        }
        Ok(TokenKind::Integer(literal))
    }

    fn consume_digits(&mut self) {
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance_char();
        }
    }

    fn read_string(
        &mut self,
        start: usize,
        line: usize,
        column: usize,
        quote: char,
    ) -> LexResult<TokenKind<'a>> {
        let input = self.input;
        let content_start = start + quote.len_utf8();
        let mut decoded: Option<String> = None;
        self.advance_char();

        loop {
            match self.chars.peek().copied() {
                None | Some((_, '\n')) => {
                    return Err(LexError::UnterminatedString { line, column });
                }
                Some((idx, c)) if c == quote => {
                    self.advance_char();
                    let value = match decoded {
                        Some(value) => Cow::Owned(value),
                        None => Cow::Borrowed(&input[content_start..idx]),
                    };
                    return Ok(TokenKind::String(value));
                }
                Some((idx, '\\')) => {
                    let buffer =
                        decoded.get_or_insert_with(|| input[content_start..idx].to_string());
                    self.advance_char();
                    match self.advance_char() {
                        None | Some((_, '\n')) => {
                            return Err(LexError::UnterminatedString { line, column });
                        }
                        Some((_, escape)) => match escape {
                            'n' => buffer.push('\n'),
                            't' => buffer.push('\t'),
                            'r' => buffer.push('\r'),
                            '0' => buffer.push('\0'),
                            '\\' | '\'' | '"' => buffer.push(escape),
                            other => {
                                buffer.push('\\');
                                buffer.push(other);
                            }
                        },
                    }
                }
                Some((_, c)) => {
                    if let Some(buffer) = decoded.as_mut() {
                        buffer.push(c);
                    }
                    self.advance_char();
                }
            }
        }
    }

    fn read_operator(&mut self, ch: char, line: usize, column: usize) -> LexResult<TokenKind<'a>> {
        self.advance_char();
        let kind = match ch {
            '+' => self.with_equal(TokenKind::Plus, TokenKind::PlusEqual),
            '-' => self.with_equal(TokenKind::Minus, TokenKind::MinusEqual),
            '*' => self.with_equal(TokenKind::Star, TokenKind::StarEqual),
            '%' => self.with_equal(TokenKind::Percent, TokenKind::PercentEqual),
            '=' => self.with_equal(TokenKind::Equal, TokenKind::EqualEqual),
            '<' => self.with_equal(TokenKind::Less, TokenKind::LessEqual),
            '>' => self.with_equal(TokenKind::Greater, TokenKind::GreaterEqual),
            '/' => {
                if self.eat('/') {
                    self.with_equal(TokenKind::DoubleSlash, TokenKind::DoubleSlashEqual)
                } else {
                    TokenKind::Slash
                }
            }
            '!' if self.eat('=') => TokenKind::NotEqual,
            ':' => TokenKind::Colon,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '(' | '[' | '{' => {
                self.bracket_depth += 1;
                match ch {
                    '(' => TokenKind::LParen,
                    '[' => TokenKind::LBracket,
                    _ => TokenKind::LBrace,
                }
            }
            ')' | ']' | '}' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                match ch {
                    ')' => TokenKind::RParen,
                    ']' => TokenKind::RBracket,
                    _ => TokenKind::RBrace,
                }
            }
            _ => {
                return Err(LexError::UnexpectedCharacter {
                    character: ch,
                    line,
                    column,
                });
            }
        };
        Ok(kind)
    }

    fn with_equal(&mut self, plain: TokenKind<'a>, with_equal: TokenKind<'a>) -> TokenKind<'a> {
        if self.eat('=') { with_equal } else { plain }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.advance_char();
            true
        } else {
            false
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = LexResult<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let result = self.next_token();
        match &result {
            Ok(token) if token.kind == TokenKind::EOF => self.finished = true,
            Err(_) => self.finished = true,
            Ok(_) => {}
        }
        Some(result)
    }
}

impl<'a> Lexer<'a> {
    fn advance_char(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((_, c)) = next {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn peek_second(&self) -> Option<char> {
        let mut lookahead = self.chars.clone();
        lookahead.next();
        lookahead.next().map(|(_, c)| c)
    }

    fn current_index(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(idx, _)| *idx)
            .unwrap_or(self.input.len())
    }

    fn current_indent(&self) -> usize {
        self.indent_stack.last().copied().unwrap_or(0)
    }

    fn here(&mut self) -> Span {
        let index = self.current_index();
        Span {
            start: index,
            end: index,
            line: self.line,
            column: self.column,
        }
    }
}

pub fn tokenize(input: &str) -> LexResult<Vec<Token<'_>>> {
    Lexer::new(input).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn kinds(input: &str) -> Vec<TokenKind<'_>> {
        tokenize(input)
            .expect("tokenize should succeed")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn test_simple_program() {
        let input = indoc! {"
            def fn():
                n = 4 + 4
                print(n)
            fn()
        "};
        let expected_tokens = vec![
            TokenKind::Def,
            TokenKind::Identifier("fn"),
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::Colon,
            TokenKind::Newline,
            TokenKind::Indent,
            TokenKind::Identifier("n"),
            TokenKind::Equal,
            TokenKind::Integer("4"),
            TokenKind::Plus,
            TokenKind::Integer("4"),
            TokenKind::Newline,
            TokenKind::Identifier("print"),
            TokenKind::LParen,
            TokenKind::Identifier("n"),
            TokenKind::RParen,
            TokenKind::Newline,
            TokenKind::Dedent,
            TokenKind::Identifier("fn"),
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::Newline,
            TokenKind::EOF,
        ];
        assert_eq!(kinds(input), expected_tokens);
    }

    #[test]
    fn closes_every_open_block_at_end_of_input() {
        let input = "while x:\n    if y:\n        pass";
        assert_eq!(
            kinds(input),
            vec![
                TokenKind::While,
                TokenKind::Identifier("x"),
                TokenKind::Colon,
                TokenKind::Newline,
                TokenKind::Indent,
                TokenKind::If,
                TokenKind::Identifier("y"),
                TokenKind::Colon,
                TokenKind::Newline,
                TokenKind::Indent,
                TokenKind::Pass,
                TokenKind::Newline,
                TokenKind::Dedent,
                TokenKind::Dedent,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        let input = indoc! {"
            x = 1  # trailing

                # indented comment
            y = 2
        "};
        assert_eq!(
            kinds(input),
            vec![
                TokenKind::Identifier("x"),
                TokenKind::Equal,
                TokenKind::Integer("1"),
                TokenKind::Newline,
                TokenKind::Identifier("y"),
                TokenKind::Equal,
                TokenKind::Integer("2"),
                TokenKind::Newline,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn joins_lines_inside_brackets() {
        let input = "xs = [1,\n      2]\n";
        assert_eq!(
            kinds(input),
            vec![
                TokenKind::Identifier("xs"),
                TokenKind::Equal,
                TokenKind::LBracket,
                TokenKind::Integer("1"),
                TokenKind::Comma,
                TokenKind::Integer("2"),
                TokenKind::RBracket,
                TokenKind::Newline,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn keeps_long_integer_digits() {
        let digits = "123456789012345678901234567890";
        assert_eq!(kinds(&format!("{digits}\n"))[0], TokenKind::Integer(digits));
    }

    #[test]
    fn recognizes_float_forms() {
        let tokens = kinds("a = 1.5 + .25 + 2e3 + 1.\n");
        let floats: Vec<_> = tokens
            .into_iter()
            .filter(|kind| matches!(kind, TokenKind::Float(_)))
            .collect();
        assert_eq!(
            floats,
            vec![
                TokenKind::Float("1.5"),
                TokenKind::Float(".25"),
                TokenKind::Float("2e3"),
                TokenKind::Float("1."),
            ]
        );
    }

    #[test]
    fn decodes_string_escapes() {
        let tokens = kinds("s = 'a\\n\\\"b' + \"plain\"\n");
        assert_eq!(tokens[2], TokenKind::String(Cow::Owned("a\n\"b".to_string())));
        assert_eq!(tokens[4], TokenKind::String(Cow::Borrowed("plain")));
    }

    #[test]
    fn recognizes_compound_operators() {
        assert_eq!(
            kinds("a //= b // c != d <= e\n")[..10],
            [
                TokenKind::Identifier("a"),
                TokenKind::DoubleSlashEqual,
                TokenKind::Identifier("b"),
                TokenKind::DoubleSlash,
                TokenKind::Identifier("c"),
                TokenKind::NotEqual,
                TokenKind::Identifier("d"),
                TokenKind::LessEqual,
                TokenKind::Identifier("e"),
                TokenKind::Newline,
            ]
        );
    }

    #[test]
    fn records_line_and_column() {
        let tokens = tokenize("x = 1\nif x:\n    y = 2\n").expect("tokenize");
        let y = tokens
            .iter()
            .find(|token| token.kind == TokenKind::Identifier("y"))
            .expect("y token");
        assert_eq!((y.span.line, y.span.column), (3, 5));
    }

    #[test]
    fn errors_on_invalid_character() {
        let err = tokenize("x = 1 @ 2\n").expect_err("expected lexing failure");
        assert_eq!(
            err,
            LexError::UnexpectedCharacter {
                character: '@',
                line: 1,
                column: 7
            }
        );
    }

    #[test]
    fn errors_on_inconsistent_dedent() {
        let input = "if x:\n        y = 1\n    z = 2\n";
        let err = tokenize(input).expect_err("expected dedent failure");
        assert!(matches!(err, LexError::InvalidDedent { indent_level: 4, line: 3, .. }));
    }

    #[test]
    fn errors_on_tab_indentation() {
        let err = tokenize("if x:\n\ty = 1\n").expect_err("expected tab failure");
        assert!(matches!(err, LexError::TabIndentation { line: 2, .. }));
    }

    #[test]
    fn errors_on_unterminated_string() {
        let err = tokenize("s = \"abc\n").expect_err("expected string failure");
        assert!(err.to_string().contains("Unterminated string literal at line 1"));
    }

    #[test]
    fn errors_on_overflowing_float() {
        let err = tokenize("f = 1e999\n").expect_err("expected float failure");
        assert!(err.to_string().contains("Invalid float literal '1e999'"));
    }

    #[test]
    fn iterator_stops_after_eof() {
        let mut lexer = Lexer::new("pass");
        let collected: Vec<_> = lexer.by_ref().collect::<LexResult<_>>().expect("tokenize");
        assert_eq!(collected.len(), 3);
        assert!(lexer.next().is_none());
    }
}
