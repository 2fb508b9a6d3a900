use thiserror::Error;

use crate::lexer::Span;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            line: span.line,
            column: span.column,
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;
