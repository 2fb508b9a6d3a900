use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum LexError {
    #[error("Invalid dedent to {indent_level} spaces at line {line}, column {column}")]
    InvalidDedent {
        indent_level: usize,
        line: usize,
        column: usize,
    },
    #[error("Unexpected character '{character}' at line {line}, column {column}")]
    UnexpectedCharacter {
        character: char,
        line: usize,
        column: usize,
    },
    #[error("Tabs are not supported for indentation at line {line}, column {column}")]
    TabIndentation { line: usize, column: usize },
    #[error("Invalid integer literal '{literal}' at line {line}, column {column}")]
    InvalidIntegerLiteral {
        literal: String,
        line: usize,
        column: usize,
    },
    #[error("Invalid float literal '{literal}' at line {line}, column {column}")]
    InvalidFloatLiteral {
        literal: String,
        line: usize,
        column: usize,
    },
    #[error("Unterminated string literal at line {line}, column {column}")]
    UnterminatedString { line: usize, column: usize },
}

impl LexError {
    pub fn line(&self) -> usize {
        match self {
            LexError::InvalidDedent { line, .. }
            | LexError::UnexpectedCharacter { line, .. }
            | LexError::TabIndentation { line, .. }
            | LexError::InvalidIntegerLiteral { line, .. }
            | LexError::InvalidFloatLiteral { line, .. }
            | LexError::UnterminatedString { line, .. } => *line,
        }
    }

    pub fn column(&self) -> usize {
        match self {
            LexError::InvalidDedent { column, .. }
            | LexError::UnexpectedCharacter { column, .. }
            | LexError::TabIndentation { column, .. }
            | LexError::InvalidIntegerLiteral { column, .. }
            | LexError::InvalidFloatLiteral { column, .. }
            | LexError::UnterminatedString { column, .. } => *column,
        }
    }
}

pub type LexResult<T> = Result<T, LexError>;
