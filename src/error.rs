use thiserror::Error;

use crate::codegen::CodegenError;
use crate::lexer::LexError;
use crate::parser::ParseError;
use crate::types::TypeError;

/// First failure of a compilation, tagged with the stage that produced it.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CompileError {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("type error: {0}")]
    Type(#[from] TypeError),
    #[error("codegen error: {0}")]
    Codegen(#[from] CodegenError),
}

impl CompileError {
    pub fn stage(&self) -> &'static str {
        match self {
            CompileError::Lex(_) => "lex",
            CompileError::Parse(_) => "parse",
            CompileError::Type(_) => "type",
            CompileError::Codegen(_) => "codegen",
        }
    }

    pub fn line(&self) -> usize {
        match self {
            CompileError::Lex(err) => err.line(),
            CompileError::Parse(err) => err.line,
            CompileError::Type(err) => err.line,
            CompileError::Codegen(err) => err.line(),
        }
    }
}
