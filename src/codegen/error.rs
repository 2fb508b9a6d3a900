use thiserror::Error;

use crate::types::TypeError;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CodegenError {
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error("line {line}: '{keyword}' has no enclosing loop")]
    UnboundLoopTarget { keyword: &'static str, line: usize },
    #[error("line {line}: {message}")]
    Unsupported { message: String, line: usize },
}

impl CodegenError {
    pub fn unsupported(message: impl Into<String>, line: usize) -> Self {
        CodegenError::Unsupported {
            message: message.into(),
            line,
        }
    }

    pub fn line(&self) -> usize {
        match self {
            CodegenError::Type(err) => err.line,
            CodegenError::UnboundLoopTarget { line, .. } | CodegenError::Unsupported { line, .. } => {
                *line
            }
        }
    }
}

pub type CodegenResult<T> = Result<T, CodegenError>;
