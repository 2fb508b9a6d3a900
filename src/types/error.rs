use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[error("line {line}: {message}")]
pub struct TypeError {
    pub message: String,
    pub line: usize,
}

impl TypeError {
    pub fn new(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

pub type TypeResult<T> = Result<T, TypeError>;
