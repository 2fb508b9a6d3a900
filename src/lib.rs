//! Compiler for a statically-checkable Python subset that emits C.
//!
//! The pipeline is [`lexer`] → [`parser`] → [`types`] → [`codegen`]; the
//! [`compiler`] module runs it end to end.

pub mod backend;
pub mod builtins;
pub mod codegen;
pub mod compiler;
pub mod config;
pub mod driver;
pub mod error;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod types;
