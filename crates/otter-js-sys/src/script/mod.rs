//! Script runner behind `js_run_script`.
//!
//! A compact expression language: literals (including `123n` bigints),
//! global identifiers, member/index access, calls and `new`, unary and
//! binary operators, assignment, array/object literals, `throw` and
//! `let`/`const`/`var` declarations on the global object. The completion
//! value of the last expression statement is the script's result.

mod eval;
mod lexer;
mod parser;

use thiserror::Error;

use crate::env::{Completion, js_env_t};
use crate::heap::{ErrorKind, Value};

#[derive(Debug, Error)]
#[error("{message} at {line}:{column}")]
pub(crate) struct ParseError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

/// Parse and evaluate `source`. Syntax errors surface as thrown
/// `SyntaxError`s naming `file`.
pub(crate) fn run(env: &js_env_t, file: &str, source: &str) -> Completion<Value> {
    let program = match parser::parse(source) {
        Ok(program) => program,
        Err(error) => {
            let location = if file.is_empty() { "<script>" } else { file };
            return env.throw(
                ErrorKind::SyntaxError,
                format!("{} ({location}:{}:{})", error.message, error.line, error.column),
            );
        }
    };

    let scope = env.open_scope(false);
    let completion = eval::Interpreter::new(env).run(&program);
    env.close_scope(scope);
    completion
}
