//! Error types for the scriptq-introspect crate.

use thiserror::Error;

use crate::lexer::LexerError;

/// Reasons a script's parameter surface could not be determined.
///
/// None of these reach callers of [`crate::inspect`] or [`crate::extract`];
/// they collapse to "no parameters".
#[derive(Debug, Error)]
pub enum IntrospectError {
    /// The script file could not be read as UTF-8 text.
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The source does not parse as a Python module.
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("lexical error at byte {offset}: {kind}")]
    Lex { offset: usize, kind: LexerError },

    #[error("unbalanced '{delimiter}' at byte {offset}")]
    Unbalanced { delimiter: char, offset: usize },
}

pub type Result<T> = std::result::Result<T, IntrospectError>;
