use thiserror::Error;

use crate::{bytecode::FormatError, lexer::LexError, parser::ParseError};

/// Any error the compilation pipeline can stop with.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Format(#[from] FormatError),
}
