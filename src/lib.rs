use log::debug;

/// Contains tokens parsed from input text
pub mod token;

/// Module contains code that translates raw-text into a stream of tokens
pub mod lexer;

/// Contains the AST arena and the operators found in expressions
pub mod ast;

/// Module contains the namespaced table of declared symbols
pub mod symbol;

/// Module contains code that translates tokens of a file into an AST,
/// registering symbols as it goes
pub mod parser;

/// Module contains the in-memory bytecode program and its binary format
pub mod bytecode;

/// Module contains code lowering a parsed file into a bytecode program
pub mod compiler;

/// Errors of the whole pipeline
pub mod error;

use bytecode::{DEFAULT_WORD_LENGTH, Program};
use lexer::Lexer;
use parser::{Parsed, Parser};
use token::Token;

pub use error::Error;

/// Settings shared by every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Bytes per word, 1 to 8
    pub word_length: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            word_length: DEFAULT_WORD_LENGTH,
        }
    }
}

/// Lexes a whole source string.
pub fn lex(src: &str) -> Result<Vec<Token>, Error> {
    Ok(Lexer::lex(src)?)
}

/// Parses a source string into its AST and symbol table.
pub fn parse(src: &str, options: &Options) -> Result<Parsed, Error> {
    Ok(Parser::parse(src, options.word_length)?)
}

/// Runs the whole front end on a source string.
pub fn compile_str(src: &str, options: &Options) -> Result<Program, Error> {
    let parsed = parse(src, options)?;
    debug!(
        "parsed {} nodes and {} symbols",
        parsed.ast.len(),
        parsed.symbols.len()
    );

    Ok(compiler::compile(&parsed)?)
}

/// Compiles a source string straight to bytecode.
pub fn compile_to_bytes(src: &str, options: &Options) -> Result<Vec<u8>, Error> {
    Ok(compile_str(src, options)?.encode()?)
}
