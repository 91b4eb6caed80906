use std::{
    collections::VecDeque,
    io::{self, BufRead},
};

use log::trace;
use thiserror::Error;

use crate::token::{SYMBOLS, Terminal, Token};

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum LexErrorKind {
    #[error("Invalid input encoding")]
    InvalidEncoding,

    #[error("Input error: {0}")]
    Input(String),

    #[error("Invalid indentation character {0:?} (must be ' ' or '\\t')")]
    InvalidIndentChar(char),

    #[error("Mixing tabs and spaces for indentation")]
    MixedIndentation,

    #[error("Indentation mismatch")]
    IndentMismatch,

    #[error("Invalid numeral `{0}`")]
    InvalidNumeral(String),

    #[error("Invalid identifier `{0}`")]
    InvalidIdentifier(String),

    #[error("Invalid symbol `{0}`")]
    InvalidSymbol(char),
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("Ln {line}, col {column}: lexing error: {kind}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub line: usize,
    pub column: usize,
}

/// Turns source text into tokens, one line at a time.
///
/// The lexer is an iterator: nothing is read from the underlying source until
/// a token is requested, and each request lexes at most one more line.
/// After an error the iterator is exhausted.
pub struct Lexer<R> {
    lines: io::Lines<R>,
    line_num: usize,
    /// Columns of the open indentation levels, strictly increasing.
    indent: Vec<usize>,
    /// The whitespace character this file indents with, once known.
    indent_char: Option<char>,
    pending: VecDeque<Token>,
    done: bool,
}

/// Returns whether the given char can start an operator or delimiter
fn symbol(ch: char) -> bool {
    SYMBOLS.iter().any(|(text, _)| text.starts_with(ch))
}

/// Returns whether the given char is a valid identifier char
fn ident(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Decodes a numeral with an optional `b`, `o` or `h` base suffix.
fn numeral(text: &str) -> Option<u64> {
    let (digits, radix) = match text.chars().last()? {
        'b' => (&text[..text.len() - 1], 2),
        'o' => (&text[..text.len() - 1], 8),
        'h' => (&text[..text.len() - 1], 16),
        _ => (text, 10),
    };

    if digits.is_empty() || !digits.starts_with(|ch: char| ch.is_ascii_digit()) {
        return None;
    }

    u64::from_str_radix(digits, radix).ok()
}

impl Lexer<&[u8]> {
    /// Lexes a whole string up front.
    pub fn lex(input: &str) -> Result<Vec<Token>, LexError> {
        Lexer::new(input.as_bytes()).collect()
    }
}

impl<R: BufRead> Lexer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_num: 0,
            indent: vec![0],
            indent_char: None,
            pending: VecDeque::new(),
            done: false,
        }
    }

    fn err(&self, kind: LexErrorKind, column: usize) -> LexError {
        LexError {
            kind,
            line: self.line_num,
            column,
        }
    }

    fn emit(&mut self, kind: Terminal, column: usize) {
        self.pending.push_back(Token::new(kind, self.line_num, column));
    }

    fn lex_line(&mut self, line: &str) -> Result<(), LexError> {
        let chars = line.chars().collect::<Vec<_>>();

        // Everything from `#` on is a comment
        let end = chars.iter().position(|ch| *ch == '#').unwrap_or(chars.len());
        let chars = &chars[..end];

        let width = chars.iter().take_while(|ch| ch.is_whitespace()).count();

        // Blank and comment-only lines do not take part in indentation
        if width < chars.len() {
            self.indentation(&chars[..width])?;
            self.lex_tokens(chars, width)?;
        }

        self.emit(Terminal::Newline, line.chars().count() + 1);

        trace!("lexed line {}", self.line_num);

        Ok(())
    }

    /// Compares the leading whitespace of a line with the indentation stack,
    /// emitting `Indent` or `Dedent` tokens as needed.
    fn indentation(&mut self, leading: &[char]) -> Result<(), LexError> {
        for (i, &ch) in leading.iter().enumerate() {
            if ch != ' ' && ch != '\t' {
                return Err(self.err(LexErrorKind::InvalidIndentChar(ch), i + 1));
            }

            match self.indent_char {
                None => self.indent_char = Some(ch),
                Some(indent_char) if indent_char != ch => {
                    return Err(self.err(LexErrorKind::MixedIndentation, i + 1));
                }
                Some(_) => {}
            }
        }

        let width = leading.len();
        let column = width + 1;
        let top = self.indent.last().copied().unwrap_or_default();

        if width > top {
            self.indent.push(width);
            self.emit(Terminal::Indent, column);
        } else if width < top {
            while self.indent.last().is_some_and(|top| *top > width) {
                self.indent.pop();
                self.emit(Terminal::Dedent, column);
            }

            if self.indent.last() != Some(&width) {
                return Err(self.err(LexErrorKind::IndentMismatch, column));
            }
        }

        Ok(())
    }

    fn lex_tokens(&mut self, chars: &[char], start: usize) -> Result<(), LexError> {
        let mut cur = start;

        while cur < chars.len() {
            let ch = chars[cur];
            let column = cur + 1;

            if ch.is_whitespace() {
                cur += 1;
                continue;
            }

            if ch.is_ascii_digit() {
                let len = chars[cur..]
                    .iter()
                    .take_while(|ch| ch.is_ascii_alphanumeric())
                    .count();
                let text = chars[cur..cur + len].iter().collect::<String>();
                cur += len;

                let value = numeral(&text)
                    .filter(|_| Self::delimited(chars, cur))
                    .ok_or_else(|| self.err(LexErrorKind::InvalidNumeral(text.clone()), column))?;

                self.pending.push_back(Token {
                    kind: Terminal::Literal,
                    lexeme: Some(text),
                    value: Some(value),
                    line: self.line_num,
                    column,
                });
            } else if ident(ch) {
                let len = chars[cur..].iter().take_while(|ch| ident(**ch)).count();
                let text = chars[cur..cur + len].iter().collect::<String>();
                cur += len;

                if !Self::delimited(chars, cur) {
                    let found = format!("{text}{}", chars[cur]);
                    return Err(self.err(LexErrorKind::InvalidIdentifier(found), column));
                }

                let token = match Terminal::keyword(&text) {
                    Some(keyword) => Token::new(keyword, self.line_num, column),
                    None => Token {
                        lexeme: Some(text),
                        ..Token::new(Terminal::Identifier, self.line_num, column)
                    },
                };
                self.pending.push_back(token);
            } else {
                // SYMBOLS is sorted so the first match is the longest one
                let (text, terminal) = SYMBOLS
                    .iter()
                    .find(|(text, _)| {
                        text.chars()
                            .enumerate()
                            .all(|(i, ch)| chars.get(cur + i) == Some(&ch))
                    })
                    .ok_or_else(|| self.err(LexErrorKind::InvalidSymbol(ch), column))?;

                cur += text.chars().count();
                self.emit(*terminal, column);
            }
        }

        Ok(())
    }

    /// Identifiers and literals must be followed by whitespace, an operator,
    /// a delimiter or the end of the line.
    fn delimited(chars: &[char], at: usize) -> bool {
        chars
            .get(at)
            .is_none_or(|ch| ch.is_whitespace() || symbol(*ch))
    }

    /// Closes every open indentation level at end of input.
    fn finish(&mut self) {
        let column = 1;
        while self.indent.len() > 1 {
            self.indent.pop();
            self.emit(Terminal::Dedent, column);
        }
    }
}

impl<R: BufRead> Iterator for Lexer<R> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Some(Ok(token));
            }

            if self.done {
                return None;
            }

            match self.lines.next() {
                Some(Ok(line)) => {
                    self.line_num += 1;
                    if let Err(err) = self.lex_line(&line) {
                        self.done = true;
                        self.pending.clear();
                        return Some(Err(err));
                    }
                }
                Some(Err(err)) => {
                    self.done = true;
                    self.line_num += 1;
                    let kind = match err.kind() {
                        io::ErrorKind::InvalidData => LexErrorKind::InvalidEncoding,
                        _ => LexErrorKind::Input(err.to_string()),
                    };
                    return Some(Err(self.err(kind, 1)));
                }
                None => {
                    self.done = true;
                    self.finish();
                }
            }
        }
    }
}
