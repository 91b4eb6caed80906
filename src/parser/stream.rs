use crate::{lexer::LexError, token::Token};

/// Append-only buffer over a lazily lexed token stream.
///
/// Tokens are pulled from the lexer the first time a position is requested and
/// are never dropped, so the parser can move its cursor back to any earlier
/// position.
pub struct TokenStream<I> {
    lexer: I,
    tokens: Vec<Token>,
    done: bool,
}

impl<I> TokenStream<I>
where
    I: Iterator<Item = Result<Token, LexError>>,
{
    pub fn new(lexer: I) -> Self {
        Self {
            lexer,
            tokens: vec![],
            done: false,
        }
    }

    /// Returns the token at absolute position `index`, or `None` past the end
    /// of input.
    pub fn get(&mut self, index: usize) -> Result<Option<&Token>, LexError> {
        while self.tokens.len() <= index && !self.done {
            match self.lexer.next() {
                Some(token) => self.tokens.push(token?),
                None => self.done = true,
            }
        }

        Ok(self.tokens.get(index))
    }

    /// Returns an already buffered token without pulling from the lexer.
    pub fn buffered(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    /// The most recently pulled token.
    pub fn last(&self) -> Option<&Token> {
        self.tokens.last()
    }

    /// Number of tokens pulled so far.
    pub fn pulled(&self) -> usize {
        self.tokens.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{lexer::Lexer, token::Terminal};

    #[test]
    fn test_pulls_on_demand() {
        let mut stream = TokenStream::new(Lexer::new(&b"a b\nc\n"[..]));
        assert_eq!(stream.pulled(), 0);

        assert_eq!(stream.get(1).unwrap().unwrap().name(), "b");
        // The whole first line is lexed, but only two tokens are pulled
        assert_eq!(stream.pulled(), 2);

        assert_eq!(stream.get(0).unwrap().unwrap().name(), "a");
        assert_eq!(stream.pulled(), 2);

        assert_eq!(stream.get(3).unwrap().unwrap().name(), "c");
        assert_eq!(stream.get(4).unwrap().unwrap().kind, Terminal::Newline);
        assert!(stream.get(5).unwrap().is_none());
    }

    #[test]
    fn test_lex_error() {
        let mut stream = TokenStream::new(Lexer::new(&b"a\n$\n"[..]));
        assert!(stream.get(1).is_ok());
        assert!(stream.get(2).is_err());
    }
}
