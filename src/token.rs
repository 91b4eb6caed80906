use std::fmt::Display;

/// Every kind of token the lexer can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Terminal {
    /// Newlines always end statements and are thus necessary for parsing
    Newline,
    Indent,
    Dedent,

    Literal,
    Identifier,

    // Reserved words
    Byte,
    Block,
    Func,
    Jump,
    Return,
    If,

    // Fixed lexemes
    AutoVar,
    Assign,
    Alias,
    Comma,
    Map,
    LeftParen,
    RightParen,
    Add,
    Sub,
    Mult,
    Div,
    Exp,
    Mod,
    And,
    Or,
    Xor,
    Not,
    ShiftL,
    ShiftR,
}

/// Reserved words, matched against whole identifiers.
pub const KEYWORDS: [(&str, Terminal); 6] = [
    ("byte", Terminal::Byte),
    ("block", Terminal::Block),
    ("func", Terminal::Func),
    ("jump", Terminal::Jump),
    ("return", Terminal::Return),
    ("if", Terminal::If),
];

/// Operators and delimiters.
///
/// Sorted so that longer lexemes come before their prefixes, which lets the
/// lexer take the first match as the longest one.
pub const SYMBOLS: [(&str, Terminal); 19] = [
    (":=", Terminal::AutoVar),
    ("->", Terminal::Map),
    ("**", Terminal::Exp),
    ("<<", Terminal::ShiftL),
    (">>", Terminal::ShiftR),
    ("=", Terminal::Assign),
    (":", Terminal::Alias),
    (",", Terminal::Comma),
    ("(", Terminal::LeftParen),
    (")", Terminal::RightParen),
    ("+", Terminal::Add),
    ("-", Terminal::Sub),
    ("*", Terminal::Mult),
    ("/", Terminal::Div),
    ("%", Terminal::Mod),
    ("&", Terminal::And),
    ("|", Terminal::Or),
    ("^", Terminal::Xor),
    ("!", Terminal::Not),
];

impl Terminal {
    pub fn keyword(ident: &str) -> Option<Self> {
        KEYWORDS
            .iter()
            .find(|(word, _)| *word == ident)
            .map(|(_, terminal)| *terminal)
    }

    /// Whether the terminal is an expression operator.
    pub fn is_operator(&self) -> bool {
        matches!(
            self,
            Self::Add
                | Self::Sub
                | Self::Mult
                | Self::Div
                | Self::Exp
                | Self::Mod
                | Self::And
                | Self::Or
                | Self::Xor
                | Self::Not
                | Self::ShiftL
                | Self::ShiftR
        )
    }

    /// The fixed text of a keyword or symbol terminal
    pub fn lexeme(&self) -> Option<&'static str> {
        KEYWORDS
            .iter()
            .chain(SYMBOLS.iter())
            .find(|(_, terminal)| terminal == self)
            .map(|(text, _)| *text)
    }
}

impl Display for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.lexeme() {
            Some(text) => write!(f, "`{text}`"),
            None => write!(
                f,
                "{}",
                match self {
                    Self::Newline => "newline",
                    Self::Indent => "indent",
                    Self::Dedent => "dedent",
                    Self::Literal => "literal",
                    _ => "identifier",
                }
            ),
        }
    }
}

/// A single lexed token.
///
/// Identifiers keep their name in `lexeme`, literals keep their source text in
/// `lexeme` and their decoded value in `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: Terminal,
    pub lexeme: Option<String>,
    pub value: Option<u64>,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: Terminal, line: usize, column: usize) -> Self {
        Self {
            kind,
            lexeme: None,
            value: None,
            line,
            column,
        }
    }

    /// The identifier name, or an empty string for tokens without a lexeme.
    pub fn name(&self) -> &str {
        self.lexeme.as_deref().unwrap_or_default()
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.kind, &self.lexeme) {
            (Terminal::Identifier, Some(name)) => write!(f, "Identifier({name})"),
            (Terminal::Literal, _) => write!(f, "Literal({})", self.value.unwrap_or_default()),
            (kind, _) => write!(f, "{kind}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_symbols_longest_first() {
        for (i, (a, _)) in SYMBOLS.iter().enumerate() {
            for (b, _) in SYMBOLS.iter().skip(i + 1) {
                assert!(!b.starts_with(a), "`{a}` shadows `{b}`");
            }
        }
    }

    #[test]
    fn test_keyword() {
        assert_eq!(Terminal::keyword("func"), Some(Terminal::Func));
        assert_eq!(Terminal::keyword("funcs"), None);
    }
}
