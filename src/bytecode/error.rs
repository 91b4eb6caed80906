use std::fmt::Display;

use thiserror::Error;

/// The part of a bytecode file an error was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Header,
    Identifiers,
    Variables,
    Imports,
    Statements,
    Literals,
}

impl Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Header => "header",
                Self::Identifiers => "identifier",
                Self::Variables => "variable",
                Self::Imports => "import",
                Self::Statements => "statement",
                Self::Literals => "literal",
            }
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatErrorKind {
    #[error("Invalid header string")]
    Header,

    #[error("Invalid word length {0}")]
    WordLength(usize),

    #[error("Unexpected end of buffer")]
    Truncated,

    #[error("Unexpected marker {0}")]
    Marker(u8),

    #[error("Missing special identifier")]
    Specials,

    #[error("Invalid identifier")]
    Identifier,

    #[error("{variables} variables for {identifiers} identifiers")]
    VariableCount { variables: u64, identifiers: u64 },

    #[error("Unresolved variable {0}")]
    UnresolvedVariable(u64),

    #[error("Unresolved statement {0}")]
    UnresolvedStatement(u64),

    #[error("Unresolved literal {0}")]
    UnresolvedLiteral(u64),

    #[error("Unresolved identifier {0}")]
    UnresolvedIdentifier(u64),

    #[error("Unresolved symbol `{0}`")]
    UnresolvedSymbol(String),

    #[error("Missing statement")]
    MissingStatement,

    #[error("Value {0} does not fit in a word")]
    WordOverflow(u64),

    #[error("Offset {offset} out of bounds for a block of {length} bytes")]
    OffsetBounds { offset: u64, length: u64 },

    #[error("Nested deeper than {0} levels")]
    Nesting(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct FormatError {
    pub section: Section,
    pub kind: FormatErrorKind,
    /// Byte offset into the buffer, when reading or writing one
    pub position: Option<usize>,
}

impl FormatError {
    pub fn new(section: Section, kind: FormatErrorKind) -> Self {
        Self {
            section,
            kind,
            position: None,
        }
    }

    pub fn at(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }
}

impl Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} section", self.section)?;
        if let Some(position) = self.position {
            write!(f, " at byte {position}")?;
        }
        write!(f, ": {}", self.kind)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_messages() {
        let err = FormatError::new(Section::Statements, FormatErrorKind::MissingStatement);
        assert_eq!(err.to_string(), "statement section: Missing statement");

        let err = FormatError::new(Section::Header, FormatErrorKind::WordLength(9)).at(19);
        assert_eq!(err.to_string(), "header section at byte 19: Invalid word length 9");
    }
}
