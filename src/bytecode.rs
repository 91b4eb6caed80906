use crate::{
    ast::ops::{BinaryOp, UnaryOp},
    symbol::SPECIALS,
};

/// Format errors and the sections they are found in
pub mod error;

/// Byte tags of the format
pub mod marker;

/// Human-readable listing of a program
mod listing;

/// Bytecode reader
mod reader;

/// Cross reference checks shared by the reader and the writer
mod validate;

/// Bytecode writer
mod writer;

pub use error::{FormatError, FormatErrorKind, Section};
pub use marker::Marker;

/// First line of every file and the start of the second.
pub const HEADER_PREFIX: &str = "Version 0.0\nArch.: ";

/// Closes the word length declaration of the header.
pub const HEADER_SUFFIX: &str = "bytes/word\n";

/// The largest supported word, so every word fits a `u64`.
pub const MAX_WORD_LENGTH: usize = 8;

pub const DEFAULT_WORD_LENGTH: usize = 8;

/// Deepest nesting of statements, expressions and function frames a file may
/// hold.
pub const MAX_DEPTH: usize = 256;

/// Root frame index of the `_ip` special.
pub const INSTRUCTION_POINTER: u64 = 4;

/// A whole bytecode file.
///
/// Variable, identifier, statement and literal references are all 1-based,
/// with 0 meaning "none".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    /// Bytes per word
    pub word_length: usize,
    /// Names of the root frame; the first six are always [`SPECIALS`]
    pub identifiers: Vec<String>,
    /// The root frame
    pub variables: Vec<Variable>,
    /// Variables supplied from outside the file
    pub imports: Vec<u64>,
    /// Top-level code first, then every function body
    pub statements: Vec<Statement>,
    /// Big-endian literal values
    pub literals: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Identifier index, 0 when anonymous
    pub identifier: u64,
    pub storage: Storage,
    pub kind: VariableKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// Lives on the call stack for the duration of a call
    Automatic,
    /// Bound once to a computed location
    Address,
    /// A view into the block variable `parent`, `offset` bytes in
    Offset { parent: u64, offset: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableKind {
    /// One of the six predeclared registers; has no bytes of its own
    Special,
    Word,
    Byte,
    Block(Block),
    Function(Function),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockUnit {
    Byte,
    Word,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// What `length` is counted in
    pub unit: BlockUnit,
    pub length: u64,
    pub members: Vec<Member>,
}

/// A named offset inside a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    /// In bytes
    pub offset: u64,
    /// Pre-order number of the `bOffset` statement declaring the member
    pub statement: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub params: u64,
    pub returns: u64,
    /// Parameters, then return values, then locals
    pub frame: Vec<Variable>,
    /// 1-based position of the body in the statement stream
    pub body_start: u64,
    /// Number of top-level statements in the body
    pub body_len: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Automatic {
        variables: Vec<u64>,
        value: Expression,
    },
    Address {
        variable: u64,
        value: Expression,
    },
    Offset {
        variable: u64,
    },
    If {
        condition: Expression,
        body: Vec<Statement>,
    },
    Assignment {
        variables: Vec<u64>,
        value: Expression,
    },
    Jump {
        target: Expression,
    },
    Return,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// Literal pool index
    Literal(u64),
    SymbolRef(u64),
    FunctionCall {
        callee: Box<Expression>,
        args: Vec<Expression>,
        /// Variables receiving the return values
        receivers: Vec<u64>,
    },
    Unary(UnaryOp, Box<Expression>),
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
}

impl Variable {
    pub fn special(identifier: u64) -> Self {
        Self {
            identifier,
            storage: Storage::Address,
            kind: VariableKind::Special,
        }
    }

    /// Width in bytes of one element of the variable.
    pub fn ref_length(&self, word_length: usize) -> u64 {
        match &self.kind {
            VariableKind::Byte
            | VariableKind::Block(Block {
                unit: BlockUnit::Byte,
                ..
            }) => 1,
            _ => word_length as u64,
        }
    }

    /// Size in bytes of the whole variable.
    pub fn length(&self, word_length: usize) -> u64 {
        match &self.kind {
            VariableKind::Byte => 1,
            VariableKind::Block(block) => block.byte_length(word_length),
            _ => word_length as u64,
        }
    }
}

impl Block {
    pub fn byte_length(&self, word_length: usize) -> u64 {
        match self.unit {
            BlockUnit::Byte => self.length,
            BlockUnit::Word => self.length.saturating_mul(word_length as u64),
        }
    }
}

impl Statement {
    /// Visits the statement and every nested statement in pre-order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Statement)) {
        visit(self);
        if let Self::If { body, .. } = self {
            for stmt in body {
                stmt.walk(visit);
            }
        }
    }
}

impl Program {
    /// An empty program holding only the special variables.
    pub fn new(word_length: usize) -> Self {
        Self {
            word_length,
            identifiers: SPECIALS.iter().map(|s| s.to_string()).collect(),
            variables: (1..=SPECIALS.len() as u64).map(Variable::special).collect(),
            imports: vec![],
            statements: vec![],
            literals: vec![],
        }
    }

    /// Serializes the program, after checking its cross references.
    pub fn encode(&self) -> Result<Vec<u8>, FormatError> {
        validate::validate(self)?;
        writer::Writer::new(self.word_length).program(self)
    }

    /// Reads and checks a whole bytecode file.
    pub fn decode(bytes: &[u8]) -> Result<Self, FormatError> {
        let program = reader::Reader::new(bytes).program()?;
        validate::validate(&program)?;
        Ok(program)
    }

    /// The variables listed in the import table.
    pub fn imported(&self) -> impl Iterator<Item = &Variable> {
        self.imports
            .iter()
            .filter_map(|i| self.variables.get((*i as usize).checked_sub(1)?))
    }

    /// Every statement in pre-order; member statement numbers index into it.
    pub fn preorder(&self) -> Vec<&Statement> {
        let mut all = vec![];
        for stmt in &self.statements {
            stmt.walk(&mut |stmt| all.push(stmt));
        }
        all
    }

    /// Name of the variable at a root frame index, if it has one.
    pub fn name_of(&self, variable: u64) -> Option<&str> {
        let var = self.variables.get((variable as usize).checked_sub(1)?)?;
        let id = (var.identifier as usize).checked_sub(1)?;
        self.identifiers.get(id).map(String::as_str)
    }

    /// Decodes a literal pool entry.
    pub fn literal_value(&self, index: u64) -> Option<u64> {
        let bytes = self.literals.get((index as usize).checked_sub(1)?)?;
        if bytes.len() > 8 {
            return None;
        }
        Some(bytes.iter().fold(0, |acc, b| (acc << 8) | *b as u64))
    }
}

/// Minimal big-endian bytes of a value, at least one.
pub fn literal_bytes(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count().min(bytes.len() - 1);
    bytes[skip..].to_vec()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_literal_bytes() {
        assert_eq!(literal_bytes(0), vec![0]);
        assert_eq!(literal_bytes(5), vec![5]);
        assert_eq!(literal_bytes(0x1234), vec![0x12, 0x34]);
        assert_eq!(literal_bytes(u64::MAX), vec![0xFF; 8]);
    }

    #[test]
    fn test_instruction_pointer() {
        assert_eq!(SPECIALS[INSTRUCTION_POINTER as usize - 1], "_ip");
    }

    #[test]
    fn test_literal_value() {
        let mut program = Program::new(8);
        program.literals = vec![literal_bytes(300), vec![0; 9]];
        assert_eq!(program.literal_value(1), Some(300));
        assert_eq!(program.literal_value(2), None);
        assert_eq!(program.literal_value(0), None);
        assert_eq!(program.literal_value(3), None);
    }

    #[test]
    fn test_preorder() {
        let mut program = Program::new(8);
        program.statements = vec![
            Statement::If {
                condition: Expression::SymbolRef(1),
                body: vec![Statement::Offset { variable: 1 }, Statement::Return],
            },
            Statement::Return,
        ];

        let all = program.preorder();
        assert_eq!(all.len(), 4);
        assert_eq!(all[1], &Statement::Offset { variable: 1 });
        assert_eq!(all[3], &Statement::Return);
    }

    #[test]
    fn test_lengths() {
        let block = Variable {
            identifier: 0,
            storage: Storage::Automatic,
            kind: VariableKind::Block(Block {
                unit: BlockUnit::Word,
                length: 3,
                members: vec![],
            }),
        };
        assert_eq!(block.ref_length(4), 4);
        assert_eq!(block.length(4), 12);

        let byte = Variable {
            kind: VariableKind::Byte,
            ..block.clone()
        };
        assert_eq!(byte.ref_length(4), 1);
        assert_eq!(byte.length(4), 1);
    }

    #[test]
    fn test_names() {
        let program = Program::new(8);
        assert_eq!(program.name_of(4), Some("_ip"));
        assert_eq!(program.name_of(0), None);
        assert_eq!(program.name_of(7), None);
    }
}
