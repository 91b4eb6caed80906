use log::trace;

use crate::symbol::SPECIALS;

use super::{
    Block, BlockUnit, Expression, FormatError, FormatErrorKind, Function, HEADER_PREFIX,
    HEADER_SUFFIX, MAX_DEPTH, MAX_WORD_LENGTH, Marker, Member, Program, Section, Statement, Storage,
    Variable, VariableKind,
};

type ReadResult<T> = Result<T, FormatError>;

/// Reads the sections of a bytecode file strictly in order.
pub(super) struct Reader<'a> {
    bytes: &'a [u8],
    cursor: usize,
    word_length: usize,
    section: Section,
    /// Statements, expressions and variables currently being read
    depth: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            cursor: 0,
            word_length: 0,
            section: Section::Header,
            depth: 0,
        }
    }

    fn fail(&self, kind: FormatErrorKind) -> FormatError {
        FormatError::new(self.section, kind).at(self.cursor)
    }

    /// Runs `read` one nesting level deeper.
    fn nested<T>(&mut self, read: impl FnOnce(&mut Self) -> ReadResult<T>) -> ReadResult<T> {
        if self.depth >= MAX_DEPTH {
            return Err(self.fail(FormatErrorKind::Nesting(MAX_DEPTH)));
        }

        self.depth += 1;
        let result = read(self);
        self.depth -= 1;
        result
    }

    fn at_end(&self) -> bool {
        self.cursor >= self.bytes.len()
    }

    fn take(&mut self, len: usize) -> ReadResult<&'a [u8]> {
        let end = self
            .cursor
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| self.fail(FormatErrorKind::Truncated))?;

        let bytes = self.bytes;
        let slice = &bytes[self.cursor..end];
        self.cursor = end;
        Ok(slice)
    }

    fn byte(&mut self) -> ReadResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn marker(&mut self) -> ReadResult<Marker> {
        let byte = self.byte()?;
        Marker::from_byte(byte).ok_or_else(|| self.fail(FormatErrorKind::Marker(byte)))
    }

    fn word(&mut self) -> ReadResult<u64> {
        let bytes = self.take(self.word_length)?;
        Ok(bytes.iter().fold(0, |acc, b| (acc << 8) | *b as u64))
    }

    fn words(&mut self) -> ReadResult<Vec<u64>> {
        let count = self.word()?;
        (0..count).map(|_| self.word()).collect()
    }

    fn expect(&mut self, text: &str, kind: FormatErrorKind) -> ReadResult<()> {
        let start = self.cursor;
        match self.take(text.len()) {
            Ok(bytes) if bytes == text.as_bytes() => Ok(()),
            _ => Err(FormatError::new(self.section, kind).at(start)),
        }
    }

    /// Reads up to and including the next newline.
    fn line(&mut self) -> ReadResult<&'a str> {
        let len = self.bytes[self.cursor..]
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| self.fail(FormatErrorKind::Truncated))?;

        let start = self.cursor;
        let line = self.take(len + 1)?;
        std::str::from_utf8(&line[..len])
            .map_err(|_| FormatError::new(self.section, FormatErrorKind::Identifier).at(start))
    }

    pub fn program(mut self) -> ReadResult<Program> {
        self.header()?;
        let identifiers = self.identifiers()?;
        let variables = self.variables(identifiers.len())?;

        self.section = Section::Imports;
        let imports = self.words()?;

        self.section = Section::Statements;
        let statements = self.statements()?;

        self.section = Section::Literals;
        let mut literals = vec![];
        while !self.at_end() {
            let len = self.word()?;
            let len = usize::try_from(len).map_err(|_| self.fail(FormatErrorKind::Truncated))?;
            literals.push(self.take(len)?.to_vec());
        }

        trace!(
            "decoded {} variables, {} statements, {} literals",
            variables.len(),
            statements.len(),
            literals.len()
        );

        Ok(Program {
            word_length: self.word_length,
            identifiers,
            variables,
            imports,
            statements,
            literals,
        })
    }

    fn header(&mut self) -> ReadResult<()> {
        self.expect(HEADER_PREFIX, FormatErrorKind::Header)?;

        let start = self.cursor;
        let digits = self.bytes[start..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        let text = self.take(digits)?;

        // Only the canonical spelling survives a round trip
        let header = || FormatError::new(Section::Header, FormatErrorKind::Header).at(start);
        if text.len() > 1 && text[0] == b'0' {
            return Err(header());
        }

        let word_length = std::str::from_utf8(text)
            .ok()
            .and_then(|text| text.parse::<usize>().ok())
            .ok_or_else(header)?;
        if !(1..=MAX_WORD_LENGTH).contains(&word_length) {
            return Err(
                FormatError::new(Section::Header, FormatErrorKind::WordLength(word_length))
                    .at(start),
            );
        }
        self.word_length = word_length;

        self.expect(HEADER_SUFFIX, FormatErrorKind::Header)
    }

    fn identifiers(&mut self) -> ReadResult<Vec<String>> {
        self.section = Section::Identifiers;
        let count = self.word()?;
        if count < SPECIALS.len() as u64 {
            return Err(self.fail(FormatErrorKind::Specials));
        }

        let specials = SPECIALS.map(|s| format!("{s}\n")).concat();
        self.expect(&specials, FormatErrorKind::Specials)?;

        let mut identifiers: Vec<String> = SPECIALS.iter().map(|s| s.to_string()).collect();
        for _ in SPECIALS.len() as u64..count {
            let start = self.cursor;
            let id = self.line()?;
            if id.is_empty() {
                return Err(FormatError::new(self.section, FormatErrorKind::Identifier).at(start));
            }
            identifiers.push(id.to_string());
        }

        Ok(identifiers)
    }

    fn variables(&mut self, named: usize) -> ReadResult<Vec<Variable>> {
        self.section = Section::Variables;
        let count = self.word()?;
        if count < named as u64 {
            return Err(self.fail(FormatErrorKind::VariableCount {
                variables: count,
                identifiers: named as u64,
            }));
        }

        let mut variables = vec![];
        for index in 1..=count {
            let var = if index <= SPECIALS.len() as u64 {
                Variable::special(index)
            } else if index <= named as u64 {
                self.variable(index)?
            } else {
                let identifier = self.word()?;
                self.variable(identifier)?
            };
            variables.push(var);
        }

        Ok(variables)
    }

    fn variable(&mut self, identifier: u64) -> ReadResult<Variable> {
        self.nested(|reader| reader.variable_body(identifier))
    }

    fn variable_body(&mut self, identifier: u64) -> ReadResult<Variable> {
        let storage = match self.marker()? {
            Marker::Automatic => Storage::Automatic,
            Marker::Address => Storage::Address,
            Marker::Offset => Storage::Offset {
                parent: self.word()?,
                offset: self.word()?,
            },
            other => return Err(self.unexpected(other)),
        };

        let kind = match self.marker()? {
            Marker::Word => VariableKind::Word,
            Marker::Byte => VariableKind::Byte,
            Marker::BlockByte => VariableKind::Block(self.block(BlockUnit::Byte)?),
            Marker::BlockWord => VariableKind::Block(self.block(BlockUnit::Word)?),
            Marker::Function => VariableKind::Function(self.function()?),
            other => return Err(self.unexpected(other)),
        };

        Ok(Variable {
            identifier,
            storage,
            kind,
        })
    }

    /// Error for a marker just read in the wrong place.
    fn unexpected(&self, marker: Marker) -> FormatError {
        FormatError::new(self.section, FormatErrorKind::Marker(marker as u8))
            .at(self.cursor.saturating_sub(1))
    }

    fn block(&mut self, unit: BlockUnit) -> ReadResult<Block> {
        let length = self.word()?;
        let count = self.word()?;
        let members = (0..count)
            .map(|_| {
                Ok(Member {
                    offset: self.word()?,
                    statement: self.word()?,
                })
            })
            .collect::<ReadResult<Vec<_>>>()?;

        Ok(Block {
            unit,
            length,
            members,
        })
    }

    fn function(&mut self) -> ReadResult<Function> {
        let params = self.word()?;
        let returns = self.word()?;

        let count = self.word()?;
        let mut frame = vec![];
        for _ in 0..count {
            let identifier = self.word()?;
            frame.push(self.variable(identifier)?);
        }

        Ok(Function {
            params,
            returns,
            frame,
            body_start: self.word()?,
            body_len: self.word()?,
        })
    }

    /// A statement count of at least one, then the statements.
    fn statements(&mut self) -> ReadResult<Vec<Statement>> {
        let count = self.word()?;
        if count == 0 {
            return Err(self.fail(FormatErrorKind::MissingStatement));
        }
        (0..count).map(|_| self.statement()).collect()
    }

    fn statement(&mut self) -> ReadResult<Statement> {
        self.nested(Self::statement_body)
    }

    fn statement_body(&mut self) -> ReadResult<Statement> {
        Ok(match self.marker()? {
            Marker::Automatic => Statement::Automatic {
                variables: self.words()?,
                value: self.expression()?,
            },
            Marker::Address => Statement::Address {
                variable: self.word()?,
                value: self.expression()?,
            },
            Marker::Offset => Statement::Offset {
                variable: self.word()?,
            },
            Marker::If => Statement::If {
                condition: self.expression()?,
                body: self.statements()?,
            },
            Marker::Assignment => Statement::Assignment {
                variables: self.words()?,
                value: self.expression()?,
            },
            Marker::Jump => Statement::Jump {
                target: self.expression()?,
            },
            Marker::Return => Statement::Return,
            other => return Err(self.unexpected(other)),
        })
    }

    fn expression(&mut self) -> ReadResult<Expression> {
        self.nested(Self::expression_body)
    }

    fn expression_body(&mut self) -> ReadResult<Expression> {
        let marker = self.marker()?;
        Ok(match marker {
            Marker::Literal => Expression::Literal(self.word()?),
            Marker::SymbolRef => Expression::SymbolRef(self.word()?),
            Marker::FunctionCall => {
                let callee = Box::new(self.expression()?);
                let count = self.word()?;
                let args = (0..count)
                    .map(|_| self.expression())
                    .collect::<ReadResult<Vec<_>>>()?;
                Expression::FunctionCall {
                    callee,
                    args,
                    receivers: self.words()?,
                }
            }
            other => {
                if let Some(op) = other.as_unary() {
                    Expression::Unary(op, Box::new(self.expression()?))
                } else if let Some(op) = other.as_binary() {
                    let lhs = self.expression()?;
                    let rhs = self.expression()?;
                    Expression::Binary(op, Box::new(lhs), Box::new(rhs))
                } else {
                    return Err(self.unexpected(other));
                }
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn header(word_length: usize) -> Vec<u8> {
        let mut bytes = format!("Version 0.0\nArch.: {word_length}bytes/word\n").into_bytes();
        bytes.extend(&6u64.to_be_bytes()[8 - word_length..]);
        bytes.extend(b"_\n_sp\n_fp\n_ip\n_text\n_data\n");
        bytes
    }

    fn read(bytes: &[u8]) -> ReadResult<Program> {
        Reader::new(bytes).program()
    }

    #[test]
    fn test_header_errors() {
        let err = read(b"Version 1.0\n").unwrap_err();
        assert_eq!((err.section, err.kind), (Section::Header, FormatErrorKind::Header));

        let err = read(b"Version 0.0\nArch.: bytes/word\n").unwrap_err();
        assert_eq!(err.kind, FormatErrorKind::Header);

        let err = read(b"Version 0.0\nArch.: 16bytes/word\n").unwrap_err();
        assert_eq!(err.kind, FormatErrorKind::WordLength(16));
        assert_eq!(err.position, Some(19));

        let err = read(b"Version 0.0\nArch.: 2bits/word\n").unwrap_err();
        assert_eq!(err.kind, FormatErrorKind::Header);

        let err = read(b"Version 0.0\nArch.: 0bytes/word\n").unwrap_err();
        assert_eq!(err.kind, FormatErrorKind::WordLength(0));
    }

    #[test]
    fn test_leading_zero_word_length() {
        let mut bytes = b"Version 0.0\nArch.: 02bytes/word\n".to_vec();
        bytes.extend(&header(2)[HEADER_PREFIX.len() + 1 + HEADER_SUFFIX.len()..]);
        bytes.extend([0, 6, 0, 0, 0, 1, Marker::Return as u8]);

        let err = read(&bytes).unwrap_err();
        assert_eq!((err.section, err.kind), (Section::Header, FormatErrorKind::Header));
        assert_eq!(err.position, Some(HEADER_PREFIX.len()));
    }

    #[test]
    fn test_deep_expression() {
        let mut bytes = header(1);
        bytes.extend([6, 0, 1, Marker::Jump as u8]);
        bytes.extend(vec![Marker::NotOp as u8; 200_000]);
        bytes.extend([Marker::SymbolRef as u8, 1]);

        let err = read(&bytes).unwrap_err();
        assert_eq!(
            (err.section, err.kind),
            (Section::Statements, FormatErrorKind::Nesting(MAX_DEPTH))
        );

        // Just inside the limit, counting the jump statement itself
        let mut bytes = header(1);
        bytes.extend([6, 0, 1, Marker::Jump as u8]);
        bytes.extend(vec![Marker::NotOp as u8; MAX_DEPTH - 2]);
        bytes.extend([Marker::SymbolRef as u8, 1]);
        assert!(read(&bytes).is_ok());
    }

    #[test]
    fn test_deep_frames() {
        // Functions whose single local is again a function, without end
        let mut bytes = header(1);
        bytes.extend([7, 0]);
        for _ in 0..1_000 {
            bytes.extend([Marker::Automatic as u8, Marker::Function as u8, 0, 0, 1, 0]);
        }

        let err = read(&bytes).unwrap_err();
        assert_eq!(
            (err.section, err.kind),
            (Section::Variables, FormatErrorKind::Nesting(MAX_DEPTH))
        );
    }

    #[test]
    fn test_missing_specials() {
        let mut bytes = b"Version 0.0\nArch.: 2bytes/word\n".to_vec();
        bytes.extend([0, 6]);
        bytes.extend(b"_\n_sp\n_fp\n_ip\n_data\n_text\n");
        let err = read(&bytes).unwrap_err();
        assert_eq!((err.section, err.kind), (Section::Identifiers, FormatErrorKind::Specials));
    }

    #[test]
    fn test_truncated() {
        let mut bytes = header(2);
        bytes.extend([0, 7]);
        bytes.extend(b"name");
        let err = read(&bytes).unwrap_err();
        assert_eq!((err.section, err.kind), (Section::Identifiers, FormatErrorKind::Truncated));

        let mut bytes = header(2);
        bytes.extend([0]);
        let err = read(&bytes).unwrap_err();
        assert_eq!((err.section, err.kind), (Section::Variables, FormatErrorKind::Truncated));
    }

    #[test]
    fn test_missing_statement() {
        let mut bytes = header(2);
        bytes.extend([0, 6, 0, 0, 0, 0]);
        let err = read(&bytes).unwrap_err();
        assert_eq!(
            (err.section, err.kind),
            (Section::Statements, FormatErrorKind::MissingStatement)
        );
    }

    #[test]
    fn test_unexpected_marker() {
        let mut bytes = header(2);
        bytes.extend([0, 6, 0, 0, 0, 1, Marker::Word as u8]);
        let err = read(&bytes).unwrap_err();
        assert_eq!(err.kind, FormatErrorKind::Marker(Marker::Word as u8));
        assert_eq!(err.position, Some(bytes.len() - 1));

        let mut bytes = header(2);
        bytes.extend([0, 6, 0, 0, 0, 1, 200]);
        let err = read(&bytes).unwrap_err();
        assert_eq!(err.kind, FormatErrorKind::Marker(200));
    }

    #[test]
    fn test_statements_and_literals() {
        let mut bytes = header(1);
        bytes.extend([6, 0]);
        bytes.extend([
            2,
            Marker::Jump as u8,
            Marker::AddOp as u8,
            Marker::SymbolRef as u8,
            4,
            Marker::Literal as u8,
            1,
            Marker::If as u8,
            Marker::NotOp as u8,
            Marker::SymbolRef as u8,
            1,
            1,
            Marker::Return as u8,
        ]);
        bytes.extend([2, 0x01, 0x00]);

        let program = read(&bytes).unwrap();
        assert_eq!(program.word_length, 1);
        assert_eq!(program.literals, vec![vec![1, 0]]);
        assert_eq!(
            program.statements[0],
            Statement::Jump {
                target: Expression::Binary(
                    crate::ast::ops::BinaryOp::Add,
                    Box::new(Expression::SymbolRef(4)),
                    Box::new(Expression::Literal(1)),
                )
            }
        );
        assert!(matches!(
            &program.statements[1],
            Statement::If { body, .. } if body == &vec![Statement::Return]
        ));
    }
}
