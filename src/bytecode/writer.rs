use log::trace;

use crate::symbol::SPECIALS;

use super::{
    Block, BlockUnit, Expression, FormatError, FormatErrorKind, Function, HEADER_PREFIX,
    HEADER_SUFFIX, MAX_WORD_LENGTH, Marker, Program, Section, Statement, Storage, Variable,
    VariableKind,
};

type WriteResult = Result<(), FormatError>;

pub(super) struct Writer {
    out: Vec<u8>,
    word_length: usize,
    section: Section,
}

impl Writer {
    pub fn new(word_length: usize) -> Self {
        Self {
            out: vec![],
            word_length,
            section: Section::Header,
        }
    }

    fn fail(&self, kind: FormatErrorKind) -> FormatError {
        FormatError::new(self.section, kind).at(self.out.len())
    }

    fn marker(&mut self, marker: Marker) {
        self.out.push(marker as u8);
    }

    /// Writes `value` as one big-endian word.
    fn word(&mut self, value: u64) -> WriteResult {
        let bits = self.word_length * 8;
        if bits < 64 && value >> bits != 0 {
            return Err(self.fail(FormatErrorKind::WordOverflow(value)));
        }

        let bytes = value.to_be_bytes();
        self.out.extend_from_slice(&bytes[bytes.len() - self.word_length..]);
        Ok(())
    }

    fn count(&mut self, count: usize) -> WriteResult {
        self.word(count as u64)
    }

    fn words(&mut self, values: &[u64]) -> WriteResult {
        self.count(values.len())?;
        for value in values {
            self.word(*value)?;
        }
        Ok(())
    }

    pub fn program(mut self, program: &Program) -> Result<Vec<u8>, FormatError> {
        self.header()?;
        self.identifiers(&program.identifiers)?;
        self.variables(program)?;

        self.section = Section::Imports;
        self.words(&program.imports)?;

        self.section = Section::Statements;
        if program.statements.is_empty() {
            return Err(self.fail(FormatErrorKind::MissingStatement));
        }
        self.statements(&program.statements)?;

        self.section = Section::Literals;
        for literal in &program.literals {
            self.count(literal.len())?;
            self.out.extend_from_slice(literal);
        }

        trace!("encoded {} bytes", self.out.len());
        Ok(self.out)
    }

    fn header(&mut self) -> WriteResult {
        if !(1..=MAX_WORD_LENGTH).contains(&self.word_length) {
            return Err(self.fail(FormatErrorKind::WordLength(self.word_length)));
        }

        let header = format!("{HEADER_PREFIX}{}{HEADER_SUFFIX}", self.word_length);
        self.out.extend_from_slice(header.as_bytes());
        Ok(())
    }

    fn identifiers(&mut self, identifiers: &[String]) -> WriteResult {
        self.section = Section::Identifiers;
        if identifiers.len() < SPECIALS.len()
            || identifiers.iter().zip(SPECIALS).any(|(id, special)| id != special)
        {
            return Err(self.fail(FormatErrorKind::Specials));
        }

        self.count(identifiers.len())?;
        for id in identifiers {
            if id.is_empty() || id.contains('\n') {
                return Err(self.fail(FormatErrorKind::Identifier));
            }
            self.out.extend_from_slice(id.as_bytes());
            self.out.push(b'\n');
        }
        Ok(())
    }

    fn variables(&mut self, program: &Program) -> WriteResult {
        self.section = Section::Variables;

        let named = program.identifiers.len();
        if program.variables.len() < named {
            return Err(self.fail(FormatErrorKind::VariableCount {
                variables: program.variables.len() as u64,
                identifiers: named as u64,
            }));
        }

        self.count(program.variables.len())?;
        for (i, var) in program.variables.iter().enumerate() {
            let index = i as u64 + 1;
            if i < SPECIALS.len() {
                if var != &Variable::special(index) {
                    return Err(self.fail(FormatErrorKind::Specials));
                }
            } else if i < named {
                // Named entries take their identifier from their position
                if var.identifier != index {
                    return Err(self.fail(FormatErrorKind::UnresolvedIdentifier(var.identifier)));
                }
                self.variable(var)?;
            } else {
                self.word(var.identifier)?;
                self.variable(var)?;
            }
        }
        Ok(())
    }

    fn variable(&mut self, var: &Variable) -> WriteResult {
        match var.storage {
            Storage::Automatic => self.marker(Marker::Automatic),
            Storage::Address => self.marker(Marker::Address),
            Storage::Offset { parent, offset } => {
                self.marker(Marker::Offset);
                self.word(parent)?;
                self.word(offset)?;
            }
        }

        match &var.kind {
            VariableKind::Special => return Err(self.fail(FormatErrorKind::Specials)),
            VariableKind::Word => self.marker(Marker::Word),
            VariableKind::Byte => self.marker(Marker::Byte),
            VariableKind::Block(block) => self.block(block)?,
            VariableKind::Function(func) => self.function(func)?,
        }
        Ok(())
    }

    fn block(&mut self, block: &Block) -> WriteResult {
        self.marker(match block.unit {
            BlockUnit::Byte => Marker::BlockByte,
            BlockUnit::Word => Marker::BlockWord,
        });
        self.word(block.length)?;
        self.count(block.members.len())?;
        for member in &block.members {
            self.word(member.offset)?;
            self.word(member.statement)?;
        }
        Ok(())
    }

    fn function(&mut self, func: &Function) -> WriteResult {
        self.marker(Marker::Function);
        self.word(func.params)?;
        self.word(func.returns)?;
        self.count(func.frame.len())?;
        for local in &func.frame {
            self.word(local.identifier)?;
            self.variable(local)?;
        }
        self.word(func.body_start)?;
        self.word(func.body_len)
    }

    fn statements(&mut self, stmts: &[Statement]) -> WriteResult {
        self.count(stmts.len())?;
        for stmt in stmts {
            self.statement(stmt)?;
        }
        Ok(())
    }

    fn statement(&mut self, stmt: &Statement) -> WriteResult {
        match stmt {
            Statement::Automatic { variables, value } => {
                self.marker(Marker::Automatic);
                self.words(variables)?;
                self.expression(value)
            }
            Statement::Address { variable, value } => {
                self.marker(Marker::Address);
                self.word(*variable)?;
                self.expression(value)
            }
            Statement::Offset { variable } => {
                self.marker(Marker::Offset);
                self.word(*variable)
            }
            Statement::If { condition, body } => {
                self.marker(Marker::If);
                self.expression(condition)?;
                if body.is_empty() {
                    return Err(self.fail(FormatErrorKind::MissingStatement));
                }
                self.statements(body)
            }
            Statement::Assignment { variables, value } => {
                self.marker(Marker::Assignment);
                self.words(variables)?;
                self.expression(value)
            }
            Statement::Jump { target } => {
                self.marker(Marker::Jump);
                self.expression(target)
            }
            Statement::Return => {
                self.marker(Marker::Return);
                Ok(())
            }
        }
    }

    fn expression(&mut self, expr: &Expression) -> WriteResult {
        match expr {
            Expression::Literal(index) => {
                self.marker(Marker::Literal);
                self.word(*index)
            }
            Expression::SymbolRef(variable) => {
                self.marker(Marker::SymbolRef);
                self.word(*variable)
            }
            Expression::FunctionCall {
                callee,
                args,
                receivers,
            } => {
                self.marker(Marker::FunctionCall);
                self.expression(callee)?;
                self.count(args.len())?;
                for arg in args {
                    self.expression(arg)?;
                }
                self.words(receivers)
            }
            Expression::Unary(op, operand) => {
                self.marker(Marker::unary(*op));
                self.expression(operand)
            }
            Expression::Binary(op, lhs, rhs) => {
                self.marker(Marker::binary(*op));
                self.expression(lhs)?;
                self.expression(rhs)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn return_only(word_length: usize) -> Program {
        let mut program = Program::new(word_length);
        program.statements = vec![Statement::Return];
        program
    }

    #[test]
    fn test_minimal_program() {
        let bytes = Writer::new(2).program(&return_only(2)).unwrap();

        let mut expected = b"Version 0.0\nArch.: 2bytes/word\n".to_vec();
        expected.extend([0, 6]);
        expected.extend(b"_\n_sp\n_fp\n_ip\n_text\n_data\n");
        expected.extend([0, 6]); // variables
        expected.extend([0, 0]); // imports
        expected.extend([0, 1, Marker::Return as u8]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_word_overflow() {
        let mut program = return_only(1);
        program.imports = vec![256];

        let err = Writer::new(1).program(&program).unwrap_err();
        assert_eq!(err.section, Section::Imports);
        assert_eq!(err.kind, FormatErrorKind::WordOverflow(256));
    }

    #[test]
    fn test_word_length_bounds() {
        for word_length in [0, 9] {
            let err = Writer::new(word_length)
                .program(&return_only(word_length))
                .unwrap_err();
            assert_eq!(err.kind, FormatErrorKind::WordLength(word_length));
        }
    }

    #[test]
    fn test_missing_statement() {
        let err = Writer::new(8).program(&Program::new(8)).unwrap_err();
        assert_eq!(err.kind, FormatErrorKind::MissingStatement);

        let mut program = return_only(8);
        program.statements.push(Statement::If {
            condition: Expression::SymbolRef(1),
            body: vec![],
        });
        let err = Writer::new(8).program(&program).unwrap_err();
        assert_eq!(err.kind, FormatErrorKind::MissingStatement);
    }

    #[test]
    fn test_bad_identifiers() {
        let mut program = return_only(8);
        program.identifiers[2] = "_xx".to_string();
        let err = Writer::new(8).program(&program).unwrap_err();
        assert_eq!(err.kind, FormatErrorKind::Specials);

        let mut program = return_only(8);
        program.identifiers.push("a\nb".to_string());
        program.variables.push(Variable {
            identifier: 7,
            storage: Storage::Address,
            kind: VariableKind::Word,
        });
        let err = Writer::new(8).program(&program).unwrap_err();
        assert_eq!(err.kind, FormatErrorKind::Identifier);
    }
}
