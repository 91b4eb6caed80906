//! Disassembler.
use std::fmt::{self, Display, Write};

use super::{BlockUnit, Expression, Program, Statement, Storage, Variable, VariableKind};

const INDENT: &str = "    ";

impl Program {
    /// Renders a variable reference, by name when it is a named root variable.
    fn operand(&self, variable: u64) -> String {
        match self.name_of(variable) {
            Some(name) => name.to_string(),
            None => format!("${variable}"),
        }
    }

    fn write_variable<W: Write>(
        &self,
        w: &mut W,
        index: u64,
        var: &Variable,
        depth: usize,
    ) -> fmt::Result {
        let name = match (var.identifier as usize).checked_sub(1) {
            Some(id) => self.identifiers.get(id).map(String::as_str).unwrap_or("?"),
            None => "",
        };
        write!(w, "{}{index:>4} {name:<8}", INDENT.repeat(depth))?;

        match var.storage {
            Storage::Automatic => write!(w, " automatic")?,
            Storage::Address => write!(w, " address")?,
            Storage::Offset { parent, offset } => {
                write!(w, " offset {}+{offset}", self.operand(parent))?
            }
        }

        match &var.kind {
            VariableKind::Special => writeln!(w, " special"),
            VariableKind::Word => writeln!(w, " word"),
            VariableKind::Byte => writeln!(w, " byte"),
            VariableKind::Block(block) => {
                let unit = match block.unit {
                    BlockUnit::Byte => "bytes",
                    BlockUnit::Word => "words",
                };
                write!(w, " block {} {unit}", block.length)?;
                for member in &block.members {
                    write!(w, " [+{} @{}]", member.offset, member.statement)?;
                }
                writeln!(w)
            }
            VariableKind::Function(func) => {
                writeln!(
                    w,
                    " function params={} returns={} body={}+{}",
                    func.params, func.returns, func.body_start, func.body_len
                )?;
                for (i, local) in func.frame.iter().enumerate() {
                    self.write_variable(w, i as u64 + 1, local, depth + 1)?;
                }
                Ok(())
            }
        }
    }

    fn write_expression<W: Write>(&self, w: &mut W, expr: &Expression) -> fmt::Result {
        match expr {
            Expression::Literal(index) => match self.literal_value(*index) {
                Some(value) => write!(w, "{value}"),
                None => write!(w, "#{index}"),
            },
            Expression::SymbolRef(variable) => write!(w, "{}", self.operand(*variable)),
            Expression::FunctionCall { callee, args, .. } => {
                write!(w, "(")?;
                for arg in args {
                    self.write_expression(w, arg)?;
                    write!(w, ", ")?;
                }
                self.write_expression(w, callee)?;
                write!(w, ")")
            }
            Expression::Unary(op, operand) => {
                self.write_expression(w, operand)?;
                write!(w, " {op}")
            }
            Expression::Binary(op, lhs, rhs) => {
                self.write_expression(w, lhs)?;
                write!(w, " ")?;
                self.write_expression(w, rhs)?;
                write!(w, " {op}")
            }
        }
    }

    fn write_targets<W: Write>(&self, w: &mut W, variables: &[u64]) -> fmt::Result {
        let names = variables
            .iter()
            .map(|v| self.operand(*v))
            .collect::<Vec<_>>();
        write!(w, "{}", names.join(", "))
    }

    /// Writes a statement and its nested statements, numbering them in
    /// pre-order.
    fn write_statement<W: Write>(
        &self,
        w: &mut W,
        stmt: &Statement,
        number: &mut u64,
        depth: usize,
    ) -> fmt::Result {
        *number += 1;
        write!(w, "{:>5} {}", *number, INDENT.repeat(depth))?;

        match stmt {
            Statement::Automatic { variables, value } => {
                self.write_targets(w, variables)?;
                write!(w, " := ")?;
                self.write_expression(w, value)?;
            }
            Statement::Address { variable, value } => {
                write!(w, "{}: ", self.operand(*variable))?;
                self.write_expression(w, value)?;
            }
            Statement::Offset { variable } => write!(w, "offset {}", self.operand(*variable))?,
            Statement::If { condition, body } => {
                write!(w, "if ")?;
                self.write_expression(w, condition)?;
                writeln!(w)?;
                for stmt in body {
                    self.write_statement(w, stmt, number, depth + 1)?;
                }
                return Ok(());
            }
            Statement::Assignment { variables, value } => {
                self.write_targets(w, variables)?;
                write!(w, " = ")?;
                self.write_expression(w, value)?;
            }
            Statement::Jump { target } => {
                write!(w, "jump ")?;
                self.write_expression(w, target)?;
            }
            Statement::Return => write!(w, "return")?,
        }

        writeln!(w)
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; Version 0.0, {} bytes/word", self.word_length)?;

        writeln!(f, "variables:")?;
        for (i, var) in self.variables.iter().enumerate() {
            self.write_variable(f, i as u64 + 1, var, 1)?;
        }

        writeln!(f, "imports:")?;
        for import in &self.imports {
            writeln!(f, "{INDENT}{import:>4} {}", self.operand(*import))?;
        }

        writeln!(f, "statements:")?;
        let mut number = 0;
        for (i, stmt) in self.statements.iter().enumerate() {
            write!(f, "{:>4}", i + 1)?;
            self.write_statement(f, stmt, &mut number, 0)?;
        }

        writeln!(f, "literals:")?;
        for (i, literal) in self.literals.iter().enumerate() {
            let hex = literal
                .iter()
                .map(|b| format!("{b:02X}"))
                .collect::<String>();
            writeln!(f, "{INDENT}{:>4} {hex}", i + 1)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        ast::ops::{BinaryOp, UnaryOp},
        bytecode::Function,
    };

    #[test]
    fn test_listing() {
        let mut program = Program::new(8);
        program.identifiers.push("f".to_string());
        program.variables.push(Variable {
            identifier: 7,
            storage: Storage::Address,
            kind: VariableKind::Function(Function {
                params: 1,
                returns: 0,
                frame: vec![Variable {
                    identifier: 0,
                    storage: Storage::Automatic,
                    kind: VariableKind::Byte,
                }],
                body_start: 2,
                body_len: 1,
            }),
        });
        program.literals = vec![vec![0x2A]];
        program.statements = vec![
            Statement::If {
                condition: Expression::Unary(UnaryOp::Not, Box::new(Expression::SymbolRef(2))),
                body: vec![Statement::Jump {
                    target: Expression::SymbolRef(7),
                }],
            },
            Statement::Assignment {
                variables: vec![8],
                value: Expression::Binary(
                    BinaryOp::Add,
                    Box::new(Expression::SymbolRef(8)),
                    Box::new(Expression::Literal(1)),
                ),
            },
        ];

        let listing = program.to_string();
        assert!(listing.contains("   7 f        address function params=1 returns=0 body=2+1"));
        assert!(listing.contains("   1          automatic byte"));
        assert!(listing.contains("if _sp !"));
        assert!(listing.contains("    2     jump f"));
        assert!(listing.contains("$8 = $8 42 +"));
        assert!(listing.contains("   1 2A"));
    }
}
