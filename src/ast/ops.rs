use std::fmt::{Debug, Display};

use crate::token::Terminal;

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Exp,
    Mod,
    And,
    Or,
    Xor,
    RotateLeft,
    RotateRight,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Address-of
    Reference,
    /// Pointer dereference
    Dereference,
    /// Bitwise not
    Not,
}

/// An operator as it appears in an expression.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Unary(UnaryOp),
    Binary(BinaryOp),
}

impl Op {
    pub fn parsed(terminal: Terminal) -> Option<Self> {
        Some(match terminal {
            Terminal::Add => Self::Binary(BinaryOp::Add),
            Terminal::Sub => Self::Binary(BinaryOp::Sub),
            Terminal::Mult => Self::Binary(BinaryOp::Mul),
            Terminal::Div => Self::Binary(BinaryOp::Div),
            Terminal::Exp => Self::Binary(BinaryOp::Exp),
            Terminal::Mod => Self::Binary(BinaryOp::Mod),
            Terminal::And => Self::Binary(BinaryOp::And),
            Terminal::Or => Self::Binary(BinaryOp::Or),
            Terminal::Xor => Self::Binary(BinaryOp::Xor),
            Terminal::ShiftL => Self::Binary(BinaryOp::RotateLeft),
            Terminal::ShiftR => Self::Binary(BinaryOp::RotateRight),
            Terminal::Not => Self::Unary(UnaryOp::Not),
            _ => return None,
        })
    }

    /// Number of operands the operator pops off the operand stack
    pub fn arity(&self) -> usize {
        match self {
            Self::Unary(_) => 1,
            Self::Binary(_) => 2,
        }
    }
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Add => "+",
                Self::Sub => "-",
                Self::Mul => "*",
                Self::Div => "/",
                Self::Exp => "**",
                Self::Mod => "%",
                Self::And => "&",
                Self::Or => "|",
                Self::Xor => "^",
                Self::RotateLeft => "<<",
                Self::RotateRight => ">>",
            }
        )
    }
}

impl Debug for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Reference => "ref",
                Self::Dereference => "deref",
                Self::Not => "!",
            }
        )
    }
}

impl Debug for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}
