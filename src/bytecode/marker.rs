use std::fmt::Display;

use crate::ast::ops::{BinaryOp, UnaryOp};

/// Single byte tags of the bytecode format.
///
/// Values are fixed by declaration order, starting at 0.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    Error,
    SymbolDef,
    Word,
    Byte,
    BlockWord,
    BlockByte,
    Automatic,
    Address,
    Offset,
    Function,
    If,
    Assignment,
    Jump,
    Return,
    Expression,
    Literal,
    SymbolRef,
    FunctionCall,
    Operation,
    ReferenceOp,
    DereferenceOp,
    AddOp,
    SubtractOp,
    MultiplyOp,
    DivideOp,
    ExponentOp,
    ModuloOp,
    AndOp,
    OrOp,
    XorOp,
    NotOp,
    RotateLeftOp,
    RotateRightOp,
}

impl Marker {
    /// Every marker, indexed by its byte value
    pub const ALL: [Marker; 33] = [
        Self::Error,
        Self::SymbolDef,
        Self::Word,
        Self::Byte,
        Self::BlockWord,
        Self::BlockByte,
        Self::Automatic,
        Self::Address,
        Self::Offset,
        Self::Function,
        Self::If,
        Self::Assignment,
        Self::Jump,
        Self::Return,
        Self::Expression,
        Self::Literal,
        Self::SymbolRef,
        Self::FunctionCall,
        Self::Operation,
        Self::ReferenceOp,
        Self::DereferenceOp,
        Self::AddOp,
        Self::SubtractOp,
        Self::MultiplyOp,
        Self::DivideOp,
        Self::ExponentOp,
        Self::ModuloOp,
        Self::AndOp,
        Self::OrOp,
        Self::XorOp,
        Self::NotOp,
        Self::RotateLeftOp,
        Self::RotateRightOp,
    ];

    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.get(byte as usize).copied()
    }

    pub fn unary(op: UnaryOp) -> Self {
        match op {
            UnaryOp::Reference => Self::ReferenceOp,
            UnaryOp::Dereference => Self::DereferenceOp,
            UnaryOp::Not => Self::NotOp,
        }
    }

    pub fn binary(op: BinaryOp) -> Self {
        match op {
            BinaryOp::Add => Self::AddOp,
            BinaryOp::Sub => Self::SubtractOp,
            BinaryOp::Mul => Self::MultiplyOp,
            BinaryOp::Div => Self::DivideOp,
            BinaryOp::Exp => Self::ExponentOp,
            BinaryOp::Mod => Self::ModuloOp,
            BinaryOp::And => Self::AndOp,
            BinaryOp::Or => Self::OrOp,
            BinaryOp::Xor => Self::XorOp,
            BinaryOp::RotateLeft => Self::RotateLeftOp,
            BinaryOp::RotateRight => Self::RotateRightOp,
        }
    }

    pub fn as_unary(&self) -> Option<UnaryOp> {
        Some(match self {
            Self::ReferenceOp => UnaryOp::Reference,
            Self::DereferenceOp => UnaryOp::Dereference,
            Self::NotOp => UnaryOp::Not,
            _ => return None,
        })
    }

    pub fn as_binary(&self) -> Option<BinaryOp> {
        Some(match self {
            Self::AddOp => BinaryOp::Add,
            Self::SubtractOp => BinaryOp::Sub,
            Self::MultiplyOp => BinaryOp::Mul,
            Self::DivideOp => BinaryOp::Div,
            Self::ExponentOp => BinaryOp::Exp,
            Self::ModuloOp => BinaryOp::Mod,
            Self::AndOp => BinaryOp::And,
            Self::OrOp => BinaryOp::Or,
            Self::XorOp => BinaryOp::Xor,
            Self::RotateLeftOp => BinaryOp::RotateLeft,
            Self::RotateRightOp => BinaryOp::RotateRight,
            _ => return None,
        })
    }
}

impl Display for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{self:?}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_marker_values() {
        for (i, marker) in Marker::ALL.iter().enumerate() {
            assert_eq!(*marker as usize, i);
            assert_eq!(Marker::from_byte(i as u8), Some(*marker));
        }
        assert_eq!(Marker::Return as u8, 13);
        assert_eq!(Marker::RotateRightOp as u8, 32);
        assert_eq!(Marker::from_byte(33), None);
    }

    #[test]
    fn test_operator_markers() {
        for marker in Marker::ALL {
            if let Some(op) = marker.as_binary() {
                assert_eq!(Marker::binary(op), marker);
            }
            if let Some(op) = marker.as_unary() {
                assert_eq!(Marker::unary(op), marker);
            }
        }
        assert_eq!(Marker::binary(BinaryOp::RotateLeft), Marker::RotateLeftOp);
        assert_eq!(Marker::Automatic.as_binary(), None);
        assert_eq!(Marker::AddOp.to_string(), "bAddOp");
    }
}
