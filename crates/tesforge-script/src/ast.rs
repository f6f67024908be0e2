//! Expression tree produced by the parser and consumed by the emitter.
//!
//! Names are already resolved when the tree is built: locals carry their
//! slot, and anything that lives in another record (globals, references,
//! far variables, call targets) carries its 1-based index in the script's
//! reference list.

use crate::lexer::Symbol;
use crate::symbols::{VarKind, Variable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Add,
    Sub,
    Lt,
    Le,
    Ge,
    Gt,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    /// Loosest binding level; an expression is parsed starting here.
    pub const LOOSEST: u8 = 13;

    pub fn from_symbol(symbol: Symbol) -> Option<Self> {
        Some(match symbol {
            Symbol::Star => Self::Mul,
            Symbol::Slash => Self::Div,
            Symbol::Plus => Self::Add,
            Symbol::Minus => Self::Sub,
            Symbol::Lt => Self::Lt,
            Symbol::Le => Self::Le,
            Symbol::Ge => Self::Ge,
            Symbol::Gt => Self::Gt,
            Symbol::Eq => Self::Eq,
            Symbol::Ne => Self::Ne,
            Symbol::And => Self::And,
            Symbol::Or => Self::Or,
            Symbol::LParen | Symbol::RParen | Symbol::Dot | Symbol::Assign => return None,
        })
    }

    /// Binding level. Lower binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            Self::Mul | Self::Div => 4,
            Self::Add | Self::Sub => 5,
            Self::Lt | Self::Le | Self::Ge | Self::Gt => 7,
            Self::Eq | Self::Ne => 8,
            Self::And => 12,
            Self::Or => 13,
        }
    }

    /// Text written into the bytecode for this operator.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mul => "*",
            Self::Div => "/",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Gt => ">",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i32),
    Float(f64),
    /// Numeric local of this script.
    Local { kind: VarKind, slot: u16 },
    /// A reference-list entry used as a value (a ref local or a named object).
    Reference(u16),
    Global(u16),
    /// `owner.variable`, where `owner` is a reference-list index.
    FarVar { owner: u16, var: Variable },
    Call(Call),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Neg(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub opcode: u16,
    /// Reference-list index of the object the function is called on.
    pub target: Option<u16>,
    /// Whether the function declares parameters; parameterless calls carry
    /// no argument count.
    pub has_params: bool,
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Int(i32),
    Float(f64),
    /// Raw 16-bit value: shorts, enum values and axes.
    Short(u16),
    Ref(u16),
    Str(String),
    Local { kind: VarKind, slot: u16 },
    Global(u16),
}

/// Target of a `set` statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SetTarget {
    Local { kind: VarKind, slot: u16 },
    Global(u16),
    FarVar { owner: u16, var: Variable },
}
