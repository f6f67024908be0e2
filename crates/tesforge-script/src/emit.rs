//! Bytecode writer.
//!
//! Every statement is `opcode: u16, length: u16, payload`. Expressions are
//! stored in reverse Polish notation, each item introduced by a space
//! byte. Lengths and jump counts are written as placeholders and patched
//! once the following bytes are known.

use tesplugin::codec;
use tesplugin::cursor::Writer;
use thiserror::Error;

use crate::ast::{Arg, Call, Expr, SetTarget};
use crate::symbols::VarKind;

/// Statement opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Opcode {
    Begin = 0x10,
    End = 0x11,
    Set = 0x15,
    If = 0x16,
    Else = 0x17,
    ElseIf = 0x18,
    EndIf = 0x19,
    /// Prefix of a function call made on a reference.
    RefCall = 0x1C,
    Return = 0x1E,
}

impl Opcode {
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x10 => Some(Self::Begin),
            0x11 => Some(Self::End),
            0x15 => Some(Self::Set),
            0x16 => Some(Self::If),
            0x17 => Some(Self::Else),
            0x18 => Some(Self::ElseIf),
            0x19 => Some(Self::EndIf),
            0x1C => Some(Self::RefCall),
            0x1E => Some(Self::Return),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

// Expression item codes.
const SEPARATOR: u8 = b' ';
const INT_LITERAL: u8 = b'n';
const FLOAT_LITERAL: u8 = b'z';
const REFERENCE: u8 = b'r';
const GLOBAL: u8 = b'G';
const FUNCTION: u8 = b'X';
const NEGATE: u8 = b'~';

/// A length that does not fit its 16-bit field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{what} too long ({len}, at most 65535)")]
pub struct TooLong {
    pub what: &'static str,
    pub len: usize,
}

fn length(what: &'static str, len: usize) -> Result<u16, TooLong> {
    u16::try_from(len).map_err(|_| TooLong { what, len })
}

/// Appends statements to a growing bytecode buffer. A statement that
/// fails to encode leaves nothing behind.
pub struct Emitter {
    w: Writer,
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Emitter {
    pub fn new() -> Self {
        Self { w: Writer::new() }
    }

    pub fn position(&self) -> usize {
        self.w.position()
    }

    pub fn as_slice(&self) -> &[u8] {
        self.w.as_slice()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.w.into_bytes()
    }

    /// Write `op` and a length placeholder; returns the placeholder position.
    fn open(&mut self, op: Opcode) -> usize {
        self.w.write_u16(op.as_u16());
        let at = self.w.position();
        self.w.write_u16(0);
        at
    }

    fn close(&mut self, at: usize, what: &'static str) -> Result<(), TooLong> {
        let len = length(what, self.w.position() - at - 2)?;
        self.w.patch_u16(at, len);
        Ok(())
    }

    /// Run `f`, dropping whatever it wrote if it fails.
    fn atomic<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, TooLong>) -> Result<T, TooLong> {
        let start = self.w.position();
        let out = f(self);
        if out.is_err() {
            self.w.truncate(start);
        }
        out
    }

    /// A statement with an empty payload (`end`, `endif`, `return`).
    pub fn bare(&mut self, op: Opcode) {
        self.w.write_u16(op.as_u16());
        self.w.write_u16(0);
    }

    /// Begin statement. Returns the position of the block-length field,
    /// to be patched with [`Emitter::patch_block_length`].
    pub fn begin(&mut self, block: u16, args: &[Arg]) -> Result<usize, TooLong> {
        self.atomic(|e| {
            let at = e.open(Opcode::Begin);
            e.w.write_u16(block);
            let length_at = e.w.position();
            e.w.write_u32(0);
            if !args.is_empty() {
                e.w.write_u16(length("argument list", args.len())?);
                for arg in args {
                    e.arg(arg)?;
                }
            }
            e.close(at, "begin statement")?;
            Ok(length_at)
        })
    }

    /// Store the number of bytes written after the begin statement.
    pub fn patch_block_length(&mut self, length_at: usize) {
        let len = self.w.position() - length_at - 4;
        self.w.patch_u32(length_at, u32::try_from(len).unwrap_or(u32::MAX));
    }

    /// `if`/`elseif`. Returns the position of the jump-count placeholder.
    pub fn conditional(&mut self, op: Opcode, condition: &Expr) -> Result<usize, TooLong> {
        self.atomic(|e| {
            let at = e.open(op);
            let jump_at = e.w.position();
            e.w.write_u16(0);
            e.expression_body(condition)?;
            e.close(at, "condition")?;
            Ok(jump_at)
        })
    }

    /// `else`. Returns the position of the jump-count placeholder.
    pub fn else_branch(&mut self) -> usize {
        let at = self.open(Opcode::Else);
        let jump_at = self.w.position();
        self.w.write_u16(0);
        self.w.patch_u16(at, 2);
        jump_at
    }

    pub fn patch_jump(&mut self, jump_at: usize, statements: u16) {
        self.w.patch_u16(jump_at, statements);
    }

    pub fn set(&mut self, target: &SetTarget, value: &Expr) -> Result<(), TooLong> {
        self.atomic(|e| {
            let at = e.open(Opcode::Set);
            match target {
                SetTarget::Local { kind, slot } => {
                    e.w.write_u8(kind.code());
                    e.w.write_u16(*slot);
                }
                SetTarget::Global(index) => {
                    e.w.write_u8(GLOBAL);
                    e.w.write_u16(*index);
                }
                SetTarget::FarVar { owner, var } => {
                    e.w.write_u8(REFERENCE);
                    e.w.write_u16(*owner);
                    e.w.write_u8(var.kind.code());
                    e.w.write_u16(var.slot);
                }
            }
            e.expression_body(value)?;
            e.close(at, "set statement")
        })
    }

    /// A function call used as a statement.
    pub fn call_statement(&mut self, call: &Call) -> Result<(), TooLong> {
        self.atomic(|e| {
            if let Some(target) = call.target {
                e.w.write_u16(Opcode::RefCall.as_u16());
                e.w.write_u16(target);
            }
            e.w.write_u16(call.opcode);
            e.params(call)
        })
    }

    /// Parameter block of a call: byte length, then count and arguments.
    fn params(&mut self, call: &Call) -> Result<(), TooLong> {
        let at = self.w.position();
        self.w.write_u16(0);
        if call.has_params {
            self.w.write_u16(length("argument list", call.args.len())?);
            for arg in &call.args {
                self.arg(arg)?;
            }
        }
        self.close(at, "parameter block")
    }

    fn arg(&mut self, arg: &Arg) -> Result<(), TooLong> {
        match arg {
            Arg::Int(v) => {
                self.w.write_u8(INT_LITERAL);
                self.w.write_i32(*v);
            }
            Arg::Float(v) => {
                self.w.write_u8(FLOAT_LITERAL);
                self.w.write_f64(*v);
            }
            Arg::Short(v) => self.w.write_u16(*v),
            Arg::Ref(index) => {
                self.w.write_u8(REFERENCE);
                self.w.write_u16(*index);
            }
            Arg::Str(s) => {
                self.w.write_u16(length("string argument", s.len())?);
                self.w.write_bytes(s.as_bytes());
            }
            Arg::Local { kind, slot } => {
                self.w.write_u8(kind.code());
                self.w.write_u16(*slot);
            }
            Arg::Global(index) => {
                self.w.write_u8(GLOBAL);
                self.w.write_u16(*index);
            }
        }
        Ok(())
    }

    /// Length-prefixed RPN encoding of `expr`.
    pub fn expression(&mut self, expr: &Expr) -> Result<(), TooLong> {
        self.atomic(|e| e.expression_body(expr))
    }

    fn expression_body(&mut self, expr: &Expr) -> Result<(), TooLong> {
        let at = self.w.position();
        self.w.write_u16(0);
        self.rpn(expr)?;
        self.close(at, "expression")
    }

    fn rpn(&mut self, expr: &Expr) -> Result<(), TooLong> {
        match expr {
            Expr::Binary { op, lhs, rhs } => {
                self.rpn(lhs)?;
                self.rpn(rhs)?;
                self.w.write_u8(SEPARATOR);
                self.w.write_bytes(op.as_str().as_bytes());
            }
            Expr::Neg(inner) => {
                self.rpn(inner)?;
                self.w.write_u8(SEPARATOR);
                self.w.write_u8(NEGATE);
            }
            operand => {
                self.w.write_u8(SEPARATOR);
                self.operand(operand)?;
            }
        }
        Ok(())
    }

    fn operand(&mut self, expr: &Expr) -> Result<(), TooLong> {
        match expr {
            Expr::Int(v) => {
                self.w.write_u8(INT_LITERAL);
                self.w.write_i32(*v);
            }
            Expr::Float(v) => {
                self.w.write_u8(FLOAT_LITERAL);
                self.w.write_f64(*v);
            }
            Expr::Local { kind, slot } => {
                self.w.write_u8(kind.code());
                self.w.write_u16(*slot);
            }
            Expr::Reference(index) => {
                self.w.write_u8(REFERENCE);
                self.w.write_u16(*index);
            }
            Expr::Global(index) => {
                self.w.write_u8(GLOBAL);
                self.w.write_u16(*index);
            }
            Expr::FarVar { owner, var } => {
                self.w.write_u8(REFERENCE);
                self.w.write_u16(*owner);
                self.w.write_u8(var.kind.code());
                self.w.write_u16(var.slot);
            }
            Expr::Call(call) => {
                if let Some(target) = call.target {
                    self.w.write_u8(REFERENCE);
                    self.w.write_u16(target);
                }
                self.w.write_u8(FUNCTION);
                self.w.write_u16(call.opcode);
                self.params(call)?;
            }
            Expr::Binary { .. } | Expr::Neg(_) => self.rpn(expr)?,
        }
        Ok(())
    }
}

/// One statement of encoded bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawStatement<'a> {
    pub offset: usize,
    pub opcode: u16,
    pub payload: &'a [u8],
}

/// Split bytecode into statements. Returns `None` if a length runs past the end.
///
/// Function-call statements share the layout, with the function opcode in
/// place of a statement opcode. A reference-call prefix is reported as its
/// own four-byte statement whose "length" is the target index.
pub fn split_statements(bytecode: &[u8]) -> Option<Vec<RawStatement<'_>>> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < bytecode.len() {
        let opcode = codec::to_u16(codec::take2(bytecode.get(pos..)?)?);
        let len = codec::to_u16(codec::take2(bytecode.get(pos + 2..)?)?) as usize;
        let payload = if opcode == Opcode::RefCall.as_u16() {
            bytecode.get(pos + 2..pos + 4)?
        } else {
            bytecode.get(pos + 4..pos + 4 + len)?
        };
        out.push(RawStatement {
            offset: pos,
            opcode,
            payload,
        });
        pos += if opcode == Opcode::RefCall.as_u16() { 4 } else { 4 + len };
    }
    Some(out)
}

/// Render bytecode as one line per statement, for dumps.
pub fn listing(bytecode: &[u8]) -> String {
    let Some(statements) = split_statements(bytecode) else {
        return format!("<malformed bytecode, {} bytes>", bytecode.len());
    };
    let mut out = String::new();
    for st in statements {
        let name = match Opcode::from_u16(st.opcode) {
            Some(op) => format!("{op:?}"),
            None => format!("Call {:#06x}", st.opcode),
        };
        let hex: Vec<String> = st.payload.iter().map(|b| format!("{b:02X}")).collect();
        out.push_str(&format!("{:04X}  {name:<14} {}\n", st.offset, hex.join(" ")));
    }
    out
}
