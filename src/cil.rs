//! A CIL-family stack-machine bytecode model (§4.5 "Bytecode input").
//!
//! Instructions form an explicit linked chain via `next` rather than
//! relying on contiguous indices, mirroring how verifiable CIL treats
//! instruction offsets as opaque jump targets rather than as an array
//! index a translator is free to just increment. [`crate::translate`]
//! walks this chain, not `instructions[i + 1]`.

use crate::proto::{CtorRef, MethodRef};
use crate::ty::{Constant, Type};

/// A single CIL-family opcode, widened (§4.5 point 4) beyond the
/// illustrative three-opcode set to cover constant loads, locals/args,
/// arithmetic, comparisons, both unconditional and conditional branches,
/// calls (static/virtual), object construction, function pointers,
/// casts, `throw`, and `ret`.
#[derive(Debug, Clone, PartialEq)]
pub enum Opcode {
    Nop,
    Dup,
    Pop,
    Ldc(Constant),
    LdArg(u16),
    StArg(u16),
    LdLoc(u16),
    StLoc(u16),
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Neg,
    Not,
    Ceq,
    Cgt,
    Clt,
    /// Unconditional branch to the instruction at this index.
    Br(usize),
    Brtrue(usize),
    Brfalse(usize),
    Beq(usize),
    Bne(usize),
    Bgt(usize),
    Blt(usize),
    Bge(usize),
    Ble(usize),
    Call(MethodRef),
    CallVirt(MethodRef),
    NewObj(CtorRef),
    Ldftn(MethodRef),
    LdVirtFtn(MethodRef),
    CastClass(Type),
    IsInst(Type),
    Throw,
    Ret,
    /// An opcode this model does not carry a dedicated variant for; kept
    /// so `analyze_block` can surface `IrError::NotSupportedOperation`
    /// naming it rather than requiring the enum itself stay open (§4.5
    /// point 4: "anything else raises `NotSupportedOperation`").
    Unsupported(&'static str),
}

impl Opcode {
    /// The instruction index(es) this opcode can transfer control to,
    /// other than (implicitly) falling through to `next` — used by
    /// branch-target analysis (§4.5 point 1) to compute leaders.
    pub fn branch_targets(&self) -> Vec<usize> {
        match self {
            Opcode::Br(t)
            | Opcode::Brtrue(t)
            | Opcode::Brfalse(t)
            | Opcode::Beq(t)
            | Opcode::Bne(t)
            | Opcode::Bgt(t)
            | Opcode::Blt(t)
            | Opcode::Bge(t)
            | Opcode::Ble(t) => vec![*t],
            _ => vec![],
        }
    }

    /// `true` if control never falls through past this opcode to `next`
    /// (unconditional branch, `ret`, `throw`).
    pub fn is_block_terminal(&self) -> bool {
        matches!(self, Opcode::Br(_) | Opcode::Ret | Opcode::Throw)
    }
}

/// One instruction in the chain: an opcode plus the index of the next
/// instruction to execute when this one falls through. `None` only for a
/// `ret`/`throw`/unconditional `Br`, where there is no fall-through.
#[derive(Debug, Clone, PartialEq)]
pub struct CilInstruction {
    pub opcode: Opcode,
    pub next: Option<usize>,
}

/// A whole method body in bytecode form, ready for translation (§4.5).
#[derive(Debug, Clone)]
pub struct CilBody {
    pub instructions: Vec<CilInstruction>,
    pub entry: usize,
    pub this_type: Option<Type>,
    pub params: Vec<Type>,
    pub locals: Vec<Type>,
    pub return_type: Type,
}
