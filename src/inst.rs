//! Instantiated instructions and block-terminator flow (§3 "Instruction",
//! "Block Flow", "Branch").
//!
//! An [`Instruction`] only becomes identifiable once a graph gives it an
//! owning [`crate::tag::ValueTag`]; the flow-embedded instructions here
//! (`Return`'s `Copy`, `Switch`'s scrutinee, `Try`'s inner call) stay
//! un-named on purpose — §4.2's `ReplaceInstruction` explicitly operates on
//! such "flow-level (un-named) instructions".

use std::collections::BTreeSet;

use crate::proto::Prototype;
use crate::tag::{BlockTag, ValueTag};
use crate::ty::Constant;

/// A prototype bound to its value-tag operands. Two `Instruction`s are
/// equal iff their prototypes are the *same interned handle* and their
/// argument tags match positionally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub prototype: Prototype,
    pub args: Vec<ValueTag>,
}

impl Instruction {
    pub fn new(prototype: Prototype, args: impl IntoIterator<Item = ValueTag>) -> Self {
        Instruction { prototype, args: args.into_iter().collect() }
    }
}

/// A branch argument's kind, mirroring the three ways a successor block
/// parameter can be fed (§3 Branch / Glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchArgument {
    /// An ordinary SSA value already present in the predecessor block.
    Value(ValueTag),
    /// Only legal on the `success` branch of a `Try` flow: the value
    /// produced by the `Try`'s inner instruction.
    TryResult,
    /// Only legal on the `exception` branch of a `Try` flow: the caught
    /// exception object.
    TryException,
}

impl BranchArgument {
    pub fn as_value(&self) -> Option<ValueTag> {
        match self {
            BranchArgument::Value(tag) => Some(*tag),
            _ => None,
        }
    }
}

/// A target block plus the arguments fed to its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Branch {
    pub target: BlockTag,
    pub args: Vec<BranchArgument>,
}

impl Branch {
    pub fn new(target: BlockTag, args: impl IntoIterator<Item = BranchArgument>) -> Self {
        Branch { target, args: args.into_iter().collect() }
    }

    pub fn values(target: BlockTag, values: impl IntoIterator<Item = ValueTag>) -> Self {
        Branch { target, args: values.into_iter().map(BranchArgument::Value).collect() }
    }
}

/// The terminator of a basic block (§3 Block Flow).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockFlow {
    Jump(Branch),
    /// `None` for a void-returning method (§4.5 point 4: "If return type
    /// is void, omit the operand", which also means no `Copy` is emitted).
    Return(Option<Instruction>),
    Switch {
        scrutinee: Instruction,
        cases: Vec<(BTreeSet<Constant>, Branch)>,
        default: Branch,
    },
    Try {
        inner: Instruction,
        success: Branch,
        exception: Branch,
    },
    Unreachable,
}

impl BlockFlow {
    /// Every branch this flow carries, in a fixed order (`success` before
    /// `exception` for `Try`, case branches before `default` for
    /// `Switch`). Used by the validator (§4.4) and by traversal/analysis
    /// code that needs successors.
    pub fn branches(&self) -> Vec<&Branch> {
        match self {
            BlockFlow::Jump(b) => vec![b],
            BlockFlow::Return(_) => vec![],
            BlockFlow::Switch { cases, default, .. } => {
                let mut out: Vec<&Branch> = cases.iter().map(|(_, b)| b).collect();
                out.push(default);
                out
            }
            BlockFlow::Try { success, exception, .. } => vec![success, exception],
            BlockFlow::Unreachable => vec![],
        }
    }

    pub fn branches_mut(&mut self) -> Vec<&mut Branch> {
        match self {
            BlockFlow::Jump(b) => vec![b],
            BlockFlow::Return(_) => vec![],
            BlockFlow::Switch { cases, default, .. } => {
                let mut out: Vec<&mut Branch> = cases.iter_mut().map(|(_, b)| b).collect();
                out.push(default);
                out
            }
            BlockFlow::Try { success, exception, .. } => vec![success, exception],
            BlockFlow::Unreachable => vec![],
        }
    }

    pub fn successors(&self) -> Vec<BlockTag> {
        self.branches().into_iter().map(|b| b.target).collect()
    }

    /// A default terminator for a freshly added, still-unwired block
    /// (§8 property 1: `add_block` yields a block whose flow is
    /// `Unreachable`).
    pub fn unreachable_default() -> Self {
        BlockFlow::Unreachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::InstructionPrototype;
    use crate::tag::TagInterner;
    use crate::ty::TypeTable;

    #[test]
    fn jump_reports_one_successor() {
        let interner = TagInterner::new();
        let target = interner.fresh_block("target");
        let flow = BlockFlow::Jump(Branch::values(target, []));
        assert_eq!(flow.successors(), vec![target]);
    }

    #[test]
    fn switch_orders_cases_before_default() {
        let interner = TagInterner::new();
        let types = TypeTable::new();
        let protos = crate::proto::PrototypeInterner::new();
        let i32t = types.int(32, true);
        let scrutinee_tag = interner.fresh_value("scrutinee");
        let scrutinee = Instruction::new(protos.intern(InstructionPrototype::Copy(i32t)), [scrutinee_tag]);
        let case_target = interner.fresh_block("case");
        let default_target = interner.fresh_block("default");
        let mut cases = BTreeSet::new();
        cases.insert(Constant::i32(1));
        let flow = BlockFlow::Switch {
            scrutinee,
            cases: vec![(cases, Branch::values(case_target, []))],
            default: Branch::values(default_target, []),
        };
        assert_eq!(flow.successors(), vec![case_target, default_target]);
    }

    #[test]
    fn unreachable_default_has_no_successors() {
        assert!(BlockFlow::unreachable_default().successors().is_empty());
    }
}
