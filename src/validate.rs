//! The IR validator (§4.4): checks every instruction's conformance, every
//! block's flow shape, and every branch's target/arity/argument types,
//! reporting through an [`ErrorSink`] rather than panicking (§3
//! invariants, §7 "validator errors are ordinary, recoverable
//! diagnostics").
//!
//! Grounded on the teacher's `librustc_mir::transform::validate`, which
//! runs the same three passes (per-statement, per-terminator,
//! per-successor) and reports through the same `Session`-backed
//! diagnostic sink rather than `bug!`-ing on the first problem found.

use crate::diag::{Diagnostic, ErrorSink};
use crate::error::IrResult;
use crate::graph::FlowGraph;
use crate::inst::{Branch, BranchArgument, BlockFlow};
use crate::proto::ExceptionSpec;
use crate::ty::TypeResolver;

/// Walks every block and instruction of `graph`, pushing one [`Diagnostic`]
/// per violation into `sink`. Returns `Err` only if `sink` itself aborts
/// (`Wfatal-errors`/`fmax-errors`); a validator that merely finds problems
/// reports them all and returns `Ok(())`, leaving the decision to keep
/// going to the driver.
pub fn validate(graph: &FlowGraph, types: &dyn TypeResolver, sink: &mut ErrorSink) -> IrResult<()> {
    for block in graph.block_tags() {
        let bb = graph.get_basic_block(block).expect("block_tags() yields existing blocks");

        for &inst_tag in bb.instructions.iter() {
            let inst = graph.get_instruction(inst_tag).expect("instruction tag in block list must resolve");
            let arg_types: Vec<_> = inst
                .args
                .iter()
                .map(|arg| {
                    graph.get_value_type(*arg).ok_or(*arg)
                })
                .collect();
            for (arg, result) in inst.args.iter().zip(&arg_types) {
                if result.is_err() {
                    sink.push(Diagnostic::error(
                        "dangling value reference",
                        format!("instruction {:?} in block {:?} references {:?}, which has no known type", inst_tag, block, arg),
                    ))?;
                }
            }
            let resolved: Vec<_> = arg_types.iter().filter_map(|r| r.ok()).collect();
            if resolved.len() == arg_types.len() {
                for message in inst.prototype.check_conformance(&resolved, types) {
                    sink.push(Diagnostic::error(
                        "instruction does not conform to its prototype",
                        format!("{:?} in block {:?}: {}", inst_tag, block, message),
                    ))?;
                }
            }
        }

        validate_flow(block, &bb.flow, sink)?;

        for branch in bb.flow.branches() {
            validate_branch(graph, block, branch, sink)?;
        }
    }
    Ok(())
}

fn validate_flow(block: crate::tag::BlockTag, flow: &BlockFlow, sink: &mut ErrorSink) -> IrResult<()> {
    match flow {
        BlockFlow::Try { inner, success, exception } => {
            if inner.prototype.exception_spec() != ExceptionSpec::MayThrow {
                sink.push(Diagnostic::error(
                    "Try flow wraps a non-throwing instruction",
                    format!("block {:?}'s Try.inner cannot throw; use Jump instead", block),
                ))?;
            }
            if exception.args.iter().any(|a| matches!(a, BranchArgument::TryResult)) {
                sink.push(Diagnostic::error(
                    "TryResult fed on the wrong branch",
                    format!("block {:?}'s exception branch may not carry TryResult", block),
                ))?;
            }
            if success.args.iter().any(|a| matches!(a, BranchArgument::TryException)) {
                sink.push(Diagnostic::error(
                    "TryException fed on the wrong branch",
                    format!("block {:?}'s success branch may not carry TryException", block),
                ))?;
            }
        }
        _ => {
            for branch in flow.branches() {
                if branch.args.iter().any(|a| matches!(a, BranchArgument::TryResult | BranchArgument::TryException)) {
                    sink.push(Diagnostic::error(
                        "TryResult/TryException used outside Try flow",
                        format!("block {:?} feeds a Try-only argument kind from non-Try flow", block),
                    ))?;
                }
            }
        }
    }
    Ok(())
}

fn validate_branch(graph: &FlowGraph, from: crate::tag::BlockTag, branch: &Branch, sink: &mut ErrorSink) -> IrResult<()> {
    let Some(target_bb) = graph.get_basic_block(branch.target) else {
        sink.push(Diagnostic::error(
            "branch to unknown block",
            format!("block {:?} branches to {:?}, which does not exist in this graph", from, branch.target),
        ))?;
        return Ok(());
    };

    if branch.args.len() != target_bb.parameters.len() {
        sink.push(Diagnostic::error(
            "branch arity mismatch",
            format!(
                "block {:?} passes {} argument(s) to {:?}, which declares {} parameter(s)",
                from, branch.args.len(), branch.target, target_bb.parameters.len(),
            ),
        ))?;
        return Ok(());
    }

    for (arg, param) in branch.args.iter().zip(target_bb.parameters.iter()) {
        if let BranchArgument::Value(value_tag) = arg {
            match graph.get_value_type(*value_tag) {
                Some(actual) if actual != param.ty => {
                    sink.push(Diagnostic::error(
                        "branch argument type mismatch",
                        format!(
                            "block {:?} feeds {:?} of the wrong type to {:?}'s parameter {:?}",
                            from, value_tag, branch.target, param.tag,
                        ),
                    ))?;
                }
                None => {
                    sink.push(Diagnostic::error(
                        "dangling branch argument",
                        format!("block {:?} feeds unknown value {:?} to {:?}", from, value_tag, branch.target),
                    ))?;
                }
                _ => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FlowGraphBuilder;
    use crate::inst::Instruction;
    use crate::proto::{InstructionPrototype, PrototypeInterner};
    use crate::tag::TagInterner;
    use crate::ty::{Constant, TypeTable};

    fn harness() -> (TagInterner, std::sync::Arc<TypeTable>, std::sync::Arc<PrototypeInterner>) {
        (TagInterner::new(), TypeTable::new(), PrototypeInterner::new())
    }

    #[test]
    fn well_formed_graph_reports_no_errors() {
        let (tags, types, protos) = harness();
        let graph = FlowGraph::new(&tags);
        let builder = FlowGraphBuilder::new(&tags, graph);
        let entry = builder.entry_point();
        let i32t = types.int(32, true);
        let proto = protos.intern(InstructionPrototype::Constant(Constant::i32(1), i32t));
        let c = builder.block(entry).append_instruction(Instruction::new(proto, []), "c", i32t);
        builder.update_block_flow(
            entry,
            BlockFlow::Return(Some(Instruction::new(protos.intern(InstructionPrototype::Copy(i32t)), [c.tag()]))),
        );

        let mut sink = ErrorSink::new(Default::default());
        validate(&builder.to_immutable(), &*types, &mut sink).unwrap();
        assert!(!sink.has_errors());
    }

    #[test]
    fn branch_to_missing_block_is_reported() {
        let (tags, _types, _protos) = harness();
        let graph = FlowGraph::new(&tags);
        let builder = FlowGraphBuilder::new(&tags, graph);
        let entry = builder.entry_point();
        let ghost = tags.fresh_block("ghost");
        builder.update_block_flow(entry, BlockFlow::Jump(Branch::values(ghost, [])));

        let types = TypeTable::new();
        let mut sink = ErrorSink::new(Default::default());
        validate(&builder.to_immutable(), &*types, &mut sink).unwrap();
        assert!(sink.has_errors());
    }

    #[test]
    fn branch_arity_mismatch_is_reported() {
        let (tags, types, _protos) = harness();
        let graph = FlowGraph::new(&tags);
        let builder = FlowGraphBuilder::new(&tags, graph);
        let entry = builder.entry_point();
        let target = builder.add_block("target");
        let i32t = types.int(32, true);
        let param_tag = tags.fresh_value("p");
        builder.block(target).set_parameters(vec![crate::graph::BlockParameter { tag: param_tag, ty: i32t }]);
        builder.update_block_flow(entry, BlockFlow::Jump(Branch::values(target, [])));

        let mut sink = ErrorSink::new(Default::default());
        validate(&builder.to_immutable(), &*types, &mut sink).unwrap();
        assert!(sink.has_errors());
    }

    #[test]
    fn try_wrapping_a_non_throwing_instruction_is_reported() {
        let (tags, types, protos) = harness();
        let graph = FlowGraph::new(&tags);
        let builder = FlowGraphBuilder::new(&tags, graph);
        let entry = builder.entry_point();
        let i32t = types.int(32, true);
        let handler = builder.add_block("handler");
        let success = builder.add_block("success");
        let copy_proto = protos.intern(InstructionPrototype::Copy(i32t));
        let arg = tags.fresh_value("x");
        builder.block(entry).set_parameters(vec![crate::graph::BlockParameter { tag: arg, ty: i32t }]);
        builder.update_block_flow(
            entry,
            BlockFlow::Try {
                inner: Instruction::new(copy_proto, [arg]),
                success: Branch::new(success, [BranchArgument::TryResult]),
                exception: Branch::values(handler, []),
            },
        );

        let mut sink = ErrorSink::new(Default::default());
        validate(&builder.to_immutable(), &*types, &mut sink).unwrap();
        assert!(sink.has_errors());
    }
}
