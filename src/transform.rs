//! The intraprocedural transform scaffold (§4.6): every transform here is
//! `apply(graph) -> graph`, pure, and total on already-validated IR.
//!
//! Grounded on the teacher's `librustc_mir::transform` pass convention
//! (`impl MirPass { fn run_pass(&self, ..., body: &mut Body<'_>) }`) minus
//! the in-place mutation: a pass here takes a [`FlowGraph`] snapshot,
//! drives it through a [`FlowGraphBuilder`] (or, for the purely
//! structural `simplify_cfg`, the graph's own `pub(crate)` block-surgery
//! primitives), and hands back a new snapshot. **Delegate lowering** is
//! the canonical hard example named by SPEC_FULL.md §4.6; **simplify-cfg**
//! is the smaller, ambient one, grounded directly on the teacher's
//! `SimplifyCfg`/`CfgSimplifier` (`librustc_mir::transform::simplify`).

use std::collections::{HashMap, HashSet};

use log::{debug, trace};

use crate::builder::FlowGraphBuilder;
use crate::graph::{preorder, FlowGraph};
use crate::inst::{BlockFlow, Instruction};
use crate::proto::{CtorRef, InstructionPrototype, Lookup, MethodRef, PrototypeInterner};
use crate::tag::{BlockTag, TagInterner, ValueTag};
use crate::ty::{Constant, Type, TypeResolver};

/// What delegate lowering needs beyond bare [`TypeResolver`]: the two
/// facts about a nominal delegate type the core cannot derive on its own
/// (its `Invoke` method and its constructor shape), supplied by whatever
/// external type system owns delegate declarations.
pub trait DelegateModel: TypeResolver {
    /// The `Invoke` method an `IndirectCall`/lowered-`NewDelegate` callee
    /// dispatches through, if `delegate_type` names a delegate type.
    fn invoke_method(&self, delegate_type: Type) -> Option<MethodRef>;

    /// The constructor a delegate instance of `delegate_type` is built
    /// with, if it names a delegate type. Its `params` are expected to be
    /// `[bound_object_type, function_pointer_type]`, matching the
    /// `(bound_object_or_null, function_pointer)` shape SPEC_FULL.md
    /// §4.6 describes.
    fn delegate_ctor(&self, delegate_type: Type) -> Option<CtorRef>;
}

/// Lowers two delegate-shaped idioms the core's back ends cannot execute
/// directly into ones they can (§4.6):
///
/// - `IndirectCall` whose callee has delegate type becomes
///   `Call(delegate.Invoke, Virtual)`.
/// - `NewDelegate(delegate_type, callee, hasThis, lookup)` becomes
///   `NewObject(delegate_type.ctor)` applied to `(bound_object_or_null,
///   function_pointer)`, where the function pointer is itself
///   materialized by a nested `NewDelegate` whose result type is the raw
///   function-pointer type (the ctor's second parameter) rather than the
///   delegate type — a two-step lowering that keeps virtual vs. static
///   dispatch intact because `lookup` is threaded through unchanged.
///
/// Instructions this pass does not recognize as delegate-shaped (already
/// a raw function pointer, or an `IndirectCall` over something that
/// isn't callable through `model`) pass through untouched, so running
/// this twice is a no-op.
pub fn lower_delegates(tags: &TagInterner, protos: &PrototypeInterner, model: &dyn DelegateModel, graph: FlowGraph) -> FlowGraph {
    let builder = FlowGraphBuilder::new(tags, graph);
    let instructions = builder.instructions();
    debug!("lower_delegates: scanning {} instruction(s)", instructions.len());

    for view in &instructions {
        let Some(instruction) = view.instruction() else { continue };

        match instruction.prototype.shape().clone() {
            InstructionPrototype::IndirectCall(ret, _params) => {
                let Some(&callee) = instruction.args.first() else { continue };
                let Some(callee_ty) = builder.get_value_type(callee) else { continue };
                let Some(invoke) = model.invoke_method(callee_ty) else { continue };
                trace!("lower_delegates: {:?} indirect_call -> call({})", view.tag(), invoke.name);
                let new_proto = protos.intern(InstructionPrototype::Call(invoke, Lookup::Virtual));
                view.set_instruction(Instruction::new(new_proto, instruction.args.clone()), ret);
            }
            InstructionPrototype::NewDelegate(delegate_type, method, has_this, lookup) => {
                let Some(ctor) = model.delegate_ctor(delegate_type) else { continue };
                let (Some(&object_ty), Some(&fn_ptr_ty)) = (ctor.params.first(), ctor.params.get(1)) else { continue };

                let bound_object = if has_this {
                    match instruction.args.first() {
                        Some(&tag) => tag,
                        None => continue,
                    }
                } else {
                    let null_proto = protos.intern(InstructionPrototype::Constant(Constant::Null, object_ty));
                    view.insert_before(Instruction::new(null_proto, []), "bound_null", object_ty).tag()
                };

                let fn_ptr_proto = protos.intern(InstructionPrototype::NewDelegate(fn_ptr_ty, method, false, lookup));
                let fn_ptr = view.insert_before(Instruction::new(fn_ptr_proto, []), "fn_ptr", fn_ptr_ty).tag();

                trace!("lower_delegates: {:?} new_delegate({:?}) -> new_object(ctor)", view.tag(), delegate_type);
                let new_proto = protos.intern(InstructionPrototype::NewObject(ctor));
                view.set_instruction(Instruction::new(new_proto, [bound_object, fn_ptr]), delegate_type);
            }
            _ => {}
        }
    }

    builder.to_immutable()
}

fn predecessor_counts(graph: &FlowGraph) -> HashMap<BlockTag, usize> {
    let mut counts = HashMap::new();
    for block in preorder(graph) {
        if let Some(bb) = graph.get_basic_block(block) {
            for succ in bb.flow.successors() {
                *counts.entry(succ).or_insert(0) += 1;
            }
        }
    }
    counts
}

/// Collapses `Jump`-only blocks into their single predecessor and drops
/// blocks unreachable from the entry point (§4.6), grounded directly on
/// the teacher's `CfgSimplifier::simplify`: it recomputes predecessor
/// counts from a pre-order traversal on every pass rather than
/// maintaining them incrementally, and only merges a block into its
/// predecessor when that predecessor's sole successor edge is a
/// parameter-less `Jump` and the target has exactly one predecessor
/// overall — conservative by construction around any `Try`/`Switch` edge
/// that has more than one live predecessor, since those never see their
/// target's predecessor count drop to one.
pub fn simplify_cfg(graph: FlowGraph) -> FlowGraph {
    let mut graph = graph;
    loop {
        let preds = predecessor_counts(&graph);
        let mut merged = None;
        for pred in preorder(&graph) {
            let Some(pred_bb) = graph.get_basic_block(pred) else { continue };
            let BlockFlow::Jump(branch) = &pred_bb.flow else { continue };
            let target = branch.target;
            if target == pred || target == graph.entry_point() || !branch.args.is_empty() {
                continue;
            }
            let Some(target_bb) = graph.get_basic_block(target) else { continue };
            if !target_bb.parameters.is_empty() {
                continue;
            }
            if preds.get(&target).copied().unwrap_or(0) != 1 {
                continue;
            }
            merged = Some((pred, target));
            break;
        }

        let Some((pred, target)) = merged else { break };
        debug!("simplify_cfg: merging {:?} into {:?}", target, pred);
        let moved: Vec<ValueTag> = graph.get_basic_block(target).expect("located above").instructions.iter().copied().collect();
        let new_flow = graph.get_basic_block(target).expect("located above").flow.clone();
        graph = graph.truncate_instructions(target, 0);
        graph = graph.rehome_instructions(pred, &moved);
        graph = graph.update_block_flow(pred, new_flow);
        graph = graph.remove_block(target);
    }

    let reachable: HashSet<BlockTag> = preorder(&graph).into_iter().collect();
    let dead: Vec<BlockTag> = graph.block_tags().filter(|b| !reachable.contains(b)).collect();
    for block in dead {
        trace!("simplify_cfg: dropping unreachable block {:?}", block);
        graph = graph.remove_block(block);
    }
    graph
}
