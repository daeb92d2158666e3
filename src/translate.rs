//! The bytecode-to-IR translator (§4.5): lifts a [`CilBody`] stack
//! machine into a [`MethodBody`] by abstract interpretation of the
//! operand stack, one basic block at a time.
//!
//! Grounded on the teacher's `librustc_mir_build::build`, which performs
//! the analogous "lower a different representation's control flow into
//! MIR one block at a time, tracking enough local state to know what
//! value a later instruction refers to" translation, and on the CIL
//! abstract-interpretation techniques documented for stack-machine IRs
//! generally (widened per SPEC_FULL.md §4.5 point 4 to a realistic
//! opcode table rather than the illustrative three-opcode set).

use std::collections::{HashMap, HashSet, VecDeque};

use log::{debug, trace};
use smallvec::SmallVec;

use crate::builder::FlowGraphBuilder;
use crate::cil::{CilBody, Opcode};
use crate::error::{IrError, IrResult};
use crate::graph::{BlockParameter, FlowGraph, MethodBody};
use crate::inst::{Branch, BranchArgument, BlockFlow, Instruction};
use crate::proto::{ExceptionSpec, InstructionPrototype, Lookup, PrototypeInterner};
use crate::tag::{BlockTag, QualifiedName, TagInterner, ValueTag};
use crate::ty::{Constant, Type, TypeResolver, TypeTable};

/// What the translator needs beyond bare [`TypeResolver`]: a way to turn
/// a constructor's declared owner into a concrete [`Type`], since the
/// core's [`InstructionPrototype::NewObject`] cannot mint one on its own
/// (proto.rs's documented `result_type` limitation).
pub trait TranslatorEnv: TypeResolver {
    fn resolve_named_type(&self, name: &QualifiedName) -> Type;
}

/// Computes every leader instruction index (§4.5 point 1): the entry,
/// every branch target, and every instruction immediately following a
/// conditional branch (its fall-through is a second successor, hence a
/// block boundary of its own).
fn compute_leaders(cil: &CilBody) -> Vec<usize> {
    let mut leaders = std::collections::BTreeSet::new();
    leaders.insert(cil.entry);
    for inst in &cil.instructions {
        for target in inst.opcode.branch_targets() {
            leaders.insert(target);
        }
        if !inst.opcode.is_block_terminal() {
            continue;
        }
        // A terminal instruction's `next` (if any, e.g. dead code after a
        // `ret`) would start its own block too, but since it is
        // unreachable from here we don't force it into the leader set;
        // unreachable code is simply never visited by the worklist below.
    }
    for inst in &cil.instructions {
        if matches!(inst.opcode, Opcode::Brtrue(_) | Opcode::Brfalse(_) | Opcode::Beq(_) | Opcode::Bne(_) | Opcode::Bgt(_) | Opcode::Blt(_) | Opcode::Bge(_) | Opcode::Ble(_)) {
            if let Some(next) = inst.next {
                leaders.insert(next);
            }
        }
    }
    leaders.into_iter().collect()
}

struct Env<'a> {
    cil: &'a CilBody,
    tags: &'a TagInterner,
    types: &'a TypeTable,
    protos: &'a PrototypeInterner,
    env: &'a dyn TranslatorEnv,
    slot_addrs: Vec<ValueTag>,
    slot_types: Vec<Type>,
    leader_blocks: HashMap<usize, BlockTag>,
}

/// Translates `cil` into a [`MethodBody`] (§4.5). `tags` must be the same
/// interner the returned graph's tags were minted from if the caller
/// intends to keep editing it through a [`FlowGraphBuilder`] afterwards.
pub fn translate(
    cil: &CilBody,
    tags: &TagInterner,
    types: &TypeTable,
    protos: &PrototypeInterner,
    env: &dyn TranslatorEnv,
) -> IrResult<MethodBody> {
    let leaders = compute_leaders(cil);
    debug!("translate: {} leader(s) found by branch-target analysis", leaders.len());

    let graph = FlowGraph::new(tags);
    let builder = FlowGraphBuilder::new(tags, graph);
    let setup_block = builder.entry_point();

    // Entry-point setup (§4.5 point 2): this (if present), then
    // parameters, then locals, each get an `Alloca` slot; `this`/params
    // are immediately `Store`d from the method's extended-parameter block
    // parameters, locals start uninitialized.
    let mut extended_types = Vec::new();
    if let Some(this_ty) = cil.this_type {
        extended_types.push(this_ty);
    }
    extended_types.extend(cil.params.iter().copied());

    let incoming_params: Vec<BlockParameter> =
        extended_types.iter().map(|ty| BlockParameter { tag: tags.fresh_value("arg"), ty: *ty }).collect();
    builder.block(setup_block).set_parameters(incoming_params.clone());

    let mut slot_addrs = Vec::new();
    let mut slot_types = Vec::new();
    let unmanaged = crate::ty::PointerKind::Unmanaged;
    for (incoming, ty) in incoming_params.iter().zip(extended_types.iter()) {
        let addr_ty = types.pointer(*ty, unmanaged);
        let alloca = builder.block(setup_block).append_instruction(
            Instruction::new(protos.intern(InstructionPrototype::Alloca(*ty)), []),
            "slot",
            addr_ty,
        );
        builder.block(setup_block).append_instruction(
            Instruction::new(protos.intern(InstructionPrototype::Store(*ty)), [alloca.tag(), incoming.tag]),
            "init",
            types.void(),
        );
        slot_addrs.push(alloca.tag());
        slot_types.push(*ty);
    }
    for ty in &cil.locals {
        let addr_ty = types.pointer(*ty, unmanaged);
        let alloca = builder.block(setup_block).append_instruction(
            Instruction::new(protos.intern(InstructionPrototype::Alloca(*ty)), []),
            "local_slot",
            addr_ty,
        );
        slot_addrs.push(alloca.tag());
        slot_types.push(*ty);
    }

    // One host block per leader, minted up front so forward branches
    // never need a placeholder.
    let mut leader_blocks: HashMap<usize, BlockTag> = HashMap::new();
    for &leader in &leaders {
        leader_blocks.insert(leader, builder.add_block("cil_block"));
    }
    builder.update_block_flow(setup_block, BlockFlow::Jump(Branch::values(leader_blocks[&cil.entry], [])));

    let mut leader_param_types: HashMap<usize, Vec<Type>> = HashMap::new();
    let mut visited: HashSet<usize> = HashSet::new();
    let mut queue: VecDeque<(usize, Vec<ValueTag>)> = VecDeque::new();
    queue.push_back((cil.entry, Vec::new()));

    let ctx = Env { cil, tags, types, protos, env, slot_addrs, slot_types, leader_blocks: leader_blocks.clone() };

    while let Some((leader, incoming_values)) = queue.pop_front() {
        let incoming_types: Vec<Type> = incoming_values
            .iter()
            .map(|tag| builder.get_value_type(*tag).expect("pushed values are always typed"))
            .collect();

        if let Some(recorded) = leader_param_types.get(&leader) {
            if *recorded != incoming_types {
                return Err(IrError::malformed(format!(
                    "incompatible stack contents at CIL offset {}: expected {} value(s), saw a disagreeing shape",
                    leader,
                    recorded.len(),
                )));
            }
            if visited.contains(&leader) {
                continue;
            }
        }

        let target_block = leader_blocks[&leader];
        // A fresh tag per slot, never one of `incoming_values` directly:
        // those tags are already owned by whichever block produced them,
        // and reusing one as a parameter here would silently repoint its
        // `value_parents` entry at this block out from under its owner.
        let param_tags: Vec<ValueTag> = incoming_types.iter().map(|_| tags.fresh_value("param")).collect();
        let params: Vec<BlockParameter> =
            param_tags.iter().zip(&incoming_types).map(|(tag, ty)| BlockParameter { tag: *tag, ty: *ty }).collect();
        builder.block(target_block).set_parameters(params);
        leader_param_types.insert(leader, incoming_types.clone());
        visited.insert(leader);

        trace!("translate: analyzing CIL block at offset {} -> {:?}", leader, target_block);
        let exits = analyze_block(&ctx, &builder, leader, target_block, param_tags)?;
        for exit in exits {
            queue.push_back(exit);
        }
    }

    Ok(MethodBody {
        graph: builder.to_immutable(),
        return_type: cil.return_type,
        this_parameter: cil.this_type.map(|_| incoming_params[0].clone()),
        parameters: if cil.this_type.is_some() { incoming_params[1..].to_vec() } else { incoming_params },
    })
}

/// Walks one basic block's instruction chain starting at `leader`,
/// simulating the operand stack and emitting instructions into
/// `target_block`. Returns every successor this block's terminal
/// instruction transfers control to, paired with the stack contents fed
/// as that successor's block arguments.
///
/// Two bugfixes this function must get right (§4.5 "analyze_block", §9
/// open question):
/// - the cursor is only ever advanced by the single `current = inst.next`
///   at the bottom of the loop. Adding an early `continue` anywhere above
///   it without also advancing `current` first reintroduces an infinite
///   loop on any straight-line (non-terminal) opcode;
/// - plain fallthrough into an instruction that is *itself* a leader (a
///   loop header reached both by fallthrough and by a backward branch is
///   the common case) must stop this block and hand off to that leader
///   via a synthetic `Jump` carrying the live stack, rather than walking
///   straight through and appending the other block's instructions here.
fn analyze_block(
    ctx: &Env,
    builder: &FlowGraphBuilder,
    leader: usize,
    target_block: BlockTag,
    incoming: Vec<ValueTag>,
) -> IrResult<Vec<(usize, Vec<ValueTag>)>> {
    // Operand stacks are almost always small and short-lived (pushed,
    // consumed by the next few opcodes, gone); `smallvec` avoids a heap
    // allocation per block for the common case, the same trade the
    // teacher makes for its own small, hot collections.
    let mut stack: SmallVec<[ValueTag; 8]> = incoming.into_iter().collect();
    let mut current = Some(leader);

    loop {
        let idx = current.ok_or_else(|| IrError::malformed("CIL instruction chain ended without a terminal opcode"))?;

        if idx != leader && ctx.leader_blocks.contains_key(&idx) {
            builder.block(target_block).set_flow(BlockFlow::Jump(Branch::values(ctx_block(ctx, idx)?, stack.to_vec())));
            return Ok(vec![(idx, stack.into_vec())]);
        }

        let inst = ctx
            .cil
            .instructions
            .get(idx)
            .ok_or_else(|| IrError::malformed(format!("CIL instruction chain references out-of-range offset {}", idx)))?;

        match &inst.opcode {
            Opcode::Nop => {}
            Opcode::Dup => {
                let top = *stack.last().ok_or_else(|| IrError::malformed("dup on an empty stack"))?;
                stack.push(top);
            }
            Opcode::Pop => {
                stack.pop().ok_or_else(|| IrError::malformed("pop on an empty stack"))?;
            }
            Opcode::Ldc(constant) => {
                let ty = constant.ty(ctx.types);
                let proto = ctx.protos.intern(InstructionPrototype::Constant(constant.clone(), ty));
                let v = builder.block(target_block).append_instruction(Instruction::new(proto, []), "ldc", ty);
                stack.push(v.tag());
            }
            Opcode::LdArg(i) | Opcode::LdLoc(i) => {
                let slot = *i as usize;
                let addr = *ctx.slot_addrs.get(slot).ok_or_else(|| IrError::malformed(format!("load of unknown slot {}", slot)))?;
                let ty = ctx.slot_types[slot];
                let proto = ctx.protos.intern(InstructionPrototype::Load(ty));
                let v = builder.block(target_block).append_instruction(Instruction::new(proto, [addr]), "ld", ty);
                stack.push(v.tag());
            }
            Opcode::StArg(i) | Opcode::StLoc(i) => {
                let slot = *i as usize;
                let addr = *ctx.slot_addrs.get(slot).ok_or_else(|| IrError::malformed(format!("store to unknown slot {}", slot)))?;
                let ty = ctx.slot_types[slot];
                let value = stack.pop().ok_or_else(|| IrError::malformed("store on an empty stack"))?;
                let proto = ctx.protos.intern(InstructionPrototype::Store(ty));
                builder.block(target_block).append_instruction(Instruction::new(proto, [addr, value]), "st", ctx.types.void());
            }
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Rem | Opcode::And | Opcode::Or | Opcode::Xor | Opcode::Shl | Opcode::Shr => {
                let (lhs, rhs) = pop2(&mut stack)?;
                let ty = builder.get_value_type(lhs).expect("stack values are always typed");
                let name = arith_name(&inst.opcode);
                let proto = ctx.protos.intern(InstructionPrototype::Intrinsic(name.to_string(), ty, vec![ty, ty], ExceptionSpec::NoThrow));
                let v = builder.block(target_block).append_instruction(Instruction::new(proto, [lhs, rhs]), "arith", ty);
                stack.push(v.tag());
            }
            Opcode::Neg | Opcode::Not => {
                let operand = stack.pop().ok_or_else(|| IrError::malformed("unary operator: stack underflow"))?;
                let ty = builder.get_value_type(operand).expect("stack values are always typed");
                let name = if matches!(inst.opcode, Opcode::Neg) { "arith.neg" } else { "arith.not" };
                let proto = ctx.protos.intern(InstructionPrototype::Intrinsic(name.to_string(), ty, vec![ty], ExceptionSpec::NoThrow));
                let v = builder.block(target_block).append_instruction(Instruction::new(proto, [operand]), "arith", ty);
                stack.push(v.tag());
            }
            Opcode::Ceq | Opcode::Cgt | Opcode::Clt => {
                let (lhs, rhs) = pop2(&mut stack)?;
                let operand_ty = builder.get_value_type(lhs).expect("stack values are always typed");
                let bool_ty = ctx.types.bool_();
                let name = cmp_name(&inst.opcode);
                let proto = ctx
                    .protos
                    .intern(InstructionPrototype::Intrinsic(name.to_string(), bool_ty, vec![operand_ty, operand_ty], ExceptionSpec::NoThrow));
                let v = builder.block(target_block).append_instruction(Instruction::new(proto, [lhs, rhs]), "cmp", bool_ty);
                stack.push(v.tag());
            }
            Opcode::Br(target) => {
                builder.block(target_block).set_flow(BlockFlow::Jump(Branch::values(ctx_block(ctx, *target)?, stack.to_vec())));
                return Ok(vec![(*target, stack.into_vec())]);
            }
            Opcode::Brtrue(target) | Opcode::Brfalse(target) => {
                let cond = stack.pop().ok_or_else(|| IrError::malformed("brtrue/brfalse on an empty stack"))?;
                let fallthrough = inst.next.ok_or_else(|| IrError::malformed("conditional branch with no fall-through"))?;
                let (taken, not_taken) = if matches!(inst.opcode, Opcode::Brtrue(_)) { (*target, fallthrough) } else { (fallthrough, *target) };
                let mut cases = std::collections::BTreeSet::new();
                cases.insert(Constant::Bool(true));
                builder.block(target_block).set_flow(BlockFlow::Switch {
                    scrutinee: Instruction::new(ctx.protos.intern(InstructionPrototype::Copy(ctx.types.bool_())), [cond]),
                    cases: vec![(cases, Branch::values(ctx_block(ctx, taken)?, stack.to_vec()))],
                    default: Branch::values(ctx_block(ctx, not_taken)?, stack.to_vec()),
                });
                return Ok(vec![(taken, stack.to_vec()), (not_taken, stack.into_vec())]);
            }
            Opcode::Beq(target) | Opcode::Bne(target) | Opcode::Bgt(target) | Opcode::Blt(target) | Opcode::Bge(target) | Opcode::Ble(target) => {
                let (lhs, rhs) = pop2(&mut stack)?;
                let operand_ty = builder.get_value_type(lhs).expect("stack values are always typed");
                let bool_ty = ctx.types.bool_();
                let name = branch_cmp_name(&inst.opcode);
                let proto = ctx
                    .protos
                    .intern(InstructionPrototype::Intrinsic(name.to_string(), bool_ty, vec![operand_ty, operand_ty], ExceptionSpec::NoThrow));
                let cond = builder.block(target_block).append_instruction(Instruction::new(proto, [lhs, rhs]), "cmp", bool_ty);
                let fallthrough = inst.next.ok_or_else(|| IrError::malformed("comparison branch with no fall-through"))?;
                let mut cases = std::collections::BTreeSet::new();
                cases.insert(Constant::Bool(true));
                builder.block(target_block).set_flow(BlockFlow::Switch {
                    scrutinee: Instruction::new(ctx.protos.intern(InstructionPrototype::Copy(bool_ty)), [cond.tag()]),
                    cases: vec![(cases, Branch::values(ctx_block(ctx, *target)?, stack.to_vec()))],
                    default: Branch::values(ctx_block(ctx, fallthrough)?, stack.to_vec()),
                });
                return Ok(vec![(*target, stack.to_vec()), (fallthrough, stack.into_vec())]);
            }
            Opcode::Call(m) | Opcode::CallVirt(m) => {
                let lookup = if matches!(inst.opcode, Opcode::CallVirt(_)) { Lookup::Virtual } else { Lookup::Static };
                let mut args = Vec::with_capacity(m.params.len() + 1);
                for _ in 0..m.params.len() {
                    args.push(stack.pop().ok_or_else(|| IrError::malformed("call: stack underflow on arguments"))?);
                }
                args.reverse();
                if !m.is_static {
                    args.insert(0, stack.pop().ok_or_else(|| IrError::malformed("call: stack underflow on receiver"))?);
                }
                let ret = m.ret;
                let proto = ctx.protos.intern(InstructionPrototype::Call(m.clone(), lookup));
                let v = builder.block(target_block).append_instruction(Instruction::new(proto, args), "call", ret);
                if !ctx.types.is_void(ret) {
                    stack.push(v.tag());
                }
            }
            Opcode::NewObj(c) => {
                let mut args = Vec::with_capacity(c.params.len());
                for _ in 0..c.params.len() {
                    args.push(stack.pop().ok_or_else(|| IrError::malformed("newobj: stack underflow on constructor arguments"))?);
                }
                args.reverse();
                let object_ty = ctx.env.resolve_named_type(&c.owner);
                let proto = ctx.protos.intern(InstructionPrototype::NewObject(c.clone()));
                let v = builder.block(target_block).append_instruction(Instruction::new(proto, args), "newobj", object_ty);
                stack.push(v.tag());
            }
            Opcode::Ldftn(m) | Opcode::LdVirtFtn(m) => {
                let lookup = if matches!(inst.opcode, Opcode::LdVirtFtn(_)) { Lookup::Virtual } else { Lookup::Static };
                let fn_ty = ctx.types.function(m.ret, m.params.clone());
                let proto = ctx.protos.intern(InstructionPrototype::NewDelegate(fn_ty, m.clone(), false, lookup));
                let v = builder.block(target_block).append_instruction(Instruction::new(proto, []), "ldftn", fn_ty);
                stack.push(v.tag());
            }
            Opcode::CastClass(ty) | Opcode::IsInst(ty) => {
                // §4.5 point 4: the core does not model runtime type checks;
                // both opcodes lower to a `ReinterpretCast` to the pointer
                // type named by `ty`, and any check intrinsic is the
                // front-end's responsibility to emit alongside.
                let obj = stack.pop().ok_or_else(|| IrError::malformed("castclass/isinst on an empty stack"))?;
                let ptr_ty = ctx.types.pointer(*ty, crate::ty::PointerKind::Managed);
                let proto = ctx.protos.intern(InstructionPrototype::ReinterpretCast(ptr_ty));
                let v = builder.block(target_block).append_instruction(Instruction::new(proto, [obj]), "cast", ptr_ty);
                stack.push(v.tag());
            }
            Opcode::Throw => {
                let exn = stack.pop().ok_or_else(|| IrError::malformed("throw on an empty stack"))?;
                let exn_ty = builder.get_value_type(exn).expect("stack values are always typed");
                // Exception-handler region parsing is out of scope; an
                // unhandled `throw` propagates to a single synthesized
                // sink block shared by the whole method.
                let proto = ctx.protos.intern(InstructionPrototype::Intrinsic("throw".to_string(), ctx.types.void(), vec![exn_ty], ExceptionSpec::MayThrow));
                let sink = builder.add_block("unhandled_throw");
                builder.block(sink).set_flow(BlockFlow::Unreachable);
                builder.block(target_block).set_flow(BlockFlow::Try {
                    inner: Instruction::new(proto, [exn]),
                    success: Branch::new(sink, [BranchArgument::TryResult]),
                    exception: Branch::new(sink, [BranchArgument::TryException]),
                });
                return Ok(vec![]);
            }
            Opcode::Unsupported(name) => {
                return Err(IrError::not_supported(format!("opcode `{}`", name)));
            }
            Opcode::Ret => {
                let return_instruction = if ctx.types.is_void(ctx.cil.return_type) {
                    None
                } else {
                    let v = stack.pop().ok_or_else(|| IrError::malformed("ret on an empty stack for a non-void method"))?;
                    Some(Instruction::new(ctx.protos.intern(InstructionPrototype::Copy(ctx.cil.return_type)), [v]))
                };
                builder.block(target_block).set_flow(BlockFlow::Return(return_instruction));
                return Ok(vec![]);
            }
        }

        // Advance the cursor. Skipping this for any non-terminal opcode
        // (the bug this chain-walk is written to avoid) loops forever.
        current = inst.next;
    }
}

fn pop2(stack: &mut SmallVec<[ValueTag; 8]>) -> IrResult<(ValueTag, ValueTag)> {
    let rhs = stack.pop().ok_or_else(|| IrError::malformed("binary operator: stack underflow"))?;
    let lhs = stack.pop().ok_or_else(|| IrError::malformed("binary operator: stack underflow"))?;
    Ok((lhs, rhs))
}

/// Resolves a CIL instruction offset to the host block minted for it by
/// branch-target analysis (§4.5 point 1). Every branch target is a leader
/// by construction, so a miss here means `compute_leaders` disagreed with
/// an opcode's `branch_targets()` — a translator bug, not malformed input.
fn ctx_block(ctx: &Env, leader: usize) -> IrResult<BlockTag> {
    ctx.leader_blocks
        .get(&leader)
        .copied()
        .ok_or_else(|| IrError::malformed(format!("branch target at offset {} was never registered as a block leader", leader)))
}

fn arith_name(op: &Opcode) -> &'static str {
    match op {
        Opcode::Add => "arith.add",
        Opcode::Sub => "arith.sub",
        Opcode::Mul => "arith.mul",
        Opcode::Div => "arith.div",
        Opcode::Rem => "arith.rem",
        Opcode::And => "arith.and",
        Opcode::Or => "arith.or",
        Opcode::Xor => "arith.xor",
        Opcode::Shl => "arith.shl",
        Opcode::Shr => "arith.shr",
        _ => unreachable!(),
    }
}

fn cmp_name(op: &Opcode) -> &'static str {
    match op {
        Opcode::Ceq => "cmp.eq",
        Opcode::Cgt => "cmp.gt",
        Opcode::Clt => "cmp.lt",
        _ => unreachable!(),
    }
}

fn branch_cmp_name(op: &Opcode) -> &'static str {
    match op {
        Opcode::Beq(_) => "cmp.eq",
        Opcode::Bne(_) => "cmp.ne",
        Opcode::Bgt(_) => "cmp.gt",
        Opcode::Blt(_) => "cmp.lt",
        Opcode::Bge(_) => "cmp.ge",
        Opcode::Ble(_) => "cmp.le",
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::TypeInfo;

    #[derive(Debug)]
    struct TestEnv {
        types: std::sync::Arc<TypeTable>,
    }

    impl TypeResolver for TestEnv {
        fn describe(&self, ty: Type) -> TypeInfo {
            self.types.describe(ty)
        }
    }

    impl TranslatorEnv for TestEnv {
        fn resolve_named_type(&self, name: &QualifiedName) -> Type {
            self.types.opaque(name.clone())
        }
    }

    fn harness() -> (TagInterner, std::sync::Arc<TypeTable>, std::sync::Arc<PrototypeInterner>, TestEnv) {
        let tags = TagInterner::new();
        let types = TypeTable::new();
        let protos = PrototypeInterner::new();
        let env = TestEnv { types: types.clone() };
        (tags, types, protos, env)
    }

    fn inst(opcode: Opcode, next: Option<usize>) -> crate::cil::CilInstruction {
        crate::cil::CilInstruction { opcode, next }
    }

    /// S1: `[ldc.i4 42; ret]` translates to one non-entry block carrying
    /// the constant and a `Return(Copy)` of it, reached by an unconditional
    /// jump from the setup entry block.
    #[test]
    fn s1_ldc_ret_translation() {
        let (tags, types, protos, env) = harness();
        let i32t = types.int(32, true);
        let cil = CilBody {
            instructions: vec![inst(Opcode::Ldc(Constant::i32(42)), Some(1)), inst(Opcode::Ret, None)],
            entry: 0,
            this_type: None,
            params: vec![],
            locals: vec![],
            return_type: i32t,
        };

        let body = translate(&cil, &tags, &types, &protos, &env).unwrap();

        let setup = body.graph.entry_point();
        let setup_bb = body.graph.get_basic_block(setup).unwrap();
        assert!(setup_bb.parameters.is_empty());
        let target = match &setup_bb.flow {
            BlockFlow::Jump(b) => {
                assert!(b.args.is_empty());
                b.target
            }
            other => panic!("expected the setup block to jump into the first real block, got {:?}", other),
        };

        let bb = body.graph.get_basic_block(target).unwrap();
        assert!(bb.parameters.is_empty(), "no block parameters are needed when the stack is empty at every boundary");
        assert_eq!(bb.instructions.len(), 1);
        let const_tag = bb.instructions[0];
        let const_inst = body.graph.get_instruction(const_tag).unwrap();
        assert_eq!(const_inst.prototype.shape(), &InstructionPrototype::Constant(Constant::i32(42), i32t));

        match &bb.flow {
            BlockFlow::Return(Some(copy)) => {
                assert_eq!(copy.prototype.shape(), &InstructionPrototype::Copy(i32t));
                assert_eq!(copy.args, vec![const_tag]);
            }
            other => panic!("expected Return(Copy(..)) flow, got {:?}", other),
        }
    }

    /// S2: `[ldc.i4 1; brtrue L; ldc.i4 0; ret; L: ldc.i4 1; ret]` produces
    /// three blocks besides the setup entry — a condition block terminating
    /// in `Switch`, and a returning block on each arm — with no block
    /// parameters anywhere, since the stack is empty at every boundary.
    #[test]
    fn s2_if_else_via_brtrue() {
        let (tags, types, protos, env) = harness();
        let i32t = types.int(32, true);
        let cil = CilBody {
            instructions: vec![
                inst(Opcode::Ldc(Constant::i32(1)), Some(1)), // 0
                inst(Opcode::Brtrue(4), Some(2)),             // 1
                inst(Opcode::Ldc(Constant::i32(0)), Some(3)), // 2
                inst(Opcode::Ret, None),                      // 3
                inst(Opcode::Ldc(Constant::i32(1)), Some(5)), // 4
                inst(Opcode::Ret, None),                      // 5
            ],
            entry: 0,
            this_type: None,
            params: vec![],
            locals: vec![],
            return_type: i32t,
        };

        let body = translate(&cil, &tags, &types, &protos, &env).unwrap();

        let setup = body.graph.entry_point();
        let cond_block = match &body.graph.get_basic_block(setup).unwrap().flow {
            BlockFlow::Jump(b) => b.target,
            other => panic!("expected setup to jump to the condition block, got {:?}", other),
        };
        let cond_bb = body.graph.get_basic_block(cond_block).unwrap();
        assert!(cond_bb.parameters.is_empty());

        let (taken, not_taken) = match &cond_bb.flow {
            BlockFlow::Switch { cases, default, .. } => {
                assert_eq!(cases.len(), 1);
                (cases[0].1.target, default.target)
            }
            other => panic!("expected the condition block to end in Switch, got {:?}", other),
        };
        assert_ne!(taken, not_taken);

        for arm in [taken, not_taken] {
            let bb = body.graph.get_basic_block(arm).unwrap();
            assert!(bb.parameters.is_empty(), "no stack is live across either arm's boundary");
            assert_eq!(bb.instructions.len(), 1);
            assert!(matches!(bb.flow, BlockFlow::Return(Some(_))));
        }

        // Every block other than `setup` and `cond_block` is one of the
        // two arms: three blocks besides the entry in total.
        let all_blocks: Vec<_> = body.graph.block_tags().collect();
        assert_eq!(all_blocks.len(), 4, "setup + condition + two return arms");
    }

    /// S3: two predecessors of the same leader disagreeing on stack shape
    /// (one arrives with a value live, the other with an empty stack) must
    /// fail translation with `MalformedIr`, not silently pick one shape.
    #[test]
    fn s3_stack_disagreement_is_rejected() {
        let (tags, types, protos, env) = harness();
        let void = types.void();
        let cil = CilBody {
            instructions: vec![
                inst(Opcode::Ldc(Constant::i32(1)), Some(1)), // 0: entry, push one value
                inst(Opcode::Brtrue(4), Some(2)),             // 1: pops cond, both arms see an empty stack
                inst(Opcode::Ldc(Constant::i32(2)), Some(3)), // 2: fallthrough arm, pushes a second value
                inst(Opcode::Br(4), None),                    // 3: jumps to 4 with one value live
                inst(Opcode::Ret, None),                      // 4: reached once with 0 live values, once with 1
            ],
            entry: 0,
            this_type: None,
            params: vec![],
            locals: vec![],
            return_type: void,
        };

        let err = translate(&cil, &tags, &types, &protos, &env).unwrap_err();
        assert!(matches!(err, IrError::MalformedIr(_)));
    }

    /// A translated instance `callvirt` carries the receiver as `args[0]`
    /// ahead of its declared parameters; the validator must not mistake
    /// that extra argument for an arity mismatch (regression test for the
    /// `Call` prototype's receiver-aware arity/conformance fix).
    #[test]
    fn translated_instance_call_validates_cleanly() {
        let (tags, types, protos, env) = harness();
        let object_ty = types.opaque(QualifiedName::simple("System.Object"));
        let string_ty = types.opaque(QualifiedName::simple("System.String"));
        let to_string = crate::proto::MethodRef {
            owner: QualifiedName::simple("System.Object"),
            name: "ToString".to_string(),
            is_static: false,
            ret: string_ty,
            params: vec![],
        };
        let cil = CilBody {
            instructions: vec![
                inst(Opcode::LdArg(0), Some(1)),        // 0: push `this`
                inst(Opcode::CallVirt(to_string), Some(2)), // 1: callvirt ToString() on it
                inst(Opcode::Ret, None),                // 2
            ],
            entry: 0,
            this_type: Some(object_ty),
            params: vec![],
            locals: vec![],
            return_type: string_ty,
        };

        let body = translate(&cil, &tags, &types, &protos, &env).unwrap();
        let mut sink = crate::diag::ErrorSink::new(Default::default());
        crate::validate::validate(&body.graph, &*types, &mut sink).unwrap();
        assert!(!sink.has_errors(), "{:?}", sink.diagnostics());
    }

    /// S7 (idempotence): translating the same bytecode twice from fresh
    /// interners produces graphs with the same tag/block/instruction shape,
    /// not literally equal tags (those are fresh each time) but structurally
    /// isomorphic.
    #[test]
    fn translation_is_idempotent_up_to_fresh_tags() {
        let i32t_shape = TypeInfo::Integer { bits: 32, signed: true };
        let make = || {
            let tags = TagInterner::new();
            let types = TypeTable::new();
            let protos = PrototypeInterner::new();
            let env = TestEnv { types: types.clone() };
            let i32t = types.intern(i32t_shape.clone());
            let cil = CilBody {
                instructions: vec![inst(Opcode::Ldc(Constant::i32(7)), Some(1)), inst(Opcode::Ret, None)],
                entry: 0,
                this_type: None,
                params: vec![],
                locals: vec![],
                return_type: i32t,
            };
            translate(&cil, &tags, &types, &protos, &env).unwrap()
        };

        let a = make();
        let b = make();
        assert_eq!(a.graph.block_tags().count(), b.graph.block_tags().count());
        assert_eq!(a.graph.value_tags().count(), b.graph.value_tags().count());

        let a_ret = a.graph.get_basic_block(a.graph.entry_point()).unwrap();
        let b_ret = b.graph.get_basic_block(b.graph.entry_point()).unwrap();
        assert_eq!(a_ret.instructions.len(), b_ret.instructions.len());
    }

    /// Regression test for the fallthrough-into-leader fix: a loop header
    /// reached both by plain fallthrough from the entry and by a backward
    /// branch must be analyzed exactly once, as its own block, rather than
    /// have its instructions appended into the predecessor that falls
    /// through into it.
    #[test]
    fn fallthrough_into_an_existing_leader_hands_off_instead_of_merging() {
        let (tags, types, protos, env) = harness();
        let void = types.void();
        let cil = CilBody {
            instructions: vec![
                inst(Opcode::Ldc(Constant::Bool(false)), Some(1)), // 0: entry, falls through into the loop header at 1
                inst(Opcode::Brtrue(4), Some(2)),                   // 1: loop header, takes one bool parameter
                inst(Opcode::Ldc(Constant::Bool(true)), Some(3)),   // 2: loop body, pushes the value threaded back
                inst(Opcode::Br(1), None),                          // 3: backward edge to the header, one value live
                inst(Opcode::Ret, None),                            // 4: loop exit
            ],
            entry: 0,
            this_type: None,
            params: vec![],
            locals: vec![],
            return_type: void,
        };

        let body = translate(&cil, &tags, &types, &protos, &env).unwrap();

        let setup = body.graph.entry_point();
        let setup_bb = body.graph.get_basic_block(setup).unwrap();
        // The setup block must jump straight to offset-0's block, which in
        // turn must hand off to the loop header via its own Jump rather
        // than inlining the header's Brtrue into the entry block.
        let first_block = match &setup_bb.flow {
            BlockFlow::Jump(b) => b.target,
            other => panic!("expected setup to jump to the first real block, got {:?}", other),
        };
        let first_bb = body.graph.get_basic_block(first_block).unwrap();
        assert_eq!(first_bb.instructions.len(), 1, "offset 0's Ldc belongs to its own block, not the loop header's");
        let header = match &first_bb.flow {
            BlockFlow::Jump(b) => b.target,
            other => panic!("offset 0 must hand off to the loop header with a synthetic Jump, got {:?}", other),
        };
        assert_ne!(header, first_block);
        let entry_arg = match &first_bb.flow {
            BlockFlow::Jump(b) => b.args[0].as_value().expect("plain value arg"),
            _ => unreachable!(),
        };

        let header_bb = body.graph.get_basic_block(header).unwrap();
        assert!(matches!(header_bb.flow, BlockFlow::Switch { .. }), "the loop header keeps its own Brtrue-derived Switch flow");
        assert_eq!(header_bb.parameters.len(), 1);
        // The header's parameter must be a fresh tag, never the entry
        // block's own Ldc result reused in place: that would leave the
        // entry block's instruction list and the global value-parent map
        // disagreeing about which block owns it.
        assert_ne!(header_bb.parameters[0].tag, entry_arg, "block parameter must not alias a predecessor's value tag");

        // Exactly 5 blocks total: setup, offset-0, header, loop body, loop exit.
        assert_eq!(body.graph.block_tags().count(), 5);
    }
}
