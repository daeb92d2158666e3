//! Instruction prototypes: immutable descriptions of an operation's shape
//! (opcode + static operands), interned so that two prototypes built from
//! equal components compare by pointer identity thereafter (§4.1, §8
//! property 2).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::tag::QualifiedName;
use crate::ty::{Type, TypeResolver};

/// How a [`Call`](InstructionPrototype::Call)/[`NewDelegate`] resolves its
/// callee at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lookup {
    Static,
    Virtual,
}

/// Whether an instruction may raise an exception. Feeds directly into
/// `Try` flow construction (§3) and into delegate-lowering's choice of
/// whether to wrap a copied instruction in `Try` during `Include` (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionSpec {
    NoThrow,
    MayThrow,
}

/// A reference to a method, as seen from the IR. The core never resolves
/// this further than comparing it structurally and reading its signature;
/// overload/generic resolution is the host type system's job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub owner: QualifiedName,
    pub name: String,
    pub is_static: bool,
    pub ret: Type,
    pub params: Vec<Type>,
}

/// A reference to a constructor, as seen from the IR.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CtorRef {
    pub owner: QualifiedName,
    pub params: Vec<Type>,
}

/// The structural shape of an operation: opcode plus every non-value
/// operand. Building one of these does not intern it; pass it to
/// [`PrototypeInterner::intern`] to get a [`Prototype`] handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstructionPrototype {
    Alloca(Type),
    AllocaArray(Type),
    Constant(crate::ty::Constant, Type),
    Copy(Type),
    Load(Type),
    Store(Type),
    Call(MethodRef, Lookup),
    IndirectCall(Type, Vec<Type>),
    NewObject(CtorRef),
    NewDelegate(Type, MethodRef, bool, Lookup),
    ReinterpretCast(Type),
    Intrinsic(String, Type, Vec<Type>, ExceptionSpec),
}

impl InstructionPrototype {
    /// The type of the value this operation produces, if inserted as a
    /// named instruction. `Store`/`Intrinsic("throw", ...)` and friends
    /// report `Void` via the resolver's void type, not `None`: every
    /// prototype has exactly one result type (§3 Instruction Prototype).
    pub fn result_type(&self, void: Type) -> Type {
        match self {
            InstructionPrototype::Alloca(t) => *t,
            InstructionPrototype::AllocaArray(t) => *t,
            InstructionPrototype::Constant(_, t) => *t,
            InstructionPrototype::Copy(t) => *t,
            InstructionPrototype::Load(t) => *t,
            InstructionPrototype::Store(_) => void,
            InstructionPrototype::Call(m, _) => m.ret,
            InstructionPrototype::IndirectCall(ret, _) => *ret,
            InstructionPrototype::NewObject(c) => {
                // The constructed object's type is the ctor's owner; since
                // the core treats nominal types opaquely it cannot mint a
                // `Type` for `c.owner` itself, so callers that need this
                // supply it alongside (see `graph::builder::InstructionBuilder`).
                // Conservatively we fall back to void; builders must not
                // rely on this arm and should track the object type out of
                // band when constructing `NewObject` instructions.
                let _ = c;
                void
            }
            InstructionPrototype::NewDelegate(t, _, _, _) => *t,
            InstructionPrototype::ReinterpretCast(t) => *t,
            InstructionPrototype::Intrinsic(_, ret, _, _) => *ret,
        }
    }

    /// Declared operand arity (the number of *value* arguments an
    /// [`crate::inst::Instruction`] built from this prototype must carry).
    pub fn arity(&self) -> usize {
        match self {
            InstructionPrototype::Alloca(_) => 0,
            InstructionPrototype::AllocaArray(_) => 1, // element count
            InstructionPrototype::Constant(_, _) => 0,
            InstructionPrototype::Copy(_) => 1,
            InstructionPrototype::Load(_) => 1, // address
            InstructionPrototype::Store(_) => 2, // address, value
            InstructionPrototype::Call(m, _) => (!m.is_static as usize) + m.params.len(), // receiver (if any) + args
            InstructionPrototype::IndirectCall(_, params) => 1 + params.len(), // callee + args
            InstructionPrototype::NewObject(c) => c.params.len(),
            InstructionPrototype::NewDelegate(_, _, has_this, _) => {
                // bound-object (only if `has_this`) + function pointer.
                (*has_this as usize) + 1
            }
            InstructionPrototype::ReinterpretCast(_) => 1,
            InstructionPrototype::Intrinsic(_, _, params, _) => params.len(),
        }
    }

    /// The declared parameter type for argument `index`, used by
    /// conformance checking below. Returns `None` for an out-of-range
    /// index (arity mismatch is reported separately).
    pub fn param_type(&self, index: usize, unchecked: Type) -> Option<Type> {
        match self {
            InstructionPrototype::Alloca(_) => None,
            InstructionPrototype::AllocaArray(_) => {
                // Element-count type is front-end-defined; core only checks
                // arity here, so report back whatever the caller passed in
                // (making the equality check in `check_conformance` a no-op).
                (index == 0).then_some(unchecked)
            }
            InstructionPrototype::Constant(_, _) => None,
            InstructionPrototype::Copy(t) => (index == 0).then_some(*t),
            InstructionPrototype::Load(_) => None, // address type is any pointer; checked structurally, not by equality
            InstructionPrototype::Store(t) => match index {
                1 => Some(*t),
                _ => None,
            },
            InstructionPrototype::Call(m, _) => {
                if !m.is_static {
                    if index == 0 {
                        None // receiver type is `m.owner`, checked structurally, not by equality
                    } else {
                        m.params.get(index - 1).copied()
                    }
                } else {
                    m.params.get(index).copied()
                }
            }
            InstructionPrototype::IndirectCall(_, params) => {
                if index == 0 {
                    None // callee type checked separately (function-shape, not equality)
                } else {
                    params.get(index - 1).copied()
                }
            }
            InstructionPrototype::NewObject(c) => c.params.get(index).copied(),
            InstructionPrototype::NewDelegate(_, _, has_this, _) => {
                if *has_this && index == 0 {
                    None // bound-object type is the callee's owner, checked structurally
                } else {
                    None // function pointer slot, checked structurally (function shape)
                }
            }
            InstructionPrototype::ReinterpretCast(_) => None,
            InstructionPrototype::Intrinsic(_, _, params, _) => params.get(index).copied(),
        }
    }

    pub fn exception_spec(&self) -> ExceptionSpec {
        match self {
            InstructionPrototype::Call(..)
            | InstructionPrototype::IndirectCall(..)
            | InstructionPrototype::NewObject(..) => ExceptionSpec::MayThrow,
            InstructionPrototype::Intrinsic(_, _, _, spec) => *spec,
            _ => ExceptionSpec::NoThrow,
        }
    }

    /// Checks an instantiated instruction's argument types against this
    /// prototype's declared shape (§4.1). `arg_types` are the *result*
    /// types of the instruction's value arguments as already resolved in
    /// the enclosing graph; `IndirectCall`'s extra callee-shape check is
    /// performed here too.
    pub fn check_conformance(&self, arg_types: &[Type], types: &dyn TypeResolver) -> Vec<String> {
        let mut errors = Vec::new();
        let expected = self.arity();
        if arg_types.len() != expected {
            errors.push(format!(
                "expected {} argument(s) but got {}",
                expected,
                arg_types.len()
            ));
            return errors;
        }
        for (index, &actual) in arg_types.iter().enumerate() {
            if let InstructionPrototype::IndirectCall(ret, params) = self {
                if index == 0 {
                    if !types.is_callable_as(actual, *ret, params) {
                        errors.push(format!(
                            "indirect call target is not callable as ({}) -> {}",
                            params.iter().map(|p| types.display_name(*p)).collect::<Vec<_>>().join(", "),
                            types.display_name(*ret),
                        ));
                    }
                    continue;
                }
            }
            if let Some(expected_ty) = self.param_type(index, actual) {
                if expected_ty != actual {
                    errors.push(format!(
                        "argument {} expected type {} but got {}",
                        index,
                        types.display_name(expected_ty),
                        types.display_name(actual),
                    ));
                }
            }
        }
        errors
    }

    /// Produces a new, structurally distinct prototype shape with every
    /// `Type` rewritten through `mapper` — the raw building block generic
    /// specialization re-interns through [`PrototypeInterner::intern`].
    pub fn map(&self, mapper: &dyn Fn(Type) -> Type) -> InstructionPrototype {
        match self {
            InstructionPrototype::Alloca(t) => InstructionPrototype::Alloca(mapper(*t)),
            InstructionPrototype::AllocaArray(t) => InstructionPrototype::AllocaArray(mapper(*t)),
            InstructionPrototype::Constant(c, t) => InstructionPrototype::Constant(c.clone(), mapper(*t)),
            InstructionPrototype::Copy(t) => InstructionPrototype::Copy(mapper(*t)),
            InstructionPrototype::Load(t) => InstructionPrototype::Load(mapper(*t)),
            InstructionPrototype::Store(t) => InstructionPrototype::Store(mapper(*t)),
            InstructionPrototype::Call(m, l) => InstructionPrototype::Call(map_method(m, mapper), *l),
            InstructionPrototype::IndirectCall(ret, params) => {
                InstructionPrototype::IndirectCall(mapper(*ret), params.iter().map(|p| mapper(*p)).collect())
            }
            InstructionPrototype::NewObject(c) => InstructionPrototype::NewObject(CtorRef {
                owner: c.owner.clone(),
                params: c.params.iter().map(|p| mapper(*p)).collect(),
            }),
            InstructionPrototype::NewDelegate(t, m, has_this, l) => {
                InstructionPrototype::NewDelegate(mapper(*t), map_method(m, mapper), *has_this, *l)
            }
            InstructionPrototype::ReinterpretCast(t) => InstructionPrototype::ReinterpretCast(mapper(*t)),
            InstructionPrototype::Intrinsic(name, ret, params, spec) => InstructionPrototype::Intrinsic(
                name.clone(),
                mapper(*ret),
                params.iter().map(|p| mapper(*p)).collect(),
                *spec,
            ),
        }
    }
}

fn map_method(m: &MethodRef, mapper: &dyn Fn(Type) -> Type) -> MethodRef {
    MethodRef {
        owner: m.owner.clone(),
        name: m.name.clone(),
        is_static: m.is_static,
        ret: mapper(m.ret),
        params: m.params.iter().map(|p| mapper(*p)).collect(),
    }
}

/// An interned [`InstructionPrototype`] handle. Compares and hashes by
/// pointer identity (§8 property 2), not by structural equality of its
/// contents — use `.shape()` to get back the structural value.
#[derive(Clone)]
pub struct Prototype(Arc<InstructionPrototype>);

impl Prototype {
    pub fn shape(&self) -> &InstructionPrototype {
        &self.0
    }
}

impl Deref for Prototype {
    type Target = InstructionPrototype;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq for Prototype {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Prototype {}

impl Hash for Prototype {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as *const () as usize).hash(state);
    }
}

impl fmt::Debug for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// Process-wide canonicalizing cache for [`InstructionPrototype`] shapes.
/// Concurrent lookup-or-insert is safe: two threads racing to intern equal
/// shapes both observe the same [`Prototype`] afterwards (§5 Shared
/// resources), because the whole lookup-or-insert happens under one lock.
#[derive(Debug, Default)]
pub struct PrototypeInterner {
    table: Mutex<FxHashMap<InstructionPrototype, Prototype>>,
}

impl PrototypeInterner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn intern(&self, shape: InstructionPrototype) -> Prototype {
        let mut table = self.table.lock();
        if let Some(existing) = table.get(&shape) {
            return existing.clone();
        }
        let handle = Prototype(Arc::new(shape.clone()));
        table.insert(shape, handle.clone());
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::TypeTable;

    #[test]
    fn equal_shapes_intern_to_the_same_pointer() {
        let types = TypeTable::new();
        let interner = PrototypeInterner::new();
        let i32t = types.int(32, true);
        let a = interner.intern(InstructionPrototype::Copy(i32t));
        let b = interner.intern(InstructionPrototype::Copy(i32t));
        assert_eq!(a, b);
        assert!(Arc::ptr_eq(&a.0, &b.0));
    }

    #[test]
    fn distinct_shapes_intern_to_distinct_pointers() {
        let types = TypeTable::new();
        let interner = PrototypeInterner::new();
        let i32t = types.int(32, true);
        let i64t = types.int(64, true);
        let a = interner.intern(InstructionPrototype::Copy(i32t));
        let b = interner.intern(InstructionPrototype::Copy(i64t));
        assert_ne!(a, b);
    }

    #[test]
    fn conformance_checks_arity_and_argument_types() {
        let types = TypeTable::new();
        let i32t = types.int(32, true);
        let i64t = types.int(64, true);
        let proto = InstructionPrototype::Store(i32t);
        let errors = proto.check_conformance(&[i32t, i32t], &*types);
        assert!(errors.is_empty());
        let errors = proto.check_conformance(&[i32t, i64t], &*types);
        assert_eq!(errors.len(), 1);
        let errors = proto.check_conformance(&[i32t], &*types);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn indirect_call_checks_callee_shape() {
        let types = TypeTable::new();
        let i32t = types.int(32, true);
        let callable = types.function(i32t, vec![i32t]);
        let proto = InstructionPrototype::IndirectCall(i32t, vec![i32t]);
        let errors = proto.check_conformance(&[callable, i32t], &*types);
        assert!(errors.is_empty());
        let errors = proto.check_conformance(&[i32t, i32t], &*types);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn map_rewrites_every_type_and_reinterns() {
        let types = TypeTable::new();
        let interner = PrototypeInterner::new();
        let i32t = types.int(32, true);
        let i64t = types.int(64, true);
        let original = interner.intern(InstructionPrototype::Copy(i32t));
        let mapped_shape = original.shape().map(&|_| i64t);
        let mapped = interner.intern(mapped_shape);
        assert_eq!(mapped.shape(), &InstructionPrototype::Copy(i64t));
        assert_ne!(original, mapped);
    }
}
