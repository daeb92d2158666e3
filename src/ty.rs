//! Opaque type handles, the resolver trait the core uses to look inside
//! them, and constant literals.
//!
//! The core never has its own notion of a host type system: generics,
//! inheritance and layout all live on the other side of [`TypeResolver`].
//! What the core needs is small and fixed, so it is pulled out into
//! [`TypeInfo`] instead of letting IR code match on an open-ended type
//! hierarchy (mirrors how the teacher keeps `mir` ignorant of everything
//! in `rustc_middle::ty` beyond what `TyCtxt` resolves for it).

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::tag::QualifiedName;

/// Raw/managed distinction for a pointer-shaped type, mirroring the two
/// pointer `InstructionPrototype`s (`ReinterpretCast`, `Alloca`) ever need
/// to distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerKind {
    /// An unmanaged pointer (`T*`).
    Unmanaged,
    /// A managed reference / byref (`ref T`).
    Managed,
}

/// What the core is allowed to know about a [`Type`]. Anything not covered
/// here is `Opaque` from the core's point of view — it is structurally
/// comparable and nameable, but never decomposed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeInfo {
    Integer { bits: u32, signed: bool },
    Float { bits: u32 },
    Bool,
    Char,
    Void,
    Pointer { pointee: Type, kind: PointerKind },
    /// A function/delegate-shaped type, needed by `IndirectCall` and
    /// `NewDelegate` conformance checks.
    Function { ret: Type, params: Vec<Type> },
    /// A nominal type (class, struct, delegate, enum, ...) the core does
    /// not interpret beyond its name and structural identity.
    Opaque(QualifiedName),
}

/// An opaque handle into the surrounding type system.
///
/// Two `Type`s compare equal iff the [`TypeResolver`] that produced them
/// considers them structurally equal; the core never looks past that.
/// Mirrors `rustc_middle::ty::Ty<'tcx>`: a small `Copy` handle backed by an
/// interning table that only the type system itself constructs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Type(u32);

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({})", self.0)
    }
}

/// Supplied by the front-end/type-system side of the compiler; the core
/// calls through this trait whenever it needs to know something about a
/// [`Type`] beyond bare equality.
pub trait TypeResolver: fmt::Debug {
    fn describe(&self, ty: Type) -> TypeInfo;

    fn display_name(&self, ty: Type) -> String {
        match self.describe(ty) {
            TypeInfo::Integer { bits, signed } => {
                format!("{}{}", if signed { "i" } else { "u" }, bits)
            }
            TypeInfo::Float { bits } => format!("f{}", bits),
            TypeInfo::Bool => "bool".to_string(),
            TypeInfo::Char => "char".to_string(),
            TypeInfo::Void => "void".to_string(),
            TypeInfo::Pointer { pointee, kind } => {
                let sigil = match kind {
                    PointerKind::Unmanaged => "*",
                    PointerKind::Managed => "&",
                };
                format!("{}{}", sigil, self.display_name(pointee))
            }
            TypeInfo::Function { ret, params } => {
                let params = params.iter().map(|p| self.display_name(*p)).collect::<Vec<_>>();
                format!("({}) -> {}", params.join(", "), self.display_name(ret))
            }
            TypeInfo::Opaque(name) => name.to_string(),
        }
    }

    /// `true` if `ty` is a function/delegate type whose signature is
    /// exactly `(params) -> ret`. Used by `IndirectCall` conformance
    /// (§4.1) and by delegate lowering (§4.6).
    fn is_callable_as(&self, ty: Type, ret: Type, params: &[Type]) -> bool {
        matches!(
            self.describe(ty),
            TypeInfo::Function { ret: r, params: p } if r == ret && p == params
        )
    }

    fn is_void(&self, ty: Type) -> bool {
        matches!(self.describe(ty), TypeInfo::Void)
    }
}

/// A self-contained [`TypeResolver`] used by the core's own tests and by
/// callers that do not yet have a real type system wired up. Interns
/// [`TypeInfo`] shapes structurally: two calls describing an equal shape
/// return the same [`Type`] handle, exactly as prototype interning does
/// in §4.1 (same `parking_lot::Mutex` + `FxHashMap` shape, grounded on the
/// teacher's `rustc_data_structures` dependency stack).
#[derive(Debug, Default)]
pub struct TypeTable {
    inner: Mutex<TypeTableInner>,
}

#[derive(Debug, Default)]
struct TypeTableInner {
    shapes: Vec<TypeInfo>,
    index: FxHashMap<TypeInfo, Type>,
}

impl TypeTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn intern(&self, info: TypeInfo) -> Type {
        let mut inner = self.inner.lock();
        if let Some(ty) = inner.index.get(&info) {
            return *ty;
        }
        let id = inner.shapes.len() as u32;
        let ty = Type(id);
        inner.shapes.push(info.clone());
        inner.index.insert(info, ty);
        ty
    }

    pub fn int(&self, bits: u32, signed: bool) -> Type {
        self.intern(TypeInfo::Integer { bits, signed })
    }

    pub fn float(&self, bits: u32) -> Type {
        self.intern(TypeInfo::Float { bits })
    }

    pub fn bool_(&self) -> Type {
        self.intern(TypeInfo::Bool)
    }

    pub fn char_(&self) -> Type {
        self.intern(TypeInfo::Char)
    }

    pub fn void(&self) -> Type {
        self.intern(TypeInfo::Void)
    }

    pub fn pointer(&self, pointee: Type, kind: PointerKind) -> Type {
        self.intern(TypeInfo::Pointer { pointee, kind })
    }

    pub fn function(&self, ret: Type, params: Vec<Type>) -> Type {
        self.intern(TypeInfo::Function { ret, params })
    }

    pub fn opaque(&self, name: QualifiedName) -> Type {
        self.intern(TypeInfo::Opaque(name))
    }
}

impl TypeResolver for TypeTable {
    fn describe(&self, ty: Type) -> TypeInfo {
        self.inner.lock().shapes[ty.0 as usize].clone()
    }
}

/// 32-bit float compared/hashed by bit pattern, so `Constant` can derive
/// `Eq`/`Hash` (needed for `Switch` case sets) without silently treating
/// distinct NaN payloads as equal-by-value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FloatBits32(pub u32);

impl FloatBits32 {
    pub fn from_f32(v: f32) -> Self {
        FloatBits32(v.to_bits())
    }
    pub fn to_f32(self) -> f32 {
        f32::from_bits(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FloatBits64(pub u64);

impl FloatBits64 {
    pub fn from_f64(v: f64) -> Self {
        FloatBits64(v.to_bits())
    }
    pub fn to_f64(self) -> f64 {
        f64::from_bits(self.0)
    }
}

/// A constant literal. Arbitrary integer width is represented by a single
/// `i128` payload paired with the declared bit width and signedness
/// (mirrors the teacher's `mir::interpret::ConstValue`/`ScalarInt`, which
/// stores a fixed-size payload plus a size tag rather than one Rust
/// primitive type per width).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Constant {
    Int { bits: u32, signed: bool, value: i128 },
    Float32(FloatBits32),
    Float64(FloatBits64),
    Bool(bool),
    Char(char),
    String(String),
    Null,
    Default(Type),
}

impl Constant {
    pub fn i32(value: i32) -> Self {
        Constant::Int { bits: 32, signed: true, value: value as i128 }
    }

    pub fn i64(value: i64) -> Self {
        Constant::Int { bits: 64, signed: true, value: value as i128 }
    }

    pub fn f32(value: f32) -> Self {
        Constant::Float32(FloatBits32::from_f32(value))
    }

    pub fn f64(value: f64) -> Self {
        Constant::Float64(FloatBits64::from_f64(value))
    }

    /// The `Type` this constant's value conforms to, given a resolver able
    /// to mint/locate primitive types. Used by the translator (§4.5) when
    /// it pushes a `Constant` instruction prototype.
    pub fn ty(&self, types: &TypeTable) -> Type {
        match self {
            Constant::Int { bits, signed, .. } => types.int(*bits, *signed),
            Constant::Float32(_) => types.float(32),
            Constant::Float64(_) => types.float(64),
            Constant::Bool(_) => types.bool_(),
            Constant::Char(_) => types.char_(),
            Constant::String(_) => {
                types.opaque(QualifiedName::simple("System.String"))
            }
            Constant::Null => types.opaque(QualifiedName::simple("System.Object")),
            Constant::Default(ty) => *ty,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int { value, .. } => write!(f, "{}", value),
            Constant::Float32(v) => write!(f, "{}", v.to_f32()),
            Constant::Float64(v) => write!(f, "{}", v.to_f64()),
            Constant::Bool(v) => write!(f, "{}", v),
            Constant::Char(v) => write!(f, "{:?}", v),
            Constant::String(v) => write!(f, "{:?}", v),
            Constant::Null => write!(f, "null"),
            Constant::Default(_) => write!(f, "default"),
        }
    }
}
