//! The IR on-disk symbolic-expression format (§6.1).
//!
//! A [`SExpr`] is a head identifier plus an operand list — the same shape
//! the format document reserves for everything from `#type_table` down to
//! a single `const_int32`. This module is table-driven in the sense the
//! format calls for (`encode_*`/`decode_*` dispatch on the head string, one
//! match arm per head) but only *implements* the instruction-prototype and
//! constant-level subset: `alloca`, `alloca_array`, `const`, `copy`, `load`,
//! `store`, `call`, `indirect_call`, `new_delegate`, `new_object`,
//! `reinterpret_cast`, every `#const_*` head, and a minimal
//! `#type_reference`/`#primitive_type` pair sufficient to round-trip a
//! [`Type`] handle through a [`TypeTable`]. The surrounding table/signature
//! surface (`#of`, `#of_member`, `#iterable_type`, full
//! `#method_reference`/`#ctor_reference` with generic parameter lists, …)
//! describes the host type system, which is out of scope here (§1); adding
//! those heads later is purely additive, one more arm in `decode_prototype`.

use itertools::Itertools;

use crate::error::{IrError, IrResult};
use crate::proto::{CtorRef, InstructionPrototype, Lookup, MethodRef};
use crate::tag::QualifiedName;
use crate::ty::{Constant, FloatBits32, FloatBits64, PointerKind, Type, TypeInfo, TypeResolver, TypeTable};

/// One node of the on-disk tree: an atom, or a head plus its operands.
#[derive(Debug, Clone, PartialEq)]
pub enum SExpr {
    Symbol(String),
    Int(i128),
    Bool(bool),
    Str(String),
    Node(String, Vec<SExpr>),
}

impl SExpr {
    pub fn node(head: impl Into<String>, operands: impl IntoIterator<Item = SExpr>) -> Self {
        SExpr::Node(head.into(), operands.into_iter().collect())
    }

    fn expect_node(&self) -> IrResult<(&str, &[SExpr])> {
        match self {
            SExpr::Node(head, operands) => Ok((head.as_str(), operands.as_slice())),
            other => Err(IrError::malformed(format!("expected a node, found {other}"))),
        }
    }

    fn expect_symbol(&self) -> IrResult<&str> {
        match self {
            SExpr::Symbol(s) => Ok(s.as_str()),
            other => Err(IrError::malformed(format!("expected a symbol, found {other}"))),
        }
    }

    fn expect_str(&self) -> IrResult<&str> {
        match self {
            SExpr::Str(s) => Ok(s.as_str()),
            other => Err(IrError::malformed(format!("expected a string, found {other}"))),
        }
    }

    fn expect_int(&self) -> IrResult<i128> {
        match self {
            SExpr::Int(v) => Ok(*v),
            other => Err(IrError::malformed(format!("expected an integer, found {other}"))),
        }
    }

    fn expect_bool(&self) -> IrResult<bool> {
        match self {
            SExpr::Bool(v) => Ok(*v),
            other => Err(IrError::malformed(format!("expected a boolean, found {other}"))),
        }
    }
}

impl std::fmt::Display for SExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SExpr::Symbol(s) => write!(f, "{s}"),
            SExpr::Int(v) => write!(f, "{v}"),
            SExpr::Bool(v) => write!(f, "{v}"),
            SExpr::Str(s) => write!(f, "{s:?}"),
            SExpr::Node(head, operands) => {
                write!(f, "#{head}({})", operands.iter().map(|o| o.to_string()).join(", "))
            }
        }
    }
}

fn expect_arity<'a>(head: &str, operands: &'a [SExpr], expected: usize) -> IrResult<&'a [SExpr]> {
    if operands.len() != expected {
        return Err(IrError::malformed(format!(
            "#{head} expects {expected} operand(s), found {}",
            operands.len()
        )));
    }
    Ok(operands)
}

// ---- Types ---------------------------------------------------------------

fn primitive_name(info: &TypeInfo) -> Option<String> {
    Some(match info {
        TypeInfo::Integer { bits, signed } => format!("{}{bits}", if *signed { "i" } else { "u" }),
        TypeInfo::Float { bits } => format!("f{bits}"),
        TypeInfo::Bool => "bool".to_string(),
        TypeInfo::Char => "char".to_string(),
        TypeInfo::Void => "void".to_string(),
        _ => return None,
    })
}

fn parse_primitive_name(name: &str) -> Option<TypeInfo> {
    match name {
        "bool" => Some(TypeInfo::Bool),
        "char" => Some(TypeInfo::Char),
        "void" => Some(TypeInfo::Void),
        _ => {
            let (sigil, digits) = name.split_at(1);
            let bits: u32 = digits.parse().ok()?;
            match sigil {
                "i" => Some(TypeInfo::Integer { bits, signed: true }),
                "u" => Some(TypeInfo::Integer { bits, signed: false }),
                "f" => Some(TypeInfo::Float { bits }),
                _ => None,
            }
        }
    }
}

/// Encodes `ty` as `#primitive_type("name")`, `#type_reference("FullName")`,
/// `#pointer_type(elemType, kind)` or `#of(Func, ret, params…)` for a
/// function shape — the last two built the same way the format document's
/// `#of` head composes a generic declaration with its arguments.
pub fn encode_type(ty: Type, types: &dyn TypeResolver) -> SExpr {
    let info = types.describe(ty);
    if let Some(name) = primitive_name(&info) {
        return SExpr::node("primitive_type", [SExpr::Str(name)]);
    }
    match info {
        TypeInfo::Opaque(name) => SExpr::node("type_reference", [SExpr::Str(name.to_string())]),
        TypeInfo::Pointer { pointee, kind } => {
            let kind = match kind {
                PointerKind::Unmanaged => "unmanaged",
                PointerKind::Managed => "managed",
            };
            SExpr::node("pointer_type", [encode_type(pointee, types), SExpr::Symbol(kind.to_string())])
        }
        TypeInfo::Function { ret, params } => {
            let mut operands = vec![encode_type(ret, types)];
            operands.extend(params.iter().map(|p| encode_type(*p, types)));
            SExpr::node("function_type", operands)
        }
        TypeInfo::Integer { .. } | TypeInfo::Float { .. } | TypeInfo::Bool | TypeInfo::Char | TypeInfo::Void => {
            unreachable!("primitive_name handles every primitive shape")
        }
    }
}

/// Decodes an expression produced by [`encode_type`], re-interning the
/// result into `types` — two calls that decode structurally-equal
/// expressions get back the same [`Type`] handle, exactly as direct calls
/// to [`TypeTable::intern`] would (§8 property: round-trip modulo
/// re-indexing).
pub fn decode_type(expr: &SExpr, types: &TypeTable) -> IrResult<Type> {
    let (head, operands) = expr.expect_node()?;
    match head {
        "primitive_type" => {
            let operands = expect_arity(head, operands, 1)?;
            let name = operands[0].expect_str()?;
            let info = parse_primitive_name(name)
                .ok_or_else(|| IrError::malformed(format!("unknown primitive type name {name:?}")))?;
            Ok(types.intern(info))
        }
        "type_reference" => {
            let operands = expect_arity(head, operands, 1)?;
            let name = operands[0].expect_str()?;
            Ok(types.opaque(QualifiedName::simple(name)))
        }
        "pointer_type" => {
            let operands = expect_arity(head, operands, 2)?;
            let pointee = decode_type(&operands[0], types)?;
            let kind = match operands[1].expect_symbol()? {
                "unmanaged" => PointerKind::Unmanaged,
                "managed" => PointerKind::Managed,
                other => return Err(IrError::malformed(format!("unknown pointer kind {other:?}"))),
            };
            Ok(types.pointer(pointee, kind))
        }
        "function_type" => {
            if operands.is_empty() {
                return Err(IrError::malformed("#function_type requires at least a return type"));
            }
            let ret = decode_type(&operands[0], types)?;
            let params = operands[1..].iter().map(|o| decode_type(o, types)).collect::<IrResult<Vec<_>>>()?;
            Ok(types.function(ret, params))
        }
        other => Err(IrError::malformed(format!("unrecognized type head #{other}"))),
    }
}

// ---- Constants ------------------------------------------------------------

/// Encodes a [`Constant`] as one of the `#const_*` heads. Never emits
/// `#const_bit*` or `#const_void`: those two heads exist in the format for
/// raw bit-pattern literals and a void sentinel this crate's [`Constant`]
/// has no variant for, so they are decode-only aliases (`#const_bit{N}`
/// aliases `#const_uint{N}`, `#const_void` aliases `Default(void)`).
pub fn encode_constant(c: &Constant) -> SExpr {
    match c {
        Constant::Int { bits, signed, value } => {
            let head = format!("const_{}{bits}", if *signed { "int" } else { "uint" });
            SExpr::node(head, [SExpr::Int(*value)])
        }
        Constant::Float32(bits) => SExpr::node("const_float32", [SExpr::Int(bits.0 as i128)]),
        Constant::Float64(bits) => SExpr::node("const_float64", [SExpr::Int(bits.0 as i128)]),
        Constant::Bool(v) => SExpr::node("const_bool", [SExpr::Bool(*v)]),
        Constant::Char(v) => SExpr::node("const_char", [SExpr::Str(v.to_string())]),
        Constant::String(v) => SExpr::node("const_string", [SExpr::Str(v.clone())]),
        Constant::Null => SExpr::node("const_null", []),
        Constant::Default(ty) => SExpr::node("const_default", [SExpr::Symbol(format!("{ty:?}"))]),
    }
}

fn parse_int_width(prefix: &str, head: &str) -> Option<u32> {
    head.strip_prefix(prefix)?.parse().ok()
}

/// Decodes a `#const_*` head. `#const_default`'s operand is decoded as a
/// bare type index symbol rather than a full type expression: the prototype
/// codec always supplies the enclosing instruction's own result type for a
/// `Default` constant instead of round-tripping one independently, so this
/// path only needs to exist for completeness (§8 "round-trip … modulo table
/// re-indexing").
pub fn decode_constant(expr: &SExpr, default_ty: Type) -> IrResult<Constant> {
    let (head, operands) = expr.expect_node()?;
    if let Some(bits) = parse_int_width("const_int", head) {
        let operands = expect_arity(head, operands, 1)?;
        return Ok(Constant::Int { bits, signed: true, value: operands[0].expect_int()? });
    }
    if let Some(bits) = parse_int_width("const_uint", head) {
        let operands = expect_arity(head, operands, 1)?;
        return Ok(Constant::Int { bits, signed: false, value: operands[0].expect_int()? });
    }
    if let Some(bits) = parse_int_width("const_bit", head) {
        let operands = expect_arity(head, operands, 1)?;
        return Ok(Constant::Int { bits, signed: false, value: operands[0].expect_int()? });
    }
    match head {
        "const_float32" => {
            let operands = expect_arity(head, operands, 1)?;
            Ok(Constant::Float32(FloatBits32(operands[0].expect_int()? as u32)))
        }
        "const_float64" => {
            let operands = expect_arity(head, operands, 1)?;
            Ok(Constant::Float64(FloatBits64(operands[0].expect_int()? as u64)))
        }
        "const_bool" => {
            let operands = expect_arity(head, operands, 1)?;
            Ok(Constant::Bool(operands[0].expect_bool()?))
        }
        "const_char" => {
            let operands = expect_arity(head, operands, 1)?;
            let s = operands[0].expect_str()?;
            let mut chars = s.chars();
            let c = chars.next().ok_or_else(|| IrError::malformed("#const_char's string is empty"))?;
            if chars.next().is_some() {
                return Err(IrError::malformed("#const_char's string has more than one character"));
            }
            Ok(Constant::Char(c))
        }
        "const_string" => {
            let operands = expect_arity(head, operands, 1)?;
            Ok(Constant::String(operands[0].expect_str()?.to_string()))
        }
        "const_null" => {
            expect_arity(head, operands, 0)?;
            Ok(Constant::Null)
        }
        "const_void" => {
            expect_arity(head, operands, 0)?;
            Ok(Constant::Default(default_ty))
        }
        "const_default" => {
            expect_arity(head, operands, 1)?;
            Ok(Constant::Default(default_ty))
        }
        other => Err(IrError::malformed(format!("unrecognized constant head #{other}"))),
    }
}

// ---- Method/constructor references ----------------------------------------

fn encode_method_ref(m: &MethodRef, types: &dyn TypeResolver) -> SExpr {
    SExpr::node(
        "method_reference",
        [
            SExpr::Str(m.owner.to_string()),
            SExpr::Str(m.name.clone()),
            SExpr::Bool(m.is_static),
            encode_type(m.ret, types),
            SExpr::node("params", m.params.iter().map(|p| encode_type(*p, types))),
        ],
    )
}

fn decode_method_ref(expr: &SExpr, types: &TypeTable) -> IrResult<MethodRef> {
    let (head, operands) = expr.expect_node()?;
    let operands = expect_arity(head, operands, 5)?;
    let owner = QualifiedName::simple(operands[0].expect_str()?);
    let name = operands[1].expect_str()?.to_string();
    let is_static = operands[2].expect_bool()?;
    let ret = decode_type(&operands[3], types)?;
    let (params_head, params_operands) = operands[4].expect_node()?;
    expect_arity(params_head, params_operands, params_operands.len())?;
    let params = params_operands.iter().map(|o| decode_type(o, types)).collect::<IrResult<Vec<_>>>()?;
    Ok(MethodRef { owner, name, is_static, ret, params })
}

fn encode_ctor_ref(c: &CtorRef, types: &dyn TypeResolver) -> SExpr {
    SExpr::node(
        "ctor_reference",
        [SExpr::Str(c.owner.to_string()), SExpr::node("params", c.params.iter().map(|p| encode_type(*p, types)))],
    )
}

fn decode_ctor_ref(expr: &SExpr, types: &TypeTable) -> IrResult<CtorRef> {
    let (head, operands) = expr.expect_node()?;
    let operands = expect_arity(head, operands, 2)?;
    let owner = QualifiedName::simple(operands[0].expect_str()?);
    let (params_head, params_operands) = operands[1].expect_node()?;
    expect_arity(params_head, params_operands, params_operands.len())?;
    let params = params_operands.iter().map(|o| decode_type(o, types)).collect::<IrResult<Vec<_>>>()?;
    Ok(CtorRef { owner, params })
}

fn encode_lookup(l: Lookup) -> SExpr {
    SExpr::Symbol(match l {
        Lookup::Static => "static".to_string(),
        Lookup::Virtual => "virtual".to_string(),
    })
}

fn decode_lookup(expr: &SExpr) -> IrResult<Lookup> {
    match expr.expect_symbol()? {
        "static" => Ok(Lookup::Static),
        "virtual" => Ok(Lookup::Virtual),
        other => Err(IrError::malformed(format!("unknown lookup kind {other:?}"))),
    }
}

// ---- Instruction prototypes ------------------------------------------------

/// Encodes the instruction-prototype subset of the format this crate
/// implements. `Intrinsic` is deliberately absent: the format names no head
/// for it, and it is this crate's own addition (§4.1) rather than a format
/// head the codec is obliged to round-trip yet.
pub fn encode_prototype(proto: &InstructionPrototype, types: &dyn TypeResolver) -> IrResult<SExpr> {
    Ok(match proto {
        InstructionPrototype::Alloca(t) => SExpr::node("alloca", [encode_type(*t, types)]),
        InstructionPrototype::AllocaArray(t) => SExpr::node("alloca_array", [encode_type(*t, types)]),
        InstructionPrototype::Constant(c, _) => SExpr::node("const", [encode_constant(c)]),
        InstructionPrototype::Copy(t) => SExpr::node("copy", [encode_type(*t, types)]),
        InstructionPrototype::Load(t) => SExpr::node("load", [encode_type(*t, types)]),
        InstructionPrototype::Store(t) => SExpr::node("store", [encode_type(*t, types)]),
        InstructionPrototype::Call(m, l) => SExpr::node("call", [encode_method_ref(m, types), encode_lookup(*l)]),
        InstructionPrototype::IndirectCall(ret, params) => SExpr::node(
            "indirect_call",
            [encode_type(*ret, types), SExpr::node("params", params.iter().map(|p| encode_type(*p, types)))],
        ),
        InstructionPrototype::NewObject(c) => SExpr::node("new_object", [encode_ctor_ref(c, types)]),
        InstructionPrototype::NewDelegate(t, m, has_this, l) => SExpr::node(
            "new_delegate",
            [encode_type(*t, types), encode_method_ref(m, types), SExpr::Bool(*has_this), encode_lookup(*l)],
        ),
        InstructionPrototype::ReinterpretCast(t) => SExpr::node("reinterpret_cast", [encode_type(*t, types)]),
        InstructionPrototype::Intrinsic(..) => {
            return Err(IrError::not_supported("encoding an Intrinsic prototype (no format head is reserved for it)"))
        }
    })
}

/// Decodes an expression produced by [`encode_prototype`]. `default_ty` is
/// used only by a nested `#const_default`/`#const_void`; every other head
/// carries its own result type explicitly.
pub fn decode_prototype(expr: &SExpr, types: &TypeTable, default_ty: Type) -> IrResult<InstructionPrototype> {
    let (head, operands) = expr.expect_node()?;
    match head {
        "alloca" => {
            let operands = expect_arity(head, operands, 1)?;
            Ok(InstructionPrototype::Alloca(decode_type(&operands[0], types)?))
        }
        "alloca_array" => {
            let operands = expect_arity(head, operands, 1)?;
            Ok(InstructionPrototype::AllocaArray(decode_type(&operands[0], types)?))
        }
        "const" => {
            let operands = expect_arity(head, operands, 1)?;
            let constant = decode_constant(&operands[0], default_ty)?;
            let ty = constant.ty(types);
            Ok(InstructionPrototype::Constant(constant, ty))
        }
        "copy" => {
            let operands = expect_arity(head, operands, 1)?;
            Ok(InstructionPrototype::Copy(decode_type(&operands[0], types)?))
        }
        "load" => {
            let operands = expect_arity(head, operands, 1)?;
            Ok(InstructionPrototype::Load(decode_type(&operands[0], types)?))
        }
        "store" => {
            let operands = expect_arity(head, operands, 1)?;
            Ok(InstructionPrototype::Store(decode_type(&operands[0], types)?))
        }
        "call" => {
            let operands = expect_arity(head, operands, 2)?;
            Ok(InstructionPrototype::Call(decode_method_ref(&operands[0], types)?, decode_lookup(&operands[1])?))
        }
        "indirect_call" => {
            let operands = expect_arity(head, operands, 2)?;
            let ret = decode_type(&operands[0], types)?;
            let (params_head, params_operands) = operands[1].expect_node()?;
            expect_arity(params_head, params_operands, params_operands.len())?;
            let params = params_operands.iter().map(|o| decode_type(o, types)).collect::<IrResult<Vec<_>>>()?;
            Ok(InstructionPrototype::IndirectCall(ret, params))
        }
        "new_object" => {
            let operands = expect_arity(head, operands, 1)?;
            Ok(InstructionPrototype::NewObject(decode_ctor_ref(&operands[0], types)?))
        }
        "new_delegate" => {
            let operands = expect_arity(head, operands, 4)?;
            let ty = decode_type(&operands[0], types)?;
            let method = decode_method_ref(&operands[1], types)?;
            let has_this = operands[2].expect_bool()?;
            let lookup = decode_lookup(&operands[3])?;
            Ok(InstructionPrototype::NewDelegate(ty, method, has_this, lookup))
        }
        "reinterpret_cast" => {
            let operands = expect_arity(head, operands, 1)?;
            Ok(InstructionPrototype::ReinterpretCast(decode_type(&operands[0], types)?))
        }
        other => Err(IrError::not_supported(format!("decoding prototype head #{other}"))),
    }
}
