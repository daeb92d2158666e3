//! The member-level type verifier (§4.7).
//!
//! Unlike [`crate::validate`], which walks a [`crate::graph::FlowGraph`],
//! this module never touches IR at all: it walks a [`TypeShape`] — a
//! plain-data description of one type's fields, methods, properties and
//! base types, supplied by whatever front-end or type-system layer sits
//! above the core — and checks the handful of shape-level invariants the
//! core cares about before it will hand that type's members to the
//! translator. It reports through the same [`ErrorSink`] as the rest of
//! the pipeline (§4.4, §6.3), grounded on `validate`'s own
//! diagnostic-per-violation convention rather than failing fast on the
//! first problem found.

use crate::diag::{Diagnostic, ErrorSink};
use crate::error::IrResult;
use crate::tag::QualifiedName;
use crate::ty::{Type, TypeInfo, TypeResolver};

/// What shape of declaration a [`TypeShape`] (or one of its bases)
/// describes. `Enum`'s payload is the backing type a front-end assigned it,
/// which may or may not be a primitive integral type — checking that is
/// exactly [`verify_type`]'s first job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeShapeKind {
    Class,
    Struct,
    Interface,
    Enum { underlying: Type },
}

/// One method as the verifier needs to see it: just enough to tell whether
/// it satisfies an abstract base member.
#[derive(Debug, Clone)]
pub struct MethodShape {
    pub name: String,
    pub is_abstract: bool,
}

/// A base type (class or interface) a [`TypeShape`] declares, flattened to
/// the facts the verifier needs rather than a recursive `TypeShape` — the
/// front-end already knows whether a base supports being derived from; the
/// verifier should not have to re-derive that from the base's own shape.
#[derive(Debug, Clone)]
pub struct BaseTypeShape {
    pub name: QualifiedName,
    pub is_interface: bool,
    pub is_abstract: bool,
    /// `true` if the base type permits derivation at all — declares at
    /// least one virtual/overridable member, or is itself open for
    /// subclassing. A sealed, non-abstract, non-interface base fails this.
    pub supports_virtual_dispatch: bool,
    /// Names of members the base declares abstract; a deriving type must
    /// supply a concrete (non-abstract) method of the same name.
    pub abstract_members: Vec<String>,
}

/// The plain-data description one type hands the verifier: its own kind
/// and methods, plus its base types (§4.7 "consumes a description supplied
/// by the driver"). Fields and properties are part of the description the
/// verifier is handed but, short of the enum-backing check, do not
/// currently feed any check of their own.
#[derive(Debug, Clone)]
pub struct TypeShape {
    pub name: QualifiedName,
    pub kind: TypeShapeKind,
    pub methods: Vec<MethodShape>,
    pub base_types: Vec<BaseTypeShape>,
}

/// Walks `shape`'s own kind, then each of its base types, pushing one
/// [`Diagnostic`] per violation into `sink` (§4.7):
///
/// - an `Enum` backed by anything other than a primitive integral type;
/// - a base type that is neither an interface nor abstract nor otherwise
///   open to derivation;
/// - an abstract member a base declares that `shape` never implements.
///
/// Returns `Err` only if `sink` itself aborts under its configured
/// `Wfatal-errors`/`fmax-errors` policy, exactly as [`crate::validate::validate`] does.
pub fn verify_type(shape: &TypeShape, types: &dyn TypeResolver, sink: &mut ErrorSink) -> IrResult<()> {
    if let TypeShapeKind::Enum { underlying } = shape.kind {
        if !matches!(types.describe(underlying), TypeInfo::Integer { .. }) {
            sink.push(Diagnostic::error(
                "enum backed by non-primitive type",
                format!(
                    "{} is an enum but its underlying type ({}) is not a primitive integral type",
                    shape.name,
                    types.display_name(underlying),
                ),
            ))?;
        }
    }

    for base in &shape.base_types {
        if !base.is_interface && !base.is_abstract && !base.supports_virtual_dispatch {
            sink.push(Diagnostic::error(
                "base type does not support inheritance",
                format!(
                    "{} inherits from {}, which is neither abstract, an interface, nor open to derivation",
                    shape.name, base.name,
                ),
            ))?;
        }

        for member in &base.abstract_members {
            let implemented = shape.methods.iter().any(|m| &m.name == member && !m.is_abstract);
            if !implemented {
                sink.push(Diagnostic::error(
                    "abstract member not implemented",
                    format!("{} does not implement {}'s abstract member `{}`", shape.name, base.name, member),
                ))?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::TypeTable;

    fn class(name: &str) -> TypeShape {
        TypeShape {
            name: QualifiedName::simple(name),
            kind: TypeShapeKind::Class,
            methods: Vec::new(),
            base_types: Vec::new(),
        }
    }

    #[test]
    fn well_formed_type_reports_no_errors() {
        let types = TypeTable::new();
        let shape = class("Widget");
        let mut sink = ErrorSink::new(Default::default());
        verify_type(&shape, &*types, &mut sink).unwrap();
        assert!(!sink.has_errors());
    }

    #[test]
    fn enum_backed_by_opaque_type_is_reported() {
        let types = TypeTable::new();
        let object_ty = types.opaque(QualifiedName::simple("System.Object"));
        let mut shape = class("Color");
        shape.kind = TypeShapeKind::Enum { underlying: object_ty };
        let mut sink = ErrorSink::new(Default::default());
        verify_type(&shape, &*types, &mut sink).unwrap();
        assert!(sink.has_errors());
    }

    #[test]
    fn enum_backed_by_integer_is_accepted() {
        let types = TypeTable::new();
        let i32t = types.int(32, true);
        let mut shape = class("Color");
        shape.kind = TypeShapeKind::Enum { underlying: i32t };
        let mut sink = ErrorSink::new(Default::default());
        verify_type(&shape, &*types, &mut sink).unwrap();
        assert!(!sink.has_errors());
    }

    #[test]
    fn sealed_concrete_base_is_reported() {
        let types = TypeTable::new();
        let mut shape = class("Derived");
        shape.base_types.push(BaseTypeShape {
            name: QualifiedName::simple("Sealed"),
            is_interface: false,
            is_abstract: false,
            supports_virtual_dispatch: false,
            abstract_members: Vec::new(),
        });
        let mut sink = ErrorSink::new(Default::default());
        verify_type(&shape, &*types, &mut sink).unwrap();
        assert!(sink.has_errors());
    }

    #[test]
    fn interface_base_is_accepted_even_when_sealed_fields_are_false() {
        let types = TypeTable::new();
        let mut shape = class("Derived");
        shape.base_types.push(BaseTypeShape {
            name: QualifiedName::simple("IWidget"),
            is_interface: true,
            is_abstract: false,
            supports_virtual_dispatch: false,
            abstract_members: vec!["Render".to_string()],
        });
        shape.methods.push(MethodShape { name: "Render".to_string(), is_abstract: false });
        let mut sink = ErrorSink::new(Default::default());
        verify_type(&shape, &*types, &mut sink).unwrap();
        assert!(!sink.has_errors());
    }

    #[test]
    fn missing_abstract_member_implementation_is_reported() {
        let types = TypeTable::new();
        let mut shape = class("Derived");
        shape.base_types.push(BaseTypeShape {
            name: QualifiedName::simple("Base"),
            is_interface: false,
            is_abstract: true,
            supports_virtual_dispatch: true,
            abstract_members: vec!["DoWork".to_string()],
        });
        let mut sink = ErrorSink::new(Default::default());
        verify_type(&shape, &*types, &mut sink).unwrap();
        assert!(sink.has_errors());
    }

    #[test]
    fn abstract_member_re_declared_abstract_does_not_count_as_implemented() {
        let types = TypeTable::new();
        let mut shape = class("StillAbstract");
        shape.base_types.push(BaseTypeShape {
            name: QualifiedName::simple("Base"),
            is_interface: false,
            is_abstract: true,
            supports_virtual_dispatch: true,
            abstract_members: vec!["DoWork".to_string()],
        });
        shape.methods.push(MethodShape { name: "DoWork".to_string(), is_abstract: true });
        let mut sink = ErrorSink::new(Default::default());
        verify_type(&shape, &*types, &mut sink).unwrap();
        assert!(sink.has_errors());
    }

    #[test]
    fn multiple_bases_each_contribute_diagnostics() {
        let types = TypeTable::new();
        let mut shape = class("Derived");
        shape.base_types.push(BaseTypeShape {
            name: QualifiedName::simple("SealedOne"),
            is_interface: false,
            is_abstract: false,
            supports_virtual_dispatch: false,
            abstract_members: Vec::new(),
        });
        shape.base_types.push(BaseTypeShape {
            name: QualifiedName::simple("AbstractOne"),
            is_interface: false,
            is_abstract: true,
            supports_virtual_dispatch: true,
            abstract_members: vec!["Missing".to_string()],
        });
        let mut sink = ErrorSink::new(Default::default());
        verify_type(&shape, &*types, &mut sink).unwrap();
        assert_eq!(sink.error_count(), 2);
    }
}
