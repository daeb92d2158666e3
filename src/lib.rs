//! A language-neutral compiler mid-end: a persistent control-flow-graph
//! IR, a mutable builder façade over it, a reference-counted per-graph
//! analysis cache, a CIL-family bytecode translator, an IR validator, a
//! member-level type verifier, an intraprocedural transform scaffold, and
//! an on-disk symbolic-expression text format.
//!
//! Modules are layered roughly front-to-back: [`tag`] and [`ty`] are the
//! identity/type primitives everything else is built from; [`inst`] and
//! [`proto`] describe one instruction; [`graph`] assembles instructions
//! into basic blocks and [`builder`] is the mutable view most callers
//! actually edit through; [`cache`] memoizes analyses over a graph;
//! [`cil`] and [`translate`] bring a graph in from bytecode;
//! [`validate`] and [`typeverify`] check one before it is trusted further;
//! [`transform`] rewrites a validated graph; [`sexpr`] reads and writes
//! the whole thing to text; [`diag`] and [`error`] are the ambient
//! reporting and fallibility surface threaded through all of the above.

pub mod builder;
pub mod cache;
pub mod cil;
pub mod diag;
pub mod error;
pub mod graph;
pub mod inst;
pub mod proto;
pub mod sexpr;
pub mod tag;
pub mod transform;
pub mod translate;
pub mod ty;
pub mod typeverify;
pub mod validate;

pub use builder::FlowGraphBuilder;
pub use cache::MacroAnalysisCache;
pub use cil::{CilBody, CilInstruction, Opcode};
pub use diag::{CompilerConfig, Diagnostic, ErrorSink, Severity, SourceRange};
pub use error::{IrError, IrResult};
pub use graph::{BasicBlock, BlockParameter, FlowGraph, MethodBody};
pub use inst::{Branch, BranchArgument, BlockFlow, Instruction};
pub use proto::{CtorRef, ExceptionSpec, InstructionPrototype, Lookup, MethodRef, Prototype, PrototypeInterner};
pub use sexpr::SExpr;
pub use tag::{BlockTag, QualifiedName, Tag, TagInterner, ValueTag};
pub use transform::{DelegateModel, lower_delegates, simplify_cfg};
pub use translate::{TranslatorEnv, translate};
pub use ty::{Constant, PointerKind, Type, TypeInfo, TypeResolver, TypeTable};
pub use typeverify::{BaseTypeShape, MethodShape, TypeShape, TypeShapeKind, verify_type};
