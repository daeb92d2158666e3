//! The crate-wide error taxonomy (§7, SPEC_FULL.md §3A "Crate error enum").
//!
//! Every fallible core API returns `Result<T, IrError>`. Nothing in the
//! core panics on malformed *input* (a bytecode body, a graph built by a
//! misbehaving caller); panics stay reserved for violated internal
//! invariants of this crate's own bookkeeping, the same split the teacher
//! draws between `bug!`/`span_bug!` and ordinary `Result`-returning
//! fallible queries.

use thiserror::Error;

use crate::tag::{BlockTag, Tag, ValueTag};

/// One kind per taxonomy entry in §7. Each variant carries the context
/// needed to render a useful message without the caller needing to
/// reconstruct it (offending tag, instruction index, expected vs. actual
/// type name, opcode name).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IrError {
    /// A validator- or translator-detected invariant failure (§3
    /// invariants, §4.5 `IncompatibleStackContents`).
    #[error("malformed IR: {0}")]
    MalformedIr(String),

    /// A transform encountered a prototype/opcode it cannot lower.
    #[error("not supported: {0}")]
    NotSupportedOperation(String),

    /// [`crate::cache::MacroAnalysisCache::get_result_as`] was queried for
    /// a result type with no registered provider.
    #[error("no analysis is registered for result type {0}")]
    AnalysisNotRegistered(String),

    /// `Wfatal-errors` or `fmax-errors` tripped (§6.2, §6.3).
    #[error("compilation aborted after {error_count} error(s): {reason}")]
    AbortCompilation { reason: String, error_count: usize },

    /// The front-end failed to provide a requested source file. Reported
    /// as an ordinary error, not fatal unless the driver's config says so.
    #[error("source unavailable: {0}")]
    UnavailableSource(String),
}

impl IrError {
    pub fn malformed(message: impl Into<String>) -> Self {
        IrError::MalformedIr(message.into())
    }

    pub fn dangling_value(tag: ValueTag) -> Self {
        IrError::MalformedIr(format!("dangling reference to value {:?}", tag))
    }

    pub fn branch_outside_graph(target: BlockTag) -> Self {
        IrError::MalformedIr(format!("branch to block {:?} outside of graph", target))
    }

    pub fn not_supported(what: impl Into<String>) -> Self {
        IrError::NotSupportedOperation(what.into())
    }

    pub fn analysis_not_registered(type_name: impl Into<String>) -> Self {
        IrError::AnalysisNotRegistered(type_name.into())
    }
}

pub type IrResult<T> = Result<T, IrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_name_the_offending_tag() {
        let interner = crate::tag::TagInterner::new();
        let tag = interner.fresh_block("orphan");
        let err = IrError::branch_outside_graph(tag);
        assert!(err.to_string().contains("outside of graph"));
    }
}
