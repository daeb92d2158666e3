//! Identity tokens for blocks and values.
//!
//! A [`Tag`] never compares by its display name: two tags are the same
//! value iff they were produced by the same call to [`TagInterner::fresh`].
//! The name exists purely so that dumps of the graph are readable; renaming
//! a tag's display hint never changes graph identity.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Which namespace a [`Tag`] was minted in. Block tags and value tags never
/// compare equal to one another even if their raw ids collide, because the
/// kind is folded into equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Block,
    Value,
}

/// Opaque identity, carrying a display hint for humans.
///
/// Cloning a `Tag` is cheap (it's a small `Copy` struct); all the tags
/// produced from one [`TagInterner`] are totally ordered by mint order,
/// which callers may use to get a deterministic iteration order without
/// reading the display hint.
#[derive(Clone, Copy, Eq)]
pub struct Tag {
    id: u32,
    kind: TagKind,
    name: &'static str,
}

impl Tag {
    pub fn kind(&self) -> TagKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn raw(&self) -> (TagKind, u32) {
        (self.kind, self.id)
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.raw() == other.raw()
    }
}

impl std::hash::Hash for Tag {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw().hash(state)
    }
}

impl PartialOrd for Tag {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tag {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.raw().cmp(&other.raw())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sigil = match self.kind {
            TagKind::Block => "bb",
            TagKind::Value => "v",
        };
        write!(f, "{}{}_{}", sigil, self.id, self.name)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A [`Tag`] known (by construction) to be a block tag.
pub type BlockTag = Tag;
/// A [`Tag`] known (by construction) to be a value tag.
pub type ValueTag = Tag;

/// Mints fresh, process-unique tags. One interner is shared by a
/// [`crate::graph::FlowGraph`] family: every snapshot derived from a
/// builder shares the same interner, so tags stay comparable across edits.
///
/// Grounded on the teacher's `rustc_span::Symbol`/`rustc_index` newtype-index
/// convention: identity is a small integer, display is a separate concern.
pub struct TagInterner {
    next_block: AtomicU32,
    next_value: AtomicU32,
}

impl Default for TagInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl TagInterner {
    pub fn new() -> Self {
        TagInterner { next_block: AtomicU32::new(0), next_value: AtomicU32::new(0) }
    }

    pub fn fresh_block(&self, name: &'static str) -> BlockTag {
        let id = self.next_block.fetch_add(1, Ordering::Relaxed);
        Tag { id, kind: TagKind::Block, name }
    }

    pub fn fresh_value(&self, name: &'static str) -> ValueTag {
        let id = self.next_value.fetch_add(1, Ordering::Relaxed);
        Tag { id, kind: TagKind::Value, name }
    }
}

/// A qualified, dotted name (`Namespace.Outer.Inner`) used to identify
/// methods, fields and types at the IR/text-format boundary. Distinct from
/// [`Tag`]: qualified names compare structurally, tags compare by identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    segments: Vec<String>,
}

impl QualifiedName {
    pub fn new(segments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        QualifiedName { segments: segments.into_iter().map(Into::into).collect() }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn simple(name: impl Into<String>) -> Self {
        QualifiedName { segments: vec![name.into()] }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_tags_are_distinct() {
        let interner = TagInterner::new();
        let a = interner.fresh_value("a");
        let b = interner.fresh_value("a");
        assert_ne!(a, b, "two mints with the same display hint must still differ by identity");
    }

    #[test]
    fn block_and_value_tags_never_collide() {
        let interner = TagInterner::new();
        let block = interner.fresh_block("entry");
        let value = interner.fresh_value("entry");
        assert_ne!(block, value, "kind is folded into equality even if raw ids match");
    }

    #[test]
    fn display_hint_does_not_affect_identity() {
        let interner = TagInterner::new();
        let a = interner.fresh_value("alpha");
        let b = a;
        assert_eq!(a, b);
        assert_eq!(a.name(), "alpha");
    }

    #[test]
    fn qualified_name_display() {
        let qn = QualifiedName::new(["System", "Collections", "List"]);
        assert_eq!(qn.to_string(), "System.Collections.List");
    }
}
