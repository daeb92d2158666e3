//! The macro analysis cache (§4.3): a cache of per-graph analysis results,
//! indexed by the analysis's own result type, so that a graph edit can
//! invalidate exactly the analyses it touched without walking every live
//! result.
//!
//! Grounded on the teacher's `MirBorrowckCtxt`/`BodyCache`-style "compute
//! once, invalidate on dirty" pattern in `librustc_mir`, generalized here
//! from "one fixed analysis" to "any number of analyses keyed by
//! `TypeId`".

use std::any::{Any, TypeId};

use rustc_hash::FxHashMap;

use crate::error::{IrError, IrResult};

/// One cached analysis result.
struct Slot {
    type_id: TypeId,
    type_name: &'static str,
    value: Box<dyn Any>,
}

/// A cache of analysis results for one [`crate::graph::FlowGraph`],
/// indexed by result type (§4.3). At most one slot exists per `TypeId` at
/// any time; [`Self::with_analysis`] installs or replaces it, `update`
/// drops a named set of them in bulk.
#[derive(Default)]
pub struct MacroAnalysisCache {
    slots: Vec<Slot>,
    index: FxHashMap<TypeId, usize>,
}

impl MacroAnalysisCache {
    pub fn new() -> Self {
        MacroAnalysisCache::default()
    }

    /// Runs `compute` and installs its result as `T`'s slot, replacing
    /// whatever was cached for `T` before (§8 property 6, S5: a single
    /// `with_analysis(A')` call replaces a prior `A` outright — callers
    /// that merely want the existing result without forcing a fresh
    /// computation should use [`Self::get_result_as`] instead).
    pub fn with_analysis<T: 'static>(&mut self, compute: impl FnOnce() -> T) -> &T {
        let type_id = TypeId::of::<T>();
        let value: Box<dyn Any> = Box::new(compute());
        if let Some(&slot_index) = self.index.get(&type_id) {
            self.slots[slot_index].value = value;
        } else {
            let slot_index = self.slots.len();
            self.slots.push(Slot { type_id, type_name: std::any::type_name::<T>(), value });
            self.index.insert(type_id, slot_index);
        }
        let slot_index = self.index[&type_id];
        self.slots[slot_index].value.downcast_ref::<T>().expect("slot type_id matches T by construction")
    }

    /// Reads back an already-computed result without recomputing it.
    /// Returns [`IrError::AnalysisNotRegistered`] if `T` was never cached
    /// (or was since invalidated by [`Self::update`]).
    pub fn get_result_as<T: 'static>(&self) -> IrResult<&T> {
        let type_id = TypeId::of::<T>();
        let slot_index = *self
            .index
            .get(&type_id)
            .ok_or_else(|| IrError::analysis_not_registered(std::any::type_name::<T>()))?;
        Ok(self.slots[slot_index].value.downcast_ref::<T>().expect("slot type_id matches T by construction"))
    }

    /// Drops every analysis the caller names as invalidated by a graph
    /// edit, compacting the slot list so invalidated `TypeId`s stop
    /// resolving until something calls [`Self::with_analysis`] for them
    /// again.
    ///
    /// The bugfix this exists to regression-test (§4.3, §8 property 8):
    /// compaction must walk the *previous* distinct-slot list captured
    /// before this call started removing entries, never the list
    /// `update` is still in the middle of rebuilding — iterating the
    /// in-progress output means a slot invalidated earlier in the same
    /// call can silently vanish from `self.index` without its replacement
    /// ever being reachable again (a dangling index entry pointing past
    /// the rebuilt `self.slots`).
    pub fn update(&mut self, invalidated: &[TypeId]) {
        let previous_slots = std::mem::take(&mut self.slots);
        self.index.clear();
        let mut rebuilt = Vec::with_capacity(previous_slots.len());
        for slot in previous_slots {
            if invalidated.contains(&slot.type_id) {
                continue;
            }
            let new_index = rebuilt.len();
            self.index.insert(slot.type_id, new_index);
            rebuilt.push(slot);
        }
        self.slots = rebuilt;
    }

    /// Analysis type names currently cached, for diagnostics/debugging.
    pub fn cached_type_names(&self) -> Vec<&'static str> {
        self.slots.iter().map(|s| s.type_name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    struct DominatorTree(Vec<u32>);

    #[derive(Debug, PartialEq, Eq)]
    struct LoopInfo(usize);

    #[test]
    fn with_analysis_replaces_existing_slot_value() {
        let mut cache = MacroAnalysisCache::new();
        let dom = cache.with_analysis(|| DominatorTree(vec![0, 1]));
        assert_eq!(dom.0, vec![0, 1]);
        let dom2 = cache.with_analysis(|| DominatorTree(vec![9, 9]));
        assert_eq!(dom2.0, vec![9, 9], "a later with_analysis call for the same type replaces the cached value");
        assert_eq!(cache.get_result_as::<DominatorTree>().unwrap().0, vec![9, 9]);
    }

    #[test]
    fn s5_with_analysis_replaces_one_slot_and_leaves_the_other() {
        // S5: a cache holding A (result T1) and B (result T2); a single
        // with_analysis(A') call replaces A while T2 still reads B.
        let mut cache = MacroAnalysisCache::new();
        cache.with_analysis(|| DominatorTree(vec![1]));
        cache.with_analysis(|| LoopInfo(7));
        cache.with_analysis(|| DominatorTree(vec![2, 2]));
        assert_eq!(cache.get_result_as::<DominatorTree>().unwrap().0, vec![2, 2]);
        assert_eq!(cache.get_result_as::<LoopInfo>().unwrap().0, 7);
    }

    #[test]
    fn get_result_as_reports_unregistered_analysis() {
        let cache = MacroAnalysisCache::new();
        let result = cache.get_result_as::<DominatorTree>();
        assert!(matches!(result, Err(IrError::AnalysisNotRegistered(_))));
    }

    #[test]
    fn update_invalidates_named_analyses_only() {
        let mut cache = MacroAnalysisCache::new();
        cache.with_analysis(|| DominatorTree(vec![1]));
        cache.with_analysis(|| LoopInfo(3));
        cache.update(&[TypeId::of::<DominatorTree>()]);
        assert!(cache.get_result_as::<DominatorTree>().is_err());
        assert_eq!(cache.get_result_as::<LoopInfo>().unwrap().0, 3);
    }

    #[test]
    fn update_compacts_correctly_when_invalidating_an_earlier_slot() {
        // Regression test for the "iterate the list being built, not the
        // previous one" bugfix: invalidate the *first*-inserted slot so
        // any implementation that walks `self.slots` while it's still
        // being rebuilt (rather than a separately captured previous list)
        // would lose track of the slots after it.
        let mut cache = MacroAnalysisCache::new();
        cache.with_analysis(|| DominatorTree(vec![1]));
        cache.with_analysis(|| LoopInfo(42));
        cache.update(&[TypeId::of::<DominatorTree>()]);
        assert_eq!(cache.get_result_as::<LoopInfo>().unwrap().0, 42, "surviving slot must remain reachable after compaction");
        assert_eq!(cache.cached_type_names(), vec![std::any::type_name::<LoopInfo>()]);
    }

    #[test]
    fn recompute_after_invalidation_stores_the_new_value() {
        let mut cache = MacroAnalysisCache::new();
        cache.with_analysis(|| DominatorTree(vec![1]));
        cache.update(&[TypeId::of::<DominatorTree>()]);
        let recomputed = cache.with_analysis(|| DominatorTree(vec![2, 3]));
        assert_eq!(recomputed.0, vec![2, 3]);
    }
}
