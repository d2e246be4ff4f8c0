//! # Transition Cache
//!
//! Per-arc memo of accumulated transitions, used by the wrt resolver.
//!
//! Each arc caches the composition of every transition from the top of its
//! subtree segment (a root, or the nearest instanced node above it) down to
//! and including the arc itself. Every entry records two `UpdateSeq` stamps:
//!
//! - `computed`: when the value was last recomputed,
//! - `verified`: when it was last confirmed still correct.
//!
//! `cached_compose` refreshes a cache from the parent segment's cache and the
//! arc's own transitions, recomputing only the kinds whose inputs changed.

use crate::transition::Transition;
use crate::transition_set::{TransitionSet, compose_slots};
use crate::update_seq::UpdateSeq;
use crate::{ArcId, NodeId, StrataError, TransitionKind};
use std::collections::{BTreeMap, BTreeSet};

/// One memoized kind. `trans == None` is the identity.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    trans: Option<Transition>,
    computed: UpdateSeq,
    verified: UpdateSeq,
}

impl CacheEntry {
    #[must_use]
    pub fn new(trans: Option<Transition>, now: UpdateSeq) -> Self {
        Self {
            trans,
            computed: now,
            verified: now,
        }
    }

    #[must_use]
    pub fn transition(&self) -> Option<&Transition> {
        self.trans.as_ref()
    }

    #[must_use]
    pub fn computed(&self) -> UpdateSeq {
        self.computed
    }

    #[must_use]
    pub fn verified(&self) -> UpdateSeq {
        self.verified
    }
}

/// Memoized accumulation keyed by kind.
///
/// `epoch` is when the cache was last rebuilt from scratch; a kind without an
/// entry counts as computed at `epoch`. `dirty` lists kinds whose input on
/// the owning arc changed since the last refresh.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransitionCache {
    entries: BTreeMap<TransitionKind, CacheEntry>,
    dirty: BTreeSet<TransitionKind>,
    epoch: UpdateSeq,
}

impl TransitionCache {
    /// An empty cache rebuilt at `epoch`.
    #[must_use]
    pub fn new(epoch: UpdateSeq) -> Self {
        Self {
            entries: BTreeMap::new(),
            dirty: BTreeSet::new(),
            epoch,
        }
    }

    #[must_use]
    pub fn epoch(&self) -> UpdateSeq {
        self.epoch
    }

    #[must_use]
    pub fn get(&self, kind: TransitionKind) -> Option<&CacheEntry> {
        self.entries.get(&kind)
    }

    #[must_use]
    pub fn transition(&self, kind: TransitionKind) -> Option<&Transition> {
        self.entries.get(&kind).and_then(CacheEntry::transition)
    }

    /// When the value for `kind` last changed.
    #[must_use]
    pub fn stamp(&self, kind: TransitionKind) -> UpdateSeq {
        self.entries
            .get(&kind)
            .map(|e| e.computed)
            .unwrap_or(self.epoch)
    }

    /// Mark `kind` so the next refresh recomputes it, even when neither
    /// input still carries it.
    pub fn invalidate(&mut self, kind: TransitionKind) {
        self.dirty.insert(kind);
    }

    #[must_use]
    pub fn is_dirty(&self, kind: TransitionKind) -> bool {
        self.dirty.contains(&kind)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The non-identity values as a plain set.
    #[must_use]
    pub fn to_set(&self) -> TransitionSet {
        self.entries
            .iter()
            .filter_map(|(k, e)| e.trans.clone().map(|t| (*k, t)))
            .collect()
    }

    /// Refresh `cache`, the previous value of `a ∘ b`, against fresh inputs.
    ///
    /// An entry survives when `a`'s value for that kind has not changed since
    /// the entry was computed and the kind is not dirty; changes to `b` must
    /// already have marked the matching kinds dirty. Survivors are re-stamped
    /// as verified at `now`, everything else is recomputed and stamped
    /// computed at `now`. Kinds that vanished from both inputs keep an
    /// identity entry so caches further down notice the change.
    pub fn cached_compose(
        a: &Self,
        cache: &Self,
        b: &TransitionSet,
        now: UpdateSeq,
    ) -> Result<Self, StrataError> {
        let kinds: BTreeSet<TransitionKind> = a
            .entries
            .keys()
            .copied()
            .chain(b.kinds())
            .chain(cache.entries.keys().copied())
            .chain(cache.dirty.iter().copied())
            .collect();

        let mut entries = BTreeMap::new();
        for kind in kinds {
            let entry = match cache.entries.get(&kind) {
                Some(old) if !cache.is_dirty(kind) && a.stamp(kind) <= old.computed => CacheEntry {
                    verified: now,
                    ..old.clone()
                },
                _ => CacheEntry::new(compose_slots(kind, a.transition(kind), b.get(kind))?, now),
            };
            entries.insert(kind, entry);
        }
        Ok(Self {
            entries,
            dirty: BTreeSet::new(),
            epoch: cache.epoch,
        })
    }
}

/// Cache record of one arc: its accumulated value plus the structure it was
/// computed against.
#[derive(Debug, Clone)]
pub(crate) struct SubtreeCache {
    pub(crate) net: TransitionCache,
    /// The parent arc whose cache fed this one; `None` at a segment top.
    pub(crate) above: Option<ArcId>,
    /// Top of the segment: nearest instanced ancestor, `None` for a root.
    pub(crate) top: Option<NodeId>,
    pub(crate) verified: UpdateSeq,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec3};

    fn set_of(kind: TransitionKind, t: Transition) -> TransitionSet {
        TransitionSet::new().with(kind, t).expect("set")
    }

    fn build(a: &TransitionCache, b: &TransitionSet, now: u64) -> TransitionCache {
        let fresh = TransitionCache::new(UpdateSeq(now));
        TransitionCache::cached_compose(a, &fresh, b, UpdateSeq(now)).expect("compose")
    }

    #[test]
    fn fresh_build_composes_everything() {
        let top = TransitionCache::default();
        let parent = build(&top, &set_of(TransitionKind::TRANSFORM, Transition::translate(Vec3::X)), 1);
        let child = build(
            &parent,
            &set_of(TransitionKind::TRANSFORM, Transition::translate(Vec3::Y)),
            1,
        );

        let m = child
            .transition(TransitionKind::TRANSFORM)
            .and_then(Transition::as_matrix)
            .expect("matrix");
        assert_eq!(m, Mat4::from_translation(Vec3::new(1.0, 1.0, 0.0)));
    }

    #[test]
    fn unchanged_inputs_are_only_reverified() {
        let top = TransitionCache::default();
        let own = set_of(TransitionKind::TRANSFORM, Transition::translate(Vec3::X));
        let first = build(&top, &own, 3);

        let again = TransitionCache::cached_compose(&top, &first, &own, UpdateSeq(9)).expect("refresh");
        let entry = again.get(TransitionKind::TRANSFORM).expect("entry");
        assert_eq!(entry.computed(), UpdateSeq(3));
        assert_eq!(entry.verified(), UpdateSeq(9));
    }

    #[test]
    fn newer_parent_entry_forces_recompute() {
        let top = TransitionCache::default();
        let parent_v1 = build(&top, &set_of(TransitionKind::TRANSFORM, Transition::translate(Vec3::X)), 1);
        let own = set_of(TransitionKind::TRANSFORM, Transition::translate(Vec3::Y));
        let child = build(&parent_v1, &own, 1);

        let parent_v2 = build(&top, &set_of(TransitionKind::TRANSFORM, Transition::translate(Vec3::Z)), 5);
        let refreshed = TransitionCache::cached_compose(&parent_v2, &child, &own, UpdateSeq(5)).expect("refresh");

        let entry = refreshed.get(TransitionKind::TRANSFORM).expect("entry");
        assert_eq!(entry.computed(), UpdateSeq(5));
        assert_eq!(
            entry.transition().and_then(Transition::as_matrix),
            Some(Mat4::from_translation(Vec3::new(0.0, 1.0, 1.0)))
        );
    }

    #[test]
    fn vanished_kind_leaves_identity_entry() {
        let top = TransitionCache::default();
        let mut own = set_of(TransitionKind::TRANSFORM, Transition::translate(Vec3::X));
        let mut cache = build(&top, &own, 1);

        own.clear(TransitionKind::TRANSFORM);
        cache.invalidate(TransitionKind::TRANSFORM);
        assert!(cache.is_dirty(TransitionKind::TRANSFORM));
        let refreshed = TransitionCache::cached_compose(&top, &cache, &own, UpdateSeq(2)).expect("refresh");

        let entry = refreshed.get(TransitionKind::TRANSFORM).expect("entry");
        assert!(entry.transition().is_none());
        assert_eq!(refreshed.stamp(TransitionKind::TRANSFORM), UpdateSeq(2));
        assert!(refreshed.to_set().is_empty());
    }

    #[test]
    fn dirty_kind_recomputed_despite_unchanged_parent() {
        let top = TransitionCache::default();
        let own = set_of(TransitionKind::TRANSFORM, Transition::translate(Vec3::X));
        let mut cache = build(&top, &own, 1);

        let replaced = set_of(TransitionKind::TRANSFORM, Transition::translate(Vec3::Y));
        cache.invalidate(TransitionKind::TRANSFORM);
        let refreshed = TransitionCache::cached_compose(&top, &cache, &replaced, UpdateSeq(4)).expect("refresh");

        assert!(!refreshed.is_dirty(TransitionKind::TRANSFORM));
        assert_eq!(refreshed.stamp(TransitionKind::TRANSFORM), UpdateSeq(4));
        assert_eq!(
            refreshed.transition(TransitionKind::TRANSFORM).and_then(Transition::as_matrix),
            Some(Mat4::from_translation(Vec3::Y))
        );
    }

    #[test]
    fn missing_kind_counts_as_computed_at_epoch() {
        let cache = TransitionCache::new(UpdateSeq(7));
        assert_eq!(cache.stamp(TransitionKind::COLOR), UpdateSeq(7));
    }
}
