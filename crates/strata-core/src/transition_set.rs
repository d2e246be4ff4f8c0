//! # Transition Sets
//!
//! The transitions attached to one arc, or the accumulation of several arcs,
//! keyed by `TransitionKind`. Kinds are independent of each other: composing
//! two sets composes matching kinds and carries the rest over.
//!
//! Accumulated sets never hold identity or immediate transitions; both are
//! dropped by `compose_slots`, so "absent" always means identity.

use crate::attribute::AttributeSet;
use crate::transition::{ImmediateEffect, Transition};
use crate::{StrataError, TransitionFamily, TransitionKind};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Compose two optional transitions of one kind, dropping identities.
///
/// Shared by `TransitionSet::compose` and the incremental cache so both
/// produce the same values.
pub fn compose_slots(
    kind: TransitionKind,
    a: Option<&Transition>,
    b: Option<&Transition>,
) -> Result<Option<Transition>, StrataError> {
    let composed = match (a, b) {
        (None, None) => return Ok(None),
        (Some(t), None) | (None, Some(t)) => t.clone(),
        (Some(a), Some(b)) => a.compose(b, kind)?,
    };
    if composed.is_identity() || composed.family() == TransitionFamily::Immediate {
        Ok(None)
    } else {
        Ok(Some(composed))
    }
}

/// Transitions keyed by kind, at most one per kind.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransitionSet {
    transitions: BTreeMap<TransitionKind, Transition>,
}

impl TransitionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of `set`.
    pub fn with(mut self, kind: TransitionKind, t: Transition) -> Result<Self, StrataError> {
        self.set(kind, t)?;
        Ok(self)
    }

    /// Store `t` under `kind`, returning the previous transition.
    pub fn set(
        &mut self,
        kind: TransitionKind,
        t: Transition,
    ) -> Result<Option<Transition>, StrataError> {
        t.validate_for(kind)?;
        Ok(self.transitions.insert(kind, t))
    }

    pub fn clear(&mut self, kind: TransitionKind) -> Option<Transition> {
        self.transitions.remove(&kind)
    }

    #[must_use]
    pub fn get(&self, kind: TransitionKind) -> Option<&Transition> {
        self.transitions.get(&kind)
    }

    #[must_use]
    pub fn contains(&self, kind: TransitionKind) -> bool {
        self.transitions.contains_key(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TransitionKind, &Transition)> {
        self.transitions.iter().map(|(k, t)| (*k, t))
    }

    pub fn kinds(&self) -> impl Iterator<Item = TransitionKind> + '_ {
        self.transitions.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// True when every member leaves state unchanged.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.transitions.values().all(Transition::is_identity)
    }

    /// The set equivalent to applying `self` then `other`.
    pub fn compose(&self, other: &Self) -> Result<Self, StrataError> {
        let mut transitions = BTreeMap::new();
        let kinds: Vec<TransitionKind> = self
            .kinds()
            .chain(other.kinds().filter(|k| !self.contains(*k)))
            .collect();
        for kind in kinds {
            if let Some(t) = compose_slots(kind, self.get(kind), other.get(kind))? {
                transitions.insert(kind, t);
            }
        }
        Ok(Self { transitions })
    }

    /// Invert every member; fails on the first kind without an inverse.
    pub fn invert(&self) -> Result<Self, StrataError> {
        let mut transitions = BTreeMap::new();
        for (kind, t) in &self.transitions {
            transitions.insert(*kind, t.invert(*kind)?);
        }
        Ok(Self { transitions })
    }

    /// Fold every member onto `attrs`.
    pub fn apply(&self, attrs: &AttributeSet) -> Result<AttributeSet, StrataError> {
        let mut result = attrs.clone();
        for (kind, t) in &self.transitions {
            if let Some(attr) = t.apply(*kind, attrs.get_attribute(*kind))? {
                result.set_attribute(*kind, attr);
            }
        }
        Ok(result)
    }

    /// Immediate effects to run when a traversal crosses this set's arc.
    pub fn sub_render_effects(&self) -> impl Iterator<Item = (TransitionKind, &ImmediateEffect)> {
        self.transitions
            .iter()
            .filter_map(|(k, t)| t.immediate_effect().map(|e| (*k, e)))
    }

    #[must_use]
    pub fn has_sub_render(&self) -> bool {
        self.sub_render_effects().next().is_some()
    }

    #[must_use]
    pub fn num_sub_render(&self) -> usize {
        self.sub_render_effects().count()
    }

    pub fn adjust_all_priorities(&mut self, delta: i32) {
        for t in self.transitions.values_mut() {
            t.adjust_priority(delta);
        }
    }

    /// Total order used by the reducer to group siblings.
    #[must_use]
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        let mut a = self.transitions.iter();
        let mut b = other.transitions.iter();
        loop {
            match (a.next(), b.next()) {
                (None, None) => return Ordering::Equal,
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (Some((ka, ta)), Some((kb, tb))) => {
                    let order = ka.cmp(kb).then_with(|| ta.total_cmp(tb));
                    if order.is_ne() {
                        return order;
                    }
                }
            }
        }
    }

    /// Equality with a tolerance on matrix payloads.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, tolerance: f32) -> bool {
        self.len() == other.len()
            && self
                .transitions
                .iter()
                .zip(&other.transitions)
                .all(|((ka, a), (kb, b))| ka == kb && a.approx_eq(b, tolerance))
    }
}

impl FromIterator<(TransitionKind, Transition)> for TransitionSet {
    /// Collect without family validation; used for already-validated data.
    fn from_iter<I: IntoIterator<Item = (TransitionKind, Transition)>>(iter: I) -> Self {
        Self {
            transitions: iter.into_iter().collect(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::{BillboardParams, StateValue};
    use glam::{Mat4, Vec3};

    fn texture(name: &str) -> Transition {
        Transition::on(StateValue::Texture(name.to_string()))
    }

    #[test]
    fn compose_merges_independent_kinds() {
        let a = TransitionSet::new()
            .with(TransitionKind::TRANSFORM, Transition::translate(Vec3::X))
            .expect("set");
        let b = TransitionSet::new()
            .with(TransitionKind::TEXTURE, texture("grass"))
            .expect("set");

        let c = a.compose(&b).expect("compose");
        assert_eq!(c.len(), 2);
        assert_eq!(c.get(TransitionKind::TEXTURE), Some(&texture("grass")));
    }

    #[test]
    fn compose_drops_identities_and_immediates() {
        let a = TransitionSet::new()
            .with(TransitionKind::TRANSFORM, Transition::translate(Vec3::X))
            .expect("set")
            .with(
                TransitionKind::BILLBOARD,
                Transition::billboard(BillboardParams::default()),
            )
            .expect("set");
        let b = TransitionSet::new()
            .with(TransitionKind::TRANSFORM, Transition::translate(-Vec3::X))
            .expect("set");

        let c = a.compose(&b).expect("compose");
        assert!(c.is_empty());
    }

    #[test]
    fn set_rejects_wrong_family_for_builtin_kind() {
        let mut set = TransitionSet::new();
        assert!(set.set(TransitionKind::TEXTURE, Transition::matrix(Mat4::IDENTITY)).is_err());
        assert!(set.is_empty());
    }

    #[test]
    fn invert_fails_on_off_member() {
        let set = TransitionSet::new()
            .with(TransitionKind::TEXTURE, Transition::off())
            .expect("set");
        assert!(matches!(
            set.invert(),
            Err(StrataError::NotInvertible(TransitionKind::TEXTURE))
        ));
    }

    #[test]
    fn apply_resolves_from_initial_state() {
        let set = TransitionSet::new()
            .with(TransitionKind::TRANSFORM, Transition::translate(Vec3::Y))
            .expect("set")
            .with(TransitionKind::TEXTURE, texture("bark"))
            .expect("set");

        let attrs = set.apply(&AttributeSet::new()).expect("apply");
        assert_eq!(attrs.transform(), Mat4::from_translation(Vec3::Y));
        assert!(
            attrs
                .get_attribute(TransitionKind::TEXTURE)
                .expect("texture")
                .is_on()
        );
    }

    #[test]
    fn total_order_distinguishes_payloads() {
        let a = TransitionSet::new()
            .with(TransitionKind::TEXTURE, texture("a"))
            .expect("set");
        let b = TransitionSet::new()
            .with(TransitionKind::TEXTURE, texture("b"))
            .expect("set");

        assert_eq!(a.total_cmp(&b), Ordering::Less);
        assert_eq!(a.total_cmp(&a.clone()), Ordering::Equal);
        assert_eq!(TransitionSet::new().total_cmp(&a), Ordering::Less);
    }

    #[test]
    fn sub_render_counting() {
        let set = TransitionSet::new()
            .with(
                TransitionKind::BILLBOARD,
                Transition::billboard(BillboardParams::axial()),
            )
            .expect("set")
            .with(TransitionKind::TEXTURE, texture("leaf"))
            .expect("set");
        assert!(set.has_sub_render());
        assert_eq!(set.num_sub_render(), 1);
    }
}
