//! # Transition Wrappers
//!
//! The traverser and the wrt resolver are generic over *what* they
//! accumulate. A `TransitionWrapper` picks the part of an arc's
//! `TransitionSet` it cares about and knows the matching resolved state:
//!
//! - `NullTransitionWrapper`: nothing; a plain structural walk.
//! - `TransformWrapper`: only the `TRANSFORM` matrix.
//! - `AllTransitionsWrapper`: every kind.

use crate::attribute::AttributeSet;
use crate::primitives::MATRIX_TOLERANCE;
use crate::transition::Transition;
use crate::transition_set::TransitionSet;
use crate::{StrataError, TransitionKind};
use glam::Mat4;
use std::fmt::Debug;

/// Accumulated transition state threaded through a traversal or wrt walk.
pub trait TransitionWrapper: Clone + Debug {
    /// Resolved counterpart handed to visitors.
    type Attributes: Clone + Debug + Default;

    fn identity() -> Self;

    /// Extract this wrapper's share of an arc's transitions.
    fn from_set(set: &TransitionSet) -> Self;

    /// `self` then `other`.
    fn compose(&self, other: &Self) -> Result<Self, StrataError>;

    fn invert(&self) -> Result<Self, StrataError>;

    fn apply(&self, attrs: &Self::Attributes) -> Result<Self::Attributes, StrataError>;

    /// `self` then the matrix `m`; wrappers without a transform ignore it.
    fn compose_transform(&self, m: Mat4) -> Result<Self, StrataError> {
        let _ = m;
        Ok(self.clone())
    }

    fn is_identity(&self) -> bool;

    /// Equality with a tolerance on matrices.
    fn approx_eq(&self, other: &Self, tolerance: f32) -> bool;
}

// =============================================================================
// NULL
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NullTransitionWrapper;

impl TransitionWrapper for NullTransitionWrapper {
    type Attributes = ();

    fn identity() -> Self {
        Self
    }

    fn from_set(_set: &TransitionSet) -> Self {
        Self
    }

    fn compose(&self, _other: &Self) -> Result<Self, StrataError> {
        Ok(Self)
    }

    fn invert(&self) -> Result<Self, StrataError> {
        Ok(Self)
    }

    fn apply(&self, _attrs: &()) -> Result<(), StrataError> {
        Ok(())
    }

    fn is_identity(&self) -> bool {
        true
    }

    fn approx_eq(&self, _other: &Self, _tolerance: f32) -> bool {
        true
    }
}

// =============================================================================
// TRANSFORM ONLY
// =============================================================================

/// Net transform; a missing `TRANSFORM` is the identity matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformWrapper(pub Mat4);

/// Resolved net transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformAttribute(pub Mat4);

impl Default for TransformAttribute {
    fn default() -> Self {
        Self(Mat4::IDENTITY)
    }
}

impl TransformWrapper {
    #[must_use]
    pub fn matrix(&self) -> Mat4 {
        self.0
    }
}

impl TransitionWrapper for TransformWrapper {
    type Attributes = TransformAttribute;

    fn identity() -> Self {
        Self(Mat4::IDENTITY)
    }

    fn from_set(set: &TransitionSet) -> Self {
        Self(
            set.get(TransitionKind::TRANSFORM)
                .and_then(Transition::as_matrix)
                .unwrap_or(Mat4::IDENTITY),
        )
    }

    fn compose(&self, other: &Self) -> Result<Self, StrataError> {
        Ok(Self(self.0 * other.0))
    }

    fn invert(&self) -> Result<Self, StrataError> {
        Transition::matrix(self.0)
            .invert(TransitionKind::TRANSFORM)
            .map(|t| Self(t.as_matrix().unwrap_or(Mat4::IDENTITY)))
    }

    fn apply(&self, attrs: &TransformAttribute) -> Result<TransformAttribute, StrataError> {
        Ok(TransformAttribute(attrs.0 * self.0))
    }

    fn compose_transform(&self, m: Mat4) -> Result<Self, StrataError> {
        Ok(Self(self.0 * m))
    }

    fn is_identity(&self) -> bool {
        self.0.abs_diff_eq(Mat4::IDENTITY, MATRIX_TOLERANCE)
    }

    fn approx_eq(&self, other: &Self, tolerance: f32) -> bool {
        self.0.abs_diff_eq(other.0, tolerance)
    }
}

// =============================================================================
// ALL TRANSITIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AllTransitionsWrapper(pub TransitionSet);

impl AllTransitionsWrapper {
    #[must_use]
    pub fn transitions(&self) -> &TransitionSet {
        &self.0
    }
}

impl TransitionWrapper for AllTransitionsWrapper {
    type Attributes = AttributeSet;

    fn identity() -> Self {
        Self::default()
    }

    fn from_set(set: &TransitionSet) -> Self {
        Self(set.clone())
    }

    fn compose(&self, other: &Self) -> Result<Self, StrataError> {
        self.0.compose(&other.0).map(Self)
    }

    fn invert(&self) -> Result<Self, StrataError> {
        self.0.invert().map(Self)
    }

    fn apply(&self, attrs: &AttributeSet) -> Result<AttributeSet, StrataError> {
        self.0.apply(attrs)
    }

    fn compose_transform(&self, m: Mat4) -> Result<Self, StrataError> {
        let rotation = TransitionSet::new().with(TransitionKind::TRANSFORM, Transition::matrix(m))?;
        self.0.compose(&rotation).map(Self)
    }

    fn is_identity(&self) -> bool {
        self.0.is_identity()
    }

    fn approx_eq(&self, other: &Self, tolerance: f32) -> bool {
        self.0.approx_eq(&other.0, tolerance)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::StateValue;
    use glam::Vec3;

    fn moved(offset: Vec3) -> TransitionSet {
        TransitionSet::new()
            .with(TransitionKind::TRANSFORM, Transition::translate(offset))
            .expect("set")
    }

    #[test]
    fn transform_wrapper_ignores_other_kinds() {
        let set = moved(Vec3::X)
            .with(
                TransitionKind::TEXTURE,
                Transition::on(StateValue::Texture("moss".into())),
            )
            .expect("set");
        let w = TransformWrapper::from_set(&set);
        assert_eq!(w.matrix(), Mat4::from_translation(Vec3::X));
        assert!(TransformWrapper::from_set(&TransitionSet::new()).is_identity());
    }

    #[test]
    fn transform_wrapper_invert_round_trip() {
        let w = TransformWrapper(Mat4::from_rotation_z(0.7) * Mat4::from_translation(Vec3::Y));
        let round = w.compose(&w.invert().expect("invert")).expect("compose");
        assert!(round.is_identity());
    }

    #[test]
    fn singular_transform_not_invertible() {
        let w = TransformWrapper(Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0)));
        assert!(w.invert().is_err());
    }

    #[test]
    fn all_transitions_apply_resolves_state() {
        let w = AllTransitionsWrapper::from_set(&moved(Vec3::Z));
        let attrs = w.apply(&AttributeSet::new()).expect("apply");
        assert_eq!(attrs.transform(), Mat4::from_translation(Vec3::Z));
    }

    #[test]
    fn compose_transform_appends_matrix() {
        let rot = Mat4::from_rotation_z(1.0);
        let a = AllTransitionsWrapper::from_set(&moved(Vec3::X))
            .compose_transform(rot)
            .expect("compose");
        let b = TransformWrapper::from_set(&moved(Vec3::X))
            .compose_transform(rot)
            .expect("compose");
        assert!(TransformWrapper::from_set(a.transitions()).approx_eq(&b, 1.0e-6));
        assert!(
            NullTransitionWrapper
                .compose_transform(rot)
                .expect("compose")
                .is_identity()
        );
    }
}
