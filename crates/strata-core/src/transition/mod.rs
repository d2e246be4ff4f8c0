//! # Transitions
//!
//! A `Transition` is a localized state change attached to an arc. Every
//! transition belongs to one `TransitionFamily` and supports three
//! operations:
//!
//! - `compose(a, b)`: the transition equivalent to applying `a` then `b`.
//! - `invert(a)`: the transition undoing `a`, when one exists.
//! - `apply(a, attr)`: fold `a` onto a resolved `Attribute` (or onto the
//!   family's initial attribute when there is none yet).
//!
//! These satisfy `apply(compose(a, b), x) == apply(b, apply(a, x))` and
//! `apply(identity, x) == x` within each family.
//!
//! ## Priorities
//!
//! The override families (`OnOff`, `On`, `Multi`) carry a priority: when
//! composing, the higher priority wins and ties go to the later transition;
//! applying a transition outranked by the attribute's priority is a no-op.
//! The accumulating families (`Matrix`, `BitMask`) always accumulate.

pub mod immediate;
pub mod multi;

pub use immediate::{BillboardParams, ImmediateEffect};
pub use multi::{Direction, MultiAttribute, MultiTransition};

use crate::attribute::{Attribute, AttributeValue};
use crate::primitives::SINGULAR_EPSILON;
use crate::{StrataError, TransitionFamily, TransitionKind};
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// =============================================================================
// STATE VALUES
// =============================================================================

/// Fog parameters carried by an on/off fog transition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FogParams {
    pub color: [f32; 4],
    pub density: f32,
}

/// The value an on/off or always-on transition switches to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateValue {
    Texture(String),
    Color([f32; 4]),
    Fog(FogParams),
    Int(i64),
    Name(String),
}

impl StateValue {
    fn rank(&self) -> u8 {
        match self {
            Self::Texture(_) => 0,
            Self::Color(_) => 1,
            Self::Fog(_) => 2,
            Self::Int(_) => 3,
            Self::Name(_) => 4,
        }
    }

    /// Total order over values, NaN-safe for the float payloads.
    #[must_use]
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Texture(a), Self::Texture(b)) | (Self::Name(a), Self::Name(b)) => a.cmp(b),
            (Self::Color(a), Self::Color(b)) => cmp_f32s(a, b),
            (Self::Fog(a), Self::Fog(b)) => {
                cmp_f32s(&a.color, &b.color).then_with(|| a.density.total_cmp(&b.density))
            }
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

fn cmp_f32s(a: &[f32], b: &[f32]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

fn cmp_option<T>(a: Option<&T>, b: Option<&T>, f: impl Fn(&T, &T) -> Ordering) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => f(x, y),
    }
}

// =============================================================================
// PAYLOADS
// =============================================================================

/// Payload of an on/off transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OnOff {
    /// Leave the property as it is.
    Identity,
    /// Switch the property on with a value.
    On(StateValue),
    /// Switch the property off.
    Off,
}

/// Payload of a bit-mask transition: `bits = (bits & and_mask) | or_mask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitMask {
    pub and_mask: u32,
    pub or_mask: u32,
}

impl BitMask {
    pub const IDENTITY: Self = Self {
        and_mask: u32::MAX,
        or_mask: 0,
    };

    /// Set `bits`, leave the rest.
    #[must_use]
    pub const fn set(bits: u32) -> Self {
        Self {
            and_mask: u32::MAX,
            or_mask: bits,
        }
    }

    /// Clear `bits`, leave the rest.
    #[must_use]
    pub const fn clear(bits: u32) -> Self {
        Self {
            and_mask: !bits,
            or_mask: 0,
        }
    }

    #[must_use]
    pub const fn apply(self, bits: u32) -> u32 {
        (bits & self.and_mask) | self.or_mask
    }

    /// `self` followed by `next`.
    #[must_use]
    pub const fn then(self, next: Self) -> Self {
        Self {
            and_mask: self.and_mask & next.and_mask,
            or_mask: (self.or_mask & next.and_mask) | next.or_mask,
        }
    }

    #[must_use]
    pub const fn is_identity(self) -> bool {
        self.and_mask == u32::MAX && self.or_mask == 0
    }
}

/// The family-specific payload of a transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransitionValue {
    OnOff(OnOff),
    /// `None` is the identity.
    On(Option<StateValue>),
    Multi(MultiTransition),
    Matrix(Mat4),
    BitMask(BitMask),
    /// `None` is the identity every composition of immediates collapses to.
    Immediate(Option<ImmediateEffect>),
}

// =============================================================================
// TRANSITION
// =============================================================================

/// One typed, composable state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    priority: u32,
    value: TransitionValue,
}

impl Transition {
    #[must_use]
    pub fn new(value: TransitionValue) -> Self {
        Self { priority: 0, value }
    }

    #[must_use]
    pub fn matrix(m: Mat4) -> Self {
        Self::new(TransitionValue::Matrix(m))
    }

    #[must_use]
    pub fn translate(offset: Vec3) -> Self {
        Self::matrix(Mat4::from_translation(offset))
    }

    #[must_use]
    pub fn on(value: StateValue) -> Self {
        Self::new(TransitionValue::OnOff(OnOff::On(value)))
    }

    #[must_use]
    pub fn off() -> Self {
        Self::new(TransitionValue::OnOff(OnOff::Off))
    }

    /// An always-on family transition switching to `value`.
    #[must_use]
    pub fn set_to(value: StateValue) -> Self {
        Self::new(TransitionValue::On(Some(value)))
    }

    #[must_use]
    pub fn multi(m: MultiTransition) -> Self {
        Self::new(TransitionValue::Multi(m))
    }

    #[must_use]
    pub fn bit_mask(mask: BitMask) -> Self {
        Self::new(TransitionValue::BitMask(mask))
    }

    #[must_use]
    pub fn immediate(effect: ImmediateEffect) -> Self {
        Self::new(TransitionValue::Immediate(Some(effect)))
    }

    #[must_use]
    pub fn billboard(params: BillboardParams) -> Self {
        Self::immediate(ImmediateEffect::Billboard(params))
    }

    /// The identity transition of `family`.
    #[must_use]
    pub fn identity(family: TransitionFamily) -> Self {
        Self::new(match family {
            TransitionFamily::OnOff => TransitionValue::OnOff(OnOff::Identity),
            TransitionFamily::On => TransitionValue::On(None),
            TransitionFamily::Multi => TransitionValue::Multi(MultiTransition::default()),
            TransitionFamily::Matrix => TransitionValue::Matrix(Mat4::IDENTITY),
            TransitionFamily::BitMask => TransitionValue::BitMask(BitMask::IDENTITY),
            TransitionFamily::Immediate => TransitionValue::Immediate(None),
        })
    }

    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Shift the priority by `delta`, clamped to `0..=u32::MAX`.
    pub fn adjust_priority(&mut self, delta: i32) {
        self.priority = self.priority.saturating_add_signed(delta);
        if let TransitionValue::Multi(m) = &mut self.value {
            m.adjust_priorities(delta);
        }
    }

    #[must_use]
    pub fn value(&self) -> &TransitionValue {
        &self.value
    }

    #[must_use]
    pub fn family(&self) -> TransitionFamily {
        match self.value {
            TransitionValue::OnOff(_) => TransitionFamily::OnOff,
            TransitionValue::On(_) => TransitionFamily::On,
            TransitionValue::Multi(_) => TransitionFamily::Multi,
            TransitionValue::Matrix(_) => TransitionFamily::Matrix,
            TransitionValue::BitMask(_) => TransitionFamily::BitMask,
            TransitionValue::Immediate(_) => TransitionFamily::Immediate,
        }
    }

    #[must_use]
    pub fn is_identity(&self) -> bool {
        match &self.value {
            TransitionValue::OnOff(state) => *state == OnOff::Identity,
            TransitionValue::On(value) => value.is_none(),
            TransitionValue::Multi(m) => m.is_identity(),
            TransitionValue::Matrix(m) => *m == Mat4::IDENTITY,
            TransitionValue::BitMask(b) => b.is_identity(),
            TransitionValue::Immediate(effect) => effect.is_none(),
        }
    }

    /// The matrix payload, if this is a matrix transition.
    #[must_use]
    pub fn as_matrix(&self) -> Option<Mat4> {
        match self.value {
            TransitionValue::Matrix(m) => Some(m),
            _ => None,
        }
    }

    /// The effect to run mid-traversal, if any.
    #[must_use]
    pub fn immediate_effect(&self) -> Option<&ImmediateEffect> {
        match &self.value {
            TransitionValue::Immediate(effect) => effect.as_ref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn has_sub_render(&self) -> bool {
        self.immediate_effect().is_some()
    }

    fn is_override(&self) -> bool {
        matches!(
            self.family(),
            TransitionFamily::OnOff | TransitionFamily::On | TransitionFamily::Multi
        )
    }

    fn mismatch(&self, kind: TransitionKind, found: TransitionFamily) -> StrataError {
        StrataError::TransitionMismatch {
            kind,
            expected: self.family(),
            found,
        }
    }

    /// Reject a payload stored under a built-in kind of another family.
    pub fn validate_for(&self, kind: TransitionKind) -> Result<(), StrataError> {
        match kind.expected_family() {
            Some(expected) if expected != self.family() => Err(StrataError::TransitionMismatch {
                kind,
                expected,
                found: self.family(),
            }),
            _ => Ok(()),
        }
    }

    /// The transition equivalent to applying `self` then `other`.
    pub fn compose(&self, other: &Self, kind: TransitionKind) -> Result<Self, StrataError> {
        if self.family() != other.family() {
            return Err(self.mismatch(kind, other.family()));
        }
        let priority = self.priority.max(other.priority);
        match (&self.value, &other.value) {
            (TransitionValue::Matrix(a), TransitionValue::Matrix(b)) => {
                return Ok(Self {
                    priority,
                    value: TransitionValue::Matrix(*a * *b),
                });
            }
            (TransitionValue::BitMask(a), TransitionValue::BitMask(b)) => {
                return Ok(Self {
                    priority,
                    value: TransitionValue::BitMask(a.then(*b)),
                });
            }
            (TransitionValue::Immediate(_), TransitionValue::Immediate(_)) => {
                return Ok(Self::identity(TransitionFamily::Immediate));
            }
            _ => {}
        }

        if other.is_identity() {
            return Ok(self.clone());
        }
        if self.is_identity() {
            return Ok(other.clone());
        }
        if other.priority < self.priority {
            return Ok(self.clone());
        }
        match (&self.value, &other.value) {
            (TransitionValue::Multi(a), TransitionValue::Multi(b)) => {
                let (priority, multi) = a.then(self.priority, b, other.priority);
                Ok(Self {
                    priority,
                    value: TransitionValue::Multi(multi),
                })
            }
            _ => Ok(other.clone()),
        }
    }

    /// The transition undoing `self`.
    ///
    /// On/off "on" inverts to "off"; "off", forced multi defaults, non-identity
    /// masks, singular matrices and immediates have no inverse.
    pub fn invert(&self, kind: TransitionKind) -> Result<Self, StrataError> {
        let inverse = match &self.value {
            TransitionValue::OnOff(OnOff::Identity) => Some(TransitionValue::OnOff(OnOff::Identity)),
            TransitionValue::OnOff(OnOff::On(_)) => Some(TransitionValue::OnOff(OnOff::Off)),
            TransitionValue::OnOff(OnOff::Off) => None,
            TransitionValue::On(None) => Some(TransitionValue::On(None)),
            TransitionValue::On(Some(_)) => None,
            TransitionValue::Multi(m) => m.inverted().map(TransitionValue::Multi),
            TransitionValue::Matrix(m) => (m.determinant().abs() > SINGULAR_EPSILON)
                .then(|| TransitionValue::Matrix(m.inverse())),
            TransitionValue::BitMask(b) => b
                .is_identity()
                .then_some(TransitionValue::BitMask(BitMask::IDENTITY)),
            TransitionValue::Immediate(_) => None,
        };
        inverse
            .map(|value| Self {
                priority: self.priority,
                value,
            })
            .ok_or(StrataError::NotInvertible(kind))
    }

    /// Fold `self` onto `attr`, or onto the family's initial attribute.
    ///
    /// Immediate transitions return `attr` unchanged.
    pub fn apply(
        &self,
        kind: TransitionKind,
        attr: Option<&Attribute>,
    ) -> Result<Option<Attribute>, StrataError> {
        let Some(initial) = Attribute::initial(self.family()) else {
            return Ok(attr.cloned());
        };
        let current = attr.cloned().unwrap_or(initial);
        let current_family = current.family();
        if current_family != self.family() {
            return Err(self.mismatch(kind, current_family));
        }
        if let TransitionValue::Multi(m) = &self.value {
            return self.apply_multi(kind, m, current).map(Some);
        }

        let overriding = self.is_override();
        if overriding && (self.is_identity() || self.priority < current.priority) {
            return Ok(Some(current));
        }
        let priority = if overriding {
            self.priority
        } else {
            current.priority
        };

        let value = match (&self.value, current.value) {
            (TransitionValue::OnOff(OnOff::On(v)), _) => AttributeValue::OnOff(Some(v.clone())),
            (TransitionValue::OnOff(_), _) => AttributeValue::OnOff(None),
            (TransitionValue::On(v), AttributeValue::On(cur)) => AttributeValue::On(v.clone().or(cur)),
            (TransitionValue::Matrix(m), AttributeValue::Matrix(a)) => AttributeValue::Matrix(a * *m),
            (TransitionValue::BitMask(b), AttributeValue::BitMask(bits)) => {
                AttributeValue::BitMask(b.apply(bits))
            }
            _ => return Err(self.mismatch(kind, current_family)),
        };
        Ok(Some(Attribute::new(value).with_priority(priority)))
    }

    /// Apply each layer in turn, every one gated by its own priority.
    fn apply_multi(
        &self,
        kind: TransitionKind,
        multi: &MultiTransition,
        mut current: Attribute,
    ) -> Result<Attribute, StrataError> {
        for (priority, layer) in multi.layers(self.priority) {
            if layer.is_identity() || priority < current.priority {
                continue;
            }
            let AttributeValue::Multi(state) = &current.value else {
                return Err(self.mismatch(kind, current.family()));
            };
            current = Attribute::new(AttributeValue::Multi(state.applied(&layer))).with_priority(priority);
        }
        Ok(current)
    }

    /// Total order used to group identical transitions.
    #[must_use]
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.family().cmp(&other.family()))
            .then_with(|| match (&self.value, &other.value) {
                (TransitionValue::OnOff(a), TransitionValue::OnOff(b)) => match (a, b) {
                    (OnOff::On(x), OnOff::On(y)) => x.total_cmp(y),
                    _ => on_off_rank(a).cmp(&on_off_rank(b)),
                },
                (TransitionValue::On(a), TransitionValue::On(b)) => {
                    cmp_option(a.as_ref(), b.as_ref(), StateValue::total_cmp)
                }
                (TransitionValue::Multi(a), TransitionValue::Multi(b)) => a.cmp(b),
                (TransitionValue::Matrix(a), TransitionValue::Matrix(b)) => {
                    cmp_f32s(&a.to_cols_array(), &b.to_cols_array())
                }
                (TransitionValue::BitMask(a), TransitionValue::BitMask(b)) => (a.and_mask, a.or_mask)
                    .cmp(&(b.and_mask, b.or_mask)),
                (TransitionValue::Immediate(a), TransitionValue::Immediate(b)) => {
                    cmp_option(a.as_ref(), b.as_ref(), ImmediateEffect::total_cmp)
                }
                _ => Ordering::Equal,
            })
    }

    /// Equality with a tolerance on matrix payloads.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, tolerance: f32) -> bool {
        match (&self.value, &other.value) {
            (TransitionValue::Matrix(a), TransitionValue::Matrix(b)) => {
                a.abs_diff_eq(*b, tolerance)
            }
            _ => self.total_cmp(other).is_eq(),
        }
    }
}

fn on_off_rank(state: &OnOff) -> u8 {
    match state {
        OnOff::Identity => 0,
        OnOff::On(_) => 1,
        OnOff::Off => 2,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const K: TransitionKind = TransitionKind::TEXTURE;

    fn tex(name: &str) -> StateValue {
        StateValue::Texture(name.to_string())
    }

    #[test]
    fn on_off_tie_goes_to_later() {
        let a = Transition::on(tex("brick"));
        let b = Transition::on(tex("stone"));
        assert_eq!(a.compose(&b, K).expect("compose"), b);
    }

    #[test]
    fn on_off_higher_priority_wins() {
        let a = Transition::on(tex("brick")).with_priority(5);
        let b = Transition::off();
        assert_eq!(a.compose(&b, K).expect("compose"), a);

        let attr = a.apply(K, None).expect("apply");
        let outranked = b.apply(K, attr.as_ref()).expect("apply");
        assert_eq!(outranked, attr);
    }

    #[test]
    fn identity_composes_to_other_operand() {
        let a = Transition::on(tex("brick")).with_priority(3);
        let i = Transition::identity(TransitionFamily::OnOff).with_priority(9);
        assert_eq!(i.compose(&a, K).expect("compose"), a);
        assert_eq!(a.compose(&i, K).expect("compose"), a);
    }

    #[test]
    fn on_inverts_to_off_and_off_has_no_inverse() {
        let on = Transition::on(tex("brick"));
        assert_eq!(on.invert(K).expect("invert"), Transition::off());
        assert!(matches!(
            Transition::off().invert(K),
            Err(StrataError::NotInvertible(TransitionKind::TEXTURE))
        ));
    }

    #[test]
    fn mismatched_families_rejected() {
        let a = Transition::on(tex("brick"));
        let b = Transition::translate(Vec3::X);
        let result = a.compose(&b, K);
        assert!(matches!(
            result,
            Err(StrataError::TransitionMismatch {
                expected: TransitionFamily::OnOff,
                found: TransitionFamily::Matrix,
                ..
            })
        ));

        let attr = b.apply(TransitionKind::TRANSFORM, None).expect("apply");
        assert!(a.apply(K, attr.as_ref()).is_err());
    }

    #[test]
    fn matrix_compose_is_a_then_b() {
        let a = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let b = Mat4::from_scale(Vec3::splat(2.0));
        let composed = Transition::matrix(a)
            .compose(&Transition::matrix(b), TransitionKind::TRANSFORM)
            .expect("compose");
        assert_eq!(composed.as_matrix(), Some(a * b));
    }

    #[test]
    fn singular_matrix_not_invertible() {
        let flat = Transition::matrix(Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0)));
        assert!(flat.invert(TransitionKind::TRANSFORM).is_err());
    }

    #[test]
    fn matrices_accumulate_regardless_of_priority() {
        let high = Transition::translate(Vec3::X).with_priority(10);
        let low = Transition::translate(Vec3::Y);
        let attr = high.apply(TransitionKind::TRANSFORM, None).expect("apply");
        let attr = low
            .apply(TransitionKind::TRANSFORM, attr.as_ref())
            .expect("apply")
            .expect("matrix attribute");
        assert_eq!(
            attr.as_matrix(),
            Some(Mat4::from_translation(Vec3::new(1.0, 1.0, 0.0)))
        );
    }

    #[test]
    fn bit_mask_composition_matches_sequential_apply() {
        let a = BitMask::set(0b0110);
        let b = BitMask::clear(0b0010);
        for bits in [0u32, 0b1111, 0b1000_0001] {
            assert_eq!(a.then(b).apply(bits), b.apply(a.apply(bits)));
        }
        assert!(Transition::bit_mask(a).invert(TransitionKind::DRAW_MASK).is_err());
    }

    #[test]
    fn immediates_collapse_to_identity() {
        let bb = Transition::billboard(BillboardParams::axial());
        let composed = bb.compose(&bb, TransitionKind::BILLBOARD).expect("compose");
        assert!(composed.is_identity());
        assert!(bb.has_sub_render());
        assert!(bb.invert(TransitionKind::BILLBOARD).is_err());
        assert_eq!(bb.apply(TransitionKind::BILLBOARD, None).expect("apply"), None);
    }

    #[test]
    fn set_to_keeps_value_until_replaced() {
        let mode = TransitionKind::RENDER_MODE;
        let wire = Transition::set_to(StateValue::Name("wireframe".into()));
        let attr = wire.apply(mode, None).expect("apply");
        let same = Transition::identity(TransitionFamily::On)
            .apply(mode, attr.as_ref())
            .expect("apply");
        assert_eq!(same, attr);
        assert!(wire.invert(mode).is_err());
    }

    #[test]
    fn priority_adjustment_clamps_at_zero() {
        let mut t = Transition::off().with_priority(2);
        t.adjust_priority(-5);
        assert_eq!(t.priority(), 0);
        t.adjust_priority(7);
        assert_eq!(t.priority(), 7);
    }

    fn lights(priority: u32) -> Attribute {
        Attribute::new(AttributeValue::Multi(MultiAttribute::all_off())).with_priority(priority)
    }

    fn lit(attr: &Attribute, name: &str) -> bool {
        matches!(&attr.value, AttributeValue::Multi(state) if state.is_on(name))
    }

    #[test]
    fn multi_compose_keeps_lower_priority_layer_gated() {
        let light = TransitionKind::LIGHT;
        let sun = Transition::multi(MultiTransition::default().with("sun", Direction::On)).with_priority(3);
        let lamp = Transition::multi(MultiTransition::default().with("lamp", Direction::On)).with_priority(5);
        let both = sun.compose(&lamp, light).expect("compose");
        assert_eq!(both.priority(), 5);

        for start in [lights(0), lights(4), lights(6)] {
            let direct = both.apply(light, Some(&start)).expect("apply");
            let first = sun.apply(light, Some(&start)).expect("apply");
            let stepwise = lamp.apply(light, first.as_ref()).expect("apply");
            assert_eq!(direct, stepwise);
        }

        let blocked = both.apply(light, Some(&lights(4))).expect("apply").expect("attr");
        assert!(lit(&blocked, "lamp"));
        assert!(!lit(&blocked, "sun"));
    }

    #[test]
    fn layered_multi_shifts_every_layer_and_has_no_inverse() {
        let light = TransitionKind::LIGHT;
        let low = Transition::multi(MultiTransition::default().with("sun", Direction::On)).with_priority(1);
        let high = Transition::multi(MultiTransition::default().with("lamp", Direction::Off)).with_priority(4);
        let mut both = low.compose(&high, light).expect("compose");
        assert!(both.invert(light).is_err());

        both.adjust_priority(2);
        assert_eq!(both.priority(), 6);
        let state = both.apply(light, Some(&lights(3))).expect("apply").expect("attr");
        assert!(lit(&state, "sun"));
    }

    #[test]
    fn validate_for_checks_builtin_family() {
        assert!(Transition::off().validate_for(TransitionKind::TRANSFORM).is_err());
        assert!(Transition::off().validate_for(TransitionKind::FOG).is_ok());
        assert!(Transition::off().validate_for(TransitionKind::custom(4)).is_ok());
    }
}
