//! # Attributes
//!
//! An `Attribute` is the resolved, absolute value of one state property at a
//! point in the graph: the result of applying every transition on the path
//! from the root, starting from the family's initial attribute.
//!
//! An `AttributeSet` holds one attribute per `TransitionKind`. A key mapped
//! to `None` marks a property explicitly reset to its initial state, which a
//! consumer treats differently from a property never mentioned at all.

use crate::transition::{MultiAttribute, StateValue};
use crate::{TransitionFamily, TransitionKind};
use glam::Mat4;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// STATE GUARDIAN
// =============================================================================

/// Receiver of resolved state, implemented by a graphics backend.
///
/// `Attribute::issue` dispatches to the method matching its family.
pub trait StateGuardian {
    fn issue_transform(&mut self, kind: TransitionKind, matrix: &Mat4);
    fn issue_on_off(&mut self, kind: TransitionKind, value: Option<&StateValue>);
    fn issue_value(&mut self, kind: TransitionKind, value: Option<&StateValue>);
    fn issue_multi(&mut self, kind: TransitionKind, state: &MultiAttribute);
    fn issue_bit_mask(&mut self, kind: TransitionKind, bits: u32);
}

// =============================================================================
// ATTRIBUTE
// =============================================================================

/// Family-specific resolved value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// `None` is off.
    OnOff(Option<StateValue>),
    /// `None` means no value was ever set.
    On(Option<StateValue>),
    Multi(MultiAttribute),
    Matrix(Mat4),
    BitMask(u32),
}

/// A resolved property value with the priority of the transition that set it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub priority: u32,
    pub value: AttributeValue,
}

impl Attribute {
    #[must_use]
    pub fn new(value: AttributeValue) -> Self {
        Self { priority: 0, value }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// The attribute a family starts from; immediates have none.
    #[must_use]
    pub fn initial(family: TransitionFamily) -> Option<Self> {
        let value = match family {
            TransitionFamily::OnOff => AttributeValue::OnOff(None),
            TransitionFamily::On => AttributeValue::On(None),
            TransitionFamily::Multi => AttributeValue::Multi(MultiAttribute::all_off()),
            TransitionFamily::Matrix => AttributeValue::Matrix(Mat4::IDENTITY),
            TransitionFamily::BitMask => AttributeValue::BitMask(0),
            TransitionFamily::Immediate => return None,
        };
        Some(Self::new(value))
    }

    #[must_use]
    pub fn family(&self) -> TransitionFamily {
        match self.value {
            AttributeValue::OnOff(_) => TransitionFamily::OnOff,
            AttributeValue::On(_) => TransitionFamily::On,
            AttributeValue::Multi(_) => TransitionFamily::Multi,
            AttributeValue::Matrix(_) => TransitionFamily::Matrix,
            AttributeValue::BitMask(_) => TransitionFamily::BitMask,
        }
    }

    #[must_use]
    pub fn as_matrix(&self) -> Option<Mat4> {
        match self.value {
            AttributeValue::Matrix(m) => Some(m),
            _ => None,
        }
    }

    /// Whether an on/off attribute is on. Other families are always "on".
    #[must_use]
    pub fn is_on(&self) -> bool {
        !matches!(self.value, AttributeValue::OnOff(None))
    }

    /// Hand this attribute to the backend.
    pub fn issue(&self, kind: TransitionKind, gsg: &mut dyn StateGuardian) {
        match &self.value {
            AttributeValue::OnOff(value) => gsg.issue_on_off(kind, value.as_ref()),
            AttributeValue::On(value) => gsg.issue_value(kind, value.as_ref()),
            AttributeValue::Multi(state) => gsg.issue_multi(kind, state),
            AttributeValue::Matrix(m) => gsg.issue_transform(kind, m),
            AttributeValue::BitMask(bits) => gsg.issue_bit_mask(kind, *bits),
        }
    }

    /// Equality with a tolerance on matrix values.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, tolerance: f32) -> bool {
        match (&self.value, &other.value) {
            (AttributeValue::Matrix(a), AttributeValue::Matrix(b)) => {
                a.abs_diff_eq(*b, tolerance)
            }
            _ => self == other,
        }
    }
}

// =============================================================================
// ATTRIBUTE SET
// =============================================================================

/// Resolved state keyed by transition kind.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AttributeSet {
    attributes: BTreeMap<TransitionKind, Option<Attribute>>,
}

impl AttributeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The resolved attribute for `kind`, if one is present.
    #[must_use]
    pub fn get_attribute(&self, kind: TransitionKind) -> Option<&Attribute> {
        self.attributes.get(&kind).and_then(Option::as_ref)
    }

    /// Whether `kind` is mentioned at all, even as an initial state.
    #[must_use]
    pub fn contains_kind(&self, kind: TransitionKind) -> bool {
        self.attributes.contains_key(&kind)
    }

    pub fn set_attribute(&mut self, kind: TransitionKind, attr: Attribute) -> Option<Attribute> {
        self.attributes.insert(kind, Some(attr)).flatten()
    }

    /// Mark `kind` as explicitly reset to its initial state.
    pub fn set_initial(&mut self, kind: TransitionKind) -> Option<Attribute> {
        self.attributes.insert(kind, None).flatten()
    }

    pub fn clear_attribute(&mut self, kind: TransitionKind) -> Option<Attribute> {
        self.attributes.remove(&kind).flatten()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TransitionKind, Option<&Attribute>)> {
        self.attributes.iter().map(|(k, v)| (*k, v.as_ref()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// The net transform, identity when none was resolved.
    #[must_use]
    pub fn transform(&self) -> Mat4 {
        self.get_attribute(TransitionKind::TRANSFORM)
            .and_then(Attribute::as_matrix)
            .unwrap_or(Mat4::IDENTITY)
    }

    /// Issue every present attribute, in kind order.
    pub fn issue(&self, gsg: &mut dyn StateGuardian) {
        for (kind, attr) in &self.attributes {
            if let Some(attr) = attr {
                attr.issue(*kind, gsg);
            }
        }
    }

    /// Set equality with a tolerance on matrix values.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, tolerance: f32) -> bool {
        self.attributes.len() == other.attributes.len()
            && self
                .attributes
                .iter()
                .zip(&other.attributes)
                .all(|((ka, a), (kb, b))| {
                    ka == kb
                        && match (a, b) {
                            (Some(a), Some(b)) => a.approx_eq(b, tolerance),
                            (None, None) => true,
                            _ => false,
                        }
                })
    }
}

// =============================================================================
// TESTS
// =============================================================================
