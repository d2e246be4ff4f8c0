//! # Multi-valued Transitions
//!
//! A multi transition turns individual named properties (lights, clip planes)
//! on or off. Properties it does not mention follow its default direction:
//! `Identity` leaves them untouched, `On`/`Off` forces every property.
//!
//! Composing a multi transition after one of lower priority cannot collapse
//! into a single priority: the lower one may be blocked where the higher one
//! applies, yet the higher one only overwrites the properties it names. The
//! lower operands are kept as layers beneath the top one, each gated by its
//! own priority when applied.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a transition does to one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    Identity,
    On,
    Off,
}

impl Direction {
    #[must_use]
    pub const fn flipped(self) -> Self {
        match self {
            Self::Identity => Self::Identity,
            Self::On => Self::Off,
            Self::Off => Self::On,
        }
    }
}

/// Payload of a `TransitionFamily::Multi` transition.
///
/// `members` never stores `Direction::Identity`; setting a property to
/// identity removes it. `beneath` holds `(priority, layer)` pairs applied
/// before the top layer, in strictly increasing priority below the owning
/// transition's; the layers themselves have nothing beneath them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MultiTransition {
    default_dir: Direction,
    members: BTreeMap<String, Direction>,
    beneath: Vec<(u32, MultiTransition)>,
}

impl Default for MultiTransition {
    fn default() -> Self {
        Self::new(Direction::Identity)
    }
}

impl MultiTransition {
    #[must_use]
    pub fn new(default_dir: Direction) -> Self {
        Self {
            default_dir,
            members: BTreeMap::new(),
            beneath: Vec::new(),
        }
    }

    /// Builder form of `set`.
    #[must_use]
    pub fn with(mut self, property: impl Into<String>, dir: Direction) -> Self {
        self.set(property, dir);
        self
    }

    pub fn set(&mut self, property: impl Into<String>, dir: Direction) {
        let property = property.into();
        if dir == Direction::Identity {
            self.members.remove(&property);
        } else {
            self.members.insert(property, dir);
        }
    }

    #[must_use]
    pub fn default_dir(&self) -> Direction {
        self.default_dir
    }

    #[must_use]
    pub fn direction(&self, property: &str) -> Direction {
        self.members
            .get(property)
            .copied()
            .unwrap_or(Direction::Identity)
    }

    pub fn members(&self) -> impl Iterator<Item = (&str, Direction)> {
        self.members.iter().map(|(k, v)| (k.as_str(), *v))
    }

    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.is_top_identity() && self.beneath.is_empty()
    }

    fn is_top_identity(&self) -> bool {
        self.default_dir == Direction::Identity && self.members.is_empty()
    }

    /// Whether lower-priority layers were composed in beneath this one.
    #[must_use]
    pub fn is_layered(&self) -> bool {
        !self.beneath.is_empty()
    }

    fn top(&self) -> Self {
        Self {
            default_dir: self.default_dir,
            members: self.members.clone(),
            beneath: Vec::new(),
        }
    }

    /// Every layer in application order, the top one last at `priority`.
    pub fn layers(&self, priority: u32) -> impl Iterator<Item = (u32, Self)> + '_ {
        self.beneath
            .iter()
            .cloned()
            .chain(std::iter::once((priority, self.top())))
    }

    /// Memberwise merge of two top layers: `other` wins wherever it says
    /// something.
    fn merged(&self, other: &Self) -> Self {
        if other.default_dir != Direction::Identity {
            return other.top();
        }
        let mut members = self.members.clone();
        for (property, dir) in &other.members {
            members.insert(property.clone(), *dir);
        }
        Self {
            default_dir: self.default_dir,
            members,
            beneath: Vec::new(),
        }
    }

    /// `self` at `priority` followed by `other` at `other_priority`.
    ///
    /// Returns the composed transition and the priority it carries. Layers
    /// that can never apply (identities, or those below a layer already
    /// passed) are dropped, equal priorities merge, and a forcing layer
    /// discards everything before it.
    #[must_use]
    pub fn then(&self, priority: u32, other: &Self, other_priority: u32) -> (u32, Self) {
        let mut steps: Vec<(u32, Self)> = Vec::new();
        for (p, layer) in self.layers(priority).chain(other.layers(other_priority)) {
            if layer.is_top_identity() {
                continue;
            }
            match steps.last().map(|(last, _)| *last) {
                Some(last) if p < last => continue,
                Some(last) if p == last => {
                    if let Some((_, top)) = steps.last_mut() {
                        *top = top.merged(&layer);
                    }
                }
                _ => steps.push((p, layer)),
            }
            let forced = steps
                .last()
                .is_some_and(|(_, top)| top.default_dir != Direction::Identity);
            if forced {
                steps = steps.pop().into_iter().collect();
            }
        }
        match steps.pop() {
            Some((p, mut top)) => {
                top.beneath = steps;
                (p, top)
            }
            None => (other_priority, Self::default()),
        }
    }

    /// Shift every layer beneath the top by `delta`, clamped like the
    /// owning transition's priority.
    pub(crate) fn adjust_priorities(&mut self, delta: i32) {
        for (priority, _) in &mut self.beneath {
            *priority = priority.saturating_add_signed(delta);
        }
    }

    /// Flip every member; `None` when the default direction forces all or
    /// layers lie beneath.
    #[must_use]
    pub fn inverted(&self) -> Option<Self> {
        if self.default_dir != Direction::Identity || self.is_layered() {
            return None;
        }
        Some(Self {
            default_dir: Direction::Identity,
            members: self
                .members
                .iter()
                .map(|(k, v)| (k.clone(), v.flipped()))
                .collect(),
            beneath: Vec::new(),
        })
    }
}

/// Resolved state of a multi-valued property family.
///
/// `base_on` applies to every property without an override; `overrides`
/// only holds properties whose state differs from `base_on`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MultiAttribute {
    base_on: bool,
    overrides: BTreeMap<String, bool>,
}

impl MultiAttribute {
    #[must_use]
    pub fn all_off() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_on(&self, property: &str) -> bool {
        self.overrides
            .get(property)
            .copied()
            .unwrap_or(self.base_on)
    }

    /// Whether unmentioned properties are on.
    #[must_use]
    pub fn base_on(&self) -> bool {
        self.base_on
    }

    /// Properties explicitly switched on (those differing from an off base).
    pub fn on_properties(&self) -> impl Iterator<Item = &str> {
        self.overrides
            .iter()
            .filter(|(_, on)| **on)
            .map(|(k, _)| k.as_str())
    }

    /// Properties explicitly switched off (those differing from an on base).
    pub fn off_properties(&self) -> impl Iterator<Item = &str> {
        self.overrides
            .iter()
            .filter(|(_, on)| !**on)
            .map(|(k, _)| k.as_str())
    }

    fn set(&mut self, property: &str, on: bool) {
        if on == self.base_on {
            self.overrides.remove(property);
        } else {
            self.overrides.insert(property.to_string(), on);
        }
    }

    /// Fold the top layer of a multi transition onto this state.
    #[must_use]
    pub fn applied(&self, trans: &MultiTransition) -> Self {
        let mut result = match trans.default_dir {
            Direction::Identity => self.clone(),
            Direction::On => Self {
                base_on: true,
                overrides: BTreeMap::new(),
            },
            Direction::Off => Self::all_off(),
        };
        for (property, dir) in trans.members() {
            result.set(property, dir == Direction::On);
        }
        result
    }
}

// =============================================================================
// TESTS
// =============================================================================
