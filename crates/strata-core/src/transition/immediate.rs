//! # Immediate Effects
//!
//! Payloads of the immediate family. They never accumulate: compose, invert
//! and apply treat them as identity. Instead the traverser hands each one to
//! `Visitor::sub_render` when it crosses the arc carrying it.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Parameters of a camera-facing rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BillboardParams {
    /// Up axis the billboard keeps, in the arc's child frame.
    pub up: Vec3,
    /// Rotate only about `up` (a tree sprite) rather than fully facing the
    /// camera (a particle).
    pub axial: bool,
}

impl Default for BillboardParams {
    fn default() -> Self {
        Self {
            up: Vec3::Z,
            axial: false,
        }
    }
}

impl BillboardParams {
    #[must_use]
    pub fn point_eye() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn axial() -> Self {
        Self {
            axial: true,
            ..Self::default()
        }
    }
}

/// A side effect run mid-traversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImmediateEffect {
    /// Rotate the subtree to face the traversal's camera.
    Billboard(BillboardParams),
    /// An effect interpreted only by the visitor (e.g. a lens flare that
    /// replaces the subtree's normal handling).
    Custom(String),
}

impl ImmediateEffect {
    pub(crate) fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Billboard(a), Self::Billboard(b)) => a
                .axial
                .cmp(&b.axial)
                .then_with(|| cmp_vec3(a.up, b.up)),
            (Self::Custom(a), Self::Custom(b)) => a.cmp(b),
            (Self::Billboard(_), Self::Custom(_)) => Ordering::Less,
            (Self::Custom(_), Self::Billboard(_)) => Ordering::Greater,
        }
    }
}

pub(crate) fn cmp_vec3(a: Vec3, b: Vec3) -> Ordering {
    a.x.total_cmp(&b.x)
        .then_with(|| a.y.total_cmp(&b.y))
        .then_with(|| a.z.total_cmp(&b.z))
}
