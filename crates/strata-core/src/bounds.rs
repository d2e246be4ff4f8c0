//! # Bounding Volumes
//!
//! Conservative spheres enclosing a node's geometry and everything below it.
//! Arc bounds are expressed in the arc's parent frame and recomputed lazily
//! after the graph marks them stale.

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum BoundingVolume {
    #[default]
    Empty,
    Sphere { center: Vec3, radius: f32 },
}

impl BoundingVolume {
    #[must_use]
    pub fn sphere(center: Vec3, radius: f32) -> Self {
        Self::Sphere {
            center,
            radius: radius.max(0.0),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The smallest sphere enclosing both volumes.
    #[must_use]
    pub fn extend_by(self, other: Self) -> Self {
        match (self, other) {
            (Self::Empty, v) | (v, Self::Empty) => v,
            (
                Self::Sphere {
                    center: c1,
                    radius: r1,
                },
                Self::Sphere {
                    center: c2,
                    radius: r2,
                },
            ) => {
                let distance = c1.distance(c2);
                if distance + r2 <= r1 {
                    return self;
                }
                if distance + r1 <= r2 {
                    return other;
                }
                let radius = (distance + r1 + r2) * 0.5;
                let center = c1 + (c2 - c1) * ((radius - r1) / distance);
                Self::sphere(center, radius)
            }
        }
    }

    /// Enclose every volume in `volumes`.
    pub fn around<I: IntoIterator<Item = Self>>(volumes: I) -> Self {
        volumes.into_iter().fold(Self::Empty, Self::extend_by)
    }

    /// Carry the volume through `m`, scaling the radius by the largest axis
    /// scale so the result stays conservative.
    #[must_use]
    pub fn transform(self, m: &Mat4) -> Self {
        match self {
            Self::Empty => Self::Empty,
            Self::Sphere { center, radius } => {
                let scale = m
                    .x_axis
                    .truncate()
                    .length()
                    .max(m.y_axis.truncate().length())
                    .max(m.z_axis.truncate().length());
                Self::sphere(m.transform_point3(center), radius * scale)
            }
        }
    }

    #[must_use]
    pub fn contains_point(&self, p: Vec3) -> bool {
        match self {
            Self::Empty => false,
            Self::Sphere { center, radius } => center.distance(p) <= *radius + 1.0e-5,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_neutral() {
        let s = BoundingVolume::sphere(Vec3::ONE, 2.0);
        assert_eq!(BoundingVolume::Empty.extend_by(s), s);
        assert_eq!(s.extend_by(BoundingVolume::Empty), s);
        assert!(BoundingVolume::around([]).is_empty());
    }

    #[test]
    fn extend_encloses_both() {
        let a = BoundingVolume::sphere(Vec3::ZERO, 1.0);
        let b = BoundingVolume::sphere(Vec3::new(4.0, 0.0, 0.0), 1.0);
        let both = a.extend_by(b);

        assert!(both.contains_point(Vec3::new(-1.0, 0.0, 0.0)));
        assert!(both.contains_point(Vec3::new(5.0, 0.0, 0.0)));
        assert_eq!(
            both,
            BoundingVolume::sphere(Vec3::new(2.0, 0.0, 0.0), 3.0)
        );
    }

    #[test]
    fn nested_sphere_absorbed() {
        let big = BoundingVolume::sphere(Vec3::ZERO, 10.0);
        let small = BoundingVolume::sphere(Vec3::X, 1.0);
        assert_eq!(big.extend_by(small), big);
        assert_eq!(small.extend_by(big), big);
    }

    #[test]
    fn transform_moves_and_scales() {
        let s = BoundingVolume::sphere(Vec3::ZERO, 1.0);
        let m = Mat4::from_translation(Vec3::Y) * Mat4::from_scale(Vec3::new(1.0, 3.0, 1.0));
        assert_eq!(s.transform(&m), BoundingVolume::sphere(Vec3::Y, 3.0));
    }
}
