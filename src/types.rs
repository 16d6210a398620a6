//! Common numeric types for carton geometry.
//!
//! All lengths are millimetres, all masses kilograms. Positions use the
//! box-local frame: x runs along the inner width, y along the inner depth,
//! z along the inner height, with the origin in the lower left front corner.

use std::ops::Add;

/// Global numerical tolerance for floating-point comparisons.
///
/// Used for dimension fits and weight ceilings.
pub const EPSILON_GENERAL: f64 = 1e-6;

/// Cubic millimetres per cubic metre.
pub const MM3_PER_M3: f64 = 1e9;

/// A 3D vector or point in box-local space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    #[inline]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Creates a zero vector (origin).
    #[inline]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    #[inline]
    pub const fn from_array(values: [f64; 3]) -> Self {
        Self::new(values[0], values[1], values[2])
    }
}

impl Add for Vec3 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

/// Axis-Aligned Bounding Box (AABB).
///
/// Used to check that packed units stay inside the carton.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    /// Minimum corner (position)
    pub min: Vec3,
    /// Maximum corner (position + dimensions)
    pub max: Vec3,
}

impl BoundingBox {
    #[inline]
    pub fn from_position_and_dims(position: Vec3, dims: Vec3) -> Self {
        Self {
            min: position,
            max: position + dims,
        }
    }

    /// Checks whether `other` lies completely inside this box.
    #[inline]
    pub fn contains(&self, other: &Self, tolerance: f64) -> bool {
        other.min.x + tolerance >= self.min.x
            && other.min.y + tolerance >= self.min.y
            && other.min.z + tolerance >= self.min.z
            && other.max.x <= self.max.x + tolerance
            && other.max.y <= self.max.y + tolerance
            && other.max.z <= self.max.z + tolerance
    }
}

/// Compares two floats, treating values closer than `eps` as equal.
pub fn compare_with_epsilon(a: f64, b: f64, eps: f64) -> std::cmp::Ordering {
    if (a - b).abs() <= eps {
        std::cmp::Ordering::Equal
    } else if a < b {
        std::cmp::Ordering::Less
    } else {
        std::cmp::Ordering::Greater
    }
}
