//! Bounding volumes for the broad phase.
//!
//! Both volumes implement [`BoundingVolume`], so the hierarchy in
//! [`bvh`](crate::bvh) is generic over the volume type. Overlap tests are
//! strict: volumes that only touch do not overlap.

use nalgebra::Vector3;

// ComplexField provides sqrt() for f32 in no_std via libm
#[allow(unused_imports)]
use nalgebra::ComplexField;

/// Operations the bounding volume hierarchy needs from a volume.
pub trait BoundingVolume: Copy {
    /// Whether the two volumes share interior space.
    fn overlaps(&self, other: &Self) -> bool;

    /// Smallest volume enclosing both.
    fn combine(&self, other: &Self) -> Self;

    /// Size measure used to order traversal.
    fn size(&self) -> f32;

    /// How much this volume would have to grow to absorb `other`.
    fn growth(&self, other: &Self) -> f32;
}

/// Sphere enclosing a shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vector3<f32>,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Vector3<f32>, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Whether `other` lies entirely inside this sphere, with `slack` added
    /// to this radius.
    pub fn contains(&self, other: &Self, slack: f32) -> bool {
        (other.center - self.center).norm() + other.radius <= self.radius + slack
    }
}

impl BoundingVolume for BoundingSphere {
    fn overlaps(&self, other: &Self) -> bool {
        let distance_squared = (self.center - other.center).norm_squared();
        let reach = self.radius + other.radius;
        distance_squared < reach * reach
    }

    fn combine(&self, other: &Self) -> Self {
        let offset = other.center - self.center;
        let distance_squared = offset.norm_squared();
        let radius_diff = other.radius - self.radius;

        // One sphere already encloses the other.
        if radius_diff * radius_diff >= distance_squared {
            return if self.radius > other.radius { *self } else { *other };
        }

        let distance = distance_squared.sqrt();
        let radius = (distance + self.radius + other.radius) * 0.5;
        let center = self.center + offset * ((radius - self.radius) / distance);
        Self { center, radius }
    }

    fn size(&self) -> f32 {
        4.0 / 3.0 * core::f32::consts::PI * self.radius * self.radius * self.radius
    }

    fn growth(&self, other: &Self) -> f32 {
        let combined = self.combine(other);
        combined.radius * combined.radius - self.radius * self.radius
    }
}

/// Axis-aligned box given by its center and half-size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub center: Vector3<f32>,
    pub half_size: Vector3<f32>,
}

impl BoundingBox {
    pub fn new(center: Vector3<f32>, half_size: Vector3<f32>) -> Self {
        Self { center, half_size }
    }

    pub fn min(&self) -> Vector3<f32> {
        self.center - self.half_size
    }

    pub fn max(&self) -> Vector3<f32> {
        self.center + self.half_size
    }

    fn surface_area(&self) -> f32 {
        let h = self.half_size;
        8.0 * (h.x * h.y + h.y * h.z + h.z * h.x)
    }
}

impl BoundingVolume for BoundingBox {
    fn overlaps(&self, other: &Self) -> bool {
        let d = other.center - self.center;
        let reach = self.half_size + other.half_size;
        d.x.abs() < reach.x && d.y.abs() < reach.y && d.z.abs() < reach.z
    }

    fn combine(&self, other: &Self) -> Self {
        let min = self.min().inf(&other.min());
        let max = self.max().sup(&other.max());
        Self {
            center: (min + max) * 0.5,
            half_size: (max - min) * 0.5,
        }
    }

    fn size(&self) -> f32 {
        8.0 * self.half_size.x * self.half_size.y * self.half_size.z
    }

    fn growth(&self, other: &Self) -> f32 {
        self.combine(other).surface_area() - self.surface_area()
    }
}
