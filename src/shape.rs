//! Collision shapes.
//!
//! A shape is a geometric primitive attached to a body at a fixed offset.
//! Shapes without a body are scenery: they never move and their offset is
//! their world placement. Planes are always scenery and are treated as
//! half-spaces by the world.

use nalgebra::{Isometry3, Point3, Unit, Vector3};

use crate::body::{BodyId, RigidBody};
use crate::bounding::BoundingSphere;
use crate::error::{PhysicsError, PhysicsResult};

/// Placement shared by every primitive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Primitive {
    /// Owning body, `None` for scenery.
    pub body: Option<BodyId>,

    /// Body-space placement of the primitive.
    pub offset: Isometry3<f32>,

    transform: Isometry3<f32>,
}

impl Primitive {
    fn new(body: Option<BodyId>) -> Self {
        Self {
            body,
            offset: Isometry3::identity(),
            transform: Isometry3::identity(),
        }
    }

    /// Refresh the cached world transform from the owning body.
    pub fn calculate_internals(&mut self, body: Option<&RigidBody>) {
        self.transform = match body {
            Some(body) => body.transform() * self.offset,
            None => self.offset,
        };
    }

    /// World transform as of the last [`calculate_internals`](Self::calculate_internals).
    #[inline]
    pub fn transform(&self) -> &Isometry3<f32> {
        &self.transform
    }

    /// World position of the primitive's origin.
    #[inline]
    pub fn position(&self) -> Vector3<f32> {
        self.transform.translation.vector
    }

    /// World direction of local axis `index` (0 = X, 1 = Y, 2 = Z).
    pub fn axis(&self, index: usize) -> Vector3<f32> {
        let mut local = Vector3::zeros();
        local[index] = 1.0;
        self.transform.rotation * local
    }

    pub(crate) fn to_local(&self, point: &Vector3<f32>) -> Vector3<f32> {
        self.transform.inverse_transform_point(&Point3::from(*point)).coords
    }

    pub(crate) fn to_world(&self, point: &Vector3<f32>) -> Vector3<f32> {
        self.transform.transform_point(&Point3::from(*point)).coords
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub primitive: Primitive,
    pub radius: f32,
}

impl Sphere {
    /// Sphere of `radius` centered on `body` (or placed in the world when
    /// `body` is `None`).
    pub fn new(body: Option<BodyId>, radius: f32) -> PhysicsResult<Self> {
        if !(radius > 0.0 && radius.is_finite()) {
            return Err(PhysicsError::InvalidShape("sphere radius must be positive and finite"));
        }
        Ok(Self {
            primitive: Primitive::new(body),
            radius,
        })
    }

    /// Builder: set the body-space offset.
    pub fn with_offset(mut self, offset: Isometry3<f32>) -> Self {
        self.primitive.offset = offset;
        self.primitive.calculate_internals(None);
        self
    }

    #[inline]
    pub fn position(&self) -> Vector3<f32> {
        self.primitive.position()
    }
}

/// Oriented box given by its half-size along each local axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionBox {
    pub primitive: Primitive,
    pub half_size: Vector3<f32>,
}

impl CollisionBox {
    pub fn new(body: Option<BodyId>, half_size: Vector3<f32>) -> PhysicsResult<Self> {
        if !half_size.iter().all(|h| *h > 0.0 && h.is_finite()) {
            return Err(PhysicsError::InvalidShape("box half-size must be positive and finite"));
        }
        Ok(Self {
            primitive: Primitive::new(body),
            half_size,
        })
    }

    /// Builder: set the body-space offset.
    pub fn with_offset(mut self, offset: Isometry3<f32>) -> Self {
        self.primitive.offset = offset;
        self.primitive.calculate_internals(None);
        self
    }

    #[inline]
    pub fn position(&self) -> Vector3<f32> {
        self.primitive.position()
    }

    #[inline]
    pub fn axis(&self, index: usize) -> Vector3<f32> {
        self.primitive.axis(index)
    }

    /// The eight corners in world space.
    pub fn vertices(&self) -> [Vector3<f32>; 8] {
        let h = self.half_size;
        let mut out = [Vector3::zeros(); 8];
        for (i, vertex) in out.iter_mut().enumerate() {
            let sx = if i & 1 == 0 { -1.0 } else { 1.0 };
            let sy = if i & 2 == 0 { -1.0 } else { 1.0 };
            let sz = if i & 4 == 0 { -1.0 } else { 1.0 };
            *vertex = self.primitive.to_world(&Vector3::new(sx * h.x, sy * h.y, sz * h.z));
        }
        out
    }
}

/// Plane `normal · p = offset`. Points with `normal · p > offset` are on the
/// positive side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Unit<Vector3<f32>>,
    pub offset: f32,
}

impl Plane {
    /// Plane through the origin shifted by `offset` along `normal`. The
    /// normal is normalized; a zero normal is rejected.
    pub fn new(normal: Vector3<f32>, offset: f32) -> PhysicsResult<Self> {
        let normal = Unit::try_new(normal, f32::EPSILON)
            .ok_or(PhysicsError::InvalidShape("plane normal must be non-zero"))?;
        if !offset.is_finite() {
            return Err(PhysicsError::InvalidShape("plane offset must be finite"));
        }
        Ok(Self { normal, offset })
    }

    /// Signed distance of `point` from the plane.
    #[inline]
    pub fn distance(&self, point: &Vector3<f32>) -> f32 {
        self.normal.dot(point) - self.offset
    }
}

/// A collision shape registered with the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Sphere(Sphere),
    Box(CollisionBox),
}

impl Shape {
    /// Sphere shape attached to `body`.
    pub fn sphere(body: BodyId, radius: f32) -> PhysicsResult<Self> {
        Ok(Shape::Sphere(Sphere::new(Some(body), radius)?))
    }

    /// Box shape attached to `body`.
    pub fn cuboid(body: BodyId, half_size: Vector3<f32>) -> PhysicsResult<Self> {
        Ok(Shape::Box(CollisionBox::new(Some(body), half_size)?))
    }

    /// Builder: set the body-space offset.
    pub fn with_offset(self, offset: Isometry3<f32>) -> Self {
        match self {
            Shape::Sphere(s) => Shape::Sphere(s.with_offset(offset)),
            Shape::Box(b) => Shape::Box(b.with_offset(offset)),
        }
    }

    pub fn primitive(&self) -> &Primitive {
        match self {
            Shape::Sphere(s) => &s.primitive,
            Shape::Box(b) => &b.primitive,
        }
    }

    pub fn primitive_mut(&mut self) -> &mut Primitive {
        match self {
            Shape::Sphere(s) => &mut s.primitive,
            Shape::Box(b) => &mut b.primitive,
        }
    }

    /// Owning body, `None` for scenery.
    #[inline]
    pub fn body(&self) -> Option<BodyId> {
        self.primitive().body
    }

    /// Sphere enclosing the shape at its current world placement.
    pub fn bounding_sphere(&self) -> BoundingSphere {
        match self {
            Shape::Sphere(s) => BoundingSphere::new(s.position(), s.radius),
            Shape::Box(b) => BoundingSphere::new(b.position(), b.half_size.norm()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion};

    #[test]
    fn test_invalid_dimensions_rejected() {
        assert!(Sphere::new(None, 0.0).is_err());
        assert!(Sphere::new(None, f32::INFINITY).is_err());
        assert!(CollisionBox::new(None, Vector3::new(1.0, -1.0, 1.0)).is_err());
        assert!(Plane::new(Vector3::zeros(), 0.0).is_err());
    }

    #[test]
    fn test_plane_normal_is_normalized() {
        let plane = Plane::new(Vector3::new(0.0, 2.0, 0.0), 1.0).unwrap();
        assert_relative_eq!(plane.normal.y, 1.0);
        assert_relative_eq!(plane.distance(&Vector3::new(5.0, 3.0, 0.0)), 2.0);
    }

    #[test]
    fn test_primitive_follows_body() {
        let body = RigidBody::new(1.0)
            .with_position(Vector3::new(0.0, 0.0, 1.0))
            .with_orientation(UnitQuaternion::from_axis_angle(&Vector3::z_axis(), core::f32::consts::FRAC_PI_2));
        let mut shape = Shape::sphere(BodyId::from_index(0), 0.5)
            .unwrap()
            .with_offset(Isometry3::from_parts(Translation3::new(1.0, 0.0, 0.0), UnitQuaternion::identity()));
        shape.primitive_mut().calculate_internals(Some(&body));
        let center = shape.bounding_sphere().center;
        assert_relative_eq!(center.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(center.y, 1.0, epsilon = 1e-5);
        assert_relative_eq!(center.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_box_axes_and_vertices() {
        let bx = CollisionBox::new(None, Vector3::new(1.0, 2.0, 3.0)).unwrap().with_offset(Isometry3::from_parts(
            Translation3::new(10.0, 0.0, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), core::f32::consts::FRAC_PI_2),
        ));
        assert_relative_eq!(bx.axis(0).y, 1.0, epsilon = 1e-6);
        assert_relative_eq!(bx.axis(1).x, -1.0, epsilon = 1e-6);
        let max_x = bx.vertices().iter().map(|v| v.x).fold(f32::MIN, f32::max);
        assert_relative_eq!(max_x, 12.0, epsilon = 1e-5);
        let shape = Shape::Box(bx);
        assert_relative_eq!(shape.bounding_sphere().radius, 14.0f32.sqrt());
        assert_eq!(shape.body(), None);
    }
}
