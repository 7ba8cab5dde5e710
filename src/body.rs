//! Rigid bodies: physical state, derived data, integration and sleep.
//!
//! A [`RigidBody`] stores its primary state (position, orientation,
//! velocities, accumulators) together with data derived from it once per
//! step: the world transform and the world-space inverse inertia tensor.
//! Call [`RigidBody::calculate_derived_data`] after editing position or
//! orientation by hand; the integrator and the contact resolver do it
//! themselves.
//!
//! # Sleep
//! A body whose recency-weighted motion drops below its sleep epsilon falls
//! asleep: its velocities are zeroed and integration skips it until it is
//! woken by a contact with an awake body or by [`RigidBody::set_awake`].

use log::{error, trace};
use nalgebra::{Isometry3, Matrix3, Matrix4, Point3, Quaternion, Translation3, UnitQuaternion, Vector3};

// ComplexField provides sqrt() and powf() for f32 in no_std via libm
#[allow(unused_imports)]
use nalgebra::ComplexField;

use crate::error::{PhysicsError, PhysicsResult};

/// Unique identifier for a rigid body within a [`World`](crate::world::World).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub(crate) usize);

impl BodyId {
    /// Build an id from a raw slot index.
    ///
    /// Useful when driving the resolver or force generators directly on a
    /// slice of bodies instead of through a world.
    pub fn from_index(index: usize) -> Self {
        Self(index)
    }

    /// Slot index of this body.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Default sleep threshold for the recency-weighted motion value.
pub const DEFAULT_SLEEP_EPSILON: f32 = 0.1;

/// A rigid body with linear and angular dynamics.
#[derive(Debug, Clone)]
pub struct RigidBody {
    // -- Linear state --
    pub position: Vector3<f32>,
    pub velocity: Vector3<f32>,

    /// Constant acceleration applied every step (typically gravity).
    pub acceleration: Vector3<f32>,

    /// Linear damping in `[0, 1]`, applied as `velocity *= damping^dt`.
    /// `1.0` means no velocity is lost.
    pub linear_damping: f32,

    mass: f32,
    inv_mass: f32,

    // -- Angular state --
    /// Orientation quaternion. Defaults to identity (no rotation).
    pub orientation: UnitQuaternion<f32>,

    /// Angular velocity in world space (radians per second).
    pub angular_velocity: Vector3<f32>,

    /// Angular damping in `[0, 1]`, applied as `angular_velocity *= damping^dt`.
    pub angular_damping: f32,

    inv_inertia_local: Matrix3<f32>,

    // -- Material --
    /// Bounciness in `[0, 1]`. Combined with the other body as the minimum.
    pub restitution: f32,

    /// Coulomb friction coefficient. Combined with the other body as the
    /// geometric mean `sqrt(mu_a * mu_b)`.
    pub friction: f32,

    // -- Accumulators --
    force_accumulator: Vector3<f32>,
    torque_accumulator: Vector3<f32>,
    last_frame_acceleration: Vector3<f32>,

    // -- Derived data --
    transform: Isometry3<f32>,
    inv_inertia_world: Matrix3<f32>,

    // -- Sleep --
    is_awake: bool,
    can_sleep: bool,
    motion: f32,
    sleep_epsilon: f32,

    /// Whether this body is registered. Cleared by
    /// [`World::remove_body`](crate::world::World::remove_body).
    pub active: bool,
}

impl RigidBody {
    /// Create a new dynamic rigid body with the given mass (in kg).
    ///
    /// The body starts with the inertia tensor of a unit solid sphere. Use
    /// [`with_inertia_sphere`](Self::with_inertia_sphere),
    /// [`with_inertia_box`](Self::with_inertia_box) or
    /// [`with_inertia_tensor`](Self::with_inertia_tensor) for the real shape.
    ///
    /// # Panics
    /// Panics if `mass` is not positive and finite.
    pub fn new(mass: f32) -> Self {
        assert!(mass > 0.0 && mass.is_finite(), "mass must be positive and finite");
        let inv_i = 1.0 / (0.4 * mass);
        let mut body = Self::base(mass, 1.0 / mass, Matrix3::from_diagonal_element(inv_i));
        body.calculate_derived_data();
        body
    }

    /// Create an immovable body (infinite mass, unaffected by forces and
    /// contacts). Useful for floors and walls built from boxes.
    pub fn new_static() -> Self {
        let mut body = Self::base(f32::INFINITY, 0.0, Matrix3::zeros());
        body.linear_damping = 1.0;
        body.angular_damping = 1.0;
        body.can_sleep = false;
        body.calculate_derived_data();
        body
    }

    fn base(mass: f32, inv_mass: f32, inv_inertia_local: Matrix3<f32>) -> Self {
        Self {
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            acceleration: Vector3::zeros(),
            linear_damping: 0.99,
            mass,
            inv_mass,
            orientation: UnitQuaternion::identity(),
            angular_velocity: Vector3::zeros(),
            angular_damping: 0.99,
            inv_inertia_local,
            restitution: 0.5,
            friction: 0.3,
            force_accumulator: Vector3::zeros(),
            torque_accumulator: Vector3::zeros(),
            last_frame_acceleration: Vector3::zeros(),
            transform: Isometry3::identity(),
            inv_inertia_world: Matrix3::zeros(),
            is_awake: true,
            can_sleep: true,
            motion: 2.0 * DEFAULT_SLEEP_EPSILON,
            sleep_epsilon: DEFAULT_SLEEP_EPSILON,
            active: true,
        }
    }

    /// Builder: set initial position.
    pub fn with_position(mut self, position: Vector3<f32>) -> Self {
        self.position = position;
        self.calculate_derived_data();
        self
    }

    /// Builder: set initial orientation.
    pub fn with_orientation(mut self, orientation: UnitQuaternion<f32>) -> Self {
        self.orientation = orientation;
        self.calculate_derived_data();
        self
    }

    /// Builder: set initial velocity.
    pub fn with_velocity(mut self, velocity: Vector3<f32>) -> Self {
        self.velocity = velocity;
        self
    }

    /// Builder: set initial angular velocity (in radians per second).
    pub fn with_angular_velocity(mut self, angular_velocity: Vector3<f32>) -> Self {
        self.angular_velocity = angular_velocity;
        self
    }

    /// Builder: set the constant acceleration (e.g. gravity).
    pub fn with_acceleration(mut self, acceleration: Vector3<f32>) -> Self {
        self.acceleration = acceleration;
        self
    }

    /// Builder: set linear damping (0.0..=1.0, 1.0 = no loss).
    pub fn with_damping(mut self, damping: f32) -> Self {
        self.linear_damping = damping.clamp(0.0, 1.0);
        self
    }

    /// Builder: set angular damping (0.0..=1.0, 1.0 = no loss).
    pub fn with_angular_damping(mut self, damping: f32) -> Self {
        self.angular_damping = damping.clamp(0.0, 1.0);
        self
    }

    /// Builder: set restitution (bounciness, 0.0..=1.0).
    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution.clamp(0.0, 1.0);
        self
    }

    /// Builder: set friction coefficient (0.0 = frictionless).
    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction.max(0.0);
        self
    }

    /// Builder: allow or forbid sleeping.
    pub fn with_can_sleep(mut self, can_sleep: bool) -> Self {
        self.set_can_sleep(can_sleep);
        self
    }

    /// Builder: set the sleep threshold. Resets the motion value to twice
    /// the new threshold.
    pub fn with_sleep_epsilon(mut self, epsilon: f32) -> Self {
        self.sleep_epsilon = epsilon.max(0.0);
        self.motion = 2.0 * self.sleep_epsilon;
        self
    }

    /// Builder: set the body-space inertia tensor.
    ///
    /// Fails with [`PhysicsError::DegenerateInertiaTensor`] when the tensor
    /// has no finite inverse. Immovable bodies keep their zero inverse tensor.
    pub fn with_inertia_tensor(mut self, tensor: Matrix3<f32>) -> PhysicsResult<Self> {
        let inverse = invert_inertia(&tensor)?;
        if self.inv_mass > 0.0 {
            self.inv_inertia_local = inverse;
            self.calculate_derived_data();
        }
        Ok(self)
    }

    /// Builder: set the inertia tensor for a solid sphere of given radius.
    ///
    /// Inertia: `I = (2/5) * m * r²` (uniform along all axes).
    pub fn with_inertia_sphere(self, radius: f32) -> PhysicsResult<Self> {
        if self.inv_mass == 0.0 {
            return Ok(self);
        }
        let i = 0.4 * self.mass * radius * radius;
        self.with_inertia_tensor(Matrix3::from_diagonal_element(i))
    }

    /// Builder: set the inertia tensor for a solid box with given half-extents.
    ///
    /// For a box of full dimensions `(2*hx, 2*hy, 2*hz)`:
    /// - `Ixx = (1/12) * m * (4*hy² + 4*hz²)`
    /// - `Iyy = (1/12) * m * (4*hx² + 4*hz²)`
    /// - `Izz = (1/12) * m * (4*hx² + 4*hy²)`
    pub fn with_inertia_box(self, half_extents: Vector3<f32>) -> PhysicsResult<Self> {
        if self.inv_mass == 0.0 {
            return Ok(self);
        }
        let hx2 = 4.0 * half_extents.x * half_extents.x;
        let hy2 = 4.0 * half_extents.y * half_extents.y;
        let hz2 = 4.0 * half_extents.z * half_extents.z;
        let k = self.mass / 12.0;
        let tensor = Matrix3::from_diagonal(&Vector3::new(k * (hy2 + hz2), k * (hx2 + hz2), k * (hx2 + hy2)));
        self.with_inertia_tensor(tensor)
    }

    // -- Accessors --

    /// Mass in kg (`f32::INFINITY` for immovable bodies).
    #[inline]
    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Inverse mass. Zero for immovable bodies.
    #[inline]
    pub fn inverse_mass(&self) -> f32 {
        self.inv_mass
    }

    /// Whether the body can be moved by forces and contacts.
    #[inline]
    pub fn has_finite_mass(&self) -> bool {
        self.inv_mass > 0.0
    }

    /// Awake, registered and of finite mass: the body will respond to
    /// contacts this step.
    #[inline]
    pub fn is_movable(&self) -> bool {
        self.active && self.is_awake && self.inv_mass > 0.0
    }

    /// Inverse inertia tensor in body space.
    #[inline]
    pub fn inverse_inertia_tensor(&self) -> &Matrix3<f32> {
        &self.inv_inertia_local
    }

    /// Inverse inertia tensor in world space, as of the last derived-data
    /// update: `I⁻¹_world = R * I⁻¹_local * Rᵀ`.
    #[inline]
    pub fn inverse_inertia_tensor_world(&self) -> &Matrix3<f32> {
        &self.inv_inertia_world
    }

    /// Body-to-world transform as of the last derived-data update.
    #[inline]
    pub fn transform(&self) -> &Isometry3<f32> {
        &self.transform
    }

    /// Body-to-world transform as a homogeneous matrix.
    pub fn transform_matrix(&self) -> Matrix4<f32> {
        self.transform.to_homogeneous()
    }

    /// Linear acceleration used during the last integration step.
    #[inline]
    pub fn last_frame_acceleration(&self) -> Vector3<f32> {
        self.last_frame_acceleration
    }

    /// Forces accumulated since the last clear.
    #[inline]
    pub fn force_accumulator(&self) -> Vector3<f32> {
        self.force_accumulator
    }

    /// Torques accumulated since the last clear.
    #[inline]
    pub fn torque_accumulator(&self) -> Vector3<f32> {
        self.torque_accumulator
    }

    #[inline]
    pub fn is_awake(&self) -> bool {
        self.is_awake
    }

    #[inline]
    pub fn can_sleep(&self) -> bool {
        self.can_sleep
    }

    /// Recency-weighted motion value driving the sleep decision.
    #[inline]
    pub fn motion(&self) -> f32 {
        self.motion
    }

    #[inline]
    pub fn sleep_epsilon(&self) -> f32 {
        self.sleep_epsilon
    }

    /// Returns the current speed (magnitude of velocity).
    #[inline]
    pub fn speed(&self) -> f32 {
        self.velocity.norm()
    }

    /// Returns the linear kinetic energy `0.5 * m * v²`; zero for immovable bodies.
    #[inline]
    pub fn kinetic_energy(&self) -> f32 {
        if self.inv_mass == 0.0 {
            return 0.0;
        }
        0.5 * self.mass * self.velocity.norm_squared()
    }

    // -- Sleep --

    /// Wake the body up or put it to sleep.
    ///
    /// Waking sets the motion value to twice the sleep epsilon so the body
    /// does not fall straight back asleep. Sleeping zeroes both velocities.
    pub fn set_awake(&mut self, awake: bool) {
        if awake {
            if !self.is_awake {
                trace!("body woke up at {:?}", self.position);
            }
            self.is_awake = true;
            self.motion = 2.0 * self.sleep_epsilon;
        } else {
            self.is_awake = false;
            self.velocity = Vector3::zeros();
            self.angular_velocity = Vector3::zeros();
        }
    }

    /// Allow or forbid sleeping. A sleeping body that may no longer sleep is
    /// woken immediately.
    pub fn set_can_sleep(&mut self, can_sleep: bool) {
        self.can_sleep = can_sleep;
        if !can_sleep && !self.is_awake {
            self.set_awake(true);
        }
    }

    // -- Forces --

    /// Apply a force (in Newtons) through the center of mass. Forces
    /// accumulate until the next step.
    #[inline]
    pub fn apply_force(&mut self, force: Vector3<f32>) {
        self.force_accumulator += force;
    }

    /// Apply a torque (in N·m). Torques accumulate until the next step.
    #[inline]
    pub fn apply_torque(&mut self, torque: Vector3<f32>) {
        self.torque_accumulator += torque;
    }

    /// Apply a force at a point given in world space. Produces a torque
    /// about the center of mass.
    pub fn apply_force_at_point(&mut self, force: Vector3<f32>, point: Vector3<f32>) {
        let arm = point - self.position;
        self.force_accumulator += force;
        self.torque_accumulator += arm.cross(&force);
    }

    /// Apply a world-space force at a point given in body space.
    pub fn apply_force_at_body_point(&mut self, force: Vector3<f32>, point: Vector3<f32>) {
        let world_point = self.point_in_world_space(&point);
        self.apply_force_at_point(force, world_point);
    }

    /// Apply an instantaneous impulse (change in momentum) through the
    /// center of mass.
    #[inline]
    pub fn apply_impulse(&mut self, impulse: Vector3<f32>) {
        self.velocity += impulse * self.inv_mass;
    }

    /// Clear force and torque accumulators.
    #[inline]
    pub fn clear_accumulators(&mut self) {
        self.force_accumulator = Vector3::zeros();
        self.torque_accumulator = Vector3::zeros();
    }

    // -- Space conversions --

    /// Convert a body-space point to world space.
    pub fn point_in_world_space(&self, point: &Vector3<f32>) -> Vector3<f32> {
        self.transform.transform_point(&Point3::from(*point)).coords
    }

    /// Convert a world-space point to body space.
    pub fn point_in_local_space(&self, point: &Vector3<f32>) -> Vector3<f32> {
        self.transform.inverse_transform_point(&Point3::from(*point)).coords
    }

    /// Rotate a body-space direction into world space.
    pub fn direction_in_world_space(&self, direction: &Vector3<f32>) -> Vector3<f32> {
        self.transform.transform_vector(direction)
    }

    /// Rotate a world-space direction into body space.
    pub fn direction_in_local_space(&self, direction: &Vector3<f32>) -> Vector3<f32> {
        self.transform.inverse_transform_vector(direction)
    }

    // -- Integration --

    /// Advance the orientation by `rotation * scale` treated as a rotation
    /// vector: `q += ½ (0, rotation * scale) q`, then renormalize.
    pub fn add_scaled_rotation(&mut self, rotation: &Vector3<f32>, scale: f32) {
        let half = 0.5 * scale;
        let dq = Quaternion::new(0.0, rotation.x * half, rotation.y * half, rotation.z * half);
        let q = self.orientation.into_inner();
        self.orientation = UnitQuaternion::new_normalize(q + dq * q);
    }

    /// Recompute the world transform and world-space inverse inertia tensor
    /// from position and orientation.
    pub fn calculate_derived_data(&mut self) {
        self.orientation = UnitQuaternion::new_normalize(self.orientation.into_inner());
        self.transform = Isometry3::from_parts(Translation3::from(self.position), self.orientation);
        let r = self.orientation.to_rotation_matrix();
        self.inv_inertia_world = r.matrix() * self.inv_inertia_local * r.matrix().transpose();
    }

    /// Integrate this body forward by `duration` seconds (semi-implicit Euler).
    ///
    /// Sleeping and immovable bodies do not move; only their accumulators
    /// are cleared. After moving, the body updates its motion value and
    /// falls asleep if it has been still long enough.
    pub fn integrate(&mut self, duration: f32) {
        if !self.is_awake || self.inv_mass == 0.0 {
            self.clear_accumulators();
            return;
        }

        // --- Linear ---
        self.last_frame_acceleration = self.acceleration + self.force_accumulator * self.inv_mass;
        self.velocity += self.last_frame_acceleration * duration;
        self.velocity *= self.linear_damping.powf(duration);
        self.position += self.velocity * duration;

        // --- Angular ---
        let angular_acceleration = self.inv_inertia_world * self.torque_accumulator;
        self.angular_velocity += angular_acceleration * duration;
        self.angular_velocity *= self.angular_damping.powf(duration);
        let w = self.angular_velocity;
        self.add_scaled_rotation(&w, duration);

        self.calculate_derived_data();
        self.clear_accumulators();

        if self.can_sleep {
            let current_motion = self.velocity.norm_squared() + self.angular_velocity.norm_squared();
            let bias = 0.5f32.powf(duration);
            self.motion = bias * self.motion + (1.0 - bias) * current_motion;

            if self.motion < self.sleep_epsilon {
                trace!("body fell asleep at {:?}", self.position);
                self.set_awake(false);
            } else if self.motion > 10.0 * self.sleep_epsilon {
                self.motion = 10.0 * self.sleep_epsilon;
            }
        }
    }
}

fn invert_inertia(tensor: &Matrix3<f32>) -> PhysicsResult<Matrix3<f32>> {
    match tensor.try_inverse() {
        Some(inverse) if inverse.iter().all(|v| v.is_finite()) => Ok(inverse),
        _ => {
            error!("rejecting degenerate inertia tensor {:?}", tensor);
            Err(PhysicsError::DegenerateInertiaTensor)
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;

    const EPSILON: f32 = 1e-4;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    fn approx_vec_eq(a: &Vector3<f32>, b: &Vector3<f32>) -> bool {
        approx_eq(a.x, b.x) && approx_eq(a.y, b.y) && approx_eq(a.z, b.z)
    }

    #[test]
    fn test_body_creation() {
        let body = RigidBody::new(2.0);
        assert!(approx_eq(body.mass(), 2.0));
        assert!(approx_eq(body.inverse_mass(), 0.5));
        assert!(body.is_awake());
        assert!(body.can_sleep());
        assert!(approx_eq(body.motion(), 2.0 * DEFAULT_SLEEP_EPSILON));
        assert_eq!(body.orientation, UnitQuaternion::identity());
    }

    #[test]
    #[should_panic]
    fn test_body_zero_mass_panics() {
        RigidBody::new(0.0);
    }

    #[test]
    #[should_panic]
    fn test_body_nan_mass_panics() {
        RigidBody::new(f32::NAN);
    }

    #[test]
    fn test_static_body() {
        let body = RigidBody::new_static();
        assert_eq!(body.inverse_mass(), 0.0);
        assert!(!body.has_finite_mass());
        assert_eq!(*body.inverse_inertia_tensor(), Matrix3::zeros());
        assert_eq!(body.kinetic_energy(), 0.0);
    }

    #[test]
    fn test_builder_clamps() {
        let body = RigidBody::new(1.0)
            .with_damping(1.5)
            .with_angular_damping(-0.5)
            .with_restitution(2.0)
            .with_friction(-1.0);
        assert_eq!(body.linear_damping, 1.0);
        assert_eq!(body.angular_damping, 0.0);
        assert_eq!(body.restitution, 1.0);
        assert_eq!(body.friction, 0.0);
    }

    #[test]
    fn test_inertia_sphere() {
        let body = RigidBody::new(5.0).with_inertia_sphere(2.0).unwrap();
        // I = 0.4 * 5 * 4 = 8
        let inv = body.inverse_inertia_tensor();
        assert!(approx_eq(inv[(0, 0)], 1.0 / 8.0));
        assert!(approx_eq(inv[(2, 2)], 1.0 / 8.0));
    }

    #[test]
    fn test_inertia_box() {
        let body = RigidBody::new(12.0).with_inertia_box(Vector3::new(1.0, 2.0, 3.0)).unwrap();
        // k = 1; Ixx = 16 + 36, Iyy = 4 + 36, Izz = 4 + 16
        let inv = body.inverse_inertia_tensor();
        assert!(approx_eq(inv[(0, 0)], 1.0 / 52.0));
        assert!(approx_eq(inv[(1, 1)], 1.0 / 40.0));
        assert!(approx_eq(inv[(2, 2)], 1.0 / 20.0));
    }

    #[test]
    fn test_degenerate_inertia_rejected() {
        let result = RigidBody::new(1.0).with_inertia_tensor(Matrix3::zeros());
        assert_eq!(result.err(), Some(PhysicsError::DegenerateInertiaTensor));

        let flat = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, 0.0));
        assert!(RigidBody::new(1.0).with_inertia_tensor(flat).is_err());

        assert!(RigidBody::new(1.0).with_inertia_sphere(0.0).is_err());
    }

    #[test]
    fn test_inertia_on_static_body_unchanged() {
        let body = RigidBody::new_static().with_inertia_sphere(1.0).unwrap();
        assert_eq!(*body.inverse_inertia_tensor(), Matrix3::zeros());
    }

    #[test]
    fn test_inverse_inertia_world_rotated() {
        let body = RigidBody::new(12.0)
            .with_inertia_box(Vector3::new(1.0, 2.0, 3.0))
            .unwrap()
            .with_orientation(UnitQuaternion::from_axis_angle(&Vector3::z_axis(), core::f32::consts::FRAC_PI_2));
        // A quarter turn about Z swaps the X and Y principal axes.
        let world = body.inverse_inertia_tensor_world();
        assert!(approx_eq(world[(0, 0)], 1.0 / 40.0));
        assert!(approx_eq(world[(1, 1)], 1.0 / 52.0));
        assert!(approx_eq(world[(2, 2)], 1.0 / 20.0));
    }

    #[test]
    fn test_force_at_point_produces_torque() {
        let mut body = RigidBody::new(1.0).with_position(Vector3::new(1.0, 0.0, 0.0));
        body.apply_force_at_point(Vector3::new(0.0, 1.0, 0.0), Vector3::new(2.0, 0.0, 0.0));
        assert!(approx_vec_eq(&body.force_accumulator(), &Vector3::new(0.0, 1.0, 0.0)));
        assert!(approx_vec_eq(&body.torque_accumulator(), &Vector3::new(0.0, 0.0, 1.0)));

        body.clear_accumulators();
        assert_eq!(body.force_accumulator(), Vector3::zeros());
        assert_eq!(body.torque_accumulator(), Vector3::zeros());
    }

    #[test]
    fn test_space_conversions() {
        let body = RigidBody::new(1.0)
            .with_position(Vector3::new(0.0, 0.0, 5.0))
            .with_orientation(UnitQuaternion::from_axis_angle(&Vector3::z_axis(), core::f32::consts::FRAC_PI_2));
        let world = body.point_in_world_space(&Vector3::new(1.0, 0.0, 0.0));
        assert!(approx_vec_eq(&world, &Vector3::new(0.0, 1.0, 5.0)));
        let back = body.point_in_local_space(&world);
        assert!(approx_vec_eq(&back, &Vector3::new(1.0, 0.0, 0.0)));

        let dir = body.direction_in_world_space(&Vector3::new(1.0, 0.0, 0.0));
        assert!(approx_vec_eq(&dir, &Vector3::new(0.0, 1.0, 0.0)));
        assert!(approx_vec_eq(&body.direction_in_local_space(&dir), &Vector3::new(1.0, 0.0, 0.0)));

        let m = body.transform_matrix();
        assert!(approx_eq(m[(2, 3)], 5.0));
    }

    #[test]
    fn test_integrate_advances_position_without_damping() {
        let v = Vector3::new(1.0, -2.0, 0.5);
        let mut body = RigidBody::new(1.0).with_velocity(v).with_damping(1.0).with_can_sleep(false);
        body.integrate(0.5);
        assert!(approx_vec_eq(&body.position, &(v * 0.5)));
        assert!(approx_vec_eq(&body.velocity, &v));
    }

    #[test]
    fn test_integrate_applies_acceleration_and_forces() {
        let mut body = RigidBody::new(2.0)
            .with_acceleration(Vector3::new(0.0, -10.0, 0.0))
            .with_damping(1.0);
        body.apply_force(Vector3::new(4.0, 0.0, 0.0));
        body.integrate(1.0);
        assert!(approx_vec_eq(&body.velocity, &Vector3::new(2.0, -10.0, 0.0)));
        assert!(approx_vec_eq(&body.last_frame_acceleration(), &Vector3::new(2.0, -10.0, 0.0)));
        assert_eq!(body.force_accumulator(), Vector3::zeros());
    }

    #[test]
    fn test_damping_is_per_second() {
        let mut body = RigidBody::new(1.0)
            .with_velocity(Vector3::new(1.0, 0.0, 0.0))
            .with_damping(0.5)
            .with_can_sleep(false);
        body.integrate(1.0);
        assert!(approx_eq(body.velocity.x, 0.5));
        body.integrate(2.0);
        assert!(approx_eq(body.velocity.x, 0.125));
    }

    #[test]
    fn test_sleeping_body_drops_forces() {
        let mut body = RigidBody::new(1.0).with_velocity(Vector3::new(1.0, 0.0, 0.0));
        body.set_awake(false);
        body.apply_force(Vector3::new(5.0, 0.0, 0.0));
        body.apply_torque(Vector3::new(0.0, 1.0, 0.0));
        body.integrate(0.1);
        assert_eq!(body.position, Vector3::zeros());
        assert_eq!(body.force_accumulator(), Vector3::zeros());
        assert_eq!(body.torque_accumulator(), Vector3::zeros());

        // The stale force does not kick in on waking.
        body.set_awake(true);
        body.integrate(0.1);
        assert_eq!(body.velocity, Vector3::zeros());
    }

    #[test]
    fn test_static_body_not_integrated() {
        let mut body = RigidBody::new_static().with_acceleration(Vector3::new(0.0, -9.81, 0.0));
        body.apply_force(Vector3::new(1.0, 0.0, 0.0));
        body.integrate(1.0);
        assert_eq!(body.position, Vector3::zeros());
        assert_eq!(body.force_accumulator(), Vector3::zeros());
    }

    #[test]
    fn test_torque_produces_angular_acceleration() {
        let mut body = RigidBody::new(1.0).with_inertia_sphere(1.0).unwrap().with_angular_damping(1.0);
        body.apply_torque(Vector3::new(0.0, 0.0, 0.4));
        body.integrate(1.0);
        // I = 0.4, alpha = 1
        assert!(approx_vec_eq(&body.angular_velocity, &Vector3::new(0.0, 0.0, 1.0)));
        assert_eq!(body.torque_accumulator(), Vector3::zeros());
    }

    #[test]
    fn test_orientation_stays_normalized() {
        let mut body = RigidBody::new(1.0)
            .with_angular_velocity(Vector3::new(3.0, -1.0, 2.0))
            .with_angular_damping(1.0)
            .with_can_sleep(false);
        for _ in 0..10_000 {
            body.integrate(1.0 / 60.0);
            assert!((body.orientation.into_inner().norm() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_constant_angular_velocity_rotates() {
        let mut body = RigidBody::new(1.0)
            .with_angular_velocity(Vector3::new(0.0, 0.0, core::f32::consts::FRAC_PI_2))
            .with_angular_damping(1.0)
            .with_can_sleep(false);
        for _ in 0..1000 {
            body.integrate(0.001);
        }
        let x = body.direction_in_world_space(&Vector3::x());
        assert!((x - Vector3::y()).norm() < 1e-2);
    }

    #[test]
    fn test_body_falls_asleep_when_still() {
        let mut body = RigidBody::new(1.0).with_velocity(Vector3::new(0.01, 0.0, 0.0));
        for _ in 0..600 {
            body.integrate(1.0 / 60.0);
        }
        assert!(!body.is_awake());
        assert_eq!(body.velocity, Vector3::zeros());

        let parked = body.position;
        body.velocity = Vector3::new(5.0, 0.0, 0.0);
        body.integrate(1.0 / 60.0);
        assert_eq!(body.position, parked);
    }

    #[test]
    fn test_moving_body_stays_awake_and_motion_is_clamped() {
        let mut body = RigidBody::new(1.0).with_velocity(Vector3::new(10.0, 0.0, 0.0)).with_damping(1.0);
        for _ in 0..600 {
            body.integrate(1.0 / 60.0);
        }
        assert!(body.is_awake());
        assert!(body.motion() <= 10.0 * body.sleep_epsilon() + EPSILON);
    }

    #[test]
    fn test_can_sleep_false_never_sleeps() {
        let mut body = RigidBody::new(1.0).with_can_sleep(false);
        for _ in 0..600 {
            body.integrate(1.0 / 60.0);
        }
        assert!(body.is_awake());
    }

    #[test]
    fn test_wake_resets_motion() {
        let mut body = RigidBody::new(1.0)
            .with_sleep_epsilon(0.3)
            .with_velocity(Vector3::new(1.0, 0.0, 0.0))
            .with_angular_velocity(Vector3::new(0.0, 1.0, 0.0));
        body.set_awake(false);
        assert!(!body.is_awake());
        assert_eq!(body.velocity, Vector3::zeros());
        assert_eq!(body.angular_velocity, Vector3::zeros());

        body.set_awake(true);
        assert!(body.is_awake());
        assert!(approx_eq(body.motion(), 0.6));
    }

    #[test]
    fn test_forbidding_sleep_wakes_body() {
        let mut body = RigidBody::new(1.0);
        body.set_awake(false);
        body.set_can_sleep(false);
        assert!(body.is_awake());
    }

    #[test]
    fn test_impulse_and_energy() {
        let mut body = RigidBody::new(2.0);
        body.apply_impulse(Vector3::new(4.0, 0.0, 0.0));
        assert!(approx_eq(body.speed(), 2.0));
        assert!(approx_eq(body.kinetic_energy(), 4.0));

        let mut wall = RigidBody::new_static();
        wall.apply_impulse(Vector3::new(4.0, 0.0, 0.0));
        assert_eq!(wall.velocity, Vector3::zeros());
    }
}
