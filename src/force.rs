//! Force generators for rigid bodies.
//!
//! A generator adds forces and torques to a body's accumulators once per
//! step. It must not touch positions or velocities. Generators are
//! registered against a body in a [`ForceRegistry`], which the world runs
//! before integration.

use alloc::boxed::Box;
use alloc::vec::Vec;

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

// ComplexField provides sqrt() for f32 in no_std via libm
#[allow(unused_imports)]
use nalgebra::ComplexField;

use crate::body::{BodyId, RigidBody};

/// Adds forces to one body per step.
pub trait ForceGenerator {
    /// Accumulate this generator's force on `bodies[body]` for a step of
    /// `duration` seconds. Ids outside `bodies` are ignored.
    fn update_force(&mut self, body: BodyId, bodies: &mut [RigidBody], duration: f32);
}

/// Pairs of body and generator, run in registration order.
#[derive(Default)]
pub struct ForceRegistry {
    registrations: Vec<(BodyId, Box<dyn ForceGenerator>)>,
}

impl ForceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `generator` to act on `body`.
    pub fn add(&mut self, body: BodyId, generator: Box<dyn ForceGenerator>) {
        self.registrations.push((body, generator));
    }

    /// Drop every registration targeting `body`. Returns how many were
    /// removed.
    pub fn remove_body(&mut self, body: BodyId) -> usize {
        let before = self.registrations.len();
        self.registrations.retain(|(id, _)| *id != body);
        before - self.registrations.len()
    }

    pub fn clear(&mut self) {
        self.registrations.clear();
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Run every generator whose body is active, awake and has finite mass.
    pub fn update_forces(&mut self, bodies: &mut [RigidBody], duration: f32) {
        for (id, generator) in self.registrations.iter_mut() {
            let runnable = bodies
                .get(id.index())
                .is_some_and(|b| b.active && b.is_awake() && b.has_finite_mass());
            if runnable {
                generator.update_force(*id, bodies, duration);
            }
        }
    }
}

impl core::fmt::Debug for ForceRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ForceRegistry")
            .field("registrations", &self.registrations.len())
            .finish()
    }
}

/// Constant acceleration scaled by the body's mass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gravity {
    pub gravity: Vector3<f32>,
}

impl Gravity {
    pub fn new(gravity: Vector3<f32>) -> Self {
        Self { gravity }
    }
}

impl ForceGenerator for Gravity {
    fn update_force(&mut self, body: BodyId, bodies: &mut [RigidBody], _duration: f32) {
        let Some(body) = bodies.get_mut(body.index()) else {
            return;
        };
        if !body.has_finite_mass() {
            return;
        }
        let force = self.gravity * body.mass();
        body.apply_force(force);
    }
}

/// Hooke's-law spring between a point on the driven body and a point on
/// another body, both given in body space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spring {
    pub connection_point: Vector3<f32>,
    pub other: BodyId,
    pub other_connection_point: Vector3<f32>,
    pub spring_constant: f32,
    pub rest_length: f32,
}

impl Spring {
    pub fn new(
        connection_point: Vector3<f32>,
        other: BodyId,
        other_connection_point: Vector3<f32>,
        spring_constant: f32,
        rest_length: f32,
    ) -> Self {
        Self {
            connection_point,
            other,
            other_connection_point,
            spring_constant,
            rest_length,
        }
    }
}

impl ForceGenerator for Spring {
    fn update_force(&mut self, body: BodyId, bodies: &mut [RigidBody], _duration: f32) {
        let Some(other) = bodies.get(self.other.index()) else {
            return;
        };
        let other_end = other.point_in_world_space(&self.other_connection_point);
        let Some(body) = bodies.get_mut(body.index()) else {
            return;
        };
        let end = body.point_in_world_space(&self.connection_point);

        let extension = end - other_end;
        let length = extension.norm();
        if length <= f32::EPSILON {
            return;
        }
        // Stretched springs pull the ends together, compressed ones push.
        let magnitude = (length - self.rest_length) * self.spring_constant;
        let force = extension / length * -magnitude;
        body.apply_force_at_point(force, end);
    }
}

/// Aerodynamic surface: force = tensor × air velocity, both in body space,
/// applied at a body-space point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aero {
    pub tensor: Matrix3<f32>,
    pub position: Vector3<f32>,
    /// Wind velocity in world space.
    pub windspeed: Vector3<f32>,
}

impl Aero {
    pub fn new(tensor: Matrix3<f32>, position: Vector3<f32>, windspeed: Vector3<f32>) -> Self {
        Self {
            tensor,
            position,
            windspeed,
        }
    }

    fn apply_with_tensor(&self, tensor: &Matrix3<f32>, body: &mut RigidBody) {
        let air = body.velocity + self.windspeed;
        let body_air = body.direction_in_local_space(&air);
        let body_force = tensor * body_air;
        let force = body.direction_in_world_space(&body_force);
        body.apply_force_at_body_point(force, self.position);
    }
}

impl ForceGenerator for Aero {
    fn update_force(&mut self, body: BodyId, bodies: &mut [RigidBody], _duration: f32) {
        if let Some(body) = bodies.get_mut(body.index()) {
            let tensor = self.tensor;
            self.apply_with_tensor(&tensor, body);
        }
    }
}

/// Control surface whose tensor moves between `min_tensor` (setting -1),
/// the base tensor (0) and `max_tensor` (+1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AeroControl {
    pub aero: Aero,
    pub min_tensor: Matrix3<f32>,
    pub max_tensor: Matrix3<f32>,
    control_setting: f32,
}

impl AeroControl {
    pub fn new(
        base: Matrix3<f32>,
        min_tensor: Matrix3<f32>,
        max_tensor: Matrix3<f32>,
        position: Vector3<f32>,
        windspeed: Vector3<f32>,
    ) -> Self {
        Self {
            aero: Aero::new(base, position, windspeed),
            min_tensor,
            max_tensor,
            control_setting: 0.0,
        }
    }

    /// Set the control position, clamped to `[-1, 1]`.
    pub fn set_control(&mut self, value: f32) {
        self.control_setting = value.clamp(-1.0, 1.0);
    }

    pub fn control(&self) -> f32 {
        self.control_setting
    }

    /// Tensor for the current control setting.
    pub fn tensor(&self) -> Matrix3<f32> {
        let s = self.control_setting;
        if s <= -1.0 {
            self.min_tensor
        } else if s >= 1.0 {
            self.max_tensor
        } else if s < 0.0 {
            lerp(&self.min_tensor, &self.aero.tensor, s + 1.0)
        } else if s > 0.0 {
            lerp(&self.aero.tensor, &self.max_tensor, s)
        } else {
            self.aero.tensor
        }
    }
}

fn lerp(a: &Matrix3<f32>, b: &Matrix3<f32>, t: f32) -> Matrix3<f32> {
    a * (1.0 - t) + b * t
}

impl ForceGenerator for AeroControl {
    fn update_force(&mut self, body: BodyId, bodies: &mut [RigidBody], _duration: f32) {
        if let Some(body) = bodies.get_mut(body.index()) {
            let tensor = self.tensor();
            self.aero.apply_with_tensor(&tensor, body);
        }
    }
}

/// Aerodynamic surface mounted at an orientation relative to the body. The
/// tensor is given in the surface's own frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngledAero {
    pub aero: Aero,
    pub orientation: UnitQuaternion<f32>,
}

impl AngledAero {
    pub fn new(tensor: Matrix3<f32>, position: Vector3<f32>, windspeed: Vector3<f32>) -> Self {
        Self {
            aero: Aero::new(tensor, position, windspeed),
            orientation: UnitQuaternion::identity(),
        }
    }

    pub fn set_orientation(&mut self, orientation: UnitQuaternion<f32>) {
        self.orientation = orientation;
    }

    /// Surface tensor expressed in body space.
    pub fn body_tensor(&self) -> Matrix3<f32> {
        let r = self.orientation.to_rotation_matrix();
        r.matrix() * self.aero.tensor * r.matrix().transpose()
    }
}

impl ForceGenerator for AngledAero {
    fn update_force(&mut self, body: BodyId, bodies: &mut [RigidBody], _duration: f32) {
        if let Some(body) = bodies.get_mut(body.index()) {
            let tensor = self.body_tensor();
            self.aero.apply_with_tensor(&tensor, body);
        }
    }
}

/// Upward force from a liquid with its surface at `water_height` (world Y),
/// acting at a body-space center of buoyancy. Fully submerged when the
/// center is `max_depth` below the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Buoyancy {
    pub center_of_buoyancy: Vector3<f32>,
    pub max_depth: f32,
    pub volume: f32,
    pub water_height: f32,
    pub liquid_density: f32,
}

impl Buoyancy {
    /// Water density in kg/m³.
    pub const WATER_DENSITY: f32 = 1000.0;

    pub fn new(center_of_buoyancy: Vector3<f32>, max_depth: f32, volume: f32, water_height: f32) -> Self {
        Self {
            center_of_buoyancy,
            max_depth,
            volume,
            water_height,
            liquid_density: Self::WATER_DENSITY,
        }
    }

    pub fn with_liquid_density(mut self, density: f32) -> Self {
        self.liquid_density = density;
        self
    }

    /// Fraction of the volume under the surface for a center at height `y`.
    fn submerged(&self, y: f32) -> f32 {
        if self.max_depth <= 0.0 {
            return if y < self.water_height { 1.0 } else { 0.0 };
        }
        ((self.water_height + self.max_depth - y) / (2.0 * self.max_depth)).clamp(0.0, 1.0)
    }
}

impl ForceGenerator for Buoyancy {
    fn update_force(&mut self, body: BodyId, bodies: &mut [RigidBody], _duration: f32) {
        let Some(body) = bodies.get_mut(body.index()) else {
            return;
        };
        let center = body.point_in_world_space(&self.center_of_buoyancy);
        let fraction = self.submerged(center.y);
        if fraction <= 0.0 {
            return;
        }
        let lift = self.liquid_density * self.volume * fraction;
        body.apply_force_at_point(Vector3::new(0.0, lift, 0.0), center);
    }
}
