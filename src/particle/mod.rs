//! Mass-aggregate path: point masses without orientation.
//!
//! Particles are connected by force generators (springs, bungees, buoyancy)
//! and by hard links (cables and rods) that emit contacts. A
//! [`ParticleWorld`] runs the whole loop.

mod contact;
mod forces;
mod links;
mod world;

pub use contact::{ParticleContact, ParticleContactResolver};
pub use forces::{
    ParticleAnchoredSpring, ParticleBungee, ParticleBuoyancy, ParticleDrag, ParticleFakeSpring, ParticleForceGenerator,
    ParticleForceRegistry, ParticleGravity, ParticleSpring,
};
pub use links::{
    GroundContacts, ParticleCable, ParticleCableConstraint, ParticleContactGenerator, ParticleRod,
    ParticleRodConstraint,
};
pub use world::ParticleWorld;

use nalgebra::Vector3;

// ComplexField provides powf() for f32 in no_std via libm
#[allow(unused_imports)]
use nalgebra::ComplexField;

/// Index of a particle in a [`ParticleWorld`] or particle slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticleId(pub(crate) usize);

impl ParticleId {
    pub fn from_index(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A point mass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub position: Vector3<f32>,
    pub velocity: Vector3<f32>,

    /// Constant acceleration, typically gravity.
    pub acceleration: Vector3<f32>,

    /// Velocity kept per second, applied as `velocity *= damping^dt`.
    pub damping: f32,

    inverse_mass: f32,
    force_accumulator: Vector3<f32>,
}

impl Particle {
    /// Particle of the given mass at the origin.
    ///
    /// # Panics
    /// Panics if `mass` is not positive and finite.
    pub fn new(mass: f32) -> Self {
        assert!(mass > 0.0 && mass.is_finite(), "mass must be positive and finite");
        Self::with_inverse_mass(1.0 / mass)
    }

    /// Particle that no force or contact can move.
    pub fn new_immovable() -> Self {
        Self::with_inverse_mass(0.0)
    }

    fn with_inverse_mass(inverse_mass: f32) -> Self {
        Self {
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            acceleration: Vector3::zeros(),
            damping: 0.99,
            inverse_mass,
            force_accumulator: Vector3::zeros(),
        }
    }

    pub fn with_position(mut self, position: Vector3<f32>) -> Self {
        self.position = position;
        self
    }

    pub fn with_velocity(mut self, velocity: Vector3<f32>) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_acceleration(mut self, acceleration: Vector3<f32>) -> Self {
        self.acceleration = acceleration;
        self
    }

    pub fn with_damping(mut self, damping: f32) -> Self {
        self.damping = damping;
        self
    }

    /// Mass in kg; infinite for immovable particles.
    pub fn mass(&self) -> f32 {
        if self.inverse_mass == 0.0 {
            f32::INFINITY
        } else {
            1.0 / self.inverse_mass
        }
    }

    #[inline]
    pub fn inverse_mass(&self) -> f32 {
        self.inverse_mass
    }

    #[inline]
    pub fn has_finite_mass(&self) -> bool {
        self.inverse_mass > 0.0
    }

    #[inline]
    pub fn add_force(&mut self, force: Vector3<f32>) {
        self.force_accumulator += force;
    }

    #[inline]
    pub fn force_accumulator(&self) -> Vector3<f32> {
        self.force_accumulator
    }

    #[inline]
    pub fn clear_accumulator(&mut self) {
        self.force_accumulator = Vector3::zeros();
    }

    /// Advance by `duration` seconds. Position moves with the old velocity,
    /// then the velocity picks up this step's acceleration and damping.
    pub fn integrate(&mut self, duration: f32) {
        if self.inverse_mass <= 0.0 {
            return;
        }
        debug_assert!(duration > 0.0);

        self.position += self.velocity * duration;

        let acceleration = self.acceleration + self.force_accumulator * self.inverse_mass;
        self.velocity += acceleration * duration;
        self.velocity *= self.damping.powf(duration);

        self.clear_accumulator();
    }
}
