//! Force generators for particles.

use alloc::boxed::Box;
use alloc::vec::Vec;

use nalgebra::Vector3;

// ComplexField provides sqrt(), sin(), cos() and exp() for f32 in no_std via libm
#[allow(unused_imports)]
use nalgebra::ComplexField;

use super::{Particle, ParticleId};

/// Adds a force to one particle per step.
pub trait ParticleForceGenerator {
    /// Accumulate this generator's force on `particles[particle]`. Ids
    /// outside `particles` are ignored.
    fn update_force(&mut self, particle: ParticleId, particles: &mut [Particle], duration: f32);
}

#[derive(Default)]
pub struct ParticleForceRegistry {
    registrations: Vec<(ParticleId, Box<dyn ParticleForceGenerator>)>,
}

impl ParticleForceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, particle: ParticleId, generator: Box<dyn ParticleForceGenerator>) {
        self.registrations.push((particle, generator));
    }

    /// Drop every registration targeting `particle`.
    pub fn remove(&mut self, particle: ParticleId) -> usize {
        let before = self.registrations.len();
        self.registrations.retain(|(id, _)| *id != particle);
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

    pub fn update_forces(&mut self, particles: &mut [Particle], duration: f32) {
        for (id, generator) in self.registrations.iter_mut() {
            generator.update_force(*id, particles, duration);
        }
    }
}

impl core::fmt::Debug for ParticleForceRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ParticleForceRegistry")
            .field("registrations", &self.registrations.len())
            .finish()
    }
}

/// Gravity scaled by mass; immovable particles are skipped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleGravity {
    pub gravity: Vector3<f32>,
}

impl ParticleGravity {
    pub fn new(gravity: Vector3<f32>) -> Self {
        Self { gravity }
    }
}

impl ParticleForceGenerator for ParticleGravity {
    fn update_force(&mut self, particle: ParticleId, particles: &mut [Particle], _duration: f32) {
        if let Some(p) = particles.get_mut(particle.index()) {
            if p.has_finite_mass() {
                let force = self.gravity * p.mass();
                p.add_force(force);
            }
        }
    }
}

/// Drag `-(k1·|v| + k2·|v|²)` along the velocity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleDrag {
    pub k1: f32,
    pub k2: f32,
}

impl ParticleDrag {
    pub fn new(k1: f32, k2: f32) -> Self {
        Self { k1, k2 }
    }
}

impl ParticleForceGenerator for ParticleDrag {
    fn update_force(&mut self, particle: ParticleId, particles: &mut [Particle], _duration: f32) {
        let Some(p) = particles.get_mut(particle.index()) else {
            return;
        };
        let speed = p.velocity.norm();
        if speed <= f32::EPSILON {
            return;
        }
        let drag = self.k1 * speed + self.k2 * speed * speed;
        let force = p.velocity / speed * -drag;
        p.add_force(force);
    }
}

/// Hooke's-law force toward `target` (pull when stretched, push when
/// compressed). With `pull_only` the force vanishes below the rest length.
fn spring_force(position: &Vector3<f32>, target: &Vector3<f32>, k: f32, rest_length: f32, pull_only: bool) -> Option<Vector3<f32>> {
    let d = position - target;
    let length = d.norm();
    if length <= f32::EPSILON || (pull_only && length <= rest_length) {
        return None;
    }
    let magnitude = (length - rest_length) * k;
    Some(d / length * -magnitude)
}

/// Spring between two particles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleSpring {
    pub other: ParticleId,
    pub spring_constant: f32,
    pub rest_length: f32,
}

impl ParticleSpring {
    pub fn new(other: ParticleId, spring_constant: f32, rest_length: f32) -> Self {
        Self {
            other,
            spring_constant,
            rest_length,
        }
    }
}

impl ParticleForceGenerator for ParticleSpring {
    fn update_force(&mut self, particle: ParticleId, particles: &mut [Particle], _duration: f32) {
        let Some(other) = particles.get(self.other.index()).map(|o| o.position) else {
            return;
        };
        if let Some(p) = particles.get_mut(particle.index()) {
            if let Some(force) = spring_force(&p.position, &other, self.spring_constant, self.rest_length, false) {
                p.add_force(force);
            }
        }
    }
}

/// Spring between a particle and a fixed point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleAnchoredSpring {
    pub anchor: Vector3<f32>,
    pub spring_constant: f32,
    pub rest_length: f32,
}

impl ParticleAnchoredSpring {
    pub fn new(anchor: Vector3<f32>, spring_constant: f32, rest_length: f32) -> Self {
        Self {
            anchor,
            spring_constant,
            rest_length,
        }
    }
}

impl ParticleForceGenerator for ParticleAnchoredSpring {
    fn update_force(&mut self, particle: ParticleId, particles: &mut [Particle], _duration: f32) {
        if let Some(p) = particles.get_mut(particle.index()) {
            if let Some(force) = spring_force(&p.position, &self.anchor, self.spring_constant, self.rest_length, false) {
                p.add_force(force);
            }
        }
    }
}

/// Elastic cord between two particles: pulls only when stretched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleBungee {
    pub other: ParticleId,
    pub spring_constant: f32,
    pub rest_length: f32,
}

impl ParticleBungee {
    pub fn new(other: ParticleId, spring_constant: f32, rest_length: f32) -> Self {
        Self {
            other,
            spring_constant,
            rest_length,
        }
    }
}

impl ParticleForceGenerator for ParticleBungee {
    fn update_force(&mut self, particle: ParticleId, particles: &mut [Particle], _duration: f32) {
        let Some(other) = particles.get(self.other.index()).map(|o| o.position) else {
            return;
        };
        if let Some(p) = particles.get_mut(particle.index()) {
            if let Some(force) = spring_force(&p.position, &other, self.spring_constant, self.rest_length, true) {
                p.add_force(force);
            }
        }
    }
}

/// Buoyancy on a particle treated as a small volume. Fully submerged when
/// `max_depth` below `water_height`, dry when `max_depth` above it, linear
/// in between.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleBuoyancy {
    pub max_depth: f32,
    pub volume: f32,
    pub water_height: f32,
    pub liquid_density: f32,
}

impl ParticleBuoyancy {
    pub fn new(max_depth: f32, volume: f32, water_height: f32) -> Self {
        Self {
            max_depth,
            volume,
            water_height,
            liquid_density: 1000.0,
        }
    }

    pub fn with_liquid_density(mut self, density: f32) -> Self {
        self.liquid_density = density;
        self
    }
}

impl ParticleForceGenerator for ParticleBuoyancy {
    fn update_force(&mut self, particle: ParticleId, particles: &mut [Particle], _duration: f32) {
        let Some(p) = particles.get_mut(particle.index()) else {
            return;
        };
        let depth = p.position.y;
        if depth >= self.water_height + self.max_depth {
            return;
        }
        let full = self.liquid_density * self.volume;
        let lift = if depth <= self.water_height - self.max_depth {
            full
        } else {
            full * (self.water_height + self.max_depth - depth) / (2.0 * self.max_depth)
        };
        p.add_force(Vector3::new(0.0, lift, 0.0));
    }
}

/// Stiff anchored spring solved analytically as damped harmonic motion over
/// the step, so large constants stay stable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleFakeSpring {
    pub anchor: Vector3<f32>,
    pub spring_constant: f32,
    pub damping: f32,
}

impl ParticleFakeSpring {
    pub fn new(anchor: Vector3<f32>, spring_constant: f32, damping: f32) -> Self {
        Self {
            anchor,
            spring_constant,
            damping,
        }
    }
}

impl ParticleForceGenerator for ParticleFakeSpring {
    fn update_force(&mut self, particle: ParticleId, particles: &mut [Particle], duration: f32) {
        let Some(p) = particles.get_mut(particle.index()) else {
            return;
        };
        if !p.has_finite_mass() || duration <= 0.0 {
            return;
        }
        // Overdamped or critically damped: no oscillation to follow.
        let discriminant = 4.0 * self.spring_constant - self.damping * self.damping;
        if discriminant <= 0.0 {
            return;
        }
        let gamma = 0.5 * discriminant.sqrt();

        let position = p.position - self.anchor;
        let c = position * (self.damping / (2.0 * gamma)) + p.velocity * (1.0 / gamma);
        let mut target = position * (gamma * duration).cos() + c * (gamma * duration).sin();
        target *= (-0.5 * duration * self.damping).exp();

        let acceleration = (target - position) * (1.0 / (duration * duration)) - p.velocity * (1.0 / duration);
        let force = acceleration * p.mass();
        p.add_force(force);
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

    fn id(i: usize) -> ParticleId {
        ParticleId::from_index(i)
    }

    #[test]
    fn test_gravity_and_drag() {
        let mut ps = [Particle::new(2.0).with_velocity(Vector3::new(2.0, 0.0, 0.0)), Particle::new_immovable()];
        ParticleGravity::new(Vector3::new(0.0, -10.0, 0.0)).update_force(id(0), &mut ps, 0.1);
        ParticleGravity::new(Vector3::new(0.0, -10.0, 0.0)).update_force(id(1), &mut ps, 0.1);
        ParticleDrag::new(0.5, 0.25).update_force(id(0), &mut ps, 0.1);
        // Drag: 0.5 * 2 + 0.25 * 4 = 2 against +X.
        assert!(approx_vec_eq(&ps[0].force_accumulator(), &Vector3::new(-2.0, -20.0, 0.0)));
        assert_eq!(ps[1].force_accumulator(), Vector3::zeros());
    }

    #[test]
    fn test_spring_between_particles() {
        let mut ps = [Particle::new(1.0).with_position(Vector3::new(0.0, 3.0, 0.0)), Particle::new(1.0)];
        ParticleSpring::new(id(1), 2.0, 1.0).update_force(id(0), &mut ps, 0.1);
        assert!(approx_vec_eq(&ps[0].force_accumulator(), &Vector3::new(0.0, -4.0, 0.0)));
    }

    #[test]
    fn test_anchored_spring_pushes_when_compressed() {
        let mut ps = [Particle::new(1.0).with_position(Vector3::new(0.5, 0.0, 0.0))];
        ParticleAnchoredSpring::new(Vector3::zeros(), 4.0, 1.0).update_force(id(0), &mut ps, 0.1);
        assert!(approx_vec_eq(&ps[0].force_accumulator(), &Vector3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn test_bungee_only_pulls() {
        let mut ps = [Particle::new(1.0).with_position(Vector3::new(0.5, 0.0, 0.0)), Particle::new(1.0)];
        let mut bungee = ParticleBungee::new(id(1), 4.0, 1.0);
        bungee.update_force(id(0), &mut ps, 0.1);
        assert_eq!(ps[0].force_accumulator(), Vector3::zeros());

        ps[0].position = Vector3::new(3.0, 0.0, 0.0);
        bungee.update_force(id(0), &mut ps, 0.1);
        assert!(approx_vec_eq(&ps[0].force_accumulator(), &Vector3::new(-8.0, 0.0, 0.0)));
    }

    #[test]
    fn test_buoyancy_submersion() {
        let mut b = ParticleBuoyancy::new(0.5, 0.01, 0.0);
        let mut ps = [Particle::new(1.0).with_position(Vector3::new(0.0, 1.0, 0.0))];
        b.update_force(id(0), &mut ps, 0.1);
        assert_eq!(ps[0].force_accumulator(), Vector3::zeros());

        ps[0].position.y = 0.25;
        b.update_force(id(0), &mut ps, 0.1);
        assert!(approx_eq(ps[0].force_accumulator().y, 2.5));

        ps[0].clear_accumulator();
        ps[0].position.y = -1.0;
        b.update_force(id(0), &mut ps, 0.1);
        assert!(approx_eq(ps[0].force_accumulator().y, 10.0));
    }

    #[test]
    fn test_fake_spring_pulls_toward_anchor() {
        let mut ps = [Particle::new(1.0).with_position(Vector3::new(1.0, 0.0, 0.0))];
        ParticleFakeSpring::new(Vector3::zeros(), 100.0, 1.0).update_force(id(0), &mut ps, 0.01);
        assert!(ps[0].force_accumulator().x < 0.0);

        // Overdamped: no force.
        let mut still = [Particle::new(1.0).with_position(Vector3::new(1.0, 0.0, 0.0))];
        ParticleFakeSpring::new(Vector3::zeros(), 1.0, 10.0).update_force(id(0), &mut still, 0.01);
        assert_eq!(still[0].force_accumulator(), Vector3::zeros());
    }

    #[test]
    fn test_fake_spring_skips_immovable() {
        let mut ps = [Particle::new_immovable().with_position(Vector3::new(1.0, 0.0, 0.0))];
        ParticleFakeSpring::new(Vector3::zeros(), 100.0, 1.0).update_force(id(0), &mut ps, 0.01);
        assert_eq!(ps[0].force_accumulator(), Vector3::zeros());
    }

    #[test]
    fn test_registry_runs_in_order() {
        let mut ps = [Particle::new(1.0), Particle::new(1.0)];
        let mut registry = ParticleForceRegistry::new();
        registry.add(id(0), Box::new(ParticleGravity::new(Vector3::new(0.0, -1.0, 0.0))));
        registry.add(id(1), Box::new(ParticleGravity::new(Vector3::new(0.0, -2.0, 0.0))));
        registry.add(id(5), Box::new(ParticleGravity::new(Vector3::new(0.0, -2.0, 0.0))));
        registry.update_forces(&mut ps, 0.1);
        assert!(approx_eq(ps[0].force_accumulator().y, -1.0));
        assert!(approx_eq(ps[1].force_accumulator().y, -2.0));
        assert_eq!(registry.remove(id(1)), 1);
        assert_eq!(registry.len(), 2);
    }
}
