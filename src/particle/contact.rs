//! Particle contacts and their iterative resolver.

use log::trace;
use nalgebra::Vector3;

use super::{Particle, ParticleId};

/// Two particles in contact, or one particle against scenery when the
/// second slot is `None`. The normal points from particle 1 toward
/// particle 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleContact {
    pub particles: [Option<ParticleId>; 2],
    pub restitution: f32,
    pub contact_normal: Vector3<f32>,
    pub penetration: f32,
    particle_movement: [Vector3<f32>; 2],
}

impl Default for ParticleContact {
    fn default() -> Self {
        Self {
            particles: [None, None],
            restitution: 0.0,
            contact_normal: Vector3::zeros(),
            penetration: 0.0,
            particle_movement: [Vector3::zeros(); 2],
        }
    }
}

fn get(particles: &[Particle], id: Option<ParticleId>) -> Option<&Particle> {
    id.and_then(|id| particles.get(id.index()))
}

impl ParticleContact {
    pub fn new(
        particles: [Option<ParticleId>; 2],
        contact_normal: Vector3<f32>,
        penetration: f32,
        restitution: f32,
    ) -> Self {
        Self {
            particles,
            restitution,
            contact_normal,
            penetration,
            particle_movement: [Vector3::zeros(); 2],
        }
    }

    /// How far each particle moved in the last interpenetration fix.
    pub fn particle_movement(&self, index: usize) -> Vector3<f32> {
        self.particle_movement[index]
    }

    /// Relative velocity along the normal. Negative while closing.
    pub fn separating_velocity(&self, particles: &[Particle]) -> f32 {
        let mut relative = get(particles, self.particles[0]).map_or(Vector3::zeros(), |p| p.velocity);
        if let Some(p) = get(particles, self.particles[1]) {
            relative -= p.velocity;
        }
        relative.dot(&self.contact_normal)
    }

    fn total_inverse_mass(&self, particles: &[Particle]) -> f32 {
        get(particles, self.particles[0]).map_or(0.0, |p| p.inverse_mass())
            + get(particles, self.particles[1]).map_or(0.0, |p| p.inverse_mass())
    }

    /// Resolve velocity, then interpenetration.
    pub fn resolve(&mut self, particles: &mut [Particle], duration: f32) {
        self.resolve_velocity(particles, duration);
        self.resolve_interpenetration(particles);
    }

    fn resolve_velocity(&self, particles: &mut [Particle], duration: f32) {
        let separating = self.separating_velocity(particles);
        if separating > 0.0 {
            return;
        }

        let mut new_separating = -separating * self.restitution;

        // Velocity built up by acceleration alone this step is not bounced.
        let mut acc_caused = get(particles, self.particles[0]).map_or(Vector3::zeros(), |p| p.acceleration);
        if let Some(p) = get(particles, self.particles[1]) {
            acc_caused -= p.acceleration;
        }
        let acc_caused_separating = acc_caused.dot(&self.contact_normal) * duration;
        if acc_caused_separating < 0.0 {
            new_separating = (new_separating + self.restitution * acc_caused_separating).max(0.0);
        }

        let total_inverse_mass = self.total_inverse_mass(particles);
        if total_inverse_mass <= 0.0 {
            return;
        }
        let impulse = (new_separating - separating) / total_inverse_mass;
        let impulse_per_inverse_mass = self.contact_normal * impulse;

        for (slot, sign) in [(0, 1.0), (1, -1.0)] {
            if let Some(p) = self.particles[slot].and_then(|id| particles.get_mut(id.index())) {
                p.velocity += impulse_per_inverse_mass * (p.inverse_mass() * sign);
            }
        }
    }

    fn resolve_interpenetration(&mut self, particles: &mut [Particle]) {
        self.particle_movement = [Vector3::zeros(); 2];
        if self.penetration <= 0.0 {
            return;
        }
        let total_inverse_mass = self.total_inverse_mass(particles);
        if total_inverse_mass <= 0.0 {
            return;
        }
        let move_per_inverse_mass = self.contact_normal * (self.penetration / total_inverse_mass);

        for (slot, sign) in [(0, 1.0), (1, -1.0)] {
            if let Some(p) = self.particles[slot].and_then(|id| particles.get_mut(id.index())) {
                let movement = move_per_inverse_mass * (p.inverse_mass() * sign);
                p.position += movement;
                self.particle_movement[slot] = movement;
            }
        }
        self.penetration = 0.0;
    }
}

/// Resolves the contact with the lowest separating velocity first, up to an
/// iteration budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticleContactResolver {
    iterations: usize,
    iterations_used: usize,
}

impl ParticleContactResolver {
    pub fn new(iterations: usize) -> Self {
        Self {
            iterations,
            iterations_used: 0,
        }
    }

    pub fn set_iterations(&mut self, iterations: usize) {
        self.iterations = iterations;
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Iterations spent by the last [`resolve_contacts`](Self::resolve_contacts).
    pub fn iterations_used(&self) -> usize {
        self.iterations_used
    }

    pub fn resolve_contacts(&mut self, contacts: &mut [ParticleContact], particles: &mut [Particle], duration: f32) {
        self.iterations_used = 0;
        while self.iterations_used < self.iterations {
            let mut max = f32::MAX;
            let mut max_index = None;
            for (i, contact) in contacts.iter().enumerate() {
                let separating = contact.separating_velocity(particles);
                if separating < max && (separating < 0.0 || contact.penetration > 0.0) {
                    max = separating;
                    max_index = Some(i);
                }
            }
            let Some(index) = max_index else {
                break;
            };

            contacts[index].resolve(particles, duration);

            // Contacts sharing a particle see it moved.
            let resolved = contacts[index];
            for (i, contact) in contacts.iter_mut().enumerate() {
                if i == index {
                    continue;
                }
                for (slot, sign) in [(0, -1.0), (1, 1.0)] {
                    let Some(id) = contact.particles[slot] else {
                        continue;
                    };
                    for moved in 0..2 {
                        if resolved.particles[moved] == Some(id) {
                            contact.penetration += sign * resolved.particle_movement[moved].dot(&contact.contact_normal);
                        }
                    }
                }
            }
            self.iterations_used += 1;
        }
        trace!("particle contacts resolved in {} iterations", self.iterations_used);
    }
}
