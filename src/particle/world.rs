use alloc::boxed::Box;
use alloc::vec::Vec;

use log::{debug, warn};

use super::{
    Particle, ParticleContact, ParticleContactGenerator, ParticleContactResolver, ParticleForceGenerator,
    ParticleForceRegistry, ParticleId,
};
use crate::config::Iterations;
use crate::error::{PhysicsError, PhysicsResult};

/// Up to `N` particles and `C` contacts per step.
///
/// # Example
/// ```
/// use embedded_physics::particle::{GroundContacts, Particle, ParticleGravity, ParticleWorld};
/// use nalgebra::Vector3;
///
/// let mut world = ParticleWorld::<8, 16>::default();
/// let ball = world.add_particle(Particle::new(1.0).with_position(Vector3::new(0.0, 2.0, 0.0))).unwrap();
/// world.add_force_generator(ball, Box::new(ParticleGravity::new(Vector3::new(0.0, -9.81, 0.0)))).unwrap();
/// world.add_contact_generator(Box::new(GroundContacts::default()));
///
/// for _ in 0..120 {
///     world.start_frame();
///     world.run_physics(1.0 / 60.0);
/// }
/// assert!(world.particle(ball).unwrap().position.y > -0.1);
/// ```
pub struct ParticleWorld<const N: usize, const C: usize> {
    particles: heapless::Vec<Particle, N>,
    registry: ParticleForceRegistry,
    generators: Vec<Box<dyn ParticleContactGenerator>>,
    contacts: [ParticleContact; C],
    contact_count: usize,
    resolver: ParticleContactResolver,
    iterations: Iterations,
}

impl<const N: usize, const C: usize> Default for ParticleWorld<N, C> {
    fn default() -> Self {
        Self::new(Iterations::Auto)
    }
}

impl<const N: usize, const C: usize> ParticleWorld<N, C> {
    pub fn new(iterations: Iterations) -> Self {
        Self {
            particles: heapless::Vec::new(),
            registry: ParticleForceRegistry::new(),
            generators: Vec::new(),
            contacts: [ParticleContact::default(); C],
            contact_count: 0,
            resolver: ParticleContactResolver::new(iterations.budget(C)),
            iterations,
        }
    }

    /// Returns `None` when the world is full.
    pub fn add_particle(&mut self, particle: Particle) -> Option<ParticleId> {
        let id = ParticleId(self.particles.len());
        if self.particles.push(particle).is_err() {
            warn!("particle world full ({} particles)", N);
            return None;
        }
        Some(id)
    }

    pub fn particle(&self, id: ParticleId) -> Option<&Particle> {
        self.particles.get(id.0)
    }

    pub fn particle_mut(&mut self, id: ParticleId) -> Option<&mut Particle> {
        self.particles.get_mut(id.0)
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub fn add_force_generator(&mut self, id: ParticleId, generator: Box<dyn ParticleForceGenerator>) -> PhysicsResult<()> {
        if id.0 >= self.particles.len() {
            return Err(PhysicsError::UnknownParticle(id));
        }
        self.registry.add(id, generator);
        Ok(())
    }

    pub fn add_contact_generator(&mut self, generator: Box<dyn ParticleContactGenerator>) {
        self.generators.push(generator);
    }

    /// Contacts produced by the last [`run_physics`](Self::run_physics).
    pub fn contacts(&self) -> &[ParticleContact] {
        &self.contacts[..self.contact_count]
    }

    pub fn resolver(&self) -> &ParticleContactResolver {
        &self.resolver
    }

    /// Clear every force accumulator.
    pub fn start_frame(&mut self) {
        for p in self.particles.iter_mut() {
            p.clear_accumulator();
        }
    }

    /// Run every contact generator until the buffer is full.
    pub fn generate_contacts(&mut self) -> usize {
        let mut used = 0;
        for generator in self.generators.iter() {
            if used >= C {
                debug!("particle contact buffer full, skipping remaining generators");
                break;
            }
            used += generator.add_contact(&self.particles, &mut self.contacts[used..]);
        }
        self.contact_count = used;
        used
    }

    pub fn integrate(&mut self, duration: f32) {
        for p in self.particles.iter_mut() {
            p.integrate(duration);
        }
    }

    /// Forces, integration, contact generation, then resolution.
    pub fn run_physics(&mut self, duration: f32) {
        self.registry.update_forces(&mut self.particles, duration);
        self.integrate(duration);

        let used = self.generate_contacts();
        if used > 0 {
            self.resolver.set_iterations(self.iterations.budget(used));
            self.resolver
                .resolve_contacts(&mut self.contacts[..used], &mut self.particles, duration);
        }
    }
}

impl<const N: usize, const C: usize> core::fmt::Debug for ParticleWorld<N, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ParticleWorld")
            .field("particles", &self.particles.len())
            .field("registry", &self.registry)
            .field("generators", &self.generators.len())
            .field("contacts", &self.contact_count)
            .finish()
    }
}
