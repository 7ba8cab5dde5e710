//! Two-phase iterative contact resolver.
//!
//! Resolution runs in a fixed order:
//! 1. wake sleeping bodies touched by awake ones and prepare every contact;
//! 2. the position pass repeatedly removes the deepest penetration;
//! 3. the velocity pass repeatedly removes the fastest closing velocity.
//!
//! After each correction, contacts sharing a body with the corrected one
//! have their penetration or velocity updated, so the next pick sees the
//! effect of earlier ones. Both passes stop early once nothing exceeds the
//! configured epsilon.

use log::trace;

use crate::body::RigidBody;
use crate::config::ResolverConfig;
use crate::contact::{BodyChange, Contact};

/// Sequential contact resolver.
#[derive(Debug, Clone, Default)]
pub struct ContactResolver {
    config: ResolverConfig,
    position_iterations_used: usize,
    velocity_iterations_used: usize,
}

impl ContactResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            position_iterations_used: 0,
            velocity_iterations_used: 0,
        }
    }

    #[inline]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ResolverConfig) {
        self.config = config;
    }

    /// Position iterations spent by the last [`resolve`](Self::resolve).
    #[inline]
    pub fn position_iterations_used(&self) -> usize {
        self.position_iterations_used
    }

    /// Velocity iterations spent by the last [`resolve`](Self::resolve).
    #[inline]
    pub fn velocity_iterations_used(&self) -> usize {
        self.velocity_iterations_used
    }

    /// Resolve `contacts` against `bodies` for a step of `duration` seconds.
    ///
    /// Body ids in the contacts index into `bodies`.
    pub fn resolve(&mut self, contacts: &mut [Contact], bodies: &mut [RigidBody], duration: f32) {
        self.position_iterations_used = 0;
        self.velocity_iterations_used = 0;
        if contacts.is_empty() {
            return;
        }

        self.prepare_contacts(contacts, bodies, duration);
        self.adjust_positions(contacts, bodies);
        self.adjust_velocities(contacts, bodies, duration);

        trace!(
            "resolved {} contacts: {} position / {} velocity iterations",
            contacts.len(),
            self.position_iterations_used,
            self.velocity_iterations_used
        );
    }

    fn prepare_contacts(&self, contacts: &mut [Contact], bodies: &mut [RigidBody], duration: f32) {
        for contact in contacts.iter() {
            contact.match_awake_state(bodies);
        }
        for contact in contacts.iter_mut() {
            contact.calculate_internals(bodies, duration, self.config.velocity_limit);
        }
    }

    fn adjust_positions(&mut self, contacts: &mut [Contact], bodies: &mut [RigidBody]) {
        let budget = self.config.position_iterations.budget(contacts.len());

        while self.position_iterations_used < budget {
            let mut deepest = self.config.position_epsilon;
            let mut index = None;
            for (i, contact) in contacts.iter().enumerate() {
                if contact.penetration > deepest && contact.has_movable_body(bodies) {
                    deepest = contact.penetration;
                    index = Some(i);
                }
            }
            let Some(index) = index else {
                break;
            };

            let resolved = contacts[index];
            let change = resolved.apply_position_change(bodies, self.config.angular_limit);

            for contact in contacts.iter_mut() {
                for_each_shared_body(contact, &resolved, |contact, b, d| {
                    let delta = change.linear[d] + change.angular[d].cross(&contact.relative_contact_position(b));
                    let sign = if b == 1 { 1.0 } else { -1.0 };
                    contact.penetration += delta.dot(&contact.normal) * sign;
                });
            }
            self.position_iterations_used += 1;
        }
    }

    fn adjust_velocities(&mut self, contacts: &mut [Contact], bodies: &mut [RigidBody], duration: f32) {
        let budget = self.config.velocity_iterations.budget(contacts.len());
        let velocity_limit = self.config.velocity_limit;

        while self.velocity_iterations_used < budget {
            let mut fastest = -self.config.velocity_epsilon;
            let mut index = None;
            for (i, contact) in contacts.iter().enumerate() {
                let closing = contact.contact_velocity().x;
                if closing < fastest && contact.has_movable_body(bodies) {
                    fastest = closing;
                    index = Some(i);
                }
            }
            let Some(index) = index else {
                break;
            };

            let resolved = contacts[index];
            let change: BodyChange = resolved.apply_velocity_change(bodies);

            for contact in contacts.iter_mut() {
                let mut touched = false;
                for_each_shared_body(contact, &resolved, |contact, b, d| {
                    let delta = change.linear[d] + change.angular[d].cross(&contact.relative_contact_position(b));
                    contact.add_world_velocity(b, &delta);
                    touched = true;
                });
                if touched {
                    contact.calculate_desired_delta_velocity(bodies, duration, velocity_limit);
                }
            }
            self.velocity_iterations_used += 1;
        }
    }
}

/// Call `f(contact, b, d)` for every body slot `b` of `contact` that holds
/// the same body as slot `d` of `resolved`.
fn for_each_shared_body(contact: &mut Contact, resolved: &Contact, mut f: impl FnMut(&mut Contact, usize, usize)) {
    for b in 0..2 {
        let Some(id) = contact.bodies[b] else {
            continue;
        };
        for d in 0..2 {
            if resolved.bodies[d] == Some(id) {
                f(contact, b, d);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use crate::body::BodyId;
    use crate::config::Iterations;
    use nalgebra::Vector3;
    use std::vec::Vec;

    const EPSILON: f32 = 1e-4;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    fn id(i: usize) -> Option<BodyId> {
        Some(BodyId::from_index(i))
    }

    fn ball(x: f32, vx: f32) -> RigidBody {
        RigidBody::new(1.0)
            .with_position(Vector3::new(x, 0.0, 0.0))
            .with_velocity(Vector3::new(vx, 0.0, 0.0))
    }

    /// Contact between unit spheres at bodies `a` (left) and `b` (right).
    fn sphere_contact(bodies: &[RigidBody], a: usize, b: usize, restitution: f32) -> Contact {
        let pa = bodies[a].position;
        let pb = bodies[b].position;
        let d = (pb - pa).norm();
        Contact::new(
            [id(a), id(b)],
            (pa + pb) * 0.5,
            (pa - pb) / d,
            2.0 - d,
            restitution,
            0.0,
        )
    }

    #[test]
    fn test_empty_contacts_is_noop() {
        let mut resolver = ContactResolver::default();
        let mut bodies: Vec<RigidBody> = std::vec![ball(0.0, 1.0)];
        resolver.resolve(&mut [], &mut bodies, 0.01);
        assert_eq!(resolver.position_iterations_used(), 0);
        assert!(approx_eq(bodies[0].velocity.x, 1.0));
    }

    #[test]
    fn test_elastic_head_on_exchanges_velocities() {
        let mut bodies = std::vec![ball(-0.95, 2.0), ball(0.95, -1.0)];
        let mut contacts = [sphere_contact(&bodies, 0, 1, 1.0)];
        let mut resolver = ContactResolver::default();
        resolver.resolve(&mut contacts, &mut bodies, 0.0);
        assert!(approx_eq(bodies[0].velocity.x, -1.0));
        assert!(approx_eq(bodies[1].velocity.x, 2.0));
        assert_eq!(resolver.velocity_iterations_used(), 1);
    }

    #[test]
    fn test_inelastic_head_on_common_velocity() {
        let mut bodies = std::vec![ball(-0.95, 3.0), ball(0.95, -1.0)];
        let mut contacts = [sphere_contact(&bodies, 0, 1, 0.0)];
        ContactResolver::default().resolve(&mut contacts, &mut bodies, 0.0);
        assert!(approx_eq(bodies[0].velocity.x, 1.0));
        assert!(approx_eq(bodies[1].velocity.x, 1.0));
    }

    #[test]
    fn test_position_pass_separates_overlapping_pair() {
        let mut bodies = std::vec![ball(-0.8, 0.0), ball(0.8, 0.0)];
        let mut contacts = [sphere_contact(&bodies, 0, 1, 0.0)];
        let mut resolver = ContactResolver::default();
        resolver.resolve(&mut contacts, &mut bodies, 0.0);
        assert!(approx_eq(bodies[0].position.x, -1.0));
        assert!(approx_eq(bodies[1].position.x, 1.0));
        assert!(contacts[0].penetration.abs() < EPSILON);
        assert_eq!(resolver.position_iterations_used(), 1);
    }

    #[test]
    fn test_penetration_propagates_along_chain() {
        // Three spheres in a row, each pair overlapping by 0.1.
        let mut bodies = std::vec![ball(0.0, 0.0), ball(1.9, 0.0), ball(3.8, 0.0)];
        let mut contacts = [sphere_contact(&bodies, 0, 1, 0.0), sphere_contact(&bodies, 1, 2, 0.0)];
        let config = ResolverConfig {
            position_iterations: Iterations::Fixed(64),
            ..Default::default()
        };
        let mut resolver = ContactResolver::new(config);
        resolver.resolve(&mut contacts, &mut bodies, 0.0);

        for contact in contacts.iter() {
            assert!(contact.penetration <= config.position_epsilon);
        }
        // The tracked penetration matches the real geometry.
        let gap_ab = bodies[1].position.x - bodies[0].position.x;
        let gap_bc = bodies[2].position.x - bodies[1].position.x;
        assert!(approx_eq(2.0 - gap_ab, contacts[0].penetration));
        assert!(approx_eq(2.0 - gap_bc, contacts[1].penetration));
        assert!(resolver.position_iterations_used() < 64);
    }

    #[test]
    fn test_budget_caps_iterations() {
        let mut bodies = std::vec![ball(0.0, 0.0), ball(1.5, 0.0), ball(3.0, 0.0)];
        let mut contacts = [sphere_contact(&bodies, 0, 1, 0.0), sphere_contact(&bodies, 1, 2, 0.0)];
        let mut resolver = ContactResolver::new(ResolverConfig {
            position_iterations: Iterations::Fixed(1),
            velocity_iterations: Iterations::Fixed(1),
            ..Default::default()
        });
        resolver.resolve(&mut contacts, &mut bodies, 0.0);
        assert_eq!(resolver.position_iterations_used(), 1);
        assert!(contacts.iter().any(|c| c.penetration > 0.01));
    }

    #[test]
    fn test_contact_wakes_sleeping_body() {
        let mut bodies = std::vec![ball(-0.95, 1.0), ball(0.95, 0.0)];
        bodies[1].set_awake(false);
        let mut contacts = [sphere_contact(&bodies, 0, 1, 0.0)];
        ContactResolver::default().resolve(&mut contacts, &mut bodies, 0.0);
        assert!(bodies[1].is_awake());
        assert!(bodies[1].velocity.x > 0.0);
    }

    #[test]
    fn test_scenery_contact_on_sleeping_body_is_skipped() {
        let mut bodies = std::vec![RigidBody::new(1.0)];
        bodies[0].set_awake(false);
        let mut contacts = [Contact::new([id(0), None], Vector3::zeros(), Vector3::y(), 0.5, 0.0, 0.0)];
        let mut resolver = ContactResolver::default();
        resolver.resolve(&mut contacts, &mut bodies, 0.0);
        assert_eq!(resolver.position_iterations_used(), 0);
        assert!(!bodies[0].is_awake());
        assert_eq!(bodies[0].position, Vector3::zeros());
    }

    #[test]
    fn test_velocity_pass_updates_neighbours() {
        // A ball pressed between a wall and another ball.
        let mut bodies = std::vec![RigidBody::new_static(), ball(2.0, -1.0), ball(4.0, -1.0)];
        let mut contacts = [
            Contact::new([id(1), id(0)], Vector3::new(1.0, 0.0, 0.0), Vector3::x(), 0.0, 0.0, 0.0),
            Contact::new([id(2), id(1)], Vector3::new(3.0, 0.0, 0.0), Vector3::x(), 0.0, 0.0, 0.0),
        ];
        let mut resolver = ContactResolver::new(ResolverConfig {
            velocity_iterations: Iterations::Fixed(32),
            ..Default::default()
        });
        resolver.resolve(&mut contacts, &mut bodies, 0.0);
        assert!(bodies[1].velocity.x > -0.01);
        assert!(bodies[2].velocity.x > -0.01);
        for contact in contacts.iter() {
            assert!(contact.contact_velocity().x >= -0.01 - EPSILON);
        }
    }
}
