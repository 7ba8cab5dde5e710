//! Contact generators: hard links between particles and the ground.

use nalgebra::Vector3;

use super::{Particle, ParticleContact, ParticleId};

/// Writes contacts into the front of `contacts` and returns how many it
/// wrote. The slice length is the remaining capacity.
pub trait ParticleContactGenerator {
    fn add_contact(&self, particles: &[Particle], contacts: &mut [ParticleContact]) -> usize;
}

fn position(particles: &[Particle], id: ParticleId) -> Option<Vector3<f32>> {
    particles.get(id.index()).map(|p| p.position)
}

/// Normal and length of the link from `from` to `to`.
fn link(from: &Vector3<f32>, to: &Vector3<f32>) -> Option<(Vector3<f32>, f32)> {
    let d = to - from;
    let length = d.norm();
    if length <= f32::EPSILON {
        None
    } else {
        Some((d / length, length))
    }
}

/// Cable between two particles: slack below `max_length`, pulls them back
/// with `restitution` when overextended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleCable {
    pub particles: [ParticleId; 2],
    pub max_length: f32,
    pub restitution: f32,
}

impl ParticleContactGenerator for ParticleCable {
    fn add_contact(&self, particles: &[Particle], contacts: &mut [ParticleContact]) -> usize {
        let (Some(a), Some(b), Some(slot)) = (
            position(particles, self.particles[0]),
            position(particles, self.particles[1]),
            contacts.first_mut(),
        ) else {
            return 0;
        };
        let Some((normal, length)) = link(&a, &b) else {
            return 0;
        };
        if length < self.max_length {
            return 0;
        }
        *slot = ParticleContact::new(
            [Some(self.particles[0]), Some(self.particles[1])],
            normal,
            length - self.max_length,
            self.restitution,
        );
        1
    }
}

/// Rigid rod between two particles: holds them at exactly `length`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleRod {
    pub particles: [ParticleId; 2],
    pub length: f32,
}

impl ParticleContactGenerator for ParticleRod {
    fn add_contact(&self, particles: &[Particle], contacts: &mut [ParticleContact]) -> usize {
        let (Some(a), Some(b), Some(slot)) = (
            position(particles, self.particles[0]),
            position(particles, self.particles[1]),
            contacts.first_mut(),
        ) else {
            return 0;
        };
        let Some((normal, length)) = link(&a, &b) else {
            return 0;
        };
        if (length - self.length).abs() <= f32::EPSILON {
            return 0;
        }
        let (normal, penetration) = if length > self.length {
            (normal, length - self.length)
        } else {
            (-normal, self.length - length)
        };
        *slot = ParticleContact::new([Some(self.particles[0]), Some(self.particles[1])], normal, penetration, 0.0);
        1
    }
}

/// Cable from a particle to a fixed anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleCableConstraint {
    pub particle: ParticleId,
    pub anchor: Vector3<f32>,
    pub max_length: f32,
    pub restitution: f32,
}

impl ParticleContactGenerator for ParticleCableConstraint {
    fn add_contact(&self, particles: &[Particle], contacts: &mut [ParticleContact]) -> usize {
        let (Some(p), Some(slot)) = (position(particles, self.particle), contacts.first_mut()) else {
            return 0;
        };
        let Some((normal, length)) = link(&p, &self.anchor) else {
            return 0;
        };
        if length < self.max_length {
            return 0;
        }
        *slot = ParticleContact::new([Some(self.particle), None], normal, length - self.max_length, self.restitution);
        1
    }
}

/// Rod from a particle to a fixed anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleRodConstraint {
    pub particle: ParticleId,
    pub anchor: Vector3<f32>,
    pub length: f32,
}

impl ParticleContactGenerator for ParticleRodConstraint {
    fn add_contact(&self, particles: &[Particle], contacts: &mut [ParticleContact]) -> usize {
        let (Some(p), Some(slot)) = (position(particles, self.particle), contacts.first_mut()) else {
            return 0;
        };
        let Some((normal, length)) = link(&p, &self.anchor) else {
            return 0;
        };
        if (length - self.length).abs() <= f32::EPSILON {
            return 0;
        }
        let (normal, penetration) = if length > self.length {
            (normal, length - self.length)
        } else {
            (-normal, self.length - length)
        };
        *slot = ParticleContact::new([Some(self.particle), None], normal, penetration, 0.0);
        1
    }
}

/// Keeps every particle above the plane `y = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundContacts {
    pub restitution: f32,
}

impl Default for GroundContacts {
    fn default() -> Self {
        Self { restitution: 0.2 }
    }
}

impl ParticleContactGenerator for GroundContacts {
    fn add_contact(&self, particles: &[Particle], contacts: &mut [ParticleContact]) -> usize {
        let mut written = 0;
        for (i, p) in particles.iter().enumerate() {
            if written == contacts.len() {
                break;
            }
            if p.position.y < 0.0 {
                contacts[written] = ParticleContact::new(
                    [Some(ParticleId::from_index(i)), None],
                    Vector3::y(),
                    -p.position.y,
                    self.restitution,
                );
                written += 1;
            }
        }
        written
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

    fn id(i: usize) -> ParticleId {
        ParticleId::from_index(i)
    }

    fn pair(distance: f32) -> [Particle; 2] {
        [Particle::new(1.0), Particle::new(1.0).with_position(Vector3::new(distance, 0.0, 0.0))]
    }

    #[test]
    fn test_cable_slack_and_taut() {
        let cable = ParticleCable {
            particles: [id(0), id(1)],
            max_length: 2.0,
            restitution: 0.3,
        };
        let mut contacts = [ParticleContact::default(); 2];
        assert_eq!(cable.add_contact(&pair(1.0), &mut contacts), 0);
        assert_eq!(cable.add_contact(&pair(2.5), &mut contacts), 1);
        let c = contacts[0];
        assert!(approx_eq(c.penetration, 0.5));
        // Particle 0 is pulled toward particle 1.
        assert!(approx_eq(c.contact_normal.x, 1.0));
        assert!(approx_eq(c.restitution, 0.3));
    }

    #[test]
    fn test_rod_pushes_and_pulls() {
        let rod = ParticleRod {
            particles: [id(0), id(1)],
            length: 2.0,
        };
        let mut contacts = [ParticleContact::default(); 1];
        assert_eq!(rod.add_contact(&pair(2.0), &mut contacts), 0);

        assert_eq!(rod.add_contact(&pair(2.5), &mut contacts), 1);
        assert!(approx_eq(contacts[0].contact_normal.x, 1.0));
        assert!(approx_eq(contacts[0].penetration, 0.5));

        assert_eq!(rod.add_contact(&pair(1.5), &mut contacts), 1);
        assert!(approx_eq(contacts[0].contact_normal.x, -1.0));
        assert!(approx_eq(contacts[0].penetration, 0.5));
        assert!(approx_eq(contacts[0].restitution, 0.0));
    }

    #[test]
    fn test_no_room_no_contact() {
        let rod = ParticleRod {
            particles: [id(0), id(1)],
            length: 2.0,
        };
        let mut contacts: [ParticleContact; 0] = [];
        assert_eq!(rod.add_contact(&pair(3.0), &mut contacts), 0);
    }

    #[test]
    fn test_anchored_links() {
        let ps = [Particle::new(1.0).with_position(Vector3::new(0.0, -3.0, 0.0))];
        let mut contacts = [ParticleContact::default(); 1];
        let cable = ParticleCableConstraint {
            particle: id(0),
            anchor: Vector3::zeros(),
            max_length: 2.0,
            restitution: 0.0,
        };
        assert_eq!(cable.add_contact(&ps, &mut contacts), 1);
        assert!(approx_eq(contacts[0].contact_normal.y, 1.0));
        assert!(approx_eq(contacts[0].penetration, 1.0));
        assert_eq!(contacts[0].particles[1], None);

        let rod = ParticleRodConstraint {
            particle: id(0),
            anchor: Vector3::zeros(),
            length: 4.0,
        };
        assert_eq!(rod.add_contact(&ps, &mut contacts), 1);
        assert!(approx_eq(contacts[0].contact_normal.y, -1.0));
        assert!(approx_eq(contacts[0].penetration, 1.0));
    }

    #[test]
    fn test_ground_contacts_fill_up_to_capacity() {
        let ps = [
            Particle::new(1.0).with_position(Vector3::new(0.0, -0.5, 0.0)),
            Particle::new(1.0).with_position(Vector3::new(0.0, 1.0, 0.0)),
            Particle::new(1.0).with_position(Vector3::new(0.0, -0.1, 0.0)),
            Particle::new(1.0).with_position(Vector3::new(0.0, -0.2, 0.0)),
        ];
        let mut contacts = [ParticleContact::default(); 2];
        assert_eq!(GroundContacts::default().add_contact(&ps, &mut contacts), 2);
        assert_eq!(contacts[0].particles[0], Some(id(0)));
        assert!(approx_eq(contacts[0].penetration, 0.5));
        assert_eq!(contacts[1].particles[0], Some(id(2)));
    }
}
