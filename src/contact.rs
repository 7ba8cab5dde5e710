//! Contacts between bodies and the per-contact resolution math.
//!
//! A [`Contact`] is produced by the narrow phase and consumed by the
//! [`ContactResolver`](crate::resolver::ContactResolver) in the same step.
//!
//! # Conventions
//! - `bodies[0]` is always present once internals are calculated; a contact
//!   with only one body is a contact against scenery.
//! - The normal points from body 1 toward body 0: moving body 0 along the
//!   normal separates the pair.
//! - Contact space has the normal as its X axis and two tangents as Y and Z.

use nalgebra::{Matrix3, Vector3};

// ComplexField provides sqrt() for f32 in no_std via libm
#[allow(unused_imports)]
use nalgebra::ComplexField;

use crate::body::{BodyId, RigidBody};

/// A contact between two bodies, or between a body and scenery.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Bodies involved. The second is `None` for scenery.
    pub bodies: [Option<BodyId>; 2],

    /// Contact point in world space.
    pub point: Vector3<f32>,

    /// Unit contact normal in world space, from body 1 toward body 0.
    pub normal: Vector3<f32>,

    /// Depth of interpenetration along the normal.
    pub penetration: f32,

    pub restitution: f32,
    pub friction: f32,

    contact_to_world: Matrix3<f32>,
    relative_contact_position: [Vector3<f32>; 2],
    contact_velocity: Vector3<f32>,
    desired_delta_velocity: f32,
}

/// Linear and angular change applied to each body of a contact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyChange {
    pub linear: [Vector3<f32>; 2],
    pub angular: [Vector3<f32>; 2],
}

impl BodyChange {
    fn zero() -> Self {
        Self {
            linear: [Vector3::zeros(); 2],
            angular: [Vector3::zeros(); 2],
        }
    }
}

impl Contact {
    pub fn new(
        bodies: [Option<BodyId>; 2],
        point: Vector3<f32>,
        normal: Vector3<f32>,
        penetration: f32,
        restitution: f32,
        friction: f32,
    ) -> Self {
        Self {
            bodies,
            point,
            normal,
            penetration,
            restitution,
            friction,
            contact_to_world: Matrix3::identity(),
            relative_contact_position: [Vector3::zeros(); 2],
            contact_velocity: Vector3::zeros(),
            desired_delta_velocity: 0.0,
        }
    }

    /// Contact-space to world-space rotation; its first column is the normal.
    #[inline]
    pub fn contact_to_world(&self) -> &Matrix3<f32> {
        &self.contact_to_world
    }

    /// Contact point relative to body `index`'s center of mass.
    #[inline]
    pub fn relative_contact_position(&self, index: usize) -> Vector3<f32> {
        self.relative_contact_position[index]
    }

    /// Closing velocity of the contact in contact space. A negative X
    /// component means the bodies approach along the normal.
    #[inline]
    pub fn contact_velocity(&self) -> Vector3<f32> {
        self.contact_velocity
    }

    /// Normal velocity change the velocity pass aims for.
    #[inline]
    pub fn desired_delta_velocity(&self) -> f32 {
        self.desired_delta_velocity
    }

    /// Whether at least one body will respond to this contact.
    pub fn has_movable_body(&self, bodies: &[RigidBody]) -> bool {
        self.bodies.iter().flatten().any(|id| bodies[id.index()].is_movable())
    }

    /// Wake a sleeping body that touches an awake, movable one.
    pub fn match_awake_state(&self, bodies: &mut [RigidBody]) {
        let [Some(a), Some(b)] = self.bodies else {
            return;
        };
        let a_awake = bodies[a.index()].is_awake();
        let b_awake = bodies[b.index()].is_awake();
        if a_awake == b_awake {
            return;
        }
        if a_awake && bodies[a.index()].has_finite_mass() {
            bodies[b.index()].set_awake(true);
        } else if b_awake && bodies[b.index()].has_finite_mass() {
            bodies[a.index()].set_awake(true);
        }
    }

    /// Prepare the contact for resolution: fix the body order, build the
    /// contact basis and compute the relative velocity and the velocity
    /// change to aim for.
    pub fn calculate_internals(&mut self, bodies: &[RigidBody], duration: f32, velocity_limit: f32) {
        if self.bodies[0].is_none() {
            self.swap_bodies();
        }
        let Some(first) = self.bodies[0] else {
            return;
        };

        self.calculate_contact_basis();

        let body = &bodies[first.index()];
        self.relative_contact_position[0] = self.point - body.position;
        self.contact_velocity = self.local_velocity(0, body, duration);

        if let Some(second) = self.bodies[1] {
            let body = &bodies[second.index()];
            self.relative_contact_position[1] = self.point - body.position;
            self.contact_velocity -= self.local_velocity(1, body, duration);
        }

        self.calculate_desired_delta_velocity(bodies, duration, velocity_limit);
    }

    fn swap_bodies(&mut self) {
        self.bodies.swap(0, 1);
        self.normal = -self.normal;
    }

    /// Orthonormal basis with the normal as X. The helper axis is world Y
    /// when the normal is nearer the X axis and world X otherwise.
    fn calculate_contact_basis(&mut self) {
        let n = self.normal;
        let helper = if n.x.abs() > n.y.abs() { Vector3::y() } else { Vector3::x() };
        let tangent = helper.cross(&n);
        let length = tangent.norm();
        if length <= f32::EPSILON {
            return;
        }
        let tangent = tangent / length;
        let bitangent = n.cross(&tangent);
        self.contact_to_world = Matrix3::from_columns(&[n, tangent, bitangent]);
    }

    /// Velocity of the contact point on body `index`, in contact space. The
    /// planar part of the velocity built up by last frame's acceleration is
    /// included so friction can cancel it.
    fn local_velocity(&self, index: usize, body: &RigidBody, duration: f32) -> Vector3<f32> {
        let velocity = body.angular_velocity.cross(&self.relative_contact_position[index]) + body.velocity;
        let world_to_contact = self.contact_to_world.transpose();
        let mut contact_velocity = world_to_contact * velocity;

        let mut acc_velocity = world_to_contact * (body.last_frame_acceleration() * duration);
        acc_velocity.x = 0.0;
        contact_velocity += acc_velocity;
        contact_velocity
    }

    /// Recompute the normal velocity change needed to resolve this contact.
    ///
    /// Restitution is dropped for closing speeds below `velocity_limit`, and
    /// the velocity built up by last frame's acceleration is not bounced.
    pub fn calculate_desired_delta_velocity(&mut self, bodies: &[RigidBody], duration: f32, velocity_limit: f32) {
        let mut velocity_from_acc = 0.0;
        if let Some(id) = self.bodies[0] {
            let body = &bodies[id.index()];
            if body.is_awake() {
                velocity_from_acc += (body.last_frame_acceleration() * duration).dot(&self.normal);
            }
        }
        if let Some(id) = self.bodies[1] {
            let body = &bodies[id.index()];
            if body.is_awake() {
                velocity_from_acc -= (body.last_frame_acceleration() * duration).dot(&self.normal);
            }
        }

        let closing = self.contact_velocity.x;
        let restitution = if closing.abs() < velocity_limit { 0.0 } else { self.restitution };
        self.desired_delta_velocity = -closing - restitution * (closing - velocity_from_acc);
    }

    /// Apply `delta` (world space) to the cached contact velocity, with the
    /// sign used for body `index`.
    pub(crate) fn add_world_velocity(&mut self, index: usize, delta: &Vector3<f32>) {
        let local = self.contact_to_world.transpose() * delta;
        if index == 0 {
            self.contact_velocity += local;
        } else {
            self.contact_velocity -= local;
        }
    }

    /// Inverse mass and world inverse inertia, zeroed for bodies that do not
    /// respond to contacts.
    fn response(body: &RigidBody) -> (f32, Matrix3<f32>) {
        if body.is_movable() {
            (body.inverse_mass(), *body.inverse_inertia_tensor_world())
        } else {
            (0.0, Matrix3::zeros())
        }
    }

    /// Resolve the closing velocity with one impulse and apply it to the
    /// bodies. Returns the velocity and rotation changes applied.
    pub fn apply_velocity_change(&self, bodies: &mut [RigidBody]) -> BodyChange {
        let mut change = BodyChange::zero();
        let Some(first) = self.bodies[0] else {
            return change;
        };

        let responses = [
            Some(Self::response(&bodies[first.index()])),
            self.bodies[1].map(|id| Self::response(&bodies[id.index()])),
        ];

        let impulse_contact = if self.friction == 0.0 {
            self.calculate_frictionless_impulse(&responses)
        } else {
            self.calculate_friction_impulse(&responses)
        };
        let impulse = self.contact_to_world * impulse_contact;

        for (index, id) in self.bodies.iter().enumerate() {
            let (Some(id), Some((inv_mass, inv_inertia))) = (id, responses[index]) else {
                continue;
            };
            let sign = if index == 0 { 1.0 } else { -1.0 };
            let torque = self.relative_contact_position[index].cross(&impulse) * sign;
            change.angular[index] = inv_inertia * torque;
            change.linear[index] = impulse * (inv_mass * sign);

            let body = &mut bodies[id.index()];
            body.velocity += change.linear[index];
            body.angular_velocity += change.angular[index];
        }
        change
    }

    /// Impulse along the normal only.
    fn calculate_frictionless_impulse(&self, responses: &[Option<(f32, Matrix3<f32>)>; 2]) -> Vector3<f32> {
        let mut delta_velocity = 0.0;
        for (index, response) in responses.iter().enumerate() {
            let Some((inv_mass, inv_inertia)) = response else {
                continue;
            };
            let r = self.relative_contact_position[index];
            let rotation_per_unit = inv_inertia * r.cross(&self.normal);
            let velocity_per_unit = rotation_per_unit.cross(&r);
            delta_velocity += velocity_per_unit.dot(&self.normal) + inv_mass;
        }
        if delta_velocity <= 0.0 {
            return Vector3::zeros();
        }
        Vector3::new(self.desired_delta_velocity / delta_velocity, 0.0, 0.0)
    }

    /// Impulse that also removes tangential velocity, clamped to the
    /// friction cone.
    fn calculate_friction_impulse(&self, responses: &[Option<(f32, Matrix3<f32>)>; 2]) -> Vector3<f32> {
        let mut inverse_mass = 0.0;
        let mut delta_vel_world = Matrix3::zeros();
        for (index, response) in responses.iter().enumerate() {
            let Some((inv_mass, inv_inertia)) = response else {
                continue;
            };
            let impulse_to_torque = self.relative_contact_position[index].cross_matrix();
            delta_vel_world -= impulse_to_torque * inv_inertia * impulse_to_torque;
            inverse_mass += inv_mass;
        }

        let mut delta_velocity = self.contact_to_world.transpose() * delta_vel_world * self.contact_to_world;
        delta_velocity[(0, 0)] += inverse_mass;
        delta_velocity[(1, 1)] += inverse_mass;
        delta_velocity[(2, 2)] += inverse_mass;

        let Some(impulse_matrix) = delta_velocity.try_inverse() else {
            return Vector3::zeros();
        };

        let velocity_to_kill = Vector3::new(
            self.desired_delta_velocity,
            -self.contact_velocity.y,
            -self.contact_velocity.z,
        );
        let mut impulse = impulse_matrix * velocity_to_kill;

        let planar = (impulse.y * impulse.y + impulse.z * impulse.z).sqrt();
        if planar > impulse.x * self.friction {
            // Sliding: keep the tangential direction, scale to the cone edge.
            impulse.y /= planar;
            impulse.z /= planar;
            let normal_response = delta_velocity[(0, 0)]
                + delta_velocity[(0, 1)] * self.friction * impulse.y
                + delta_velocity[(0, 2)] * self.friction * impulse.z;
            if normal_response <= 0.0 {
                return Vector3::zeros();
            }
            impulse.x = self.desired_delta_velocity / normal_response;
            impulse.y *= self.friction * impulse.x;
            impulse.z *= self.friction * impulse.x;
        }
        impulse
    }

    /// Move the bodies apart to remove the penetration, splitting the move
    /// between linear and angular motion by inertia. The angular share is
    /// capped at `angular_limit` times the contact point's distance from the
    /// center of mass. Returns the linear and angular changes applied.
    pub fn apply_position_change(&self, bodies: &mut [RigidBody], angular_limit: f32) -> BodyChange {
        let mut change = BodyChange::zero();
        let mut linear_inertia = [0.0f32; 2];
        let mut angular_inertia = [0.0f32; 2];
        let mut responses = [(0.0f32, Matrix3::zeros()); 2];
        let mut total_inertia = 0.0;

        for (index, id) in self.bodies.iter().enumerate() {
            let Some(id) = id else {
                continue;
            };
            let (inv_mass, inv_inertia) = Self::response(&bodies[id.index()]);
            let r = self.relative_contact_position[index];
            let angular_inertia_world = (inv_inertia * r.cross(&self.normal)).cross(&r);
            angular_inertia[index] = angular_inertia_world.dot(&self.normal);
            linear_inertia[index] = inv_mass;
            responses[index] = (inv_mass, inv_inertia);
            total_inertia += linear_inertia[index] + angular_inertia[index];
        }

        if total_inertia <= 0.0 {
            return change;
        }

        for (index, id) in self.bodies.iter().enumerate() {
            let Some(id) = id else {
                continue;
            };
            if responses[index].0 == 0.0 {
                continue;
            }
            let sign = if index == 0 { 1.0 } else { -1.0 };
            let mut angular_move = sign * self.penetration * (angular_inertia[index] / total_inertia);
            let mut linear_move = sign * self.penetration * (linear_inertia[index] / total_inertia);

            let r = self.relative_contact_position[index];
            let limit = angular_limit * r.norm();
            if angular_move.abs() > limit {
                let total_move = angular_move + linear_move;
                angular_move = angular_move.clamp(-limit, limit);
                linear_move = total_move - angular_move;
            }

            if angular_move != 0.0 && angular_inertia[index] != 0.0 {
                let target_direction = r.cross(&self.normal);
                change.angular[index] = responses[index].1 * target_direction * (angular_move / angular_inertia[index]);
            }
            change.linear[index] = self.normal * linear_move;

            let body = &mut bodies[id.index()];
            body.position += change.linear[index];
            let rotation = change.angular[index];
            body.add_scaled_rotation(&rotation, 1.0);
            body.calculate_derived_data();
        }
        change
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

    fn ball(x: f32, vx: f32) -> RigidBody {
        RigidBody::new(1.0)
            .with_position(Vector3::new(x, 0.0, 0.0))
            .with_velocity(Vector3::new(vx, 0.0, 0.0))
    }

    fn head_on(restitution: f32) -> (std::vec::Vec<RigidBody>, Contact) {
        let bodies = std::vec![ball(-0.9, 1.0), ball(0.9, -1.0)];
        // Body 0 separates by moving toward -X.
        let contact = Contact::new(
            [Some(BodyId::from_index(0)), Some(BodyId::from_index(1))],
            Vector3::zeros(),
            Vector3::new(-1.0, 0.0, 0.0),
            0.2,
            restitution,
            0.0,
        );
        (bodies, contact)
    }

    #[test]
    fn test_basis_is_orthonormal() {
        let bodies = [RigidBody::new(1.0)];
        for normal in [
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, -1.0),
            Vector3::new(1.0, 2.0, 3.0).normalize(),
        ] {
            let mut c = Contact::new([Some(BodyId::from_index(0)), None], Vector3::zeros(), normal, 0.0, 0.0, 0.0);
            c.calculate_internals(&bodies, 0.01, 0.25);
            let m = c.contact_to_world();
            assert!(approx_vec_eq(&m.column(0).into_owned(), &normal));
            let identity = m.transpose() * m;
            for i in 0..3 {
                for j in 0..3 {
                    assert!(approx_eq(identity[(i, j)], if i == j { 1.0 } else { 0.0 }));
                }
            }
            assert!(approx_eq(m.determinant(), 1.0));
        }
    }

    #[test]
    fn test_missing_first_body_swaps() {
        let bodies = [RigidBody::new(1.0)];
        let mut c = Contact::new(
            [None, Some(BodyId::from_index(0))],
            Vector3::zeros(),
            Vector3::y(),
            0.1,
            0.0,
            0.0,
        );
        c.calculate_internals(&bodies, 0.01, 0.25);
        assert_eq!(c.bodies, [Some(BodyId::from_index(0)), None]);
        assert!(approx_vec_eq(&c.normal, &-Vector3::y()));
    }

    #[test]
    fn test_closing_velocity_is_negative() {
        let (bodies, mut c) = head_on(1.0);
        c.calculate_internals(&bodies, 0.0, 0.25);
        assert!(approx_eq(c.contact_velocity().x, -2.0));
        assert!(approx_eq(c.desired_delta_velocity(), 4.0));
    }

    #[test]
    fn test_slow_contact_drops_restitution() {
        let bodies = [ball(0.0, -0.1)];
        let mut c = Contact::new(
            [Some(BodyId::from_index(0)), None],
            Vector3::zeros(),
            Vector3::x(),
            0.0,
            1.0,
            0.0,
        );
        c.calculate_internals(&bodies, 0.0, 0.25);
        assert!(approx_eq(c.desired_delta_velocity(), 0.1));
    }

    #[test]
    fn test_elastic_impulse_exchanges_velocities() {
        let (mut bodies, mut c) = head_on(1.0);
        c.calculate_internals(&bodies, 0.0, 0.25);
        c.apply_velocity_change(&mut bodies);
        assert!(approx_vec_eq(&bodies[0].velocity, &Vector3::new(-1.0, 0.0, 0.0)));
        assert!(approx_vec_eq(&bodies[1].velocity, &Vector3::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_inelastic_impulse_common_velocity() {
        let (mut bodies, mut c) = head_on(0.0);
        c.calculate_internals(&bodies, 0.0, 0.25);
        c.apply_velocity_change(&mut bodies);
        assert!(approx_eq(bodies[0].velocity.x, 0.0));
        assert!(approx_eq(bodies[1].velocity.x, 0.0));
    }

    #[test]
    fn test_friction_stops_sliding_within_cone() {
        // Ball resting on scenery, sliding slowly sideways.
        let mut bodies = std::vec![RigidBody::new(1.0)
            .with_inertia_sphere(1.0)
            .unwrap()
            .with_velocity(Vector3::new(0.5, -1.0, 0.0))];
        let mut c = Contact::new(
            [Some(BodyId::from_index(0)), None],
            Vector3::new(0.0, -1.0, 0.0),
            Vector3::y(),
            0.0,
            0.0,
            10.0,
        );
        c.calculate_internals(&bodies, 0.0, 0.25);
        c.apply_velocity_change(&mut bodies);
        // Contact point velocity is zero after a sticking impulse.
        let body = &bodies[0];
        let r = Vector3::new(0.0, -1.0, 0.0);
        let point_velocity = body.velocity + body.angular_velocity.cross(&r);
        assert!(approx_vec_eq(&point_velocity, &Vector3::zeros()));
    }

    #[test]
    fn test_friction_is_clamped_to_cone() {
        let mut bodies = std::vec![RigidBody::new(1.0)
            .with_inertia_sphere(1.0)
            .unwrap()
            .with_velocity(Vector3::new(5.0, -1.0, 0.0))];
        let mut c = Contact::new(
            [Some(BodyId::from_index(0)), None],
            Vector3::new(0.0, -1.0, 0.0),
            Vector3::y(),
            0.0,
            0.0,
            0.1,
        );
        c.calculate_internals(&bodies, 0.0, 0.25);
        let change = c.apply_velocity_change(&mut bodies);
        let impulse = change.linear[0];
        assert!(impulse.y > 0.0);
        assert!(impulse.x < 0.0);
        assert!(impulse.x.abs() <= 0.1 * impulse.y + EPSILON);
        assert!(approx_eq(bodies[0].velocity.y, 0.0));
    }

    #[test]
    fn test_position_change_splits_by_mass() {
        let mut bodies = std::vec![
            RigidBody::new(1.0).with_position(Vector3::new(-0.9, 0.0, 0.0)),
            RigidBody::new(3.0).with_position(Vector3::new(0.9, 0.0, 0.0)),
        ];
        let mut c = Contact::new(
            [Some(BodyId::from_index(0)), Some(BodyId::from_index(1))],
            Vector3::zeros(),
            Vector3::new(-1.0, 0.0, 0.0),
            0.2,
            0.0,
            0.0,
        );
        c.calculate_internals(&bodies, 0.0, 0.25);
        let change = c.apply_position_change(&mut bodies, 0.2);
        // Contact point on the line of centers: no rotation.
        assert!(approx_vec_eq(&change.angular[0], &Vector3::zeros()));
        assert!(approx_eq(bodies[0].position.x, -1.05));
        assert!(approx_eq(bodies[1].position.x, 0.95));
    }

    #[test]
    fn test_position_change_angular_limit() {
        let mut bodies = std::vec![RigidBody::new(1.0).with_inertia_box(Vector3::new(1.0, 0.1, 1.0)).unwrap()];
        // Contact at a corner far from the center of mass.
        let mut c = Contact::new(
            [Some(BodyId::from_index(0)), None],
            Vector3::new(1.0, -0.1, 0.0),
            Vector3::y(),
            0.5,
            0.0,
            0.0,
        );
        c.calculate_internals(&bodies, 0.0, 0.25);
        let change = c.apply_position_change(&mut bodies, 0.2);
        let r = c.relative_contact_position(0);
        let angular_move = change.angular[0].cross(&r).dot(&c.normal);
        assert!(angular_move.abs() <= 0.2 * r.norm() + EPSILON);
        // The linear part makes up the rest of the move.
        assert!(approx_eq(change.linear[0].y + angular_move, 0.5));
        assert!((bodies[0].orientation.into_inner().norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_sleeping_body_does_not_move() {
        let mut bodies = std::vec![RigidBody::new(1.0).with_velocity(Vector3::new(0.0, -1.0, 0.0))];
        bodies[0].set_awake(false);
        let mut c = Contact::new([Some(BodyId::from_index(0)), None], Vector3::zeros(), Vector3::y(), 0.3, 0.0, 0.0);
        c.calculate_internals(&bodies, 0.0, 0.25);
        assert!(!c.has_movable_body(&bodies));
        c.apply_position_change(&mut bodies, 0.2);
        c.apply_velocity_change(&mut bodies);
        assert_eq!(bodies[0].position, Vector3::zeros());
    }

    #[test]
    fn test_match_awake_state_wakes_sleeper() {
        let mut bodies = std::vec![RigidBody::new(1.0), RigidBody::new(1.0), RigidBody::new_static()];
        bodies[1].set_awake(false);
        let c = Contact::new(
            [Some(BodyId::from_index(1)), Some(BodyId::from_index(0))],
            Vector3::zeros(),
            Vector3::x(),
            0.0,
            0.0,
            0.0,
        );
        c.match_awake_state(&mut bodies);
        assert!(bodies[1].is_awake());

        // Static bodies never wake anything.
        bodies[1].set_awake(false);
        let floor = Contact::new(
            [Some(BodyId::from_index(1)), Some(BodyId::from_index(2))],
            Vector3::zeros(),
            Vector3::y(),
            0.0,
            0.0,
            0.0,
        );
        floor.match_awake_state(&mut bodies);
        assert!(!bodies[1].is_awake());
    }
}
