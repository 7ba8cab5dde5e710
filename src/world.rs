//! The rigid-body world: body registry, collision shapes, scenery planes,
//! force generators and the per-step pipeline.

use alloc::boxed::Box;

use log::{debug, trace, warn};
use nalgebra::Vector3;

// ComplexField provides sqrt() for f32 in no_std via libm
#[allow(unused_imports)]
use nalgebra::ComplexField;

use crate::body::{BodyId, RigidBody};
use crate::bounding::BoundingSphere;
use crate::bvh::{BvhTree, NodeId};
use crate::config::WorldConfig;
use crate::contact::Contact;
use crate::error::{PhysicsError, PhysicsResult};
use crate::force::{ForceGenerator, ForceRegistry};
use crate::narrow::CollisionData;
use crate::resolver::ContactResolver;
use crate::shape::{Plane, Shape};

/// Handle of a shape registered with a [`World`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeId(usize);

impl ShapeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A world of up to `N` bodies, `N` shapes and `N` scenery planes, with at
/// most `C` contacts per step.
///
/// # Example
/// ```
/// use embedded_physics::body::RigidBody;
/// use embedded_physics::shape::{Plane, Shape};
/// use embedded_physics::world::World;
/// use nalgebra::Vector3;
///
/// let mut world = World::<16, 32>::default();
/// world.add_plane(Plane::new(Vector3::y(), 0.0).unwrap()).unwrap();
///
/// let ball = RigidBody::new(1.0)
///     .with_position(Vector3::new(0.0, 3.0, 0.0))
///     .with_acceleration(Vector3::new(0.0, -9.81, 0.0))
///     .with_inertia_sphere(0.5)
///     .unwrap();
/// let id = world.add_body(ball).unwrap();
/// world.add_shape(Shape::sphere(id, 0.5).unwrap()).unwrap();
///
/// for _ in 0..240 {
///     world.step(1.0 / 60.0);
/// }
/// let y = world.body(id).unwrap().position.y;
/// assert!((y - 0.5).abs() < 0.05);
/// ```
pub struct World<const N: usize, const C: usize> {
    bodies: heapless::Vec<RigidBody, N>,
    shapes: heapless::Vec<Shape, N>,
    shape_leaves: heapless::Vec<Option<NodeId>, N>,
    planes: heapless::Vec<Plane, N>,
    bvh: BvhTree<BoundingSphere, usize>,
    registry: ForceRegistry,
    resolver: ContactResolver,
    collision: CollisionData<C>,
    config: WorldConfig,
}

impl<const N: usize, const C: usize> Default for World<N, C> {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

impl<const N: usize, const C: usize> World<N, C> {
    pub fn new(config: WorldConfig) -> Self {
        let mut collision = CollisionData::new();
        collision.tolerance = config.contact_tolerance;
        Self {
            bodies: heapless::Vec::new(),
            shapes: heapless::Vec::new(),
            shape_leaves: heapless::Vec::new(),
            planes: heapless::Vec::new(),
            bvh: BvhTree::new(),
            registry: ForceRegistry::new(),
            resolver: ContactResolver::new(config.resolver),
            collision,
            config,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: WorldConfig) {
        self.resolver.set_config(config.resolver);
        self.collision.tolerance = config.contact_tolerance;
        self.config = config;
    }

    // -- Bodies --

    /// Add a body to the world. Returns its [`BodyId`], or `None` if at capacity.
    pub fn add_body(&mut self, mut body: RigidBody) -> Option<BodyId> {
        let id = BodyId(self.bodies.len());
        body.calculate_derived_data();
        if self.bodies.push(body).is_err() {
            warn!("world full ({} bodies)", N);
            return None;
        }
        Some(id)
    }

    /// Deactivate a body, effectively removing it from the simulation.
    ///
    /// The slot is kept so other [`BodyId`]s stay valid. The body's shapes
    /// leave the broad phase and its force generators are dropped.
    ///
    /// Returns `false` if the id is out of bounds or the body was already
    /// inactive.
    pub fn remove_body(&mut self, id: BodyId) -> bool {
        let Some(body) = self.bodies.get_mut(id.0) else {
            return false;
        };
        if !body.active {
            return false;
        }
        body.active = false;
        body.velocity = Vector3::zeros();
        body.angular_velocity = Vector3::zeros();
        body.clear_accumulators();

        for (shape, leaf) in self.shapes.iter().zip(self.shape_leaves.iter_mut()) {
            if shape.body() == Some(id) {
                if let Some(node) = leaf.take() {
                    self.bvh.remove(node);
                }
            }
        }
        self.registry.remove_body(id);
        true
    }

    pub fn body(&self, id: BodyId) -> Option<&RigidBody> {
        self.bodies.get(id.0)
    }

    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut RigidBody> {
        self.bodies.get_mut(id.0)
    }

    /// Total number of bodies, including inactive ones.
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn active_body_count(&self) -> usize {
        self.bodies.iter().filter(|b| b.active).count()
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyId, &RigidBody)> {
        self.bodies.iter().enumerate().map(|(i, b)| (BodyId(i), b))
    }

    pub fn bodies_mut(&mut self) -> impl Iterator<Item = (BodyId, &mut RigidBody)> {
        self.bodies.iter_mut().enumerate().map(|(i, b)| (BodyId(i), b))
    }

    fn check_body(&self, id: BodyId) -> PhysicsResult<()> {
        match self.bodies.get(id.0) {
            Some(body) if body.active => Ok(()),
            _ => Err(PhysicsError::UnknownBody(id)),
        }
    }

    // -- Shapes and scenery --

    /// Register a collision shape. Shapes without a body are fixed scenery.
    pub fn add_shape(&mut self, mut shape: Shape) -> PhysicsResult<ShapeId> {
        if let Some(body) = shape.body() {
            self.check_body(body)?;
        }
        if self.shapes.is_full() {
            warn!("shape registry full ({} shapes)", N);
            return Err(PhysicsError::CapacityExceeded { capacity: N });
        }

        let owner = shape.body().and_then(|b| self.bodies.get(b.0));
        shape.primitive_mut().calculate_internals(owner);

        let index = self.shapes.len();
        let leaf = self.bvh.insert(index, shape.bounding_sphere());
        // Capacity checked above; both vectors share it.
        let _ = self.shapes.push(shape);
        let _ = self.shape_leaves.push(Some(leaf));
        Ok(ShapeId(index))
    }

    pub fn shape(&self, id: ShapeId) -> Option<&Shape> {
        self.shapes.get(id.0)
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    /// Register an infinite scenery half-space.
    pub fn add_plane(&mut self, plane: Plane) -> PhysicsResult<()> {
        self.planes.push(plane).map_err(|_| {
            warn!("plane registry full ({} planes)", N);
            PhysicsError::CapacityExceeded { capacity: N }
        })
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    // -- Forces --

    pub fn add_force_generator(&mut self, body: BodyId, generator: Box<dyn ForceGenerator>) -> PhysicsResult<()> {
        self.check_body(body)?;
        self.registry.add(body, generator);
        Ok(())
    }

    // -- Results --

    /// Contacts found by the last [`step`](Self::step), after resolution.
    pub fn contacts(&self) -> &[Contact] {
        self.collision.contacts()
    }

    pub fn resolver(&self) -> &ContactResolver {
        &self.resolver
    }

    // -- Simulation --

    /// Advance the world by `duration` seconds.
    ///
    /// Forces, integration, broad phase, narrow phase, then the position and
    /// velocity passes of the resolver.
    pub fn step(&mut self, duration: f32) {
        for body in self.bodies.iter_mut().filter(|b| b.active) {
            body.clear_accumulators();
            body.calculate_derived_data();
        }

        self.registry.update_forces(&mut self.bodies, duration);

        for body in self.bodies.iter_mut().filter(|b| b.active) {
            body.integrate(duration);
        }

        self.update_broad_phase();
        self.generate_contacts();

        let count = self.collision.len();
        self.resolver
            .resolve(self.collision.contacts_mut(), &mut self.bodies, duration);
        trace!(
            "step: {} contacts, {} position / {} velocity iterations",
            count,
            self.resolver.position_iterations_used(),
            self.resolver.velocity_iterations_used()
        );
    }

    /// Advance by `duration` in `substeps` equal steps.
    pub fn step_fixed(&mut self, duration: f32, substeps: u32) {
        if substeps == 0 {
            return;
        }
        let sub = duration / substeps as f32;
        for _ in 0..substeps {
            self.step(sub);
        }
    }

    fn update_broad_phase(&mut self) {
        for (shape, leaf) in self.shapes.iter_mut().zip(self.shape_leaves.iter()) {
            let (Some(leaf), Some(body)) = (leaf, shape.body()) else {
                continue;
            };
            if let Some(body) = self.bodies.get(body.0) {
                shape.primitive_mut().calculate_internals(Some(body));
                self.bvh.update(*leaf, shape.bounding_sphere());
            }
        }
    }

    /// Restitution and friction of a body, or the scenery defaults.
    fn material(&self, body: Option<BodyId>) -> (f32, f32) {
        match body.and_then(|b| self.bodies.get(b.0)) {
            Some(b) => (b.restitution, b.friction),
            None => (self.config.scenery_restitution, self.config.scenery_friction),
        }
    }

    fn set_pair_material(&mut self, a: Option<BodyId>, b: Option<BodyId>) {
        let (ra, fa) = self.material(a);
        let (rb, fb) = self.material(b);
        self.collision.restitution = ra.min(rb);
        self.collision.friction = (fa * fb).sqrt();
    }

    /// Whether a contact involving `a` and `b` could move anything.
    fn pair_is_live(&self, a: Option<BodyId>, b: Option<BodyId>) -> bool {
        let body = |id: Option<BodyId>| id.and_then(|i| self.bodies.get(i.0));
        let (ba, bb) = (body(a), body(b));
        if ba.is_some_and(|b| !b.active) || bb.is_some_and(|b| !b.active) {
            return false;
        }
        ba.is_some_and(|b| b.is_movable()) || bb.is_some_and(|b| b.is_movable())
    }

    fn generate_contacts(&mut self) {
        self.collision.reset(C);
        let pairs = self.bvh.potential_contacts::<C>(C);

        for pair in pairs.iter() {
            let [i, j] = pair.items;
            let (a, b) = (self.shapes[i].body(), self.shapes[j].body());
            if a.is_some() && a == b {
                continue;
            }
            if !self.pair_is_live(a, b) {
                continue;
            }
            if self.collision.contacts_left() == 0 {
                debug!("contact buffer full ({} contacts), dropping remaining pairs", C);
                return;
            }
            self.set_pair_material(a, b);
            self.shapes[i].collide(&self.shapes[j], &mut self.collision);
        }

        for (i, leaf) in self.shape_leaves.iter().enumerate() {
            if leaf.is_none() {
                continue;
            }
            let body = self.shapes[i].body();
            if !self.pair_is_live(body, None) {
                continue;
            }
            for plane in self.planes.iter() {
                if self.collision.contacts_left() == 0 {
                    debug!("contact buffer full ({} contacts), dropping plane contacts", C);
                    return;
                }
                let (r, f) = self.material(body);
                self.collision.restitution = r.min(self.config.scenery_restitution);
                self.collision.friction = (f * self.config.scenery_friction).sqrt();
                self.shapes[i].collide_plane(plane, &mut self.collision);
            }
        }
    }
}

impl<const N: usize, const C: usize> core::fmt::Debug for World<N, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("World")
            .field("bodies", &self.bodies.len())
            .field("shapes", &self.shapes.len())
            .field("planes", &self.planes.len())
            .field("registry", &self.registry)
            .field("contacts", &self.collision.len())
            .field("config", &self.config)
            .finish()
    }
}
