//! Rigid-body and mass-aggregate physics for `no_std` targets.
//!
//! The rigid-body pipeline runs once per [`World::step`]:
//!
//! 1. force generators fill each body's accumulators;
//! 2. bodies integrate and update their sleep state;
//! 3. a bounding-sphere hierarchy ([`bvh`]) finds candidate shape pairs;
//! 4. the narrow phase ([`narrow`]) turns pairs and scenery planes into
//!    [`Contact`]s;
//! 5. the [`ContactResolver`] removes interpenetration, then applies
//!    impulses with friction.
//!
//! Capacities are const generics backed by `heapless`; only the BVH arena
//! and boxed force generators allocate.
//!
//! The [`particle`] module holds the simpler point-mass path with springs,
//! cables and rods.
//!
//! # Example
//! ```
//! use embedded_physics::{Plane, RigidBody, Shape, World};
//! use nalgebra::Vector3;
//!
//! let mut world = World::<8, 32>::default();
//! world.add_plane(Plane::new(Vector3::y(), 0.0).unwrap()).unwrap();
//!
//! let crate_body = RigidBody::new(2.0)
//!     .with_position(Vector3::new(0.0, 2.0, 0.0))
//!     .with_acceleration(Vector3::new(0.0, -9.81, 0.0))
//!     .with_inertia_box(Vector3::new(0.5, 0.5, 0.5))
//!     .unwrap();
//! let id = world.add_body(crate_body).unwrap();
//! world.add_shape(Shape::cuboid(id, Vector3::new(0.5, 0.5, 0.5)).unwrap()).unwrap();
//!
//! for _ in 0..120 {
//!     world.step(1.0 / 60.0);
//! }
//! assert!(world.body(id).unwrap().position.y > 0.4);
//! ```

#![no_std]

extern crate alloc;

pub mod body;
pub mod bounding;
pub mod bvh;
pub mod config;
pub mod contact;
pub mod error;
pub mod force;
pub mod narrow;
pub mod particle;
pub mod resolver;
pub mod shape;
pub mod world;

pub use body::{BodyId, RigidBody};
pub use bounding::{BoundingBox, BoundingSphere, BoundingVolume};
pub use bvh::BvhTree;
pub use config::{Iterations, ResolverConfig, WorldConfig};
pub use contact::Contact;
pub use error::{PhysicsError, PhysicsResult};
pub use force::{ForceGenerator, ForceRegistry};
pub use narrow::CollisionData;
pub use resolver::ContactResolver;
pub use shape::{CollisionBox, Plane, Shape, Sphere};
pub use world::{ShapeId, World};
