//! Error types for the physics engine.
//!
//! Only construction and registration can fail. Once a body or shape is
//! accepted, a simulation step never returns an error: numerical corner
//! cases are skipped and capacity overflow truncates the contact list.

use thiserror::Error;

use crate::body::BodyId;
use crate::particle::ParticleId;

/// Unified error type for fallible construction and registration.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum PhysicsError {
    /// The inertia tensor supplied for a body has no inverse.
    #[error("inertia tensor is not invertible")]
    DegenerateInertiaTensor,

    /// A shape was built with a non-positive or non-finite dimension.
    #[error("invalid shape: {0}")]
    InvalidShape(&'static str),

    /// A fixed-capacity registry is full.
    #[error("capacity exceeded ({capacity} entries)")]
    CapacityExceeded { capacity: usize },

    /// The referenced body was never registered or has been removed.
    #[error("unknown body {0:?}")]
    UnknownBody(BodyId),

    /// The referenced particle was never registered.
    #[error("unknown particle {0:?}")]
    UnknownParticle(ParticleId),
}

/// Convenience alias for `Result<T, PhysicsError>`.
pub type PhysicsResult<T> = Result<T, PhysicsError>;
