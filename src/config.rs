//! Solver and world configuration.
//!
//! Plain value types with sensible defaults and a couple of presets. With the
//! `serde` feature enabled they can be loaded from any serde format.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Iteration budget for one resolver pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Iterations {
    /// Twice the number of contacts handed to the resolver.
    Auto,
    /// A fixed number of iterations regardless of the contact count.
    Fixed(usize),
}

impl Iterations {
    /// Resolve the budget for a batch of `contact_count` contacts.
    #[inline]
    pub fn budget(self, contact_count: usize) -> usize {
        match self {
            Iterations::Auto => contact_count * 2,
            Iterations::Fixed(n) => n,
        }
    }
}

impl Default for Iterations {
    fn default() -> Self {
        Iterations::Auto
    }
}

/// Configuration for [`ContactResolver`](crate::resolver::ContactResolver).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResolverConfig {
    /// Budget of the penetration (position) pass.
    pub position_iterations: Iterations,

    /// Budget of the impulse (velocity) pass.
    pub velocity_iterations: Iterations,

    /// Penetrations at or below this depth are left alone.
    pub position_epsilon: f32,

    /// Closing velocities slower than this are left alone.
    pub velocity_epsilon: f32,

    /// Closing speeds below this limit bounce with zero restitution.
    pub velocity_limit: f32,

    /// Cap on the angular share of a position correction, as a fraction of
    /// the contact point's distance from the center of mass.
    pub angular_limit: f32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            position_iterations: Iterations::Auto,
            velocity_iterations: Iterations::Auto,
            position_epsilon: 0.01,
            velocity_epsilon: 0.01,
            velocity_limit: 0.25,
            angular_limit: 0.2,
        }
    }
}

impl ResolverConfig {
    /// Small fixed budgets and loose tolerances for constrained targets.
    pub fn fast() -> Self {
        Self {
            position_iterations: Iterations::Fixed(4),
            velocity_iterations: Iterations::Fixed(4),
            position_epsilon: 0.05,
            velocity_epsilon: 0.05,
            ..Default::default()
        }
    }

    /// Tight tolerances; budgets still scale with the contact count.
    pub fn precise() -> Self {
        Self {
            position_epsilon: 0.001,
            velocity_epsilon: 0.001,
            ..Default::default()
        }
    }
}

/// Configuration for [`World`](crate::world::World).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorldConfig {
    /// Contact resolution settings.
    pub resolver: ResolverConfig,

    /// Distance above a half-space at which box vertices still count as
    /// touching it.
    pub contact_tolerance: f32,

    /// Restitution used for contacts against scenery planes.
    pub scenery_restitution: f32,

    /// Friction used for contacts against scenery planes.
    pub scenery_friction: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            contact_tolerance: 0.1,
            scenery_restitution: 0.5,
            scenery_friction: 0.5,
        }
    }
}
