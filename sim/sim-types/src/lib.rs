//! Core types for rigid-body contact simulation.
//!
//! This crate provides the plain data shared by the collision and solver
//! crates:
//!
//! - [`BodyHandle`] / [`ColliderHandle`] - Stable arena slots
//! - [`RigidBodyState`] - Position, orientation, velocity of rigid bodies
//! - [`MassProperties`] - Mass and inertia, with world-space inverse inertia
//! - [`SimulationConfig`] / [`SolverConfig`] - Timestep and solver tunables
//! - [`SimError`] - Registration, configuration and divergence errors
//!
//! # Design Philosophy
//!
//! These types are **pure data**. They hold no collision or solver logic.
//! Handles replace references between bodies, colliders and constraints, so
//! no type here borrows another.
//!
//! # Coordinate System
//!
//! Consistent with the CortenForge ecosystem:
//!
//! - X: right
//! - Y: forward
//! - Z: up
//! - Right-handed
//!
//! # Example
//!
//! ```
//! use sim_types::{RigidBodyState, Pose, Twist};
//! use nalgebra::Point3;
//!
//! // Create a body at rest one meter above the origin
//! let state = RigidBodyState::new(
//!     Pose::from_position(Point3::new(0.0, 0.0, 1.0)),
//!     Twist::zero(),
//! );
//!
//! assert_eq!(state.pose.position.z, 1.0);
//! assert!(state.twist.linear.norm() < 1e-10);
//! ```

#![doc(html_root_url = "https://docs.rs/sim-types/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
// Allow certain clippy lints that are overly pedantic for type definitions
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,       // usize to f64 is fine for counts
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod body;
mod config;
mod dynamics;
mod error;

pub use body::{BodyHandle, ColliderHandle, MassProperties, Pose, RigidBodyState, Twist};
pub use config::{IntegrationMethod, SimulationConfig, SolverConfig};
pub use dynamics::{ExternalForce, Gravity};
pub use error::SimError;

// Re-export math types for convenience
pub use nalgebra::{Isometry3, Matrix3, Point3, UnitQuaternion, Vector3};

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_rigid_body_state() {
        let pose = Pose::from_position(Point3::new(1.0, 2.0, 3.0));
        let twist = Twist::new(Vector3::new(1.0, 0.0, 0.0), Vector3::zeros());
        let state = RigidBodyState::new(pose, twist);

        assert_eq!(state.pose.position.x, 1.0);
        assert_eq!(state.twist.linear.x, 1.0);
        assert!(state.is_finite());
    }

    #[test]
    fn test_pose_transform() {
        let pose = Pose::from_position_rotation(
            Point3::new(1.0, 0.0, 0.0),
            UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2),
        );

        // After a quarter turn about Z, local (1,0,0) points along +Y,
        // then the translation adds (1,0,0).
        let world = pose.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert!((world.x - 1.0).abs() < 1e-10);
        assert!((world.y - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_non_finite_state_detected() {
        let mut state = RigidBodyState::default();
        state.twist.linear.z = f64::NAN;
        assert!(!state.is_finite());
    }
}
