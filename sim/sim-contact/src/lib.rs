//! Contact constraints and the sequential-impulse solver.
//!
//! This crate turns narrow-phase contacts into velocity corrections:
//!
//! - [`ContactData`] - Contact points, unit normal and depth for one pair
//! - [`ContactConstraint`] - Jacobian, inverse mass matrix, effective mass and
//!   one Gauss-Seidel update for a single contact
//! - [`SolverBody`] - The solver's view of a body (velocity, inverse mass,
//!   world inverse inertia, pending forces)
//! - [`SequentialImpulseSolver`] - Fixed-pass projected Gauss-Seidel over all
//!   constraints, with early exit once every update is negligible
//!
//! # Contact Model
//!
//! Each contact is a single inequality constraint on the separation along
//! the normal. The solver drives the relative normal velocity towards a bias
//!
//! ```text
//! J v⁺ = β · penetration / Δt - e · J v⁻
//! ```
//!
//! where `β` is the Baumgarte factor, `e` the restitution coefficient and
//! `penetration` the depth beyond the allowed slop. The accumulated normal
//! impulse is clamped to `[0, ∞)`, so contacts can push but never pull.
//!
//! # Example
//!
//! ```
//! use sim_contact::{ContactConstraint, ContactData, SolverBody};
//! use sim_types::ColliderHandle;
//! use nalgebra::{Matrix3, Matrix4, Point3, Vector3};
//!
//! let floor = SolverBody::fixed(Point3::origin());
//! let crate_box = SolverBody::dynamic(Point3::new(0.0, 0.0, 1.0), 2.0, Matrix3::identity());
//!
//! let contact = ContactData::new(
//!     [Point3::new(0.0, 0.0, 0.5), Point3::new(0.0, 0.0, -0.5)],
//!     [Point3::new(0.0, 0.0, 0.5), Point3::new(0.0, 0.0, 0.49)],
//!     Vector3::z(),
//!     0.01,
//!     [Matrix4::identity(), Matrix4::identity()],
//! );
//!
//! let constraint = ContactConstraint::new(
//!     ColliderHandle::new(0),
//!     ColliderHandle::new(1),
//!     contact,
//!     &floor,
//!     &crate_box,
//!     0.0,
//! );
//!
//! // Only the box can move, and the contact is right below its center.
//! assert!((constraint.effective_mass() - 0.5).abs() < 1e-12);
//! ```

#![doc(html_root_url = "https://docs.rs/sim-contact/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn)]

mod constraint;
mod contact;
mod solver;

pub use constraint::{ContactConstraint, InverseMassMatrix, Jacobian, PairVector, Vector6};
pub use contact::ContactData;
pub use solver::{Mobility, SequentialImpulseSolver, SolveReport, SolverBody};

// Re-export types needed to build constraints
pub use sim_types::{ColliderHandle, SolverConfig};

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

    /// Two free unit boxes meeting head-on along X.
    fn head_on() -> (Vec<SolverBody>, Vec<ContactConstraint>) {
        let mut bodies = vec![
            SolverBody::dynamic(Point3::new(-0.5, 0.0, 0.0), 1.0, Matrix3::identity() * 6.0),
            SolverBody::dynamic(Point3::new(0.5, 0.0, 0.0), 1.0, Matrix3::identity() * 6.0),
        ];
        bodies[0].linear_velocity = Vector3::new(2.0, 0.0, 0.0);
        bodies[1].linear_velocity = Vector3::new(-2.0, 0.0, 0.0);

        let contact = ContactData::new(
            [Point3::new(0.5, 0.0, 0.0), Point3::new(-0.5, 0.0, 0.0)],
            [Point3::origin(), Point3::origin()],
            Vector3::x(),
            0.0,
            [
                Matrix4::new_translation(&Vector3::new(-0.5, 0.0, 0.0)),
                Matrix4::new_translation(&Vector3::new(0.5, 0.0, 0.0)),
            ],
        );
        let constraints = vec![ContactConstraint::new(
            ColliderHandle::new(0),
            ColliderHandle::new(1),
            contact,
            &bodies[0],
            &bodies[1],
            1.0,
        )];
        (bodies, constraints)
    }

    #[test]
    fn test_inelastic_collision_conserves_momentum() {
        let (mut bodies, mut constraints) = head_on();
        let contact = *constraints[0].contact();
        constraints[0].refresh(contact, &bodies[0], &bodies[1], 0.0);

        let mut solver = SequentialImpulseSolver::new(SolverConfig::default());
        solver.solve(&mut constraints, &mut bodies, 1.0 / 60.0);

        let momentum = bodies[0].linear_velocity + bodies[1].linear_velocity;
        assert_relative_eq!(momentum, Vector3::zeros(), epsilon = 1e-9);
        assert_relative_eq!(bodies[0].linear_velocity.x, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_elastic_collision_reverses_velocities() {
        let (mut bodies, mut constraints) = head_on();
        let mut solver = SequentialImpulseSolver::new(SolverConfig::default());
        solver.solve(&mut constraints, &mut bodies, 1.0 / 60.0);

        assert_relative_eq!(bodies[0].linear_velocity.x, -2.0, epsilon = 1e-9);
        assert_relative_eq!(bodies[1].linear_velocity.x, 2.0, epsilon = 1e-9);
        assert_eq!(bodies[0].angular_velocity, Vector3::zeros());
    }
}
