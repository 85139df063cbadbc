//! Sequential-impulse (projected Gauss-Seidel) contact solver.
//!
//! Each pass visits every active constraint in order and applies its impulse
//! delta to both bodies immediately, so later constraints in the same pass
//! see the partially corrected velocities. Visiting order is the order of the
//! constraint slice and never changes within a solve.
//!
//! # Per-pass bookkeeping
//!
//! At the start of a pass the body velocities are snapshotted and a
//! per-collider accumulator `a` (velocity change per unit time, 6-vector) is
//! zeroed. A constraint's update reads the snapshot plus the accumulators of
//! its two colliders, which together equal the bodies' current velocities:
//!
//! ```text
//! v_current = v_snapshot + Δt · a
//! ```
//!
//! Once every active constraint's |Δλ| stays below the configured
//! convergence threshold for a full pass, the remaining passes are skipped
//! and those constraints count as pruned. Constraints are never skipped
//! individually.

use nalgebra::{Matrix3, Point3, Vector3};
use sim_types::SolverConfig;
use tracing::{debug, trace};

use crate::{constraint::Vector6, ContactConstraint};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a body takes part in contact resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Mobility {
    /// Never moves. Its Jacobian block is zero.
    #[default]
    Static,
    /// Moves with a prescribed velocity that contacts cannot change.
    Kinematic,
    /// Fully simulated.
    Dynamic,
}

/// The solver's view of the body behind one collider slot.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverBody {
    /// Participation in contact resolution.
    pub mobility: Mobility,
    /// World-space center of mass.
    pub center: Point3<f64>,
    /// Linear velocity (m/s).
    pub linear_velocity: Vector3<f64>,
    /// Angular velocity (rad/s).
    pub angular_velocity: Vector3<f64>,
    /// Inverse mass (0 unless dynamic).
    pub inverse_mass: f64,
    /// World-space inverse inertia (0 unless dynamic).
    pub inverse_inertia: Matrix3<f64>,
    /// External force still pending at solve time (N).
    pub force: Vector3<f64>,
    /// External torque still pending at solve time (N·m).
    pub torque: Vector3<f64>,
}

impl SolverBody {
    /// An immovable body.
    #[must_use]
    pub fn fixed(center: Point3<f64>) -> Self {
        Self {
            mobility: Mobility::Static,
            center,
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            inverse_mass: 0.0,
            inverse_inertia: Matrix3::zeros(),
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
        }
    }

    /// A body moving with a prescribed velocity.
    #[must_use]
    pub fn kinematic(center: Point3<f64>, linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        Self {
            mobility: Mobility::Kinematic,
            linear_velocity: linear,
            angular_velocity: angular,
            ..Self::fixed(center)
        }
    }

    /// A dynamic body at rest with the given mass and world inverse inertia.
    #[must_use]
    pub fn dynamic(center: Point3<f64>, mass: f64, inverse_inertia: Matrix3<f64>) -> Self {
        Self {
            mobility: Mobility::Dynamic,
            inverse_mass: if mass > 0.0 { 1.0 / mass } else { 0.0 },
            inverse_inertia,
            ..Self::fixed(center)
        }
    }

    /// Stacked `[linear, angular]` velocity.
    #[must_use]
    pub fn velocity(&self) -> Vector6 {
        stack3(&self.linear_velocity, &self.angular_velocity)
    }

    /// Stacked `[force, torque]`. Zero unless dynamic.
    #[must_use]
    pub fn external_wrench(&self) -> Vector6 {
        if self.mobility == Mobility::Dynamic {
            stack3(&self.force, &self.torque)
        } else {
            Vector6::zeros()
        }
    }

    /// Whether impulses change this body's velocity.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.mobility == Mobility::Dynamic
    }

    /// Apply a velocity change per unit time over `dt`.
    fn apply(&mut self, accel: &Vector6, dt: f64) {
        if !self.is_dynamic() {
            return;
        }
        self.linear_velocity += accel.fixed_rows::<3>(0) * dt;
        self.angular_velocity += accel.fixed_rows::<3>(3) * dt;
    }
}

fn stack3(a: &Vector3<f64>, b: &Vector3<f64>) -> Vector6 {
    Vector6::new(a.x, a.y, a.z, b.x, b.y, b.z)
}

/// Statistics of one solve.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolveReport {
    /// Passes actually run (less than configured if all constraints pruned).
    pub passes: usize,
    /// Constraints pruned as converged before the pass limit.
    pub pruned: usize,
    /// Sum of accumulated normal impulses at the end of the solve.
    pub total_impulse: f64,
    /// Largest |Δλ| seen in the final pass.
    pub max_delta: f64,
}

/// Sequential-impulse contact solver.
///
/// # Example
///
/// ```
/// use sim_contact::{ContactConstraint, ContactData, SequentialImpulseSolver, SolverBody};
/// use sim_types::{ColliderHandle, SolverConfig};
/// use nalgebra::{Matrix3, Matrix4, Point3, Vector3};
///
/// // A unit box falling onto a fixed floor, touching at its bottom face.
/// let contact = ContactData::new(
///     [Point3::new(0.0, 0.0, 0.5), Point3::new(0.0, 0.0, -0.5)],
///     [Point3::new(0.0, 0.0, 0.5), Point3::new(0.0, 0.0, 0.5)],
///     Vector3::z(),
///     0.0,
///     [Matrix4::identity(), Matrix4::identity()],
/// );
/// let mut bodies = vec![
///     SolverBody::fixed(Point3::origin()),
///     SolverBody::dynamic(Point3::new(0.0, 0.0, 1.0), 1.0, Matrix3::identity()),
/// ];
/// bodies[1].linear_velocity = Vector3::new(0.0, 0.0, -1.0);
///
/// let mut constraints = vec![ContactConstraint::new(
///     ColliderHandle::new(0),
///     ColliderHandle::new(1),
///     contact,
///     &bodies[0],
///     &bodies[1],
///     0.0,
/// )];
///
/// let mut solver = SequentialImpulseSolver::new(SolverConfig::default());
/// solver.solve(&mut constraints, &mut bodies, 1.0 / 60.0);
///
/// assert!(bodies[1].linear_velocity.z.abs() < 1e-9);
/// assert_eq!(bodies[0].linear_velocity, Vector3::zeros());
/// ```
#[derive(Debug, Clone)]
pub struct SequentialImpulseSolver {
    config: SolverConfig,
    accel: Vec<Vector6>,
    snapshot: Vec<Vector6>,
    active: Vec<bool>,
}

impl SequentialImpulseSolver {
    /// Create a solver with the given configuration.
    #[must_use]
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            accel: Vec::new(),
            snapshot: Vec::new(),
            active: Vec::new(),
        }
    }

    /// Get the solver configuration.
    #[must_use]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Replace the solver configuration.
    pub fn set_config(&mut self, config: SolverConfig) {
        self.config = config;
    }

    /// Resolve all constraints, updating `bodies` velocities in place.
    ///
    /// `bodies` is indexed by collider slot. Every constraint's colliders
    /// must index into it; constraints that do not are skipped.
    pub fn solve(
        &mut self,
        constraints: &mut [ContactConstraint],
        bodies: &mut [SolverBody],
        dt: f64,
    ) -> SolveReport {
        let mut report = SolveReport::default();
        if constraints.is_empty() || !(dt > 0.0 && dt.is_finite()) {
            return report;
        }

        self.active.clear();
        for constraint in constraints.iter_mut() {
            let (a, b) = (constraint.collider_a.index(), constraint.collider_b.index());
            let in_range = a < bodies.len() && b < bodies.len() && a != b;
            if in_range {
                constraint.prepare(&bodies[a], &bodies[b], &self.config, dt);
            }
            self.active.push(in_range && constraint.is_active());
        }

        if self.config.initial_impulse > 0.0 {
            for (constraint, _) in constraints
                .iter()
                .zip(&self.active)
                .filter(|(_, active)| **active)
            {
                let impulse = constraint.accumulated_impulse();
                let (a, b) = (constraint.collider_a.index(), constraint.collider_b.index());
                bodies[a].apply(&constraint.response_a(impulse), dt);
                bodies[b].apply(&constraint.response_b(impulse), dt);
            }
        }

        self.accel.resize(bodies.len(), Vector6::zeros());

        for pass in 0..self.config.constraint_solver_iterations {
            self.snapshot.clear();
            self.snapshot.extend(bodies.iter().map(SolverBody::velocity));
            self.accel.fill(Vector6::zeros());

            let mut max_delta = 0.0_f64;
            for (index, constraint) in constraints.iter_mut().enumerate() {
                if !self.active[index] {
                    continue;
                }
                let (a, b) = (constraint.collider_a.index(), constraint.collider_b.index());

                let delta = constraint.solve(
                    &bodies[a],
                    &bodies[b],
                    &self.snapshot[a],
                    &self.snapshot[b],
                    &self.accel[a],
                    &self.accel[b],
                    dt,
                );

                let response_a = constraint.response_a(delta);
                let response_b = constraint.response_b(delta);
                self.accel[a] += response_a;
                self.accel[b] += response_b;
                bodies[a].apply(&response_a, dt);
                bodies[b].apply(&response_b, dt);

                max_delta = max_delta.max(delta.abs());
            }

            report.passes += 1;
            report.max_delta = max_delta;
            trace!(pass, max_delta, "Solver pass complete");

            if max_delta < self.config.convergence_threshold {
                report.pruned = self.active.iter().filter(|active| **active).count();
                debug!(
                    passes = report.passes,
                    pruned = report.pruned,
                    "Contact constraints converged"
                );
                break;
            }
        }

        report.total_impulse = constraints
            .iter()
            .map(ContactConstraint::accumulated_impulse)
            .sum();
        report
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::ContactData;
    use approx::assert_relative_eq;
    use nalgebra::Matrix4;
    use sim_types::ColliderHandle;

    const DT: f64 = 1.0 / 60.0;

    /// Contact between a body below (A) and a body above (B) at height `z`.
    fn stacked_contact(z: f64, depth: f64) -> ContactData {
        ContactData::new(
            [Point3::new(0.0, 0.0, 0.5), Point3::new(0.0, 0.0, -0.5)],
            [Point3::new(0.0, 0.0, z), Point3::new(0.0, 0.0, z - depth)],
            Vector3::z(),
            depth,
            [Matrix4::identity(), Matrix4::identity()],
        )
    }

    fn unit_box(z: f64) -> SolverBody {
        SolverBody::dynamic(Point3::new(0.0, 0.0, z), 1.0, Matrix3::identity() * 6.0)
    }

    fn constraint(
        a: usize,
        b: usize,
        contact: ContactData,
        bodies: &[SolverBody],
    ) -> ContactConstraint {
        ContactConstraint::new(
            ColliderHandle::new(a),
            ColliderHandle::new(b),
            contact,
            &bodies[a],
            &bodies[b],
            0.0,
        )
    }

    #[test]
    fn test_empty_constraints() {
        let mut solver = SequentialImpulseSolver::new(SolverConfig::default());
        let report = solver.solve(&mut [], &mut [], DT);
        assert_eq!(report, SolveReport::default());
    }

    #[test]
    fn test_static_body_never_moves() {
        let mut bodies = vec![SolverBody::fixed(Point3::origin()), unit_box(1.0)];
        bodies[1].linear_velocity = Vector3::new(0.3, 0.0, -2.0);
        bodies[1].angular_velocity = Vector3::new(0.0, 1.0, 0.0);

        let mut contact = stacked_contact(0.5, 0.02);
        contact.world_b.x = 0.4;
        let mut constraints = vec![constraint(0, 1, contact, &bodies)];

        let mut solver = SequentialImpulseSolver::new(
            SolverConfig::default().iterations(1, 50),
        );
        solver.solve(&mut constraints, &mut bodies, DT);

        assert_eq!(bodies[0].linear_velocity, Vector3::zeros());
        assert_eq!(bodies[0].angular_velocity, Vector3::zeros());
        assert!(bodies[1].linear_velocity.z > -2.0);
    }

    #[test]
    fn test_kinematic_body_keeps_velocity() {
        let mut bodies = vec![
            SolverBody::kinematic(Point3::origin(), Vector3::new(0.0, 0.0, 1.0), Vector3::zeros()),
            unit_box(1.0),
        ];
        let mut constraints = vec![constraint(0, 1, stacked_contact(0.5, 0.0), &bodies)];

        let mut solver = SequentialImpulseSolver::new(SolverConfig::default());
        solver.solve(&mut constraints, &mut bodies, DT);

        assert_eq!(bodies[0].linear_velocity, Vector3::new(0.0, 0.0, 1.0));
        // The box is pushed up to at least the platform's speed.
        assert!(bodies[1].linear_velocity.z >= 1.0 - 1e-9);
    }

    #[test]
    fn test_impulse_never_negative() {
        let mut bodies = vec![SolverBody::fixed(Point3::origin()), unit_box(1.0)];
        bodies[1].linear_velocity = Vector3::new(0.0, 0.0, -3.0);
        bodies[1].force = Vector3::new(0.0, 0.0, 40.0);
        let mut constraints = vec![constraint(0, 1, stacked_contact(0.5, 0.05), &bodies)];

        let config = SolverConfig {
            convergence_threshold: 0.0,
            ..SolverConfig::default()
        };
        let mut solver = SequentialImpulseSolver::new(config);
        for _ in 0..20 {
            solver.solve(&mut constraints, &mut bodies, DT);
            assert!(constraints[0].accumulated_impulse() >= 0.0);
        }
    }

    #[test]
    fn test_stack_shares_bodies() {
        // floor, lower box, upper box; upper falls onto lower.
        let mut bodies = vec![SolverBody::fixed(Point3::origin()), unit_box(1.0), unit_box(2.0)];
        bodies[2].linear_velocity = Vector3::new(0.0, 0.0, -1.0);

        let mut constraints = vec![
            constraint(0, 1, stacked_contact(0.5, 0.0), &bodies),
            constraint(1, 2, stacked_contact(1.5, 0.0), &bodies),
        ];

        let mut solver = SequentialImpulseSolver::new(
            SolverConfig::default().iterations(1, 30),
        );
        let report = solver.solve(&mut constraints, &mut bodies, DT);

        // Neither contact may still be approaching.
        assert!(bodies[1].linear_velocity.z >= -1e-6);
        assert!(bodies[2].linear_velocity.z - bodies[1].linear_velocity.z >= -1e-6);
        assert!(report.passes >= 2);
        assert!(report.total_impulse > 0.0);
    }

    #[test]
    fn test_separating_pair_pruned_immediately() {
        let mut bodies = vec![SolverBody::fixed(Point3::origin()), unit_box(1.0)];
        bodies[1].linear_velocity = Vector3::new(0.0, 0.0, 5.0);
        let mut constraints = vec![constraint(0, 1, stacked_contact(0.5, 0.01), &bodies)];

        let mut solver = SequentialImpulseSolver::new(SolverConfig::default());
        let report = solver.solve(&mut constraints, &mut bodies, DT);

        assert_eq!(report.passes, 1);
        assert_eq!(report.pruned, 1);
        assert_relative_eq!(bodies[1].linear_velocity.z, 5.0);
    }

    #[test]
    fn test_initial_impulse_warm_start() {
        let mut bodies = vec![SolverBody::fixed(Point3::origin()), unit_box(1.0)];
        let mut constraints = vec![constraint(0, 1, stacked_contact(0.5, 0.0), &bodies)];

        let config = SolverConfig {
            initial_impulse: 6.0,
            ..SolverConfig::default().iterations(1, 1)
        };
        let mut solver = SequentialImpulseSolver::new(config);
        solver.solve(&mut constraints, &mut bodies, DT);

        // The warm start alone pushes the resting box up by λ₀ · Δt / m.
        assert!(bodies[1].linear_velocity.z > 0.0);
        assert_relative_eq!(bodies[1].linear_velocity.z, 6.0 * DT, epsilon = 1e-9);
    }

    #[test]
    fn test_deterministic() {
        let run = || {
            let mut bodies = vec![SolverBody::fixed(Point3::origin()), unit_box(1.0), unit_box(2.0)];
            bodies[1].linear_velocity = Vector3::new(0.1, 0.0, -0.7);
            bodies[2].linear_velocity = Vector3::new(-0.2, 0.3, -1.3);
            bodies[2].angular_velocity = Vector3::new(0.5, 0.0, 0.1);

            let mut contact = stacked_contact(1.5, 0.03);
            contact.world_a.x = 0.3;
            contact.world_b.x = 0.3;
            let mut constraints = vec![
                constraint(0, 1, stacked_contact(0.5, 0.01), &bodies),
                constraint(1, 2, contact, &bodies),
            ];
            let mut solver = SequentialImpulseSolver::new(SolverConfig::default());
            solver.solve(&mut constraints, &mut bodies, DT);
            bodies
        };

        let first = run();
        let second = run();
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.linear_velocity, b.linear_velocity);
            assert_eq!(a.angular_velocity, b.angular_velocity);
        }
    }

    #[test]
    fn test_invalid_slots_skipped() {
        let mut bodies = vec![unit_box(1.0)];
        let contact = stacked_contact(0.5, 0.01);
        let mut constraints = vec![ContactConstraint::new(
            ColliderHandle::new(0),
            ColliderHandle::new(3),
            contact,
            &bodies[0],
            &SolverBody::fixed(Point3::origin()),
            0.0,
        )];

        let mut solver = SequentialImpulseSolver::new(SolverConfig::default());
        let report = solver.solve(&mut constraints, &mut bodies, DT);
        assert_eq!(report.pruned, 0);
        assert_eq!(bodies[0].linear_velocity, Vector3::zeros());
    }
}
