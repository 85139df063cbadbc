//! Simulation stepping and control flow.
//!
//! The [`Stepper`] drives a [`World`] at its configured fixed timestep,
//! applying any externally submitted forces before each tick.
//!
//! # Example
//!
//! ```
//! use sim_core::{Collider, ColliderKind, CollisionShape, RigidBody, Stepper, World};
//! use sim_types::{MassProperties, Pose, SimulationConfig};
//! use nalgebra::{Point3, Vector3};
//!
//! let mut world = World::new(SimulationConfig::default()).unwrap();
//! let body = world
//!     .register_body(RigidBody::at_rest(
//!         Pose::from_position(Point3::new(0.0, 0.0, 10.0)),
//!         MassProperties::box_shape(1.0, Vector3::repeat(0.5)),
//!     ))
//!     .unwrap();
//! world
//!     .register_collider(
//!         Collider::new(CollisionShape::cube(0.5), ColliderKind::Dynamic).attached_to(body),
//!     )
//!     .unwrap();
//!
//! let mut stepper = Stepper::new();
//! let reports = stepper.run(&mut world, 60).unwrap();
//! assert_eq!(reports.len(), 60);
//!
//! // One second of free fall
//! let z = world.body(body).unwrap().state.pose.position.z;
//! assert!(z < 6.0);
//! ```

use sim_types::{ExternalForce, SimError};

use crate::world::World;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What happened during one world tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TickReport {
    /// Simulation time at the end of the tick.
    pub time: f64,
    /// Bodies advanced by the integrator (static bodies excluded).
    pub bodies_integrated: usize,
    /// Collider pairs run through GJK.
    pub pairs_tested: usize,
    /// Pairs GJK found overlapping.
    pub gjk_hits: usize,
    /// Overlaps EPA turned into a contact.
    pub contacts: usize,
    /// Constraints created for newly overlapping pairs.
    pub constraints_created: usize,
    /// Constraints carried over from the previous tick.
    pub constraints_reused: usize,
    /// Constraints whose pair stopped overlapping.
    pub constraints_dropped: usize,
    /// Solver passes run.
    pub solver_passes: usize,
    /// Constraints that had converged when the solver stopped early.
    pub constraints_pruned: usize,
}

impl TickReport {
    /// Constraints alive after the tick.
    #[must_use]
    pub fn active_constraints(&self) -> usize {
        self.constraints_created + self.constraints_reused
    }
}

/// Fixed-timestep driver for a [`World`].
#[derive(Debug, Clone, Default)]
pub struct Stepper {
    /// Forces to apply before the next tick.
    pending_forces: Vec<ExternalForce>,
}

impl Stepper {
    /// Create a new stepper.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a force for the next step only.
    pub fn submit_force(&mut self, force: ExternalForce) {
        self.pending_forces.push(force);
    }

    /// Queue several forces for the next step only.
    pub fn submit_forces(&mut self, forces: impl IntoIterator<Item = ExternalForce>) {
        self.pending_forces.extend(forces);
    }

    /// Drop all queued forces.
    pub fn clear_forces(&mut self) {
        self.pending_forces.clear();
    }

    /// Number of queued forces.
    #[must_use]
    pub fn pending_force_count(&self) -> usize {
        self.pending_forces.len()
    }

    /// Execute one simulation step of `world.timestep()`.
    ///
    /// Queued forces are applied first and consumed by the tick's
    /// integration. Either all of them are applied or, if any references an
    /// unknown body, none are and the queue is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A queued force references an unknown body
    /// - The world diverges (`NaN` or `Inf` state) during the tick
    pub fn step(&mut self, world: &mut World) -> sim_types::Result<TickReport> {
        if let Some(force) = self.pending_forces.iter().find(|f| world.body(f.body).is_none()) {
            return Err(SimError::InvalidBodyHandle(force.body.index()));
        }

        for force in self.pending_forces.drain(..) {
            world.apply_external_force(&force)?;
        }
        world.update(world.timestep())
    }

    /// Run a fixed number of steps.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails (divergence or invalid force).
    pub fn run(&mut self, world: &mut World, steps: usize) -> sim_types::Result<Vec<TickReport>> {
        let mut reports = Vec::with_capacity(steps);
        for _ in 0..steps {
            reports.push(self.step(world)?);
        }
        Ok(reports)
    }

    /// Run for a specific duration of simulated time.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails (divergence or invalid force).
    pub fn run_for(
        &mut self,
        world: &mut World,
        duration: f64,
    ) -> sim_types::Result<Vec<TickReport>> {
        let target_time = world.time() + duration;
        let dt = world.timestep();
        // Safe cast: duration and dt are positive, result is bounded
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let estimated_steps = (duration / dt).ceil().max(1.0) as usize;
        let mut reports = Vec::with_capacity(estimated_steps);

        for _ in 0..estimated_steps {
            // Half-step slack absorbs accumulated rounding in `time`
            if world.time() + 0.5 * dt >= target_time {
                break;
            }
            reports.push(self.step(world)?);
        }

        Ok(reports)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::{Collider, ColliderKind, CollisionShape, RigidBody};
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};
    use sim_types::{BodyHandle, MassProperties, Pose, SimulationConfig};

    fn floating_world() -> (World, BodyHandle) {
        let mut world = World::new(SimulationConfig::default().zero_gravity()).unwrap();
        let body = world
            .register_body(RigidBody::at_rest(
                Pose::identity(),
                MassProperties::box_shape(2.0, Vector3::repeat(0.5)),
            ))
            .unwrap();
        world
            .register_collider(
                Collider::new(CollisionShape::cube(0.5), ColliderKind::Dynamic).attached_to(body),
            )
            .unwrap();
        (world, body)
    }

    #[test]
    fn test_run_advances_time() {
        let (mut world, _) = floating_world();
        let mut stepper = Stepper::new();

        let reports = stepper.run(&mut world, 30).unwrap();

        assert_eq!(reports.len(), 30);
        assert_relative_eq!(world.time(), 0.5, epsilon = 1e-12);
        assert_relative_eq!(reports[29].time, 0.5, epsilon = 1e-12);
        assert!(reports.iter().all(|r| r.bodies_integrated == 1));
    }

    #[test]
    fn test_run_for_duration() {
        let (mut world, _) = floating_world();
        let mut stepper = Stepper::new();

        let reports = stepper.run_for(&mut world, 1.0).unwrap();

        assert_eq!(reports.len(), 60);
        assert_relative_eq!(world.time(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_submitted_force_applies_once() {
        let (mut world, body) = floating_world();
        let mut stepper = Stepper::new();

        stepper.submit_force(ExternalForce::at_com(body, Vector3::new(120.0, 0.0, 0.0)));
        assert_eq!(stepper.pending_force_count(), 1);

        stepper.step(&mut world).unwrap();
        assert_eq!(stepper.pending_force_count(), 0);

        // a = F/m = 60, for one 1/60 s step
        let v = world.body(body).unwrap().state.twist.linear.x;
        assert_relative_eq!(v, 1.0, epsilon = 1e-12);

        stepper.step(&mut world).unwrap();
        let v = world.body(body).unwrap().state.twist.linear.x;
        assert_relative_eq!(v, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_force_on_unknown_body_fails() {
        let (mut world, _) = floating_world();
        let mut stepper = Stepper::new();

        stepper.submit_forces([ExternalForce::at_com(BodyHandle::new(9), Vector3::x())]);
        let err = stepper.step(&mut world).unwrap_err();
        assert_eq!(err, SimError::InvalidBodyHandle(9));
    }

    #[test]
    fn test_bad_force_batch_applies_nothing() {
        let (mut world, body) = floating_world();
        let mut stepper = Stepper::new();

        stepper.submit_forces([
            ExternalForce::at_com(body, Vector3::new(120.0, 0.0, 0.0)),
            ExternalForce::at_com(BodyHandle::new(4), Vector3::x()),
            ExternalForce::torque_only(body, Vector3::z()),
        ]);

        let err = stepper.step(&mut world).unwrap_err();
        assert_eq!(err, SimError::InvalidBodyHandle(4));

        // Nothing reached the valid body, and the batch is still queued
        let state = world.body(body).unwrap();
        assert_eq!(state.accumulated_force, Vector3::zeros());
        assert_eq!(state.accumulated_torque, Vector3::zeros());
        assert_eq!(stepper.pending_force_count(), 3);
        assert_eq!(world.step_count(), 0);

        stepper.clear_forces();
        stepper.step(&mut world).unwrap();
        assert_eq!(world.body(body).unwrap().state.twist.linear, Vector3::zeros());
    }

    #[test]
    fn test_clear_forces() {
        let (mut world, body) = floating_world();
        let mut stepper = Stepper::new();

        stepper.submit_force(ExternalForce::at_com(body, Vector3::x()));
        stepper.clear_forces();
        stepper.step(&mut world).unwrap();

        assert_eq!(
            world.body(body).unwrap().state.pose.position,
            Point3::origin()
        );
    }

    #[test]
    fn test_active_constraints() {
        let report = TickReport {
            constraints_created: 2,
            constraints_reused: 3,
            ..TickReport::default()
        };
        assert_eq!(report.active_constraints(), 5);
    }
}
