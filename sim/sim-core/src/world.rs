//! The simulation world: bodies, colliders and contact constraints.
//!
//! Each call to [`World::update`] runs one tick in a fixed order:
//!
//! 1. **Integrate** every body with the configured method and refresh the
//!    collider transforms.
//! 2. **Detect** overlaps between every pair of colliders with GJK, extract a
//!    contact with EPA, and create or refresh one constraint per pair.
//!    Constraints of pairs that stopped overlapping are dropped.
//! 3. **Solve** all constraints with the sequential-impulse solver and write
//!    the corrected velocities back to the bodies.
//!
//! Bodies, colliders and constraints live in dense arrays. Handles are slot
//! indices and stay valid for the lifetime of the world.

use std::fmt;

use hashbrown::HashMap;
use nalgebra::Vector3;
use sim_contact::{ContactConstraint, ContactData, SequentialImpulseSolver, SolverBody};
use sim_types::{
    BodyHandle, ColliderHandle, ExternalForce, Pose, SimError, SimulationConfig, Twist,
};
use tracing::{debug, info, warn};

use crate::body::{Collider, ColliderKind, RigidBody};
use crate::debug::{DebugSink, NullDebugSink};
use crate::gjk_epa::{epa_contact_with, gjk_intersection_with};
use crate::integrators::step_body;
use crate::stepper::TickReport;

/// Ordered collider pair identifying a constraint.
type PairKey = (ColliderHandle, ColliderHandle);

/// The simulation world containing all entities.
pub struct World {
    /// Simulation configuration.
    config: SimulationConfig,
    /// Current simulation time.
    time: f64,
    /// Step counter.
    step_count: u64,
    bodies: Vec<RigidBody>,
    colliders: Vec<Collider>,
    /// Collider attached to each body, if any.
    body_colliders: HashMap<BodyHandle, ColliderHandle>,
    /// Constraints in solve order.
    constraints: Vec<ContactConstraint>,
    /// Position of each pair's constraint in `constraints`.
    constraint_index: HashMap<PairKey, usize>,
    solver: SequentialImpulseSolver,
    /// Solver view of each collider slot, rebuilt every tick.
    solver_bodies: Vec<SolverBody>,
    debug_sink: Box<dyn DebugSink>,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("config", &self.config)
            .field("time", &self.time)
            .field("step_count", &self.step_count)
            .field("bodies", &self.bodies.len())
            .field("colliders", &self.colliders.len())
            .field("constraints", &self.constraints.len())
            .finish_non_exhaustive()
    }
}

impl World {
    /// Create a new empty world with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: SimulationConfig) -> sim_types::Result<Self> {
        config.validate()?;

        Ok(Self {
            solver: SequentialImpulseSolver::new(config.solver),
            config,
            time: 0.0,
            step_count: 0,
            bodies: Vec::new(),
            colliders: Vec::new(),
            body_colliders: HashMap::new(),
            constraints: Vec::new(),
            constraint_index: HashMap::new(),
            solver_bodies: Vec::new(),
            debug_sink: Box::new(NullDebugSink),
        })
    }

    /// Get the simulation configuration.
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Replace the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid; the old one is kept.
    pub fn set_config(&mut self, config: SimulationConfig) -> sim_types::Result<()> {
        config.validate()?;
        self.solver.set_config(config.solver);
        self.config = config;
        Ok(())
    }

    /// Get the current simulation time.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Get the step count.
    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Get the timestep from configuration.
    #[must_use]
    pub fn timestep(&self) -> f64 {
        self.config.timestep
    }

    /// Route collision debug data to `sink`, returning the previous sink.
    pub fn set_debug_sink(&mut self, sink: Box<dyn DebugSink>) -> Box<dyn DebugSink> {
        std::mem::replace(&mut self.debug_sink, sink)
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Add a body and return its handle.
    ///
    /// The body is dynamic until a collider attached to it says otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the body state is not finite or its mass
    /// properties are invalid.
    pub fn register_body(&mut self, body: RigidBody) -> sim_types::Result<BodyHandle> {
        if !body.state.is_finite() {
            warn!("Rejected body with non-finite state");
            return Err(SimError::invalid_config("body state must be finite"));
        }
        if let Err(err) = body.mass_props().validate() {
            warn!(error = %err, "Rejected body");
            return Err(err);
        }

        let handle = BodyHandle::new(self.bodies.len());
        self.bodies.push(body);
        info!(body = %handle, total = self.bodies.len(), "Registered body");
        Ok(handle)
    }

    /// Add a collider and return its handle.
    ///
    /// Dynamic and kinematic colliders must be attached to a body with
    /// positive, finite mass. A body takes the kind of its collider.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The shape, scale, offset or restitution is invalid
    /// - The owning body does not exist or already has a collider
    /// - A dynamic or kinematic collider has no body, or its body has no mass
    pub fn register_collider(
        &mut self,
        mut collider: Collider,
    ) -> sim_types::Result<ColliderHandle> {
        if let Err(err) = self.check_collider(&collider) {
            warn!(error = %err, kind = ?collider.kind, "Rejected collider");
            return Err(err);
        }

        let handle = ColliderHandle::new(self.colliders.len());
        if let Some(body_handle) = collider.body {
            let body = &mut self.bodies[body_handle.index()];
            body.set_kind(collider.kind);
            collider.update_transform(Some(&body.state.pose));
            self.body_colliders.insert(body_handle, handle);
        } else {
            collider.update_transform(None);
        }

        info!(
            collider = %handle,
            kind = ?collider.kind,
            total = self.colliders.len() + 1,
            "Registered collider"
        );
        self.colliders.push(collider);
        Ok(handle)
    }

    fn check_collider(&self, collider: &Collider) -> sim_types::Result<()> {
        collider.validate()?;

        let Some(body_handle) = collider.body else {
            if collider.kind == ColliderKind::Static {
                return Ok(());
            }
            return Err(SimError::invalid_config(
                "dynamic and kinematic colliders need a body",
            ));
        };

        let body = self
            .bodies
            .get(body_handle.index())
            .ok_or(SimError::InvalidBodyHandle(body_handle.index()))?;

        if self.body_colliders.contains_key(&body_handle) {
            return Err(SimError::BodyAlreadyHasCollider {
                body: body_handle.index(),
            });
        }

        if collider.kind.needs_mass() && body.mass_props().is_static() {
            return Err(SimError::invalid_mass(format!(
                "{body_handle} needs positive, finite mass for a {:?} collider",
                collider.kind
            )));
        }

        Ok(())
    }

    /// Create or refresh the constraint for an ordered collider pair.
    ///
    /// Returns its position in solve order. The constraint is rebuilt from
    /// the bodies' current state. Detection on the next tick refreshes it
    /// again if the pair still overlaps and drops it otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if either handle is unknown, the handles are equal,
    /// or the contact is not valid.
    pub fn register_constraint(
        &mut self,
        a: ColliderHandle,
        b: ColliderHandle,
        contact: ContactData,
    ) -> sim_types::Result<usize> {
        for handle in [a, b] {
            if handle.index() >= self.colliders.len() {
                return Err(SimError::InvalidColliderHandle(handle.index()));
            }
        }
        if a == b {
            return Err(SimError::invalid_config(
                "a constraint needs two different colliders",
            ));
        }
        if !contact.is_valid() {
            return Err(SimError::invalid_config("contact must be finite with a unit normal"));
        }

        self.rebuild_solver_bodies();
        let restitution = self.pair_restitution(a, b);
        let (body_a, body_b) = (self.solver_bodies[a.index()], self.solver_bodies[b.index()]);

        if let Some(&index) = self.constraint_index.get(&(a, b)) {
            self.constraints[index].refresh(contact, &body_a, &body_b, restitution);
            return Ok(index);
        }

        let index = self.constraints.len();
        self.constraints
            .push(ContactConstraint::new(a, b, contact, &body_a, &body_b, restitution));
        self.constraint_index.insert((a, b), index);
        debug!(a = %a, b = %b, "Registered constraint");
        Ok(index)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get a body by handle.
    #[must_use]
    pub fn body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle.index())
    }

    /// Get a mutable reference to a body by handle.
    #[must_use]
    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle.index())
    }

    /// All bodies in registration order.
    #[must_use]
    pub fn bodies(&self) -> &[RigidBody] {
        &self.bodies
    }

    /// Get a collider by handle.
    #[must_use]
    pub fn collider(&self, handle: ColliderHandle) -> Option<&Collider> {
        self.colliders.get(handle.index())
    }

    /// All colliders in registration order.
    #[must_use]
    pub fn colliders(&self) -> &[Collider] {
        &self.colliders
    }

    /// Collider attached to a body.
    #[must_use]
    pub fn collider_of(&self, body: BodyHandle) -> Option<ColliderHandle> {
        self.body_colliders.get(&body).copied()
    }

    /// Live constraints in solve order.
    #[must_use]
    pub fn constraints(&self) -> &[ContactConstraint] {
        &self.constraints
    }

    /// Constraint for an ordered collider pair.
    #[must_use]
    pub fn constraint(&self, a: ColliderHandle, b: ColliderHandle) -> Option<&ContactConstraint> {
        self.constraint_index
            .get(&(a, b))
            .and_then(|&i| self.constraints.get(i))
    }

    /// Total kinetic energy of all dynamic bodies.
    #[must_use]
    pub fn total_kinetic_energy(&self) -> f64 {
        self.bodies.iter().map(RigidBody::kinetic_energy).sum()
    }

    /// Set a body's pose from outside the simulation.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is unknown or the pose is not finite.
    pub fn set_body_pose(&mut self, handle: BodyHandle, pose: Pose) -> sim_types::Result<()> {
        if !pose.is_finite() {
            return Err(SimError::invalid_config("pose must be finite"));
        }
        let body = self
            .bodies
            .get_mut(handle.index())
            .ok_or(SimError::InvalidBodyHandle(handle.index()))?;
        body.state.pose = pose;
        body.refresh_mass();

        if let Some(collider) = self.body_colliders.get(&handle) {
            self.colliders[collider.index()].update_transform(Some(&pose));
        }
        Ok(())
    }

    /// Set a body's twist from outside the simulation.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is unknown or the twist is not finite.
    pub fn set_body_twist(&mut self, handle: BodyHandle, twist: Twist) -> sim_types::Result<()> {
        if !twist.is_finite() {
            return Err(SimError::invalid_config("twist must be finite"));
        }
        let body = self
            .bodies
            .get_mut(handle.index())
            .ok_or(SimError::InvalidBodyHandle(handle.index()))?;
        body.state.twist = twist;
        Ok(())
    }

    /// Accumulate an external force for the next tick.
    ///
    /// # Errors
    ///
    /// Returns an error if the force references an unknown body.
    pub fn apply_external_force(&mut self, force: &ExternalForce) -> sim_types::Result<()> {
        let body = self
            .bodies
            .get_mut(force.body.index())
            .ok_or(SimError::InvalidBodyHandle(force.body.index()))?;

        match force.point {
            Some(point) => body.apply_force_at_point(force.force, point),
            None => body.apply_force(force.force),
        }
        body.apply_torque(force.torque);
        Ok(())
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Advance the world by `dt` seconds.
    ///
    /// # Errors
    ///
    /// Returns an error if `dt` is not positive and finite, or if any body
    /// ends the tick with a non-finite state.
    pub fn update(&mut self, dt: f64) -> sim_types::Result<TickReport> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(SimError::InvalidTimestep(dt));
        }

        let mut report = TickReport::default();

        self.integrate(dt, &mut report);
        self.rebuild_solver_bodies();
        self.detect(&mut report);

        if !self.constraints.is_empty() {
            let solve = self
                .solver
                .solve(&mut self.constraints, &mut self.solver_bodies, dt);
            report.solver_passes = solve.passes;
            report.constraints_pruned = solve.pruned;
            self.write_back_velocities();
        }

        self.time += dt;
        self.step_count += 1;
        report.time = self.time;

        self.check_divergence()?;
        Ok(report)
    }

    fn integrate(&mut self, dt: f64, report: &mut TickReport) {
        let method = self.config.solver.integration;
        let substeps = self.config.solver.integrator_iterations;
        let gravity = self.config.gravity.acceleration;

        for body in &mut self.bodies {
            if body.kind() != ColliderKind::Static {
                report.bodies_integrated += 1;
            }
            step_body(body, method, &gravity, dt, substeps);
        }

        for collider in &mut self.colliders {
            let pose = collider.body.map(|h| self.bodies[h.index()].state.pose);
            collider.update_transform(pose.as_ref());
        }
    }

    /// One solver view per collider slot. Bodiless colliders are fixed.
    fn rebuild_solver_bodies(&mut self) {
        self.solver_bodies.clear();
        for collider in &self.colliders {
            let view = match collider.body {
                Some(h) => self.bodies[h.index()].solver_body(),
                None => SolverBody::fixed(collider.position()),
            };
            self.solver_bodies.push(view);
        }
    }

    fn pair_restitution(&self, a: ColliderHandle, b: ColliderHandle) -> f64 {
        let default = self.config.solver.default_restitution;
        let ea = self.colliders[a.index()].restitution.unwrap_or(default);
        let eb = self.colliders[b.index()].restitution.unwrap_or(default);
        0.5 * (ea + eb)
    }

    fn detect(&mut self, report: &mut TickReport) {
        let mut alive = vec![false; self.constraints.len()];
        let mut fresh: Vec<ContactConstraint> = Vec::new();

        for i in 0..self.colliders.len() {
            for j in 0..i {
                let (a, b) = (&self.colliders[i], &self.colliders[j]);

                if a.kind == ColliderKind::Static && b.kind == ColliderKind::Static {
                    continue;
                }
                if a.body.is_some() && a.body == b.body {
                    continue;
                }

                report.pairs_tested += 1;
                let sink = self.debug_sink.as_mut();
                let Some(simplex) = gjk_intersection_with(a, b, sink) else {
                    continue;
                };
                report.gjk_hits += 1;

                let Some(contact) = epa_contact_with(&simplex, a, b, sink) else {
                    continue;
                };
                report.contacts += 1;

                let key = (ColliderHandle::new(i), ColliderHandle::new(j));
                let restitution = self.pair_restitution(key.0, key.1);
                let (body_a, body_b) = (&self.solver_bodies[i], &self.solver_bodies[j]);

                if let Some(&index) = self.constraint_index.get(&key) {
                    self.constraints[index].refresh(contact, body_a, body_b, restitution);
                    alive[index] = true;
                    report.constraints_reused += 1;
                } else {
                    debug!(a = %key.0, b = %key.1, depth = contact.depth, "Created constraint");
                    fresh.push(ContactConstraint::new(
                        key.0,
                        key.1,
                        contact,
                        body_a,
                        body_b,
                        restitution,
                    ));
                    report.constraints_created += 1;
                }
            }
        }

        let previous = std::mem::take(&mut self.constraints);
        for (constraint, keep) in previous.into_iter().zip(alive) {
            if keep {
                self.constraints.push(constraint);
            } else {
                debug!(
                    a = %constraint.collider_a,
                    b = %constraint.collider_b,
                    "Dropped constraint"
                );
                report.constraints_dropped += 1;
            }
        }
        self.constraints.extend(fresh);

        self.constraint_index.clear();
        for (index, constraint) in self.constraints.iter().enumerate() {
            self.constraint_index
                .insert((constraint.collider_a, constraint.collider_b), index);
        }
    }

    fn write_back_velocities(&mut self) {
        for (collider, view) in self.colliders.iter().zip(&self.solver_bodies) {
            let Some(handle) = collider.body else {
                continue;
            };
            let body = &mut self.bodies[handle.index()];
            if body.is_dynamic() {
                body.state.twist = Twist::new(view.linear_velocity, view.angular_velocity);
            }
        }
    }

    fn check_divergence(&self) -> sim_types::Result<()> {
        for (index, body) in self.bodies.iter().enumerate() {
            if !body.state.is_finite() {
                let handle = BodyHandle::new(index);
                warn!(body = %handle, "Simulation diverged");
                return Err(SimError::diverged(format!(
                    "{handle} has non-finite state"
                )));
            }
        }
        Ok(())
    }

    /// Net linear momentum of all dynamic bodies.
    #[must_use]
    pub fn total_momentum(&self) -> Vector3<f64> {
        self.bodies
            .iter()
            .filter(|b| b.is_dynamic())
            .map(|b| b.state.twist.linear * b.mass_props().mass)
            .sum()
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
    use crate::debug::RecordingDebugSink;
    use crate::shape::CollisionShape;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix4, Point3};
    use sim_types::MassProperties;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn unit_box(
        world: &mut World,
        position: Point3<f64>,
        kind: ColliderKind,
    ) -> (BodyHandle, ColliderHandle) {
        let body = world
            .register_body(RigidBody::at_rest(
                Pose::from_position(position),
                MassProperties::box_shape(1.0, Vector3::repeat(0.5)),
            ))
            .unwrap();
        let collider = world
            .register_collider(Collider::new(CollisionShape::cube(0.5), kind).attached_to(body))
            .unwrap();
        (body, collider)
    }

    fn floor(world: &mut World) -> ColliderHandle {
        world
            .register_collider(
                Collider::fixed(
                    CollisionShape::cube(0.5),
                    Pose::from_position(Point3::new(0.0, 0.0, -0.5)),
                )
                .with_scale(Vector3::new(20.0, 20.0, 1.0)),
            )
            .unwrap()
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let config = SimulationConfig::with_timestep(-1.0);
        assert!(World::new(config).unwrap_err().is_config_error());
    }

    #[test]
    fn test_update_rejects_bad_timestep() {
        let mut world = World::new(SimulationConfig::default()).unwrap();
        assert_eq!(world.update(0.0).unwrap_err(), SimError::InvalidTimestep(0.0));
        assert!(world.update(f64::NAN).is_err());
    }

    #[test]
    fn test_register_rejects_second_collider() {
        let mut world = World::new(SimulationConfig::default()).unwrap();
        let (body, _) = unit_box(&mut world, Point3::origin(), ColliderKind::Dynamic);

        let err = world
            .register_collider(
                Collider::new(CollisionShape::cube(0.5), ColliderKind::Dynamic).attached_to(body),
            )
            .unwrap_err();
        assert_eq!(err, SimError::BodyAlreadyHasCollider { body: 0 });
        assert_eq!(world.colliders().len(), 1);
    }

    #[test]
    fn test_register_rejects_massless_dynamic() {
        let mut world = World::new(SimulationConfig::default()).unwrap();
        let body = world
            .register_body(RigidBody::at_rest(
                Pose::identity(),
                MassProperties::new(0.0, Vector3::zeros(), nalgebra::Matrix3::zeros()),
            ))
            .unwrap();

        let err = world
            .register_collider(
                Collider::new(CollisionShape::cube(0.5), ColliderKind::Dynamic).attached_to(body),
            )
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidMassProperties { .. }));

        // The same body is fine behind a static collider
        assert!(world
            .register_collider(
                Collider::new(CollisionShape::cube(0.5), ColliderKind::Static).attached_to(body),
            )
            .is_ok());
        assert_eq!(world.body(body).unwrap().kind(), ColliderKind::Static);
    }

    #[test]
    fn test_register_rejects_degenerate_mesh() {
        let mut world = World::new(SimulationConfig::default()).unwrap();
        let err = world
            .register_collider(Collider::fixed(
                CollisionShape::convex_mesh(vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)]),
                Pose::identity(),
            ))
            .unwrap_err();
        assert!(matches!(err, SimError::DegenerateShape { .. }));
    }

    #[test]
    fn test_register_rejects_unknown_body_and_bodiless_dynamic() {
        let mut world = World::new(SimulationConfig::default()).unwrap();

        let err = world
            .register_collider(
                Collider::new(CollisionShape::cube(0.5), ColliderKind::Dynamic)
                    .attached_to(BodyHandle::new(3)),
            )
            .unwrap_err();
        assert_eq!(err, SimError::InvalidBodyHandle(3));

        let err = world
            .register_collider(Collider::new(CollisionShape::cube(0.5), ColliderKind::Kinematic))
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_free_fall_without_contacts() {
        let mut world = World::new(SimulationConfig::default()).unwrap();
        let (body, _) = unit_box(&mut world, Point3::new(0.0, 0.0, 10.0), ColliderKind::Dynamic);

        let report = world.update(0.1).unwrap();

        assert_eq!(report.bodies_integrated, 1);
        assert_eq!(report.pairs_tested, 0);
        assert_eq!(report.solver_passes, 0);
        assert_relative_eq!(
            world.body(body).unwrap().state.twist.linear.z,
            -0.981,
            epsilon = 1e-12
        );
        assert_relative_eq!(world.time(), 0.1);
        assert_eq!(world.step_count(), 1);
    }

    #[test]
    fn test_static_static_pairs_are_skipped() {
        let mut world = World::new(SimulationConfig::default()).unwrap();
        floor(&mut world);
        world
            .register_collider(Collider::fixed(CollisionShape::cube(0.5), Pose::identity()))
            .unwrap();

        let report = world.update(1.0 / 60.0).unwrap();
        assert_eq!(report.pairs_tested, 0);
        assert!(world.constraints().is_empty());
    }

    #[test]
    fn test_constraint_lifecycle() {
        let mut world = World::new(SimulationConfig::default().zero_gravity()).unwrap();
        let ground = floor(&mut world);
        let (body, collider) = unit_box(&mut world, Point3::new(0.0, 0.0, 0.49), ColliderKind::Dynamic);

        let first = world.update(1.0 / 60.0).unwrap();
        assert_eq!(first.pairs_tested, 1);
        assert_eq!(first.constraints_created, 1);
        assert!(world.constraint(collider, ground).is_some());
        assert!(world.constraint(ground, collider).is_none());

        let second = world.update(1.0 / 60.0).unwrap();
        assert_eq!(second.constraints_created, 0);
        assert_eq!(second.constraints_reused, 1);

        // Lift the box clear of the floor
        world
            .set_body_pose(body, Pose::from_position(Point3::new(0.0, 0.0, 3.0)))
            .unwrap();
        world.set_body_twist(body, Twist::zero()).unwrap();

        let third = world.update(1.0 / 60.0).unwrap();
        assert_eq!(third.constraints_dropped, 1);
        assert!(world.constraints().is_empty());
    }

    #[test]
    fn test_constraint_order_is_stable() {
        let mut world = World::new(SimulationConfig::default().zero_gravity()).unwrap();
        let ground = floor(&mut world);
        let (_, left) = unit_box(&mut world, Point3::new(-3.0, 0.0, 0.49), ColliderKind::Dynamic);
        let (_, right) = unit_box(&mut world, Point3::new(3.0, 0.0, 0.49), ColliderKind::Dynamic);

        world.update(1.0 / 60.0).unwrap();
        let order: Vec<_> = world
            .constraints()
            .iter()
            .map(|c| (c.collider_a, c.collider_b))
            .collect();
        assert_eq!(order, vec![(left, ground), (right, ground)]);

        world.update(1.0 / 60.0).unwrap();
        let again: Vec<_> = world
            .constraints()
            .iter()
            .map(|c| (c.collider_a, c.collider_b))
            .collect();
        assert_eq!(order, again);
    }

    #[test]
    fn test_static_collider_velocity_never_changes() {
        let mut world = World::new(SimulationConfig::default()).unwrap();
        // Registered first, so the static platform is side A of the pair
        unit_box(&mut world, Point3::new(0.0, 0.0, 0.45), ColliderKind::Dynamic);
        let platform = world
            .register_body(RigidBody::at_rest(
                Pose::from_position(Point3::new(0.0, 0.0, -0.5)),
                MassProperties::box_shape(1.0, Vector3::repeat(0.5)),
            ))
            .unwrap();
        world
            .register_collider(
                Collider::new(CollisionShape::cube(0.5), ColliderKind::Static)
                    .attached_to(platform),
            )
            .unwrap();

        for _ in 0..30 {
            let report = world.update(1.0 / 60.0).unwrap();
            assert_eq!(report.pairs_tested, 1);
            let state = world.body(platform).unwrap().state;
            assert_eq!(state.twist, Twist::zero());
            assert_eq!(state.pose.position, Point3::new(0.0, 0.0, -0.5));
        }
    }

    #[test]
    fn test_kinematic_body_pushes_dynamic() {
        let mut world = World::new(SimulationConfig::default().zero_gravity()).unwrap();
        let (pusher, _) = unit_box(&mut world, Point3::new(0.0, 0.0, 0.0), ColliderKind::Kinematic);
        let (pushed, _) = unit_box(&mut world, Point3::new(0.95, 0.0, 0.0), ColliderKind::Dynamic);
        world
            .set_body_twist(pusher, Twist::linear(Vector3::new(1.0, 0.0, 0.0)))
            .unwrap();

        for _ in 0..10 {
            world.update(1.0 / 60.0).unwrap();
        }

        let kinematic = world.body(pusher).unwrap();
        assert_relative_eq!(kinematic.state.twist.linear.x, 1.0);
        assert!(world.body(pushed).unwrap().state.twist.linear.x > 0.5);
    }

    #[test]
    fn test_register_constraint() {
        let mut world = World::new(SimulationConfig::default().zero_gravity()).unwrap();
        let ground = floor(&mut world);
        let (_, collider) = unit_box(&mut world, Point3::new(0.0, 0.0, 0.5), ColliderKind::Dynamic);

        let contact = ContactData::new(
            [Point3::new(0.0, 0.0, -0.5), Point3::new(0.0, 0.0, 0.5)],
            [Point3::origin(), Point3::origin()],
            -Vector3::z(),
            0.0,
            [Matrix4::identity(), Matrix4::identity()],
        );

        let index = world.register_constraint(collider, ground, contact).unwrap();
        assert_eq!(index, 0);
        assert_eq!(world.register_constraint(collider, ground, contact).unwrap(), 0);
        assert_relative_eq!(world.constraints()[0].effective_mass(), 1.0, epsilon = 1e-12);

        assert_eq!(
            world.register_constraint(collider, collider, contact).unwrap_err(),
            SimError::invalid_config("a constraint needs two different colliders")
        );
        assert_eq!(
            world
                .register_constraint(ColliderHandle::new(7), ground, contact)
                .unwrap_err(),
            SimError::InvalidColliderHandle(7)
        );
    }

    #[test]
    fn test_debug_sink_receives_contacts() {
        let mut world = World::new(SimulationConfig::default()).unwrap();
        floor(&mut world);
        unit_box(&mut world, Point3::new(0.0, 0.0, 0.45), ColliderKind::Dynamic);

        let sink = Rc::new(RefCell::new(RecordingDebugSink::new()));
        world.set_debug_sink(Box::new(Rc::clone(&sink)));
        world.update(1.0 / 60.0).unwrap();

        let recorded = sink.borrow();
        assert_eq!(recorded.contacts.len(), 1);
        assert!(!recorded.simplices.is_empty());
        assert!(recorded.contacts[0].normal.z < -0.99);
    }

    #[test]
    fn test_divergence_is_reported() {
        let mut world = World::new(SimulationConfig::default()).unwrap();
        let (body, _) = unit_box(&mut world, Point3::origin(), ColliderKind::Dynamic);
        world
            .body_mut(body)
            .unwrap()
            .apply_force(Vector3::new(f64::INFINITY, 0.0, 0.0));

        let err = world.update(1.0 / 60.0).unwrap_err();
        assert!(err.is_diverged());
    }

    #[test]
    fn test_set_config_validates() {
        let mut world = World::new(SimulationConfig::default()).unwrap();
        let bad = SimulationConfig::default().solver(sim_types::SolverConfig::default().baumgarte(3.0));
        assert!(world.set_config(bad).is_err());
        assert_relative_eq!(world.config().solver.baumgarte_scalar, 0.2);

        assert!(world.set_config(SimulationConfig::high_fidelity()).is_ok());
        assert_relative_eq!(world.timestep(), 1.0 / 240.0);
    }
}
