//! Rigid-body collision and contact core.
//!
//! This crate detects overlaps between convex colliders, turns them into
//! contact constraints and resolves those constraints with a sequential
//! impulse solver. It builds on [`sim_types`] for the data structures and on
//! [`sim_contact`] for the constraint math.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Stepper                               │
//! │  Orchestrates: queued forces → World::update at fixed dt    │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         World                                │
//! │  Contains: bodies, colliders, constraints, configuration    │
//! │  Tick: integrate → detect → solve → write back              │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │                              │
//!                ▼                              ▼
//! ┌──────────────────────────────┐ ┌────────────────────────────┐
//! │          Integrators          │ │          GJK / EPA         │
//! │  Semi-implicit Euler, Verlet, │ │  Overlap test, penetration │
//! │  RK4 with equal sub-steps     │ │  depth, contact points     │
//! └──────────────────────────────┘ └─────────────┬──────────────┘
//!                                                │
//!                                                ▼
//!                                 ┌────────────────────────────┐
//!                                 │  sim-contact: constraints  │
//!                                 │  and the impulse solver    │
//!                                 └────────────────────────────┘
//! ```
//!
//! Every collider is tested against every other collider each tick. Pairs of
//! static colliders and pairs sharing a body are skipped.
//!
//! # Quick Start
//!
//! ```
//! use sim_core::{Collider, ColliderKind, CollisionShape, RigidBody, Stepper, World};
//! use sim_types::{MassProperties, Pose, SimulationConfig};
//! use nalgebra::{Point3, Vector3};
//!
//! let mut world = World::new(SimulationConfig::default()).unwrap();
//!
//! // A wide static floor whose top face is z = 0
//! world
//!     .register_collider(
//!         Collider::fixed(
//!             CollisionShape::box_shape(Vector3::new(10.0, 10.0, 0.5)),
//!             Pose::from_position(Point3::new(0.0, 0.0, -0.5)),
//!         ),
//!     )
//!     .unwrap();
//!
//! // A unit cube dropped from 2 m
//! let cube = world
//!     .register_body(RigidBody::at_rest(
//!         Pose::from_position(Point3::new(0.0, 0.0, 2.0)),
//!         MassProperties::box_shape(1.0, Vector3::repeat(0.5)),
//!     ))
//!     .unwrap();
//! world
//!     .register_collider(
//!         Collider::new(CollisionShape::cube(0.5), ColliderKind::Dynamic).attached_to(cube),
//!     )
//!     .unwrap();
//!
//! let mut stepper = Stepper::new();
//! stepper.run_for(&mut world, 2.0).unwrap();
//!
//! // The cube landed instead of falling through the floor
//! let z = world.body(cube).unwrap().state.pose.position.z;
//! assert!(z > 0.3);
//! ```
//!
//! # Integration Methods
//!
//! | Method | Order | Symplectic | Cost |
//! |--------|-------|------------|------|
//! | Semi-Implicit Euler | 1 | Yes | Low |
//! | Velocity Verlet | 2 | Yes | Medium |
//! | RK4 | 4 | No | High |
//!
//! # Debugging
//!
//! A [`DebugSink`] installed with [`World::set_debug_sink`] receives GJK
//! simplices, EPA polytope faces and final contacts. Structured logs are
//! emitted through `tracing` at `info` for registration and `debug` for
//! per-tick events.

#![doc(html_root_url = "https://docs.rs/sim-core/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
)]

mod body;
mod debug;
pub mod gjk_epa;
pub mod integrators;
mod shape;
mod stepper;
mod world;

pub use body::{Collider, ColliderKind, RigidBody};
pub use debug::{DebugSink, NullDebugSink, RecordingDebugSink};
pub use gjk_epa::{gjk_epa_contact, SupportPoint};
pub use shape::{CollisionShape, SupportMap};
pub use stepper::{Stepper, TickReport};
pub use world::World;

// Re-export key types from the lower crates for convenience
pub use sim_contact::{ContactConstraint, ContactData, SequentialImpulseSolver, SolverBody};
pub use sim_types::{
    BodyHandle, ColliderHandle, ExternalForce, Gravity, IntegrationMethod, MassProperties, Pose,
    RigidBodyState, SimError, SimulationConfig, SolverConfig, Twist,
};

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::similar_names,
    clippy::cast_precision_loss
)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};

    fn add_floor(world: &mut World) {
        world
            .register_collider(Collider::fixed(
                CollisionShape::box_shape(Vector3::new(20.0, 20.0, 0.5)),
                Pose::from_position(Point3::new(0.0, 0.0, -0.5)),
            ))
            .unwrap();
    }

    fn add_cube(world: &mut World, position: Point3<f64>, twist: Twist) -> BodyHandle {
        let body = world
            .register_body(
                RigidBody::at_rest(
                    Pose::from_position(position),
                    MassProperties::box_shape(1.0, Vector3::repeat(0.5)),
                )
                .with_twist(twist),
            )
            .unwrap();
        world
            .register_collider(
                Collider::new(CollisionShape::cube(0.5), ColliderKind::Dynamic).attached_to(body),
            )
            .unwrap();
        body
    }

    #[test]
    fn test_box_comes_to_rest_on_floor() {
        let mut world = World::new(SimulationConfig::default()).unwrap();
        add_floor(&mut world);
        let cube = add_cube(&mut world, Point3::new(0.0, 0.0, 0.49), Twist::zero());

        let mut stepper = Stepper::new();
        let reports = stepper.run(&mut world, 90).unwrap();
        assert!(reports.iter().all(|r| r.pairs_tested == 1));
        assert!(reports.iter().any(|r| r.active_constraints() == 1));

        // At rest the position no longer changes from tick to tick
        let mut previous = world.body(cube).unwrap().state.pose;
        for _ in 0..30 {
            let report = stepper.step(&mut world).unwrap();
            assert_eq!(report.active_constraints(), 1);

            let pose = world.body(cube).unwrap().state.pose;
            assert!(
                (pose.position - previous.position).norm() < 1e-9,
                "cube still moving: {:?} -> {:?}",
                previous.position,
                pose.position
            );
            previous = pose;
        }

        // Settled on its bottom face, slightly inside the floor, upright
        let state = world.body(cube).unwrap().state;
        assert!(state.is_finite());
        assert!(state.pose.position.z > 0.45, "sank to {}", state.pose.position.z);
        assert!(state.pose.position.z < 0.5, "floated at {}", state.pose.position.z);
        assert!(state.pose.rotation.angle() < 1e-6);
        assert!(state.twist.angular.norm() < 1e-6);
    }

    #[test]
    fn test_free_fall_conserves_energy() {
        let mut world = World::new(SimulationConfig::high_fidelity()).unwrap();
        let height = 10.0;
        let cube = add_cube(&mut world, Point3::new(0.0, 0.0, height), Twist::zero());

        let g = 9.81;
        let initial_total = g * height + world.total_kinetic_energy();

        let mut stepper = Stepper::new();
        stepper.run_for(&mut world, 0.5).unwrap();

        let z = world.body(cube).unwrap().state.pose.position.z;
        let final_total = g * z + world.total_kinetic_energy();

        let drift = (final_total - initial_total).abs() / initial_total;
        assert!(drift < 1e-6, "energy drift {drift}");
    }

    #[test]
    fn test_head_on_collision_conserves_momentum() {
        let mut world = World::new(SimulationConfig::default().zero_gravity()).unwrap();
        let left = add_cube(
            &mut world,
            Point3::new(-1.0, 0.0, 0.0),
            Twist::linear(Vector3::new(2.0, 0.0, 0.0)),
        );
        let right = add_cube(
            &mut world,
            Point3::new(1.0, 0.0, 0.0),
            Twist::linear(Vector3::new(-2.0, 0.0, 0.0)),
        );

        let mut stepper = Stepper::new();
        let reports = stepper.run_for(&mut world, 1.0).unwrap();

        assert!(reports.iter().any(|r| r.contacts == 1));
        assert!(world.total_momentum().norm() < 1e-9);

        let xl = world.body(left).unwrap().state.pose.position.x;
        let xr = world.body(right).unwrap().state.pose.position.x;
        assert!(xl < xr, "cubes passed through each other: {xl} vs {xr}");
    }

    #[test]
    fn test_simulation_is_deterministic() {
        let build = || {
            let mut world = World::new(SimulationConfig::default()).unwrap();
            add_floor(&mut world);
            add_cube(
                &mut world,
                Point3::new(0.0, 0.0, 1.5),
                Twist::new(Vector3::new(0.3, 0.0, 0.0), Vector3::new(0.0, 1.0, 0.5)),
            );
            add_cube(&mut world, Point3::new(0.2, 0.1, 3.0), Twist::zero());
            world
        };

        let mut first = build();
        let mut second = build();
        let a = Stepper::new().run(&mut first, 90).unwrap();
        let b = Stepper::new().run(&mut second, 90).unwrap();

        assert_eq!(a, b);
        for (x, y) in first.bodies().iter().zip(second.bodies()) {
            assert_eq!(x.state, y.state);
        }
    }

    #[test]
    fn test_every_integration_method_runs() {
        for method in [
            IntegrationMethod::Euler,
            IntegrationMethod::Verlet,
            IntegrationMethod::RungeKutta4,
        ] {
            let config = SimulationConfig::default()
                .solver(SolverConfig::default().integration(method).iterations(2, 10));
            let mut world = World::new(config).unwrap();
            let cube = add_cube(&mut world, Point3::new(0.0, 0.0, 5.0), Twist::zero());

            Stepper::new().run(&mut world, 60).unwrap();

            // z(1 s) = 5 - g/2 within first-order error
            let z = world.body(cube).unwrap().state.pose.position.z;
            assert_relative_eq!(z, 5.0 - 0.5 * 9.81, epsilon = 0.1);
        }
    }
}
