//! Numerical integration methods for rigid body dynamics.
//!
//! Each method advances a [`RigidBodyState`] under a linear and angular
//! acceleration that is held constant across the step.
//!
//! # Integration Methods
//!
//! - **Semi-Implicit Euler**: Symplectic, the real-time default
//! - **Velocity Verlet**: Second-order, exact under constant acceleration
//! - **RK4**: Fourth-order Runge-Kutta over position and velocity
//!
//! Orientation always advances through the quaternion exponential map of
//! the (world-space) angular velocity.
//!
//! # Example
//!
//! ```
//! use sim_core::integrators::{Integrator, SemiImplicitEuler};
//! use sim_types::{RigidBodyState, Pose};
//! use nalgebra::{Point3, Vector3};
//!
//! let mut state = RigidBodyState::at_rest(Pose::from_position(Point3::new(0.0, 0.0, 10.0)));
//! let gravity = Vector3::new(0.0, 0.0, -9.81);
//!
//! SemiImplicitEuler::integrate(&mut state, gravity, Vector3::zeros(), 0.01);
//!
//! assert!(state.pose.position.z < 10.0);
//! assert!(state.twist.linear.z < 0.0);
//! ```

use nalgebra::{UnitQuaternion, Vector3};
use sim_types::{IntegrationMethod, RigidBodyState};

use crate::body::{ColliderKind, RigidBody};

/// Trait for integration methods.
pub trait Integrator {
    /// Integrate the rigid body state forward by dt.
    ///
    /// # Arguments
    ///
    /// * `state` - Current rigid body state (modified in place)
    /// * `linear_accel` - Linear acceleration (m/s²)
    /// * `angular_accel` - Angular acceleration (rad/s²)
    /// * `dt` - Timestep in seconds
    fn integrate(
        state: &mut RigidBodyState,
        linear_accel: Vector3<f64>,
        angular_accel: Vector3<f64>,
        dt: f64,
    );
}

/// Dispatch to the appropriate integrator based on method enum.
pub fn integrate_with_method(
    method: IntegrationMethod,
    state: &mut RigidBodyState,
    linear_accel: Vector3<f64>,
    angular_accel: Vector3<f64>,
    dt: f64,
) {
    match method {
        IntegrationMethod::Euler => {
            SemiImplicitEuler::integrate(state, linear_accel, angular_accel, dt);
        }
        IntegrationMethod::Verlet => {
            VelocityVerlet::integrate(state, linear_accel, angular_accel, dt);
        }
        IntegrationMethod::RungeKutta4 => {
            RungeKutta4::integrate(state, linear_accel, angular_accel, dt);
        }
    }
}

/// Advance one body by `dt`, split into `substeps` equal steps.
///
/// Records the pre-step twist, consumes accumulated forces and refreshes the
/// world inverse inertia for the new orientation. Static bodies do not move.
/// Kinematic bodies keep their velocity and ignore gravity and forces.
pub fn step_body(
    body: &mut RigidBody,
    method: IntegrationMethod,
    gravity: &Vector3<f64>,
    dt: f64,
    substeps: usize,
) {
    body.previous_twist = body.state.twist;

    match body.kind() {
        ColliderKind::Static => {}
        ColliderKind::Kinematic => {
            let h = dt / substeps.max(1) as f64;
            for _ in 0..substeps.max(1) {
                integrate_with_method(
                    method,
                    &mut body.state,
                    Vector3::zeros(),
                    Vector3::zeros(),
                    h,
                );
            }
        }
        ColliderKind::Dynamic => {
            let linear_accel = body.linear_acceleration(gravity);
            let angular_accel = body.angular_acceleration();
            let h = dt / substeps.max(1) as f64;
            for _ in 0..substeps.max(1) {
                integrate_with_method(method, &mut body.state, linear_accel, angular_accel, h);
            }
        }
    }

    body.clear_forces();
    body.refresh_mass();
}

/// Semi-implicit Euler integration (symplectic Euler).
///
/// Updates velocity first, then uses new velocity for position.
/// This is symplectic (energy-preserving) and stable for oscillatory systems.
///
/// ```text
/// v(t+dt) = v(t) + a(t) * dt
/// x(t+dt) = x(t) + v(t+dt) * dt
/// ```
pub struct SemiImplicitEuler;

impl Integrator for SemiImplicitEuler {
    fn integrate(
        state: &mut RigidBodyState,
        linear_accel: Vector3<f64>,
        angular_accel: Vector3<f64>,
        dt: f64,
    ) {
        // Update velocity first
        state.twist.linear += linear_accel * dt;
        state.twist.angular += angular_accel * dt;

        // Update position using new velocity
        state.pose.position += state.twist.linear * dt;

        integrate_rotation(&mut state.pose.rotation, &state.twist.angular, dt);
    }
}

/// Velocity Verlet integration (second-order symplectic).
///
/// ```text
/// x(t+dt) = x(t) + v(t) * dt + 0.5 * a * dt²
/// v(t+dt) = v(t) + a * dt
/// ```
///
/// Acceleration is constant over the step, so the usual average of old and
/// new acceleration collapses to `a`.
pub struct VelocityVerlet;

impl Integrator for VelocityVerlet {
    fn integrate(
        state: &mut RigidBodyState,
        linear_accel: Vector3<f64>,
        angular_accel: Vector3<f64>,
        dt: f64,
    ) {
        let half_dt_sq = 0.5 * dt * dt;

        state.pose.position += state.twist.linear * dt + linear_accel * half_dt_sq;

        // Midpoint angular velocity
        let avg_angular = state.twist.angular + angular_accel * (0.5 * dt);
        integrate_rotation(&mut state.pose.rotation, &avg_angular, dt);

        state.twist.linear += linear_accel * dt;
        state.twist.angular += angular_accel * dt;
    }
}

/// Fourth-order Runge-Kutta integration.
///
/// Evaluates the derivative of `(x, v)` at the start, twice at the midpoint
/// and at the end of the step, then takes the weighted sum.
pub struct RungeKutta4;

/// Derivative of position and velocity at one RK4 stage.
#[derive(Debug, Clone, Copy)]
struct Derivative {
    velocity: Vector3<f64>,
    acceleration: Vector3<f64>,
}

impl RungeKutta4 {
    fn evaluate(
        velocity: Vector3<f64>,
        accel: Vector3<f64>,
        dt: f64,
        previous: &Derivative,
    ) -> Derivative {
        Derivative {
            velocity: velocity + previous.acceleration * dt,
            acceleration: accel,
        }
    }
}

impl Integrator for RungeKutta4 {
    fn integrate(
        state: &mut RigidBodyState,
        linear_accel: Vector3<f64>,
        angular_accel: Vector3<f64>,
        dt: f64,
    ) {
        let v0 = state.twist.linear;
        let start = Derivative {
            velocity: Vector3::zeros(),
            acceleration: Vector3::zeros(),
        };

        let k1 = Self::evaluate(v0, linear_accel, 0.0, &start);
        let k2 = Self::evaluate(v0, linear_accel, dt * 0.5, &k1);
        let k3 = Self::evaluate(v0, linear_accel, dt * 0.5, &k2);
        let k4 = Self::evaluate(v0, linear_accel, dt, &k3);

        let dxdt = (k1.velocity + (k2.velocity + k3.velocity) * 2.0 + k4.velocity) / 6.0;
        let dvdt =
            (k1.acceleration + (k2.acceleration + k3.acceleration) * 2.0 + k4.acceleration) / 6.0;

        state.pose.position += dxdt * dt;
        state.twist.linear += dvdt * dt;

        let avg_angular = state.twist.angular + angular_accel * (0.5 * dt);
        integrate_rotation(&mut state.pose.rotation, &avg_angular, dt);
        state.twist.angular += angular_accel * dt;
    }
}

/// Integrate rotation using a world-space angular velocity.
///
/// `q(t+dt) = exp(omega * dt) * q(t)`
fn integrate_rotation(rotation: &mut UnitQuaternion<f64>, omega: &Vector3<f64>, dt: f64) {
    if omega.norm() < 1e-10 {
        return;
    }

    let delta_q = UnitQuaternion::from_scaled_axis(omega * dt);
    *rotation = delta_q * *rotation;
}
