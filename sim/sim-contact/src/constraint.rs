//! Non-penetration constraint for a single contact.
//!
//! The constraint acts along the contact normal. Its Jacobian maps the
//! twelve velocity coordinates of the pair
//!
//! ```text
//! v = [v_A, ω_A, v_B, ω_B]
//! ```
//!
//! to the rate of change of the signed separation:
//!
//! ```text
//! J = [-n, -(r_A × n), n, r_B × n]
//! ```
//!
//! where `r_A`, `r_B` are the moment arms from each body's center of mass to
//! its contact point. A static side has its whole block zeroed, so nothing
//! the solver does can reach it.

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use sim_types::{ColliderHandle, SolverConfig};

use crate::{ContactData, Mobility, SolverBody};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 1×12 constraint Jacobian.
pub type Jacobian = SMatrix<f64, 1, 12>;

/// 12×12 block-diagonal inverse mass matrix of a body pair.
pub type InverseMassMatrix = SMatrix<f64, 12, 12>;

/// Stacked 12-vector over a body pair.
pub type PairVector = SVector<f64, 12>;

/// Linear and angular 6-vector of one body.
pub type Vector6 = SVector<f64, 6>;

/// Effective masses below this are treated as "no movable body".
const MIN_EFFECTIVE_MASS: f64 = 1e-12;

/// A contact constraint between two colliders.
///
/// Created when a pair first overlaps, refreshed with new contact data every
/// tick the pair keeps overlapping, and dropped when it separates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactConstraint {
    /// First collider (A, the source of the normal).
    pub collider_a: ColliderHandle,
    /// Second collider (B).
    pub collider_b: ColliderHandle,
    contact: ContactData,
    restitution: f64,
    jacobian: Jacobian,
    inverse_mass: InverseMassMatrix,
    /// `M⁻¹ Jᵀ`, the per-unit-impulse velocity change of the pair.
    catto_b: PairVector,
    effective_mass: f64,
    accumulated_impulse: f64,
    bias: f64,
}

impl ContactConstraint {
    /// Build a constraint for a fresh contact.
    #[must_use]
    pub fn new(
        collider_a: ColliderHandle,
        collider_b: ColliderHandle,
        contact: ContactData,
        body_a: &SolverBody,
        body_b: &SolverBody,
        restitution: f64,
    ) -> Self {
        let mut constraint = Self {
            collider_a,
            collider_b,
            contact,
            restitution,
            jacobian: Jacobian::zeros(),
            inverse_mass: InverseMassMatrix::zeros(),
            catto_b: PairVector::zeros(),
            effective_mass: 0.0,
            accumulated_impulse: 0.0,
            bias: 0.0,
        };
        constraint.refresh(contact, body_a, body_b, restitution);
        constraint
    }

    /// Replace the contact and rebuild the Jacobian and mass terms.
    ///
    /// The accumulated impulse is left untouched; [`Self::prepare`] resets it
    /// at the start of each solve.
    pub fn refresh(
        &mut self,
        contact: ContactData,
        body_a: &SolverBody,
        body_b: &SolverBody,
        restitution: f64,
    ) {
        self.contact = contact;
        self.restitution = restitution;
        self.jacobian = build_jacobian(&contact, body_a, body_b);
        self.inverse_mass = build_inverse_mass(body_a, body_b);
        self.catto_b = self.inverse_mass * self.jacobian.transpose();
        self.effective_mass = (self.jacobian * self.catto_b)[0];
    }

    /// Compute this tick's velocity bias and reset the accumulated impulse.
    ///
    /// The bias combines Baumgarte feedback of the penetration beyond the
    /// slop with restitution of the pre-solve closing speed:
    ///
    /// ```text
    /// bias = (-β · error / Δt + e · Jv) / Δt
    /// ```
    pub fn prepare(
        &mut self,
        body_a: &SolverBody,
        body_b: &SolverBody,
        config: &SolverConfig,
        dt: f64,
    ) {
        self.accumulated_impulse = config.initial_impulse;

        let error = (-self.contact.separation() - config.penetration_slop).max(0.0);
        let projection = self.relative_velocity(&body_a.velocity(), &body_b.velocity());

        let restitution_term = if -projection > config.restitution_slop {
            self.restitution * projection
        } else {
            0.0
        };

        self.bias = (-config.baumgarte_scalar * error / dt + restitution_term) / dt;
    }

    /// One Gauss-Seidel update. Returns the impulse delta Δλ.
    ///
    /// `velocity_a`/`velocity_b` are the body velocities at the start of the
    /// current pass and `accel_a`/`accel_b` the velocity change per unit time
    /// already applied to each body by earlier constraints in this pass.
    /// The accumulated impulse is clamped to `[0, ∞)` and the returned delta
    /// is the clamped difference.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn solve(
        &mut self,
        body_a: &SolverBody,
        body_b: &SolverBody,
        velocity_a: &Vector6,
        velocity_b: &Vector6,
        accel_a: &Vector6,
        accel_b: &Vector6,
        dt: f64,
    ) -> f64 {
        if !self.is_active() {
            return 0.0;
        }

        let accumulated = self.relative_velocity(accel_a, accel_b);
        let projection = self.relative_velocity(velocity_a, velocity_b) + dt * accumulated;
        if projection > 0.0 {
            return 0.0;
        }

        let external = stack(&body_a.external_wrench(), &body_b.external_wrench());
        let eta = self.bias
            + self.relative_velocity(velocity_a, velocity_b) / dt
            + self.catto_b.dot(&external);

        let delta = -(eta + accumulated) / self.effective_mass;

        let previous = self.accumulated_impulse;
        self.accumulated_impulse = (previous + delta).max(0.0);
        self.accumulated_impulse - previous
    }

    /// Rate of change of separation, `J · [a, b]`.
    #[must_use]
    pub fn relative_velocity(&self, a: &Vector6, b: &Vector6) -> f64 {
        (self.jacobian * stack(a, b))[0]
    }

    /// Velocity change per unit time of body A for an impulse delta.
    #[must_use]
    pub fn response_a(&self, delta: f64) -> Vector6 {
        self.catto_b.fixed_rows::<6>(0) * delta
    }

    /// Velocity change per unit time of body B for an impulse delta.
    #[must_use]
    pub fn response_b(&self, delta: f64) -> Vector6 {
        self.catto_b.fixed_rows::<6>(6) * delta
    }

    /// Whether at least one side can move in response to an impulse.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.effective_mass > MIN_EFFECTIVE_MASS
    }

    /// The contact this constraint was built from.
    #[must_use]
    pub fn contact(&self) -> &ContactData {
        &self.contact
    }

    /// Combined restitution coefficient.
    #[must_use]
    pub fn restitution(&self) -> f64 {
        self.restitution
    }

    /// The 1×12 Jacobian.
    #[must_use]
    pub fn jacobian(&self) -> &Jacobian {
        &self.jacobian
    }

    /// The 12×12 inverse mass matrix.
    #[must_use]
    pub fn inverse_mass_matrix(&self) -> &InverseMassMatrix {
        &self.inverse_mass
    }

    /// `J M⁻¹ Jᵀ`.
    #[must_use]
    pub fn effective_mass(&self) -> f64 {
        self.effective_mass
    }

    /// Normal impulse accumulated this tick. Never negative.
    #[must_use]
    pub fn accumulated_impulse(&self) -> f64 {
        self.accumulated_impulse
    }

    /// Velocity-space bias computed by [`Self::prepare`].
    #[must_use]
    pub fn bias(&self) -> f64 {
        self.bias
    }
}

fn build_jacobian(contact: &ContactData, body_a: &SolverBody, body_b: &SolverBody) -> Jacobian {
    let n = contact.normal;
    let mut jacobian = Jacobian::zeros();

    if body_a.mobility != Mobility::Static {
        let arm_a = contact.world_a - body_a.center;
        write_block(&mut jacobian, 0, &(-n), &(-arm_a.cross(&n)));
    }
    if body_b.mobility != Mobility::Static {
        let arm_b = contact.world_b - body_b.center;
        write_block(&mut jacobian, 6, &n, &arm_b.cross(&n));
    }

    jacobian
}

fn write_block(jacobian: &mut Jacobian, offset: usize, linear: &Vector3<f64>, angular: &Vector3<f64>) {
    for i in 0..3 {
        jacobian[offset + i] = linear[i];
        jacobian[offset + 3 + i] = angular[i];
    }
}

fn build_inverse_mass(body_a: &SolverBody, body_b: &SolverBody) -> InverseMassMatrix {
    let mut matrix = InverseMassMatrix::zeros();
    for (offset, body) in [(0, body_a), (6, body_b)] {
        if body.mobility != Mobility::Dynamic {
            continue;
        }
        matrix
            .fixed_view_mut::<3, 3>(offset, offset)
            .copy_from(&(Matrix3::identity() * body.inverse_mass));
        matrix
            .fixed_view_mut::<3, 3>(offset + 3, offset + 3)
            .copy_from(&body.inverse_inertia);
    }
    matrix
}

fn stack(a: &Vector6, b: &Vector6) -> PairVector {
    let mut out = PairVector::zeros();
    out.fixed_rows_mut::<6>(0).copy_from(a);
    out.fixed_rows_mut::<6>(6).copy_from(b);
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix4, Point3};

    /// Unit box resting on a static floor, 1 cm deep.
    fn floor_contact(depth: f64) -> ContactData {
        ContactData::new(
            [Point3::new(0.0, 0.0, 0.5), Point3::new(0.0, 0.0, -0.5)],
            [
                Point3::new(0.0, 0.0, 0.5),
                Point3::new(0.0, 0.0, 0.5 - depth),
            ],
            Vector3::z(),
            depth,
            [Matrix4::identity(), Matrix4::identity()],
        )
    }

    fn floor() -> SolverBody {
        SolverBody::fixed(Point3::origin())
    }

    fn dynamic_box() -> SolverBody {
        SolverBody::dynamic(
            Point3::new(0.0, 0.0, 0.99),
            1.0,
            Matrix3::identity() * 6.0,
        )
    }

    #[test]
    fn test_static_block_is_zero() {
        let constraint = ContactConstraint::new(
            ColliderHandle::new(0),
            ColliderHandle::new(1),
            floor_contact(0.01),
            &floor(),
            &dynamic_box(),
            0.0,
        );

        let j = constraint.jacobian();
        for i in 0..6 {
            assert_eq!(j[i], 0.0);
        }
        assert_relative_eq!(j[8], 1.0);
        assert_relative_eq!(constraint.response_a(3.0), Vector6::zeros());
    }

    #[test]
    fn test_effective_mass_dynamic_static() {
        let constraint = ContactConstraint::new(
            ColliderHandle::new(0),
            ColliderHandle::new(1),
            floor_contact(0.01),
            &floor(),
            &dynamic_box(),
            0.0,
        );

        // Contact is directly below the center, so there is no angular term.
        assert_relative_eq!(constraint.effective_mass(), 1.0, epsilon = 1e-12);
        assert!(constraint.is_active());
    }

    #[test]
    fn test_effective_mass_with_lever_arm() {
        let mut contact = floor_contact(0.01);
        contact.world_b = Point3::new(0.5, 0.0, 0.49);

        let body = SolverBody::dynamic(Point3::new(0.0, 0.0, 0.99), 2.0, Matrix3::identity() * 4.0);
        let constraint = ContactConstraint::new(
            ColliderHandle::new(0),
            ColliderHandle::new(1),
            contact,
            &floor(),
            &body,
            0.0,
        );

        // r = (0.5, 0, -0.5), r × z = (0, -0.5, 0), |r × z|² / I = 0.25 / 4
        assert_relative_eq!(constraint.effective_mass(), 0.5 + 0.0625, epsilon = 1e-12);
    }

    #[test]
    fn test_effective_mass_two_dynamic_bodies() {
        let contact = floor_contact(0.01);
        let lower = SolverBody::dynamic(Point3::new(0.0, 0.0, 0.0), 1.0, Matrix3::identity());
        let upper = SolverBody::dynamic(Point3::new(0.0, 0.0, 0.99), 1.0, Matrix3::identity());
        let constraint = ContactConstraint::new(
            ColliderHandle::new(0),
            ColliderHandle::new(1),
            contact,
            &lower,
            &upper,
            0.0,
        );

        // Both arms are parallel to the normal.
        assert_relative_eq!(constraint.effective_mass(), 2.0, epsilon = 1e-12);
        assert_relative_eq!(
            *constraint.inverse_mass_matrix(),
            constraint.inverse_mass_matrix().transpose()
        );
    }

    #[test]
    fn test_two_fixed_bodies_inactive() {
        let constraint = ContactConstraint::new(
            ColliderHandle::new(0),
            ColliderHandle::new(1),
            floor_contact(0.01),
            &floor(),
            &floor(),
            0.0,
        );
        assert!(!constraint.is_active());
    }

    #[test]
    fn test_prepare_bias_from_penetration() {
        let config = SolverConfig::default();
        let dt = 0.01;
        let mut constraint = ContactConstraint::new(
            ColliderHandle::new(0),
            ColliderHandle::new(1),
            floor_contact(0.01),
            &floor(),
            &dynamic_box(),
            0.0,
        );
        constraint.prepare(&floor(), &dynamic_box(), &config, dt);

        let error = 0.01 - config.penetration_slop;
        assert_relative_eq!(
            constraint.bias(),
            -config.baumgarte_scalar * error / dt / dt,
            epsilon = 1e-9
        );
        assert_eq!(constraint.accumulated_impulse(), config.initial_impulse);
    }

    #[test]
    fn test_prepare_ignores_shallow_penetration() {
        let config = SolverConfig::default();
        let mut constraint = ContactConstraint::new(
            ColliderHandle::new(0),
            ColliderHandle::new(1),
            floor_contact(config.penetration_slop * 0.5),
            &floor(),
            &dynamic_box(),
            0.0,
        );
        constraint.prepare(&floor(), &dynamic_box(), &config, 0.01);
        assert_eq!(constraint.bias(), 0.0);
    }

    #[test]
    fn test_restitution_needs_closing_speed() {
        let config = SolverConfig::default();
        let dt = 0.01;
        let mut slow = dynamic_box();
        slow.linear_velocity = Vector3::new(0.0, 0.0, -0.1);
        let mut fast = dynamic_box();
        fast.linear_velocity = Vector3::new(0.0, 0.0, -2.0);

        let contact = floor_contact(config.penetration_slop * 0.5);
        let mut constraint =
            ContactConstraint::new(ColliderHandle::new(0), ColliderHandle::new(1), contact, &floor(), &slow, 0.5);

        constraint.prepare(&floor(), &slow, &config, dt);
        assert_eq!(constraint.bias(), 0.0);

        constraint.prepare(&floor(), &fast, &config, dt);
        assert_relative_eq!(constraint.bias(), 0.5 * -2.0 / dt, epsilon = 1e-9);
    }

    #[test]
    fn test_solve_stops_approach() {
        let config = SolverConfig::default().slop(0.0, 10.0).baumgarte(0.0);
        let dt = 0.01;
        let mut body = dynamic_box();
        body.linear_velocity = Vector3::new(0.0, 0.0, -1.0);

        let mut constraint = ContactConstraint::new(
            ColliderHandle::new(0),
            ColliderHandle::new(1),
            floor_contact(0.0),
            &floor(),
            &body,
            0.0,
        );
        constraint.prepare(&floor(), &body, &config, dt);

        let zero = Vector6::zeros();
        let delta = constraint.solve(&floor(), &body, &zero, &body.velocity(), &zero, &zero, dt);

        // Δv = M⁻¹ Jᵀ Δλ Δt must cancel the 1 m/s approach.
        assert_relative_eq!(delta * dt, 1.0, epsilon = 1e-9);
        assert_relative_eq!(constraint.accumulated_impulse(), delta);
    }

    #[test]
    fn test_solve_separating_is_zero() {
        let config = SolverConfig::default();
        let mut body = dynamic_box();
        body.linear_velocity = Vector3::new(0.0, 0.0, 1.0);

        let mut constraint = ContactConstraint::new(
            ColliderHandle::new(0),
            ColliderHandle::new(1),
            floor_contact(0.01),
            &floor(),
            &body,
            0.0,
        );
        constraint.prepare(&floor(), &body, &config, 0.01);

        let zero = Vector6::zeros();
        let delta = constraint.solve(&floor(), &body, &zero, &body.velocity(), &zero, &zero, 0.01);
        assert_eq!(delta, 0.0);
        assert_eq!(constraint.accumulated_impulse(), 0.0);
    }

    #[test]
    fn test_accumulated_impulse_clamped() {
        let config = SolverConfig::default().baumgarte(0.0);
        let dt = 0.01;
        let mut body = dynamic_box();
        body.linear_velocity = Vector3::new(0.0, 0.0, -1.0);

        let mut constraint = ContactConstraint::new(
            ColliderHandle::new(0),
            ColliderHandle::new(1),
            floor_contact(0.0),
            &floor(),
            &body,
            0.0,
        );
        constraint.prepare(&floor(), &body, &config, dt);

        let zero = Vector6::zeros();
        let first = constraint.solve(&floor(), &body, &zero, &body.velocity(), &zero, &zero, dt);
        assert!(first > 0.0);

        // A large external force lifting the body makes the raw update pull.
        // The accumulated impulse may only drop back to 0.
        body.force = Vector3::new(0.0, 0.0, 1000.0);
        let mut state = body.velocity();
        state[2] = -1e-9;
        let second = constraint.solve(&floor(), &body, &zero, &state, &zero, &zero, dt);
        assert!(second < 0.0);
        assert_eq!(constraint.accumulated_impulse(), 0.0);
        assert!(constraint.accumulated_impulse() >= 0.0);
        assert_relative_eq!(first + second, constraint.accumulated_impulse(), epsilon = 1e-9);
    }
}
