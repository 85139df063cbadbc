//! Gravity and external force inputs.
//!
//! Forces are accumulated on bodies between ticks and consumed by the
//! integrator. Gravity is a per-world constant acceleration.

use crate::BodyHandle;
use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An external force applied to a rigid body.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExternalForce {
    /// The body to apply the force to.
    pub body: BodyHandle,
    /// Force vector in world coordinates (Newtons).
    pub force: Vector3<f64>,
    /// Torque vector in world coordinates (Newton-meters).
    pub torque: Vector3<f64>,
    /// Point of application in world coordinates.
    /// If None, the force acts at the center of mass.
    pub point: Option<Point3<f64>>,
}

impl ExternalForce {
    /// Force applied at the center of mass.
    #[must_use]
    pub fn at_com(body: BodyHandle, force: Vector3<f64>) -> Self {
        Self {
            body,
            force,
            torque: Vector3::zeros(),
            point: None,
        }
    }

    /// Pure torque.
    #[must_use]
    pub fn torque_only(body: BodyHandle, torque: Vector3<f64>) -> Self {
        Self {
            body,
            force: Vector3::zeros(),
            torque,
            point: None,
        }
    }

    /// Force applied at a world-space point.
    #[must_use]
    pub fn at_point(body: BodyHandle, force: Vector3<f64>, point: Point3<f64>) -> Self {
        Self {
            body,
            force,
            torque: Vector3::zeros(),
            point: Some(point),
        }
    }

    /// Scale the force and torque by a factor.
    #[must_use]
    pub fn scale(&self, factor: f64) -> Self {
        Self {
            force: self.force * factor,
            torque: self.torque * factor,
            ..*self
        }
    }

    /// Check if this force is effectively zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.force.norm_squared() < 1e-20 && self.torque.norm_squared() < 1e-20
    }
}

/// Gravity configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Gravity {
    /// Acceleration due to gravity (m/s²).
    pub acceleration: Vector3<f64>,
}

impl Default for Gravity {
    fn default() -> Self {
        Self::earth()
    }
}

impl Gravity {
    /// Standard Earth gravity (9.81 m/s² in -Z direction).
    #[must_use]
    pub fn earth() -> Self {
        Self {
            acceleration: Vector3::new(0.0, 0.0, -9.81),
        }
    }

    /// Zero gravity.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            acceleration: Vector3::zeros(),
        }
    }

    /// Custom gravity vector.
    #[must_use]
    pub fn custom(acceleration: Vector3<f64>) -> Self {
        Self { acceleration }
    }

    /// Gravitational force on a body of the given mass.
    #[must_use]
    pub fn force_on_mass(&self, mass: f64) -> Vector3<f64> {
        self.acceleration * mass
    }

    /// Whether the acceleration is effectively zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.acceleration.norm_squared() < 1e-20
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_external_force_at_com() {
        let body = BodyHandle::new(1);
        let force = ExternalForce::at_com(body, Vector3::new(10.0, 0.0, 0.0));

        assert_eq!(force.body, body);
        assert_eq!(force.force.x, 10.0);
        assert!(force.point.is_none());
    }

    #[test]
    fn test_external_force_scale() {
        let force = ExternalForce::at_point(
            BodyHandle::new(0),
            Vector3::new(10.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        );
        let scaled = force.scale(0.5);

        assert_relative_eq!(scaled.force.x, 5.0, epsilon = 1e-10);
        assert_eq!(scaled.point, force.point);
        assert!(ExternalForce::torque_only(BodyHandle::new(0), Vector3::zeros()).is_zero());
    }

    #[test]
    fn test_gravity() {
        let g = Gravity::earth();
        assert_relative_eq!(g.acceleration.z, -9.81, epsilon = 1e-10);

        let force = g.force_on_mass(2.0);
        assert_relative_eq!(force.z, -19.62, epsilon = 1e-10);

        assert!(Gravity::zero().is_zero());
        assert!(!Gravity::custom(Vector3::new(0.0, -0.8, 0.0)).is_zero());
    }
}
