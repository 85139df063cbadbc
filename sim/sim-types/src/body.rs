//! Rigid body state types and arena handles.
//!
//! Bodies and colliders live in dense arenas owned by the world. They are
//! referred to by slot handles instead of references, so constraints can
//! name the pair they act on without borrowing either side.

use nalgebra::{Isometry3, Matrix3, Point3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Slot of a rigid body in the world's body arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyHandle(pub usize);

impl BodyHandle {
    /// Create a handle from a raw slot index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the slot index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for BodyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Body({})", self.0)
    }
}

/// Slot of a collider in the world's collider arena.
///
/// The slot doubles as the key of the per-collider impulse accumulator used
/// by the constraint solver, so it must stay stable for the world's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ColliderHandle(pub usize);

impl ColliderHandle {
    /// Create a handle from a raw slot index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the slot index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ColliderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Collider({})", self.0)
    }
}

/// Position and orientation of a rigid body.
///
/// # Example
///
/// ```
/// use sim_types::Pose;
/// use nalgebra::Point3;
///
/// let pose = Pose::from_position(Point3::new(1.0, 2.0, 3.0));
/// let world = pose.transform_point(&Point3::new(1.0, 0.0, 0.0));
/// assert_eq!(world, Point3::new(2.0, 2.0, 3.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose {
    /// Position in world coordinates.
    pub position: Point3<f64>,
    /// Orientation as a unit quaternion.
    pub rotation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    /// Identity pose (origin, no rotation).
    #[must_use]
    pub fn identity() -> Self {
        Self {
            position: Point3::origin(),
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Pose at a position with identity rotation.
    #[must_use]
    pub fn from_position(position: Point3<f64>) -> Self {
        Self {
            position,
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Pose from position and rotation.
    #[must_use]
    pub const fn from_position_rotation(
        position: Point3<f64>,
        rotation: UnitQuaternion<f64>,
    ) -> Self {
        Self { position, rotation }
    }

    /// Convert to an isometry.
    #[must_use]
    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(self.position.coords.into(), self.rotation)
    }

    /// Transform a point from local to world coordinates.
    #[must_use]
    pub fn transform_point(&self, local: &Point3<f64>) -> Point3<f64> {
        self.position + self.rotation * local.coords
    }

    /// Transform a vector from local to world coordinates (rotation only).
    #[must_use]
    pub fn transform_vector(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * local
    }

    /// Transform a point from world to local coordinates.
    #[must_use]
    pub fn inverse_transform_point(&self, world: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation.inverse() * (world - self.position))
    }

    /// Transform a vector from world to local coordinates.
    #[must_use]
    pub fn inverse_transform_vector(&self, world: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse() * world
    }

    /// Compose two poses: `self * other`.
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            position: self.transform_point(&other.position),
            rotation: self.rotation * other.rotation,
        }
    }

    /// Check if the pose contains `NaN` or `Inf` values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.coords.iter().all(|x| x.is_finite())
            && self.rotation.coords.iter().all(|x| x.is_finite())
    }
}

/// Linear and angular velocity of a rigid body, both in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Twist {
    /// Linear velocity (m/s).
    pub linear: Vector3<f64>,
    /// Angular velocity (rad/s).
    pub angular: Vector3<f64>,
}

impl Default for Twist {
    fn default() -> Self {
        Self::zero()
    }
}

impl Twist {
    /// Twist with the given linear and angular velocity.
    #[must_use]
    pub const fn new(linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        Self { linear, angular }
    }

    /// Zero twist (at rest).
    #[must_use]
    pub fn zero() -> Self {
        Self {
            linear: Vector3::zeros(),
            angular: Vector3::zeros(),
        }
    }

    /// Twist with linear velocity only.
    #[must_use]
    pub fn linear(v: Vector3<f64>) -> Self {
        Self {
            linear: v,
            angular: Vector3::zeros(),
        }
    }

    /// Twist with angular velocity only.
    #[must_use]
    pub fn angular(omega: Vector3<f64>) -> Self {
        Self {
            linear: Vector3::zeros(),
            angular: omega,
        }
    }

    /// Velocity of a point offset from the center of mass.
    ///
    /// `v_point` = `v_linear` + omega × r
    #[must_use]
    pub fn velocity_at_point(&self, offset: &Vector3<f64>) -> Vector3<f64> {
        self.linear + self.angular.cross(offset)
    }

    /// Kinetic energy given mass and a world-space inertia tensor.
    #[must_use]
    pub fn kinetic_energy(&self, mass: f64, inertia: &Matrix3<f64>) -> f64 {
        let linear_ke = 0.5 * mass * self.linear.norm_squared();
        let angular_ke = 0.5 * self.angular.dot(&(inertia * self.angular));
        linear_ke + angular_ke
    }

    /// Check if the twist contains `NaN` or `Inf` values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.linear.iter().all(|x| x.is_finite()) && self.angular.iter().all(|x| x.is_finite())
    }
}

/// Pose plus twist of a rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RigidBodyState {
    /// Position and orientation.
    pub pose: Pose,
    /// Linear and angular velocity.
    pub twist: Twist,
}

impl RigidBodyState {
    /// State from pose and twist.
    #[must_use]
    pub const fn new(pose: Pose, twist: Twist) -> Self {
        Self { pose, twist }
    }

    /// State at rest at the given pose.
    #[must_use]
    pub fn at_rest(pose: Pose) -> Self {
        Self {
            pose,
            twist: Twist::zero(),
        }
    }

    /// Check if the state contains `NaN` or `Inf` values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.pose.is_finite() && self.twist.is_finite()
    }
}

/// Mass properties of a rigid body.
///
/// A non-positive or infinite mass marks the body as immovable; such bodies
/// may only back static colliders.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MassProperties {
    /// Total mass in kg.
    pub mass: f64,
    /// Center of mass offset from the body origin, local coordinates.
    pub center_of_mass: Vector3<f64>,
    /// Inertia tensor about the center of mass, local coordinates (kg·m²).
    pub inertia: Matrix3<f64>,
}

impl MassProperties {
    /// Mass properties with explicit values.
    #[must_use]
    pub const fn new(mass: f64, center_of_mass: Vector3<f64>, inertia: Matrix3<f64>) -> Self {
        Self {
            mass,
            center_of_mass,
            inertia,
        }
    }

    /// Mass properties of a uniform solid box.
    ///
    /// With full dimensions (x, y, z):
    /// - Ixx = (1/12) * m * (y² + z²)
    /// - Iyy = (1/12) * m * (x² + z²)
    /// - Izz = (1/12) * m * (x² + y²)
    #[must_use]
    pub fn box_shape(mass: f64, half_extents: Vector3<f64>) -> Self {
        let x2 = 4.0 * half_extents.x * half_extents.x;
        let y2 = 4.0 * half_extents.y * half_extents.y;
        let z2 = 4.0 * half_extents.z * half_extents.z;

        let ixx = mass * (y2 + z2) / 12.0;
        let iyy = mass * (x2 + z2) / 12.0;
        let izz = mass * (x2 + y2) / 12.0;

        Self {
            mass,
            center_of_mass: Vector3::zeros(),
            inertia: Matrix3::from_diagonal(&Vector3::new(ixx, iyy, izz)),
        }
    }

    /// Approximate mass properties of a convex vertex cloud.
    ///
    /// Uses the box inertia of the vertices' bounding box, centered on the
    /// box center. Returns a point mass at the origin for an empty slice.
    #[must_use]
    pub fn convex_hull_approx(mass: f64, vertices: &[Point3<f64>]) -> Self {
        let Some(first) = vertices.first() else {
            return Self::new(mass, Vector3::zeros(), Matrix3::zeros());
        };

        let (min, max) = vertices
            .iter()
            .fold((first.coords, first.coords), |(lo, hi), v| {
                (lo.inf(&v.coords), hi.sup(&v.coords))
            });

        let mut props = Self::box_shape(mass, (max - min) * 0.5);
        props.center_of_mass = (min + max) * 0.5;
        props
    }

    /// Inverse mass (0 for static bodies).
    #[must_use]
    pub fn inverse_mass(&self) -> f64 {
        if self.is_static() {
            0.0
        } else {
            1.0 / self.mass
        }
    }

    /// Inverse of the local inertia tensor, `None` if singular.
    #[must_use]
    pub fn inverse_inertia(&self) -> Option<Matrix3<f64>> {
        self.inertia.try_inverse()
    }

    /// World-space inverse inertia `R · I⁻¹ · Rᵀ` for an orientation.
    ///
    /// Static bodies and singular tensors yield the zero matrix.
    #[must_use]
    pub fn world_inverse_inertia(&self, rotation: &UnitQuaternion<f64>) -> Matrix3<f64> {
        if self.is_static() {
            return Matrix3::zeros();
        }
        self.inverse_inertia().map_or_else(Matrix3::zeros, |local| {
            let r = rotation.to_rotation_matrix().into_inner();
            r * local * r.transpose()
        })
    }

    /// Whether this describes an immovable body.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.mass <= 0.0 || self.mass.is_infinite()
    }

    /// Validate that the mass properties are physically meaningful.
    pub fn validate(&self) -> crate::Result<()> {
        if self.mass.is_nan() || self.mass < 0.0 {
            return Err(crate::SimError::invalid_mass(
                "mass must be a non-negative number",
            ));
        }

        if !self.center_of_mass.iter().all(|x| x.is_finite()) {
            return Err(crate::SimError::invalid_mass(
                "center of mass must be finite",
            ));
        }

        if !self.inertia.iter().all(|x| x.is_finite()) {
            return Err(crate::SimError::invalid_mass(
                "inertia tensor must be finite",
            ));
        }

        let eigenvalues = self.inertia.symmetric_eigenvalues();
        if eigenvalues.iter().any(|&e| e < -1e-10) {
            return Err(crate::SimError::invalid_mass(
                "inertia tensor must be positive semi-definite",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_handles() {
        let body = BodyHandle::new(3);
        assert_eq!(body.index(), 3);
        assert_eq!(body.to_string(), "Body(3)");

        let collider = ColliderHandle::new(7);
        assert_eq!(collider.index(), 7);
        assert_eq!(collider.to_string(), "Collider(7)");
        assert!(ColliderHandle::new(1) < ColliderHandle::new(2));
    }

    #[test]
    fn test_pose_rotation() {
        let pose = Pose::from_position_rotation(
            Point3::origin(),
            UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2),
        );

        let world = pose.transform_vector(&Vector3::x());
        assert_relative_eq!(world.x, 0.0, epsilon = 1e-10);
        assert_relative_eq!(world.y, 1.0, epsilon = 1e-10);

        let back = pose.inverse_transform_vector(&world);
        assert_relative_eq!(back, Vector3::x(), epsilon = 1e-10);
    }

    #[test]
    fn test_pose_point_round_trip() {
        let pose = Pose::from_position_rotation(
            Point3::new(1.0, 2.0, 3.0),
            UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3),
        );
        let local = Point3::new(0.5, -0.25, 2.0);
        let world = pose.transform_point(&local);
        assert_relative_eq!(
            pose.inverse_transform_point(&world).coords,
            local.coords,
            epsilon = 1e-10
        );
        assert_relative_eq!(
            pose.to_isometry().transform_point(&local).coords,
            world.coords,
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_twist_velocity_at_point() {
        let twist = Twist::angular(Vector3::z());
        let v = twist.velocity_at_point(&Vector3::x());
        // (0,0,1) × (1,0,0) = (0,1,0)
        assert_relative_eq!(v, Vector3::y(), epsilon = 1e-10);
    }

    #[test]
    fn test_twist_kinetic_energy() {
        let twist = Twist::linear(Vector3::new(1.0, 0.0, 0.0));
        let ke = twist.kinetic_energy(2.0, &Matrix3::identity());
        assert_relative_eq!(ke, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_mass_properties_box() {
        let props = MassProperties::box_shape(12.0, Vector3::new(0.5, 0.5, 0.5));
        // 1x1x1 box, mass 12: I = (1/12) * 12 * (1 + 1) = 2
        assert_relative_eq!(props.inertia[(0, 0)], 2.0, epsilon = 1e-10);
        assert_relative_eq!(props.inverse_mass(), 1.0 / 12.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mass_properties_convex_hull_approx() {
        let vertices = [
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
            Point3::new(2.0, 0.0, 1.0),
        ];
        let props = MassProperties::convex_hull_approx(6.0, &vertices);
        assert_relative_eq!(props.center_of_mass, Vector3::new(2.0, 0.5, 0.5), epsilon = 1e-12);
        let expected = MassProperties::box_shape(6.0, Vector3::new(1.0, 0.5, 0.5));
        assert_relative_eq!(props.inertia, expected.inertia, epsilon = 1e-12);
    }

    #[test]
    fn test_world_inverse_inertia_rotates() {
        let props = MassProperties::box_shape(1.0, Vector3::new(1.0, 0.5, 0.25));
        let rotation = UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2);
        let world = props.world_inverse_inertia(&rotation);
        let local = props.inverse_inertia().unwrap();

        // A quarter turn about Z swaps the X and Y principal axes.
        assert_relative_eq!(world[(0, 0)], local[(1, 1)], epsilon = 1e-9);
        assert_relative_eq!(world[(1, 1)], local[(0, 0)], epsilon = 1e-9);
        assert_relative_eq!(world[(2, 2)], local[(2, 2)], epsilon = 1e-9);
    }

    #[test]
    fn test_static_mass_has_no_inverse() {
        let props = MassProperties::box_shape(0.0, Vector3::new(1.0, 1.0, 1.0));
        assert!(props.is_static());
        assert_eq!(props.inverse_mass(), 0.0);
        assert_eq!(
            props.world_inverse_inertia(&UnitQuaternion::identity()),
            Matrix3::zeros()
        );

        let infinite = MassProperties::new(f64::INFINITY, Vector3::zeros(), Matrix3::identity());
        assert!(infinite.is_static());
    }

    #[test]
    fn test_mass_properties_validation() {
        let valid = MassProperties::box_shape(1.0, Vector3::new(0.5, 0.5, 0.5));
        assert!(valid.validate().is_ok());

        let negative = MassProperties::new(-1.0, Vector3::zeros(), Matrix3::identity());
        assert!(negative.validate().is_err());

        let nan = MassProperties::new(f64::NAN, Vector3::zeros(), Matrix3::identity());
        assert!(nan.validate().is_err());

        let indefinite = MassProperties::new(
            1.0,
            Vector3::zeros(),
            Matrix3::from_diagonal(&Vector3::new(1.0, -1.0, 1.0)),
        );
        assert!(indefinite.validate().is_err());
    }
}
