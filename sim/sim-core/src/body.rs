//! Rigid bodies and the colliders attached to them.
//!
//! A [`RigidBody`] carries dynamic state; a [`Collider`] carries geometry and
//! classification. A body has at most one collider. Static colliders may
//! exist without any body.

use nalgebra::{Isometry3, Matrix3, Matrix4, Point3, Vector3};
use sim_contact::{Mobility, SolverBody};
use sim_types::{BodyHandle, MassProperties, Pose, RigidBodyState, SimError, Twist};

use crate::shape::{CollisionShape, SupportMap};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a collider (and the body behind it) takes part in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ColliderKind {
    /// Immovable geometry. Contributes zero inverse mass to every contact.
    Static,
    /// Fully simulated.
    #[default]
    Dynamic,
    /// Moved by its own velocity only. Gravity, forces and contacts do not
    /// affect it.
    Kinematic,
}

impl ColliderKind {
    /// The solver's view of this kind.
    #[must_use]
    pub const fn mobility(self) -> Mobility {
        match self {
            Self::Static => Mobility::Static,
            Self::Dynamic => Mobility::Dynamic,
            Self::Kinematic => Mobility::Kinematic,
        }
    }

    /// Whether this kind needs a body with positive, finite mass.
    #[must_use]
    pub const fn needs_mass(self) -> bool {
        matches!(self, Self::Dynamic | Self::Kinematic)
    }
}

/// A rigid body in the simulation world.
///
/// The pose tracks the body's center of mass; rotation is about that point.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RigidBody {
    /// Current state (pose + twist).
    pub state: RigidBodyState,
    /// Twist before the most recent integration step.
    pub previous_twist: Twist,
    /// Accumulated external force (consumed by integration).
    pub accumulated_force: Vector3<f64>,
    /// Accumulated external torque (consumed by integration).
    pub accumulated_torque: Vector3<f64>,
    /// Whether world gravity applies.
    pub affected_by_gravity: bool,
    mass_props: MassProperties,
    inverse_mass: f64,
    world_inverse_inertia: Matrix3<f64>,
    kind: ColliderKind,
}

impl RigidBody {
    /// Create a dynamic body.
    #[must_use]
    pub fn new(state: RigidBodyState, mass_props: MassProperties) -> Self {
        let mut body = Self {
            state,
            previous_twist: state.twist,
            accumulated_force: Vector3::zeros(),
            accumulated_torque: Vector3::zeros(),
            affected_by_gravity: true,
            mass_props,
            inverse_mass: 0.0,
            world_inverse_inertia: Matrix3::zeros(),
            kind: ColliderKind::Dynamic,
        };
        body.refresh_mass();
        body
    }

    /// Create a body at rest at the given pose.
    #[must_use]
    pub fn at_rest(pose: Pose, mass_props: MassProperties) -> Self {
        Self::new(RigidBodyState::at_rest(pose), mass_props)
    }

    /// Set the initial twist.
    #[must_use]
    pub fn with_twist(mut self, twist: Twist) -> Self {
        self.state.twist = twist;
        self.previous_twist = twist;
        self
    }

    /// Enable or disable gravity for this body.
    #[must_use]
    pub fn with_gravity(mut self, affected: bool) -> Self {
        self.affected_by_gravity = affected;
        self
    }

    /// How this body moves. Set when a collider is attached.
    #[must_use]
    pub fn kind(&self) -> ColliderKind {
        self.kind
    }

    pub(crate) fn set_kind(&mut self, kind: ColliderKind) {
        self.kind = kind;
        self.refresh_mass();
    }

    /// Mass properties.
    #[must_use]
    pub fn mass_props(&self) -> &MassProperties {
        &self.mass_props
    }

    /// Inverse mass (0 unless dynamic).
    #[must_use]
    pub fn inverse_mass(&self) -> f64 {
        self.inverse_mass
    }

    /// World-space inverse inertia `R · I⁻¹ · Rᵀ` (0 unless dynamic).
    #[must_use]
    pub fn world_inverse_inertia(&self) -> &Matrix3<f64> {
        &self.world_inverse_inertia
    }

    /// Recompute the cached inverse mass and world inverse inertia.
    pub fn refresh_mass(&mut self) {
        if self.kind == ColliderKind::Dynamic {
            self.inverse_mass = self.mass_props.inverse_mass();
            self.world_inverse_inertia = self
                .mass_props
                .world_inverse_inertia(&self.state.pose.rotation);
        } else {
            self.inverse_mass = 0.0;
            self.world_inverse_inertia = Matrix3::zeros();
        }
    }

    /// World-space center of mass.
    #[must_use]
    pub fn center(&self) -> Point3<f64> {
        self.state.pose.position
    }

    /// Whether forces and impulses change this body's velocity.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.kind == ColliderKind::Dynamic
    }

    /// Apply a force at the center of mass.
    pub fn apply_force(&mut self, force: Vector3<f64>) {
        if self.is_dynamic() {
            self.accumulated_force += force;
        }
    }

    /// Apply a torque.
    pub fn apply_torque(&mut self, torque: Vector3<f64>) {
        if self.is_dynamic() {
            self.accumulated_torque += torque;
        }
    }

    /// Apply a force at a world-space point.
    pub fn apply_force_at_point(&mut self, force: Vector3<f64>, point: Point3<f64>) {
        if self.is_dynamic() {
            self.accumulated_force += force;
            // Torque: r × F where r is from COM to point
            let r = point - self.center();
            self.accumulated_torque += r.cross(&force);
        }
    }

    /// Apply an instantaneous impulse at a world-space point.
    pub fn apply_impulse(&mut self, impulse: Vector3<f64>, point: Point3<f64>) {
        if self.is_dynamic() {
            let r = point - self.center();
            self.state.twist.linear += impulse * self.inverse_mass;
            self.state.twist.angular += self.world_inverse_inertia * r.cross(&impulse);
        }
    }

    /// Clear accumulated forces and torques.
    pub fn clear_forces(&mut self) {
        self.accumulated_force = Vector3::zeros();
        self.accumulated_torque = Vector3::zeros();
    }

    /// Linear acceleration from accumulated force and gravity.
    #[must_use]
    pub fn linear_acceleration(&self, gravity: &Vector3<f64>) -> Vector3<f64> {
        if !self.is_dynamic() {
            return Vector3::zeros();
        }
        let from_force = self.accumulated_force * self.inverse_mass;
        if self.affected_by_gravity {
            from_force + gravity
        } else {
            from_force
        }
    }

    /// Angular acceleration from accumulated torque.
    #[must_use]
    pub fn angular_acceleration(&self) -> Vector3<f64> {
        self.world_inverse_inertia * self.accumulated_torque
    }

    /// Kinetic energy (0 unless dynamic).
    #[must_use]
    pub fn kinetic_energy(&self) -> f64 {
        if !self.is_dynamic() {
            return 0.0;
        }
        let inertia = self
            .world_inverse_inertia
            .try_inverse()
            .unwrap_or_else(Matrix3::zeros);
        self.state
            .twist
            .kinetic_energy(self.mass_props.mass, &inertia)
    }

    /// The solver's snapshot of this body.
    #[must_use]
    pub fn solver_body(&self) -> SolverBody {
        SolverBody {
            mobility: self.kind.mobility(),
            center: self.center(),
            linear_velocity: self.state.twist.linear,
            angular_velocity: self.state.twist.angular,
            inverse_mass: self.inverse_mass,
            inverse_inertia: self.world_inverse_inertia,
            force: self.accumulated_force,
            torque: self.accumulated_torque,
        }
    }
}

/// Collision geometry attached to a body, or standing alone if static.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Collider {
    /// Collision shape.
    pub shape: CollisionShape,
    /// Classification.
    pub kind: ColliderKind,
    /// Owning body, if any.
    pub body: Option<BodyHandle>,
    /// Pose relative to the body (or the world, without a body).
    pub offset: Pose,
    /// Per-axis scale applied to the shape before the offset.
    pub scale: Vector3<f64>,
    /// Restitution coefficient. `None` uses the world default.
    pub restitution: Option<f64>,
    transform: Isometry3<f64>,
}

impl Collider {
    /// Create a collider with identity offset and unit scale.
    #[must_use]
    pub fn new(shape: CollisionShape, kind: ColliderKind) -> Self {
        Self {
            shape,
            kind,
            body: None,
            offset: Pose::identity(),
            scale: Vector3::repeat(1.0),
            restitution: None,
            transform: Isometry3::identity(),
        }
    }

    /// Static collider placed at a world pose.
    #[must_use]
    pub fn fixed(shape: CollisionShape, pose: Pose) -> Self {
        let mut collider = Self::new(shape, ColliderKind::Static).with_offset(pose);
        collider.update_transform(None);
        collider
    }

    /// Attach to a body.
    #[must_use]
    pub fn attached_to(mut self, body: BodyHandle) -> Self {
        self.body = Some(body);
        self
    }

    /// Set the local offset pose.
    #[must_use]
    pub fn with_offset(mut self, offset: Pose) -> Self {
        self.offset = offset;
        self.transform = offset.to_isometry();
        self
    }

    /// Set the per-axis scale.
    #[must_use]
    pub fn with_scale(mut self, scale: Vector3<f64>) -> Self {
        self.scale = scale;
        self
    }

    /// Set the restitution coefficient.
    #[must_use]
    pub fn with_restitution(mut self, restitution: f64) -> Self {
        self.restitution = Some(restitution);
        self
    }

    /// Reject colliders that cannot take part in collision queries.
    pub fn validate(&self) -> sim_types::Result<()> {
        self.shape.validate()?;

        if !self.scale.iter().all(|s| s.is_finite() && *s > 0.0) {
            return Err(SimError::degenerate_shape(format!(
                "collider scale must be positive, got {:?}",
                self.scale
            )));
        }

        if let Some(e) = self.restitution {
            if !(0.0..=1.0).contains(&e) {
                return Err(SimError::invalid_config(
                    "collider restitution must be between 0 and 1",
                ));
            }
        }

        if !self.offset.is_finite() {
            return Err(SimError::invalid_config("collider offset must be finite"));
        }

        Ok(())
    }

    /// Cached local-to-world rigid transform (no scale).
    #[must_use]
    pub fn transform(&self) -> &Isometry3<f64> {
        &self.transform
    }

    /// Local-to-world matrix including scale.
    #[must_use]
    pub fn model_matrix(&self) -> Matrix4<f64> {
        self.transform.to_homogeneous() * Matrix4::new_nonuniform_scaling(&self.scale)
    }

    /// Refresh the cached transform from the owning body's pose.
    pub fn update_transform(&mut self, body_pose: Option<&Pose>) {
        let pose = body_pose.map_or(self.offset, |p| p.compose(&self.offset));
        self.transform = pose.to_isometry();
    }

    /// Map a point from the shape's local frame to world space.
    #[must_use]
    pub fn local_to_world(&self, local: &Point3<f64>) -> Point3<f64> {
        self.transform
            .transform_point(&Point3::from(local.coords.component_mul(&self.scale)))
    }

    /// Support point for a world-space direction.
    ///
    /// Returns `(local, world)`: the extreme point in the shape's unscaled
    /// local frame and the same point in world space.
    #[must_use]
    pub fn support(&self, world_dir: &Vector3<f64>) -> (Point3<f64>, Point3<f64>) {
        // Under scale S the support of S·X along d is S·support_X(S·d).
        let rotated = self.transform.rotation.inverse_transform_vector(world_dir);
        let local = self.shape.local_support(&rotated.component_mul(&self.scale));
        (local, self.local_to_world(&local))
    }

    /// World-space position of the collider origin.
    #[must_use]
    pub fn position(&self) -> Point3<f64> {
        Point3::from(self.transform.translation.vector)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;

    fn unit_box_body() -> RigidBody {
        RigidBody::at_rest(
            Pose::from_position(Point3::new(0.0, 0.0, 1.0)),
            MassProperties::box_shape(1.0, Vector3::repeat(0.5)),
        )
    }

    #[test]
    fn test_body_caches_inverse_mass() {
        let body = unit_box_body();
        assert_relative_eq!(body.inverse_mass(), 1.0);
        assert_relative_eq!(body.world_inverse_inertia()[(0, 0)], 6.0, epsilon = 1e-10);
        assert!(body.is_dynamic());
    }

    #[test]
    fn test_kinematic_body_ignores_forces() {
        let mut body = unit_box_body();
        body.set_kind(ColliderKind::Kinematic);
        body.apply_force(Vector3::new(1.0, 0.0, 0.0));
        body.apply_impulse(Vector3::new(1.0, 0.0, 0.0), Point3::origin());

        assert_eq!(body.accumulated_force, Vector3::zeros());
        assert_eq!(body.state.twist, Twist::zero());
        assert_eq!(body.inverse_mass(), 0.0);
        assert_eq!(body.linear_acceleration(&Vector3::new(0.0, 0.0, -9.81)), Vector3::zeros());
    }

    #[test]
    fn test_apply_force_at_point_adds_torque() {
        let mut body = unit_box_body();
        body.apply_force_at_point(Vector3::new(0.0, 1.0, 0.0), Point3::new(1.0, 0.0, 1.0));

        assert_relative_eq!(body.accumulated_force, Vector3::new(0.0, 1.0, 0.0));
        // (1,0,0) × (0,1,0) = (0,0,1)
        assert_relative_eq!(body.accumulated_torque, Vector3::new(0.0, 0.0, 1.0));

        body.clear_forces();
        assert_eq!(body.accumulated_torque, Vector3::zeros());
    }

    #[test]
    fn test_apply_impulse_off_center_spins() {
        let mut body = unit_box_body();
        body.apply_impulse(Vector3::new(0.0, 1.0, 0.0), Point3::new(0.5, 0.0, 1.0));

        assert_relative_eq!(body.state.twist.linear, Vector3::new(0.0, 1.0, 0.0));
        assert_relative_eq!(body.state.twist.angular.z, 0.5 * 6.0, epsilon = 1e-10);
    }

    #[test]
    fn test_linear_acceleration_with_gravity() {
        let gravity = Vector3::new(0.0, 0.0, -9.81);
        let mut body = unit_box_body();
        body.apply_force(Vector3::new(2.0, 0.0, 0.0));
        assert_relative_eq!(
            body.linear_acceleration(&gravity),
            Vector3::new(2.0, 0.0, -9.81)
        );

        let floating = unit_box_body().with_gravity(false);
        assert_eq!(floating.linear_acceleration(&gravity), Vector3::zeros());
    }

    #[test]
    fn test_kinetic_energy() {
        let body = unit_box_body().with_twist(Twist::linear(Vector3::new(2.0, 0.0, 0.0)));
        assert_relative_eq!(body.kinetic_energy(), 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_collider_transform_follows_body() {
        let mut collider = Collider::new(CollisionShape::cube(0.5), ColliderKind::Dynamic)
            .with_offset(Pose::from_position(Point3::new(0.0, 0.0, 0.5)));
        let body_pose = Pose::from_position_rotation(
            Point3::new(1.0, 0.0, 0.0),
            UnitQuaternion::from_euler_angles(std::f64::consts::PI, 0.0, 0.0),
        );
        collider.update_transform(Some(&body_pose));

        // A half turn about X flips the offset to -Z.
        assert_relative_eq!(
            collider.position().coords,
            Vector3::new(1.0, 0.0, -0.5),
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_scaled_support() {
        let collider = Collider::fixed(CollisionShape::cube(0.5), Pose::from_position(Point3::new(0.0, 0.0, -1.0)))
            .with_scale(Vector3::new(10.0, 10.0, 1.0));

        let (local, world) = collider.support(&Vector3::new(1.0, 1.0, 1.0));
        assert_eq!(local, Point3::new(0.5, 0.5, 0.5));
        assert_relative_eq!(world.coords, Vector3::new(5.0, 5.0, -0.5), epsilon = 1e-12);

        let model = collider.model_matrix();
        assert_relative_eq!(
            model.transform_point(&local).coords,
            world.coords,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_rotated_support() {
        let collider = Collider::fixed(
            CollisionShape::box_shape(Vector3::new(2.0, 0.5, 0.5)),
            Pose::from_position_rotation(
                Point3::origin(),
                UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2),
            ),
        );

        // The long axis now points along world Y.
        let (_, world) = collider.support(&Vector3::new(0.1, 1.0, 0.1));
        assert_relative_eq!(world.y, 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_collider_validation() {
        let ok = Collider::new(CollisionShape::cube(1.0), ColliderKind::Dynamic);
        assert!(ok.validate().is_ok());

        let flat = ok.clone().with_scale(Vector3::new(1.0, 0.0, 1.0));
        assert!(matches!(flat.validate(), Err(SimError::DegenerateShape { .. })));

        let bouncy = ok.with_restitution(1.5);
        assert!(bouncy.validate().unwrap_err().is_config_error());
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ColliderKind::Static.mobility(), Mobility::Static);
        assert_eq!(ColliderKind::Kinematic.mobility(), Mobility::Kinematic);
        assert_eq!(ColliderKind::default(), ColliderKind::Dynamic);
        assert!(ColliderKind::Dynamic.needs_mass());
        assert!(ColliderKind::Kinematic.needs_mass());
        assert!(!ColliderKind::Static.needs_mass());
    }
}
