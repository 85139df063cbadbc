//! Contact geometry produced by narrow-phase detection.

use nalgebra::{Matrix4, Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single contact between two convex colliders.
///
/// The normal points from shape A towards shape B. `world_a` is the point of
/// A deepest inside B and `world_b` the point of B deepest inside A, so for
/// an overlapping pair `world_b - world_a` is `-depth * normal`.
///
/// Local points are expressed in each shape's unscaled local frame. The model
/// matrices map them to world space and include the collider scale.
///
/// # Example
///
/// ```
/// use sim_contact::ContactData;
/// use nalgebra::{Matrix4, Point3, Vector3};
///
/// let contact = ContactData::new(
///     [Point3::new(0.5, 0.0, 0.0), Point3::new(-0.5, 0.0, 0.0)],
///     [Point3::new(0.5, 0.0, 0.0), Point3::new(0.0, 0.0, 0.0)],
///     Vector3::x(),
///     0.5,
///     [Matrix4::identity(), Matrix4::new_translation(&Vector3::new(0.5, 0.0, 0.0))],
/// );
///
/// assert!(contact.is_valid());
/// assert!((contact.separation() + 0.5).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactData {
    /// Contact point on A, in A's local frame.
    pub local_a: Point3<f64>,
    /// Contact point on B, in B's local frame.
    pub local_b: Point3<f64>,
    /// Contact point on A, in world coordinates.
    pub world_a: Point3<f64>,
    /// Contact point on B, in world coordinates.
    pub world_b: Point3<f64>,
    /// Unit contact normal, from A towards B.
    pub normal: Vector3<f64>,
    /// Penetration depth along the normal (m).
    pub depth: f64,
    /// Local-to-world matrix of A at detection time.
    pub model_a: Matrix4<f64>,
    /// Local-to-world matrix of B at detection time.
    pub model_b: Matrix4<f64>,
}

impl ContactData {
    /// Assemble a contact from its local points, world points, normal, depth
    /// and the two model matrices.
    #[must_use]
    pub fn new(
        local: [Point3<f64>; 2],
        world: [Point3<f64>; 2],
        normal: Vector3<f64>,
        depth: f64,
        model: [Matrix4<f64>; 2],
    ) -> Self {
        Self {
            local_a: local[0],
            local_b: local[1],
            world_a: world[0],
            world_b: world[1],
            normal,
            depth,
            model_a: model[0],
            model_b: model[1],
        }
    }

    /// Signed separation `dot(world_b - world_a, normal)`.
    ///
    /// Negative while the shapes interpenetrate.
    #[must_use]
    pub fn separation(&self) -> f64 {
        (self.world_b - self.world_a).dot(&self.normal)
    }

    /// Midpoint between the two world contact points.
    #[must_use]
    pub fn midpoint(&self) -> Point3<f64> {
        nalgebra::center(&self.world_a, &self.world_b)
    }

    /// Whether the contact is finite, has a unit normal and a
    /// non-negative depth.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let finite = self
            .world_a
            .iter()
            .chain(self.world_b.iter())
            .chain(self.local_a.iter())
            .chain(self.local_b.iter())
            .chain(self.normal.iter())
            .all(|x| x.is_finite());

        finite
            && self.depth.is_finite()
            && self.depth >= 0.0
            && (self.normal.norm() - 1.0).abs() < 1e-6
    }
}
