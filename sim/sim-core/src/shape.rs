//! Convex collision shapes and their support functions.
//!
//! A support function answers "which point of the shape lies farthest along
//! this direction?". Everything GJK and EPA need from a shape goes through
//! that one query, so adding a shape means adding one match arm.
//!
//! All queries here are in the shape's own unscaled local frame. Rotation,
//! translation and per-axis scale are applied by the collider.

use nalgebra::{Point3, Vector3};
use sim_types::{MassProperties, SimError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Farthest-point query on a convex set.
pub trait SupportMap {
    /// Point of the shape with the largest projection onto `dir`, local frame.
    ///
    /// `dir` need not be normalized but must not be zero.
    fn local_support(&self, dir: &Vector3<f64>) -> Point3<f64>;
}

/// Collision shape of a collider.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CollisionShape {
    /// Box centered on the local origin, aligned with the local axes.
    Box {
        /// Half-extents of the box in each axis.
        half_extents: Vector3<f64>,
    },
    /// Convex mesh defined by a set of vertices.
    ///
    /// Vertices are stored in **local coordinates** and should form a convex
    /// hull. Only the vertex set matters; no faces are stored.
    ConvexMesh {
        /// Vertices of the convex hull in local coordinates.
        vertices: Vec<Point3<f64>>,
    },
}

impl CollisionShape {
    /// Box shape from half-extents.
    #[must_use]
    pub fn box_shape(half_extents: Vector3<f64>) -> Self {
        Self::Box { half_extents }
    }

    /// Cube with the given half-extent on every axis.
    #[must_use]
    pub fn cube(half_extent: f64) -> Self {
        Self::Box {
            half_extents: Vector3::repeat(half_extent),
        }
    }

    /// Convex mesh from its hull vertices.
    #[must_use]
    pub fn convex_mesh(vertices: Vec<Point3<f64>>) -> Self {
        Self::ConvexMesh { vertices }
    }

    /// The eight corners of a box, as a convex mesh.
    #[must_use]
    pub fn box_mesh(half_extents: Vector3<f64>) -> Self {
        let mut vertices = Vec::with_capacity(8);
        for &x in &[-1.0, 1.0] {
            for &y in &[-1.0, 1.0] {
                for &z in &[-1.0, 1.0] {
                    vertices.push(Point3::new(
                        x * half_extents.x,
                        y * half_extents.y,
                        z * half_extents.z,
                    ));
                }
            }
        }
        Self::ConvexMesh { vertices }
    }

    /// Reject shapes that GJK cannot work with.
    ///
    /// Boxes need strictly positive, finite half-extents. Meshes need at
    /// least three finite vertices.
    pub fn validate(&self) -> sim_types::Result<()> {
        match self {
            Self::Box { half_extents } => {
                if half_extents.iter().all(|h| h.is_finite() && *h > 0.0) {
                    Ok(())
                } else {
                    Err(SimError::degenerate_shape(format!(
                        "box half-extents must be positive, got {half_extents:?}"
                    )))
                }
            }
            Self::ConvexMesh { vertices } => {
                if vertices.len() < 3 {
                    return Err(SimError::degenerate_shape(format!(
                        "convex mesh needs at least 3 vertices, got {}",
                        vertices.len()
                    )));
                }
                if !vertices.iter().all(|v| v.iter().all(|x| x.is_finite())) {
                    return Err(SimError::degenerate_shape(
                        "convex mesh vertices must be finite",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Mass properties of a solid of this shape with the given mass.
    ///
    /// Meshes use the inertia of their bounding box.
    #[must_use]
    pub fn default_mass_properties(&self, mass: f64) -> MassProperties {
        match self {
            Self::Box { half_extents } => MassProperties::box_shape(mass, *half_extents),
            Self::ConvexMesh { vertices } => MassProperties::convex_hull_approx(mass, vertices),
        }
    }
}

impl SupportMap for CollisionShape {
    fn local_support(&self, dir: &Vector3<f64>) -> Point3<f64> {
        match self {
            Self::Box { half_extents } => support_box(half_extents, dir),
            Self::ConvexMesh { vertices } => support_convex_mesh(vertices, dir),
        }
    }
}

/// Closed-form box support: the corner whose signs match the direction.
fn support_box(half_extents: &Vector3<f64>, dir: &Vector3<f64>) -> Point3<f64> {
    Point3::new(
        half_extents.x * dir.x.signum(),
        half_extents.y * dir.y.signum(),
        half_extents.z * dir.z.signum(),
    )
}

/// Linear scan for the vertex with the largest projection.
///
/// Ties keep the first vertex in buffer order.
fn support_convex_mesh(vertices: &[Point3<f64>], dir: &Vector3<f64>) -> Point3<f64> {
    let mut max_dot = f64::NEG_INFINITY;
    let mut best_vertex = Point3::origin();

    for vertex in vertices {
        let dot = vertex.coords.dot(dir);
        if dot > max_dot {
            max_dot = dot;
            best_vertex = *vertex;
        }
    }

    best_vertex
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_support_box() {
        let shape = CollisionShape::box_shape(Vector3::new(1.0, 2.0, 3.0));

        let support = shape.local_support(&Vector3::new(1.0, 1.0, 1.0));
        assert_eq!(support, Point3::new(1.0, 2.0, 3.0));

        let support = shape.local_support(&Vector3::new(-1.0, 0.5, -0.1));
        assert_eq!(support, Point3::new(-1.0, 2.0, -3.0));
    }

    #[test]
    fn test_support_box_axis_aligned_direction() {
        let shape = CollisionShape::cube(0.5);
        let dir = Vector3::x();
        let support = shape.local_support(&dir);

        // Zero components pick some corner, which is still extreme along +X.
        assert_relative_eq!(support.x, 0.5);
        assert_relative_eq!(support.coords.dot(&dir), 0.5);
    }

    #[test]
    fn test_support_convex_mesh() {
        let shape = CollisionShape::convex_mesh(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ]);

        assert_eq!(shape.local_support(&Vector3::x()), Point3::new(1.0, 0.0, 0.0));
        assert_eq!(shape.local_support(&Vector3::z()), Point3::new(0.0, 0.0, 1.0));
        assert_eq!(
            shape.local_support(&Vector3::new(-1.0, -1.0, -1.0)),
            Point3::origin()
        );
    }

    #[test]
    fn test_box_mesh_matches_box_support() {
        let half = Vector3::new(0.5, 1.0, 1.5);
        let boxed = CollisionShape::box_shape(half);
        let mesh = CollisionShape::box_mesh(half);

        for dir in [
            Vector3::new(1.0, 0.3, -0.2),
            Vector3::new(-0.7, -0.1, 0.9),
            Vector3::new(0.2, -1.0, 0.4),
        ] {
            let a = boxed.local_support(&dir);
            let b = mesh.local_support(&dir);
            assert_relative_eq!(a.coords.dot(&dir), b.coords.dot(&dir), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_validate() {
        assert!(CollisionShape::cube(0.5).validate().is_ok());
        assert!(CollisionShape::box_mesh(Vector3::repeat(1.0)).validate().is_ok());

        let flat = CollisionShape::box_shape(Vector3::new(1.0, 0.0, 1.0));
        assert!(matches!(
            flat.validate(),
            Err(SimError::DegenerateShape { .. })
        ));

        let line = CollisionShape::convex_mesh(vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)]);
        let err = line.validate().unwrap_err();
        assert!(err.to_string().contains("at least 3 vertices"));

        let nan = CollisionShape::convex_mesh(vec![
            Point3::origin(),
            Point3::new(f64::NAN, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]);
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_default_mass_properties() {
        let shape = CollisionShape::cube(0.5);
        let props = shape.default_mass_properties(12.0);
        assert_relative_eq!(props.inertia[(0, 0)], 2.0, epsilon = 1e-10);

        let mesh = CollisionShape::box_mesh(Vector3::repeat(0.5));
        let mesh_props = mesh.default_mass_properties(12.0);
        assert_relative_eq!(mesh_props.inertia, props.inertia, epsilon = 1e-10);
        assert_relative_eq!(mesh_props.center_of_mass, Vector3::zeros(), epsilon = 1e-12);

        // Off-center meshes put the center of mass at the bounds center
        let wedge = CollisionShape::convex_mesh(vec![
            Point3::new(0.0, -1.0, 0.0),
            Point3::new(2.0, 0.0, 0.5),
            Point3::new(1.0, 3.0, -0.5),
        ]);
        let wedge_props = wedge.default_mass_properties(3.0);
        assert_relative_eq!(wedge_props.center_of_mass, Vector3::new(1.0, 1.0, 0.0), epsilon = 1e-12);
        let expected = MassProperties::box_shape(3.0, Vector3::new(1.0, 2.0, 0.5));
        assert_relative_eq!(wedge_props.inertia, expected.inertia, epsilon = 1e-12);
    }
}
