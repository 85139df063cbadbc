//! GJK (Gilbert-Johnson-Keerthi) and EPA (Expanding Polytope Algorithm) implementation.
//!
//! Narrow-phase collision detection for convex colliders. GJK decides whether
//! two colliders overlap; on overlap EPA measures by how much and where.
//!
//! # Algorithm Overview
//!
//! ## GJK
//!
//! Two convex shapes overlap iff their Minkowski difference `A - B` contains
//! the origin. GJK builds a simplex (point, line, triangle, tetrahedron) of
//! Minkowski vertices, each step keeping only the feature closest to the
//! origin, until a tetrahedron encloses the origin or a support point fails
//! to pass it.
//!
//! ## EPA
//!
//! Starting from GJK's enclosing tetrahedron, EPA grows a convex polytope
//! towards the face of `A - B` closest to the origin. That face gives the
//! contact normal (A towards B) and the penetration depth. Barycentric
//! weights of the origin's projection on it interpolate the per-shape
//! support points into the contact points.
//!
//! # Usage
//!
//! ```
//! use sim_core::gjk_epa::{gjk_epa_contact, gjk_intersection};
//! use sim_core::{Collider, CollisionShape};
//! use sim_types::Pose;
//! use nalgebra::Point3;
//!
//! let a = Collider::fixed(CollisionShape::cube(0.5), Pose::identity());
//! let b = Collider::fixed(
//!     CollisionShape::cube(0.5),
//!     Pose::from_position(Point3::new(0.5, 0.0, 0.0)),
//! );
//!
//! assert!(gjk_intersection(&a, &b).is_some());
//!
//! let contact = gjk_epa_contact(&a, &b).unwrap();
//! assert!((contact.depth - 0.5).abs() < 1e-3);
//! assert!((contact.normal.x - 1.0).abs() < 1e-6);
//! ```
//!
//! # References
//!
//! - Gilbert, Johnson, Keerthi: "A Fast Procedure for Computing the Distance
//!   Between Complex Objects in Three-Dimensional Space" (1988)
//! - van den Bergen: "Collision Detection in Interactive 3D Environments" (2003)
//! - Ericson: "Real-Time Collision Detection" (2004), barycentric coordinates
//! - Casey Muratori's GJK video series

use nalgebra::{Point3, Vector3};
use sim_contact::ContactData;
use tracing::debug;

use crate::body::Collider;
use crate::debug::{DebugSink, NullDebugSink};

/// Tolerance for degenerate directions and faces.
const EPSILON: f64 = 1e-10;

/// Maximum iterations for GJK before giving up.
pub const GJK_MAX_ITERATIONS: usize = 75;

/// Maximum iterations for EPA before giving up.
pub const EPA_MAX_ITERATIONS: usize = 50;

/// EPA convergence tolerance.
pub const EPA_TOLERANCE: f64 = 1e-4;

/// Slack on barycentric weights before a projection counts as outside.
const BARYCENTRIC_TOLERANCE: f64 = 1e-6;

/// Faces this close to the closest distance count as tied with it.
const FACE_TIE_TOLERANCE: f64 = 1e-6;

/// Default first search direction. Not axis-aligned.
const INITIAL_DIRECTION: Vector3<f64> = Vector3::new(1.0, 0.5, 0.25);

/// Used when the first support point lines up with [`INITIAL_DIRECTION`].
const FALLBACK_DIRECTION: Vector3<f64> = Vector3::new(-0.25, 1.0, 0.5);

/// A vertex of the Minkowski difference and the shape points behind it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupportPoint {
    /// `world_a - world_b`.
    pub minkowski: Vector3<f64>,
    /// Support point of A in A's unscaled local frame.
    pub local_a: Point3<f64>,
    /// Support point of B in B's unscaled local frame.
    pub local_b: Point3<f64>,
    /// Support point of A in world space.
    pub world_a: Point3<f64>,
    /// Support point of B in world space.
    pub world_b: Point3<f64>,
}

impl Default for SupportPoint {
    fn default() -> Self {
        Self {
            minkowski: Vector3::zeros(),
            local_a: Point3::origin(),
            local_b: Point3::origin(),
            world_a: Point3::origin(),
            world_b: Point3::origin(),
        }
    }
}

/// Support point of `A - B` along a world-space direction.
///
/// A is queried along `direction`, B along `-direction`.
#[must_use]
pub fn minkowski_support(a: &Collider, b: &Collider, direction: &Vector3<f64>) -> SupportPoint {
    let (local_a, world_a) = a.support(direction);
    let (local_b, world_b) = b.support(&-direction);
    SupportPoint {
        minkowski: world_a - world_b,
        local_a,
        local_b,
        world_a,
        world_b,
    }
}

/// A simplex used in GJK iteration.
///
/// Holds one to four points, newest first.
#[derive(Debug, Clone, Default)]
pub struct Simplex {
    points: [SupportPoint; 4],
    size: usize,
}

impl Simplex {
    /// Create a new empty simplex.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a point to the front. Past four points the oldest is dropped.
    pub fn push(&mut self, point: SupportPoint) {
        for i in (1..=self.size.min(3)).rev() {
            self.points[i] = self.points[i - 1];
        }
        self.points[0] = point;
        self.size = (self.size + 1).min(4);
    }

    /// Get the number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.size
    }

    /// Check if the simplex is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Get points as a slice, newest first.
    #[must_use]
    pub fn points(&self) -> &[SupportPoint] {
        &self.points[..self.size]
    }

    /// Keep only the points at `indices`, in that order.
    fn keep(&mut self, indices: &[usize]) {
        let old = self.points;
        for (slot, &i) in indices.iter().take(4).enumerate() {
            self.points[slot] = old[i];
        }
        self.size = indices.len().min(4);
    }
}

/// Outcome of the tetrahedron test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TetrahedronRegion {
    /// All three faces through the newest vertex have the origin behind them.
    ContainsOrigin,
    /// The origin is in front of the face made of these simplex slots.
    ShrinkTo([usize; 3]),
}

/// Locate the origin relative to a tetrahedron `[a, b, c, d]` (newest first).
///
/// Only the three faces through `a` are tested; the base `bcd` was already
/// known to face the origin when `a` was found.
#[must_use]
pub fn tetrahedron_region(
    a: &Vector3<f64>,
    b: &Vector3<f64>,
    c: &Vector3<f64>,
    d: &Vector3<f64>,
) -> TetrahedronRegion {
    let ab = b - a;
    let ac = c - a;
    let ad = d - a;
    let ao = -a;

    let abc = ab.cross(&ac);
    let acd = ac.cross(&ad);
    let adb = ad.cross(&ab);

    if abc.dot(&ao) > 0.0 {
        TetrahedronRegion::ShrinkTo([0, 1, 2])
    } else if acd.dot(&ao) > 0.0 {
        TetrahedronRegion::ShrinkTo([0, 2, 3])
    } else if adb.dot(&ao) > 0.0 {
        TetrahedronRegion::ShrinkTo([0, 3, 1])
    } else {
        TetrahedronRegion::ContainsOrigin
    }
}

/// Check whether two colliders overlap.
///
/// Returns the enclosing tetrahedron on overlap, for hand-off to [`epa_contact`].
/// Touching without overlap counts as separated.
#[must_use]
pub fn gjk_intersection(a: &Collider, b: &Collider) -> Option<Simplex> {
    gjk_intersection_with(a, b, &mut NullDebugSink)
}

/// [`gjk_intersection`], reporting each simplex to `sink`.
pub fn gjk_intersection_with(
    a: &Collider,
    b: &Collider,
    sink: &mut dyn DebugSink,
) -> Option<Simplex> {
    let mut direction = INITIAL_DIRECTION;
    let mut first = minkowski_support(a, b, &direction);

    // A first point (anti)parallel to the search direction tends to produce
    // a zero direction a few steps later.
    let aligned = first.minkowski.cross(&direction).norm_squared()
        <= 1e-12 * first.minkowski.norm_squared() * direction.norm_squared();
    if aligned {
        direction = FALLBACK_DIRECTION;
        first = minkowski_support(a, b, &direction);
    }

    let mut simplex = Simplex::new();
    simplex.push(first);
    direction = -first.minkowski;

    for iteration in 0..GJK_MAX_ITERATIONS {
        if direction.norm_squared() < EPSILON * EPSILON {
            debug!(iteration, "GJK search direction collapsed");
            return None;
        }

        let point = minkowski_support(a, b, &direction);
        simplex.push(point);
        sink.simplex(simplex.points());

        // The new point did not get past the origin
        if point.minkowski.dot(&direction) <= 0.0 {
            return None;
        }

        if let Some(next) = evolve_simplex(&mut simplex) {
            direction = next;
        } else {
            return Some(simplex);
        }
    }

    debug!(
        iterations = GJK_MAX_ITERATIONS,
        "GJK reached its iteration cap"
    );
    None
}

/// Shrink the simplex to the feature nearest the origin.
///
/// Returns the next search direction, or `None` once a tetrahedron encloses
/// the origin.
fn evolve_simplex(simplex: &mut Simplex) -> Option<Vector3<f64>> {
    match simplex.len() {
        2 => Some(line_case(simplex)),
        3 => Some(triangle_case(simplex)),
        4 => {
            let p = simplex.points();
            match tetrahedron_region(&p[0].minkowski, &p[1].minkowski, &p[2].minkowski, &p[3].minkowski)
            {
                TetrahedronRegion::ContainsOrigin => None,
                TetrahedronRegion::ShrinkTo(face) => {
                    simplex.keep(&face);
                    Some(triangle_case(simplex))
                }
            }
        }
        _ => Some(-simplex.points[0].minkowski),
    }
}

/// Line simplex `[a, b]`, closest point by projection.
fn line_case(simplex: &mut Simplex) -> Vector3<f64> {
    let a = simplex.points[0].minkowski;
    let ab = simplex.points[1].minkowski - a;
    let ao = -a;

    if ab.dot(&ao) > 0.0 {
        edge_direction(&a, &ab)
    } else {
        simplex.keep(&[0]);
        ao
    }
}

/// Triangle simplex `[a, b, c]`.
fn triangle_case(simplex: &mut Simplex) -> Vector3<f64> {
    let a = simplex.points[0].minkowski;
    let ab = simplex.points[1].minkowski - a;
    let ac = simplex.points[2].minkowski - a;
    let ao = -a;

    let abc = ab.cross(&ac);
    let ab_normal = ab.cross(&abc);
    let ac_normal = abc.cross(&ac);

    if ac_normal.dot(&ao) > 0.0 {
        if ac.dot(&ao) > 0.0 {
            simplex.keep(&[0, 2]);
            return edge_direction(&a, &ac);
        }
        return ab_or_vertex(simplex, &a, &ab);
    }

    if ab_normal.dot(&ao) > 0.0 {
        return ab_or_vertex(simplex, &a, &ab);
    }

    if abc.dot(&ao) > 0.0 {
        abc
    } else {
        simplex.keep(&[0, 2, 1]);
        -abc
    }
}

fn ab_or_vertex(simplex: &mut Simplex, a: &Vector3<f64>, ab: &Vector3<f64>) -> Vector3<f64> {
    if ab.dot(&-a) > 0.0 {
        simplex.keep(&[0, 1]);
        edge_direction(a, ab)
    } else {
        simplex.keep(&[0]);
        -a
    }
}

/// Direction from the closest point of segment `a + t·ab` towards the origin.
///
/// If the origin lies on the segment, any perpendicular will do.
fn edge_direction(a: &Vector3<f64>, ab: &Vector3<f64>) -> Vector3<f64> {
    let len_sq = ab.norm_squared();
    if len_sq < EPSILON * EPSILON {
        return -a;
    }
    let t = (-a.dot(ab) / len_sq).clamp(0.0, 1.0);
    let closest = a + ab * t;
    if closest.norm_squared() < EPSILON * EPSILON {
        any_perpendicular(ab)
    } else {
        -closest
    }
}

fn any_perpendicular(v: &Vector3<f64>) -> Vector3<f64> {
    let axis = if v.x.abs() < v.y.abs() && v.x.abs() < v.z.abs() {
        Vector3::x()
    } else if v.y.abs() < v.z.abs() {
        Vector3::y()
    } else {
        Vector3::z()
    };
    v.cross(&axis)
}

// =============================================================================
// EPA Algorithm
// =============================================================================

/// A face in the EPA polytope.
#[derive(Debug, Clone)]
struct EpaFace {
    /// Indices of the three vertices, counter-clockwise seen from outside.
    vertices: [usize; 3],
    /// Outward unit normal.
    normal: Vector3<f64>,
    /// Distance from the origin to the face plane along the normal.
    distance: f64,
}

/// Compute the contact for an overlap GJK has confirmed.
///
/// Returns `None` if the simplex is not a tetrahedron, EPA does not converge
/// within its iteration cap, or the origin projects outside every closest face.
#[must_use]
pub fn epa_contact(simplex: &Simplex, a: &Collider, b: &Collider) -> Option<ContactData> {
    epa_contact_with(simplex, a, b, &mut NullDebugSink)
}

/// [`epa_contact`], reporting the final polytope and contact to `sink`.
pub fn epa_contact_with(
    simplex: &Simplex,
    a: &Collider,
    b: &Collider,
    sink: &mut dyn DebugSink,
) -> Option<ContactData> {
    if simplex.len() < 4 {
        return None;
    }

    let mut vertices: Vec<SupportPoint> = simplex.points().to_vec();
    let mut faces: Vec<EpaFace> = [[0, 1, 2], [0, 2, 3], [0, 3, 1], [1, 3, 2]]
        .into_iter()
        .filter_map(|indices| create_face(&vertices, indices))
        .collect();
    fix_face_orientations(&vertices, &mut faces);

    let mut horizon: Vec<(usize, usize)> = Vec::new();

    for _ in 0..EPA_MAX_ITERATIONS {
        let closest_idx = find_closest_face(&faces)?;
        let closest = faces[closest_idx].clone();

        let point = minkowski_support(a, b, &closest.normal);
        if point.minkowski.dot(&closest.normal) - closest.distance < EPA_TOLERANCE {
            for face in &faces {
                sink.polytope_face(face.vertices.map(|i| Point3::from(vertices[i].minkowski)));
            }
            let contact = closest_contact(&faces, &closest, &vertices, a, b)?;
            sink.contact(&contact);
            return Some(contact);
        }

        let new_index = vertices.len();
        vertices.push(point);

        // Remove every face the new point can see, keeping the horizon.
        let mut i = 0;
        while i < faces.len() {
            let face = &faces[i];
            let on_face = vertices[face.vertices[0]].minkowski;
            if face.normal.dot(&(point.minkowski - on_face)) > 0.0 {
                let [v0, v1, v2] = face.vertices;
                add_edge(&mut horizon, v0, v1);
                add_edge(&mut horizon, v1, v2);
                add_edge(&mut horizon, v2, v0);
                faces.swap_remove(i);
            } else {
                i += 1;
            }
        }

        for (v0, v1) in horizon.drain(..) {
            if let Some(face) = create_face(&vertices, [new_index, v0, v1]) {
                faces.push(face);
            }
        }
    }

    debug!(
        iterations = EPA_MAX_ITERATIONS,
        faces = faces.len(),
        "EPA reached its iteration cap"
    );
    None
}

/// Run GJK and, on overlap, EPA.
#[must_use]
pub fn gjk_epa_contact(a: &Collider, b: &Collider) -> Option<ContactData> {
    gjk_epa_contact_with(a, b, &mut NullDebugSink)
}

/// [`gjk_epa_contact`], reporting intermediate data to `sink`.
pub fn gjk_epa_contact_with(
    a: &Collider,
    b: &Collider,
    sink: &mut dyn DebugSink,
) -> Option<ContactData> {
    let simplex = gjk_intersection_with(a, b, sink)?;
    epa_contact_with(&simplex, a, b, sink)
}

fn create_face(vertices: &[SupportPoint], indices: [usize; 3]) -> Option<EpaFace> {
    let a = vertices[indices[0]].minkowski;
    let b = vertices[indices[1]].minkowski;
    let c = vertices[indices[2]].minkowski;

    let normal = (b - a).cross(&(c - a));
    let norm = normal.norm();
    if norm < EPSILON {
        return None;
    }

    let normal = normal / norm;
    Some(EpaFace {
        vertices: indices,
        normal,
        distance: normal.dot(&a),
    })
}

/// Flip any seed face whose normal points at the tetrahedron's centroid.
fn fix_face_orientations(vertices: &[SupportPoint], faces: &mut [EpaFace]) {
    #[allow(clippy::cast_precision_loss)]
    let centroid = vertices.iter().map(|v| v.minkowski).sum::<Vector3<f64>>() / vertices.len() as f64;

    for face in faces.iter_mut() {
        let to_centroid = centroid - vertices[face.vertices[0]].minkowski;
        if face.normal.dot(&to_centroid) > 0.0 {
            face.normal = -face.normal;
            face.distance = -face.distance;
            face.vertices.swap(1, 2);
        }
    }
}

/// Face with the smallest plane distance. Earlier faces win ties.
fn find_closest_face(faces: &[EpaFace]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, face) in faces.iter().enumerate() {
        match best {
            Some((_, d)) if face.distance >= d => {}
            _ => best = Some((i, face.distance)),
        }
    }
    best.map(|(i, _)| i)
}

/// Add a horizon edge, or cancel it against its reverse.
fn add_edge(edges: &mut Vec<(usize, usize)>, v0: usize, v1: usize) {
    if let Some(idx) = edges.iter().position(|&(a, b)| a == v1 && b == v0) {
        edges.remove(idx);
    } else {
        edges.push((v0, v1));
    }
}

/// Barycentric weights `(u, v, w)` of `p` in triangle `abc`.
///
/// `None` for a degenerate triangle. The point is assumed to lie in the
/// triangle's plane.
#[must_use]
pub fn barycentric(
    p: &Vector3<f64>,
    a: &Vector3<f64>,
    b: &Vector3<f64>,
    c: &Vector3<f64>,
) -> Option<[f64; 3]> {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;

    let d00 = v0.dot(&v0);
    let d01 = v0.dot(&v1);
    let d11 = v1.dot(&v1);
    let d20 = v2.dot(&v0);
    let d21 = v2.dot(&v1);

    let denom = d00 * d11 - d01 * d01;
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    let u = 1.0 - v - w;

    let weights = [u, v, w];
    if weights.iter().all(|x| x.is_finite()) {
        Some(weights)
    } else {
        None
    }
}

/// Contact from the closest face, or from a face tied with it.
///
/// A flat side of the Minkowski difference is split into coplanar triangles
/// and only one of them contains the origin's projection. The closest face
/// is tried first, then the tied faces in polytope order.
fn closest_contact(
    faces: &[EpaFace],
    closest: &EpaFace,
    vertices: &[SupportPoint],
    a: &Collider,
    b: &Collider,
) -> Option<ContactData> {
    let tied = faces
        .iter()
        .filter(|face| face.distance - closest.distance <= FACE_TIE_TOLERANCE);

    let Some((face, weights)) = std::iter::once(closest)
        .chain(tied)
        .find_map(|face| projection_weights(face, vertices).map(|w| (face, w)))
    else {
        debug!(
            distance = closest.distance,
            "EPA projection fell outside every closest face"
        );
        return None;
    };

    Some(extract_contact(face, weights, vertices, a, b))
}

/// Barycentric weights of the origin's projection onto `face`, if it lies
/// inside the face.
fn projection_weights(face: &EpaFace, vertices: &[SupportPoint]) -> Option<[f64; 3]> {
    let [p0, p1, p2] = face.vertices.map(|i| vertices[i].minkowski);
    let projected = face.normal * face.distance;
    let weights = barycentric(&projected, &p0, &p1, &p2)?;

    let lo = -BARYCENTRIC_TOLERANCE;
    let hi = 1.0 + BARYCENTRIC_TOLERANCE;
    weights
        .iter()
        .all(|x| (lo..=hi).contains(x))
        .then_some(weights)
}

/// Interpolate the contact from a face and the projection's weights.
fn extract_contact(
    face: &EpaFace,
    weights: [f64; 3],
    vertices: &[SupportPoint],
    a: &Collider,
    b: &Collider,
) -> ContactData {
    let [p0, p1, p2] = face.vertices.map(|i| vertices[i]);

    let clamped = weights.map(|x| x.clamp(0.0, 1.0));
    let sum: f64 = clamped.iter().sum();
    let [u, v, w] = clamped.map(|x| x / sum);

    let local_a = Point3::from(p0.local_a.coords * u + p1.local_a.coords * v + p2.local_a.coords * w);
    let local_b = Point3::from(p0.local_b.coords * u + p1.local_b.coords * v + p2.local_b.coords * w);

    ContactData::new(
        [local_a, local_b],
        [a.local_to_world(&local_a), b.local_to_world(&local_b)],
        face.normal,
        face.distance.max(0.0),
        [a.model_matrix(), b.model_matrix()],
    )
}

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
    use crate::shape::CollisionShape;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use sim_types::Pose;

    fn cube_at(x: f64, y: f64, z: f64) -> Collider {
        Collider::fixed(
            CollisionShape::cube(0.5),
            Pose::from_position(Point3::new(x, y, z)),
        )
    }

    #[test]
    fn test_separated_boxes() {
        let a = cube_at(0.0, 0.0, 0.0);
        let b = cube_at(10.0, 0.0, 0.0);
        assert!(gjk_intersection(&a, &b).is_none());
        assert!(gjk_epa_contact(&a, &b).is_none());
    }

    #[test]
    fn test_deep_overlap() {
        let a = cube_at(0.0, 0.0, 0.0);
        let b = cube_at(0.5, 0.0, 0.0);

        let simplex = gjk_intersection(&a, &b).expect("boxes overlap");
        assert_eq!(simplex.len(), 4);

        let contact = epa_contact(&simplex, &a, &b).expect("contact");
        assert_relative_eq!(contact.depth, 0.5, epsilon = 1e-3);
        assert_relative_eq!(contact.normal.x.abs(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(contact.normal.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(contact.normal.z, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_deep_overlap_contact_points() {
        let a = cube_at(0.0, 0.0, 0.0);
        let b = cube_at(0.5, 0.0, 0.0);
        let contact = gjk_epa_contact(&a, &b).unwrap();

        // Normal points from A to B
        assert!(contact.normal.x > 0.0);
        assert_relative_eq!(contact.world_a.x, 0.5, epsilon = 1e-6);
        assert_relative_eq!(contact.world_b.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(contact.separation(), -contact.depth, epsilon = 1e-6);

        // Local points map back to world through the stored model matrices
        assert_relative_eq!(
            contact.model_b.transform_point(&contact.local_b).coords,
            contact.world_b.coords,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_coincident_boxes_terminate() {
        let a = cube_at(0.0, 0.0, 0.0);
        let b = cube_at(0.0, 0.0, 0.0);

        assert!(gjk_intersection(&a, &b).is_some());
        let contact = gjk_epa_contact(&a, &b).expect("coincident boxes give a contact");
        assert_relative_eq!(contact.depth, 1.0, epsilon = 1e-3);
        assert_relative_eq!(contact.normal.norm(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(contact.normal.amax(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_touching_is_not_overlap() {
        let a = cube_at(0.0, 0.0, 0.0);
        let b = cube_at(1.0 + 1e-6, 0.0, 0.0);
        assert!(gjk_intersection(&a, &b).is_none());
    }

    #[test]
    fn test_box_on_scaled_floor() {
        let floor = Collider::fixed(
            CollisionShape::cube(0.5),
            Pose::from_position(Point3::new(0.0, 0.0, -0.5)),
        )
        .with_scale(Vector3::new(10.0, 10.0, 1.0));
        let crate_box = cube_at(0.0, 0.0, 0.45);

        let contact = gjk_epa_contact(&crate_box, &floor).expect("resting overlap");
        assert_relative_eq!(contact.depth, 0.05, epsilon = 1e-3);
        assert!(contact.normal.z < -0.99);
    }

    #[test]
    fn test_mesh_matches_box() {
        let a = Collider::fixed(
            CollisionShape::box_mesh(Vector3::repeat(0.5)),
            Pose::identity(),
        );
        let b = cube_at(0.5, 0.0, 0.0);

        let contact = gjk_epa_contact(&a, &b).expect("contact");
        assert_relative_eq!(contact.depth, 0.5, epsilon = 1e-3);
        assert_relative_eq!(contact.normal.x.abs(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_tetrahedron_meshes() {
        let tetra = CollisionShape::convex_mesh(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ]);
        let a = Collider::fixed(tetra.clone(), Pose::identity());
        let near = Collider::fixed(tetra.clone(), Pose::from_position(Point3::new(0.1, 0.1, 0.1)));
        let far = Collider::fixed(tetra, Pose::from_position(Point3::new(5.0, 0.0, 0.0)));

        assert!(gjk_intersection(&a, &near).is_some());
        assert!(gjk_intersection(&a, &far).is_none());
    }

    /// Penetration depth of two oriented boxes by the separating axis test.
    ///
    /// Negative when separated. For boxes the smallest overlap over the 15
    /// candidate axes is the exact minimum translation distance.
    fn sat_penetration(
        pose_a: &Pose,
        half_a: &Vector3<f64>,
        pose_b: &Pose,
        half_b: &Vector3<f64>,
    ) -> f64 {
        let axes_a = pose_a.rotation.to_rotation_matrix().into_inner();
        let axes_b = pose_b.rotation.to_rotation_matrix().into_inner();
        let offset = pose_b.position - pose_a.position;

        let mut candidates = Vec::with_capacity(15);
        for i in 0..3 {
            candidates.push(axes_a.column(i).into_owned());
            candidates.push(axes_b.column(i).into_owned());
            for j in 0..3 {
                let cross = axes_a.column(i).cross(&axes_b.column(j));
                if cross.norm() > 1e-9 {
                    candidates.push(cross.normalize());
                }
            }
        }

        let radius = |axes: &nalgebra::Matrix3<f64>, half: &Vector3<f64>, l: &Vector3<f64>| {
            (0..3).map(|k| half[k] * axes.column(k).dot(l).abs()).sum::<f64>()
        };

        candidates
            .iter()
            .map(|l| radius(&axes_a, half_a, l) + radius(&axes_b, half_b, l) - offset.dot(l).abs())
            .fold(f64::INFINITY, f64::min)
    }

    fn random_box(rng: &mut StdRng, reach: f64) -> (Pose, Vector3<f64>) {
        let half = Vector3::new(
            rng.gen_range(0.2..0.8),
            rng.gen_range(0.2..0.8),
            rng.gen_range(0.2..0.8),
        );
        let position = Point3::new(
            rng.gen_range(-reach..reach),
            rng.gen_range(-reach..reach),
            rng.gen_range(-reach..reach),
        );
        let rotation = UnitQuaternion::from_euler_angles(
            rng.gen_range(-3.0..3.0),
            rng.gen_range(-3.0..3.0),
            rng.gen_range(-3.0..3.0),
        );
        (Pose::from_position_rotation(position, rotation), half)
    }

    #[test]
    fn test_rotated_boxes_match_separating_axis_depth() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut overlaps = 0;

        for _ in 0..400 {
            let (pose_a, half_a) = random_box(&mut rng, 0.3);
            let (pose_b, half_b) = random_box(&mut rng, 1.2);
            let a = Collider::fixed(CollisionShape::box_shape(half_a), pose_a);
            let b = Collider::fixed(CollisionShape::box_shape(half_b), pose_b);

            let expected = sat_penetration(&pose_a, &half_a, &pose_b, &half_b);
            let hit = gjk_intersection(&a, &b).is_some();
            if expected > 1e-4 {
                assert!(hit, "missed overlap of depth {expected}");
            } else if expected < -1e-4 {
                assert!(!hit, "boxes {} apart reported overlapping", -expected);
            }

            if expected > 1e-3 {
                overlaps += 1;
                let contact = gjk_epa_contact(&a, &b)
                    .unwrap_or_else(|| panic!("no contact for depth {expected}"));
                assert!(contact.is_valid());
                assert!(
                    (contact.depth - expected).abs() < 1e-3,
                    "depth {} vs {expected}",
                    contact.depth
                );
            }
        }

        assert!(overlaps > 50, "only {overlaps} overlapping pairs sampled");
    }

    #[test]
    fn test_contact_on_split_minkowski_face() {
        // Axis-aligned boxes offset off-axis: the closest side of A - B is a
        // flat rectangle made of coplanar triangles.
        for (x, y, z) in [(0.5, 0.3, 0.2), (0.6, -0.35, 0.25), (-0.7, 0.4, -0.3)] {
            let a = cube_at(0.0, 0.0, 0.0);
            let b = cube_at(x, y, z);

            let contact = gjk_epa_contact(&a, &b).expect("overlapping boxes give a contact");
            assert_relative_eq!(contact.depth, 1.0 - f64::abs(x), epsilon = 1e-3);
            assert_relative_eq!(contact.normal.x.abs(), 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_barycentric_weights() {
        let a = Vector3::new(0.0, 0.0, 0.0);
        let b = Vector3::new(1.0, 0.0, 0.0);
        let c = Vector3::new(0.0, 1.0, 0.0);

        let [u, v, w] = barycentric(&Vector3::new(0.25, 0.25, 0.0), &a, &b, &c).unwrap();
        assert_relative_eq!(u + v + w, 1.0, epsilon = 1e-12);
        assert_relative_eq!(u, 0.5, epsilon = 1e-12);
        assert_relative_eq!(v, 0.25, epsilon = 1e-12);
        assert_relative_eq!(w, 0.25, epsilon = 1e-12);

        let outside = barycentric(&Vector3::new(2.0, 2.0, 0.0), &a, &b, &c).unwrap();
        assert!(outside[0] < 0.0);

        // Collinear triangle
        assert!(barycentric(&a, &a, &b, &(b * 2.0)).is_none());
    }

    #[test]
    fn test_barycentric_random_points_inside() {
        let mut rng = StdRng::seed_from_u64(11);
        let a = Vector3::new(0.3, -1.0, 2.0);
        let b = Vector3::new(1.5, 0.2, 1.0);
        let c = Vector3::new(-0.7, 0.9, 0.4);

        for _ in 0..100 {
            let mut s: f64 = rng.gen_range(0.0..1.0);
            let mut t: f64 = rng.gen_range(0.0..1.0);
            if s + t > 1.0 {
                s = 1.0 - s;
                t = 1.0 - t;
            }
            let p = a + (b - a) * s + (c - a) * t;
            let [u, v, w] = barycentric(&p, &a, &b, &c).unwrap();

            assert_relative_eq!(u + v + w, 1.0, epsilon = 1e-4);
            for x in [u, v, w] {
                assert!((-1e-9..=1.0 + 1e-9).contains(&x));
            }
        }
    }

    #[test]
    fn test_tetrahedron_region() {
        // Newest vertex above a base triangle that surrounds the origin
        let a = Vector3::new(0.0, 0.0, 1.0);
        let b = Vector3::new(-1.0, -1.0, -1.0);
        let c = Vector3::new(1.0, -1.0, -1.0);
        let d = Vector3::new(0.0, 1.0, -1.0);
        assert_eq!(
            tetrahedron_region(&a, &b, &c, &d),
            TetrahedronRegion::ContainsOrigin
        );

        // Same shape pushed far along +Y
        let shift = Vector3::new(0.0, 5.0, 0.0);
        let region = tetrahedron_region(&(a + shift), &(b + shift), &(c + shift), &(d + shift));
        assert!(matches!(region, TetrahedronRegion::ShrinkTo(_)));
    }

    #[test]
    fn test_simplex_push_keeps_newest_four() {
        let mut simplex = Simplex::new();
        assert!(simplex.is_empty());

        for i in 0..6 {
            simplex.push(SupportPoint {
                minkowski: Vector3::new(f64::from(i), 0.0, 0.0),
                ..SupportPoint::default()
            });
        }

        assert_eq!(simplex.len(), 4);
        let xs: Vec<f64> = simplex.points().iter().map(|p| p.minkowski.x).collect();
        assert_eq!(xs, vec![5.0, 4.0, 3.0, 2.0]);
    }

    #[test]
    fn test_minkowski_support_negates_b() {
        let a = cube_at(0.0, 0.0, 0.0);
        let b = cube_at(3.0, 0.0, 0.0);

        let p = minkowski_support(&a, &b, &Vector3::new(1.0, 1.0, 1.0));
        assert_eq!(p.world_a, Point3::new(0.5, 0.5, 0.5));
        assert_eq!(p.world_b, Point3::new(2.5, -0.5, -0.5));
        assert_relative_eq!(p.minkowski, Vector3::new(-2.0, 1.0, 1.0));
        assert_eq!(p.local_b, Point3::new(-0.5, -0.5, -0.5));
    }
}
