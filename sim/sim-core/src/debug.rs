//! One-way hand-off of collision internals to an external debug drawer.
//!
//! The world forwards GJK simplices, EPA polytope faces and final contacts to
//! a [`DebugSink`]. Sinks only observe. Nothing they do feeds back into the
//! simulation.

use std::cell::RefCell;
use std::rc::Rc;

use nalgebra::Point3;
use sim_contact::ContactData;

use crate::gjk_epa::SupportPoint;

/// Receiver for collision debug data. Every method defaults to a no-op.
pub trait DebugSink {
    /// A GJK simplex after a support point was added.
    fn simplex(&mut self, _points: &[SupportPoint]) {}

    /// One face of the final EPA polytope, in Minkowski space.
    fn polytope_face(&mut self, _vertices: [Point3<f64>; 3]) {}

    /// A contact that will become (or refresh) a constraint.
    fn contact(&mut self, _contact: &ContactData) {}
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDebugSink;

impl DebugSink for NullDebugSink {}

/// Sink that keeps everything it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingDebugSink {
    /// Minkowski vertices of each reported simplex.
    pub simplices: Vec<Vec<Point3<f64>>>,
    /// Reported polytope faces.
    pub faces: Vec<[Point3<f64>; 3]>,
    /// Reported contacts.
    pub contacts: Vec<ContactData>,
}

impl RecordingDebugSink {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything recorded so far.
    pub fn clear(&mut self) {
        self.simplices.clear();
        self.faces.clear();
        self.contacts.clear();
    }
}

impl DebugSink for RecordingDebugSink {
    fn simplex(&mut self, points: &[SupportPoint]) {
        self.simplices
            .push(points.iter().map(|p| Point3::from(p.minkowski)).collect());
    }

    fn polytope_face(&mut self, vertices: [Point3<f64>; 3]) {
        self.faces.push(vertices);
    }

    fn contact(&mut self, contact: &ContactData) {
        self.contacts.push(*contact);
    }
}

/// Shared sink, so a caller can keep reading what a world recorded.
impl<S: DebugSink> DebugSink for Rc<RefCell<S>> {
    fn simplex(&mut self, points: &[SupportPoint]) {
        self.borrow_mut().simplex(points);
    }

    fn polytope_face(&mut self, vertices: [Point3<f64>; 3]) {
        self.borrow_mut().polytope_face(vertices);
    }

    fn contact(&mut self, contact: &ContactData) {
        self.borrow_mut().contact(contact);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::body::Collider;
    use crate::gjk_epa::gjk_epa_contact_with;
    use crate::shape::CollisionShape;
    use nalgebra::Point3;
    use sim_types::Pose;

    #[test]
    fn test_recording_sink_sees_collision_internals() {
        let a = Collider::fixed(CollisionShape::cube(0.5), Pose::identity());
        let b = Collider::fixed(
            CollisionShape::cube(0.5),
            Pose::from_position(Point3::new(0.5, 0.0, 0.0)),
        );

        let mut sink = RecordingDebugSink::new();
        let contact = gjk_epa_contact_with(&a, &b, &mut sink).unwrap();

        assert!(!sink.simplices.is_empty());
        assert!(sink.simplices.iter().all(|s| s.len() <= 4));
        assert!(!sink.faces.is_empty());
        assert_eq!(sink.contacts.len(), 1);
        assert_eq!(sink.contacts[0], contact);

        sink.clear();
        assert!(sink.simplices.is_empty() && sink.faces.is_empty() && sink.contacts.is_empty());
    }

    #[test]
    fn test_null_sink_does_not_change_results() {
        let a = Collider::fixed(CollisionShape::cube(0.5), Pose::identity());
        let b = Collider::fixed(
            CollisionShape::cube(0.5),
            Pose::from_position(Point3::new(0.3, 0.2, 0.1)),
        );

        let with_null = gjk_epa_contact_with(&a, &b, &mut NullDebugSink).unwrap();
        let with_recorder = gjk_epa_contact_with(&a, &b, &mut RecordingDebugSink::new()).unwrap();
        assert_eq!(with_null, with_recorder);
    }
}
