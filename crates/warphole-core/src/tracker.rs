//! Marker lifecycle tracking.
//!
//! Turns the optical detector's per-frame snapshot of visible markers into
//! create/update/destroy events for stable marker identities. No smoothing or
//! debounce: a marker missing from one snapshot is destroyed, and reappearing
//! later creates it anew.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::reconcile::reconcile;

/// Marker ID assigned by the external detector.
pub type MarkerId = u32;

/// Column-major 4x4 pose matrix as delivered by the detector.
pub type Pose = [f32; 16];

pub const IDENTITY_POSE: Pose = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Builds a pose that only translates.
pub fn pose_from_translation(x: f32, y: f32, z: f32) -> Pose {
    let mut pose = IDENTITY_POSE;
    pose[12] = x;
    pose[13] = y;
    pose[14] = z;
    pose
}

/// Translation column of a pose.
pub fn pose_translation(pose: &Pose) -> [f32; 3] {
    [pose[12], pose[13], pose[14]]
}

/// One entry of a detector snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: MarkerId,
    pub pose: Pose,
}

impl Detection {
    pub fn new(id: MarkerId, pose: Pose) -> Self {
        Self { id, pose }
    }
}

/// Source of detection snapshots, polled once per tick.
pub trait MarkerDetector {
    /// Returns every marker visible in the current frame.
    fn detect(&mut self) -> Vec<Detection>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerState {
    Absent,
    Active,
}

/// A marker identity maintained across frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedMarker {
    pub id: MarkerId,
    pub pose: Pose,
    /// Detection pass in which the marker was last seen.
    pub last_seen: u64,
    pub state: MarkerState,
}

/// Events produced by one `MarkerTracker::update` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerEvents {
    pub created: Vec<TrackedMarker>,
    pub updated: Vec<TrackedMarker>,
    pub destroyed: Vec<TrackedMarker>,
}

impl MarkerEvents {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.destroyed.is_empty()
    }
}

/// Maintains the set of currently visible markers.
#[derive(Debug, Clone, Default)]
pub struct MarkerTracker {
    markers: BTreeMap<MarkerId, TrackedMarker>,
    frame: u64,
}

impl MarkerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconciles the tracked set against a full detection snapshot.
    ///
    /// If an ID appears more than once in the snapshot, the last pose wins.
    pub fn update(&mut self, detections: &[Detection]) -> MarkerEvents {
        self.frame += 1;
        let frame = self.frame;

        let mut poses: BTreeMap<MarkerId, Pose> = BTreeMap::new();
        for detection in detections {
            poses.insert(detection.id, detection.pose);
        }

        let diff = reconcile(self.markers.keys().copied(), poses.keys().copied());
        let mut events = MarkerEvents::default();

        for id in diff.destroyed {
            if let Some(mut marker) = self.markers.remove(&id) {
                tracing::debug!("[tracker] marker {} lost", id);
                marker.state = MarkerState::Absent;
                events.destroyed.push(marker);
            }
        }

        for id in diff.updated {
            if let Some(marker) = self.markers.get_mut(&id) {
                marker.pose = poses[&id];
                marker.last_seen = frame;
                events.updated.push(marker.clone());
            }
        }

        for id in diff.created {
            tracing::debug!("[tracker] marker {} found", id);
            let marker = TrackedMarker {
                id,
                pose: poses[&id],
                last_seen: frame,
                state: MarkerState::Active,
            };
            self.markers.insert(id, marker.clone());
            events.created.push(marker);
        }

        events
    }

    pub fn get(&self, id: MarkerId) -> Option<&TrackedMarker> {
        self.markers.get(&id)
    }

    /// IDs of all active markers, ascending.
    pub fn ids(&self) -> impl Iterator<Item = MarkerId> + '_ {
        self.markers.keys().copied()
    }

    pub fn markers(&self) -> impl Iterator<Item = &TrackedMarker> {
        self.markers.values()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Number of detection passes processed so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }
}

#[cfg(test)]
mod tests {
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn ids(markers: &[TrackedMarker]) -> Vec<MarkerId> {
        markers.iter().map(|m| m.id).collect()
    }

    #[test]
    fn test_marker_lifecycle_scenario() {
        let mut tracker = MarkerTracker::new();

        let events = tracker.update(&[Detection::new(16, IDENTITY_POSE)]);
        assert_eq!(ids(&events.created), vec![16]);
        assert!(events.updated.is_empty());
        assert!(events.destroyed.is_empty());
        assert_eq!(events.created[0].state, MarkerState::Active);

        let moved = pose_from_translation(0.5, 0.0, 0.0);
        let events = tracker.update(&[Detection::new(16, moved)]);
        assert!(events.created.is_empty());
        assert_eq!(ids(&events.updated), vec![16]);
        assert!(events.destroyed.is_empty());
        assert_eq!(events.updated[0].pose, moved);
        assert_eq!(events.updated[0].last_seen, 2);

        let events = tracker.update(&[]);
        assert!(events.created.is_empty());
        assert!(events.updated.is_empty());
        assert_eq!(ids(&events.destroyed), vec![16]);
        assert_eq!(events.destroyed[0].state, MarkerState::Absent);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_one_frame_gap_is_destroy_then_create() {
        let mut tracker = MarkerTracker::new();
        tracker.update(&[Detection::new(3, IDENTITY_POSE)]);

        let gap = tracker.update(&[]);
        assert_eq!(ids(&gap.destroyed), vec![3]);

        let back = tracker.update(&[Detection::new(3, IDENTITY_POSE)]);
        assert_eq!(ids(&back.created), vec![3]);
        assert!(back.updated.is_empty());
    }

    #[test]
    fn test_duplicate_detection_last_pose_wins() {
        let mut tracker = MarkerTracker::new();
        let second = pose_from_translation(1.0, 2.0, 3.0);
        let events = tracker.update(&[
            Detection::new(5, IDENTITY_POSE),
            Detection::new(5, second),
        ]);

        assert_eq!(events.created.len(), 1);
        assert_eq!(tracker.get(5).map(|m| m.pose), Some(second));
    }

    #[test]
    fn test_tracked_ids_follow_latest_snapshot() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut tracker = MarkerTracker::new();

        for _ in 0..200 {
            let snapshot: Vec<Detection> = (0..8u32)
                .filter(|_| rng.random_bool(0.5))
                .map(|id| Detection::new(id, IDENTITY_POSE))
                .collect();

            let before: Vec<MarkerId> = tracker.ids().collect();
            let events = tracker.update(&snapshot);

            let mut expected: Vec<MarkerId> = snapshot.iter().map(|d| d.id).collect();
            expected.sort_unstable();
            assert_eq!(tracker.ids().collect::<Vec<_>>(), expected);

            // Every previous id is either updated or destroyed, never both.
            for id in before {
                let updated = events.updated.iter().any(|m| m.id == id);
                let destroyed = events.destroyed.iter().any(|m| m.id == id);
                assert!(updated ^ destroyed);
            }
        }
    }
}
