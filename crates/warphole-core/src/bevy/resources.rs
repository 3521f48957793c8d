//! ECS Resources for the warphole systems.

use std::collections::VecDeque;
use std::sync::Arc;

use bevy::prelude::*;
use parking_lot::Mutex;

use crate::session::Session;
use crate::tracker::{Detection, MarkerDetector, MarkerId};

/// The session driven by the `FixedUpdate` systems.
#[derive(Resource, Debug)]
pub struct SessionRes(pub Session);

/// Latest detector snapshot, written from outside the ECS schedule.
///
/// Cloning shares the same buffer, so a camera thread can hold one handle
/// while the app holds the other. The snapshot is level-based: it stays
/// current until replaced.
#[derive(Resource, Clone, Default)]
pub struct DetectionFeed {
    inner: Arc<Mutex<Vec<Detection>>>,
}

impl DetectionFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current snapshot.
    pub fn publish(&self, detections: Vec<Detection>) {
        *self.inner.lock() = detections;
    }

    /// Reports no markers until the next publish.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn latest(&self) -> Vec<Detection> {
        self.inner.lock().clone()
    }
}

impl MarkerDetector for DetectionFeed {
    fn detect(&mut self) -> Vec<Detection> {
        self.latest()
    }
}

/// Realspace input applied at the start of the propagation phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WarpCommand {
    /// A marker's selection flag changed.
    Select { id: MarkerId, is_selected: bool },
    /// Drop a transportable ball into flatspace.
    SpawnBall { x: f32, y: f32 },
}

/// Thread-safe queue for commands coming from outside the schedule.
#[derive(Resource, Clone)]
pub struct WarpCommandQueue {
    inner: Arc<Mutex<VecDeque<WarpCommand>>>,
}

impl WarpCommandQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn push(&self, command: WarpCommand) {
        self.inner.lock().push_back(command);
    }

    /// Drain all pending commands.
    pub fn drain(&self) -> Vec<WarpCommand> {
        self.inner.lock().drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for WarpCommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::IDENTITY_POSE;

    #[test]
    fn test_feed_clones_share_snapshot() {
        let feed = DetectionFeed::new();
        let mut handle = feed.clone();

        feed.publish(vec![Detection::new(16, IDENTITY_POSE)]);
        assert_eq!(handle.detect().len(), 1);
        // Level-based: the snapshot is still there on the next read.
        assert_eq!(handle.detect().len(), 1);

        feed.clear();
        assert!(handle.detect().is_empty());
    }

    #[test]
    fn test_queue_drains_in_order() {
        let queue = WarpCommandQueue::new();
        queue.push(WarpCommand::Select {
            id: 1,
            is_selected: true,
        });
        queue.push(WarpCommand::SpawnBall { x: 0.0, y: 1.0 });

        let drained = queue.clone().drain();
        assert_eq!(drained.len(), 2);
        assert!(matches!(drained[0], WarpCommand::Select { id: 1, .. }));
        assert!(queue.is_empty());
    }
}
