//! Sensor-cluster transit detection.
//!
//! A warphole's flatspace side is a ring of overlapping circular sensors over
//! the marker footprint. A single sensor only reports the moment a body enters
//! it, so a hole that opens under a ball already inside would never notice the
//! ball. With several overlapping members, a ball moving across the footprint
//! keeps producing begin-contacts as it crosses internal member boundaries,
//! and each one re-reads the warphole's current open state.

use std::collections::BTreeSet;
use std::f32::consts::PI;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::bodies::{BodyKind, SensorParams, sensor};
use crate::config::WarpConfig;
use crate::error::WarpError;
use crate::registry::{BodyId, BodyRef, PhysicsRegistry};
use crate::tracker::MarkerId;

/// Level-triggered open flag shared by a cluster and its member metadata.
#[derive(Debug, Clone, Default)]
pub struct WarpholeGate(Arc<AtomicBool>);

impl WarpholeGate {
    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set_open(&self, open: bool) {
        self.0.store(open, Ordering::Release);
    }
}

/// Member metadata resolving a sensor back to its warphole.
#[derive(Debug, Clone)]
pub struct WarpholeLink {
    pub key: MarkerId,
    gate: WarpholeGate,
}

impl WarpholeLink {
    pub fn new(key: MarkerId, gate: WarpholeGate) -> Self {
        Self { key, gate }
    }

    pub fn is_open(&self) -> bool {
        self.gate.is_open()
    }
}

/// Shape parameters for a cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint {
    pub radius: f32,
    pub members: usize,
    /// Fractional inflation of member radii past the minimal cover.
    pub overlap: f32,
}

impl Footprint {
    pub fn from_config(config: &WarpConfig) -> Self {
        Self {
            radius: config.footprint_radius,
            members: config.cluster_members,
            overlap: config.sensor_overlap,
        }
    }

    /// Member circles as `(offset from centre, radius)`.
    ///
    /// Members sit on a ring of radius `R/2`. Each member radius is the larger
    /// of the ring radius (so the centre is covered) and the distance from a
    /// member centre to the rim point midway between two neighbours (so the
    /// rim is covered), then inflated by `overlap`.
    pub fn members_layout(&self) -> Result<Vec<([f32; 2], f32)>, WarpError> {
        if self.members < 2 {
            return Err(WarpError::InvalidCluster {
                members: self.members,
            });
        }

        #[allow(clippy::cast_precision_loss)]
        let n = self.members as f32;
        let r = self.radius;
        let ring = r / 2.0;
        let rim_gap = (r * r + ring * ring - 2.0 * r * ring * (PI / n).cos()).sqrt();
        let member_radius = ring.max(rim_gap) * (1.0 + self.overlap);

        Ok((0..self.members)
            .map(|k| {
                #[allow(clippy::cast_precision_loss)]
                let angle = 2.0 * PI * k as f32 / n;
                ([ring * angle.cos(), ring * angle.sin()], member_radius)
            })
            .collect())
    }
}

/// One warphole's sensors in flatspace.
#[derive(Debug, Clone)]
pub struct SensorCluster {
    key: MarkerId,
    center: [f32; 2],
    footprint: Footprint,
    members: Vec<BodyRef>,
    offsets: Vec<[f32; 2]>,
    member_radius: f32,
    gate: WarpholeGate,
}

impl SensorCluster {
    /// Registers the member sensors around `center`.
    ///
    /// The layout is validated before the first `add`, so an invalid
    /// footprint leaves the registry untouched.
    pub fn build<E>(
        registry: &mut PhysicsRegistry<E>,
        key: MarkerId,
        center: [f32; 2],
        footprint: Footprint,
    ) -> Result<Self, WarpError> {
        let layout = footprint.members_layout()?;
        let gate = WarpholeGate::default();
        let member_radius = layout.first().map_or(0.0, |(_, r)| *r);

        let mut members = Vec::with_capacity(layout.len());
        let mut offsets = Vec::with_capacity(layout.len());
        for (offset, radius) in layout {
            let member = registry.add(
                sensor,
                &SensorParams {
                    center: [center[0] + offset[0], center[1] + offset[1]],
                    radius,
                    link: WarpholeLink::new(key, gate.clone()),
                },
            )?;
            members.push(member);
            offsets.push(offset);
        }

        tracing::debug!(
            "[cluster] built warphole {} with {} members at {:?}",
            key,
            members.len(),
            center
        );

        Ok(Self {
            key,
            center,
            footprint,
            members,
            offsets,
            member_radius,
            gate,
        })
    }

    pub fn key(&self) -> MarkerId {
        self.key
    }

    pub fn center(&self) -> [f32; 2] {
        self.center
    }

    pub fn footprint(&self) -> Footprint {
        self.footprint
    }

    pub fn members(&self) -> &[BodyRef] {
        &self.members
    }

    pub fn is_member(&self, id: BodyId) -> bool {
        self.members.iter().any(|m| m.id() == id)
    }

    pub fn is_open(&self) -> bool {
        self.gate.is_open()
    }

    /// Sets the open flag. Geometry is untouched.
    pub fn set_open(&self, open: bool) {
        self.gate.set_open(open);
    }

    /// True if `point` lies inside at least one member.
    pub fn covers(&self, point: [f32; 2]) -> bool {
        self.offsets.iter().any(|offset| {
            let dx = point[0] - (self.center[0] + offset[0]);
            let dy = point[1] - (self.center[1] + offset[1]);
            dx * dx + dy * dy <= self.member_radius * self.member_radius
        })
    }

    /// Moves every member so the cluster is centred on `center`.
    pub fn relocate<E>(
        &mut self,
        registry: &mut PhysicsRegistry<E>,
        center: [f32; 2],
    ) -> Result<(), WarpError> {
        for (member, offset) in self.members.iter().zip(&self.offsets) {
            registry.set_position(*member, [center[0] + offset[0], center[1] + offset[1]])?;
        }
        self.center = center;
        Ok(())
    }

    /// Balls currently overlapping any member and not already leaving.
    pub fn docked<E>(&self, registry: &PhysicsRegistry<E>) -> BTreeSet<BodyId> {
        self.members
            .iter()
            .flat_map(|m| registry.touching(m.id()))
            .filter(|id| {
                registry
                    .get(*id)
                    .is_some_and(|b| b.kind() == BodyKind::Ball && !b.is_marked_for_deletion())
            })
            .collect()
    }

    /// Marks all members and every docked ball for deletion.
    ///
    /// Returns the docked balls that were marked.
    pub fn teardown<E>(self, registry: &mut PhysicsRegistry<E>) -> Result<Vec<BodyId>, WarpError> {
        let docked = self.docked(registry);
        self.gate.set_open(false);

        for member in &self.members {
            registry.mark_for_deletion(member.id())?;
        }
        for &ball in &docked {
            registry.mark_for_deletion(ball)?;
        }

        tracing::debug!(
            "[cluster] tore down warphole {} ({} docked)",
            self.key,
            docked.len()
        );
        Ok(docked.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::bodies::{BallParams, ball};
    use crate::config::PHYSICS_DT;
    use crate::physics::ContactPhase;
    use crate::registry::ContactEvent;

    type Registry = PhysicsRegistry<()>;

    fn footprint(members: usize) -> Footprint {
        Footprint {
            radius: 1.5,
            members,
            overlap: 0.1,
        }
    }

    #[test]
    fn test_rejects_single_member() {
        let mut registry = Registry::default();
        let err = SensorCluster::build(&mut registry, 1, [0.0, 0.0], footprint(1)).unwrap_err();
        assert!(matches!(err, WarpError::InvalidCluster { members: 1 }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_members_share_key() {
        let mut registry = Registry::default();
        let cluster = SensorCluster::build(&mut registry, 16, [2.0, 3.0], footprint(6)).unwrap();

        assert_eq!(cluster.members().len(), 6);
        for member in cluster.members() {
            let body = registry.get(member.id()).expect("registered");
            assert_eq!(body.kind(), BodyKind::SensorMember);
            assert_eq!(body.meta().warphole().map(|l| l.key), Some(16));
        }
    }

    #[test]
    fn test_gate_is_shared_with_members() {
        let mut registry = Registry::default();
        let cluster = SensorCluster::build(&mut registry, 4, [0.0, 0.0], footprint(3)).unwrap();
        let link = registry
            .get(cluster.members()[0].id())
            .and_then(|b| b.meta().warphole().cloned())
            .unwrap();

        assert!(!link.is_open());
        cluster.set_open(true);
        assert!(link.is_open());
    }

    #[test]
    fn test_layout_covers_footprint() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        for members in [2, 3, 4, 6, 9] {
            let mut registry = Registry::default();
            let cluster =
                SensorCluster::build(&mut registry, 0, [1.0, -1.0], footprint(members)).unwrap();

            for _ in 0..2000 {
                let angle = rng.random_range(0.0..2.0 * PI);
                let dist = 1.5 * rng.random::<f32>().sqrt();
                let point = [1.0 + dist * angle.cos(), -1.0 + dist * angle.sin()];
                assert!(cluster.covers(point), "{members} members leave {point:?} uncovered");
            }
        }
    }

    #[test]
    fn test_relocate_moves_members() {
        let mut registry = Registry::default();
        let mut cluster = SensorCluster::build(&mut registry, 0, [0.0, 0.0], footprint(4)).unwrap();
        let before = registry.position(cluster.members()[0]).unwrap();

        cluster.relocate(&mut registry, [10.0, 5.0]).unwrap();

        let after = registry.position(cluster.members()[0]).unwrap();
        assert!((after[0] - before[0] - 10.0).abs() < 1e-5);
        assert!((after[1] - before[1] - 5.0).abs() < 1e-5);
        assert_eq!(cluster.center(), [10.0, 5.0]);
    }

    /// Sends 16 seeded straight balls through the cluster at `speed` and
    /// checks each one raises a begin-contact with a member.
    fn assert_traversals_hit(seed: u64, speed: f32, aim_radius: f32) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        for _ in 0..16 {
            let mut registry = PhysicsRegistry::<()>::from_config(&WarpConfig::weightless());
            SensorCluster::build(&mut registry, 16, [0.0, 0.0], footprint(6)).unwrap();

            // Chord across the footprint: start outside, aim through a random
            // point inside, keep going until well past the far side.
            let heading = rng.random_range(0.0..2.0 * PI);
            let aim_dist = aim_radius * rng.random::<f32>();
            let aim_angle = rng.random_range(0.0..2.0 * PI);
            let aim = [aim_dist * aim_angle.cos(), aim_dist * aim_angle.sin()];
            let dir = [heading.cos(), heading.sin()];
            let start = [aim[0] - 4.0 * dir[0], aim[1] - 4.0 * dir[1]];

            let ball_ref = registry
                .add(ball, &BallParams { x: start[0], y: start[1], radius: 0.1 })
                .unwrap();
            registry.set_linvel(ball_ref, [dir[0] * speed, dir[1] * speed]).unwrap();

            let hits = Arc::new(AtomicUsize::new(0));
            let counter = hits.clone();
            registry
                .set_contact_callback(
                    ball_ref.id(),
                    Box::new(move |reg: &mut Registry, event: ContactEvent| {
                        let hit = reg
                            .get(event.other.id())
                            .and_then(|b| b.meta().warphole())
                            .is_some_and(|l| l.key == 16);
                        if hit && event.phase == ContactPhase::Began {
                            counter.fetch_add(1, AtomicOrdering::SeqCst);
                        }
                        Ok(())
                    }),
                )
                .unwrap();

            for _ in 0..150 {
                registry.step(PHYSICS_DT).unwrap();
            }
            assert!(
                hits.load(AtomicOrdering::SeqCst) >= 1,
                "trajectory through {aim:?} at {speed} u/s missed"
            );
        }
    }

    #[test]
    fn test_straight_traversals_hit_cluster() {
        assert_traversals_hit(1234, 4.0, 1.4);
    }

    #[test]
    fn test_traversals_at_speed_limit_hit_cluster() {
        // Just under the largest speed `WarpConfig::validate` accepts for this
        // footprint: one footprint radius per step.
        let speed = 0.98 * footprint(6).radius / PHYSICS_DT;
        let within_bound = WarpConfig {
            max_ball_speed: speed,
            ..WarpConfig::weightless()
        };
        within_bound.validate().expect("speed is within the bound");

        // Chords within sqrt(3)/2 of the radius are at least one radius long.
        assert_traversals_hit(99, speed, 0.85 * footprint(6).radius);
    }

    #[test]
    fn test_teardown_marks_members_and_docked_balls() {
        let mut registry = PhysicsRegistry::<()>::from_config(&WarpConfig::weightless());
        let cluster = SensorCluster::build(&mut registry, 7, [0.0, 0.0], footprint(6)).unwrap();
        let docked = registry
            .add(ball, &BallParams { x: 0.0, y: 0.0, radius: 0.2 })
            .unwrap();
        let outside = registry
            .add(ball, &BallParams { x: 10.0, y: 0.0, radius: 0.2 })
            .unwrap();

        registry.step(PHYSICS_DT).unwrap();
        assert_eq!(cluster.docked(&registry).into_iter().collect::<Vec<_>>(), vec![docked.id()]);

        let members: Vec<BodyId> = cluster.members().iter().map(BodyRef::id).collect();
        let marked = cluster.teardown(&mut registry).unwrap();
        assert_eq!(marked, vec![docked.id()]);
        assert!(members.iter().all(|id| registry.is_marked(*id)));
        assert!(!registry.is_marked(outside.id()));

        let removed = registry.process_deferred().unwrap();
        assert_eq!(removed.len(), members.len() + 1);
        assert_eq!(registry.len(), 1);
    }
}
