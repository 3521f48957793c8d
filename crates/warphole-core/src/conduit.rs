//! Cross-space conduit.
//!
//! Links realspace warpholes (one per tracked marker) to their flatspace
//! sensor clusters. Realspace decides whether a warphole is open; the conduit
//! pushes that level into the cluster's gate. Balls spawned through the
//! conduit carry a contact callback that, on any begin-contact with an open
//! cluster member, marks the ball for deletion and emits a [`TransitEvent`].
//! After the deferred-deletion pass the conduit relays those events back to
//! realspace as spawn requests at the marker's pose.

use std::collections::BTreeMap;

use crate::bodies::{BallParams, ball};
use crate::cluster::{Footprint, SensorCluster};
use crate::config::{SpaceMapping, WarpConfig};
use crate::error::WarpError;
use crate::physics::ContactPhase;
use crate::registry::{BodyId, BodyRef, ContactCallback, ContactEvent, PhysicsRegistry};
use crate::tracker::{MarkerEvents, MarkerId, Pose, pose_translation};

/// Registry specialised to conduit events.
pub type FlatRegistry = PhysicsRegistry<TransitEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitDirection {
    FlatToReal,
}

/// A ball fell through an open warphole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitEvent {
    pub key: MarkerId,
    pub direction: TransitDirection,
    /// The flatspace ball, already marked for deletion.
    pub ball: BodyId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WarpholeState {
    #[default]
    Closed,
    Open,
}

impl WarpholeState {
    pub fn from_open(open: bool) -> Self {
        if open { Self::Open } else { Self::Closed }
    }

    pub fn is_open(self) -> bool {
        self == Self::Open
    }
}

/// Realspace collaborator receiving transported objects.
pub trait Realspace {
    fn spawn_object(&mut self, key: MarkerId, pose: &Pose);
}

pub type StateChangedListener = Box<dyn FnMut(MarkerId, bool) + Send + Sync>;
pub type TransitListener = Box<dyn FnMut(&TransitEvent) + Send + Sync>;

/// Paired realspace and flatspace representation of one marker.
#[derive(Debug)]
pub struct Warphole {
    key: MarkerId,
    state: WarpholeState,
    pose: Pose,
    cluster: SensorCluster,
}

impl Warphole {
    pub fn key(&self) -> MarkerId {
        self.key
    }

    /// Realspace state, the authoritative one.
    pub fn state(&self) -> WarpholeState {
        self.state
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn cluster(&self) -> &SensorCluster {
        &self.cluster
    }
}

pub struct Conduit {
    warpholes: BTreeMap<MarkerId, Warphole>,
    footprint: Footprint,
    mapping: SpaceMapping,
    ball_radius: f32,
    pending: Vec<(MarkerId, bool)>,
    state_listeners: Vec<StateChangedListener>,
    transit_listeners: Vec<TransitListener>,
}

impl std::fmt::Debug for Conduit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conduit")
            .field("warpholes", &self.warpholes)
            .field("footprint", &self.footprint)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl Conduit {
    pub fn new(config: &WarpConfig) -> Self {
        Self {
            warpholes: BTreeMap::new(),
            footprint: Footprint::from_config(config),
            mapping: config.mapping,
            ball_radius: config.ball_radius,
            pending: Vec::new(),
            state_listeners: Vec::new(),
            transit_listeners: Vec::new(),
        }
    }

    pub fn on_warphole_state_changed(&mut self, listener: StateChangedListener) {
        self.state_listeners.push(listener);
    }

    pub fn on_ball_transited(&mut self, listener: TransitListener) {
        self.transit_listeners.push(listener);
    }

    /// Creates, moves and tears down warpholes to follow the tracker.
    pub fn apply_marker_events(
        &mut self,
        events: &MarkerEvents,
        registry: &mut FlatRegistry,
    ) -> Result<(), WarpError> {
        for marker in &events.destroyed {
            let Some(warphole) = self.warpholes.remove(&marker.id) else {
                continue;
            };
            let docked = warphole.cluster.teardown(registry)?;
            tracing::info!(
                "[conduit] warphole {} destroyed ({} docked objects dropped)",
                marker.id,
                docked.len()
            );
        }

        for marker in &events.updated {
            let center = self.project(&marker.pose);
            let Some(warphole) = self.warpholes.get_mut(&marker.id) else {
                tracing::warn!("[conduit] update for unknown warphole {}", marker.id);
                continue;
            };
            warphole.pose = marker.pose;
            if warphole.cluster.center() != center {
                warphole.cluster.relocate(registry, center)?;
            }
        }

        for marker in &events.created {
            if self.warpholes.contains_key(&marker.id) {
                tracing::warn!("[conduit] warphole {} already exists", marker.id);
                continue;
            }
            let center = self.project(&marker.pose);
            let cluster = SensorCluster::build(registry, marker.id, center, self.footprint)?;
            self.warpholes.insert(
                marker.id,
                Warphole {
                    key: marker.id,
                    state: WarpholeState::Closed,
                    pose: marker.pose,
                    cluster,
                },
            );
            tracing::info!("[conduit] warphole {} created at {:?}", marker.id, center);
        }

        Ok(())
    }

    fn project(&self, pose: &Pose) -> [f32; 2] {
        let [x, y, _] = pose_translation(pose);
        self.mapping.project(x, y)
    }

    /// Realspace input: a marker was selected or deselected.
    ///
    /// Queued until the next [`Self::propagate_state`].
    pub fn on_marker_selection_changed(&mut self, id: MarkerId, is_selected: bool) {
        self.pending.push((id, is_selected));
    }

    /// Applies queued selection changes and returns those that took effect.
    pub fn propagate_state(&mut self) -> Vec<(MarkerId, bool)> {
        let pending = std::mem::take(&mut self.pending);
        pending
            .into_iter()
            .filter(|&(key, open)| self.set_warphole_open(key, open))
            .collect()
    }

    /// Sets a warphole's state in both spaces.
    ///
    /// Listeners are notified only when the realspace state changes; the
    /// flatspace gate is written regardless. Returns whether the state changed,
    /// `false` for unknown keys.
    pub fn set_warphole_open(&mut self, key: MarkerId, open: bool) -> bool {
        let Some(warphole) = self.warpholes.get_mut(&key) else {
            tracing::warn!("[conduit] state change for unknown warphole {}", key);
            return false;
        };

        let state = WarpholeState::from_open(open);
        let changed = warphole.state != state;
        warphole.state = state;
        warphole.cluster.set_open(open);

        if changed {
            tracing::info!("[conduit] warphole {} {:?}", key, state);
            for listener in &mut self.state_listeners {
                listener(key, open);
            }
        }
        changed
    }

    /// Spawns a transportable ball in flatspace.
    pub fn spawn_ball(&self, registry: &mut FlatRegistry, x: f32, y: f32) -> Result<BodyRef, WarpError> {
        let body = registry.add(
            ball,
            &BallParams {
                x,
                y,
                radius: self.ball_radius,
            },
        )?;
        registry.set_contact_callback(body.id(), transit_callback())?;
        Ok(body)
    }

    /// Forwards transit events emitted during the step to realspace.
    ///
    /// Events whose warphole vanished in the meantime are dropped.
    pub fn relay(&mut self, registry: &mut FlatRegistry, realspace: &mut dyn Realspace) -> Vec<TransitEvent> {
        let mut relayed = Vec::new();

        for event in registry.drain_events() {
            let Some(warphole) = self.warpholes.get(&event.key) else {
                tracing::warn!("[conduit] transit through vanished warphole {}", event.key);
                continue;
            };

            tracing::info!("[conduit] ball {} transited warphole {}", event.ball, event.key);
            realspace.spawn_object(event.key, &warphole.pose);
            for listener in &mut self.transit_listeners {
                listener(&event);
            }
            relayed.push(event);
        }

        relayed
    }

    pub fn warphole(&self, key: MarkerId) -> Option<&Warphole> {
        self.warpholes.get(&key)
    }

    pub fn warpholes(&self) -> impl Iterator<Item = &Warphole> {
        self.warpholes.values()
    }

    pub fn len(&self) -> usize {
        self.warpholes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.warpholes.is_empty()
    }
}

/// Contact callback installed on every conduit ball.
///
/// Fires at most once per ball: it marks the ball, and the registry never
/// dispatches to marked bodies.
fn transit_callback() -> ContactCallback<TransitEvent> {
    Box::new(|registry: &mut FlatRegistry, event: ContactEvent| {
        if event.phase != ContactPhase::Began {
            return Ok(());
        }
        let Some(link) = registry
            .get(event.other.id())
            .filter(|b| !b.is_marked_for_deletion())
            .and_then(|b| b.meta().warphole())
            .cloned()
        else {
            return Ok(());
        };

        if !link.is_open() {
            tracing::debug!("[conduit] ball {} resting on closed warphole {}", event.this.id(), link.key);
            return Ok(());
        }

        registry.mark_for_deletion(event.this.id())?;
        registry.emit(TransitEvent {
            key: link.key,
            direction: TransitDirection::FlatToReal,
            ball: event.this.id(),
        });
        Ok(())
    })
}
