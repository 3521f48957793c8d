//! Per-frame tick driver.
//!
//! Owns the tracker, registry and conduit and runs them in a fixed order:
//!
//! 1. detect and update the tracker,
//! 2. create/move/tear down warpholes and propagate open/closed state,
//! 3. cull stray balls and step the physics world,
//! 4. destroy bodies marked for deletion,
//! 5. relay transits to realspace.
//!
//! Each phase is public so an external scheduler (the Bevy plugin) can run
//! them as separate systems in the same order.

use crate::bodies::{BodyKind, EdgeParams, edge};
use crate::conduit::{Conduit, FlatRegistry, Realspace, TransitEvent};
use crate::config::WarpConfig;
use crate::error::WarpError;
use crate::registry::{BodyId, BodyRef};
use crate::tracker::{Detection, MarkerDetector, MarkerEvents, MarkerId, MarkerTracker};

/// What happened during one tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub markers: MarkerEvents,
    /// Warphole state changes that took effect, as `(key, is_open)`.
    pub state_changes: Vec<(MarkerId, bool)>,
    pub culled: usize,
    pub removed: Vec<BodyId>,
    pub transits: Vec<TransitEvent>,
}

#[derive(Debug)]
pub struct Session {
    config: WarpConfig,
    tracker: MarkerTracker,
    registry: FlatRegistry,
    conduit: Conduit,
}

impl Session {
    /// Fails if `config` does not pass [`WarpConfig::validate`].
    pub fn new(config: WarpConfig) -> Result<Self, WarpError> {
        config.validate()?;
        Ok(Self {
            tracker: MarkerTracker::new(),
            registry: FlatRegistry::from_config(&config),
            conduit: Conduit::new(&config),
            config,
        })
    }

    /// Runs one full tick.
    ///
    /// A structural violation aborts the tick and is returned as-is.
    pub fn tick(
        &mut self,
        dt: f32,
        detector: &mut dyn MarkerDetector,
        realspace: &mut dyn Realspace,
    ) -> Result<TickReport, WarpError> {
        let detections = detector.detect();
        let markers = self.track(&detections)?;
        let state_changes = self.propagate();
        let culled = self.step(dt)?;
        let removed = self.process_deferred()?;
        let transits = self.relay(realspace);

        Ok(TickReport {
            markers,
            state_changes,
            culled,
            removed,
            transits,
        })
    }

    /// Tracker update plus warphole creation, relocation and teardown.
    pub fn track(&mut self, detections: &[Detection]) -> Result<MarkerEvents, WarpError> {
        let events = self.tracker.update(detections);
        self.conduit.apply_marker_events(&events, &mut self.registry)?;
        Ok(events)
    }

    pub fn propagate(&mut self) -> Vec<(MarkerId, bool)> {
        self.conduit.propagate_state()
    }

    /// Culls balls below the kill floor, clamps ball speeds, then steps the
    /// physics world.
    ///
    /// Returns the number of culled balls.
    pub fn step(&mut self, dt: f32) -> Result<usize, WarpError> {
        let culled = match self.config.kill_floor {
            Some(floor) => self.cull_below(floor)?,
            None => 0,
        };
        self.clamp_ball_speed(self.config.max_ball_speed)?;
        self.registry.step(dt)?;
        Ok(culled)
    }

    /// Sensors are not swept by CCD, so a ball must not outrun the cluster.
    fn clamp_ball_speed(&mut self, max: f32) -> Result<(), WarpError> {
        let fast: Vec<(BodyRef, [f32; 2])> = self
            .registry
            .iter()
            .filter(|b| b.kind() == BodyKind::Ball && !b.is_marked_for_deletion())
            .filter_map(|b| self.registry.linvel(b.body_ref()).map(|v| (b.body_ref(), v)))
            .filter(|(_, [vx, vy])| vx * vx + vy * vy > max * max)
            .collect();

        for (body, [vx, vy]) in fast {
            let scale = max / (vx * vx + vy * vy).sqrt();
            tracing::debug!("[session] clamping ball {} to {}", body.id(), max);
            self.registry.set_linvel(body, [vx * scale, vy * scale])?;
        }
        Ok(())
    }

    fn cull_below(&mut self, floor: f32) -> Result<usize, WarpError> {
        let stray: Vec<BodyId> = self
            .registry
            .iter()
            .filter(|b| b.kind() == BodyKind::Ball && !b.is_marked_for_deletion())
            .filter(|b| self.registry.position(b.body_ref()).is_some_and(|[_, y]| y < floor))
            .map(|b| b.id())
            .collect();

        for &id in &stray {
            tracing::debug!("[session] culling ball {} below {}", id, floor);
            self.registry.mark_for_deletion(id)?;
        }
        Ok(stray.len())
    }

    pub fn process_deferred(&mut self) -> Result<Vec<BodyId>, WarpError> {
        self.registry.process_deferred()
    }

    pub fn relay(&mut self, realspace: &mut dyn Realspace) -> Vec<TransitEvent> {
        self.conduit.relay(&mut self.registry, realspace)
    }

    /// Realspace selection input, applied at the next propagation phase.
    pub fn select(&mut self, id: MarkerId, is_selected: bool) {
        self.conduit.on_marker_selection_changed(id, is_selected);
    }

    pub fn spawn_ball(&mut self, x: f32, y: f32) -> Result<BodyRef, WarpError> {
        self.conduit.spawn_ball(&mut self.registry, x, y)
    }

    /// Adds static boundary geometry to flatspace.
    pub fn add_edge(&mut self, params: &EdgeParams) -> Result<BodyRef, WarpError> {
        self.registry.add(edge, params)
    }

    pub fn config(&self) -> &WarpConfig {
        &self.config
    }

    pub fn tracker(&self) -> &MarkerTracker {
        &self.tracker
    }

    pub fn registry(&self) -> &FlatRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FlatRegistry {
        &mut self.registry
    }

    pub fn conduit(&self) -> &Conduit {
        &self.conduit
    }

    pub fn conduit_mut(&mut self) -> &mut Conduit {
        &mut self.conduit
    }
}
