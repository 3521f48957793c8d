//! `WarpholePlugin`: runs a [`Session`] inside a Bevy app.
//!
//! The five session phases are separate `FixedUpdate` systems, one per
//! [`WarpSet`], chained so the frame ordering is preserved. Structural
//! errors are returned from the systems and fail fast through Bevy's
//! error handler.

use bevy::prelude::*;

use crate::bevy::adapter::pose_to_transform;
use crate::bevy::events::{
    BallTransited, MarkerSelectionChanged, SpawnObject, WarpholeStateChanged,
};
use crate::bevy::resources::{DetectionFeed, SessionRes, WarpCommand, WarpCommandQueue};
use crate::config::WarpConfig;
use crate::conduit::Realspace;
use crate::session::Session;
use crate::tracker::{MarkerId, Pose};

/// Ordering of the warphole systems within `FixedUpdate`.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum WarpSet {
    /// Tracker update and warphole lifecycle.
    Track,
    /// Queued commands and open/closed propagation.
    Propagate,
    /// Kill floor and physics step.
    Step,
    /// Deferred body deletion.
    Deferred,
    /// Transit relay to realspace.
    Relay,
}

#[derive(Default)]
pub struct WarpholePlugin {
    pub config: WarpConfig,
    /// Shared detection feed; a fresh one is created when `None`.
    pub detections: Option<DetectionFeed>,
    /// Shared command queue; a fresh one is created when `None`.
    pub commands: Option<WarpCommandQueue>,
}

impl WarpholePlugin {
    pub fn new(config: WarpConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }
}

impl Plugin for WarpholePlugin {
    /// # Panics
    ///
    /// Panics if the config does not pass [`WarpConfig::validate`].
    fn build(&self, app: &mut App) {
        let session = match Session::new(self.config.clone()) {
            Ok(session) => session,
            Err(err) => panic!("[warphole] invalid config: {err}"),
        };

        app.insert_resource(Time::<Fixed>::from_seconds(f64::from(self.config.dt)));

        app.insert_resource(SessionRes(session))
            .insert_resource(self.detections.clone().unwrap_or_default())
            .insert_resource(self.commands.clone().unwrap_or_default());

        app.add_message::<MarkerSelectionChanged>()
            .add_message::<WarpholeStateChanged>()
            .add_message::<BallTransited>()
            .add_message::<SpawnObject>();

        app.configure_sets(
            FixedUpdate,
            (
                WarpSet::Track,
                WarpSet::Propagate,
                WarpSet::Step,
                WarpSet::Deferred,
                WarpSet::Relay,
            )
                .chain(),
        );

        app.add_systems(FixedUpdate, track_markers.in_set(WarpSet::Track))
            .add_systems(FixedUpdate, propagate_state.in_set(WarpSet::Propagate))
            .add_systems(FixedUpdate, step_physics.in_set(WarpSet::Step))
            .add_systems(FixedUpdate, process_deferred.in_set(WarpSet::Deferred))
            .add_systems(FixedUpdate, relay_transits.in_set(WarpSet::Relay));

        tracing::info!(
            "[warphole] plugin ready (dt={}, members={})",
            self.config.dt,
            self.config.cluster_members
        );
    }
}

fn track_markers(mut session: ResMut<SessionRes>, feed: Res<DetectionFeed>) -> Result {
    let detections = feed.latest();
    session.0.track(&detections)?;
    Ok(())
}

fn propagate_state(
    mut session: ResMut<SessionRes>,
    queue: Res<WarpCommandQueue>,
    mut selections: MessageReader<MarkerSelectionChanged>,
    mut changed: MessageWriter<WarpholeStateChanged>,
) -> Result {
    for command in queue.drain() {
        match command {
            WarpCommand::Select { id, is_selected } => session.0.select(id, is_selected),
            WarpCommand::SpawnBall { x, y } => {
                session.0.spawn_ball(x, y)?;
            }
        }
    }

    for selection in selections.read() {
        session.0.select(selection.id, selection.is_selected);
    }

    for (key, is_open) in session.0.propagate() {
        changed.write(WarpholeStateChanged { key, is_open });
    }
    Ok(())
}

fn step_physics(mut session: ResMut<SessionRes>, time: Res<Time>) -> Result {
    session.0.step(time.delta_secs())?;
    Ok(())
}

fn process_deferred(mut session: ResMut<SessionRes>) -> Result {
    let removed = session.0.process_deferred()?;
    if !removed.is_empty() {
        tracing::debug!("[warphole] removed {} bodies", removed.len());
    }
    Ok(())
}

/// Collects realspace spawn requests so they can be written as messages.
#[derive(Default)]
struct SpawnRequests(Vec<SpawnObject>);

impl Realspace for SpawnRequests {
    fn spawn_object(&mut self, key: MarkerId, pose: &Pose) {
        self.0.push(SpawnObject {
            key,
            transform: pose_to_transform(pose),
        });
    }
}

fn relay_transits(
    mut session: ResMut<SessionRes>,
    mut transited: MessageWriter<BallTransited>,
    mut spawns: MessageWriter<SpawnObject>,
) {
    let mut requests = SpawnRequests::default();
    let events = session.0.relay(&mut requests);

    for event in events {
        transited.write(BallTransited {
            key: event.key,
            direction: event.direction,
            ball: event.ball,
        });
    }
    for request in requests.0 {
        spawns.write(request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bevy::test_utils::TestApp;
    use crate::conduit::TransitDirection;
    use crate::tracker::{Detection, pose_from_translation};

    #[test]
    fn test_marker_creates_warphole() {
        let mut app = TestApp::new(WarpConfig::default());
        app.detections().publish(vec![Detection::new(16, pose_from_translation(0.0, 0.0, 0.0))]);
        app.step_physics(1);

        let session = app.session();
        assert_eq!(session.conduit().len(), 1);
        assert_eq!(session.registry().len(), 6);
    }

    #[test]
    fn test_selection_emits_state_change() {
        let mut app = TestApp::new(WarpConfig::default());
        app.detections().publish(vec![Detection::new(16, pose_from_translation(0.0, 0.0, 0.0))]);
        app.step_physics(1);

        app.push_command(WarpCommand::Select {
            id: 16,
            is_selected: true,
        });
        app.step_physics(1);
        assert_eq!(
            app.log().state_changes,
            vec![WarpholeStateChanged {
                key: 16,
                is_open: true
            }]
        );

        // Re-selecting an open warphole is not a change.
        app.push_command(WarpCommand::Select {
            id: 16,
            is_selected: true,
        });
        app.step_physics(1);
        assert_eq!(app.log().state_changes.len(), 1);
    }

    #[test]
    fn test_selection_message_opens_warphole() {
        let mut app = TestApp::new(WarpConfig::default());
        app.detections().publish(vec![Detection::new(16, pose_from_translation(0.0, 0.0, 0.0))]);
        app.step_physics(1);

        app.app.world_mut().write_message(MarkerSelectionChanged {
            id: 16,
            is_selected: true,
        });
        app.step_physics(1);

        let warphole = app.session().conduit().warphole(16).expect("warphole exists");
        assert!(warphole.state().is_open());
        assert!(warphole.cluster().is_open());
        assert_eq!(app.log().state_changes.len(), 1);
    }

    #[test]
    fn test_ball_transits_and_spawns_object() {
        let mut app = TestApp::new(WarpConfig::default());
        app.detections().publish(vec![Detection::new(16, pose_from_translation(0.5, 0.0, -2.0))]);
        app.step_physics(1);

        app.push_command(WarpCommand::Select {
            id: 16,
            is_selected: true,
        });
        app.push_command(WarpCommand::SpawnBall { x: 0.0, y: 5.0 });
        app.step_physics(180);

        let log = app.log();
        assert_eq!(log.transits.len(), 1);
        assert_eq!(log.transits[0].key, 16);
        assert_eq!(log.transits[0].direction, TransitDirection::FlatToReal);
        assert_eq!(log.spawns.len(), 1);
        assert_eq!(log.spawns[0].0, 16);
        assert_eq!(log.spawns[0].1, Vec3::new(0.5, 0.0, -2.0));
        assert_eq!(app.session().registry().len(), 6);
    }

    #[test]
    #[should_panic(expected = "invalid config")]
    fn test_zero_timestep_is_rejected_at_build() {
        let _app = TestApp::new(WarpConfig {
            dt: 0.0,
            ..WarpConfig::default()
        });
    }

    #[test]
    fn test_feed_loss_tears_down_warphole() {
        let mut app = TestApp::new(WarpConfig::default());
        app.detections().publish(vec![Detection::new(16, pose_from_translation(0.0, 0.0, 0.0))]);
        app.step_physics(1);
        assert_eq!(app.session().registry().len(), 6);

        app.detections().clear();
        app.step_physics(1);
        assert!(app.session().conduit().is_empty());
        assert!(app.session().registry().is_empty());
    }
}
