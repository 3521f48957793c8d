//! Test utilities for headless Bevy integration tests.
//!
//! `TestApp` wraps a `MinimalPlugins` app with `WarpholePlugin` and records
//! every message the warphole systems write.

use bevy::prelude::*;

use crate::bevy::events::{BallTransited, SpawnObject, WarpholeStateChanged};
use crate::bevy::plugin::{WarpSet, WarpholePlugin};
use crate::bevy::resources::{DetectionFeed, SessionRes, WarpCommand, WarpCommandQueue};
use crate::config::WarpConfig;
use crate::session::Session;
use crate::tracker::MarkerId;

/// Messages observed after the relay phase.
#[derive(Resource, Debug, Default)]
pub(crate) struct MessageLog {
    pub state_changes: Vec<WarpholeStateChanged>,
    pub transits: Vec<BallTransited>,
    pub spawns: Vec<(MarkerId, Vec3)>,
}

fn record_messages(
    mut log: ResMut<MessageLog>,
    mut changed: MessageReader<WarpholeStateChanged>,
    mut transited: MessageReader<BallTransited>,
    mut spawned: MessageReader<SpawnObject>,
) {
    log.state_changes.extend(changed.read().copied());
    log.transits.extend(transited.read().copied());
    log.spawns
        .extend(spawned.read().map(|s| (s.key, s.transform.translation)));
}

pub(crate) struct TestApp {
    pub app: App,
}

impl TestApp {
    pub fn new(config: WarpConfig) -> Self {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.add_plugins(WarpholePlugin::new(config));
        app.init_resource::<MessageLog>();
        app.add_systems(FixedUpdate, record_messages.after(WarpSet::Relay));
        // Only explicit overstep advances FixedUpdate.
        app.world_mut().resource_mut::<Time<Virtual>>().pause();
        app.update();
        Self { app }
    }

    /// Advance by exactly `n` fixed timesteps.
    pub fn step_physics(&mut self, n: usize) {
        let dt = self.app.world().resource::<Time<Fixed>>().timestep();
        for _ in 0..n {
            self.app
                .world_mut()
                .resource_mut::<Time<Fixed>>()
                .accumulate_overstep(dt);
            self.app.update();
        }
    }

    pub fn detections(&self) -> DetectionFeed {
        self.app.world().resource::<DetectionFeed>().clone()
    }

    pub fn push_command(&self, command: WarpCommand) {
        self.app.world().resource::<WarpCommandQueue>().push(command);
    }

    pub fn session(&self) -> &Session {
        &self.app.world().resource::<SessionRes>().0
    }

    pub fn log(&self) -> &MessageLog {
        self.app.world().resource::<MessageLog>()
    }
}
