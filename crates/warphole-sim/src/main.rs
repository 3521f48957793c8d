//! Headless scripted run of a warphole session.
//!
//! Usage: `warphole-sim [config.json]`
//!
//! Marker #16 appears at the origin, its warphole is opened, a handful of
//! balls are dropped over it, and the marker is removed again near the end.

use std::path::Path;

use anyhow::Context;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warphole_core::{
    Detection, MarkerDetector, MarkerId, Pose, Realspace, Session, WarpConfig,
    pose_from_translation, pose_translation,
};

const MARKER: MarkerId = 16;
const SEED: u64 = 12345;
const TOTAL_FRAMES: u64 = 600;
const OPEN_AT: u64 = 10;
const LOSE_AT: u64 = 540;
const DROP_EVERY: u64 = 45;

/// Reports marker #16 between the first frame and `LOSE_AT`.
struct ScriptedDetector {
    frame: u64,
    pose: Pose,
}

impl MarkerDetector for ScriptedDetector {
    fn detect(&mut self) -> Vec<Detection> {
        let frame = self.frame;
        self.frame += 1;
        if frame < LOSE_AT {
            vec![Detection::new(MARKER, self.pose)]
        } else {
            Vec::new()
        }
    }
}

#[derive(Default)]
struct LoggingRealspace {
    spawned: usize,
}

impl Realspace for LoggingRealspace {
    fn spawn_object(&mut self, key: MarkerId, pose: &Pose) {
        self.spawned += 1;
        let [x, y, z] = pose_translation(pose);
        tracing::info!("[realspace] object spawned at warphole {key} ({x:.2}, {y:.2}, {z:.2})");
    }
}

fn load_config() -> anyhow::Result<WarpConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(WarpConfig::default());
    };
    let json = std::fs::read_to_string(Path::new(&path))
        .with_context(|| format!("failed to read config {path}"))?;
    WarpConfig::from_json(&json).with_context(|| format!("invalid config {path}"))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    let dt = config.dt;
    let spread = config.footprint_radius * 0.5;
    tracing::info!("[sim] starting with {config:?}");

    let mut session = Session::new(config)?;
    let mut detector = ScriptedDetector {
        frame: 0,
        pose: pose_from_translation(0.0, 0.0, 0.0),
    };
    let mut realspace = LoggingRealspace::default();
    let mut rng = ChaCha8Rng::seed_from_u64(SEED);

    let mut dropped = 0usize;
    let mut transits = 0usize;
    for frame in 0..TOTAL_FRAMES {
        if frame == OPEN_AT {
            session.select(MARKER, true);
        }
        if frame > OPEN_AT && frame < LOSE_AT && frame % DROP_EVERY == 0 {
            let x = rng.random_range(-spread..spread);
            let ball = session.spawn_ball(x, 4.0)?;
            dropped += 1;
            tracing::info!("[sim] frame {frame}: dropped ball {} at x={x:.2}", ball.id());
        }

        let report = session
            .tick(dt, &mut detector, &mut realspace)
            .with_context(|| format!("tick {frame} failed"))?;

        for (key, is_open) in &report.state_changes {
            tracing::info!("[sim] frame {frame}: warphole {key} open={is_open}");
        }
        for transit in &report.transits {
            tracing::info!("[sim] frame {frame}: ball {} transited warphole {}", transit.ball, transit.key);
        }
        if !report.markers.destroyed.is_empty() {
            tracing::info!(
                "[sim] frame {frame}: marker lost, {} bodies removed",
                report.removed.len()
            );
        }
        transits += report.transits.len();
    }

    tracing::info!(
        "[sim] done: {dropped} dropped, {transits} transited, {} spawned, {} bodies left",
        realspace.spawned,
        session.registry().len()
    );
    Ok(())
}
