//! Runtime configuration loaded from JSON.

use serde::{Deserialize, Serialize};

use crate::error::WarpError;

/// Fixed timestep for physics simulation (60Hz).
pub const PHYSICS_DT: f32 = 1.0 / 60.0;

/// Maps realspace marker translations onto the flatspace plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceMapping {
    /// Flatspace units per realspace unit.
    pub scale: f32,
    pub offset: [f32; 2],
}

impl Default for SpaceMapping {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: [0.0, 0.0],
        }
    }
}

impl SpaceMapping {
    /// Projects a realspace `(x, y)` translation into flatspace.
    pub fn project(&self, x: f32, y: f32) -> [f32; 2] {
        [
            x * self.scale + self.offset[0],
            y * self.scale + self.offset[1],
        ]
    }
}

/// Tunables for the tracker, registry and conduit.
///
/// Every field has a default, so a partial JSON document is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarpConfig {
    pub dt: f32,
    /// Gravity in flatspace, y-up.
    pub gravity: [f32; 2],
    pub cluster_members: usize,
    pub footprint_radius: f32,
    /// Fractional inflation of each member past the minimal covering radius.
    pub sensor_overlap: f32,
    pub ball_radius: f32,
    pub mapping: SpaceMapping,
    /// Balls below this y are culled. `None` disables culling.
    pub kill_floor: Option<f32>,
    /// Ball speeds are clamped to this before every step.
    pub max_ball_speed: f32,
}

impl Default for WarpConfig {
    fn default() -> Self {
        Self {
            dt: PHYSICS_DT,
            gravity: [0.0, -9.81],
            cluster_members: 6,
            footprint_radius: 1.5,
            sensor_overlap: 0.1,
            ball_radius: 0.25,
            mapping: SpaceMapping::default(),
            kill_floor: Some(-50.0),
            max_ball_speed: 60.0,
        }
    }
}

impl WarpConfig {
    /// Parses a config from JSON, filling omitted fields with defaults.
    ///
    /// The result is validated before it is returned.
    pub fn from_json(json: &str) -> Result<Self, WarpError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the tracker, clusters or physics step cannot run with.
    ///
    /// A ball at `max_ball_speed` may move at most `footprint_radius` per
    /// step. Every chord within `sqrt(3)/2 * footprint_radius` of a warphole
    /// centre is at least that long, so such a crossing always lands one
    /// step inside the cluster and raises a begin-contact. Sensors are not
    /// swept by CCD, so faster balls could skip the cluster entirely.
    pub fn validate(&self) -> Result<(), WarpError> {
        positive("dt", self.dt)?;
        positive("footprint_radius", self.footprint_radius)?;
        positive("ball_radius", self.ball_radius)?;
        positive("max_ball_speed", self.max_ball_speed)?;

        if self.cluster_members < 2 {
            return Err(WarpError::InvalidConfig {
                field: "cluster_members",
                reason: format!("needs at least 2 members, got {}", self.cluster_members),
            });
        }
        if !self.sensor_overlap.is_finite() || self.sensor_overlap < 0.0 {
            return Err(WarpError::InvalidConfig {
                field: "sensor_overlap",
                reason: format!("must be finite and non-negative, got {}", self.sensor_overlap),
            });
        }
        if !self.mapping.scale.is_finite() || self.mapping.scale == 0.0 {
            return Err(WarpError::InvalidConfig {
                field: "mapping.scale",
                reason: format!("must be finite and non-zero, got {}", self.mapping.scale),
            });
        }

        let travel = self.max_ball_speed * self.dt;
        if travel > self.footprint_radius {
            return Err(WarpError::InvalidConfig {
                field: "max_ball_speed",
                reason: format!(
                    "{travel} units per step exceeds the footprint radius {}",
                    self.footprint_radius
                ),
            });
        }
        Ok(())
    }

    /// Same config without gravity, used by scenarios that steer bodies by hand.
    pub fn weightless() -> Self {
        Self {
            gravity: [0.0, 0.0],
            ..Self::default()
        }
    }
}

fn positive(field: &'static str, value: f32) -> Result<(), WarpError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(WarpError::InvalidConfig {
            field,
            reason: format!("must be positive and finite, got {value}"),
        })
    }
}
