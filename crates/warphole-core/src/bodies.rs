//! Body spec producers for `PhysicsRegistry::add`.
//!
//! A producer turns plain parameters into the engine-native rigid body and
//! collider, plus the application-level kind and metadata for the wrapper.

use rapier2d::prelude::*;

use crate::cluster::WarpholeLink;

/// Application-level classification of a registered body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyKind {
    /// Dynamic transported object.
    Ball,
    /// Static boundary geometry.
    Edge,
    /// One sensor of a warphole's cluster.
    SensorMember,
}

impl BodyKind {
    /// Non-zero tag stored in the high half of rapier `user_data`.
    pub fn tag(self) -> u64 {
        match self {
            Self::Ball => 1,
            Self::Edge => 2,
            Self::SensorMember => 3,
        }
    }

    pub fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            1 => Some(Self::Ball),
            2 => Some(Self::Edge),
            3 => Some(Self::SensorMember),
            _ => None,
        }
    }
}

/// Opaque payload attached to a wrapped body.
#[derive(Debug, Clone, Default)]
pub enum BodyMeta {
    #[default]
    None,
    Warphole(WarpholeLink),
}

impl BodyMeta {
    pub fn warphole(&self) -> Option<&WarpholeLink> {
        match self {
            Self::Warphole(link) => Some(link),
            Self::None => None,
        }
    }
}

/// Everything needed to construct a body in the engine.
#[derive(Debug, Clone)]
pub struct BodySpec {
    pub kind: BodyKind,
    pub body: RigidBody,
    pub collider: Collider,
    pub meta: BodyMeta,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallParams {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeParams {
    pub start: [f32; 2],
    pub end: [f32; 2],
    pub thickness: f32,
}

#[derive(Debug, Clone)]
pub struct SensorParams {
    pub center: [f32; 2],
    pub radius: f32,
    pub link: WarpholeLink,
}

/// Dynamic ball that reports collision events.
pub fn ball(params: &BallParams) -> BodySpec {
    let body = RigidBodyBuilder::dynamic()
        .translation(Vector::new(params.x, params.y))
        .linear_damping(0.1)
        .angular_damping(0.5)
        .ccd_enabled(true)
        .build();

    let collider = ColliderBuilder::ball(params.radius)
        .restitution(0.3)
        .friction(0.3)
        .density(1.0)
        .active_events(ActiveEvents::COLLISION_EVENTS)
        .build();

    BodySpec {
        kind: BodyKind::Ball,
        body,
        collider,
        meta: BodyMeta::None,
    }
}

/// Fixed line segment, built as a thin rotated cuboid.
pub fn edge(params: &EdgeParams) -> BodySpec {
    let [sx, sy] = params.start;
    let [ex, ey] = params.end;
    let mid = [f32::midpoint(sx, ex), f32::midpoint(sy, ey)];
    let dx = ex - sx;
    let dy = ey - sy;
    let length = (dx * dx + dy * dy).sqrt();
    let angle = dy.atan2(dx);

    let body = RigidBodyBuilder::fixed()
        .translation(Vector::new(mid[0], mid[1]))
        .rotation(angle)
        .build();

    let collider = ColliderBuilder::cuboid(length / 2.0, params.thickness / 2.0)
        .friction(0.3)
        .restitution(0.5)
        .build();

    BodySpec {
        kind: BodyKind::Edge,
        body,
        collider,
        meta: BodyMeta::None,
    }
}

/// Fixed circular sensor that belongs to a warphole cluster.
pub fn sensor(params: &SensorParams) -> BodySpec {
    let body = RigidBodyBuilder::fixed()
        .translation(Vector::new(params.center[0], params.center[1]))
        .build();

    let collider = ColliderBuilder::ball(params.radius)
        .sensor(true)
        .active_events(ActiveEvents::COLLISION_EVENTS)
        .build();

    BodySpec {
        kind: BodyKind::SensorMember,
        body,
        collider,
        meta: BodyMeta::Warphole(params.link.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::WarpholeGate;

    #[test]
    fn test_ball_is_dynamic() {
        let spec = ball(&BallParams {
            x: 1.0,
            y: 2.0,
            radius: 0.5,
        });
        assert_eq!(spec.kind, BodyKind::Ball);
        assert!(spec.body.is_dynamic());
        assert!(!spec.collider.is_sensor());
        assert_eq!(spec.body.translation().x, 1.0);
        assert_eq!(spec.body.translation().y, 2.0);
    }

    #[test]
    fn test_edge_spans_segment() {
        let spec = edge(&EdgeParams {
            start: [0.0, 0.0],
            end: [4.0, 0.0],
            thickness: 0.1,
        });
        assert_eq!(spec.kind, BodyKind::Edge);
        assert!(spec.body.is_fixed());
        let cuboid = spec.collider.shape().as_cuboid().expect("edge is a cuboid");
        assert!((cuboid.half_extents.x - 2.0).abs() < 1e-6);
        assert_eq!(spec.body.translation().x, 2.0);
    }

    #[test]
    fn test_sensor_carries_link() {
        let link = WarpholeLink::new(16, WarpholeGate::default());
        let spec = sensor(&SensorParams {
            center: [0.0, 0.0],
            radius: 1.0,
            link,
        });
        assert!(spec.collider.is_sensor());
        assert_eq!(spec.meta.warphole().map(|l| l.key), Some(16));
    }
}
