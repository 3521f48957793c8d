//! Warphole Core Library
//!
//! Connects a camera-tracked realspace to a 2D physics flatspace: marker
//! detections become sensor-cluster warpholes, and balls that fall through
//! an open warphole are relayed back to realspace as spawn requests.

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod bodies;
pub mod cluster;
pub mod conduit;
pub mod config;
pub mod error;
pub mod physics;
pub mod reconcile;
pub mod registry;
pub mod session;
pub mod tracker;

// Bevy integration
pub mod bevy;

pub use bodies::{BallParams, BodyKind, BodyMeta, BodySpec, EdgeParams, SensorParams};
pub use cluster::{Footprint, SensorCluster, WarpholeGate, WarpholeLink};
pub use conduit::{
    Conduit, FlatRegistry, Realspace, TransitDirection, TransitEvent, Warphole, WarpholeState,
};
pub use config::{PHYSICS_DT, SpaceMapping, WarpConfig};
pub use error::WarpError;
pub use physics::{ContactPhase, PhysicsWorld, RawContact, default_gravity};
pub use reconcile::{Reconciliation, reconcile};
pub use registry::{
    BodyId, BodyRef, ContactEvent, DeletedBody, PhysicsRegistry, WrappedBody, decode_user_data,
    encode_user_data,
};
pub use session::{Session, TickReport};
pub use tracker::{
    Detection, IDENTITY_POSE, MarkerDetector, MarkerEvents, MarkerId, MarkerState, MarkerTracker,
    Pose, TrackedMarker, pose_from_translation, pose_translation,
};
