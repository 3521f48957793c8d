//! ECS Messages emitted by the warphole systems.

use bevy::prelude::*;

use crate::conduit::TransitDirection;
use crate::registry::BodyId;
use crate::tracker::MarkerId;

/// Realspace selection input, applied at the next propagation phase.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerSelectionChanged {
    pub id: MarkerId,
    pub is_selected: bool,
}

/// A warphole's realspace state changed and was pushed to flatspace.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarpholeStateChanged {
    pub key: MarkerId,
    pub is_open: bool,
}

/// A flatspace ball went through an open warphole.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BallTransited {
    pub key: MarkerId,
    pub direction: TransitDirection,
    pub ball: BodyId,
}

/// Realspace should instantiate an object at `transform`.
#[derive(Message, Debug, Clone, Copy)]
pub struct SpawnObject {
    pub key: MarkerId,
    pub transform: Transform,
}
