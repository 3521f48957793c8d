//! Bevy integration.
//!
//! Runs the session phases as `FixedUpdate` systems chained through
//! [`WarpSet`], so the frame ordering holds inside a Bevy app:
//! `Track → Propagate → Step → Deferred → Relay`.

pub mod adapter;
pub mod events;
pub mod plugin;
pub mod resources;

#[cfg(test)]
pub(crate) mod test_utils;

pub use adapter::pose_to_transform;
pub use events::*;
pub use plugin::{WarpSet, WarpholePlugin};
pub use resources::*;
