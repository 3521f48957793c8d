//! Conversion from detector poses to the renderer's transform type.

use bevy::prelude::*;

use crate::tracker::Pose;

/// Converts a column-major detector pose into a Bevy `Transform`.
pub fn pose_to_transform(pose: &Pose) -> Transform {
    Transform::from_matrix(Mat4::from_cols_array(pose))
}
