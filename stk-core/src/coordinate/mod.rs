//! Coordinate frames and rigid transforms between cameras

mod transforms;

pub use transforms::{
    average_rotations, matrix_to_rodrigues, project_to_rotation, rodrigues_to_matrix, skew,
    RigidTransform,
};
