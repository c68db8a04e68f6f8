//! Vector types for world positions

use serde::{Deserialize, Serialize};

/// Floating point world position (player coordinates, rotations)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3f {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3f {
    pub const ZERO: Vector3f = Vector3f::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn floor_x(self) -> i32 {
        self.x.floor() as i32
    }

    pub fn floor_y(self) -> i32 {
        self.y.floor() as i32
    }

    pub fn floor_z(self) -> i32 {
        self.z.floor() as i32
    }

    /// Block position containing this point
    pub fn to_int(self) -> Vector3i {
        Vector3i::new(self.floor_x(), self.floor_y(), self.floor_z())
    }

    /// Chunk column containing this point (16x16 blocks)
    pub fn chunk_coords(self) -> (i32, i32) {
        (self.floor_x() >> 4, self.floor_z() >> 4)
    }
}

/// Integer block position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vector3i {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Vector3i {
    pub const ZERO: Vector3i = Vector3i::new(0, 0, 0);

    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn to_float(self) -> Vector3f {
        Vector3f::new(self.x as f32, self.y as f32, self.z as f32)
    }
}
