//! # Block Side Module
//!
//! The six faces of a voxel. Lighting stores one set of corner values per face, and the
//! mesher emits one quad per visible face, both in the order given by [`BlockSide::all`].

use cgmath::Vector3;

/// One face of a voxel.
///
/// The discriminant doubles as the face's index into per-face arrays.
/// The order is: [FRONT, BACK, BOTTOM, TOP, LEFT, RIGHT]
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum BlockSide {
    /// The front face (facing positive Z)
    FRONT = 0,
    /// The back face (facing negative Z)
    BACK = 1,
    /// The bottom face (facing negative Y)
    BOTTOM = 2,
    /// The top face (facing positive Y)
    TOP = 3,
    /// The left face (facing negative X)
    LEFT = 4,
    /// The right face (facing positive X)
    RIGHT = 5,
}

impl BlockSide {
    pub fn all() -> [BlockSide; 6] {
        [
            BlockSide::FRONT,
            BlockSide::BACK,
            BlockSide::BOTTOM,
            BlockSide::TOP,
            BlockSide::LEFT,
            BlockSide::RIGHT,
        ]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Outward unit normal of the face.
    pub fn normal(self) -> Vector3<i32> {
        match self {
            BlockSide::FRONT => Vector3::new(0, 0, 1),
            BlockSide::BACK => Vector3::new(0, 0, -1),
            BlockSide::BOTTOM => Vector3::new(0, -1, 0),
            BlockSide::TOP => Vector3::new(0, 1, 0),
            BlockSide::LEFT => Vector3::new(-1, 0, 0),
            BlockSide::RIGHT => Vector3::new(1, 0, 0),
        }
    }

    /// Corners of the face on the unit cube, counter-clockwise when seen from outside.
    ///
    /// Triangulating as `[0, 1, 2]` and `[0, 2, 3]` gives front faces whose winding agrees
    /// with [`normal`](Self::normal).
    pub fn corners(self) -> [Vector3<i32>; 4] {
        match self {
            BlockSide::FRONT => [
                Vector3::new(0, 0, 1),
                Vector3::new(1, 0, 1),
                Vector3::new(1, 1, 1),
                Vector3::new(0, 1, 1),
            ],
            BlockSide::BACK => [
                Vector3::new(0, 0, 0),
                Vector3::new(0, 1, 0),
                Vector3::new(1, 1, 0),
                Vector3::new(1, 0, 0),
            ],
            BlockSide::BOTTOM => [
                Vector3::new(0, 0, 0),
                Vector3::new(1, 0, 0),
                Vector3::new(1, 0, 1),
                Vector3::new(0, 0, 1),
            ],
            BlockSide::TOP => [
                Vector3::new(0, 1, 0),
                Vector3::new(0, 1, 1),
                Vector3::new(1, 1, 1),
                Vector3::new(1, 1, 0),
            ],
            BlockSide::LEFT => [
                Vector3::new(0, 0, 0),
                Vector3::new(0, 0, 1),
                Vector3::new(0, 1, 1),
                Vector3::new(0, 1, 0),
            ],
            BlockSide::RIGHT => [
                Vector3::new(1, 0, 0),
                Vector3::new(1, 1, 0),
                Vector3::new(1, 1, 1),
                Vector3::new(1, 0, 1),
            ],
        }
    }

    /// Texture layer: 0 for tops, 1 for sides, 2 for bottoms.
    pub fn texture_index(self) -> u32 {
        match self {
            BlockSide::TOP => 0,
            BlockSide::BOTTOM => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corner_winding_matches_normals() {
        for side in BlockSide::all() {
            let [a, b, c, _] = side.corners();
            let first = (b - a).cast::<f32>().unwrap();
            let second = (c - a).cast::<f32>().unwrap();
            let cross = first.cross(second);
            let normal = side.normal().cast::<f32>().unwrap();
            assert_eq!(cross, normal, "{side:?}");
        }
    }

    #[test]
    fn indices_follow_declaration_order() {
        for (expected, side) in BlockSide::all().into_iter().enumerate() {
            assert_eq!(side.index(), expected);
        }
    }
}
