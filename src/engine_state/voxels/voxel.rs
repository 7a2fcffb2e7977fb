//! The per-voxel value stored by the terrain.

use serde::{Deserialize, Serialize};

/// A single voxel.
///
/// `empty` is authored (generated, loaded or edited). `outside` is derived: a voxel is
/// outside when every voxel above it, up to the sky ceiling, is empty. Edits only ever
/// supply `empty`; the stored `outside` flag is always recomputed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Voxel {
    pub empty: bool,
    #[serde(default)]
    pub outside: bool,
}

impl Voxel {
    pub const EMPTY: Voxel = Voxel {
        empty: true,
        outside: false,
    };

    pub const SOLID: Voxel = Voxel {
        empty: false,
        outside: false,
    };
}
