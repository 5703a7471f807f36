//! Integer block and chunk coordinates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Chunk width and depth in blocks.
pub const CHUNK_WIDTH: i32 = 16;

/// Absolute block coordinate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct BlockPos {
    /// East-west axis.
    pub x: i32,
    /// Vertical axis.
    pub y: i32,
    /// North-south axis.
    pub z: i32,
}

impl BlockPos {
    /// Create a position from its components.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Column of chunks this block belongs to.
    pub fn chunk(self) -> ChunkPos {
        ChunkPos::new(
            self.x.div_euclid(CHUNK_WIDTH),
            self.z.div_euclid(CHUNK_WIDTH),
        )
    }

    /// X/Z offset inside the owning chunk (each in `0..16`).
    pub fn local_xz(self) -> (usize, usize) {
        (
            self.x.rem_euclid(CHUNK_WIDTH) as usize,
            self.z.rem_euclid(CHUNK_WIDTH) as usize,
        )
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Chunk column coordinate (X,Z) in chunk space.
/// Implements Ord for deterministic iteration in BTreeMap/BTreeSet (sorts by x, then z).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ChunkPos {
    /// Chunk X index.
    pub x: i32,
    /// Chunk Z index.
    pub z: i32,
}

impl ChunkPos {
    /// Create a chunk coordinate.
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Lowest block X/Z covered by this chunk.
    pub fn origin(self) -> (i32, i32) {
        (
            self.x.saturating_mul(CHUNK_WIDTH),
            self.z.saturating_mul(CHUNK_WIDTH),
        )
    }
}

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}
