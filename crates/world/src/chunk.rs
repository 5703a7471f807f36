use std::collections::BTreeMap;

use quarry_core::ChunkPos;

/// Chunk width (X axis) in blocks.
pub const CHUNK_SIZE_X: usize = 16;
/// Section height (Y axis) in blocks.
pub const SECTION_SIZE_Y: usize = 16;
/// Chunk depth (Z axis) in blocks.
pub const CHUNK_SIZE_Z: usize = 16;
/// Block count per section.
pub const SECTION_VOLUME: usize = CHUNK_SIZE_X * SECTION_SIZE_Y * CHUNK_SIZE_Z;

/// Interned block identifier referencing the [`BlockRegistry`](crate::BlockRegistry).
pub type BlockId = u16;

/// Reserved ID for air.
pub const BLOCK_AIR: BlockId = 0;

/// Section-local position (X, Y, Z).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalPos {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl LocalPos {
    /// Convert to a linear index within a section array.
    pub fn index(self) -> usize {
        debug_assert!(self.x < CHUNK_SIZE_X);
        debug_assert!(self.y < SECTION_SIZE_Y);
        debug_assert!(self.z < CHUNK_SIZE_Z);
        (self.y * CHUNK_SIZE_Z + self.z) * CHUNK_SIZE_X + self.x
    }
}

struct Section {
    blocks: Box<[BlockId; SECTION_VOLUME]>,
    non_air: usize,
}

impl Section {
    fn empty() -> Self {
        Self {
            blocks: Box::new([BLOCK_AIR; SECTION_VOLUME]),
            non_air: 0,
        }
    }
}

/// A 16-wide column of blocks with unbounded height.
///
/// Sections are allocated lazily, so tall but sparse columns stay cheap.
pub struct Chunk {
    position: ChunkPos,
    sections: BTreeMap<i32, Section>,
}

impl Chunk {
    /// Allocate a fresh chunk filled with air.
    pub fn new(position: ChunkPos) -> Self {
        Self {
            position,
            sections: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn position(&self) -> ChunkPos {
        self.position
    }

    fn split(x: usize, y: i32, z: usize) -> (i32, usize) {
        let section = y.div_euclid(SECTION_SIZE_Y as i32);
        let local_y = y.rem_euclid(SECTION_SIZE_Y as i32) as usize;
        (section, LocalPos { x, y: local_y, z }.index())
    }

    /// Fetch the block id at chunk-local X/Z and absolute Y.
    pub fn block(&self, x: usize, y: i32, z: usize) -> BlockId {
        let (section, idx) = Self::split(x, y, z);
        self.sections
            .get(&section)
            .map(|s| s.blocks[idx])
            .unwrap_or(BLOCK_AIR)
    }

    /// Set a block, returning true if the stored id changed.
    pub fn set_block(&mut self, x: usize, y: i32, z: usize, id: BlockId) -> bool {
        let (section_y, idx) = Self::split(x, y, z);
        if id == BLOCK_AIR && !self.sections.contains_key(&section_y) {
            return false;
        }
        let section = self.sections.entry(section_y).or_insert_with(Section::empty);
        let previous = section.blocks[idx];
        if previous == id {
            return false;
        }
        section.blocks[idx] = id;
        match (previous == BLOCK_AIR, id == BLOCK_AIR) {
            (true, false) => section.non_air += 1,
            (false, true) => section.non_air -= 1,
            _ => {}
        }
        if section.non_air == 0 {
            self.sections.remove(&section_y);
        }
        true
    }

    /// Number of non-air blocks in the whole column.
    pub fn non_air_count(&self) -> usize {
        self.sections.values().map(|s| s.non_air).sum()
    }
}
