//! World block access used by mines and enchant sweeps.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use anyhow::Result;
use dashmap::DashMap;
use quarry_core::{BlockPos, BlockType, ChunkPos, WorldId};
use tracing::debug;

use crate::chunk::{BlockId, Chunk};
use crate::registry::BlockRegistry;

/// Narrow view of the game world.
///
/// Reads never force chunks to load: an unloaded chunk answers `None`.
pub trait BlockAccess: Send + Sync + 'static {
    /// Whether the chunk column is resident.
    fn is_chunk_loaded(&self, world: &WorldId, chunk: ChunkPos) -> bool;

    /// Block at `pos`, or `None` when its chunk is not loaded.
    fn block(&self, world: &WorldId, pos: BlockPos) -> Option<BlockType>;

    /// Apply a batch of writes, returning how many blocks actually changed.
    fn set_blocks(&self, world: &WorldId, blocks: &[(BlockPos, &BlockType)]) -> Result<usize>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ChunkKey {
    world: WorldId,
    pos: ChunkPos,
}

/// In-process chunked world shared by every task.
#[derive(Default)]
pub struct MemoryWorld {
    chunks: DashMap<ChunkKey, Chunk>,
    registry: RwLock<BlockRegistry>,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a chunk column resident (empty if it was never written).
    pub fn load_chunk(&self, world: &WorldId, pos: ChunkPos) {
        let key = ChunkKey {
            world: world.clone(),
            pos,
        };
        self.chunks.entry(key).or_insert_with(|| Chunk::new(pos));
    }

    /// Load every chunk column overlapping the X/Z rectangle between two blocks.
    pub fn load_area(&self, world: &WorldId, a: BlockPos, b: BlockPos) {
        let (lo, hi) = (a.chunk(), b.chunk());
        for cx in lo.x.min(hi.x)..=lo.x.max(hi.x) {
            for cz in lo.z.min(hi.z)..=lo.z.max(hi.z) {
                self.load_chunk(world, ChunkPos::new(cx, cz));
            }
        }
    }

    /// Drop a chunk column and its contents.
    pub fn unload_chunk(&self, world: &WorldId, pos: ChunkPos) -> bool {
        let key = ChunkKey {
            world: world.clone(),
            pos,
        };
        self.chunks.remove(&key).is_some()
    }

    pub fn loaded_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Non-air blocks across every loaded chunk of `world`.
    pub fn non_air_count(&self, world: &WorldId) -> usize {
        self.chunks
            .iter()
            .filter(|entry| &entry.key().world == world)
            .map(|entry| entry.value().non_air_count())
            .sum()
    }
}

impl BlockAccess for MemoryWorld {
    fn is_chunk_loaded(&self, world: &WorldId, chunk: ChunkPos) -> bool {
        self.chunks.contains_key(&ChunkKey {
            world: world.clone(),
            pos: chunk,
        })
    }

    fn block(&self, world: &WorldId, pos: BlockPos) -> Option<BlockType> {
        let key = ChunkKey {
            world: world.clone(),
            pos: pos.chunk(),
        };
        let chunk = self.chunks.get(&key)?;
        let (x, z) = pos.local_xz();
        let id = chunk.block(x, pos.y, z);
        drop(chunk);
        Some(
            self.registry
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .name(id),
        )
    }

    /// Writes load the target chunks, like placing blocks in-game does.
    fn set_blocks(&self, world: &WorldId, blocks: &[(BlockPos, &BlockType)]) -> Result<usize> {
        let mut ids = Vec::with_capacity(blocks.len());
        {
            let mut registry = self
                .registry
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for (pos, block) in blocks {
                ids.push((*pos, registry.intern(block)?));
            }
        }

        let mut by_chunk: BTreeMap<ChunkPos, Vec<(BlockPos, BlockId)>> = BTreeMap::new();
        for (pos, id) in ids {
            by_chunk.entry(pos.chunk()).or_default().push((pos, id));
        }

        let mut changed = 0;
        for (chunk_pos, writes) in by_chunk {
            let key = ChunkKey {
                world: world.clone(),
                pos: chunk_pos,
            };
            let mut chunk = self
                .chunks
                .entry(key)
                .or_insert_with(|| Chunk::new(chunk_pos));
            for (pos, id) in writes {
                let (x, z) = pos.local_xz();
                if chunk.set_block(x, pos.y, z, id) {
                    changed += 1;
                }
            }
        }
        debug!(world = %world, requested = blocks.len(), changed, "applied block writes");
        Ok(changed)
    }
}
