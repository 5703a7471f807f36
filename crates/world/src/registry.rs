use std::collections::HashMap;

use anyhow::{bail, Result};
use quarry_core::BlockType;

use crate::chunk::{BlockId, BLOCK_AIR};

/// Interns block type names into compact ids stored in chunks.
///
/// Id 0 is always air; ids are assigned in first-seen order and never reused.
#[derive(Debug, Clone)]
pub struct BlockRegistry {
    names: Vec<BlockType>,
    ids: HashMap<BlockType, BlockId>,
}

impl Default for BlockRegistry {
    fn default() -> Self {
        let air = BlockType::air();
        let mut ids = HashMap::new();
        ids.insert(air.clone(), BLOCK_AIR);
        Self {
            names: vec![air],
            ids,
        }
    }
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an already interned block.
    pub fn id_of(&self, block: &BlockType) -> Option<BlockId> {
        if block.is_air() {
            return Some(BLOCK_AIR);
        }
        self.ids.get(block).copied()
    }

    /// Intern `block`, assigning a new id on first sight.
    pub fn intern(&mut self, block: &BlockType) -> Result<BlockId> {
        if let Some(id) = self.id_of(block) {
            return Ok(id);
        }
        let Ok(id) = BlockId::try_from(self.names.len()) else {
            bail!("block registry full, cannot intern {block}");
        };
        self.names.push(block.clone());
        self.ids.insert(block.clone(), id);
        Ok(id)
    }

    /// Name for an interned id; unknown ids read as air.
    pub fn name(&self, id: BlockId) -> BlockType {
        self.names
            .get(usize::from(id))
            .cloned()
            .unwrap_or_else(BlockType::air)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn air_is_always_zero() {
        let mut registry = BlockRegistry::new();
        assert_eq!(registry.intern(&BlockType::air()).unwrap(), BLOCK_AIR);
        assert_eq!(registry.intern(&BlockType::new("")).unwrap(), BLOCK_AIR);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn interning_is_stable() {
        let mut registry = BlockRegistry::new();
        let stone = registry.intern(&BlockType::new("stone")).unwrap();
        let ore = registry.intern(&BlockType::new("DIAMOND_ORE")).unwrap();
        assert_ne!(stone, ore);
        assert_eq!(registry.intern(&BlockType::new("STONE")).unwrap(), stone);
        assert_eq!(registry.name(ore).as_str(), "DIAMOND_ORE");
        assert!(registry.name(999).is_air());
    }
}
