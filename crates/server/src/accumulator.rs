//! Per-player pending work between flushes.

use std::collections::BTreeMap;

use quarry_core::{BlockType, ToolUid};
use quarry_progression::saturating_add;
use tokio::time::Instant;

/// Blocks waiting for the next flush, owned by one worker.
#[derive(Debug)]
pub struct MiningAccumulator {
    tool: Option<ToolUid>,
    pending: u64,
    enchant_blocks: u64,
    per_block: BTreeMap<BlockType, u64>,
    last_flush_at: Instant,
}

/// Work handed to a flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub tool: ToolUid,
    /// Blocks broken by hand.
    pub blocks: u64,
    /// Blocks removed by enchants.
    pub enchant_blocks: u64,
    /// Every removed block by type, both kinds included.
    pub per_block: BTreeMap<BlockType, u64>,
}

impl Batch {
    pub fn total(&self) -> u64 {
        saturating_add(self.blocks, self.enchant_blocks)
    }
}

impl MiningAccumulator {
    pub fn new(now: Instant) -> Self {
        Self {
            tool: None,
            pending: 0,
            enchant_blocks: 0,
            per_block: BTreeMap::new(),
            last_flush_at: now,
        }
    }

    /// Tool the pending blocks belong to.
    pub fn tool(&self) -> Option<ToolUid> {
        self.tool
    }

    /// Whether adding work for `tool` would mix two tools in one batch.
    pub fn holds_other_tool(&self, tool: ToolUid) -> bool {
        !self.is_empty() && self.tool != Some(tool)
    }

    pub fn is_empty(&self) -> bool {
        self.pending == 0
    }

    /// Blocks of both kinds waiting for a flush.
    pub fn pending(&self) -> u64 {
        self.pending
    }

    pub fn last_flush_at(&self) -> Instant {
        self.last_flush_at
    }

    pub fn record_block(&mut self, tool: ToolUid, block: &BlockType) {
        self.tool = Some(tool);
        self.pending = saturating_add(self.pending, 1);
        let count = self.per_block.entry(block.clone()).or_default();
        *count = saturating_add(*count, 1);
    }

    pub fn record_enchant(&mut self, tool: ToolUid, removed: &BTreeMap<BlockType, u64>) {
        self.tool = Some(tool);
        for (block, amount) in removed {
            self.pending = saturating_add(self.pending, *amount);
            self.enchant_blocks = saturating_add(self.enchant_blocks, *amount);
            let count = self.per_block.entry(block.clone()).or_default();
            *count = saturating_add(*count, *amount);
        }
    }

    /// Take the pending work and reset. `None` when nothing is pending.
    pub fn take(&mut self, now: Instant) -> Option<Batch> {
        self.last_flush_at = now;
        if self.is_empty() {
            return None;
        }
        let tool = self.tool?;
        let batch = Batch {
            tool,
            blocks: self.pending - self.enchant_blocks,
            enchant_blocks: self.enchant_blocks,
            per_block: std::mem::take(&mut self.per_block),
        };
        self.pending = 0;
        self.enchant_blocks = 0;
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinary_and_enchant_blocks_are_tallied_apart() {
        let now = Instant::now();
        let mut acc = MiningAccumulator::new(now);
        let stone = BlockType::new("STONE");
        acc.record_block(ToolUid(1), &stone);
        acc.record_block(ToolUid(1), &stone);
        acc.record_enchant(
            ToolUid(1),
            &[(stone.clone(), 5), (BlockType::new("COAL_ORE"), 2)]
                .into_iter()
                .collect(),
        );
        assert_eq!(acc.pending(), 9);
        assert!(!acc.holds_other_tool(ToolUid(1)));
        assert!(acc.holds_other_tool(ToolUid(2)));

        let batch = acc.take(now).unwrap();
        assert_eq!(batch.blocks, 2);
        assert_eq!(batch.enchant_blocks, 7);
        assert_eq!(batch.total(), 9);
        assert_eq!(batch.per_block[&stone], 7);
        assert!(acc.is_empty());
        assert!(acc.take(now).is_none());
        assert!(!acc.holds_other_tool(ToolUid(2)));
    }
}
