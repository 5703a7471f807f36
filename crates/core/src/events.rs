//! Discrete events the core hands to the inventory/UI layer.
//!
//! The core never formats presentation text; the receiver decides how to render these.

use serde::{Deserialize, Serialize};

use crate::enchantment::EnchantKind;
use crate::{PlayerId, ToolUid};

/// Aggregated mining totals for one summary window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MiningSummary {
    /// Blocks broken by ordinary mining.
    pub blocks: u64,
    /// Blocks removed by enchant activations.
    pub enchant_blocks: u64,
    /// Tokens credited.
    pub tokens: u64,
    /// Tool experience gained.
    pub xp: u64,
    /// Length of the window in milliseconds.
    pub duration_ms: u64,
}

impl MiningSummary {
    /// True when nothing was mined in the window.
    pub fn is_empty(&self) -> bool {
        self.blocks == 0 && self.enchant_blocks == 0
    }
}

/// Event emitted by the mining pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CoreEvent {
    /// A tool reached a new level.
    LevelUp {
        /// Owner of the tool.
        player: PlayerId,
        /// Tool that levelled.
        tool: ToolUid,
        /// New level.
        level: u32,
    },
    /// Periodic mining summary.
    MiningSummary {
        /// Player the summary belongs to.
        player: PlayerId,
        /// Totals for the window.
        summary: MiningSummary,
    },
    /// An enchant fired and removed blocks.
    EnchantActivated {
        /// Player whose tool fired.
        player: PlayerId,
        /// Enchant that fired.
        enchant: EnchantKind,
        /// Number of blocks removed.
        removed: u64,
    },
}

impl CoreEvent {
    /// Player the event is addressed to.
    pub fn player(&self) -> PlayerId {
        match self {
            CoreEvent::LevelUp { player, .. }
            | CoreEvent::MiningSummary { player, .. }
            | CoreEvent::EnchantActivated { player, .. } => *player,
        }
    }

    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            CoreEvent::LevelUp { .. } => "level_up",
            CoreEvent::MiningSummary { .. } => "mining_summary",
            CoreEvent::EnchantActivated { .. } => "enchant_activated",
        }
    }
}
