use quarry_core::{BlockPos, BlockType, Enchant, PlayerId, ToolUid, WorldId};
use serde::{Deserialize, Serialize};

/// A permission-checked block break handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockBreak {
    pub player: PlayerId,
    /// Tool in hand when the block broke.
    pub tool: ToolUid,
    /// Enchants on that tool.
    #[serde(default)]
    pub enchants: Vec<Enchant>,
    pub world: WorldId,
    pub pos: BlockPos,
    pub block: BlockType,
}
