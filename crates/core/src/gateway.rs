//! Boundary to the inventory/UI layer.

use anyhow::Result;

use crate::events::CoreEvent;
use crate::tool::ToolProgressionState;
use crate::{BlockType, PlayerId, ToolUid};

/// Player-facing collaborator the mining pipeline writes results into.
///
/// Implementations own inventories and presentation. Calls come from
/// per-player worker tasks, so they must be cheap and must not block on the
/// pipeline itself.
pub trait PlayerGateway: Send + Sync + 'static {
    /// Current state of the tool with `uid` in the player's inventory, if it is still there.
    fn tool(&self, player: PlayerId, uid: ToolUid) -> Option<ToolProgressionState>;

    /// Write `state` back into whichever slot holds the tool with the same uid.
    ///
    /// Returns `Ok(false)` when no slot holds that tool any more; callers drop the update.
    fn commit_tool(&self, player: PlayerId, state: &ToolProgressionState) -> Result<bool>;

    /// Credit `amount` items of `block` to the player's backpack.
    fn credit_backpack(&self, player: PlayerId, block: &BlockType, amount: u64) -> Result<()>;

    /// Credit `amount` tokens to the player's balance.
    fn credit_tokens(&self, player: PlayerId, amount: u64) -> Result<()>;

    /// Deliver an event for presentation.
    fn emit(&self, event: CoreEvent);
}
