#![warn(missing_docs)]
//! Core primitives shared across the quarry workspace.

pub mod block;
pub mod enchantment;
pub mod events;
pub mod gateway;
pub mod position;
pub mod tool;
mod world_id;

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

// Re-export commonly used types
pub use block::BlockType;
pub use enchantment::{Enchant, EnchantKind, SweepAxis, UnknownEnchant};
pub use events::{CoreEvent, MiningSummary};
pub use gateway::PlayerGateway;
pub use position::{BlockPos, ChunkPos, CHUNK_WIDTH};
pub use tool::{Booster, BoosterKind, ToolProgressionState};
pub use world_id::WorldId;

/// Stable identifier of a connected player.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player#{}", self.0)
    }
}

/// Stable identity tag carried by a tool item across inventory moves.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ToolUid(pub u64);

impl fmt::Display for ToolUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tool#{:016x}", self.0)
    }
}

/// Wall-clock milliseconds since the Unix epoch.
///
/// Booster expiry and mine reset stamps are persisted in this unit.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().min(u64::MAX as u128) as u64)
        .unwrap_or(0)
}

/// Build an RNG from an optional fixed seed mixed with a salt.
///
/// A `None` seed draws from OS entropy; a fixed seed gives reproducible rolls per salt.
pub fn seeded_rng(seed: Option<u64>, salt: u64) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed ^ salt.rotate_left(17)),
        None => StdRng::from_entropy(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn seeded_rng_is_reproducible_per_salt() {
        let a: u64 = seeded_rng(Some(7), 1).gen();
        let b: u64 = seeded_rng(Some(7), 1).gen();
        let c: u64 = seeded_rng(Some(7), 2).gen();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn ids_display_compactly() {
        assert_eq!(PlayerId(3).to_string(), "player#3");
        assert_eq!(ToolUid(255).to_string(), "tool#00000000000000ff");
    }
}
