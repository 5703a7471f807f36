//! Mining pipeline tuning.

use std::time::Duration;

use quarry_core::{BlockType, EnchantKind};
use quarry_progression::GrowthCurve;
use serde::{Deserialize, Serialize};

/// Named parameters of the mining pipeline; every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pending blocks that force an immediate flush.
    pub chunk_size: u64,
    /// Idle time after which a partial chunk is flushed.
    pub debounce_ms: u64,
    /// Interval between per-player mining summaries.
    pub summary_interval_secs: u64,
    /// Per-player, per-enchant cooldown after an activation.
    pub enchant_cooldown_ms: u64,
    /// Activation probability added per enchant level.
    pub chance_per_level: f64,
    /// Enchants allowed to fire.
    pub enabled_enchants: Vec<EnchantKind>,
    /// Largest slab an enchant may clear in one activation.
    pub max_sweep_blocks: u64,
    /// Events queued per player beyond which new ones are dropped.
    pub max_queued_events: usize,
    /// Pause after a failed flush.
    pub flush_backoff_ms: u64,
    /// Minimum gap between two level-up events for the same level.
    pub level_up_cooldown_ms: u64,
    /// Tool experience per block.
    pub xp_per_block: u64,
    /// Tokens per block.
    pub tokens_per_block: u64,
    /// Cap on the folded booster multiplier.
    pub max_multiplier: f64,
    /// Blocks that count for progression but never enter the backpack.
    pub special_blocks: Vec<BlockType>,
    /// Fixed seed for enchant rolls.
    pub rng_seed: Option<u64>,
    /// Experience curve of tools.
    pub curve: GrowthCurve,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            debounce_ms: 300,
            summary_interval_secs: 30,
            enchant_cooldown_ms: 5_000,
            chance_per_level: 0.002,
            enabled_enchants: EnchantKind::ALL.to_vec(),
            max_sweep_blocks: 65_536,
            max_queued_events: 50_000,
            flush_backoff_ms: 250,
            level_up_cooldown_ms: 1_000,
            xp_per_block: 1,
            tokens_per_block: 1,
            max_multiplier: 10.0,
            special_blocks: Vec::new(),
            rng_seed: None,
            curve: GrowthCurve::default(),
        }
    }
}

impl PipelineConfig {
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size.max(1)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.max(1))
    }

    pub fn summary_interval(&self) -> Duration {
        Duration::from_secs(self.summary_interval_secs.max(1))
    }

    pub fn enchant_cooldown(&self) -> Duration {
        Duration::from_millis(self.enchant_cooldown_ms)
    }

    pub fn flush_backoff(&self) -> Duration {
        Duration::from_millis(self.flush_backoff_ms)
    }

    /// Never below one second.
    pub fn level_up_cooldown(&self) -> Duration {
        Duration::from_millis(self.level_up_cooldown_ms.max(1_000))
    }

    pub fn is_special(&self, block: &BlockType) -> bool {
        self.special_blocks.contains(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"chunk_size": 10, "special_blocks": ["bedrock"]}"#).unwrap();
        assert_eq!(config.chunk_size(), 10);
        assert_eq!(config.debounce(), Duration::from_millis(300));
        assert_eq!(config.max_queued_events, 50_000);
        assert!(config.is_special(&BlockType::new("BEDROCK")));
    }

    #[test]
    fn level_up_cooldown_has_a_floor() {
        let config = PipelineConfig {
            level_up_cooldown_ms: 10,
            chunk_size: 0,
            ..PipelineConfig::default()
        };
        assert_eq!(config.level_up_cooldown(), Duration::from_secs(1));
        assert_eq!(config.chunk_size(), 1);
    }
}
