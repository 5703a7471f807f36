//! Mine definitions and reset policy configuration.

use quarry_core::{BlockType, WorldId};
use serde::{Deserialize, Serialize};

use crate::region::RegionId;

/// A region refilled from a weighted palette.
///
/// Weights come from repetition: `[STONE, STONE, DIAMOND_ORE]` yields two
/// thirds stone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mine {
    pub name: String,
    pub region: RegionId,
    pub palette: Vec<BlockType>,
    /// Wall-clock millis of the last fill, 0 if never filled.
    pub last_reset_at_millis: u64,
    pub reset_interval_secs: u64,
}

impl Mine {
    pub fn new(name: impl Into<String>, region: RegionId, reset_interval_secs: u64) -> Self {
        Self {
            name: name.into(),
            region,
            palette: default_palette(),
            last_reset_at_millis: 0,
            reset_interval_secs,
        }
    }

    /// Replace the palette; an empty list falls back to the default block.
    pub fn set_palette(&mut self, palette: Vec<BlockType>) {
        self.palette = if palette.is_empty() {
            default_palette()
        } else {
            palette
        };
    }
}

pub fn default_palette() -> Vec<BlockType> {
    vec![BlockType::default_mine_block()]
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct MineKey {
    pub world: WorldId,
    pub name: String,
}

impl MineKey {
    pub fn new(world: &WorldId, name: &str) -> Self {
        Self {
            world: world.clone(),
            name: name.trim().to_ascii_lowercase(),
        }
    }
}

/// Mine lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MineConfig {
    /// Mined fraction at or above which a tick refills the mine.
    pub reset_threshold: f64,
    /// Interval used for new mines and for schedules asked to run every 0 s.
    pub default_reset_interval_secs: u64,
    /// Upper bound on blocks inspected per depletion sample.
    pub sample_limit: u64,
    /// Largest volume a single fill may write.
    pub max_fill_volume: u64,
    /// Fixed RNG seed for reproducible fills.
    pub rng_seed: Option<u64>,
}

impl Default for MineConfig {
    fn default() -> Self {
        Self {
            reset_threshold: 0.30,
            default_reset_interval_secs: 300,
            sample_limit: 250_000,
            max_fill_volume: 16 * 1024 * 1024,
            rng_seed: None,
        }
    }
}

impl MineConfig {
    /// Threshold clamped into `[0, 1]`; NaN falls back to the default.
    pub fn threshold(&self) -> f64 {
        if self.reset_threshold.is_nan() {
            Self::default().reset_threshold
        } else {
            self.reset_threshold.clamp(0.0, 1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_is_never_empty() {
        let mut mine = Mine::new("a", RegionId(1), 60);
        assert_eq!(mine.palette, vec![BlockType::new("STONE")]);
        mine.set_palette(vec![BlockType::new("gold_ore")]);
        assert_eq!(mine.palette, vec![BlockType::new("GOLD_ORE")]);
        mine.set_palette(Vec::new());
        assert_eq!(mine.palette, default_palette());
    }

    #[test]
    fn config_fills_missing_fields() {
        let config: MineConfig = serde_json::from_str(r#"{"reset_threshold": 0.5}"#).unwrap();
        assert_eq!(config.reset_threshold, 0.5);
        assert_eq!(config.default_reset_interval_secs, 300);
        assert_eq!(
            MineConfig {
                reset_threshold: 7.0,
                ..MineConfig::default()
            }
            .threshold(),
            1.0
        );
    }
}
