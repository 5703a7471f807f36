use std::sync::{Mutex, PoisonError};

use quarry_core::ToolProgressionState;
use tracing::trace;

use crate::boost::saturating_add;
use crate::cache::BoundedCache;
use crate::curve::{
    experience_for_level_uncached, level_for_experience_uncached, CurveKey, GrowthCurve,
};

/// Default number of memoized entries per direction.
pub const DEFAULT_CACHE_CAPACITY: usize = 4_096;

/// Level before and after a progression update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelChange {
    /// Level before the update.
    pub previous: u32,
    /// Level after the update.
    pub current: u32,
}

impl LevelChange {
    /// Whether the update crossed at least one level.
    pub fn leveled_up(&self) -> bool {
        self.current > self.previous
    }
}

/// Memoizing front-end over the experience curve.
///
/// Shared by every mining worker; the caches sit behind short-lived mutexes.
#[derive(Debug)]
pub struct ProgressionEngine {
    experience_cache: Mutex<BoundedCache<(u32, CurveKey), u64>>,
    level_cache: Mutex<BoundedCache<(u64, CurveKey), u32>>,
}

impl Default for ProgressionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl ProgressionEngine {
    /// Create an engine whose caches hold at most `capacity` entries each.
    pub fn new(capacity: usize) -> Self {
        Self {
            experience_cache: Mutex::new(BoundedCache::new(capacity)),
            level_cache: Mutex::new(BoundedCache::new(capacity)),
        }
    }

    /// Total experience needed to reach `level` on `curve`.
    pub fn experience_for_level(&self, level: u32, curve: &GrowthCurve) -> u64 {
        let key = (level, curve.key());
        if let Some(xp) = self.cached_experience(&key) {
            return xp;
        }
        let xp = experience_for_level_uncached(level, curve);
        self.experience_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, xp);
        xp
    }

    /// Level reached with `experience` on `curve`, clamped to its max level.
    pub fn level_for_experience(&self, experience: u64, curve: &GrowthCurve) -> u32 {
        let key = (experience, curve.key());
        if let Some(level) = self.cached_level(&key) {
            return level;
        }
        let level = level_for_experience_uncached(experience, curve);
        self.level_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, level);
        level
    }

    /// Credit `blocks` broken and `experience` gained to a tool.
    ///
    /// The lifetime counter and experience saturate at the reward ceiling; the
    /// cached level is recomputed from the new experience, never set ahead of it.
    pub fn advance_tool(
        &self,
        tool: &mut ToolProgressionState,
        blocks: u64,
        experience: u64,
        curve: &GrowthCurve,
    ) -> LevelChange {
        let previous = tool.level;
        tool.blocks_mined = saturating_add(tool.blocks_mined, blocks);
        tool.experience = saturating_add(tool.experience, experience);
        tool.level = self.level_for_experience(tool.experience, curve);
        trace!(
            tool = %tool.uid,
            blocks,
            experience,
            previous,
            current = tool.level,
            "advanced tool"
        );
        LevelChange {
            previous,
            current: tool.level,
        }
    }

    /// Experience still missing before the tool's next level, or `None` at max level.
    pub fn experience_to_next_level(
        &self,
        tool: &ToolProgressionState,
        curve: &GrowthCurve,
    ) -> Option<u64> {
        let curve = curve.sanitized();
        if tool.level >= curve.max_level {
            return None;
        }
        let next = self.experience_for_level(tool.level + 1, &curve);
        Some(next.saturating_sub(tool.experience))
    }

    fn cached_experience(&self, key: &(u32, CurveKey)) -> Option<u64> {
        self.experience_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
    }

    fn cached_level(&self, key: &(u64, CurveKey)) -> Option<u32> {
        self.level_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
    }
}
