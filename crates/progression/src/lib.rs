#![warn(missing_docs)]
//! Tool progression math: experience curves, level caching and reward boosts.
//!
//! Everything here is a pure function of `(input, curve)`. The only state is the
//! memoization held by [`ProgressionEngine`], which never changes results.

mod boost;
mod cache;
mod curve;
mod engine;

pub use boost::{apply_boost, apply_tool_boost, saturating_add, saturating_mul, REWARD_CEILING};
pub use cache::BoundedCache;
pub use curve::{
    experience_for_level_uncached, level_for_experience_uncached, CurveKey, GrowthCurve,
    ITERATIVE_LEVEL_LIMIT, ITERATIVE_XP_FACTOR, MAX_SUPPORTED_LEVEL,
};
pub use engine::{LevelChange, ProgressionEngine, DEFAULT_CACHE_CAPACITY};
