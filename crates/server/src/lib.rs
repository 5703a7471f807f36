//! Mining event pipeline: per-player workers turning block breaks into
//! rewards, tool progression and enchant effects.

mod accumulator;
mod config;
mod cooldown;
mod enchant;
mod event;
mod pipeline;
mod summary;
mod worker;

pub use accumulator::{Batch, MiningAccumulator};
pub use config::PipelineConfig;
pub use cooldown::EnchantCooldownTable;
pub use enchant::{roll, slab, sweep, SweepResult};
pub use event::BlockBreak;
pub use pipeline::MiningPipeline;
pub use summary::SessionTotals;
