//! The per-player mining actor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Context;
use quarry_core::{
    now_millis, BoosterKind, CoreEvent, PlayerGateway, PlayerId, ToolUid,
};
use quarry_progression::{apply_tool_boost, saturating_mul, ProgressionEngine};
use quarry_world::{BlockAccess, RegionStore};
use rand::rngs::StdRng;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::accumulator::{Batch, MiningAccumulator};
use crate::config::PipelineConfig;
use crate::cooldown::EnchantCooldownTable;
use crate::enchant::{roll, slab, sweep, SweepResult};
use crate::event::BlockBreak;
use crate::summary::SessionTotals;

/// State shared by every worker of a pipeline.
pub(crate) struct Shared {
    pub config: PipelineConfig,
    pub engine: Arc<ProgressionEngine>,
    pub gateway: Arc<dyn PlayerGateway>,
    pub regions: Arc<RegionStore>,
    pub world: Arc<dyn BlockAccess>,
    pub cooldowns: EnchantCooldownTable,
}

pub(crate) struct Worker {
    player: PlayerId,
    shared: Arc<Shared>,
    queued: Arc<AtomicUsize>,
    acc: MiningAccumulator,
    session: SessionTotals,
    rng: StdRng,
    level_ups: HashMap<(ToolUid, u32), Instant>,
}

impl Worker {
    pub fn new(player: PlayerId, shared: Arc<Shared>, queued: Arc<AtomicUsize>) -> Self {
        let now = Instant::now();
        let rng = quarry_core::seeded_rng(shared.config.rng_seed, player.0);
        Self {
            player,
            shared,
            queued,
            acc: MiningAccumulator::new(now),
            session: SessionTotals::new(now),
            rng,
            level_ups: HashMap::new(),
        }
    }

    /// Process events until the sending side is dropped, then flush and
    /// emit a final summary.
    pub async fn run(mut self, mut rx: UnboundedReceiver<BlockBreak>) {
        let debounce = self.shared.config.debounce();
        let every = self.shared.config.summary_interval();
        let mut summaries = interval_at(Instant::now() + every, every);
        summaries.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(player = %self.player, "mining worker started");

        loop {
            tokio::select! {
                _ = summaries.tick() => self.emit_summary(),
                received = timeout(debounce, rx.recv()) => match received {
                    Ok(Some(event)) => {
                        self.queued.fetch_sub(1, Ordering::Relaxed);
                        self.handle(event).await;
                    }
                    Ok(None) => break,
                    Err(_) if !self.acc.is_empty() => self.flush().await,
                    Err(_) => {}
                },
            }
        }

        self.flush().await;
        self.emit_summary();
        debug!(player = %self.player, "mining worker stopped");
    }

    async fn handle(&mut self, event: BlockBreak) {
        if self.acc.holds_other_tool(event.tool) {
            self.flush().await;
        }
        match self.try_enchant(&event) {
            Some(activated) => self.acc.record_enchant(event.tool, &activated.removed),
            None => self.acc.record_block(event.tool, &event.block),
        }
        if self.acc.pending() >= self.shared.config.chunk_size() {
            self.flush().await;
        }
    }

    /// Roll the tool's enchants and, on success, clear the slab through the
    /// broken block inside its smallest enclosing region.
    fn try_enchant(&mut self, event: &BlockBreak) -> Option<SweepResult> {
        if event.enchants.is_empty() {
            return None;
        }
        let shared = Arc::clone(&self.shared);
        let now = Instant::now();
        let enchant = roll(
            &mut self.rng,
            &event.enchants,
            &shared.config,
            &shared.cooldowns,
            self.player,
            now,
        )?;
        let region = shared.regions.smallest_containing(&event.world, event.pos)?;
        let area = slab(enchant.kind.sweep(), event.pos, &region.corner_bounds())?;
        if area.volume() > shared.config.max_sweep_blocks {
            warn!(
                player = %self.player,
                region = %region.name,
                blocks = area.volume(),
                "enchant slab too large, not firing"
            );
            return None;
        }

        let mut result = match sweep(shared.world.as_ref(), &event.world, &area, event.pos) {
            Ok(result) => result,
            Err(err) => {
                warn!(player = %self.player, enchant = enchant.kind.as_str(), error = %err, "enchant sweep failed");
                return None;
            }
        };
        shared.cooldowns.mark(self.player, enchant.kind, now);
        if !result.included_origin && !event.block.is_air() {
            *result.removed.entry(event.block.clone()).or_default() += 1;
            result.total += 1;
        }
        debug!(
            player = %self.player,
            enchant = enchant.kind.as_str(),
            removed = result.total,
            "enchant activated"
        );
        shared.gateway.emit(CoreEvent::EnchantActivated {
            player: self.player,
            enchant: enchant.kind,
            removed: result.total,
        });
        Some(result)
    }

    /// Flush pending work. A batch whose tool commit fails is logged and
    /// dropped, followed by a short backoff; the worker keeps running.
    async fn flush(&mut self) {
        let Some(batch) = self.acc.take(Instant::now()) else {
            return;
        };
        if let Err(err) = self.process(&batch) {
            warn!(
                player = %self.player,
                blocks = batch.total(),
                error = %format!("{err:#}"),
                "flush failed, dropping batch"
            );
            sleep(self.shared.config.flush_backoff()).await;
        }
    }

    fn process(&mut self, batch: &Batch) -> anyhow::Result<()> {
        let shared = Arc::clone(&self.shared);
        let config = &shared.config;
        let gateway = shared.gateway.as_ref();
        let now_ms = now_millis();
        let total = batch.total();

        let tool = gateway.tool(self.player, batch.tool);
        let boosted = |base: u64, kind: BoosterKind| match &tool {
            Some(tool) => apply_tool_boost(base, tool, kind, now_ms, config.max_multiplier),
            None => base,
        };
        let xp = boosted(saturating_mul(total, config.xp_per_block), BoosterKind::Experience);
        let tokens = boosted(saturating_mul(total, config.tokens_per_block), BoosterKind::Tokens);

        let progressed = tool.clone().map(|mut tool| {
            let change = shared
                .engine
                .advance_tool(&mut tool, total, xp, &config.curve);
            tool.prune_expired(now_ms);
            (tool, change)
        });

        // Progression first: a failed commit drops the whole batch untouched.
        let mut credited_xp = 0;
        match progressed {
            Some((tool, change)) => {
                if gateway
                    .commit_tool(self.player, &tool)
                    .context("committing tool state")?
                {
                    credited_xp = xp;
                    if change.leveled_up() {
                        self.announce_level_up(tool.uid, change.current);
                    }
                } else {
                    debug!(player = %self.player, tool = %tool.uid, "tool moved away, dropping update");
                }
            }
            None => {
                debug!(player = %self.player, tool = %batch.tool, "tool no longer held, skipping progression");
            }
        }

        // Credits fail independently of each other.
        for (block, count) in &batch.per_block {
            if block.is_air() || config.is_special(block) {
                continue;
            }
            let amount = boosted(*count, BoosterKind::Backpack);
            if let Err(err) = gateway.credit_backpack(self.player, block, amount) {
                warn!(
                    player = %self.player,
                    %block,
                    amount,
                    error = %format!("{err:#}"),
                    "backpack credit failed"
                );
            }
        }
        let mut credited_tokens = 0;
        if tokens > 0 {
            match gateway.credit_tokens(self.player, tokens) {
                Ok(()) => credited_tokens = tokens,
                Err(err) => warn!(
                    player = %self.player,
                    tokens,
                    error = %format!("{err:#}"),
                    "token credit failed"
                ),
            }
        }

        self.session
            .record(batch.blocks, batch.enchant_blocks, credited_tokens, credited_xp);
        debug!(
            player = %self.player,
            blocks = batch.blocks,
            enchant_blocks = batch.enchant_blocks,
            tokens = credited_tokens,
            xp = credited_xp,
            "flushed batch"
        );
        Ok(())
    }

    /// At most one event per tool level within the level-up cooldown.
    fn announce_level_up(&mut self, tool: ToolUid, level: u32) {
        let now = Instant::now();
        let cooldown = self.shared.config.level_up_cooldown();
        if let Some(last) = self.level_ups.get(&(tool, level)) {
            if now.saturating_duration_since(*last) < cooldown {
                return;
            }
        }
        self.level_ups.insert((tool, level), now);
        info!(player = %self.player, %tool, level, "tool leveled up");
        self.shared.gateway.emit(CoreEvent::LevelUp {
            player: self.player,
            tool,
            level,
        });
    }

    fn emit_summary(&mut self) {
        if let Some(summary) = self.session.take(Instant::now()) {
            info!(
                player = %self.player,
                blocks = summary.blocks,
                enchant_blocks = summary.enchant_blocks,
                tokens = summary.tokens,
                "mining summary"
            );
            self.shared.gateway.emit(CoreEvent::MiningSummary {
                player: self.player,
                summary,
            });
        }
    }
}
