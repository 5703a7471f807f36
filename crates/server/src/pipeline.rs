//! Intake side of the mining pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use quarry_core::{PlayerGateway, PlayerId};
use quarry_progression::ProgressionEngine;
use quarry_world::{BlockAccess, RegionStore};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::PipelineConfig;
use crate::cooldown::EnchantCooldownTable;
use crate::event::BlockBreak;
use crate::worker::{Shared, Worker};

struct WorkerHandle {
    tx: UnboundedSender<BlockBreak>,
    queued: Arc<AtomicUsize>,
    join: JoinHandle<()>,
}

/// Routes block breaks to one worker task per player.
///
/// Producers only enqueue; rewards, progression and enchant effects are
/// computed by the player's worker in arrival order.
pub struct MiningPipeline {
    shared: Arc<Shared>,
    workers: DashMap<PlayerId, WorkerHandle>,
}

impl MiningPipeline {
    pub fn new(
        config: PipelineConfig,
        engine: Arc<ProgressionEngine>,
        gateway: Arc<dyn PlayerGateway>,
        regions: Arc<RegionStore>,
        world: Arc<dyn BlockAccess>,
    ) -> Self {
        let cooldowns = EnchantCooldownTable::new(config.enchant_cooldown());
        Self {
            shared: Arc::new(Shared {
                config,
                engine,
                gateway,
                regions,
                world,
                cooldowns,
            }),
            workers: DashMap::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.shared.config
    }

    pub fn cooldowns(&self) -> &EnchantCooldownTable {
        &self.shared.cooldowns
    }

    /// Number of players with a live worker.
    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }

    fn spawn_worker(&self, player: PlayerId) -> WorkerHandle {
        let (tx, rx) = unbounded_channel();
        let queued = Arc::new(AtomicUsize::new(0));
        let worker = Worker::new(player, Arc::clone(&self.shared), Arc::clone(&queued));
        let join = tokio::spawn(worker.run(rx));
        debug!(%player, "spawned mining worker");
        WorkerHandle { tx, queued, join }
    }

    /// Queue a break for its player's worker, starting the worker on first use.
    ///
    /// Never blocks. Returns false when the event was dropped because the
    /// player's queue is full. Must be called inside a Tokio runtime.
    pub fn submit(&self, event: BlockBreak) -> bool {
        let player = event.player;
        let mut handle = self
            .workers
            .entry(player)
            .or_insert_with(|| self.spawn_worker(player));
        if handle.join.is_finished() {
            warn!(%player, "mining worker ended unexpectedly, restarting");
            *handle = self.spawn_worker(player);
        }

        let limit = self.shared.config.max_queued_events;
        if handle.queued.load(Ordering::Relaxed) >= limit {
            warn!(%player, limit, "mining queue full, dropping block break");
            return false;
        }
        handle.queued.fetch_add(1, Ordering::Relaxed);
        if handle.tx.send(event).is_err() {
            handle.queued.fetch_sub(1, Ordering::Relaxed);
            warn!(%player, "mining worker closed its queue, dropping block break");
            return false;
        }
        true
    }

    /// Flush the player's pending work, emit a final summary and stop the worker.
    ///
    /// Returns false when the player had no worker.
    #[instrument(skip(self))]
    pub async fn disconnect(&self, player: PlayerId) -> bool {
        let removed = self.workers.remove(&player);
        self.shared.cooldowns.clear(player);
        let Some((_, handle)) = removed else {
            return false;
        };
        let WorkerHandle { tx, join, .. } = handle;
        drop(tx);
        if let Err(err) = join.await {
            warn!(%player, error = %err, "mining worker ended abnormally");
        }
        info!(%player, "mining worker stopped");
        true
    }

    /// Disconnect every player.
    pub async fn shutdown(&self) {
        let players: Vec<PlayerId> = self.workers.iter().map(|entry| *entry.key()).collect();
        for player in players {
            self.disconnect(player).await;
        }
    }
}
