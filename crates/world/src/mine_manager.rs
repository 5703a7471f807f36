//! Mine lifecycle: creation, fills, depletion sampling and reset timers.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dashmap::DashMap;
use quarry_core::{now_millis, seeded_rng, BlockPos, BlockType, ChunkPos, WorldId};
use rand::Rng;
use rayon::prelude::*;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::access::BlockAccess;
use crate::mine::{Mine, MineConfig, MineKey};
use crate::persist::SnapshotStore;
use crate::region::{Aabb, Region, RegionId, FLAG_BREAK, FLAG_VERTICAL};
use crate::region_store::{LoadReport, RegionError, RegionStore};

/// Failures of mine operations.
#[derive(Debug, thiserror::Error)]
pub enum MineError {
    #[error("a mine named `{name}` already exists in {world}")]
    DuplicateName { world: WorldId, name: String },
    #[error("mine `{name}` does not exist in {world}")]
    NotFound { world: WorldId, name: String },
    #[error("{region} backing mine `{name}` is missing")]
    RegionMissing { name: String, region: RegionId },
    #[error("mine `{name}` spans {volume} blocks, above the fill limit of {limit}")]
    VolumeTooLarge { name: String, volume: u64, limit: u64 },
    #[error(transparent)]
    Region(#[from] RegionError),
    #[error("failed to write blocks for mine `{name}`: {cause:#}")]
    World { name: String, cause: anyhow::Error },
}

/// Result of one fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillReport {
    pub layers: usize,
    pub blocks: u64,
    pub changed: usize,
}

/// Non-air blocks found by a bounded scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepletionSample {
    /// Positions inspected in loaded chunks.
    pub scanned: u64,
    /// Inspected positions still holding a block.
    pub remaining: u64,
}

impl DepletionSample {
    /// Share of inspected positions that were mined out; 0 when nothing was inspected.
    pub fn mined_fraction(&self) -> f64 {
        if self.scanned == 0 {
            return 0.0;
        }
        (self.scanned - self.remaining) as f64 / self.scanned as f64
    }
}

/// What one scheduler tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResetOutcome {
    /// No loaded chunk overlapped the mine.
    Skipped,
    /// Below the reset threshold.
    Untouched(DepletionSample),
    /// Threshold reached; the mine was filled.
    Refilled(DepletionSample),
}

struct Inner {
    regions: Arc<RegionStore>,
    world: Arc<dyn BlockAccess>,
    backend: Option<Arc<dyn SnapshotStore>>,
    config: MineConfig,
    mines: DashMap<MineKey, Mine>,
    tasks: Mutex<HashMap<MineKey, JoinHandle<()>>>,
    fill_seq: AtomicU64,
}

impl Inner {
    /// Drop every mine built on `region` and abort its timer.
    fn forget_mines_of(&self, world: &WorldId, region: RegionId) {
        let keys: Vec<MineKey> = self
            .mines
            .iter()
            .filter(|entry| &entry.key().world == world && entry.value().region == region)
            .map(|entry| entry.key().clone())
            .collect();
        for key in keys {
            let Some((_, mine)) = self.mines.remove(&key) else {
                continue;
            };
            // A timer that misses this stops itself on its next tick.
            if let Ok(mut tasks) = self.tasks.try_lock() {
                if let Some(handle) = tasks.remove(&key) {
                    handle.abort();
                }
            }
            info!(world = %world, mine = %mine.name, %region, "removed mine with its region");
        }
    }
}

/// Owner of every mine and its reset timer. Cheap to clone.
#[derive(Clone)]
pub struct MineManager {
    inner: Arc<Inner>,
}

impl MineManager {
    pub fn new(regions: Arc<RegionStore>, world: Arc<dyn BlockAccess>, config: MineConfig) -> Self {
        Self::build(regions, world, None, config)
    }

    /// Manager that saves and loads mine snapshots through `backend`.
    pub fn with_backend(
        regions: Arc<RegionStore>,
        world: Arc<dyn BlockAccess>,
        backend: Arc<dyn SnapshotStore>,
        config: MineConfig,
    ) -> Self {
        Self::build(regions, world, Some(backend), config)
    }

    fn build(
        regions: Arc<RegionStore>,
        world: Arc<dyn BlockAccess>,
        backend: Option<Arc<dyn SnapshotStore>>,
        config: MineConfig,
    ) -> Self {
        let inner = Arc::new(Inner {
            regions,
            world,
            backend,
            config,
            mines: DashMap::new(),
            tasks: Mutex::new(HashMap::new()),
            fill_seq: AtomicU64::new(0),
        });
        // Deleting a region through the store directly still takes its mines along.
        let weak = Arc::downgrade(&inner);
        inner.regions.on_delete(Box::new(move |world, region| {
            if let Some(inner) = weak.upgrade() {
                inner.forget_mines_of(world, region.id);
            }
        }));
        Self { inner }
    }

    pub fn config(&self) -> &MineConfig {
        &self.inner.config
    }

    pub fn regions(&self) -> &Arc<RegionStore> {
        &self.inner.regions
    }

    /// Turn an existing region into a mine named after it.
    ///
    /// The region gains the `vertical` and `break` flags.
    pub fn create_from_region(&self, world: &WorldId, region: &Region) -> Result<Mine, MineError> {
        let key = MineKey::new(world, &region.name);
        if self.inner.mines.contains_key(&key) {
            return Err(MineError::DuplicateName {
                world: world.clone(),
                name: region.name.clone(),
            });
        }
        for flag in [FLAG_VERTICAL, FLAG_BREAK] {
            self.inner.regions.set_flag(world, region.id, flag, true)?;
        }
        let mine = Mine::new(
            region.name.clone(),
            region.id,
            self.inner.config.default_reset_interval_secs,
        );
        match self.inner.mines.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(MineError::DuplicateName {
                world: world.clone(),
                name: region.name.clone(),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(mine.clone());
                info!(world = %world, mine = %mine.name, region = %region.id, "created mine");
                Ok(mine)
            }
        }
    }

    /// Create the backing region and the mine together.
    ///
    /// The region is removed again if the mine cannot be registered.
    pub fn create(
        &self,
        world: &WorldId,
        name: &str,
        corner1: BlockPos,
        corner2: BlockPos,
    ) -> Result<Mine, MineError> {
        if self.get(world, name).is_some() {
            return Err(MineError::DuplicateName {
                world: world.clone(),
                name: name.trim().to_string(),
            });
        }
        let region = self.inner.regions.create(world, name, corner1, corner2)?;
        self.create_from_region(world, &region).inspect_err(|_| {
            if let Err(err) = self.inner.regions.delete(world, region.id) {
                warn!(world = %world, region = %region.id, error = %err, "failed to roll back mine region");
            }
        })
    }

    pub fn get(&self, world: &WorldId, name: &str) -> Option<Mine> {
        self.inner
            .mines
            .get(&MineKey::new(world, name))
            .map(|mine| mine.clone())
    }

    /// Mines of `world`, sorted by name.
    pub fn mines(&self, world: &WorldId) -> Vec<Mine> {
        let mut mines: Vec<Mine> = self
            .inner
            .mines
            .iter()
            .filter(|entry| &entry.key().world == world)
            .map(|entry| entry.value().clone())
            .collect();
        mines.sort_by(|a, b| a.name.cmp(&b.name));
        mines
    }

    /// Replace a mine's palette. Returns false when the mine does not exist.
    pub fn set_palette(&self, world: &WorldId, name: &str, palette: Vec<BlockType>) -> bool {
        match self.inner.mines.get_mut(&MineKey::new(world, name)) {
            Some(mut mine) => {
                mine.set_palette(palette);
                debug!(world = %world, mine = %mine.name, palette = ?mine.palette, "set palette");
                true
            }
            None => false,
        }
    }

    fn bounds(&self, world: &WorldId, name: &str) -> Result<(Mine, Aabb), MineError> {
        let mine = self.get(world, name).ok_or_else(|| MineError::NotFound {
            world: world.clone(),
            name: name.to_string(),
        })?;
        let region =
            self.inner
                .regions
                .get(world, mine.region)
                .ok_or_else(|| MineError::RegionMissing {
                    name: mine.name.clone(),
                    region: mine.region,
                })?;
        Ok((mine, region.corner_bounds()))
    }

    /// Fill every block of the mine from its palette.
    ///
    /// Each Y layer is rolled and written as one batch on the rayon pool.
    pub fn fill(&self, world: &WorldId, name: &str) -> Result<FillReport, MineError> {
        let (mine, aabb) = self.bounds(world, name)?;
        let volume = aabb.volume();
        if volume > self.inner.config.max_fill_volume {
            return Err(MineError::VolumeTooLarge {
                name: mine.name,
                volume,
                limit: self.inner.config.max_fill_volume,
            });
        }

        let palette = if mine.palette.is_empty() {
            crate::mine::default_palette()
        } else {
            mine.palette.clone()
        };
        let seq = self.inner.fill_seq.fetch_add(1, Ordering::Relaxed);
        let seed = self.inner.config.rng_seed;
        let access = &self.inner.world;

        let changed: usize = (aabb.min.y..=aabb.max.y)
            .into_par_iter()
            .map(|y| {
                let mut rng = seeded_rng(seed, seq.rotate_left(32) ^ u64::from(y as u32));
                let mut writes = Vec::with_capacity(aabb.layer_area() as usize);
                for x in aabb.min.x..=aabb.max.x {
                    for z in aabb.min.z..=aabb.max.z {
                        let block = &palette[rng.gen_range(0..palette.len())];
                        writes.push((BlockPos::new(x, y, z), block));
                    }
                }
                access.set_blocks(world, &writes)
            })
            .collect::<anyhow::Result<Vec<usize>>>()
            .map_err(|cause| MineError::World {
                name: mine.name.clone(),
                cause,
            })?
            .into_iter()
            .sum();

        if let Some(mut stored) = self.inner.mines.get_mut(&MineKey::new(world, name)) {
            stored.last_reset_at_millis = now_millis();
        }
        let report = FillReport {
            layers: (i64::from(aabb.max.y) - i64::from(aabb.min.y) + 1) as usize,
            blocks: volume,
            changed,
        };
        info!(world = %world, mine = %mine.name, blocks = report.blocks, changed, "filled mine");
        Ok(report)
    }

    /// Count remaining blocks without loading chunks.
    ///
    /// Volumes above the sample limit are scanned on a uniform stride.
    pub fn sample_depletion(
        &self,
        world: &WorldId,
        name: &str,
    ) -> Result<DepletionSample, MineError> {
        let (_, aabb) = self.bounds(world, name)?;
        let limit = self.inner.config.sample_limit.max(1);
        let volume = aabb.volume();
        let step = if volume <= limit {
            1
        } else {
            ((volume as f64 / limit as f64).cbrt().ceil() as usize).max(1)
        };

        let access = &self.inner.world;
        let loaded: HashSet<ChunkPos> = aabb
            .chunks()
            .filter(|chunk| access.is_chunk_loaded(world, *chunk))
            .collect();

        let mut sample = DepletionSample::default();
        if loaded.is_empty() {
            return Ok(sample);
        }
        let axis = |lo: i32, hi: i32| (i64::from(lo)..=i64::from(hi)).step_by(step);
        for x in axis(aabb.min.x, aabb.max.x) {
            for z in axis(aabb.min.z, aabb.max.z) {
                let column = BlockPos::new(x as i32, 0, z as i32);
                if !loaded.contains(&column.chunk()) {
                    continue;
                }
                for y in axis(aabb.min.y, aabb.max.y) {
                    let Some(block) = access.block(world, BlockPos::new(x as i32, y as i32, z as i32))
                    else {
                        continue;
                    };
                    sample.scanned += 1;
                    if !block.is_air() {
                        sample.remaining += 1;
                    }
                }
            }
        }
        Ok(sample)
    }

    /// One scheduler tick: sample, then refill if enough has been mined.
    pub fn tick(&self, world: &WorldId, name: &str) -> Result<ResetOutcome, MineError> {
        let sample = self.sample_depletion(world, name)?;
        if sample.scanned == 0 {
            debug!(world = %world, mine = name, "no loaded chunks, skipping reset check");
            return Ok(ResetOutcome::Skipped);
        }
        let mined = sample.mined_fraction();
        if mined >= self.inner.config.threshold() {
            debug!(world = %world, mine = name, mined, "mine depleted, refilling");
            self.fill(world, name)?;
            Ok(ResetOutcome::Refilled(sample))
        } else {
            Ok(ResetOutcome::Untouched(sample))
        }
    }

    /// Start (or restart) the periodic reset check for a mine.
    ///
    /// Any previous timer is aborted and awaited before the new one is spawned.
    /// The first check runs one interval from now; 0 selects the default interval.
    #[instrument(skip(self, world), fields(world = %world))]
    pub async fn schedule_reset(
        &self,
        world: &WorldId,
        name: &str,
        interval_secs: u64,
    ) -> Result<(), MineError> {
        let key = MineKey::new(world, name);
        let interval_secs = if interval_secs == 0 {
            self.inner.config.default_reset_interval_secs.max(1)
        } else {
            interval_secs
        };
        let mine_name = {
            let mut mine = self
                .inner
                .mines
                .get_mut(&key)
                .ok_or_else(|| MineError::NotFound {
                    world: world.clone(),
                    name: name.to_string(),
                })?;
            mine.reset_interval_secs = interval_secs;
            mine.name.clone()
        };

        let mut tasks = self.inner.tasks.lock().await;
        if let Some(old) = tasks.remove(&key) {
            stop(old).await;
        }

        let manager = self.clone();
        let world = world.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let period = Duration::from_secs(interval_secs);
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                // Fills can be large; keep them off the runtime's worker threads.
                // Awaiting the blocking task keeps ticks from overlapping.
                let tick = {
                    let manager = manager.clone();
                    let world = world.clone();
                    let name = mine_name.clone();
                    tokio::task::spawn_blocking(move || manager.tick(&world, &name)).await
                };
                match tick {
                    Ok(Ok(outcome)) => {
                        debug!(world = %world, mine = %mine_name, ?outcome, "reset tick")
                    }
                    Ok(Err(MineError::NotFound { .. })) => {
                        debug!(world = %world, mine = %mine_name, "mine removed, stopping timer");
                        break;
                    }
                    Ok(Err(MineError::RegionMissing { region, .. })) => {
                        manager.inner.mines.remove(&task_key);
                        warn!(world = %world, mine = %mine_name, %region, "mine region is gone, removing mine");
                        break;
                    }
                    Ok(Err(err)) => {
                        warn!(world = %world, mine = %mine_name, error = %err, "reset tick failed")
                    }
                    Err(err) => {
                        warn!(world = %world, mine = %mine_name, error = %err, "reset tick panicked")
                    }
                }
            }
        });
        tasks.insert(key, handle);
        info!(mine = name, interval_secs, "scheduled mine reset");
        Ok(())
    }

    /// Stop a mine's timer. Returns whether one was running.
    pub async fn cancel_reset(&self, world: &WorldId, name: &str) -> bool {
        let handle = self.inner.tasks.lock().await.remove(&MineKey::new(world, name));
        match handle {
            Some(handle) => {
                stop(handle).await;
                debug!(world = %world, mine = name, "cancelled mine reset");
                true
            }
            None => false,
        }
    }

    /// Change the interval, restarting the timer if one is running.
    pub async fn set_reset_interval(
        &self,
        world: &WorldId,
        name: &str,
        interval_secs: u64,
    ) -> Result<(), MineError> {
        if self.is_scheduled(world, name).await {
            return self.schedule_reset(world, name, interval_secs).await;
        }
        let mut mine = self
            .inner
            .mines
            .get_mut(&MineKey::new(world, name))
            .ok_or_else(|| MineError::NotFound {
                world: world.clone(),
                name: name.to_string(),
            })?;
        mine.reset_interval_secs = interval_secs;
        Ok(())
    }

    pub async fn is_scheduled(&self, world: &WorldId, name: &str) -> bool {
        self.inner
            .tasks
            .lock()
            .await
            .get(&MineKey::new(world, name))
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Schedule every mine of `world` at its stored interval.
    pub async fn resume_schedules(&self, world: &WorldId) -> Result<usize, MineError> {
        let mines = self.mines(world);
        for mine in &mines {
            self.schedule_reset(world, &mine.name, mine.reset_interval_secs)
                .await?;
        }
        Ok(mines.len())
    }

    /// Remove a mine and its backing region. Returns false when the mine does not exist.
    pub async fn delete(&self, world: &WorldId, name: &str) -> Result<bool, MineError> {
        let key = MineKey::new(world, name);
        if !self.inner.mines.contains_key(&key) {
            return Ok(false);
        }
        self.cancel_reset(world, name).await;
        let Some((_, mine)) = self.inner.mines.remove(&key) else {
            return Ok(false);
        };
        self.inner.regions.delete(world, mine.region)?;
        info!(world = %world, mine = %mine.name, "deleted mine");
        Ok(true)
    }

    /// Delete a region, removing every mine built on it first.
    pub async fn delete_region(&self, world: &WorldId, region: RegionId) -> Result<bool, MineError> {
        let dependents: Vec<String> = self
            .mines(world)
            .into_iter()
            .filter(|mine| mine.region == region)
            .map(|mine| mine.name)
            .collect();
        for name in &dependents {
            self.cancel_reset(world, name).await;
            self.inner.mines.remove(&MineKey::new(world, name));
            info!(world = %world, mine = %name, %region, "removed mine with its region");
        }
        Ok(self.inner.regions.delete(world, region)?)
    }

    /// Write the mines of `world` to the backend.
    pub fn save_world(&self, world: &WorldId) -> anyhow::Result<()> {
        let Some(backend) = &self.inner.backend else {
            return Ok(());
        };
        let mines = self.mines(world);
        backend
            .save_mines(world, &mines)
            .with_context(|| format!("saving mines of {world}"))?;
        debug!(world = %world, mines = mines.len(), "saved mines");
        Ok(())
    }

    /// Load the mines of `world`; regions must already be loaded.
    ///
    /// Records naming a missing region or a taken name are logged and skipped.
    pub fn load_world(&self, world: &WorldId) -> anyhow::Result<LoadReport> {
        let Some(backend) = &self.inner.backend else {
            return Ok(LoadReport::default());
        };
        let loaded = backend
            .load_mines(world)
            .with_context(|| format!("loading mines of {world}"))?;
        let mut report = LoadReport {
            loaded: 0,
            skipped: loaded.skipped,
        };
        for mut mine in loaded.records {
            mine.name = mine.name.trim().to_string();
            let key = MineKey::new(world, &mine.name);
            let reason = if mine.name.is_empty() {
                Some("empty name")
            } else if self.inner.regions.get(world, mine.region).is_none() {
                Some("region missing")
            } else if self.inner.mines.contains_key(&key) {
                Some("duplicate name")
            } else {
                None
            };
            if let Some(reason) = reason {
                warn!(world = %world, mine = %mine.name, region = %mine.region, reason, "skipping mine record");
                report.skipped += 1;
                continue;
            }
            let palette = std::mem::take(&mut mine.palette);
            mine.set_palette(palette);
            self.inner.mines.insert(key, mine);
            report.loaded += 1;
        }
        info!(world = %world, loaded = report.loaded, skipped = report.skipped, "loaded mines");
        Ok(report)
    }

    /// Stop every reset timer.
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.inner.tasks.lock().await;
            tasks.drain().map(|(_, handle)| handle).collect()
        };
        let count = handles.len();
        for handle in handles {
            stop(handle).await;
        }
        debug!(timers = count, "mine timers stopped");
    }
}

async fn stop(handle: JoinHandle<()>) {
    handle.abort();
    if let Err(err) = handle.await {
        if !err.is_cancelled() {
            warn!(error = %err, "mine timer ended abnormally");
        }
    }
}
