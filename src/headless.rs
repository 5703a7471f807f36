use crate::command_script::CommandScriptPlayer;
use crate::commands::{self, DriverCommand, FlagChange, MineCommand};
use crate::config::QuarryConfig;
use anyhow::{Context, Result};
use quarry_core::{BlockPos, BlockType, PlayerId, ToolProgressionState, ToolUid, WorldId};
use quarry_progression::ProgressionEngine;
use quarry_server::{BlockBreak, MiningPipeline};
use quarry_testkit::{JsonlSink, RecordingGateway};
use quarry_world::{
    BlockAccess, FlagState, MemoryWorld, MineManager, RecordFileStore, RegionStore, FLAG_BREAK,
};
use rand::RngCore;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};

pub struct HeadlessConfig {
    pub config: QuarryConfig,
    pub data_dir: Option<PathBuf>,
    pub command_script: Option<PathBuf>,
    pub event_log: Option<PathBuf>,
    pub reset_data: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub lines: Vec<String>,
}

impl CommandOutput {
    fn line(line: impl Into<String>) -> Self {
        Self {
            lines: vec![line.into()],
        }
    }

    fn error(err: impl std::fmt::Display) -> Self {
        Self::line(format!("Error: {err}"))
    }
}

pub async fn run(cfg: HeadlessConfig) -> Result<()> {
    let (data_dir, cleanup) = prepare_data_dir(cfg.data_dir.as_deref(), cfg.reset_data)?;
    let script = cfg
        .command_script
        .as_deref()
        .map(|path| {
            CommandScriptPlayer::from_path(path)
                .with_context(|| format!("failed to load command script {}", path.display()))
        })
        .transpose()?;

    let mut driver = Driver::open(cfg.config, &data_dir, cfg.event_log.as_deref()).await?;
    let result = match script {
        Some(script) => play_script(&mut driver, script).await,
        None => {
            info!("No command script given; loading and saving state only");
            Ok(())
        }
    };
    let closed = driver.close().await;

    if cleanup {
        if let Err(err) = std::fs::remove_dir_all(&data_dir) {
            warn!(%err, path = %data_dir.display(), "Failed to remove ephemeral data dir");
        }
    }
    result.and(closed)
}

async fn play_script(driver: &mut Driver, mut script: CommandScriptPlayer) -> Result<()> {
    let start = Instant::now();
    while let Some(at_ms) = script.next_at_ms() {
        sleep_until(start + Duration::from_millis(at_ms)).await;
        for input in script.drain_ready_commands(at_ms) {
            let output = match commands::parse_command(&input) {
                Ok(cmd) => driver.execute(cmd).await,
                Err(err) => CommandOutput::error(err),
            };
            for line in output.lines {
                info!(at_ms, command = %input, "{line}");
            }
        }
    }
    Ok(())
}

fn prepare_data_dir(data_dir: Option<&Path>, reset: bool) -> Result<(PathBuf, bool)> {
    let cleanup = data_dir.is_none();
    let path = match data_dir {
        Some(path) => path.to_path_buf(),
        None => {
            let suffix = rand::thread_rng().next_u64();
            std::env::temp_dir()
                .join("quarry_headless")
                .join(format!("run_{suffix:016x}"))
        }
    };

    if reset && data_dir.is_some() && path.exists() {
        if path.parent().is_none() {
            anyhow::bail!("refusing to reset data dir with no parent: {}", path.display());
        }
        std::fs::remove_dir_all(&path)
            .with_context(|| format!("failed to reset data dir {}", path.display()))?;
    }
    std::fs::create_dir_all(&path)
        .with_context(|| format!("failed to create data dir {}", path.display()))?;
    Ok((path, cleanup))
}

/// Every core component wired together for one world.
pub struct Driver {
    world_id: WorldId,
    world: Arc<MemoryWorld>,
    regions: Arc<RegionStore>,
    mines: MineManager,
    gateway: Arc<RecordingGateway>,
    pipeline: MiningPipeline,
    held: HashMap<PlayerId, ToolUid>,
}

impl Driver {
    /// Load regions and mines from `data_dir` and resume every mine timer.
    pub async fn open(config: QuarryConfig, data_dir: &Path, event_log: Option<&Path>) -> Result<Self> {
        let world_id = config.world_id();
        let backend = Arc::new(RecordFileStore::new(data_dir)?);
        let world = Arc::new(MemoryWorld::new());
        let regions = Arc::new(RegionStore::new(backend.clone()));
        let mines = MineManager::with_backend(
            regions.clone(),
            world.clone(),
            backend,
            config.mines,
        );
        let gateway = Arc::new(match event_log {
            Some(path) => RecordingGateway::with_sink(
                JsonlSink::create(path)
                    .with_context(|| format!("failed to create event log {}", path.display()))?,
            ),
            None => RecordingGateway::new(),
        });
        let pipeline = MiningPipeline::new(
            config.pipeline,
            Arc::new(ProgressionEngine::default()),
            gateway.clone(),
            regions.clone(),
            world.clone(),
        );

        let region_report = regions.load_world(&world_id)?;
        let mine_report = mines.load_world(&world_id)?;
        let scheduled = mines.resume_schedules(&world_id).await?;
        info!(
            world = %world_id,
            regions = region_report.loaded,
            mines = mine_report.loaded,
            skipped = region_report.skipped + mine_report.skipped,
            scheduled,
            "Loaded world state"
        );

        Ok(Self {
            world_id,
            world,
            regions,
            mines,
            gateway,
            pipeline,
            held: HashMap::new(),
        })
    }

    pub async fn execute(&mut self, cmd: DriverCommand) -> CommandOutput {
        let w = self.world_id.clone();
        match cmd {
            DriverCommand::Help => CommandOutput {
                lines: commands::help_lines(),
            },
            DriverCommand::Claim {
                name,
                corner1,
                corner2,
            } => match self.regions.create(&w, &name, corner1, corner2) {
                Ok(region) => CommandOutput::line(format!(
                    "Claimed {} as {}",
                    region.name, region.id
                )),
                Err(err) => CommandOutput::error(err),
            },
            DriverCommand::Unclaim { name } => {
                let Some(region) = self.regions.find_by_name(&w, &name) else {
                    return CommandOutput::error(format!("no region named {name}"));
                };
                match self.mines.delete_region(&w, region.id).await {
                    Ok(_) => CommandOutput::line(format!("Removed region {}", region.name)),
                    Err(err) => CommandOutput::error(err),
                }
            }
            DriverCommand::Flag {
                region,
                flag,
                change,
            } => {
                let Some(found) = self.regions.find_by_name(&w, &region) else {
                    return CommandOutput::error(format!("no region named {region}"));
                };
                let result = match change {
                    FlagChange::Toggle => self.regions.toggle_flag(&w, found.id, &flag),
                    FlagChange::Set(enabled) => self
                        .regions
                        .set_flag(&w, found.id, &flag, enabled)
                        .map(|_| enabled),
                };
                match result {
                    Ok(true) => CommandOutput::line(format!("Flag {flag} enabled on {region}")),
                    Ok(false) => CommandOutput::line(format!("Flag {flag} disabled on {region}")),
                    Err(err) => CommandOutput::error(err),
                }
            }
            DriverCommand::Mine(cmd) => self.execute_mine(cmd).await,
            DriverCommand::Load { from, to } => {
                self.world.load_area(&w, from, to);
                CommandOutput::line(format!(
                    "Loaded chunks; {} resident",
                    self.world.loaded_chunks()
                ))
            }
            DriverCommand::Unload { chunk } => {
                if self.world.unload_chunk(&w, chunk) {
                    CommandOutput::line(format!("Unloaded chunk {chunk}"))
                } else {
                    CommandOutput::error(format!("chunk {chunk} is not loaded"))
                }
            }
            DriverCommand::Tool {
                player,
                uid,
                enchants,
            } => {
                let mut tool = self
                    .gateway
                    .tool_state(player, uid)
                    .unwrap_or_else(|| ToolProgressionState::new(uid));
                for enchant in enchants {
                    tool.add_enchant(enchant);
                }
                let summary = tool
                    .enchants
                    .iter()
                    .map(|e| format!("{}:{}", e.kind, e.level))
                    .collect::<Vec<_>>()
                    .join(" ");
                self.gateway.give_tool(player, tool);
                self.held.insert(player, uid);
                CommandOutput::line(format!("{player} holds {uid} [{summary}]"))
            }
            DriverCommand::Break { player, pos } => self.break_block(player, pos),
            DriverCommand::Status { player } => self.player_status(player),
            DriverCommand::Disconnect { player } => {
                self.held.remove(&player);
                if self.pipeline.disconnect(player).await {
                    CommandOutput::line(format!("{player} disconnected"))
                } else {
                    CommandOutput::line(format!("{player} had no pending work"))
                }
            }
            DriverCommand::Save => match self.mines.save_world(&w) {
                Ok(()) => CommandOutput::line(format!("Saved {w}")),
                Err(err) => CommandOutput::error(format!("{err:#}")),
            },
        }
    }

    async fn execute_mine(&mut self, cmd: MineCommand) -> CommandOutput {
        let w = self.world_id.clone();
        match cmd {
            MineCommand::Create { name, corners } => {
                let created = match corners {
                    Some((a, b)) => self.mines.create(&w, &name, a, b),
                    None => match self.regions.find_by_name(&w, &name) {
                        Some(region) => self.mines.create_from_region(&w, &region),
                        None => return CommandOutput::error(format!("no region named {name}")),
                    },
                };
                match created {
                    Ok(mine) => CommandOutput::line(format!("Created mine {}", mine.name)),
                    Err(err) => CommandOutput::error(err),
                }
            }
            MineCommand::Palette { name, blocks } => {
                if self.mines.set_palette(&w, &name, blocks) {
                    let palette = self
                        .mines
                        .get(&w, &name)
                        .map(|mine| mine.palette)
                        .unwrap_or_default();
                    let listed: Vec<&str> = palette.iter().map(BlockType::as_str).collect();
                    CommandOutput::line(format!("Palette of {name}: {}", listed.join(", ")))
                } else {
                    CommandOutput::error(format!("no mine named {name}"))
                }
            }
            MineCommand::Fill { name } => match self.mines.fill(&w, &name) {
                Ok(report) => CommandOutput::line(format!(
                    "Filled {name}: {} blocks in {} layers, {} changed",
                    report.blocks, report.layers, report.changed
                )),
                Err(err) => CommandOutput::error(err),
            },
            MineCommand::Schedule {
                name,
                interval_secs,
            } => match self.mines.schedule_reset(&w, &name, interval_secs).await {
                Ok(()) => {
                    let secs = self
                        .mines
                        .get(&w, &name)
                        .map_or(interval_secs, |mine| mine.reset_interval_secs);
                    CommandOutput::line(format!("Scheduled {name} every {secs}s"))
                }
                Err(err) => CommandOutput::error(err),
            },
            MineCommand::Cancel { name } => {
                if self.mines.cancel_reset(&w, &name).await {
                    CommandOutput::line(format!("Cancelled resets of {name}"))
                } else {
                    CommandOutput::error(format!("{name} has no scheduled reset"))
                }
            }
            MineCommand::Status { name } => match self.mines.sample_depletion(&w, &name) {
                Ok(sample) => {
                    let scheduled = self.mines.is_scheduled(&w, &name).await;
                    CommandOutput::line(format!(
                        "{name}: {}/{} blocks remain ({:.1}% mined), scheduled={scheduled}",
                        sample.remaining,
                        sample.scanned,
                        sample.mined_fraction() * 100.0
                    ))
                }
                Err(err) => CommandOutput::error(err),
            },
            MineCommand::Delete { name } => match self.mines.delete(&w, &name).await {
                Ok(true) => CommandOutput::line(format!("Deleted mine {name}")),
                Ok(false) => CommandOutput::error(format!("no mine named {name}")),
                Err(err) => CommandOutput::error(err),
            },
        }
    }

    /// Remove the block from the world and hand the break to the pipeline.
    fn break_block(&self, player: PlayerId, pos: BlockPos) -> CommandOutput {
        let w = &self.world_id;
        if self.regions.flag_state(w, pos, FLAG_BREAK) == FlagState::Denied {
            return CommandOutput::error(format!("breaking is not allowed at {pos}"));
        }
        let block = match self.world.block(w, pos) {
            None => return CommandOutput::error(format!("chunk at {pos} is not loaded")),
            Some(block) if block.is_air() => {
                return CommandOutput::error(format!("nothing to break at {pos}"))
            }
            Some(block) => block,
        };
        let air = BlockType::air();
        if let Err(err) = self.world.set_blocks(w, &[(pos, &air)]) {
            return CommandOutput::error(format!("{err:#}"));
        }

        let tool = self.held.get(&player).copied().unwrap_or(ToolUid(0));
        let enchants = self
            .gateway
            .tool_state(player, tool)
            .map(|state| state.enchants)
            .unwrap_or_default();
        let event = BlockBreak {
            player,
            tool,
            enchants,
            world: w.clone(),
            pos,
            block: block.clone(),
        };
        if self.pipeline.submit(event) {
            CommandOutput::line(format!("{player} broke {block} at {pos}"))
        } else {
            CommandOutput::error(format!("mining queue of {player} is full"))
        }
    }

    fn player_status(&self, player: PlayerId) -> CommandOutput {
        let mut out = CommandOutput::default();
        match self
            .held
            .get(&player)
            .and_then(|uid| self.gateway.tool_state(player, *uid))
        {
            Some(tool) => out.lines.push(format!(
                "{}: level {}, {} xp, {} blocks",
                tool.uid, tool.level, tool.experience, tool.blocks_mined
            )),
            None => out.lines.push("No tool held".to_string()),
        }
        out.lines
            .push(format!("Tokens: {}", self.gateway.tokens(player)));
        for (block, count) in self.gateway.backpack(player) {
            out.lines.push(format!("  {block}: {count}"));
        }
        out
    }

    /// Flush every player, stop mine timers and save state.
    pub async fn close(self) -> Result<()> {
        self.pipeline.shutdown().await;
        self.mines.shutdown().await;
        self.mines.save_world(&self.world_id)?;
        self.gateway.flush()?;
        info!(
            world = %self.world_id,
            commits = self.gateway.commits(),
            events = self.gateway.events().len(),
            "Driver closed"
        );
        Ok(())
    }
}
