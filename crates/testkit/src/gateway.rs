//! In-memory [`PlayerGateway`] that records everything the pipeline does.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Result};
use quarry_core::{BlockType, CoreEvent, PlayerGateway, PlayerId, ToolProgressionState, ToolUid};
use tracing::warn;

use crate::{EventRecord, JsonlSink};

#[derive(Default)]
struct PlayerState {
    tools: HashMap<ToolUid, ToolProgressionState>,
    backpack: BTreeMap<BlockType, u64>,
    tokens: u64,
}

#[derive(Default)]
struct State {
    players: HashMap<PlayerId, PlayerState>,
    events: Vec<CoreEvent>,
    commits: usize,
    dropped_commits: usize,
    fail_backpack: bool,
    fail_tokens: bool,
    fail_commits: bool,
    sink: Option<JsonlSink>,
}

/// Gateway backed by plain maps, for tests and the headless driver.
///
/// Tools are keyed by uid, mirroring an inventory where the player may move a
/// tool between slots at any time.
#[derive(Default)]
pub struct RecordingGateway {
    state: Mutex<State>,
}

impl RecordingGateway {
    /// Empty gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway that also appends every emitted event to `sink`.
    pub fn with_sink(sink: JsonlSink) -> Self {
        let gateway = Self::default();
        gateway.lock().sink = Some(sink);
        gateway
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Put a tool into the player's inventory.
    pub fn give_tool(&self, player: PlayerId, tool: ToolProgressionState) {
        self.lock()
            .players
            .entry(player)
            .or_default()
            .tools
            .insert(tool.uid, tool);
    }

    /// Remove a tool from the player's inventory, returning its last state.
    pub fn take_tool(&self, player: PlayerId, uid: ToolUid) -> Option<ToolProgressionState> {
        self.lock()
            .players
            .get_mut(&player)
            .and_then(|p| p.tools.remove(&uid))
    }

    /// Make every subsequent credit call fail until switched off.
    pub fn set_fail_credits(&self, fail: bool) {
        let mut guard = self.lock();
        guard.fail_backpack = fail;
        guard.fail_tokens = fail;
    }

    /// Make only token credits fail until switched off.
    pub fn set_fail_tokens(&self, fail: bool) {
        self.lock().fail_tokens = fail;
    }

    /// Make tool commits fail until switched off.
    pub fn set_fail_commits(&self, fail: bool) {
        self.lock().fail_commits = fail;
    }

    /// Last committed state of a held tool.
    pub fn tool_state(&self, player: PlayerId, uid: ToolUid) -> Option<ToolProgressionState> {
        self.tool(player, uid)
    }

    /// Backpack contents of a player.
    pub fn backpack(&self, player: PlayerId) -> BTreeMap<BlockType, u64> {
        self.lock()
            .players
            .get(&player)
            .map(|p| p.backpack.clone())
            .unwrap_or_default()
    }

    /// Token balance of a player.
    pub fn tokens(&self, player: PlayerId) -> u64 {
        self.lock().players.get(&player).map_or(0, |p| p.tokens)
    }

    /// Every event emitted so far, in order.
    pub fn events(&self) -> Vec<CoreEvent> {
        self.lock().events.clone()
    }

    /// Successful tool commits.
    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    /// Commits dropped because the tool was no longer held.
    pub fn dropped_commits(&self) -> usize {
        self.lock().dropped_commits
    }

    /// Flush the attached event log, if any.
    pub fn flush(&self) -> Result<()> {
        match self.lock().sink.as_mut() {
            Some(sink) => sink.flush(),
            None => Ok(()),
        }
    }
}

impl PlayerGateway for RecordingGateway {
    fn tool(&self, player: PlayerId, uid: ToolUid) -> Option<ToolProgressionState> {
        self.lock()
            .players
            .get(&player)
            .and_then(|p| p.tools.get(&uid))
            .cloned()
    }

    fn commit_tool(&self, player: PlayerId, state: &ToolProgressionState) -> Result<bool> {
        let mut guard = self.lock();
        if guard.fail_commits {
            bail!("inventory of {player} is unavailable");
        }
        let slot = guard
            .players
            .get_mut(&player)
            .and_then(|p| p.tools.get_mut(&state.uid));
        match slot {
            Some(slot) => {
                *slot = state.clone();
                guard.commits += 1;
                Ok(true)
            }
            None => {
                guard.dropped_commits += 1;
                Ok(false)
            }
        }
    }

    fn credit_backpack(&self, player: PlayerId, block: &BlockType, amount: u64) -> Result<()> {
        let mut guard = self.lock();
        if guard.fail_backpack {
            bail!("backpack of {player} is unavailable");
        }
        let slot = guard
            .players
            .entry(player)
            .or_default()
            .backpack
            .entry(block.clone())
            .or_default();
        *slot = slot.saturating_add(amount);
        Ok(())
    }

    fn credit_tokens(&self, player: PlayerId, amount: u64) -> Result<()> {
        let mut guard = self.lock();
        if guard.fail_tokens {
            bail!("token balance of {player} is unavailable");
        }
        let balance = &mut guard.players.entry(player).or_default().tokens;
        *balance = balance.saturating_add(amount);
        Ok(())
    }

    fn emit(&self, event: CoreEvent) {
        let mut guard = self.lock();
        if let Some(sink) = guard.sink.as_mut() {
            if let Err(err) = sink.write(&EventRecord::now(&event)) {
                warn!(error = %err, "failed to append event to log");
            }
        }
        guard.events.push(event);
    }
}
