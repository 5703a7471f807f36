//! Tool progression state embedded in pickaxe items.

use serde::{Deserialize, Serialize};

use crate::enchantment::{Enchant, EnchantKind};
use crate::ToolUid;

/// Reward quantity a booster multiplies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoosterKind {
    /// Tool experience per block.
    Experience,
    /// Currency credited per block.
    Tokens,
    /// Items credited to the backpack per block.
    Backpack,
}

/// A time-bounded or permanent reward multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Booster {
    /// Which reward this booster applies to.
    pub kind: BoosterKind,
    /// Multiplier applied to the base amount (capped by configuration).
    pub multiplier: f64,
    /// Expiry as Unix milliseconds; `None` never expires.
    pub expires_at_millis: Option<u64>,
}

impl Booster {
    /// A booster that never expires.
    pub fn permanent(kind: BoosterKind, multiplier: f64) -> Self {
        Self {
            kind,
            multiplier,
            expires_at_millis: None,
        }
    }

    /// A booster that stops applying at `expires_at_millis`.
    pub fn expiring(kind: BoosterKind, multiplier: f64, expires_at_millis: u64) -> Self {
        Self {
            kind,
            multiplier,
            expires_at_millis: Some(expires_at_millis),
        }
    }

    /// Whether the booster still applies at `now_millis`.
    pub fn is_active(&self, now_millis: u64) -> bool {
        self.expires_at_millis
            .map(|expiry| now_millis < expiry)
            .unwrap_or(true)
    }
}

/// Progression data carried by a single tool instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolProgressionState {
    /// Identity of the tool instance, stable across inventory slots.
    pub uid: ToolUid,
    /// Lifetime count of blocks broken with this tool.
    pub blocks_mined: u64,
    /// Level derived from `experience`.
    pub level: u32,
    /// Accumulated experience.
    pub experience: u64,
    /// Boosters attached to the tool.
    #[serde(default)]
    pub boosters: Vec<Booster>,
    /// Enchantments on the tool.
    #[serde(default)]
    pub enchants: Vec<Enchant>,
}

impl ToolProgressionState {
    /// A fresh level-1 tool.
    pub fn new(uid: ToolUid) -> Self {
        Self {
            uid,
            blocks_mined: 0,
            level: 1,
            experience: 0,
            boosters: Vec::new(),
            enchants: Vec::new(),
        }
    }

    /// Attach a booster.
    pub fn add_booster(&mut self, booster: Booster) {
        self.boosters.push(booster);
    }

    /// Boosters of `kind` that are still active at `now_millis`.
    pub fn active_boosters(
        &self,
        kind: BoosterKind,
        now_millis: u64,
    ) -> impl Iterator<Item = &Booster> + '_ {
        self.boosters
            .iter()
            .filter(move |b| b.kind == kind && b.is_active(now_millis))
    }

    /// Drop expired boosters, returning how many were removed.
    pub fn prune_expired(&mut self, now_millis: u64) -> usize {
        let before = self.boosters.len();
        self.boosters.retain(|b| b.is_active(now_millis));
        before - self.boosters.len()
    }

    /// Add an enchantment, upgrading the level if the tool already has the kind.
    /// Returns true if the tool changed.
    pub fn add_enchant(&mut self, enchant: Enchant) -> bool {
        for existing in self.enchants.iter_mut() {
            if existing.kind == enchant.kind {
                if enchant.level > existing.level {
                    existing.level = enchant.level;
                    return true;
                }
                return false;
            }
        }
        self.enchants.push(enchant);
        true
    }

    /// Level of `kind` on this tool, if present.
    pub fn enchant_level(&self, kind: EnchantKind) -> Option<u8> {
        self.enchants
            .iter()
            .find(|e| e.kind == kind)
            .map(|e| e.level)
    }
}
