//! Per-player, per-enchant activation cooldowns.

use std::collections::HashMap;
use std::time::Duration;

use dashmap::DashMap;
use quarry_core::{EnchantKind, PlayerId};
use tokio::time::Instant;

/// Last activation of each enchant, per player.
///
/// Advisory and in memory only. Each player's row is touched by its own worker,
/// so point updates never contend across players.
#[derive(Debug)]
pub struct EnchantCooldownTable {
    cooldown: Duration,
    last: DashMap<PlayerId, HashMap<EnchantKind, Instant>>,
}

impl EnchantCooldownTable {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last: DashMap::new(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Whether `kind` may fire for `player` at `now`.
    pub fn is_ready(&self, player: PlayerId, kind: EnchantKind, now: Instant) -> bool {
        self.last
            .get(&player)
            .and_then(|row| row.get(&kind).copied())
            .map_or(true, |at| now.saturating_duration_since(at) >= self.cooldown)
    }

    /// Record an activation.
    pub fn mark(&self, player: PlayerId, kind: EnchantKind, now: Instant) {
        self.last.entry(player).or_default().insert(kind, now);
    }

    /// Time left before `kind` is ready again.
    pub fn remaining(&self, player: PlayerId, kind: EnchantKind, now: Instant) -> Duration {
        self.last
            .get(&player)
            .and_then(|row| row.get(&kind).copied())
            .map_or(Duration::ZERO, |at| {
                self.cooldown
                    .saturating_sub(now.saturating_duration_since(at))
            })
    }

    /// Forget a player, e.g. on disconnect.
    pub fn clear(&self, player: PlayerId) -> bool {
        self.last.remove(&player).is_some()
    }

    pub fn tracked_players(&self) -> usize {
        self.last.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_is_per_player_and_per_enchant() {
        let table = EnchantCooldownTable::new(Duration::from_secs(5));
        let t0 = Instant::now();
        let (alice, bob) = (PlayerId(1), PlayerId(2));

        assert!(table.is_ready(alice, EnchantKind::Laser, t0));
        table.mark(alice, EnchantKind::Laser, t0);
        assert!(!table.is_ready(alice, EnchantKind::Laser, t0 + Duration::from_secs(4)));
        assert_eq!(
            table.remaining(alice, EnchantKind::Laser, t0 + Duration::from_secs(4)),
            Duration::from_secs(1)
        );
        assert!(table.is_ready(alice, EnchantKind::Laser, t0 + Duration::from_secs(5)));
        assert!(table.is_ready(alice, EnchantKind::Tremor, t0));
        assert!(table.is_ready(bob, EnchantKind::Laser, t0));

        assert!(table.clear(alice));
        assert!(table.is_ready(alice, EnchantKind::Laser, t0));
        assert_eq!(table.tracked_players(), 0);
    }
}
