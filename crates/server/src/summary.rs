//! Totals between two mining summaries.

use quarry_core::MiningSummary;
use quarry_progression::saturating_add;
use tokio::time::Instant;

#[derive(Debug)]
pub struct SessionTotals {
    totals: MiningSummary,
    window_start: Instant,
}

impl SessionTotals {
    pub fn new(now: Instant) -> Self {
        Self {
            totals: MiningSummary::default(),
            window_start: now,
        }
    }

    pub fn record(&mut self, blocks: u64, enchant_blocks: u64, tokens: u64, xp: u64) {
        let t = &mut self.totals;
        t.blocks = saturating_add(t.blocks, blocks);
        t.enchant_blocks = saturating_add(t.enchant_blocks, enchant_blocks);
        t.tokens = saturating_add(t.tokens, tokens);
        t.xp = saturating_add(t.xp, xp);
    }

    /// Close the window. Returns `None` when nothing was mined in it.
    pub fn take(&mut self, now: Instant) -> Option<MiningSummary> {
        let mut summary = std::mem::take(&mut self.totals);
        let elapsed = now.saturating_duration_since(self.window_start);
        self.window_start = now;
        if summary.is_empty() {
            return None;
        }
        summary.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        Some(summary)
    }
}
