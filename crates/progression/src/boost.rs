//! Saturating reward arithmetic and booster folding.

use quarry_core::{BoosterKind, ToolProgressionState};

/// Largest value any reward or experience total may take: 90% of `u64::MAX`.
///
/// Arithmetic that would pass it returns this sentinel instead of wrapping.
pub const REWARD_CEILING: u64 = u64::MAX / 10 * 9;

/// `a + b`, clamped to [`REWARD_CEILING`].
pub fn saturating_add(a: u64, b: u64) -> u64 {
    a.checked_add(b)
        .map(|sum| sum.min(REWARD_CEILING))
        .unwrap_or(REWARD_CEILING)
}

/// `a * b`, clamped to [`REWARD_CEILING`].
pub fn saturating_mul(a: u64, b: u64) -> u64 {
    a.checked_mul(b)
        .map(|product| product.min(REWARD_CEILING))
        .unwrap_or(REWARD_CEILING)
}

/// Fold active multipliers over `base`.
///
/// Each multiplier is clamped into `[1, max_multiplier]` and the folded
/// product is capped at `max_multiplier`, so the result lies in
/// `[base, base * max_multiplier]`. Results past [`REWARD_CEILING`] return the
/// ceiling; a base already past it is returned untouched.
pub fn apply_boost<I>(base: u64, multipliers: I, max_multiplier: f64) -> u64
where
    I: IntoIterator<Item = f64>,
{
    if base == 0 || base >= REWARD_CEILING {
        return base;
    }
    let cap = if max_multiplier.is_finite() && max_multiplier >= 1.0 {
        max_multiplier
    } else {
        1.0
    };
    let factor = multipliers.into_iter().fold(1.0_f64, |acc, multiplier| {
        let multiplier = if multiplier.is_finite() {
            multiplier.clamp(1.0, cap)
        } else {
            1.0
        };
        (acc * multiplier).min(cap)
    });

    let boosted = base as f64 * factor;
    if boosted >= REWARD_CEILING as f64 {
        return REWARD_CEILING;
    }
    (boosted.floor() as u64).max(base)
}

/// [`apply_boost`] over the tool's boosters of `kind` that are active at `now_millis`.
pub fn apply_tool_boost(
    base: u64,
    tool: &ToolProgressionState,
    kind: BoosterKind,
    now_millis: u64,
    max_multiplier: f64,
) -> u64 {
    apply_boost(
        base,
        tool.active_boosters(kind, now_millis).map(|b| b.multiplier),
        max_multiplier,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::{Booster, ToolUid};

    #[test]
    fn saturating_ops_clamp_to_ceiling() {
        assert_eq!(saturating_add(1, 2), 3);
        assert_eq!(saturating_add(REWARD_CEILING, 1), REWARD_CEILING);
        assert_eq!(saturating_add(u64::MAX, u64::MAX), REWARD_CEILING);
        assert_eq!(saturating_mul(6, 7), 42);
        assert_eq!(saturating_mul(u64::MAX / 2, 3), REWARD_CEILING);
    }

    #[test]
    fn stacked_boosts_respect_cap() {
        assert_eq!(apply_boost(100, [2.0, 3.0], 10.0), 600);
        assert_eq!(apply_boost(100, [4.0, 4.0], 10.0), 1_000);
        assert_eq!(apply_boost(100, [50.0], 10.0), 1_000);
    }

    #[test]
    fn penalties_and_garbage_multipliers_are_ignored() {
        assert_eq!(apply_boost(100, [0.5], 10.0), 100);
        assert_eq!(apply_boost(100, [f64::NAN, f64::INFINITY], 10.0), 100);
        assert_eq!(apply_boost(100, [3.0], f64::NAN), 100);
        assert_eq!(apply_boost(0, [3.0], 10.0), 0);
    }

    #[test]
    fn boost_saturates_near_u64_max() {
        assert_eq!(apply_boost(REWARD_CEILING / 2, [5.0], 10.0), REWARD_CEILING);
        assert_eq!(apply_boost(u64::MAX, [5.0], 10.0), u64::MAX);
    }

    #[test]
    fn tool_boost_skips_expired_and_other_kinds() {
        let mut tool = ToolProgressionState::new(ToolUid(1));
        tool.add_booster(Booster::permanent(BoosterKind::Tokens, 2.0));
        tool.add_booster(Booster::expiring(BoosterKind::Tokens, 5.0, 100));
        tool.add_booster(Booster::permanent(BoosterKind::Backpack, 3.0));

        assert_eq!(apply_tool_boost(10, &tool, BoosterKind::Tokens, 50, 20.0), 100);
        assert_eq!(apply_tool_boost(10, &tool, BoosterKind::Tokens, 100, 20.0), 20);
        assert_eq!(apply_tool_boost(10, &tool, BoosterKind::Experience, 0, 20.0), 10);
    }
}
