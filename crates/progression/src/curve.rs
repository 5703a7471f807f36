//! Geometric experience curve.
//!
//! Reaching level `L` (levels start at 1) costs the sum of the step costs
//! `base * (1 + rate)^(n - 1)` for `n` in `1..L`. Small levels are summed
//! directly; large ones use the geometric series closed form. The inverse
//! starts from a logarithmic estimate for large experience values and is then
//! snapped onto the exact forward curve, so both directions always agree.

use serde::{Deserialize, Serialize};

use crate::boost::REWARD_CEILING;

/// Levels up to this value are summed step by step.
pub const ITERATIVE_LEVEL_LIMIT: u32 = 100;

/// Experience above `base * ITERATIVE_XP_FACTOR` uses the logarithmic inverse.
pub const ITERATIVE_XP_FACTOR: f64 = 1000.0;

/// Hard upper bound on configurable max levels.
pub const MAX_SUPPORTED_LEVEL: u32 = 100_000;

/// Growth-curve configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthCurve {
    /// Experience cost of the first level step (at least 1).
    pub base: f64,
    /// Per-level growth rate of the step cost (0.05 = +5% per level).
    pub rate: f64,
    /// Highest reachable level.
    pub max_level: u32,
}

impl Default for GrowthCurve {
    fn default() -> Self {
        Self {
            base: 100.0,
            rate: 0.05,
            max_level: 500,
        }
    }
}

/// Hashable identity of a curve, used as part of memoization keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CurveKey {
    base_bits: u64,
    rate_bits: u64,
    max_level: u32,
}

impl GrowthCurve {
    /// Curve with out-of-range parameters replaced by usable values.
    ///
    /// `base < 1` would make consecutive levels share an experience total,
    /// which breaks the level/experience inverse.
    pub fn sanitized(&self) -> Self {
        let base = if self.base.is_finite() && self.base >= 1.0 {
            self.base
        } else {
            1.0
        };
        let rate = if self.rate.is_finite() && self.rate >= 0.0 {
            self.rate
        } else {
            0.0
        };
        Self {
            base,
            rate,
            max_level: self.max_level.clamp(1, MAX_SUPPORTED_LEVEL),
        }
    }

    /// Memoization key for this curve after sanitizing.
    pub fn key(&self) -> CurveKey {
        let curve = self.sanitized();
        CurveKey {
            base_bits: curve.base.to_bits(),
            rate_bits: curve.rate.to_bits(),
            max_level: curve.max_level,
        }
    }
}

/// Total experience needed to reach `level`, without memoization.
pub fn experience_for_level_uncached(level: u32, curve: &GrowthCurve) -> u64 {
    let curve = curve.sanitized();
    if level <= 1 {
        return 0;
    }
    let steps = level - 1;
    let total = if level <= ITERATIVE_LEVEL_LIMIT {
        iterative_total(steps, &curve)
    } else {
        closed_form_total(steps, &curve)
    };
    clamp_total(total)
}

/// Level reached with `experience`, clamped to `curve.max_level`, without memoization.
pub fn level_for_experience_uncached(experience: u64, curve: &GrowthCurve) -> u32 {
    let curve = curve.sanitized();
    if experience == 0 || curve.max_level == 1 {
        return 1;
    }
    if experience as f64 > curve.base * ITERATIVE_XP_FACTOR {
        let estimate = logarithmic_estimate(experience, &curve);
        snap_to_curve(estimate, experience, &curve)
    } else {
        iterative_level(experience, &curve)
    }
}

fn iterative_total(steps: u32, curve: &GrowthCurve) -> f64 {
    let growth = 1.0 + curve.rate;
    let mut total = 0.0;
    let mut cost = curve.base;
    for _ in 0..steps {
        total += cost;
        cost *= growth;
    }
    total
}

fn closed_form_total(steps: u32, curve: &GrowthCurve) -> f64 {
    if curve.rate == 0.0 {
        return curve.base * f64::from(steps);
    }
    // ln_1p/exp_m1 keep tiny rates from rounding `1 + rate` down to 1.
    curve.base * (f64::from(steps) * curve.rate.ln_1p()).exp_m1() / curve.rate
}

fn clamp_total(total: f64) -> u64 {
    if !total.is_finite() || total >= REWARD_CEILING as f64 {
        REWARD_CEILING
    } else if total <= 0.0 {
        0
    } else {
        total.round() as u64
    }
}

fn iterative_level(experience: u64, curve: &GrowthCurve) -> u32 {
    let growth = 1.0 + curve.rate;
    let mut level = 1;
    let mut total = 0.0;
    let mut cost = curve.base;
    while level < curve.max_level {
        let next_total = if level < ITERATIVE_LEVEL_LIMIT {
            clamp_total(total + cost)
        } else {
            experience_for_level_uncached(level + 1, curve)
        };
        if next_total > experience {
            break;
        }
        total += cost;
        cost *= growth;
        level += 1;
    }
    level
}

fn logarithmic_estimate(experience: u64, curve: &GrowthCurve) -> u32 {
    let steps = if curve.rate == 0.0 {
        experience as f64 / curve.base
    } else {
        (experience as f64 * curve.rate / curve.base).ln_1p() / curve.rate.ln_1p()
    };
    if !steps.is_finite() || steps >= f64::from(curve.max_level) {
        return curve.max_level;
    }
    (steps.floor() as u32).saturating_add(1).clamp(1, curve.max_level)
}

/// Largest level whose exact threshold is `<= experience`, searched around `estimate`.
fn snap_to_curve(estimate: u32, experience: u64, curve: &GrowthCurve) -> u32 {
    let reached = |level: u32| experience_for_level_uncached(level, curve) <= experience;

    // The estimate is normally exact or one off; widen to the full range otherwise.
    let mut lo = estimate.saturating_sub(2).max(1);
    if !reached(lo) {
        lo = 1;
    }
    let mut hi = estimate.saturating_add(2).min(curve.max_level);
    if hi < curve.max_level && reached(hi + 1) {
        hi = curve.max_level;
    }

    // Invariant: reached(lo); answer in [lo, hi].
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        if reached(mid) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    lo
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve(base: f64, rate: f64, max_level: u32) -> GrowthCurve {
        GrowthCurve {
            base,
            rate,
            max_level,
        }
    }

    #[test]
    fn first_levels_match_hand_computed_sums() {
        let c = curve(100.0, 0.5, 50);
        assert_eq!(experience_for_level_uncached(0, &c), 0);
        assert_eq!(experience_for_level_uncached(1, &c), 0);
        assert_eq!(experience_for_level_uncached(2, &c), 100);
        assert_eq!(experience_for_level_uncached(3, &c), 250);
        assert_eq!(experience_for_level_uncached(4, &c), 475);
    }

    #[test]
    fn closed_form_continues_iterative_sum() {
        let c = curve(10.0, 0.01, 1_000);
        let at_limit = experience_for_level_uncached(ITERATIVE_LEVEL_LIMIT, &c);
        let past_limit = experience_for_level_uncached(ITERATIVE_LEVEL_LIMIT + 1, &c);
        let expected_step = 10.0 * 1.01f64.powi(ITERATIVE_LEVEL_LIMIT as i32 - 1);
        assert!(past_limit > at_limit);
        assert!(((past_limit - at_limit) as f64 - expected_step).abs() <= 1.0);
    }

    #[test]
    fn zero_rate_is_linear() {
        let c = curve(50.0, 0.0, 10_000);
        assert_eq!(experience_for_level_uncached(11, &c), 500);
        assert_eq!(experience_for_level_uncached(501, &c), 25_000);
        assert_eq!(level_for_experience_uncached(25_000, &c), 501);
        assert_eq!(level_for_experience_uncached(24_999, &c), 500);
        assert_eq!(level_for_experience_uncached(499, &c), 10);
    }

    #[test]
    fn level_is_clamped_to_max() {
        let c = curve(100.0, 0.05, 20);
        assert_eq!(level_for_experience_uncached(u64::MAX, &c), 20);
        assert_eq!(level_for_experience_uncached(0, &c), 1);
    }

    #[test]
    fn huge_levels_saturate_instead_of_overflowing() {
        let c = curve(1_000.0, 1.0, MAX_SUPPORTED_LEVEL);
        assert_eq!(experience_for_level_uncached(10_000, &c), REWARD_CEILING);
        assert_eq!(experience_for_level_uncached(MAX_SUPPORTED_LEVEL, &c), REWARD_CEILING);
    }

    #[test]
    fn bad_parameters_are_sanitized() {
        let c = curve(f64::NAN, -3.0, 0).sanitized();
        assert_eq!(c.base, 1.0);
        assert_eq!(c.rate, 0.0);
        assert_eq!(c.max_level, 1);
        assert_eq!(curve(0.2, 0.0, 10).key(), curve(1.0, 0.0, 10).key());
    }

    #[test]
    fn tiny_rates_stay_monotonic_past_the_iterative_limit() {
        for rate in [1e-17, 3e-16, 1e-12] {
            let c = curve(100.0, rate, 500);
            let at_limit = experience_for_level_uncached(ITERATIVE_LEVEL_LIMIT, &c);
            let past_limit = experience_for_level_uncached(ITERATIVE_LEVEL_LIMIT + 1, &c);
            assert_eq!(at_limit, 9_900, "rate {rate}");
            assert_eq!(past_limit, 10_000, "rate {rate}");
            assert_eq!(level_for_experience_uncached(at_limit, &c), 100, "rate {rate}");
            assert_eq!(level_for_experience_uncached(200_000, &c), 500, "rate {rate}");
            assert_eq!(level_for_experience_uncached(30_000, &c), 301, "rate {rate}");
        }
    }

    #[test]
    fn both_inverse_paths_agree_with_forward_curve() {
        let c = curve(25.0, 0.03, 400);
        for level in [1, 2, 10, 99, 100, 101, 150, 399, 400] {
            let xp = experience_for_level_uncached(level, &c);
            assert_eq!(level_for_experience_uncached(xp, &c), level, "level {level}");
            if level > 1 {
                assert_eq!(
                    level_for_experience_uncached(xp - 1, &c),
                    level - 1,
                    "just below level {level}"
                );
            }
        }
    }
}
