//! Property-based tests for the progression math
//!
//! Validates:
//! - Level/experience inverse on both the iterative and closed-form paths
//! - Experience thresholds are strictly increasing below the ceiling, even for tiny rates
//! - Boosts never shrink a reward and never exceed the multiplier cap

use proptest::prelude::*;
use quarry_progression::{
    apply_boost, experience_for_level_uncached, level_for_experience_uncached, GrowthCurve,
    ProgressionEngine, REWARD_CEILING,
};

fn curve_strategy() -> impl Strategy<Value = GrowthCurve> {
    // Ranges keep the max-level threshold well below the reward ceiling.
    (1.0f64..500.0, 0.0f64..0.04, 101u32..600).prop_map(|(base, rate, max_level)| GrowthCurve {
        base: base.round(),
        rate,
        max_level,
    })
}

fn tiny_rate_curve_strategy() -> impl Strategy<Value = GrowthCurve> {
    // Rates small enough that `1 + rate` rounds to (or next to) 1.0.
    (1.0f64..500.0, -18.0f64..-9.0).prop_map(|(base, exponent)| GrowthCurve {
        base: base.round(),
        rate: 10f64.powf(exponent),
        max_level: 500,
    })
}

proptest! {
    /// Property: level_for_experience inverts experience_for_level on the iterative path.
    #[test]
    fn inverse_holds_for_small_levels(curve in curve_strategy(), level in 1u32..=100) {
        let engine = ProgressionEngine::default();
        let xp = engine.experience_for_level(level, &curve);
        prop_assert_eq!(engine.level_for_experience(xp, &curve), level);
    }

    /// Property: level_for_experience inverts experience_for_level on the closed-form path.
    #[test]
    fn inverse_holds_for_large_levels(curve in curve_strategy(), offset in 0u32..500) {
        let level = (101 + offset).min(curve.max_level);
        let xp = experience_for_level_uncached(level, &curve);
        prop_assume!(xp < REWARD_CEILING);
        prop_assert_eq!(level_for_experience_uncached(xp, &curve), level);
    }

    /// Property: one experience point below a threshold stays on the previous level.
    #[test]
    fn just_below_threshold_is_previous_level(curve in curve_strategy(), level in 2u32..=600) {
        let level = level.min(curve.max_level);
        let xp = experience_for_level_uncached(level, &curve);
        prop_assume!(xp < REWARD_CEILING);
        prop_assert_eq!(level_for_experience_uncached(xp - 1, &curve), level - 1);
    }

    /// Property: thresholds strictly increase level over level.
    #[test]
    fn thresholds_strictly_increase(curve in curve_strategy(), level in 1u32..599) {
        let level = level.min(curve.max_level - 1);
        let here = experience_for_level_uncached(level, &curve);
        let next = experience_for_level_uncached(level + 1, &curve);
        prop_assume!(next < REWARD_CEILING);
        prop_assert!(next > here, "threshold {} at {} not above {}", next, level + 1, here);
    }

    /// Property: the closed form continues the iterative sum even for vanishing rates.
    #[test]
    fn tiny_rates_increase_across_the_iterative_limit(curve in tiny_rate_curve_strategy()) {
        let at_limit = experience_for_level_uncached(100, &curve);
        let past_limit = experience_for_level_uncached(101, &curve);
        prop_assert!(past_limit > at_limit, "{} at 101 not above {}", past_limit, at_limit);
        prop_assert_eq!(level_for_experience_uncached(at_limit, &curve), 100);
        prop_assert_eq!(level_for_experience_uncached(past_limit, &curve), 101);
    }

    /// Property: levels never exceed the configured maximum.
    #[test]
    fn level_never_exceeds_max(curve in curve_strategy(), xp in any::<u64>()) {
        let level = level_for_experience_uncached(xp, &curve);
        prop_assert!(level >= 1 && level <= curve.max_level);
    }

    /// Property: boosting never decreases a positive amount and respects the cap.
    #[test]
    fn boost_is_bounded(
        base in 1u64..1_000_000_000_000,
        multipliers in proptest::collection::vec(0.0f64..50.0, 0..6),
        max_multiplier in 1.0f64..20.0,
    ) {
        let boosted = apply_boost(base, multipliers.iter().copied(), max_multiplier);
        prop_assert!(boosted >= base);
        prop_assert!(
            boosted as f64 <= base as f64 * max_multiplier,
            "{} exceeds {} * {}", boosted, base, max_multiplier
        );
    }
}
