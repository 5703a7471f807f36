//! Property-based tests for region containment and flags
//!
//! Validates:
//! - Every point inside a box is contained, every point outside on X or Z is not
//! - Without `vertical`, Y never excludes a point
//! - Toggling a flag twice restores the original flag set
//! - Distance filtering agrees with containment at radius 0

use proptest::prelude::*;
use quarry_core::{BlockPos, WorldId};
use quarry_world::{RegionStore, FLAG_VERTICAL};

fn corner() -> impl Strategy<Value = BlockPos> {
    (-1_000i32..1_000, -256i32..256, -1_000i32..1_000).prop_map(|(x, y, z)| BlockPos::new(x, y, z))
}

fn world() -> WorldId {
    WorldId::from("prop")
}

proptest! {
    /// Property: points strictly inside are contained regardless of the vertical flag.
    #[test]
    fn inside_points_are_contained(
        a in corner(),
        b in corner(),
        fx in 0.0f64..1.0,
        fy in 0.0f64..1.0,
        fz in 0.0f64..1.0,
        vertical in any::<bool>(),
    ) {
        let store = RegionStore::in_memory();
        let region = store.create(&world(), "r", a, b).unwrap();
        if vertical {
            store.toggle_flag(&world(), region.id, FLAG_VERTICAL).unwrap();
        }
        let lerp = |lo: i32, hi: i32, f: f64| lo + ((hi - lo) as f64 * f) as i32;
        let p = BlockPos::new(
            lerp(a.x.min(b.x), a.x.max(b.x), fx),
            lerp(a.y.min(b.y), a.y.max(b.y), fy),
            lerp(a.z.min(b.z), a.z.max(b.z), fz),
        );
        let hits = store.containment_query(&world(), p);
        prop_assert_eq!(hits.len(), 1);
        prop_assert_eq!(hits[0].id, region.id);
    }

    /// Property: a point outside on X or Z is never contained.
    #[test]
    fn outside_points_are_excluded(
        a in corner(),
        b in corner(),
        offset in 1i32..500,
        axis_x in any::<bool>(),
        y in any::<i32>(),
    ) {
        let store = RegionStore::in_memory();
        store.create(&world(), "r", a, b).unwrap();
        let p = if axis_x {
            BlockPos::new(a.x.max(b.x) + offset, y, a.z)
        } else {
            BlockPos::new(a.x, y, a.z.min(b.z) - offset)
        };
        prop_assert!(store.containment_query(&world(), p).is_empty());
        prop_assert!(store.nearest_within_distance(&world(), p, 0).is_empty());
    }

    /// Property: without the vertical flag any Y inside the X/Z footprint is contained.
    #[test]
    fn vertical_extent_is_unbounded_without_flag(a in corner(), b in corner(), y in any::<i32>()) {
        let store = RegionStore::in_memory();
        store.create(&world(), "r", a, b).unwrap();
        prop_assert_eq!(store.containment_query(&world(), BlockPos::new(a.x, y, b.z)).len(), 1);
    }

    /// Property: toggling any flag twice is a no-op on the flag set.
    #[test]
    fn double_toggle_round_trips(flag in "[a-zA-Z]{1,12}", preset in any::<bool>()) {
        let store = RegionStore::in_memory();
        let region = store.create(&world(), "r", BlockPos::default(), BlockPos::default()).unwrap();
        if preset {
            store.toggle_flag(&world(), region.id, &flag).unwrap();
        }
        let before = store.get(&world(), region.id).unwrap().flags;
        let first = store.toggle_flag(&world(), region.id, &flag).unwrap();
        let second = store.toggle_flag(&world(), region.id, &flag).unwrap();
        prop_assert_ne!(first, second);
        prop_assert_eq!(first, !preset);
        prop_assert_eq!(store.get(&world(), region.id).unwrap().flags, before);
    }
}
