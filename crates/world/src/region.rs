//! Axis-aligned regions and the flag vocabulary of the permission layer.

use std::collections::BTreeSet;
use std::fmt;

use quarry_core::{BlockPos, ChunkPos, WorldId};
use serde::{Deserialize, Serialize};

/// Allows breaking blocks inside the region.
pub const FLAG_BREAK: &str = "break";
/// Allows placing blocks inside the region.
pub const FLAG_PLACE: &str = "place";
/// Announces entry and exit.
pub const FLAG_NOTIFY: &str = "notify";
/// Disables combat.
pub const FLAG_SAFEZONE: &str = "safezone";
/// Bounds the region vertically by its corners.
pub const FLAG_VERTICAL: &str = "vertical";

/// Vertical extent used when a region lacks [`FLAG_VERTICAL`].
pub const VERTICAL_FALLBACK: (i32, i32) = (i32::MIN, i32::MAX);

/// Inclusive integer box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Aabb {
    pub min: BlockPos,
    pub max: BlockPos,
}

impl Aabb {
    /// Per-axis min/max of two corners.
    pub fn from_corners(a: BlockPos, b: BlockPos) -> Self {
        Self {
            min: BlockPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: BlockPos::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    pub fn contains(&self, p: BlockPos) -> bool {
        (self.min.x..=self.max.x).contains(&p.x)
            && (self.min.y..=self.max.y).contains(&p.y)
            && (self.min.z..=self.max.z).contains(&p.z)
    }

    fn span(lo: i32, hi: i32) -> u128 {
        (i64::from(hi) - i64::from(lo) + 1) as u128
    }

    /// Block count, clamped to `u64::MAX`.
    pub fn volume(&self) -> u64 {
        let volume = Self::span(self.min.x, self.max.x)
            * Self::span(self.min.y, self.max.y)
            * Self::span(self.min.z, self.max.z);
        volume.min(u128::from(u64::MAX)) as u64
    }

    /// Number of blocks in one horizontal layer, clamped to `u64::MAX`.
    pub fn layer_area(&self) -> u64 {
        let area = Self::span(self.min.x, self.max.x) * Self::span(self.min.z, self.max.z);
        area.min(u128::from(u64::MAX)) as u64
    }

    /// Squared distance from `p` to the closest point of the box (0 inside).
    pub fn distance_squared(&self, p: BlockPos) -> u128 {
        fn axis(v: i32, lo: i32, hi: i32) -> u128 {
            let v = i64::from(v);
            let clamped = v.clamp(i64::from(lo), i64::from(hi));
            let d = (v - clamped).unsigned_abs() as u128;
            d * d
        }
        axis(p.x, self.min.x, self.max.x)
            + axis(p.y, self.min.y, self.max.y)
            + axis(p.z, self.min.z, self.max.z)
    }

    /// Intersection of two boxes, if any.
    pub fn intersection(&self, other: &Aabb) -> Option<Aabb> {
        let min = BlockPos::new(
            self.min.x.max(other.min.x),
            self.min.y.max(other.min.y),
            self.min.z.max(other.min.z),
        );
        let max = BlockPos::new(
            self.max.x.min(other.max.x),
            self.max.y.min(other.max.y),
            self.max.z.min(other.max.z),
        );
        (min.x <= max.x && min.y <= max.y && min.z <= max.z).then_some(Aabb { min, max })
    }

    /// Chunk columns overlapping the box's X/Z footprint.
    pub fn chunks(&self) -> impl Iterator<Item = ChunkPos> {
        let lo = self.min.chunk();
        let hi = self.max.chunk();
        (lo.x..=hi.x).flat_map(move |x| (lo.z..=hi.z).map(move |z| ChunkPos::new(x, z)))
    }
}

/// Per-world numeric region id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RegionId(pub u64);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}

/// Named volume with permission flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub name: String,
    pub world: WorldId,
    pub corner1: BlockPos,
    pub corner2: BlockPos,
    #[serde(default)]
    pub flags: BTreeSet<String>,
}

impl Region {
    /// Box spanned by the corners on every axis.
    pub fn corner_bounds(&self) -> Aabb {
        Aabb::from_corners(self.corner1, self.corner2)
    }

    /// Effective box used for containment; Y is unbounded unless `vertical` is set.
    pub fn bounds(&self) -> Aabb {
        let mut aabb = self.corner_bounds();
        if !self.has_flag(FLAG_VERTICAL) {
            aabb.min.y = VERTICAL_FALLBACK.0;
            aabb.max.y = VERTICAL_FALLBACK.1;
        }
        aabb
    }

    pub fn contains(&self, p: BlockPos) -> bool {
        self.bounds().contains(p)
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(&normalize_flag(flag))
    }
}

/// Flags are stored trimmed and lower-cased.
pub fn normalize_flag(flag: &str) -> String {
    flag.trim().to_ascii_lowercase()
}

/// Corners picked by a player while claiming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub pos1: Option<BlockPos>,
    pub pos2: Option<BlockPos>,
}

/// A selection missing one or both corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("selection is incomplete (pos1 set: {pos1}, pos2 set: {pos2})")]
pub struct IncompleteSelection {
    pub pos1: bool,
    pub pos2: bool,
}

impl Selection {
    pub fn new(pos1: BlockPos, pos2: BlockPos) -> Self {
        Self {
            pos1: Some(pos1),
            pos2: Some(pos2),
        }
    }

    pub fn corners(&self) -> Result<(BlockPos, BlockPos), IncompleteSelection> {
        match (self.pos1, self.pos2) {
            (Some(a), Some(b)) => Ok((a, b)),
            (a, b) => Err(IncompleteSelection {
                pos1: a.is_some(),
                pos2: b.is_some(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(flags: &[&str]) -> Region {
        Region {
            id: RegionId(1),
            name: "spawn".into(),
            world: WorldId::from("overworld"),
            corner1: BlockPos::new(9, 9, 9),
            corner2: BlockPos::new(0, 0, 0),
            flags: flags.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn missing_vertical_flag_unbounds_y() {
        let r = region(&[]);
        assert!(r.contains(BlockPos::new(5, 500, 5)));
        assert!(r.contains(BlockPos::new(5, i32::MIN, 5)));
        assert!(!r.contains(BlockPos::new(15, 5, 5)));

        let r = region(&[FLAG_VERTICAL]);
        assert!(!r.contains(BlockPos::new(5, 500, 5)));
        assert!(r.contains(BlockPos::new(9, 0, 0)));
    }

    #[test]
    fn volume_uses_wide_math() {
        let small = Aabb::from_corners(BlockPos::new(0, 0, 0), BlockPos::new(9, 9, 9));
        assert_eq!(small.volume(), 1_000);
        let huge = Aabb::from_corners(
            BlockPos::new(i32::MIN, i32::MIN, i32::MIN),
            BlockPos::new(i32::MAX, i32::MAX, i32::MAX),
        );
        assert_eq!(huge.volume(), u64::MAX);
    }

    #[test]
    fn distance_is_zero_inside_and_squared_outside() {
        let aabb = Aabb::from_corners(BlockPos::new(0, 0, 0), BlockPos::new(9, 9, 9));
        assert_eq!(aabb.distance_squared(BlockPos::new(4, 4, 4)), 0);
        assert_eq!(aabb.distance_squared(BlockPos::new(12, 4, 13)), 9 + 16);
        let far = aabb.distance_squared(BlockPos::new(i32::MIN, i32::MIN, i32::MIN));
        assert!(far > u128::from(u64::MAX));
    }

    #[test]
    fn chunks_cover_footprint() {
        let aabb = Aabb::from_corners(BlockPos::new(-1, 0, 0), BlockPos::new(16, 5, 3));
        let chunks: Vec<_> = aabb.chunks().collect();
        assert_eq!(
            chunks,
            vec![ChunkPos::new(-1, 0), ChunkPos::new(0, 0), ChunkPos::new(1, 0)]
        );
    }

    #[test]
    fn incomplete_selection_is_rejected() {
        let sel = Selection {
            pos1: Some(BlockPos::new(1, 2, 3)),
            pos2: None,
        };
        assert_eq!(
            sel.corners(),
            Err(IncompleteSelection {
                pos1: true,
                pos2: false
            })
        );
        assert!(Selection::new(BlockPos::default(), BlockPos::default())
            .corners()
            .is_ok());
    }
}
