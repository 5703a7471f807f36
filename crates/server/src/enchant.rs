//! Enchant activation rolls and slab sweeps.

use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use quarry_core::{BlockPos, BlockType, ChunkPos, Enchant, PlayerId, SweepAxis, WorldId};
use quarry_world::{Aabb, BlockAccess};
use rand::Rng;
use tokio::time::Instant;

use crate::config::PipelineConfig;
use crate::cooldown::EnchantCooldownTable;

/// Pick one enabled, ready enchant uniformly and roll its chance.
///
/// Cooldowns are only read here; the caller marks them once the effect fires.
pub fn roll<R: Rng>(
    rng: &mut R,
    enchants: &[Enchant],
    config: &PipelineConfig,
    cooldowns: &EnchantCooldownTable,
    player: PlayerId,
    now: Instant,
) -> Option<Enchant> {
    let candidates: Vec<&Enchant> = enchants
        .iter()
        .filter(|e| config.enabled_enchants.contains(&e.kind))
        .filter(|e| cooldowns.is_ready(player, e.kind, now))
        .collect();
    if candidates.is_empty() {
        return None;
    }
    let picked = *candidates[rng.gen_range(0..candidates.len())];
    let chance = picked.activation_chance(config.chance_per_level);
    if chance.is_nan() || chance <= 0.0 {
        return None;
    }
    rng.gen_bool(chance.min(1.0)).then_some(picked)
}

/// Slab through `origin` along `axis`, clipped to `bounds`.
pub fn slab(axis: SweepAxis, origin: BlockPos, bounds: &Aabb) -> Option<Aabb> {
    let (mut min, mut max) = (bounds.min, bounds.max);
    match axis {
        SweepAxis::Horizontal => {
            min.y = origin.y;
            max.y = origin.y;
        }
        SweepAxis::VerticalX => {
            min.z = origin.z;
            max.z = origin.z;
        }
        SweepAxis::VerticalZ => {
            min.x = origin.x;
            max.x = origin.x;
        }
    }
    bounds.intersection(&Aabb { min, max })
}

/// Blocks cleared by one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepResult {
    pub removed: BTreeMap<BlockType, u64>,
    pub total: u64,
    /// Whether the origin block itself was among the removed blocks.
    pub included_origin: bool,
}

/// Clear every non-air block of `area` in loaded chunks.
pub fn sweep(
    access: &dyn BlockAccess,
    world: &WorldId,
    area: &Aabb,
    origin: BlockPos,
) -> Result<SweepResult> {
    let loaded: HashSet<ChunkPos> = area
        .chunks()
        .filter(|chunk| access.is_chunk_loaded(world, *chunk))
        .collect();

    let mut result = SweepResult::default();
    let mut cleared = Vec::new();
    for x in area.min.x..=area.max.x {
        for z in area.min.z..=area.max.z {
            if !loaded.contains(&BlockPos::new(x, 0, z).chunk()) {
                continue;
            }
            for y in area.min.y..=area.max.y {
                let pos = BlockPos::new(x, y, z);
                match access.block(world, pos) {
                    Some(block) if !block.is_air() => {
                        *result.removed.entry(block).or_default() += 1;
                        result.total += 1;
                        result.included_origin |= pos == origin;
                        cleared.push(pos);
                    }
                    _ => {}
                }
            }
        }
    }

    let air = BlockType::air();
    let writes: Vec<(BlockPos, &BlockType)> = cleared.into_iter().map(|pos| (pos, &air)).collect();
    access.set_blocks(world, &writes)?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::EnchantKind;
    use quarry_world::MemoryWorld;
    use rand::{rngs::StdRng, SeedableRng};
    use std::time::Duration;

    fn cube() -> Aabb {
        Aabb::from_corners(BlockPos::new(0, 0, 0), BlockPos::new(4, 4, 4))
    }

    #[test]
    fn slabs_follow_their_axis() {
        let origin = BlockPos::new(1, 2, 3);
        let flat = slab(SweepAxis::Horizontal, origin, &cube()).unwrap();
        assert_eq!(flat.volume(), 25);
        assert_eq!((flat.min.y, flat.max.y), (2, 2));

        let x = slab(SweepAxis::VerticalX, origin, &cube()).unwrap();
        assert_eq!((x.min.z, x.max.z, x.volume()), (3, 3, 25));

        let z = slab(SweepAxis::VerticalZ, origin, &cube()).unwrap();
        assert_eq!((z.min.x, z.max.x, z.volume()), (1, 1, 25));

        assert!(slab(SweepAxis::Horizontal, BlockPos::new(0, 9, 0), &cube()).is_none());
    }

    #[test]
    fn sweep_clears_loaded_blocks_only() {
        let world = MemoryWorld::new();
        let id = WorldId::from("w");
        let stone = BlockType::new("STONE");
        let stone_ref = &stone;
        let writes: Vec<_> = (0..20)
            .flat_map(|x| (0..3).map(move |z| (BlockPos::new(x, 0, z), stone_ref)))
            .collect();
        world.set_blocks(&id, &writes).unwrap();
        world.unload_chunk(&id, ChunkPos::new(1, 0));

        let area = Aabb::from_corners(BlockPos::new(0, 0, 0), BlockPos::new(19, 0, 2));
        let result = sweep(&world, &id, &area, BlockPos::new(0, 0, 0)).unwrap();
        assert_eq!(result.total, 48);
        assert_eq!(result.removed[&stone], 48);
        assert!(result.included_origin);
        assert_eq!(world.non_air_count(&id), 0);
        assert!(!world.is_chunk_loaded(&id, ChunkPos::new(1, 0)));
    }

    #[test]
    fn roll_respects_enabled_set_cooldown_and_chance() {
        let mut rng = StdRng::seed_from_u64(7);
        let now = Instant::now();
        let player = PlayerId(1);
        let cooldowns = EnchantCooldownTable::new(Duration::from_secs(5));
        let certain = PipelineConfig {
            chance_per_level: 1.0,
            ..PipelineConfig::default()
        };
        let laser = [Enchant::new(EnchantKind::Laser, 1)];

        assert_eq!(
            roll(&mut rng, &laser, &certain, &cooldowns, player, now),
            Some(laser[0])
        );

        cooldowns.mark(player, EnchantKind::Laser, now);
        assert_eq!(roll(&mut rng, &laser, &certain, &cooldowns, player, now), None);

        let disabled = PipelineConfig {
            enabled_enchants: vec![EnchantKind::Tremor],
            ..certain.clone()
        };
        let later = now + Duration::from_secs(5);
        assert_eq!(roll(&mut rng, &laser, &disabled, &cooldowns, player, later), None);

        let never = PipelineConfig {
            chance_per_level: f64::NAN,
            ..certain
        };
        assert_eq!(roll(&mut rng, &laser, &never, &cooldowns, player, later), None);
    }
}
