//! Per-world region index with write-through persistence.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Context;
use dashmap::DashMap;
use quarry_core::{BlockPos, WorldId};
use tracing::{debug, info, warn};

use crate::persist::SnapshotStore;
use crate::region::{normalize_flag, IncompleteSelection, Region, RegionId, Selection};

/// Validation and persistence failures of region mutations.
///
/// A failed call leaves the store exactly as it was.
#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    #[error("a region named `{name}` already exists in {world}")]
    DuplicateName { world: WorldId, name: String },
    #[error("region names must not be empty")]
    InvalidName,
    #[error("flag names must not be empty")]
    InvalidFlag,
    #[error("{id} does not exist in {world}")]
    NotFound { world: WorldId, id: RegionId },
    #[error(transparent)]
    Selection(#[from] IncompleteSelection),
    #[error("failed to persist regions of {world}: {cause:#}")]
    Persist { world: WorldId, cause: anyhow::Error },
}

/// Answer of the permission layer for one flag at one point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagState {
    /// No region contains the point.
    Unregulated,
    /// Some containing region carries the flag.
    Allowed,
    /// Regions contain the point but none carries the flag.
    Denied,
}

/// Outcome of loading a world's regions from the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: usize,
}

type WorldRegions = BTreeMap<RegionId, Region>;

/// Callback run after a region has been removed from the store.
pub type DeleteHook = Box<dyn Fn(&WorldId, &Region) + Send + Sync>;

/// Regions keyed by world.
///
/// Each world sits behind its own lock; reads share it and mutations copy the
/// world's set, persist the copy, and only then swap it in.
pub struct RegionStore {
    worlds: DashMap<WorldId, Arc<RwLock<WorldRegions>>>,
    backend: Option<Arc<dyn SnapshotStore>>,
    next_id: AtomicU64,
    delete_hooks: RwLock<Vec<DeleteHook>>,
}

impl Default for RegionStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl RegionStore {
    /// Store persisting every mutation through `backend`.
    pub fn new(backend: Arc<dyn SnapshotStore>) -> Self {
        Self {
            worlds: DashMap::new(),
            backend: Some(backend),
            next_id: AtomicU64::new(1),
            delete_hooks: RwLock::new(Vec::new()),
        }
    }

    /// Store without persistence.
    pub fn in_memory() -> Self {
        Self {
            worlds: DashMap::new(),
            backend: None,
            next_id: AtomicU64::new(1),
            delete_hooks: RwLock::new(Vec::new()),
        }
    }

    /// Register `hook` to run after every successful [`RegionStore::delete`].
    ///
    /// Hooks run outside the world lock and must not register further hooks.
    pub fn on_delete(&self, hook: DeleteHook) {
        self.delete_hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    fn world(&self, world: &WorldId) -> Arc<RwLock<WorldRegions>> {
        if let Some(entry) = self.worlds.get(world) {
            return Arc::clone(entry.value());
        }
        Arc::clone(self.worlds.entry(world.clone()).or_default().value())
    }

    fn read<R>(&self, world: &WorldId, f: impl FnOnce(&WorldRegions) -> R) -> R {
        let lock = self.world(world);
        let guard = lock.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Copy-modify-persist-swap under the world's write lock.
    fn mutate<R>(
        &self,
        world: &WorldId,
        f: impl FnOnce(&mut WorldRegions) -> Result<R, RegionError>,
    ) -> Result<R, RegionError> {
        let lock = self.world(world);
        let mut guard = lock.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        let result = f(&mut next)?;
        self.persist(world, &next)?;
        *guard = next;
        Ok(result)
    }

    fn persist(&self, world: &WorldId, regions: &WorldRegions) -> Result<(), RegionError> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };
        let snapshot: Vec<Region> = regions.values().cloned().collect();
        backend
            .save_regions(world, &snapshot)
            .map_err(|cause| RegionError::Persist {
                world: world.clone(),
                cause,
            })
    }

    /// Create a region from two corners.
    pub fn create(
        &self,
        world: &WorldId,
        name: &str,
        corner1: BlockPos,
        corner2: BlockPos,
    ) -> Result<Region, RegionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegionError::InvalidName);
        }
        let region = self.mutate(world, |regions| {
            if find_named(regions, name).is_some() {
                return Err(RegionError::DuplicateName {
                    world: world.clone(),
                    name: name.to_string(),
                });
            }
            let region = Region {
                id: RegionId(self.next_id.fetch_add(1, Ordering::Relaxed)),
                name: name.to_string(),
                world: world.clone(),
                corner1,
                corner2,
                flags: Default::default(),
            };
            regions.insert(region.id, region.clone());
            Ok(region)
        })?;
        info!(world = %world, id = %region.id, name = %region.name, "created region");
        Ok(region)
    }

    /// Create a region from a player's corner selection.
    pub fn claim(
        &self,
        world: &WorldId,
        name: &str,
        selection: &Selection,
    ) -> Result<Region, RegionError> {
        let (corner1, corner2) = selection.corners()?;
        self.create(world, name, corner1, corner2)
    }

    /// Replace a region's corners, keeping its id, name and flags.
    pub fn redefine(
        &self,
        world: &WorldId,
        id: RegionId,
        corner1: BlockPos,
        corner2: BlockPos,
    ) -> Result<Region, RegionError> {
        self.mutate(world, |regions| {
            let region = regions.get_mut(&id).ok_or_else(|| RegionError::NotFound {
                world: world.clone(),
                id,
            })?;
            region.corner1 = corner1;
            region.corner2 = corner2;
            Ok(region.clone())
        })
    }

    /// Flip a flag, returning true when it was added and false when removed.
    pub fn toggle_flag(
        &self,
        world: &WorldId,
        id: RegionId,
        flag: &str,
    ) -> Result<bool, RegionError> {
        let flag = normalize_flag(flag);
        if flag.is_empty() {
            return Err(RegionError::InvalidFlag);
        }
        let added = self.mutate(world, |regions| {
            let region = regions.get_mut(&id).ok_or_else(|| RegionError::NotFound {
                world: world.clone(),
                id,
            })?;
            if region.flags.remove(&flag) {
                Ok(false)
            } else {
                region.flags.insert(flag.clone());
                Ok(true)
            }
        })?;
        debug!(world = %world, %id, flag = %flag, added, "toggled region flag");
        Ok(added)
    }

    /// Force a flag on or off, returning whether membership changed.
    ///
    /// Unchanged flags skip the persistence write.
    pub fn set_flag(
        &self,
        world: &WorldId,
        id: RegionId,
        flag: &str,
        enabled: bool,
    ) -> Result<bool, RegionError> {
        let current = self
            .get(world, id)
            .ok_or_else(|| RegionError::NotFound {
                world: world.clone(),
                id,
            })?
            .has_flag(flag);
        if current == enabled {
            return Ok(false);
        }
        self.toggle_flag(world, id, flag).map(|_| true)
    }

    /// Remove a region. Returns false when it does not exist.
    pub fn delete(&self, world: &WorldId, id: RegionId) -> Result<bool, RegionError> {
        if self.get(world, id).is_none() {
            return Ok(false);
        }
        let removed = self.mutate(world, |regions| Ok(regions.remove(&id)))?;
        let Some(region) = removed else {
            return Ok(false);
        };
        info!(world = %world, %id, "deleted region");
        let hooks = self
            .delete_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for hook in hooks.iter() {
            hook(world, &region);
        }
        Ok(true)
    }

    pub fn get(&self, world: &WorldId, id: RegionId) -> Option<Region> {
        self.read(world, |regions| regions.get(&id).cloned())
    }

    /// Case-insensitive lookup by name.
    pub fn find_by_name(&self, world: &WorldId, name: &str) -> Option<Region> {
        self.read(world, |regions| find_named(regions, name.trim()).cloned())
    }

    /// Every region in the world, ordered by id.
    pub fn regions(&self, world: &WorldId) -> Vec<Region> {
        self.read(world, |regions| regions.values().cloned().collect())
    }

    /// Regions whose effective box contains `point`.
    pub fn containment_query(&self, world: &WorldId, point: BlockPos) -> Vec<Region> {
        self.read(world, |regions| {
            regions
                .values()
                .filter(|region| region.contains(point))
                .cloned()
                .collect()
        })
    }

    /// Containing region with the smallest corner box, ties broken by lowest id.
    pub fn smallest_containing(&self, world: &WorldId, point: BlockPos) -> Option<Region> {
        self.containment_query(world, point)
            .into_iter()
            .min_by_key(|region| (region.corner_bounds().volume(), region.id))
    }

    /// Regions whose effective box lies within `radius` of `point`, nearest first.
    pub fn nearest_within_distance(
        &self,
        world: &WorldId,
        point: BlockPos,
        radius: u32,
    ) -> Vec<Region> {
        let limit = u128::from(radius) * u128::from(radius);
        let mut hits: Vec<(u128, Region)> = self.read(world, |regions| {
            regions
                .values()
                .filter_map(|region| {
                    let distance = region.bounds().distance_squared(point);
                    (distance <= limit).then(|| (distance, region.clone()))
                })
                .collect()
        });
        hits.sort_by_key(|(distance, region)| (*distance, region.id));
        hits.into_iter().map(|(_, region)| region).collect()
    }

    pub fn has_flag(&self, world: &WorldId, id: RegionId, flag: &str) -> bool {
        self.read(world, |regions| {
            regions.get(&id).is_some_and(|region| region.has_flag(flag))
        })
    }

    /// Permission answer for `flag` at `point`.
    pub fn flag_state(&self, world: &WorldId, point: BlockPos, flag: &str) -> FlagState {
        let containing = self.containment_query(world, point);
        if containing.is_empty() {
            FlagState::Unregulated
        } else if containing.iter().any(|region| region.has_flag(flag)) {
            FlagState::Allowed
        } else {
            FlagState::Denied
        }
    }

    /// Replace the in-memory regions of `world` with the backend's snapshot.
    ///
    /// Records with an empty name, a foreign world, or an id or name already
    /// taken are logged and skipped.
    pub fn load_world(&self, world: &WorldId) -> anyhow::Result<LoadReport> {
        let Some(backend) = &self.backend else {
            return Ok(LoadReport::default());
        };
        let loaded = backend
            .load_regions(world)
            .with_context(|| format!("loading regions of {world}"))?;

        let mut report = LoadReport {
            loaded: 0,
            skipped: loaded.skipped,
        };
        let mut regions = WorldRegions::new();
        let mut names = HashSet::new();
        for mut region in loaded.records {
            region.name = region.name.trim().to_string();
            let following_id = region.id.0.checked_add(1);
            let reason = if region.name.is_empty() {
                Some("empty name")
            } else if following_id.is_none() {
                Some("id out of range")
            } else if &region.world != world {
                Some("belongs to another world")
            } else if regions.contains_key(&region.id) {
                Some("duplicate id")
            } else if !names.insert(region.name.to_ascii_lowercase()) {
                Some("duplicate name")
            } else {
                None
            };
            let (None, Some(following_id)) = (reason, following_id) else {
                warn!(
                    world = %world,
                    id = %region.id,
                    name = %region.name,
                    reason = reason.unwrap_or("id out of range"),
                    "skipping region record"
                );
                report.skipped += 1;
                continue;
            };
            region.flags = region.flags.iter().map(|f| normalize_flag(f)).collect();
            self.next_id.fetch_max(following_id, Ordering::Relaxed);
            regions.insert(region.id, region);
        }
        report.loaded = regions.len();

        let lock = self.world(world);
        *lock.write().unwrap_or_else(PoisonError::into_inner) = regions;
        info!(world = %world, loaded = report.loaded, skipped = report.skipped, "loaded regions");
        Ok(report)
    }
}

fn find_named<'a>(regions: &'a WorldRegions, name: &str) -> Option<&'a Region> {
    regions
        .values()
        .find(|region| region.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{write_raw_records, RecordFileStore};
    use crate::region::{FLAG_BREAK, FLAG_VERTICAL};

    fn overworld() -> WorldId {
        WorldId::from("overworld")
    }

    fn cube(store: &RegionStore, name: &str, lo: i32, hi: i32) -> Region {
        store
            .create(
                &overworld(),
                name,
                BlockPos::new(lo, lo, lo),
                BlockPos::new(hi, hi, hi),
            )
            .unwrap()
    }

    #[test]
    fn duplicate_names_are_rejected_case_insensitively() {
        let store = RegionStore::in_memory();
        cube(&store, "Spawn", 0, 9);
        let err = store
            .create(&overworld(), "spawn", BlockPos::default(), BlockPos::default())
            .unwrap_err();
        assert!(matches!(err, RegionError::DuplicateName { .. }));
        assert_eq!(store.regions(&overworld()).len(), 1);
        // Other worlds keep their own namespace.
        assert!(store
            .create(&WorldId::from("nether"), "spawn", BlockPos::default(), BlockPos::default())
            .is_ok());
    }

    #[test]
    fn empty_names_and_incomplete_selections_fail() {
        let store = RegionStore::in_memory();
        assert!(matches!(
            store.create(&overworld(), "  ", BlockPos::default(), BlockPos::default()),
            Err(RegionError::InvalidName)
        ));
        assert!(matches!(
            store.claim(&overworld(), "x", &Selection::default()),
            Err(RegionError::Selection(_))
        ));
    }

    #[test]
    fn unbounded_vertical_scenario() {
        let store = RegionStore::in_memory();
        let region = cube(&store, "pit", 0, 9);
        let inside = store.containment_query(&overworld(), BlockPos::new(5, 500, 5));
        assert_eq!(inside, vec![region.clone()]);
        assert!(store
            .containment_query(&overworld(), BlockPos::new(15, 5, 5))
            .is_empty());

        assert!(store.toggle_flag(&overworld(), region.id, "VERTICAL").unwrap());
        assert!(store
            .containment_query(&overworld(), BlockPos::new(5, 500, 5))
            .is_empty());
    }

    #[test]
    fn toggling_twice_restores_membership() {
        let store = RegionStore::in_memory();
        let region = cube(&store, "a", 0, 3);
        assert!(store.toggle_flag(&overworld(), region.id, " Break ").unwrap());
        assert!(store.has_flag(&overworld(), region.id, FLAG_BREAK));
        assert!(!store.toggle_flag(&overworld(), region.id, "break").unwrap());
        assert_eq!(store.get(&overworld(), region.id).unwrap().flags, region.flags);
        assert!(!store.set_flag(&overworld(), region.id, FLAG_BREAK, false).unwrap());
        assert!(store.set_flag(&overworld(), region.id, FLAG_BREAK, true).unwrap());
    }

    #[test]
    fn flag_state_reflects_containing_regions() {
        let store = RegionStore::in_memory();
        let outer = cube(&store, "outer", 0, 20);
        let inner = cube(&store, "inner", 5, 8);
        let p = BlockPos::new(6, 6, 6);
        assert_eq!(store.flag_state(&overworld(), p, FLAG_BREAK), FlagState::Denied);
        store.toggle_flag(&overworld(), outer.id, FLAG_BREAK).unwrap();
        assert_eq!(store.flag_state(&overworld(), p, FLAG_BREAK), FlagState::Allowed);
        assert_eq!(
            store.flag_state(&overworld(), BlockPos::new(50, 0, 0), FLAG_BREAK),
            FlagState::Unregulated
        );
        assert_eq!(store.smallest_containing(&overworld(), p).unwrap().id, inner.id);
    }

    #[test]
    fn nearest_regions_are_sorted_and_filtered() {
        let store = RegionStore::in_memory();
        let near = cube(&store, "near", 0, 2);
        let far = cube(&store, "far", 10, 12);
        for id in [near.id, far.id] {
            store.toggle_flag(&overworld(), id, FLAG_VERTICAL).unwrap();
        }
        let origin = BlockPos::new(-3, 0, 0);
        let hits = store.nearest_within_distance(&overworld(), origin, 3);
        assert_eq!(hits.iter().map(|r| r.id).collect::<Vec<_>>(), vec![near.id]);
        let hits = store.nearest_within_distance(&overworld(), origin, 40);
        assert_eq!(
            hits.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![near.id, far.id]
        );
    }

    #[test]
    fn delete_is_false_when_missing() {
        let store = RegionStore::in_memory();
        let region = cube(&store, "gone", 0, 1);
        assert!(store.delete(&overworld(), region.id).unwrap());
        assert!(!store.delete(&overworld(), region.id).unwrap());
        assert!(store.find_by_name(&overworld(), "GONE").is_none());
    }

    #[test]
    fn redefine_keeps_identity() {
        let store = RegionStore::in_memory();
        let region = cube(&store, "r", 0, 1);
        let moved = store
            .redefine(&overworld(), region.id, BlockPos::new(100, 0, 100), BlockPos::new(90, 5, 90))
            .unwrap();
        assert_eq!(moved.id, region.id);
        assert!(moved.contains(BlockPos::new(95, 1, 95)));
        assert!(matches!(
            store.redefine(&overworld(), RegionId(999), BlockPos::default(), BlockPos::default()),
            Err(RegionError::NotFound { .. })
        ));
    }

    #[test]
    fn write_through_survives_reload_and_skips_bad_records() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(RecordFileStore::new(dir.path()).unwrap());
        let store = RegionStore::new(backend.clone());
        let a = cube(&store, "a", 0, 4);
        store.toggle_flag(&overworld(), a.id, FLAG_BREAK).unwrap();
        cube(&store, "b", 10, 14);

        let reloaded = RegionStore::new(backend.clone());
        let report = reloaded.load_world(&overworld()).unwrap();
        assert_eq!(report, LoadReport { loaded: 2, skipped: 0 });
        assert!(reloaded.has_flag(&overworld(), a.id, FLAG_BREAK));
        // New ids continue after the loaded ones.
        let c = cube(&reloaded, "c", 20, 21);
        assert!(c.id.0 > a.id.0 + 1);

        let good = bincode::serialize(&a).unwrap();
        let mut unnamed = a.clone();
        unnamed.id = RegionId(77);
        unnamed.name = String::new();
        let unnamed = bincode::serialize(&unnamed).unwrap();
        write_raw_records(
            &backend.regions_path(&overworld()),
            &[b"garbage".to_vec(), good, unnamed],
        )
        .unwrap();
        let report = reloaded.load_world(&overworld()).unwrap();
        assert_eq!(report, LoadReport { loaded: 1, skipped: 2 });
        assert_eq!(reloaded.regions(&overworld()), vec![a]);
    }

    #[test]
    fn record_with_the_last_id_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(RecordFileStore::new(dir.path()).unwrap());
        let store = RegionStore::new(backend.clone());
        let a = cube(&store, "a", 0, 4);
        let mut last = cube(&store, "last", 10, 14);
        last.id = RegionId(u64::MAX);
        write_raw_records(
            &backend.regions_path(&overworld()),
            &[bincode::serialize(&a).unwrap(), bincode::serialize(&last).unwrap()],
        )
        .unwrap();

        let reloaded = RegionStore::new(backend);
        let report = reloaded.load_world(&overworld()).unwrap();
        assert_eq!(report, LoadReport { loaded: 1, skipped: 1 });
        assert_eq!(reloaded.regions(&overworld()), vec![a.clone()]);
        assert!(cube(&reloaded, "next", 20, 21).id.0 > a.id.0);
    }

    #[test]
    fn delete_hooks_see_the_removed_region() {
        let store = RegionStore::in_memory();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.on_delete(Box::new(move |world, region| {
            sink.lock().unwrap().push((world.clone(), region.name.clone()));
        }));
        let a = cube(&store, "a", 0, 4);

        assert!(store.delete(&overworld(), a.id).unwrap());
        assert!(!store.delete(&overworld(), a.id).unwrap());
        assert_eq!(*seen.lock().unwrap(), vec![(overworld(), "a".to_string())]);
    }
}
