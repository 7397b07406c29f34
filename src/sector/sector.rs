//! A sector: one cube of the world grid with its planned and realized structures
//!
//! When a sector is entered its whole plan (biome field plus placement
//! records) is built at once, but no voxels exist yet. Records are realized
//! into [`StructureBody`] instances only once the observer comes within
//! `realize_radius`. Realized bodies are indexed by their world-space geometry
//! bounds; pending records by the sphere they will occupy.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::core::arena::Arena;
use crate::core::types::Result;
use crate::generation::archetype::ArchetypeTable;
use crate::generation::asteroid_gen::build_asteroid;
use crate::generation::biome_gen::BiomeField;
use crate::generation::config::GenerationConfig;
use crate::generation::hash::{hash_ivec3, hash_vec3, mix64};
use crate::generation::placement::{plan_placements, PlacementId, PlacementRecord};
use crate::math::{Aabb, Ray};
use crate::persist::archive::SectorArchive;
use crate::sector::coord::SectorCoord;
use crate::sector::render::{ChunkRenderer, MaterialHandle, ViewState};
use crate::spatial::{LooseOctree, OctreeConfig};
use crate::voxel::block::{Block, BlockRegistry};
use crate::voxel::hooks::BlockHooks;
use crate::voxel::lod::{LodBuildResult, LodBuilder, LodConfig};
use crate::voxel::structure::{DamageOutcome, HitInfo, StructureBody, StructureConfig, StructureId};

/// Sector grid and streaming distances.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectorConfig {
    /// Edge length of a sector cube
    pub size: f32,
    /// Pending records closer than this to the observer are realized
    pub realize_radius: f32,
    /// Distance to a sector face at which the neighbour's plan is prefetched
    pub prefetch_margin: f32,
}

impl Default for SectorConfig {
    fn default() -> Self {
        Self {
            size: 2048.0,
            realize_radius: 384.0,
            prefetch_margin: 256.0,
        }
    }
}

/// Everything a sector needs from the world, shared between sectors.
#[derive(Clone, Debug)]
pub struct SectorContext {
    pub generation: GenerationConfig,
    pub sector: SectorConfig,
    pub structure: StructureConfig,
    pub lod: LodConfig,
    pub octree: OctreeConfig,
    pub registry: Arc<BlockRegistry>,
    pub archetypes: Arc<ArchetypeTable>,
}

/// The generated but unrealized contents of a sector.
///
/// Pure function of the world seed, the coordinate and the generation
/// parameters, so it can be built on a worker thread.
#[derive(Clone, Debug, PartialEq)]
pub struct SectorPlan {
    pub coord: SectorCoord,
    pub biome_field: BiomeField,
    pub records: Vec<PlacementRecord>,
}

impl SectorPlan {
    pub fn generate(
        coord: SectorCoord,
        generation: &GenerationConfig,
        sector: &SectorConfig,
        archetypes: &ArchetypeTable,
    ) -> Self {
        let bounds = coord.bounds(sector.size);
        let biome_field = BiomeField::generate(bounds, generation);
        let sector_seed = hash_ivec3(generation.seed, coord.0);
        let records = plan_placements(&bounds, sector_seed, generation, &biome_field, archetypes);
        log::debug!("planned sector {:?}: {} placements", coord.0, records.len());
        Self {
            coord,
            biome_field,
            records,
        }
    }
}

/// Lifecycle of one placement record.
#[derive(Clone, Debug, PartialEq)]
pub enum SectorEntry {
    Pending(PlacementRecord),
    Generated(StructureId),
    /// Mined out, or failed to build; never regenerated
    Removed,
}

pub struct Sector {
    coord: SectorCoord,
    context: Arc<SectorContext>,
    biome_field: BiomeField,
    structures: Arena<StructureBody>,
    structure_index: LooseOctree<StructureId>,
    pending_index: LooseOctree<PlacementId>,
    entries: BTreeMap<PlacementId, SectorEntry>,
}

impl Sector {
    /// Plan a sector synchronously.
    pub fn new(coord: SectorCoord, context: Arc<SectorContext>) -> Self {
        let plan = SectorPlan::generate(coord, &context.generation, &context.sector, &context.archetypes);
        Self::from_plan(plan, context)
    }

    /// Take over a plan built elsewhere (typically a prefetch).
    pub fn from_plan(plan: SectorPlan, context: Arc<SectorContext>) -> Self {
        let size = context.sector.size;
        let center = plan.coord.bounds(size).center();
        let mut pending_index = LooseOctree::new(size, center, context.octree);
        let mut entries = BTreeMap::new();
        for record in plan.records {
            if !pending_index.add(record.id, record.bounds()) {
                log::error!("sector {:?}: could not index placement {:?}", plan.coord.0, record.id);
                continue;
            }
            entries.insert(record.id, SectorEntry::Pending(record));
        }

        Self {
            coord: plan.coord,
            biome_field: plan.biome_field,
            structures: Arena::new(),
            structure_index: LooseOctree::new(size, center, context.octree),
            pending_index,
            entries,
            context,
        }
    }

    pub fn coord(&self) -> SectorCoord {
        self.coord
    }

    pub fn bounds(&self) -> Aabb {
        self.coord.bounds(self.context.sector.size)
    }

    pub fn context(&self) -> &Arc<SectorContext> {
        &self.context
    }

    pub fn biome_field(&self) -> &BiomeField {
        &self.biome_field
    }

    pub fn structure(&self, id: StructureId) -> Option<&StructureBody> {
        self.structures.get(id)
    }

    pub fn structures(&self) -> impl Iterator<Item = (StructureId, &StructureBody)> {
        self.structures.iter()
    }

    pub fn structure_count(&self) -> usize {
        self.structures.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending_index.len()
    }

    pub fn entry(&self, id: PlacementId) -> Option<&SectorEntry> {
        self.entries.get(&id)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&PlacementId, &SectorEntry)> {
        self.entries.iter()
    }

    /// Realize every pending record near the observer. Returns how many
    /// structures were built.
    pub fn update(&mut self, observer: Vec3) -> usize {
        let mut near = HashSet::new();
        self.pending_index
            .find_in_radius(observer, self.context.sector.realize_radius, &mut near);
        let mut near: Vec<PlacementId> = near.into_iter().collect();
        near.sort();
        near.into_iter().filter(|id| self.realize(*id).is_some()).count()
    }

    /// Build the structure for one pending record.
    pub fn realize(&mut self, id: PlacementId) -> Option<StructureId> {
        let record = match self.entries.get(&id) {
            Some(SectorEntry::Pending(record)) => record.clone(),
            _ => return None,
        };
        self.pending_index.remove(&id);

        let context = Arc::clone(&self.context);
        let Some(archetype) = context.archetypes.get(&record.archetype) else {
            log::warn!("placement {:?}: unknown archetype {:?}", id, record.archetype);
            self.entries.insert(id, SectorEntry::Removed);
            return None;
        };

        let built = self.structures.try_insert_with(|sid| {
            build_asteroid(
                sid,
                &record,
                archetype,
                Arc::clone(&context.registry),
                context.structure.clone(),
                context.octree,
            )
        });
        match built {
            Ok(sid) if self.is_massless(sid) => {
                log::warn!("placement {:?} built a massless body, dropping it", id);
                self.structures.remove(sid);
                self.entries.insert(id, SectorEntry::Removed);
                None
            }
            Ok(sid) => {
                self.index_structure(sid);
                self.entries.insert(id, SectorEntry::Generated(sid));
                log::debug!("realized {} {:?} as {:?}", record.archetype, id, sid);
                Some(sid)
            }
            Err(e) => {
                log::error!("placement {:?} failed to build: {}", id, e);
                self.entries.insert(id, SectorEntry::Removed);
                None
            }
        }
    }

    /// Start a player-built structure from a single block.
    ///
    /// Refused for air or when a realized structure already has a solid block
    /// at `world_pos`.
    pub fn create_structure(&mut self, world_pos: Vec3, block: Block, hooks: &mut dyn BlockHooks) -> Option<StructureId> {
        if block.is_air() {
            return None;
        }
        if let Some(existing) = self.solid_structure_at(world_pos) {
            log::warn!("cannot start a structure inside {:?}", existing);
            return None;
        }

        let context = Arc::clone(&self.context);
        let uid = self.player_uid(world_pos);
        let sid = self.structures.insert_with(|sid| {
            let mut body = StructureBody::new(
                sid,
                world_pos.floor(),
                Arc::clone(&context.registry),
                context.structure.clone(),
                context.octree,
            );
            body.set_uid(uid);
            body
        });
        let placed = self
            .structures
            .get_mut(sid)
            .is_some_and(|body| body.try_place_block(world_pos, block, hooks));
        if !placed {
            self.structures.remove(sid);
            return None;
        }
        self.index_structure(sid);
        log::debug!("player structure {:?} started at {}", sid, world_pos);
        Some(sid)
    }

    pub fn try_place_block(
        &mut self,
        structure: StructureId,
        world_pos: Vec3,
        block: Block,
        hooks: &mut dyn BlockHooks,
    ) -> bool {
        let Some(body) = self.structures.get_mut(structure) else {
            return false;
        };
        let placed = body.try_place_block(world_pos, block, hooks);
        if placed {
            self.index_structure(structure);
        }
        placed
    }

    /// Remove a block; a structure left without mass is dropped from the sector.
    pub fn try_remove_block(
        &mut self,
        structure: StructureId,
        world_pos: Vec3,
        normal: Vec3,
        spawn_drop: bool,
        hooks: &mut dyn BlockHooks,
    ) -> bool {
        let Some(body) = self.structures.get_mut(structure) else {
            return false;
        };
        let removed = body.try_remove_block(world_pos, normal, spawn_drop, hooks);
        if removed {
            self.after_structure_edit(structure);
        }
        removed
    }

    pub fn damage_block(
        &mut self,
        structure: StructureId,
        world_pos: Vec3,
        normal: Vec3,
        amount: u8,
        hooks: &mut dyn BlockHooks,
    ) -> DamageOutcome {
        let Some(body) = self.structures.get_mut(structure) else {
            return DamageOutcome::Missed;
        };
        let outcome = body.damage_block(world_pos, normal, amount, hooks);
        if matches!(outcome, DamageOutcome::Destroyed(_)) {
            self.after_structure_edit(structure);
        }
        outcome
    }

    /// Nearest block hit across all realized structures.
    pub fn raycast(&self, ray: &Ray, max_distance: f32) -> Option<(StructureId, HitInfo)> {
        let mut best: Option<(StructureId, HitInfo)> = None;
        for (sid, t_enter) in self.structure_index.find_on_ray(ray, max_distance) {
            if best.is_some_and(|(_, hit)| hit.distance <= t_enter) {
                break;
            }
            let Some(hit) = self.structures.get(sid).and_then(|b| b.raycast(ray, max_distance)) else {
                continue;
            };
            if best.is_none_or(|(_, b)| hit.distance < b.distance) {
                best = Some((sid, hit));
            }
        }
        best
    }

    /// Structure whose geometry bounds contain `point`, preferring one with
    /// a solid block right there.
    pub fn structure_at(&self, point: Vec3) -> Option<StructureId> {
        let mut candidates = self.structure_index.find_all_at_point(point);
        candidates.sort();
        self.solid_structure_at(point).or(candidates.first().copied())
    }

    pub fn structures_in_radius(&self, center: Vec3, radius: f32) -> Vec<StructureId> {
        let mut found = HashSet::new();
        self.structure_index.find_in_radius(center, radius, &mut found);
        let mut found: Vec<StructureId> = found.into_iter().collect();
        found.sort();
        found
    }

    /// Structure whose gravity well holds `point`: the nearest centre of
    /// mass among those within their gravity radius.
    /// Live structure with the given persistent uid.
    pub fn structure_by_uid(&self, uid: u64) -> Option<StructureId> {
        self.structures
            .iter()
            .find(|(_, body)| body.uid() == uid)
            .map(|(sid, _)| sid)
    }

    pub fn gravity_source(&self, point: Vec3) -> Option<StructureId> {
        self.structures
            .iter()
            .filter_map(|(sid, body)| {
                let distance = body.center_of_mass().distance(point);
                (distance <= body.gravity_radius()).then_some((sid, distance))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(sid, _)| sid)
    }

    /// Draw every structure in view. Returns the number of chunk draws.
    pub fn render(
        &mut self,
        view: &ViewState,
        lighting: Option<u8>,
        builder: &mut LodBuilder,
        renderer: &mut dyn ChunkRenderer,
        material: MaterialHandle,
    ) -> usize {
        let mut visible = HashSet::new();
        self.structure_index
            .find_in_radius(view.position, view.view_distance, &mut visible);
        let mut visible: Vec<StructureId> = visible
            .into_iter()
            .filter(|sid| self.structure_index.bounds_of(sid).is_some_and(|b| view.sees(&b)))
            .collect();
        visible.sort();

        let lod = self.context.lod.clone();
        let mut draws = 0;
        for sid in visible {
            if let Some(body) = self.structures.get_mut(sid) {
                draws += body.render(view, &lod, lighting, builder, renderer, material);
            }
        }
        draws
    }

    pub fn apply_lod_result(&mut self, result: LodBuildResult) -> bool {
        match self.structures.get_mut(result.structure) {
            Some(body) => body.apply_lod_result(result),
            None => {
                log::debug!("dropping LOD result for removed structure {:?}", result.structure);
                false
            }
        }
    }

    /// Keep what re-planning cannot reproduce: modified and player-built
    /// structures, plus the ids of records that must not come back.
    pub fn archive(&self) -> Result<SectorArchive> {
        let mut archive = SectorArchive::new();
        for (_, body) in self.structures.iter() {
            if body.is_modified() || body.placement().is_none() {
                archive.add_structure(&body.snapshot())?;
                if let Some(placement) = body.placement() {
                    archive.mark_realized(placement);
                }
            }
        }
        for (id, entry) in &self.entries {
            if *entry == SectorEntry::Removed {
                archive.mark_realized(*id);
            }
        }
        Ok(archive)
    }

    /// Bring back archived edits into a freshly planned sector.
    pub fn restore(&mut self, archive: &SectorArchive) -> Result<()> {
        let snapshots = archive.decode_structures()?;
        for id in archive.realized() {
            self.pending_index.remove(&id);
            self.entries.insert(id, SectorEntry::Removed);
        }

        let context = Arc::clone(&self.context);
        for snapshot in snapshots {
            let placement = snapshot.placement;
            let restored = self.structures.try_insert_with(|sid| {
                StructureBody::from_snapshot(
                    sid,
                    snapshot,
                    Arc::clone(&context.registry),
                    context.structure.clone(),
                    context.octree,
                )
            });
            let sid = match restored {
                Ok(sid) => sid,
                Err(e) => {
                    log::error!("sector {:?}: dropping unreadable structure: {}", self.coord.0, e);
                    if let Some(placement) = placement {
                        self.pending_index.remove(&PlacementId(placement));
                        self.entries.insert(PlacementId(placement), SectorEntry::Removed);
                    }
                    continue;
                }
            };
            if self.is_massless(sid) {
                self.structures.remove(sid);
                continue;
            }
            self.index_structure(sid);
            if let Some(placement) = self.structures.get(sid).and_then(|b| b.placement()) {
                self.entries.insert(placement, SectorEntry::Generated(sid));
            }
        }
        log::debug!(
            "restored sector {:?}: {} structures, {} settled placements",
            self.coord.0,
            archive.structure_count(),
            archive.realized().count()
        );
        Ok(())
    }

    fn solid_structure_at(&self, point: Vec3) -> Option<StructureId> {
        let mut candidates = self.structure_index.find_all_at_point(point);
        candidates.sort();
        candidates.into_iter().find(|sid| {
            self.structures
                .get(*sid)
                .and_then(|b| b.get_block(point))
                .is_some_and(|b| !b.is_air())
        })
    }

    /// Uid for a player-built body started at `world_pos`. Derived from the
    /// sector and position, rehashed past any uid already in use here.
    fn player_uid(&self, world_pos: Vec3) -> u64 {
        let sector_seed = hash_ivec3(self.context.generation.seed, self.coord.0);
        let mut uid = hash_vec3(sector_seed, world_pos.floor());
        while self.structure_by_uid(uid).is_some() || self.entries.contains_key(&PlacementId(uid)) {
            uid = mix64(uid);
        }
        uid
    }

    /// A body with no chunks or no mass has nothing left to hold it in the sector.
    fn is_massless(&self, structure: StructureId) -> bool {
        self.structures
            .get(structure)
            .is_some_and(|b| b.is_empty() || b.total_mass() <= 0.0)
    }

    fn after_structure_edit(&mut self, structure: StructureId) {
        if self.is_massless(structure) {
            self.remove_structure(structure);
        } else {
            self.index_structure(structure);
        }
    }

    fn remove_structure(&mut self, structure: StructureId) {
        let Some(body) = self.structures.remove(structure) else {
            return;
        };
        self.structure_index.remove(&structure);
        if let Some(placement) = body.placement() {
            self.entries.insert(placement, SectorEntry::Removed);
        }
        log::debug!("structure {:?} lost its mass and was removed", structure);
    }

    /// Re-key a structure in the index after its geometry changed.
    fn index_structure(&mut self, structure: StructureId) {
        let Some(bounds) = self.structures.get(structure).and_then(|b| b.geometry_bounds()) else {
            self.structure_index.remove(&structure);
            return;
        };
        if !self.structure_index.relocate(structure, bounds) {
            log::error!("sector {:?}: could not index structure {:?}", self.coord.0, structure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::biome_gen::Biome;
    use crate::sector::render::DrawRecorder;
    use crate::voxel::block::ids;
    use crate::voxel::hooks::{NoHooks, RecordingHooks};

    fn context() -> Arc<SectorContext> {
        Arc::new(SectorContext {
            generation: GenerationConfig {
                biome_frequency: 0.01,
                ..Default::default()
            },
            sector: SectorConfig {
                size: 1024.0,
                realize_radius: 64.0,
                prefetch_margin: 128.0,
            },
            structure: StructureConfig::default(),
            lod: LodConfig::default(),
            octree: OctreeConfig::default(),
            registry: Arc::new(BlockRegistry::default()),
            archetypes: Arc::new(ArchetypeTable::default()),
        })
    }

    fn stone(sector: &Sector) -> Block {
        sector.context().registry.create(ids::STONE)
    }

    #[test]
    fn test_plan_is_deterministic() {
        let ctx = context();
        let a = Sector::new(SectorCoord::new(1, 0, -2), Arc::clone(&ctx));
        let b = Sector::new(SectorCoord::new(1, 0, -2), Arc::clone(&ctx));
        assert_eq!(a.biome_field(), b.biome_field());
        let ids_a: Vec<_> = a.entries().map(|(id, e)| (*id, e.clone())).collect();
        let ids_b: Vec<_> = b.entries().map(|(id, e)| (*id, e.clone())).collect();
        assert_eq!(ids_a, ids_b);
        assert!(!ids_a.is_empty());
        assert_eq!(a.pending_count(), ids_a.len());
        assert_eq!(a.structure_count(), 0);

        let other = Sector::new(SectorCoord::new(2, 0, -2), ctx);
        let ids_other: Vec<_> = other.entries().map(|(id, _)| *id).collect();
        assert_ne!(ids_a.iter().map(|(id, _)| *id).collect::<Vec<_>>(), ids_other);
    }

    #[test]
    fn test_records_lie_inside_and_match_biomes() {
        let sector = Sector::new(SectorCoord::new(0, 0, 0), context());
        for (_, entry) in sector.entries() {
            let SectorEntry::Pending(record) = entry else {
                panic!("fresh sector has non-pending entry {:?}", entry);
            };
            assert!(sector.bounds().contains_point(record.position));
            assert_ne!(record.biome, Biome::Void);
            assert_eq!(record.biome, sector.biome_field().sample(record.position));
        }
    }

    #[test]
    fn test_update_realizes_nearby_records_once() {
        let mut sector = Sector::new(SectorCoord::new(0, 0, 0), context());
        let record = match sector.entries().next() {
            Some((_, SectorEntry::Pending(record))) => record.clone(),
            other => panic!("unexpected entry {:?}", other),
        };
        let pending_before = sector.pending_count();

        let built = sector.update(record.position);
        assert!(built >= 1);
        assert_eq!(sector.pending_count(), pending_before - built);
        let Some(SectorEntry::Generated(sid)) = sector.entry(record.id).cloned() else {
            panic!("record was not realized");
        };
        let body = sector.structure(sid).unwrap();
        assert_eq!(body.placement(), Some(record.id));
        assert!(body.total_mass() > 0.0);
        assert_eq!(sector.structure_at(record.position + Vec3::splat(0.5)), Some(sid));
        assert!(sector.structures_in_radius(record.position, 1.0).contains(&sid));
        assert_eq!(sector.gravity_source(record.position), Some(sid));

        assert_eq!(sector.update(record.position), 0);
        assert_eq!(sector.structure_count(), built);
    }

    #[test]
    fn test_unknown_archetype_is_retired() {
        let ctx = context();
        let record = PlacementRecord {
            id: PlacementId(5),
            position: Vec3::splat(100.0),
            radius: 8.0,
            archetype: "missing".to_string(),
            biome: Biome::RockField,
        };
        let plan = SectorPlan {
            coord: SectorCoord::new(0, 0, 0),
            biome_field: BiomeField::generate(SectorCoord::new(0, 0, 0).bounds(1024.0), &ctx.generation),
            records: vec![record.clone()],
        };
        let mut sector = Sector::from_plan(plan, ctx);
        assert_eq!(sector.update(record.position), 0);
        assert_eq!(sector.entry(record.id), Some(&SectorEntry::Removed));
        assert_eq!(sector.pending_count(), 0);
        assert_eq!(sector.structure_count(), 0);
    }

    #[test]
    fn test_player_structure_lifecycle() {
        let mut sector = Sector::new(SectorCoord::new(0, 0, 0), context());
        let block = stone(&sector);
        let mut hooks = RecordingHooks::default();
        let at = Vec3::new(10.5, 10.5, 10.5);

        assert!(sector.create_structure(at, Block::AIR, &mut hooks).is_none());
        let sid = sector.create_structure(at, block, &mut hooks).unwrap();
        assert_eq!(sector.structure_count(), 1);
        // Occupied.
        assert!(sector.create_structure(at, block, &mut hooks).is_none());
        let uid = sector.structure(sid).unwrap().uid();
        assert_eq!(sector.structure_by_uid(uid), Some(sid));

        let single = sector.structure(sid).unwrap().total_mass();
        assert!(sector.try_place_block(sid, at + Vec3::X, block, &mut hooks));
        assert!((sector.structure(sid).unwrap().total_mass() - 2.0 * single).abs() < 1e-4);
        assert_eq!(sector.structure_at(at + Vec3::X), Some(sid));

        assert!(sector.try_remove_block(sid, at + Vec3::X, Vec3::X, true, &mut hooks));
        assert!(sector.structure(sid).is_some());
        assert!(sector.try_remove_block(sid, at, Vec3::Y, true, &mut hooks));
        assert!(sector.structure(sid).is_none());
        assert_eq!(sector.structure_count(), 0);
        assert!(sector.structure_at(at).is_none());
        assert_eq!(hooks.drops.len(), 2);
        assert!(!sector.try_remove_block(sid, at, Vec3::Y, true, &mut hooks));
    }

    #[test]
    fn test_unregistered_blocks_never_keep_a_body_alive() {
        let mut sector = Sector::new(SectorCoord::new(0, 0, 0), context());
        let at = Vec3::new(40.5, 40.5, 40.5);
        let unknown = Block::new(99);

        assert!(sector.create_structure(at, unknown, &mut NoHooks).is_none());
        assert_eq!(sector.structure_count(), 0);

        let sid = sector.create_structure(at, stone(&sector), &mut NoHooks).unwrap();
        assert!(!sector.try_place_block(sid, at + Vec3::X, unknown, &mut NoHooks));
        assert!(sector.structure(sid).unwrap().get_block(at + Vec3::X).is_none_or(|b| b.is_air()));

        assert!(sector.try_remove_block(sid, at, Vec3::Y, false, &mut NoHooks));
        assert!(sector.structure(sid).is_none());
        assert!(sector.structure_at(at).is_none());
        assert!(sector.gravity_source(at).is_none());
    }

    #[test]
    fn test_raycast_picks_nearest_structure() {
        let mut sector = Sector::new(SectorCoord::new(0, 0, 0), context());
        let block = stone(&sector);
        let near = sector.create_structure(Vec3::new(10.5, 10.5, 10.5), block, &mut NoHooks).unwrap();
        let far = sector.create_structure(Vec3::new(30.5, 10.5, 10.5), block, &mut NoHooks).unwrap();
        assert_ne!(near, far);

        let ray = Ray::new(Vec3::new(0.0, 10.5, 10.5), Vec3::X);
        let (sid, hit) = sector.raycast(&ray, 100.0).unwrap();
        assert_eq!(sid, near);
        assert!((hit.distance - 10.0).abs() < 1e-3);

        let back = Ray::new(Vec3::new(50.0, 10.5, 10.5), -Vec3::X);
        assert_eq!(sector.raycast(&back, 100.0).map(|(s, _)| s), Some(far));
        assert!(sector.raycast(&ray, 5.0).is_none());
    }

    #[test]
    fn test_render_draws_visible_structures() {
        let mut sector = Sector::new(SectorCoord::new(0, 0, 0), context());
        let block = stone(&sector);
        sector.create_structure(Vec3::new(10.5, 10.5, 10.5), block, &mut NoHooks).unwrap();
        let mut builder = LodBuilder::new(Arc::clone(&sector.context().registry));
        let mut recorder = DrawRecorder::default();

        let view = ViewState::new(Vec3::new(0.0, 10.0, 10.0), 200.0);
        let draws = sector.render(&view, None, &mut builder, &mut recorder, MaterialHandle(3));
        assert_eq!(draws, 1);
        assert_eq!(recorder.total_quads(), 6);
        assert_eq!(recorder.draws[0].material, MaterialHandle(3));

        recorder.clear();
        let away = ViewState::new(Vec3::splat(900.0), 100.0);
        assert_eq!(sector.render(&away, None, &mut builder, &mut recorder, MaterialHandle(3)), 0);
        assert!(recorder.draws.is_empty());
    }

    #[test]
    fn test_archive_and_restore() {
        let ctx = context();
        let coord = SectorCoord::new(0, 0, 0);
        let mut sector = Sector::new(coord, Arc::clone(&ctx));
        let block = stone(&sector);

        let records: Vec<PlacementRecord> = sector
            .entries()
            .filter_map(|(_, e)| match e {
                SectorEntry::Pending(r) => Some(r.clone()),
                _ => None,
            })
            .take(2)
            .collect();
        assert_eq!(records.len(), 2, "sector plan too small for this test");
        let (mined, untouched) = (&records[0], &records[1]);

        let mined_sid = sector.realize(mined.id).unwrap();
        let untouched_sid = sector.realize(untouched.id).unwrap();
        let center = mined.position + Vec3::splat(0.5);
        assert!(sector.try_remove_block(mined_sid, center, Vec3::Y, false, &mut NoHooks));
        let mined_mass = sector.structure(mined_sid).unwrap().total_mass();
        assert!(!sector.structure(untouched_sid).unwrap().is_modified());

        let player = Vec3::new(3.5, 3.5, 3.5);
        let player_sid = sector.create_structure(player, block, &mut NoHooks).unwrap();
        let player_uid = sector.structure(player_sid).unwrap().uid();
        assert_ne!(player_uid, 0);
        assert_eq!(sector.structure(mined_sid).unwrap().uid(), mined.id.0);

        let archive = sector.archive().unwrap();
        assert_eq!(archive.structure_count(), 2);
        assert!(archive.is_realized(mined.id));
        assert!(!archive.is_realized(untouched.id));

        let mut restored = Sector::new(coord, ctx);
        restored.restore(&archive).unwrap();
        assert_eq!(restored.structure_count(), 2);
        let Some(SectorEntry::Generated(sid)) = restored.entry(mined.id).cloned() else {
            panic!("mined structure not restored");
        };
        let body = restored.structure(sid).unwrap();
        assert!(body.is_modified());
        assert!((body.total_mass() - mined_mass).abs() <= mined_mass * 1e-4);
        assert!(body.get_block(center).is_none_or(|b| b.is_air()));
        // Never realized twice.
        assert!(restored.realize(mined.id).is_none());
        // Untouched records come back from the plan.
        assert!(matches!(restored.entry(untouched.id), Some(SectorEntry::Pending(_))));
        assert!(restored.structure_at(player).is_some());
        let restored_player = restored.structure_by_uid(player_uid).unwrap();
        assert_eq!(restored.structure(restored_player).unwrap().placement(), None);
        assert_eq!(restored.structure_by_uid(mined.id.0), Some(sid));
    }
}
