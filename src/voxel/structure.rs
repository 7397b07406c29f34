//! Structure body: a rigid bag of chunks with derived physical properties
//!
//! Voxel coordinates are structure-local and signed; `position` is the world
//! location of local voxel (0, 0, 0). Chunks live in a generational arena
//! and are indexed both by chunk index and in a local loose octree used for
//! ray and box queries.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::core::arena::{Arena, Handle};
use crate::core::types::Result;
use crate::core::Error;
use crate::generation::placement::PlacementId;
use crate::math::{Aabb, Ray};
use crate::persist::snapshot::{ChunkSnapshot, StructureSnapshot, SNAPSHOT_VERSION};
use crate::sector::render::{ChunkDraw, ChunkRenderer, MaterialHandle, ViewState};
use crate::spatial::{LooseOctree, OctreeConfig};
use crate::voxel::block::{Block, BlockRegistry};
use crate::voxel::chunk::{
    chunk_index_of, local_of, Chunk, ChunkId, ChunkNeighborhood, Face, LodAction, CHUNK_SIZE,
};
use crate::voxel::hooks::BlockHooks;
use crate::voxel::lod::{LodBuildRequest, LodBuildResult, LodBuilder, LodConfig};

pub type StructureId = Handle<StructureBody>;

/// Limits and gravity tuning shared by all structures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureConfig {
    /// Largest |chunk index| on any axis; edits beyond it are refused
    pub max_chunk_extent: i32,
    /// Gravity radius = base * mass^exponent + extent terms
    pub gravity_base: f32,
    pub gravity_exponent: f32,
    /// Gravity radius floor
    pub min_gravity_radius: f32,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            max_chunk_extent: 8,
            gravity_base: 4.0,
            gravity_exponent: 0.33,
            min_gravity_radius: 24.0,
        }
    }
}

/// Result of [`StructureBody::raycast`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HitInfo {
    /// World-space hit point
    pub position: Vec3,
    pub chunk: ChunkId,
    pub block: Block,
    /// Structure-local voxel that was hit
    pub voxel: IVec3,
    /// Face normal of the entered face (zero when the ray starts inside a block)
    pub normal: IVec3,
    pub distance: f32,
}

impl HitInfo {
    /// Voxel in front of the hit face, where a block would be built.
    pub fn adjacent_voxel(&self) -> IVec3 {
        self.voxel + self.normal
    }
}

/// Result of [`StructureBody::is_colliding`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CollideInfo {
    pub chunk: ChunkId,
    pub voxel: IVec3,
    /// World-space bounds of the colliding voxel
    pub voxel_bounds: Aabb,
    /// Smallest translation that pushes the volume out of the voxel
    pub penetration: Vec3,
}

/// Result of [`StructureBody::damage_block`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DamageOutcome {
    Missed,
    Damaged { remaining: u8 },
    Destroyed(Block),
}

pub struct StructureBody {
    id: StructureId,
    position: Vec3,
    registry: Arc<BlockRegistry>,
    config: StructureConfig,
    chunks: Arena<Chunk>,
    chunk_map: HashMap<IVec3, ChunkId>,
    chunk_index: LooseOctree<ChunkId>,
    total_mass: f32,
    /// Structure-local
    center_of_mass: Vec3,
    gravity_radius: f32,
    /// Structure-local
    geometry_bounds: Option<Aabb>,
    modified: bool,
    placement: Option<PlacementId>,
    archetype: Option<String>,
    /// Stable across save/load, unlike the arena handle
    uid: u64,
}

impl StructureBody {
    pub fn new(
        id: StructureId,
        position: Vec3,
        registry: Arc<BlockRegistry>,
        config: StructureConfig,
        octree: OctreeConfig,
    ) -> Self {
        let gravity_radius = config.min_gravity_radius;
        Self {
            id,
            position,
            registry,
            config,
            chunks: Arena::new(),
            chunk_map: HashMap::new(),
            chunk_index: LooseOctree::new(CHUNK_SIZE as f32 * 4.0, Vec3::ZERO, octree),
            total_mass: 0.0,
            center_of_mass: Vec3::ZERO,
            gravity_radius,
            geometry_bounds: None,
            modified: false,
            placement: None,
            archetype: None,
            uid: 0,
        }
    }

    pub fn id(&self) -> StructureId {
        self.id
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &StructureConfig {
        &self.config
    }

    pub fn total_mass(&self) -> f32 {
        self.total_mass
    }

    /// World-space centre of mass
    pub fn center_of_mass(&self) -> Vec3 {
        self.position + self.center_of_mass
    }

    pub fn gravity_radius(&self) -> f32 {
        self.gravity_radius
    }

    /// World-space bounds of occupied voxels
    pub fn geometry_bounds(&self) -> Option<Aabb> {
        self.geometry_bounds.map(|b| b.translated(self.position))
    }

    pub fn local_geometry_bounds(&self) -> Option<Aabb> {
        self.geometry_bounds
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    pub fn chunk_at(&self, index: IVec3) -> Option<&Chunk> {
        self.chunk_map.get(&index).and_then(|id| self.chunks.get(*id))
    }

    pub fn chunks(&self) -> impl Iterator<Item = (ChunkId, &Chunk)> {
        self.chunks.iter()
    }

    /// No chunks left; the owning sector removes such bodies.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Edited since it was generated or loaded.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }

    pub fn placement(&self) -> Option<PlacementId> {
        self.placement
    }

    pub fn archetype(&self) -> Option<&str> {
        self.archetype.as_deref()
    }

    /// Remember which placement record this body was realized from.
    /// Record where the body came from. Generated bodies take their
    /// placement id as uid.
    pub fn set_origin(&mut self, placement: Option<PlacementId>, archetype: Option<String>) {
        if let Some(p) = placement {
            self.uid = p.0;
        }
        self.placement = placement;
        self.archetype = archetype;
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn set_uid(&mut self, uid: u64) {
        self.uid = uid;
    }

    pub fn world_to_voxel(&self, world_pos: Vec3) -> IVec3 {
        (world_pos - self.position).floor().as_ivec3()
    }

    /// World-space centre of a structure-local voxel
    pub fn voxel_center(&self, voxel: IVec3) -> Vec3 {
        self.position + voxel.as_vec3() + Vec3::splat(0.5)
    }

    pub fn block_at_voxel(&self, voxel: IVec3) -> Option<Block> {
        self.chunk_at(chunk_index_of(voxel))?.get_block(local_of(voxel))
    }

    pub fn get_block(&self, world_pos: Vec3) -> Option<Block> {
        self.block_at_voxel(self.world_to_voxel(world_pos))
    }

    pub fn within_extent(&self, index: IVec3) -> bool {
        index.abs().max_element() <= self.config.max_chunk_extent
    }

    /// Place a block at a world position, creating the chunk on demand.
    ///
    /// Fails (returns false) for air, an occupied cell, or a position beyond
    /// the structure's maximum extent.
    pub fn try_place_block(&mut self, world_pos: Vec3, block: Block, hooks: &mut dyn BlockHooks) -> bool {
        let voxel = self.world_to_voxel(world_pos);
        self.try_place_voxel(voxel, block, hooks)
    }

    pub fn try_place_voxel(&mut self, voxel: IVec3, block: Block, hooks: &mut dyn BlockHooks) -> bool {
        if block.is_air() {
            return false;
        }
        let index = chunk_index_of(voxel);
        if !self.within_extent(index) {
            log::warn!(
                "refusing block at {:?}: outside structure extent of {} chunks",
                voxel,
                self.config.max_chunk_extent
            );
            return false;
        }

        let chunk_id = match self.chunk_map.get(&index) {
            Some(id) => *id,
            None => self.create_chunk(index),
        };
        let local = local_of(voxel);
        let placed = match self.chunks.get_mut(chunk_id) {
            Some(chunk) => chunk.place_block(local, block, &self.registry, hooks),
            None => false,
        };
        if !placed {
            if self.chunks.get(chunk_id).is_some_and(|c| c.is_empty()) {
                self.destroy_chunk(chunk_id);
            }
            return false;
        }

        self.after_edit(chunk_id, local);
        true
    }

    /// Remove the block at a world position. Emptied chunks are destroyed.
    pub fn try_remove_block(
        &mut self,
        world_pos: Vec3,
        normal: Vec3,
        spawn_drop: bool,
        hooks: &mut dyn BlockHooks,
    ) -> bool {
        let voxel = self.world_to_voxel(world_pos);
        self.try_remove_voxel(voxel, normal, spawn_drop, hooks).is_some()
    }

    pub fn try_remove_voxel(
        &mut self,
        voxel: IVec3,
        normal: Vec3,
        spawn_drop: bool,
        hooks: &mut dyn BlockHooks,
    ) -> Option<Block> {
        let index = chunk_index_of(voxel);
        if !self.within_extent(index) {
            return None;
        }
        let chunk_id = *self.chunk_map.get(&index)?;
        let local = local_of(voxel);
        let chunk = self.chunks.get_mut(chunk_id)?;
        let removed = chunk.remove_block(local, normal, spawn_drop, &self.registry, hooks)?;
        let emptied = chunk.is_empty();

        self.mark_boundary_neighbors(chunk_id, local);
        if emptied {
            self.destroy_chunk(chunk_id);
        }
        self.modified = true;
        self.recompute_properties();
        Some(removed)
    }

    /// Wear down the block at a world position, removing it (with a drop)
    /// once its durability is used up.
    pub fn damage_block(
        &mut self,
        world_pos: Vec3,
        normal: Vec3,
        amount: u8,
        hooks: &mut dyn BlockHooks,
    ) -> DamageOutcome {
        let voxel = self.world_to_voxel(world_pos);
        let Some(&chunk_id) = self.chunk_map.get(&chunk_index_of(voxel)) else {
            return DamageOutcome::Missed;
        };
        let remaining = self
            .chunks
            .get_mut(chunk_id)
            .and_then(|chunk| chunk.damage_block(local_of(voxel), amount));
        match remaining {
            None => DamageOutcome::Missed,
            Some(0) => match self.try_remove_voxel(voxel, normal, true, hooks) {
                Some(block) => DamageOutcome::Destroyed(block),
                None => DamageOutcome::Missed,
            },
            Some(remaining) => {
                self.modified = true;
                DamageOutcome::Damaged { remaining }
            }
        }
    }

    /// Nearest solid block along a world-space ray.
    pub fn raycast(&self, ray: &Ray, max_distance: f32) -> Option<HitInfo> {
        let local_ray = ray.offset(-self.position);
        let mut best: Option<HitInfo> = None;
        for (chunk_id, t_enter) in self.chunk_index.find_on_ray(&local_ray, max_distance) {
            if best.is_some_and(|b| b.distance <= t_enter) {
                break;
            }
            let Some(chunk) = self.chunks.get(chunk_id) else {
                continue;
            };
            let limit = best.map_or(max_distance, |b| b.distance);
            if let Some(hit) = chunk.raycast(ray, limit) {
                best = Some(HitInfo {
                    position: hit.position,
                    chunk: chunk_id,
                    block: hit.block,
                    voxel: chunk.voxel_of(hit.local),
                    normal: hit.normal,
                    distance: hit.distance,
                });
            }
        }
        best
    }

    /// Deepest overlap between a world-space volume and any solid voxel.
    pub fn is_colliding(&self, volume: &Aabb) -> Option<CollideInfo> {
        let local = volume.translated(-self.position);
        let mut candidates = HashSet::new();
        self.chunk_index.find_in_box(&local, &mut candidates);
        let mut candidates: Vec<ChunkId> = candidates.into_iter().collect();
        candidates.sort();

        let mut best: Option<CollideInfo> = None;
        for chunk_id in candidates {
            let Some(chunk) = self.chunks.get(chunk_id) else {
                continue;
            };
            let Some(geometry) = chunk.geometry_bounds() else {
                continue;
            };
            let Some(overlap) = geometry.intersection(&local) else {
                continue;
            };
            let min = overlap.min.floor().as_ivec3();
            let max = overlap.max.ceil().as_ivec3();
            for z in min.z..max.z {
                for y in min.y..max.y {
                    for x in min.x..max.x {
                        let voxel = IVec3::new(x, y, z);
                        let local_voxel = voxel - chunk.index() * CHUNK_SIZE;
                        if chunk.get_block(local_voxel).is_none_or(|b| b.is_air()) {
                            continue;
                        }
                        let cell = Aabb::unit_voxel(voxel);
                        let Some(penetration) = penetration(&local, &cell) else {
                            continue;
                        };
                        let deeper = best.is_none_or(|b| {
                            penetration.length_squared() > b.penetration.length_squared()
                        });
                        if deeper {
                            best = Some(CollideInfo {
                                chunk: chunk_id,
                                voxel,
                                voxel_bounds: cell.translated(self.position),
                                penetration,
                            });
                        }
                    }
                }
            }
        }
        best
    }

    /// Rebuild one chunk's full-detail mesh now.
    pub fn remesh_chunk(&mut self, chunk_id: ChunkId, lighting: Option<u8>) -> bool {
        let Some(chunk) = self.chunks.get(chunk_id) else {
            return false;
        };
        let mut neighborhood = ChunkNeighborhood::default();
        for face in Face::ALL {
            if let Some(neighbor) = chunk.neighbor(face).and_then(|n| self.chunks.get(n)) {
                neighborhood.set(face, neighbor.blocks());
            }
        }
        let built = chunk.generate_mesh(&neighborhood, &self.registry, lighting);
        match self.chunks.get_mut(chunk_id) {
            Some(chunk) => {
                chunk.apply_full_mesh(built);
                true
            }
            None => false,
        }
    }

    /// Force a full rebuild of every dirty chunk. Returns how many were rebuilt.
    pub fn rebuild_dirty_meshes(&mut self, lighting: Option<u8>) -> usize {
        let dirty: Vec<ChunkId> = self
            .chunks
            .iter()
            .filter(|(_, c)| c.needs_remesh())
            .map(|(id, _)| id)
            .collect();
        dirty
            .into_iter()
            .filter(|id| self.remesh_chunk(*id, lighting))
            .count()
    }

    /// Cull chunks against the view, pick LOD tiers, start rebuilds and draw
    /// whatever meshes are ready. Returns the number of draws issued.
    pub fn render(
        &mut self,
        view: &ViewState,
        lod: &LodConfig,
        lighting: Option<u8>,
        builder: &mut LodBuilder,
        renderer: &mut dyn ChunkRenderer,
        material: MaterialHandle,
    ) -> usize {
        let mut visible = HashSet::new();
        self.chunk_index
            .find_in_radius(view.position - self.position, view.view_distance, &mut visible);
        let mut visible: Vec<ChunkId> = visible
            .into_iter()
            .filter(|id| self.chunks.get(*id).is_some_and(|c| view.sees(&c.bounds())))
            .collect();
        visible.sort();

        let mut draws = 0;
        for chunk_id in visible {
            let Some(chunk) = self.chunks.get_mut(chunk_id) else {
                continue;
            };
            let tier = lod.select(chunk.bounds().center().distance_squared(view.position));
            match chunk.request_lod(tier) {
                LodAction::Keep => {}
                LodAction::Remesh => {
                    self.remesh_chunk(chunk_id, lighting);
                }
                LodAction::Downsample(tier) => builder.submit(LodBuildRequest {
                    structure: self.id,
                    chunk: chunk_id,
                    tier,
                    revision: chunk.revision(),
                    blocks: chunk.blocks().to_vec().into_boxed_slice(),
                }),
            }

            let Some(chunk) = self.chunks.get(chunk_id) else {
                continue;
            };
            if let Some(mesh) = chunk.mesh() {
                if !mesh.is_empty() {
                    renderer.draw(ChunkDraw {
                        structure: self.id,
                        chunk: chunk_id,
                        origin: chunk.origin(),
                        tier: chunk.lod().current,
                        mesh,
                        mesh_revision: chunk.mesh_revision(),
                        material,
                    });
                    draws += 1;
                }
            }
        }
        draws
    }

    /// Hand a finished downsampled mesh to its chunk, if still wanted.
    pub fn apply_lod_result(&mut self, result: LodBuildResult) -> bool {
        if result.structure != self.id {
            log::debug!("LOD result for {:?} delivered to {:?}", result.structure, self.id);
            return false;
        }
        match self.chunks.get_mut(result.chunk) {
            Some(chunk) => chunk.apply_lod_result(result.tier, result.revision, result.mesh),
            None => {
                log::debug!("dropping LOD result for removed chunk {:?}", result.chunk);
                false
            }
        }
    }

    /// Insert a pre-populated grid (generated or loaded). All-air grids are
    /// skipped. Call [`StructureBody::recompute_properties`] after a batch.
    pub fn insert_chunk_blocks(&mut self, index: IVec3, blocks: Vec<Block>, modified: bool) -> Result<Option<ChunkId>> {
        if self.chunk_map.contains_key(&index) {
            return Err(Error::Generation(format!("chunk {:?} already exists", index)));
        }
        if !self.within_extent(index) {
            return Err(Error::Generation(format!(
                "chunk {:?} is outside the structure extent",
                index
            )));
        }
        let (structure, position) = (self.id, self.position);
        let registry = Arc::clone(&self.registry);
        let chunk_id = self
            .chunks
            .try_insert_with(|id| Chunk::from_blocks(id, structure, index, position, blocks, &registry))?;
        if self.chunks.get(chunk_id).is_some_and(|c| c.is_empty()) {
            self.chunks.remove(chunk_id);
            return Ok(None);
        }
        if let Some(chunk) = self.chunks.get_mut(chunk_id) {
            chunk.set_modified(modified);
        }
        self.register_chunk(chunk_id, index);
        Ok(Some(chunk_id))
    }

    /// Recompute mass, centre of mass, geometry bounds and gravity radius
    /// from the per-chunk aggregates.
    pub fn recompute_properties(&mut self) {
        let mut mass = 0.0f32;
        let mut weighted = Vec3::ZERO;
        let mut bounds: Option<Aabb> = None;
        for (_, chunk) in self.chunks.iter() {
            mass += chunk.mass();
            weighted += chunk.weighted_position();
            if let Some(b) = chunk.geometry_bounds() {
                bounds = Some(bounds.map_or(b, |acc| acc.merged(&b)));
            }
        }
        if mass < 0.0 {
            log::error!("structure {:?} mass went negative ({}), clamping", self.id, mass);
            mass = 0.0;
        }

        self.total_mass = mass;
        self.geometry_bounds = bounds;
        self.center_of_mass = if mass > 0.0 {
            weighted / mass
        } else {
            bounds.map_or(Vec3::ZERO, |b| b.center())
        };

        let mut radius = self.config.min_gravity_radius;
        if let Some(b) = bounds {
            let offset = b.center().distance(self.center_of_mass);
            let candidate =
                self.config.gravity_base * mass.powf(self.config.gravity_exponent) + b.diagonal() + offset;
            radius = radius.max(candidate);
        }
        self.gravity_radius = radius;
    }

    /// Capture chunk grids and metadata for the persistence layer.
    pub fn snapshot(&self) -> StructureSnapshot {
        let mut chunks: Vec<ChunkSnapshot> = self
            .chunks
            .iter()
            .map(|(_, chunk)| ChunkSnapshot {
                index: chunk.index().to_array(),
                modified: chunk.is_modified(),
                blocks: chunk.blocks().to_vec(),
            })
            .collect();
        chunks.sort_by_key(|c| c.index);
        StructureSnapshot {
            version: SNAPSHOT_VERSION,
            uid: self.uid,
            position: self.position.to_array(),
            placement: self.placement.map(|p| p.0),
            archetype: self.archetype.clone(),
            modified: self.modified,
            chunks,
        }
    }

    /// Rebuild a body from a snapshot (the loaded path).
    pub fn from_snapshot(
        id: StructureId,
        snapshot: StructureSnapshot,
        registry: Arc<BlockRegistry>,
        config: StructureConfig,
        octree: OctreeConfig,
    ) -> Result<Self> {
        let mut body = Self::new(id, Vec3::from_array(snapshot.position), registry, config, octree);
        body.set_origin(snapshot.placement.map(PlacementId), snapshot.archetype);
        body.uid = snapshot.uid;
        for chunk in snapshot.chunks {
            body.insert_chunk_blocks(IVec3::from_array(chunk.index), chunk.blocks, chunk.modified)?;
        }
        body.modified = snapshot.modified;
        body.recompute_properties();
        Ok(body)
    }

    fn create_chunk(&mut self, index: IVec3) -> ChunkId {
        let (structure, position) = (self.id, self.position);
        let chunk_id = self
            .chunks
            .insert_with(|id| Chunk::new(id, structure, index, position));
        self.register_chunk(chunk_id, index);
        log::trace!("structure {:?} created chunk {:?}", self.id, index);
        chunk_id
    }

    /// Index a chunk and link it with its face neighbours, both ways.
    fn register_chunk(&mut self, chunk_id: ChunkId, index: IVec3) {
        self.chunk_map.insert(index, chunk_id);
        let min = (index * CHUNK_SIZE).as_vec3();
        let bounds = Aabb::new(min, min + Vec3::splat(CHUNK_SIZE as f32));
        if !self.chunk_index.add(chunk_id, bounds) {
            log::error!("structure {:?} could not index chunk {:?}", self.id, index);
        }

        for face in Face::ALL {
            let Some(&neighbor_id) = self.chunk_map.get(&(index + face.offset())) else {
                continue;
            };
            if let Some((chunk, neighbor)) = self.chunks.get2_mut(chunk_id, neighbor_id) {
                chunk.set_neighbor(face, Some(neighbor_id));
                neighbor.set_neighbor(face.opposite(), Some(chunk_id));
                // The new chunk may hide faces on the neighbour's border.
                neighbor.mark_dirty();
            }
        }
    }

    /// Detach and drop a chunk, unlinking its neighbours.
    fn destroy_chunk(&mut self, chunk_id: ChunkId) {
        let Some(chunk) = self.chunks.remove(chunk_id) else {
            return;
        };
        for face in Face::ALL {
            if let Some(neighbor) = chunk.neighbor(face).and_then(|n| self.chunks.get_mut(n)) {
                neighbor.set_neighbor(face.opposite(), None);
                neighbor.mark_dirty();
            }
        }
        self.chunk_map.remove(&chunk.index());
        self.chunk_index.remove(&chunk_id);
        log::debug!("structure {:?} destroyed empty chunk {:?}", self.id, chunk.index());
    }

    fn mark_boundary_neighbors(&mut self, chunk_id: ChunkId, local: IVec3) {
        let Some(chunk) = self.chunks.get(chunk_id) else {
            return;
        };
        let neighbors: Vec<ChunkId> = Chunk::boundary_faces(local)
            .filter_map(|face| chunk.neighbor(face))
            .collect();
        for neighbor in neighbors {
            if let Some(n) = self.chunks.get_mut(neighbor) {
                n.mark_dirty();
            }
        }
    }

    fn after_edit(&mut self, chunk_id: ChunkId, local: IVec3) {
        self.mark_boundary_neighbors(chunk_id, local);
        self.modified = true;
        self.recompute_properties();
    }

    /// Every neighbour link has a matching link back.
    pub fn neighbor_links_symmetric(&self) -> bool {
        self.chunks.iter().all(|(id, chunk)| {
            Face::ALL.into_iter().all(|face| match chunk.neighbor(face) {
                Some(n) => self
                    .chunks
                    .get(n)
                    .is_some_and(|other| other.neighbor(face.opposite()) == Some(id)),
                None => !self.chunk_map.contains_key(&(chunk.index() + face.offset())),
            })
        })
    }
}

/// Minimum translation moving `volume` out of `cell`, `None` if they only touch.
fn penetration(volume: &Aabb, cell: &Aabb) -> Option<Vec3> {
    let overlap = volume.intersection(cell)?;
    let size = overlap.size();
    if size.min_element() <= 0.0 {
        return None;
    }
    let away = volume.center() - cell.center();
    let push = |axis: usize| -> Vec3 {
        let mut v = Vec3::ZERO;
        v[axis] = if away[axis] >= 0.0 { size[axis] } else { -size[axis] };
        v
    };
    let axis = if size.x <= size.y && size.x <= size.z {
        0
    } else if size.y <= size.z {
        1
    } else {
        2
    };
    Some(push(axis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Frustum;
    use crate::sector::render::DrawRecorder;
    use crate::voxel::block::ids;
    use crate::voxel::hooks::{NoHooks, RecordingHooks};
    use crate::voxel::lod::LodTier;

    fn body() -> StructureBody {
        StructureBody::new(
            Handle::from_raw(0, 0),
            Vec3::ZERO,
            Arc::new(BlockRegistry::default()),
            StructureConfig::default(),
            OctreeConfig::default(),
        )
    }

    fn expected_mass(body: &StructureBody) -> f32 {
        body.chunks()
            .flat_map(|(_, c)| c.blocks().iter().copied())
            .map(|b| body.registry().mass_of(b))
            .sum()
    }

    #[test]
    fn test_single_block_scenario() {
        let mut body = body();
        let stone = body.registry().create(ids::STONE);
        assert!(body.try_place_block(Vec3::splat(0.5), stone, &mut NoHooks));

        assert_eq!(body.chunk_count(), 1);
        let (_, chunk) = body.chunks().next().unwrap();
        assert_eq!(chunk.mass(), body.registry().mass_of(stone));
        assert_eq!(
            chunk.geometry_bounds(),
            Some(Aabb::new(Vec3::ZERO, Vec3::ONE))
        );
        assert_eq!(body.total_mass(), chunk.mass());
        assert!(body.gravity_radius() >= body.config().min_gravity_radius);
        assert_eq!(body.center_of_mass(), Vec3::splat(0.5));
        assert!(body.is_modified());
    }

    #[test]
    fn test_remove_last_block_empties_body() {
        let mut body = body();
        let stone = body.registry().create(ids::STONE);
        body.try_place_block(Vec3::splat(0.5), stone, &mut NoHooks);
        assert!(body.try_remove_block(Vec3::splat(0.5), Vec3::Y, false, &mut NoHooks));
        assert_eq!(body.chunk_count(), 0);
        assert_eq!(body.total_mass(), 0.0);
        assert!(body.is_empty());
        assert!(body.geometry_bounds().is_none());
        assert_eq!(body.gravity_radius(), body.config().min_gravity_radius);
    }

    #[test]
    fn test_mass_conservation_over_random_edits() {
        let mut body = body();
        let mut rng = fastrand::Rng::with_seed(7);
        let kinds = [ids::STONE, ids::ICE, ids::IRON_ORE, ids::GLASS, ids::CABLE];
        for _ in 0..600 {
            let voxel = IVec3::new(rng.i32(-40..40), rng.i32(-40..40), rng.i32(-40..40));
            let pos = voxel.as_vec3() + Vec3::splat(0.5);
            if rng.bool() {
                let block = body.registry().create(kinds[rng.usize(..kinds.len())]);
                body.try_place_block(pos, block, &mut NoHooks);
            } else {
                body.try_remove_block(pos, Vec3::Y, false, &mut NoHooks);
            }
            let expected = expected_mass(&body);
            assert!((body.total_mass() - expected).abs() < 1e-2 * expected.max(1.0));
            assert!(body.neighbor_links_symmetric());
        }
    }

    #[test]
    fn test_neighbor_links_follow_chunk_lifecycle() {
        let mut body = body();
        let stone = body.registry().create(ids::STONE);
        body.try_place_block(Vec3::new(31.5, 0.5, 0.5), stone, &mut NoHooks);
        body.try_place_block(Vec3::new(32.5, 0.5, 0.5), stone, &mut NoHooks);
        body.try_place_block(Vec3::new(-0.5, 0.5, 0.5), stone, &mut NoHooks);
        assert_eq!(body.chunk_count(), 3);

        let a = body.chunk_at(IVec3::ZERO).unwrap();
        let b = body.chunk_at(IVec3::X).unwrap();
        assert_eq!(a.neighbor(Face::PosX), Some(b.id()));
        assert_eq!(b.neighbor(Face::NegX), Some(a.id()));
        assert!(body.neighbor_links_symmetric());

        body.try_remove_block(Vec3::new(32.5, 0.5, 0.5), Vec3::X, false, &mut NoHooks);
        assert_eq!(body.chunk_count(), 2);
        let a = body.chunk_at(IVec3::ZERO).unwrap();
        assert_eq!(a.neighbor(Face::PosX), None);
        assert!(a.neighbor(Face::NegX).is_some());
        assert!(body.neighbor_links_symmetric());
    }

    #[test]
    fn test_boundary_edit_dirties_neighbor() {
        let mut body = body();
        let stone = body.registry().create(ids::STONE);
        body.try_place_block(Vec3::new(31.5, 0.5, 0.5), stone, &mut NoHooks);
        body.try_place_block(Vec3::new(32.5, 0.5, 0.5), stone, &mut NoHooks);
        assert_eq!(body.rebuild_dirty_meshes(None), 2);

        // Interior edit leaves the neighbour alone.
        body.try_place_block(Vec3::new(10.5, 0.5, 0.5), stone, &mut NoHooks);
        assert!(!body.chunk_at(IVec3::X).unwrap().needs_remesh());

        body.try_remove_block(Vec3::new(31.5, 0.5, 0.5), Vec3::X, false, &mut NoHooks);
        assert!(body.chunk_at(IVec3::X).unwrap().needs_remesh());
    }

    #[test]
    fn test_extent_limit() {
        let mut body = body();
        let stone = body.registry().create(ids::STONE);
        let far = Vec3::splat((CHUNK_SIZE * 9) as f32 + 0.5);
        assert!(!body.try_place_block(far, stone, &mut NoHooks));
        assert!(!body.try_place_block(Vec3::ZERO, Block::AIR, &mut NoHooks));
        assert!(!body.try_remove_block(Vec3::splat(3.5), Vec3::Y, false, &mut NoHooks));
        assert_eq!(body.chunk_count(), 0);
    }

    #[test]
    fn test_occupied_placement_keeps_state() {
        let mut body = body();
        let stone = body.registry().create(ids::STONE);
        assert!(body.try_place_block(Vec3::splat(0.5), stone, &mut NoHooks));
        let mass = body.total_mass();
        assert!(!body.try_place_block(Vec3::splat(0.5), stone, &mut NoHooks));
        assert_eq!(body.total_mass(), mass);
    }

    #[test]
    fn test_center_of_mass_and_gravity_radius() {
        let mut body = body();
        let reg = Arc::clone(body.registry());
        for x in 0..4 {
            body.try_place_block(Vec3::new(x as f32 + 0.5, 0.5, 0.5), reg.create(ids::STONE), &mut NoHooks);
        }
        body.try_place_block(Vec3::new(0.5, 0.5, 0.5) + Vec3::Y, reg.create(ids::GOLD_ORE), &mut NoHooks);
        let com = body.center_of_mass();
        // Gold is heavier and sits over x = 0.
        assert!(com.x < 2.0);
        assert!(com.y > 0.5);

        let small = body.gravity_radius();
        for x in 0..32 {
            for z in 0..32 {
                body.try_place_block(Vec3::new(x as f32 + 0.5, 5.5, z as f32 + 0.5), reg.create(ids::IRON_ORE), &mut NoHooks);
            }
        }
        assert!(body.gravity_radius() > small);
    }

    #[test]
    fn test_raycast_across_chunks() {
        let mut body = StructureBody::new(
            Handle::from_raw(0, 0),
            Vec3::new(100.0, 0.0, 0.0),
            Arc::new(BlockRegistry::default()),
            StructureConfig::default(),
            OctreeConfig::default(),
        );
        let hull = body.registry().create(ids::HULL);
        body.try_place_block(Vec3::new(100.0 + 40.5, 0.5, 0.5), hull, &mut NoHooks);
        body.try_place_block(Vec3::new(100.0 + 70.5, 0.5, 0.5), hull, &mut NoHooks);

        let ray = Ray::new(Vec3::new(0.0, 0.5, 0.5), Vec3::X);
        let hit = body.raycast(&ray, 500.0).expect("ray should hit");
        assert_eq!(hit.voxel, IVec3::new(40, 0, 0));
        assert_eq!(hit.normal, IVec3::NEG_X);
        assert!((hit.distance - 140.0).abs() < 1e-3);
        assert_eq!(hit.adjacent_voxel(), IVec3::new(39, 0, 0));

        assert!(body.raycast(&ray, 100.0).is_none());
        let back = Ray::new(Vec3::new(400.0, 0.5, 0.5), Vec3::NEG_X);
        assert_eq!(body.raycast(&back, 500.0).map(|h| h.voxel), Some(IVec3::new(70, 0, 0)));
    }

    #[test]
    fn test_is_colliding() {
        let mut body = body();
        let stone = body.registry().create(ids::STONE);
        body.try_place_block(Vec3::splat(0.5), stone, &mut NoHooks);

        let touching = Aabb::new(Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0));
        assert!(body.is_colliding(&touching).is_none());

        let overlapping = Aabb::new(Vec3::new(0.75, 0.0, 0.0), Vec3::new(1.75, 1.0, 1.0));
        let info = body.is_colliding(&overlapping).expect("should collide");
        assert_eq!(info.voxel, IVec3::ZERO);
        assert!((info.penetration - Vec3::new(0.25, 0.0, 0.0)).length() < 1e-5);
        assert_eq!(info.voxel_bounds, Aabb::new(Vec3::ZERO, Vec3::ONE));

        let far = Aabb::new(Vec3::splat(10.0), Vec3::splat(11.0));
        assert!(body.is_colliding(&far).is_none());
    }

    #[test]
    fn test_damage_block_until_destroyed() {
        let mut body = body();
        let mut hooks = RecordingHooks::default();
        let ice = body.registry().create(ids::ICE);
        body.try_place_block(Vec3::splat(0.5), ice, &mut hooks);

        assert_eq!(
            body.damage_block(Vec3::splat(0.5), Vec3::Y, 2, &mut hooks),
            DamageOutcome::Damaged { remaining: 1 }
        );
        match body.damage_block(Vec3::splat(0.5), Vec3::Y, 2, &mut hooks) {
            DamageOutcome::Destroyed(block) => assert_eq!(block.id, ids::ICE),
            other => panic!("expected destruction, got {:?}", other),
        }
        assert_eq!(hooks.drops.len(), 1);
        assert!(body.is_empty());
        assert_eq!(
            body.damage_block(Vec3::splat(0.5), Vec3::Y, 2, &mut hooks),
            DamageOutcome::Missed
        );
    }

    #[test]
    fn test_render_picks_tiers_and_drops_stale_results() {
        let mut body = body();
        let stone = body.registry().create(ids::STONE);
        body.try_place_block(Vec3::splat(0.5), stone, &mut NoHooks);

        let mut builder = LodBuilder::new(Arc::clone(body.registry()));
        let mut recorder = DrawRecorder::default();
        let lod = LodConfig::default();

        let near = ViewState::new(Vec3::splat(20.0), 1000.0);
        assert_eq!(body.render(&near, &lod, Some(1), &mut builder, &mut recorder, MaterialHandle(3)), 1);
        assert_eq!(recorder.draws[0].tier, Some(LodTier::Full));
        assert_eq!(recorder.draws[0].material, MaterialHandle(3));
        assert_eq!(builder.in_flight(), 0);

        // Far away: a downsampled build is queued, the old mesh keeps drawing.
        let far = ViewState::new(Vec3::new(250.0, 16.0, 16.0), 1000.0);
        body.render(&far, &lod, Some(1), &mut builder, &mut recorder, MaterialHandle(3));
        assert_eq!(builder.in_flight(), 1);
        let result = builder.wait_one().unwrap();

        // Back near before the result is applied: it is stale.
        body.render(&near, &lod, Some(1), &mut builder, &mut recorder, MaterialHandle(3));
        assert!(!body.apply_lod_result(result));
        let (_, chunk) = body.chunks().next().unwrap();
        assert_eq!(chunk.lod().current, Some(LodTier::Full));
    }

    #[test]
    fn test_render_culls_outside_view() {
        let mut body = body();
        let stone = body.registry().create(ids::STONE);
        body.try_place_block(Vec3::splat(0.5), stone, &mut NoHooks);
        let mut builder = LodBuilder::new(Arc::clone(body.registry()));
        let mut recorder = DrawRecorder::default();

        let too_far = ViewState::new(Vec3::splat(5000.0), 100.0);
        assert_eq!(body.render(&too_far, &LodConfig::default(), None, &mut builder, &mut recorder, MaterialHandle(0)), 0);

        // Camera at +z looking further along +z: the chunk is behind it.
        let proj = glam::Mat4::perspective_rh(1.0, 1.0, 0.1, 500.0);
        let view = glam::Mat4::look_at_rh(Vec3::new(16.0, 16.0, 60.0), Vec3::new(16.0, 16.0, 100.0), Vec3::Y);
        let behind = ViewState {
            frustum: Some(Frustum::from_view_projection(&(proj * view))),
            ..ViewState::new(Vec3::new(16.0, 16.0, 60.0), 1000.0)
        };
        assert_eq!(body.render(&behind, &LodConfig::default(), None, &mut builder, &mut recorder, MaterialHandle(0)), 0);
        assert!(recorder.draws.is_empty());
    }

    #[test]
    fn test_snapshot_restores_state() {
        let mut body = body();
        let reg = Arc::clone(body.registry());
        body.set_origin(Some(PlacementId(42)), Some("ice_ball".into()));
        assert_eq!(body.uid(), 42);
        body.set_uid(0xBEEF);
        body.try_place_block(Vec3::new(-3.5, 2.5, 40.5), reg.create(ids::ICE), &mut NoHooks);
        body.try_place_block(Vec3::new(1.5, 2.5, 0.5), reg.create(ids::CRYSTAL), &mut NoHooks);

        let snapshot = body.snapshot();
        assert_eq!(snapshot.chunks.len(), 2);
        let restored = StructureBody::from_snapshot(
            Handle::from_raw(5, 1),
            snapshot,
            reg,
            StructureConfig::default(),
            OctreeConfig::default(),
        )
        .unwrap();
        assert_eq!(restored.chunk_count(), 2);
        assert_eq!(restored.placement(), Some(PlacementId(42)));
        assert_eq!(restored.uid(), 0xBEEF);
        assert_eq!(restored.archetype(), Some("ice_ball"));
        assert!((restored.total_mass() - body.total_mass()).abs() < 1e-5);
        assert_eq!(restored.geometry_bounds(), body.geometry_bounds());
        assert_eq!(restored.block_at_voxel(IVec3::new(1, 2, 0)).map(|b| b.id), Some(ids::CRYSTAL));
        assert!(restored.is_modified());
        assert!(restored.neighbor_links_symmetric());
    }
}
