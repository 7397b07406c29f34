//! Chunk: a 32³ block grid owned by a structure body
//!
//! A chunk keeps its own aggregates (mass, mass-weighted position, occupied
//! bounds) up to date on every edit so the owning structure can sum them
//! without touching voxels. Mesh rebuilds are lazy: edits only set
//! `needs_remesh`, the render pass decides when to rebuild.

use glam::{IVec3, Vec3};

use crate::core::arena::Handle;
use crate::core::types::Result;
use crate::core::Error;
use crate::math::{Aabb, Ray};
use crate::voxel::block::{Block, BlockRegistry, MAX_LIGHT};
use crate::voxel::hooks::BlockHooks;
use crate::voxel::lighting::LightField;
use crate::voxel::lod::LodTier;
use crate::voxel::mesh::{emit_faces, MeshData};
use crate::voxel::structure::StructureId;

/// Blocks per chunk edge
pub const CHUNK_SIZE: i32 = 32;

/// Blocks per chunk
pub const CHUNK_VOLUME: usize = (CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE) as usize;

pub type ChunkId = Handle<Chunk>;

/// Index into a chunk grid (x fastest, then y, then z).
#[inline]
pub fn linear_index(local: IVec3) -> usize {
    (local.x + local.y * CHUNK_SIZE + local.z * CHUNK_SIZE * CHUNK_SIZE) as usize
}

/// Chunk index containing a structure-local voxel.
#[inline]
pub fn chunk_index_of(voxel: IVec3) -> IVec3 {
    voxel.div_euclid(IVec3::splat(CHUNK_SIZE))
}

/// Position of a structure-local voxel inside its chunk.
#[inline]
pub fn local_of(voxel: IVec3) -> IVec3 {
    voxel.rem_euclid(IVec3::splat(CHUNK_SIZE))
}

#[inline]
pub fn in_chunk(local: IVec3) -> bool {
    local.cmpge(IVec3::ZERO).all() && local.cmplt(IVec3::splat(CHUNK_SIZE)).all()
}

/// Face directions of a chunk, also used as neighbour slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Face {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl Face {
    pub const ALL: [Face; 6] = [
        Face::PosX,
        Face::NegX,
        Face::PosY,
        Face::NegY,
        Face::PosZ,
        Face::NegZ,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn opposite(self) -> Face {
        match self {
            Face::PosX => Face::NegX,
            Face::NegX => Face::PosX,
            Face::PosY => Face::NegY,
            Face::NegY => Face::PosY,
            Face::PosZ => Face::NegZ,
            Face::NegZ => Face::PosZ,
        }
    }

    pub fn offset(self) -> IVec3 {
        match self {
            Face::PosX => IVec3::X,
            Face::NegX => IVec3::NEG_X,
            Face::PosY => IVec3::Y,
            Face::NegY => IVec3::NEG_Y,
            Face::PosZ => IVec3::Z,
            Face::NegZ => IVec3::NEG_Z,
        }
    }

    pub fn normal(self) -> Vec3 {
        self.offset().as_vec3()
    }

    pub fn from_offset(offset: IVec3) -> Option<Face> {
        Face::ALL.into_iter().find(|f| f.offset() == offset)
    }
}

/// Where a chunk is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkState {
    /// No blocks yet
    Empty,
    /// Has blocks, mesh out of date
    Populated,
    /// Mesh matches the blocks
    Remeshed,
    /// Emptied by a removal; about to be detached
    Destroyed,
}

/// Level of detail bookkeeping for one chunk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LodState {
    /// Tier of the mesh currently held
    pub current: Option<LodTier>,
    /// Tier the render pass last asked for
    pub requested: Option<LodTier>,
    /// Async build in flight: (tier, content revision)
    pub pending: Option<(LodTier, u64)>,
}

/// What the caller should do after [`Chunk::request_lod`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LodAction {
    Keep,
    /// Rebuild the full-detail mesh now
    Remesh,
    /// Submit a downsampled build for the tier
    Downsample(LodTier),
}

/// Ray hit inside a single chunk.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkHit {
    pub local: IVec3,
    pub block: Block,
    pub distance: f32,
    /// World-space point where the ray entered the block
    pub position: Vec3,
    /// Normal of the face that was entered
    pub normal: IVec3,
}

/// Borrowed block grids of the six face neighbours, for border culling.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChunkNeighborhood<'a> {
    faces: [Option<&'a [Block]>; 6],
}

impl<'a> ChunkNeighborhood<'a> {
    pub fn set(&mut self, face: Face, blocks: &'a [Block]) {
        self.faces[face.index()] = Some(blocks);
    }

    /// Block at a position one step outside the chunk, air if no neighbour.
    fn outside(&self, local: IVec3) -> Block {
        let step = IVec3::new(
            if local.x < 0 { -1 } else if local.x >= CHUNK_SIZE { 1 } else { 0 },
            if local.y < 0 { -1 } else if local.y >= CHUNK_SIZE { 1 } else { 0 },
            if local.z < 0 { -1 } else if local.z >= CHUNK_SIZE { 1 } else { 0 },
        );
        let Some(face) = Face::from_offset(step) else {
            return Block::AIR;
        };
        match self.faces[face.index()] {
            Some(blocks) => blocks[linear_index(local_of(local))],
            None => Block::AIR,
        }
    }
}

/// Output of [`Chunk::generate_mesh`], applied with [`Chunk::apply_full_mesh`].
#[derive(Clone, Debug)]
pub struct BuiltMesh {
    pub mesh: MeshData,
    pub light: Option<LightField>,
    /// Content revision the mesh was built from
    pub revision: u64,
}

pub struct Chunk {
    id: ChunkId,
    structure: StructureId,
    /// Signed chunk index relative to the structure origin
    index: IVec3,
    /// World-space minimum corner
    origin: Vec3,
    blocks: Box<[Block]>,
    block_count: u32,
    mass: f32,
    /// Sum of mass * voxel centre, structure-local
    weighted_position: Vec3,
    /// Occupied voxels, structure-local
    geometry_bounds: Option<Aabb>,
    neighbors: [Option<ChunkId>; 6],
    needs_remesh: bool,
    is_modified: bool,
    destroyed: bool,
    revision: u64,
    mesh: Option<MeshData>,
    mesh_revision: u64,
    light: Option<LightField>,
    lod: LodState,
}

impl Chunk {
    /// Empty chunk at `index` of a structure whose origin is at `structure_position`.
    pub fn new(id: ChunkId, structure: StructureId, index: IVec3, structure_position: Vec3) -> Self {
        Self {
            id,
            structure,
            index,
            origin: structure_position + (index * CHUNK_SIZE).as_vec3(),
            blocks: vec![Block::AIR; CHUNK_VOLUME].into_boxed_slice(),
            block_count: 0,
            mass: 0.0,
            weighted_position: Vec3::ZERO,
            geometry_bounds: None,
            neighbors: [None; 6],
            needs_remesh: false,
            is_modified: false,
            destroyed: false,
            revision: 0,
            mesh: None,
            mesh_revision: 0,
            light: None,
            lod: LodState::default(),
        }
    }

    /// Chunk built from a pre-populated grid (generated or loaded).
    pub fn from_blocks(
        id: ChunkId,
        structure: StructureId,
        index: IVec3,
        structure_position: Vec3,
        blocks: Vec<Block>,
        registry: &BlockRegistry,
    ) -> Result<Self> {
        if blocks.len() != CHUNK_VOLUME {
            return Err(Error::Persist(format!(
                "chunk {:?} has {} blocks, expected {}",
                index,
                blocks.len(),
                CHUNK_VOLUME
            )));
        }
        if let Some(unknown) = blocks.iter().find(|b| !b.is_air() && registry.get(b.id).is_none()) {
            return Err(Error::Persist(format!(
                "chunk {:?} holds unregistered block id {}",
                index, unknown.id
            )));
        }
        let mut chunk = Self::new(id, structure, index, structure_position);
        chunk.blocks = blocks.into_boxed_slice();
        chunk.recompute_aggregates(registry);
        chunk.needs_remesh = chunk.block_count > 0;
        Ok(chunk)
    }

    pub fn id(&self) -> ChunkId {
        self.id
    }

    pub fn structure(&self) -> StructureId {
        self.structure
    }

    pub fn index(&self) -> IVec3 {
        self.index
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// World-space extent of the whole chunk
    pub fn bounds(&self) -> Aabb {
        Aabb::new(self.origin, self.origin + Vec3::splat(CHUNK_SIZE as f32))
    }

    /// Structure-local extent of the whole chunk
    pub fn local_bounds(&self) -> Aabb {
        let min = (self.index * CHUNK_SIZE).as_vec3();
        Aabb::new(min, min + Vec3::splat(CHUNK_SIZE as f32))
    }

    /// Structure-local extent of occupied voxels
    pub fn geometry_bounds(&self) -> Option<Aabb> {
        self.geometry_bounds
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn weighted_position(&self) -> Vec3 {
        self.weighted_position
    }

    pub fn is_empty(&self) -> bool {
        self.block_count == 0
    }

    pub fn needs_remesh(&self) -> bool {
        self.needs_remesh
    }

    pub fn mark_dirty(&mut self) {
        if self.block_count > 0 {
            self.needs_remesh = true;
        } else if self.mesh.is_some() {
            // Drop the stale mesh of an emptied chunk right away.
            self.mesh = None;
            self.mesh_revision += 1;
        }
    }

    pub fn is_modified(&self) -> bool {
        self.is_modified
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.is_modified = modified;
    }

    /// Bumped on every block change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn mesh(&self) -> Option<&MeshData> {
        self.mesh.as_ref()
    }

    /// Bumped whenever the held mesh is replaced.
    pub fn mesh_revision(&self) -> u64 {
        self.mesh_revision
    }

    pub fn light(&self) -> Option<&LightField> {
        self.light.as_ref()
    }

    pub fn lod(&self) -> LodState {
        self.lod
    }

    pub fn state(&self) -> ChunkState {
        if self.destroyed {
            ChunkState::Destroyed
        } else if self.block_count == 0 {
            ChunkState::Empty
        } else if self.needs_remesh || self.mesh.is_none() {
            ChunkState::Populated
        } else {
            ChunkState::Remeshed
        }
    }

    pub fn neighbor(&self, face: Face) -> Option<ChunkId> {
        self.neighbors[face.index()]
    }

    pub fn neighbors(&self) -> [Option<ChunkId>; 6] {
        self.neighbors
    }

    pub fn set_neighbor(&mut self, face: Face, neighbor: Option<ChunkId>) {
        self.neighbors[face.index()] = neighbor;
    }

    /// Structure-local voxel of a chunk-local position
    pub fn voxel_of(&self, local: IVec3) -> IVec3 {
        self.index * CHUNK_SIZE + local
    }

    /// World-space centre of a chunk-local voxel
    pub fn world_center(&self, local: IVec3) -> Vec3 {
        self.origin + local.as_vec3() + Vec3::splat(0.5)
    }

    pub fn get_block(&self, local: IVec3) -> Option<Block> {
        in_chunk(local).then(|| self.blocks[linear_index(local)])
    }

    /// Put `block` into an air cell. Returns false if the cell is out of
    /// range or occupied, or if `block` is air or not in the registry.
    pub fn place_block(
        &mut self,
        local: IVec3,
        block: Block,
        registry: &BlockRegistry,
        hooks: &mut dyn BlockHooks,
    ) -> bool {
        if block.is_air() || !in_chunk(local) {
            return false;
        }
        if registry.get(block.id).is_none() {
            log::warn!("refusing unregistered block id {} in chunk {:?}", block.id, self.index);
            return false;
        }
        let i = linear_index(local);
        if !self.blocks[i].is_air() {
            return false;
        }

        self.blocks[i] = block;
        self.block_count += 1;
        let mass = registry.mass_of(block);
        let center = self.voxel_of(local).as_vec3() + Vec3::splat(0.5);
        self.mass += mass;
        self.weighted_position += center * mass;
        let cell = Aabb::unit_voxel(self.voxel_of(local));
        self.geometry_bounds = Some(match self.geometry_bounds {
            Some(b) => b.merged(&cell),
            None => cell,
        });
        self.destroyed = false;
        self.touch();

        if registry.is_electrical(block) {
            hooks.electrical_added(self.structure, self.voxel_of(local), block);
        }
        true
    }

    /// Clear a solid cell and return what was there.
    ///
    /// `normal` is the face the removal came from and is only forwarded to
    /// the destruction visual. A drop is spawned when `spawn_drop` is set.
    pub fn remove_block(
        &mut self,
        local: IVec3,
        normal: Vec3,
        spawn_drop: bool,
        registry: &BlockRegistry,
        hooks: &mut dyn BlockHooks,
    ) -> Option<Block> {
        let block = self.get_block(local)?;
        if block.is_air() {
            return None;
        }

        self.blocks[linear_index(local)] = Block::AIR;
        self.block_count -= 1;
        let mass = registry.mass_of(block);
        let center = self.voxel_of(local).as_vec3() + Vec3::splat(0.5);
        self.mass -= mass;
        self.weighted_position -= center * mass;

        if self.block_count == 0 {
            if self.mass.abs() > 1e-3 {
                log::error!(
                    "chunk {:?} emptied with residual mass {}, clamping to zero",
                    self.index,
                    self.mass
                );
            }
            self.mass = 0.0;
            self.weighted_position = Vec3::ZERO;
            self.geometry_bounds = None;
            self.destroyed = true;
        } else {
            if self.mass < 0.0 {
                log::error!("chunk {:?} mass went negative ({}), clamping", self.index, self.mass);
                self.mass = 0.0;
            }
            if self.on_geometry_edge(self.voxel_of(local)) {
                self.geometry_bounds = self.scan_geometry_bounds();
            }
        }
        self.touch();

        let position = self.world_center(local);
        hooks.destruction_visual(position, normal, block);
        if spawn_drop {
            hooks.spawn_drop(position, block);
        }
        if registry.is_electrical(block) {
            hooks.electrical_removed(self.structure, self.voxel_of(local), block);
        }
        Some(block)
    }

    /// Wear down a solid block. Returns the remaining durability, or `None`
    /// if there is nothing to damage. The block is not removed here.
    pub fn damage_block(&mut self, local: IVec3, amount: u8) -> Option<u8> {
        let block = self.get_block(local)?;
        if block.is_air() {
            return None;
        }
        let remaining = block.durability.saturating_sub(amount);
        self.blocks[linear_index(local)].durability = remaining;
        self.is_modified = true;
        Some(remaining)
    }

    /// Faces whose neighbour chunk sees `local` on its border.
    pub fn boundary_faces(local: IVec3) -> impl Iterator<Item = Face> {
        Face::ALL.into_iter().filter(move |face| !in_chunk(local + face.offset()))
    }

    /// Walk the ray through this chunk and return the first solid block.
    pub fn raycast(&self, ray: &Ray, max_distance: f32) -> Option<ChunkHit> {
        if self.block_count == 0 {
            return None;
        }
        let bounds = self.bounds();
        let (t_near, t_far) = ray.intersects_aabb(&bounds)?;
        if t_near > max_distance {
            return None;
        }
        let entry_normal = entry_normal(ray, &bounds, t_near);
        let start = ray.at(t_near) - self.origin;
        let local_ray = Ray::new(start, ray.direction);
        let limit = t_far.min(max_distance) - t_near;

        for step in local_ray.voxel_walk(limit) {
            let Some(block) = self.get_block(step.voxel) else {
                continue;
            };
            if block.is_air() {
                continue;
            }
            let normal = if step.normal == IVec3::ZERO { entry_normal } else { step.normal };
            let distance = t_near + step.t;
            return Some(ChunkHit {
                local: step.voxel,
                block,
                distance,
                position: ray.at(distance),
                normal,
            });
        }
        None
    }

    /// Build the full-detail mesh, optionally lit.
    ///
    /// `lighting` is the ambient level to flood from, `None` renders fully lit.
    pub fn generate_mesh(
        &self,
        neighborhood: &ChunkNeighborhood<'_>,
        registry: &BlockRegistry,
        lighting: Option<u8>,
    ) -> BuiltMesh {
        let light = lighting.map(|ambient| LightField::compute(&self.blocks, registry, ambient));
        let ambient = lighting.unwrap_or(MAX_LIGHT);
        let mesh = emit_faces(
            CHUNK_SIZE,
            1.0,
            registry,
            |p| {
                if in_chunk(p) {
                    self.blocks[linear_index(p)]
                } else {
                    neighborhood.outside(p)
                }
            },
            |p| match &light {
                Some(field) => field.level(p).unwrap_or(ambient),
                None => MAX_LIGHT,
            },
        );
        BuiltMesh {
            mesh,
            light,
            revision: self.revision,
        }
    }

    /// Install a mesh from [`Chunk::generate_mesh`].
    pub fn apply_full_mesh(&mut self, built: BuiltMesh) {
        self.mesh = Some(built.mesh);
        self.light = built.light;
        self.mesh_revision += 1;
        self.needs_remesh = built.revision != self.revision;
        self.lod.current = Some(LodTier::Full);
        self.lod.pending = None;
    }

    /// Record the tier the render pass wants and say what work it implies.
    pub fn request_lod(&mut self, tier: LodTier) -> LodAction {
        let up_to_date = self.lod.current == Some(tier) && !self.needs_remesh && self.mesh.is_some();
        let in_flight = self.lod.pending == Some((tier, self.revision));
        self.lod.requested = Some(tier);
        if self.block_count == 0 || up_to_date || in_flight {
            return LodAction::Keep;
        }
        if tier == LodTier::Full {
            LodAction::Remesh
        } else {
            self.lod.pending = Some((tier, self.revision));
            LodAction::Downsample(tier)
        }
    }

    /// Apply an async downsampled mesh. Stale results (tier no longer
    /// requested, or blocks changed since the build started) are dropped.
    pub fn apply_lod_result(&mut self, tier: LodTier, revision: u64, mesh: MeshData) -> bool {
        if self.lod.pending == Some((tier, revision)) {
            self.lod.pending = None;
        }
        if self.lod.requested != Some(tier) {
            log::debug!(
                "dropping stale {:?} mesh for chunk {:?}: {:?} requested",
                tier,
                self.index,
                self.lod.requested
            );
            return false;
        }
        if revision != self.revision {
            log::debug!(
                "dropping stale {:?} mesh for chunk {:?}: revision {} != {}",
                tier,
                self.index,
                revision,
                self.revision
            );
            return false;
        }
        self.mesh = Some(mesh);
        self.light = None;
        self.mesh_revision += 1;
        self.needs_remesh = false;
        self.lod.current = Some(tier);
        true
    }

    fn touch(&mut self) {
        self.revision += 1;
        self.is_modified = true;
        self.mark_dirty();
    }

    fn on_geometry_edge(&self, voxel: IVec3) -> bool {
        let Some(bounds) = self.geometry_bounds else {
            return false;
        };
        let min = bounds.min.as_ivec3();
        let max = bounds.max.as_ivec3() - IVec3::ONE;
        voxel.cmpeq(min).any() || voxel.cmpeq(max).any()
    }

    fn scan_geometry_bounds(&self) -> Option<Aabb> {
        let mut bounds: Option<Aabb> = None;
        for (i, block) in self.blocks.iter().enumerate() {
            if block.is_air() {
                continue;
            }
            let cell = Aabb::unit_voxel(self.voxel_of(unlinear(i)));
            bounds = Some(bounds.map_or(cell, |b| b.merged(&cell)));
        }
        bounds
    }

    /// Rebuild count, mass and bounds from the grid.
    fn recompute_aggregates(&mut self, registry: &BlockRegistry) {
        self.block_count = 0;
        self.mass = 0.0;
        self.weighted_position = Vec3::ZERO;
        for (i, block) in self.blocks.iter().enumerate() {
            if block.is_air() {
                continue;
            }
            let mass = registry.mass_of(*block);
            let center = self.voxel_of(unlinear(i)).as_vec3() + Vec3::splat(0.5);
            self.block_count += 1;
            self.mass += mass;
            self.weighted_position += center * mass;
        }
        self.geometry_bounds = self.scan_geometry_bounds();
    }
}

fn unlinear(i: usize) -> IVec3 {
    let i = i as i32;
    IVec3::new(
        i % CHUNK_SIZE,
        (i / CHUNK_SIZE) % CHUNK_SIZE,
        i / (CHUNK_SIZE * CHUNK_SIZE),
    )
}

/// Normal of the box face a ray enters through at `t_near` (zero if it starts inside).
fn entry_normal(ray: &Ray, bounds: &Aabb, t_near: f32) -> IVec3 {
    if t_near <= 0.0 {
        return IVec3::ZERO;
    }
    let t1 = (bounds.min - ray.origin) * ray.inv_direction;
    let t2 = (bounds.max - ray.origin) * ray.inv_direction;
    let t_min = t1.min(t2);
    let axis = if t_min.x >= t_min.y && t_min.x >= t_min.z {
        0
    } else if t_min.y >= t_min.z {
        1
    } else {
        2
    };
    let mut normal = IVec3::ZERO;
    normal[axis] = if ray.direction[axis] > 0.0 { -1 } else { 1 };
    normal
}
