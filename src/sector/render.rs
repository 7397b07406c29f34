//! Interfaces between the world core and a rendering backend
//!
//! The core never uploads anything itself. It culls, keeps meshes current and
//! hands each visible chunk mesh to a [`ChunkRenderer`].

use glam::Vec3;

use crate::math::{Aabb, Frustum};
use crate::voxel::chunk::ChunkId;
use crate::voxel::lod::LodTier;
use crate::voxel::mesh::MeshData;
use crate::voxel::structure::StructureId;

/// Opaque material id owned by the renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MaterialHandle(pub u32);

/// Viewer state for one frame.
#[derive(Clone, Copy, Debug)]
pub struct ViewState {
    pub position: Vec3,
    /// Optional camera frustum; distance culling only when absent
    pub frustum: Option<Frustum>,
    pub view_distance: f32,
}

impl ViewState {
    pub fn new(position: Vec3, view_distance: f32) -> Self {
        Self {
            position,
            frustum: None,
            view_distance,
        }
    }

    /// Within view distance and inside the frustum (if any).
    pub fn sees(&self, bounds: &Aabb) -> bool {
        if !bounds.intersects_sphere(self.position, self.view_distance) {
            return false;
        }
        self.frustum.as_ref().is_none_or(|f| f.intersects_aabb(bounds))
    }
}

/// One chunk mesh to draw this frame.
#[derive(Clone, Copy, Debug)]
pub struct ChunkDraw<'a> {
    pub structure: StructureId,
    pub chunk: ChunkId,
    /// World-space origin; mesh positions are relative to it
    pub origin: Vec3,
    pub tier: Option<LodTier>,
    pub mesh: &'a MeshData,
    /// Changes whenever the mesh contents change
    pub mesh_revision: u64,
    pub material: MaterialHandle,
}

pub trait ChunkRenderer {
    fn draw(&mut self, draw: ChunkDraw<'_>);
}

/// A draw as seen by [`DrawRecorder`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawRecord {
    pub structure: StructureId,
    pub chunk: ChunkId,
    pub origin: Vec3,
    pub tier: Option<LodTier>,
    pub quads: usize,
    pub mesh_revision: u64,
    pub material: MaterialHandle,
}

/// Renderer that just records draws; used by tooling and tests.
#[derive(Clone, Debug, Default)]
pub struct DrawRecorder {
    pub draws: Vec<DrawRecord>,
}

impl DrawRecorder {
    pub fn clear(&mut self) {
        self.draws.clear();
    }

    pub fn total_quads(&self) -> usize {
        self.draws.iter().map(|d| d.quads).sum()
    }
}

impl ChunkRenderer for DrawRecorder {
    fn draw(&mut self, draw: ChunkDraw<'_>) {
        self.draws.push(DrawRecord {
            structure: draw.structure,
            chunk: draw.chunk,
            origin: draw.origin,
            tier: draw.tier,
            quads: draw.mesh.quad_count(),
            mesh_revision: draw.mesh_revision,
            material: draw.material,
        });
    }
}
