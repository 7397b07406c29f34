//! CPU mesh data handed to the rendering backend.
//!
//! The mesher here is plain face culling: one quad per solid cell face whose
//! neighbour is air or a different transparent block. Far LOD tiers run the
//! same emitter over a downsampled occupancy grid.

use bytemuck::{Pod, Zeroable};
use glam::{IVec3, Vec3};

use crate::voxel::block::{Block, BlockRegistry, MAX_LIGHT};
use crate::voxel::chunk::{linear_index, Face, CHUNK_SIZE};

/// One mesh vertex (32 bytes), positions in chunk-local units.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    /// Block id, mapped to a material by the renderer
    pub block_id: u32,
    /// Light in [0, 1]
    pub light: f32,
}

/// Indexed triangle list for one chunk.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn quad_count(&self) -> usize {
        self.indices.len() / 6
    }

    /// Raw vertex bytes for upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    fn push_quad(&mut self, cell: IVec3, scale: f32, face: Face, block_id: u16, light: f32) {
        let base = self.vertices.len() as u32;
        let origin = cell.as_vec3() * scale;
        let normal = face.normal();
        for corner in face_corners(face) {
            self.vertices.push(MeshVertex {
                position: (origin + corner * scale).to_array(),
                normal: normal.to_array(),
                block_id: block_id as u32,
                light,
            });
        }
        self.indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
}

/// Corners of a unit cell face, counter-clockwise seen from outside.
fn face_corners(face: Face) -> [Vec3; 4] {
    match face {
        Face::PosX => [
            Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 1.0), Vec3::new(1.0, 0.0, 1.0),
        ],
        Face::NegX => [
            Vec3::new(0.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(0.0, 1.0, 1.0), Vec3::new(0.0, 1.0, 0.0),
        ],
        Face::PosY => [
            Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 1.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0), Vec3::new(1.0, 1.0, 0.0),
        ],
        Face::NegY => [
            Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 1.0), Vec3::new(0.0, 0.0, 1.0),
        ],
        Face::PosZ => [
            Vec3::new(0.0, 0.0, 1.0), Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0), Vec3::new(0.0, 1.0, 1.0),
        ],
        Face::NegZ => [
            Vec3::new(0.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0), Vec3::new(1.0, 0.0, 0.0),
        ],
    }
}

fn face_visible(block: Block, neighbor: Block, registry: &BlockRegistry) -> bool {
    if neighbor.is_air() {
        return true;
    }
    registry.is_transparent(neighbor) && neighbor.id != block.id
}

/// Emit every visible face of a `dim`³ grid.
///
/// `block_at` is queried for cells in `-1..=dim` on each axis so faces on the
/// grid border can be culled against neighbouring data. `light_at` gives the
/// light level of the cell a face looks into.
pub fn emit_faces(
    dim: i32,
    scale: f32,
    registry: &BlockRegistry,
    block_at: impl Fn(IVec3) -> Block,
    light_at: impl Fn(IVec3) -> u8,
) -> MeshData {
    let mut mesh = MeshData::default();
    for z in 0..dim {
        for y in 0..dim {
            for x in 0..dim {
                let cell = IVec3::new(x, y, z);
                let block = block_at(cell);
                if block.is_air() {
                    continue;
                }
                for face in Face::ALL {
                    let n = cell + face.offset();
                    if face_visible(block, block_at(n), registry) {
                        let light = light_at(n) as f32 / MAX_LIGHT as f32;
                        mesh.push_quad(cell, scale, face, block.id, light);
                    }
                }
            }
        }
    }
    mesh
}

/// Collapse a full chunk grid by `factor` (2, 4 or 8).
///
/// A coarse cell takes the first non-air block found inside it.
pub fn downsample(blocks: &[Block], factor: i32) -> Vec<Block> {
    let dim = CHUNK_SIZE / factor;
    let mut coarse = vec![Block::AIR; (dim * dim * dim) as usize];
    for cz in 0..dim {
        for cy in 0..dim {
            for cx in 0..dim {
                let cell = IVec3::new(cx, cy, cz);
                let found = (0..factor * factor * factor).find_map(|i| {
                    let offset = IVec3::new(i % factor, (i / factor) % factor, i / (factor * factor));
                    let b = blocks[linear_index(cell * factor + offset)];
                    (!b.is_air()).then_some(b)
                });
                if let Some(b) = found {
                    coarse[(cx + cy * dim + cz * dim * dim) as usize] = b;
                }
            }
        }
    }
    coarse
}

/// Build an unlit mesh from a downsampled copy of `blocks`.
pub fn build_downsampled(blocks: &[Block], factor: i32, registry: &BlockRegistry) -> MeshData {
    let factor = factor.clamp(1, CHUNK_SIZE);
    let dim = CHUNK_SIZE / factor;
    let coarse = downsample(blocks, factor);
    emit_faces(
        dim,
        factor as f32,
        registry,
        |p| {
            if p.cmplt(IVec3::ZERO).any() || p.cmpge(IVec3::splat(dim)).any() {
                Block::AIR
            } else {
                coarse[(p.x + p.y * dim + p.z * dim * dim) as usize]
            }
        },
        |_| MAX_LIGHT,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::block::ids;
    use crate::voxel::chunk::CHUNK_VOLUME;

    #[test]
    fn test_vertex_size() {
        assert_eq!(std::mem::size_of::<MeshVertex>(), 32);
    }

    #[test]
    fn test_single_block_has_six_faces() {
        let reg = BlockRegistry::default();
        let stone = reg.create(ids::STONE);
        let mesh = emit_faces(
            2,
            1.0,
            &reg,
            |p| if p == IVec3::ZERO { stone } else { Block::AIR },
            |_| MAX_LIGHT,
        );
        assert_eq!(mesh.quad_count(), 6);
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.vertex_bytes().len(), 24 * 32);
    }

    #[test]
    fn test_adjacent_blocks_cull_shared_face() {
        let reg = BlockRegistry::default();
        let stone = reg.create(ids::STONE);
        let mesh = emit_faces(
            2,
            1.0,
            &reg,
            |p| if p == IVec3::ZERO || p == IVec3::X { stone } else { Block::AIR },
            |_| MAX_LIGHT,
        );
        assert_eq!(mesh.quad_count(), 10);
    }

    #[test]
    fn test_glass_next_to_stone_keeps_stone_face() {
        let reg = BlockRegistry::default();
        let stone = reg.create(ids::STONE);
        let glass = reg.create(ids::GLASS);
        let mesh = emit_faces(
            2,
            1.0,
            &reg,
            |p| match p {
                p if p == IVec3::ZERO => stone,
                p if p == IVec3::X => glass,
                _ => Block::AIR,
            },
            |_| MAX_LIGHT,
        );
        // Stone keeps all 6 faces, glass loses the face against stone.
        assert_eq!(mesh.quad_count(), 11);
    }

    #[test]
    fn test_downsample_occupancy() {
        let reg = BlockRegistry::default();
        let mut blocks = vec![Block::AIR; CHUNK_VOLUME];
        blocks[linear_index(IVec3::new(3, 0, 0))] = reg.create(ids::ICE);
        let coarse = downsample(&blocks, 4);
        assert_eq!(coarse.len(), 8 * 8 * 8);
        assert_eq!(coarse[0].id, ids::ICE);
        assert!(coarse[1].is_air());

        let mesh = build_downsampled(&blocks, 4, &reg);
        assert_eq!(mesh.quad_count(), 6);
        // A coarse cell spans 4 units.
        let max_x = mesh.vertices.iter().map(|v| v.position[0]).fold(0.0, f32::max);
        assert_eq!(max_x, 4.0);
    }
}
