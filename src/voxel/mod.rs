//! Voxel data: blocks, chunks, meshing, lighting and structure bodies

pub mod block;
pub mod chunk;
pub mod hooks;
pub mod lighting;
pub mod lod;
pub mod mesh;
pub mod structure;

pub use block::{ids, Block, BlockId, BlockProperties, BlockRegistry, MAX_LIGHT};
pub use chunk::{Chunk, ChunkId, ChunkState, Face, CHUNK_SIZE, CHUNK_VOLUME};
pub use hooks::{BlockHooks, NoHooks, RecordingHooks};
pub use lighting::LightField;
pub use lod::{LodBuilder, LodConfig, LodTier};
pub use mesh::{MeshData, MeshVertex};
pub use structure::{CollideInfo, DamageOutcome, HitInfo, StructureBody, StructureConfig, StructureId};
