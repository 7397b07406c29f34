//! Plain-data snapshots of structures for the save/load boundary.
//!
//! Vectors are stored as arrays so the types archive with rkyv directly.

use rkyv::{Archive, Deserialize, Serialize};

use crate::voxel::block::Block;

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 2;

/// One chunk's grid and bookkeeping.
#[derive(Archive, Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ChunkSnapshot {
    /// Chunk index relative to the structure origin
    pub index: [i32; 3],
    pub modified: bool,
    /// Full grid, x fastest
    pub blocks: Vec<Block>,
}

#[derive(Archive, Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct StructureSnapshot {
    pub version: u32,
    /// Persistent structure id
    pub uid: u64,
    /// World position of local voxel (0, 0, 0)
    pub position: [f32; 3],
    /// Placement record the body came from, if generated
    pub placement: Option<u64>,
    pub archetype: Option<String>,
    pub modified: bool,
    pub chunks: Vec<ChunkSnapshot>,
}

impl StructureSnapshot {
    pub fn block_count(&self) -> usize {
        self.chunks
            .iter()
            .map(|c| c.blocks.iter().filter(|b| !b.is_air()).count())
            .sum()
    }
}
