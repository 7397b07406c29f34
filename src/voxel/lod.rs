//! Distance-based level of detail for chunk meshes
//!
//! The nearest tier is meshed synchronously at full detail. Farther tiers are
//! downsampled on worker threads and handed back through a [`JobQueue`];
//! [`crate::voxel::chunk::Chunk::apply_lod_result`] drops results that no
//! longer match what the chunk wants.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::jobs::JobQueue;
use crate::voxel::block::{Block, BlockRegistry};
use crate::voxel::chunk::ChunkId;
use crate::voxel::mesh::{build_downsampled, MeshData};
use crate::voxel::structure::StructureId;

/// Mesh detail tiers, nearest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LodTier {
    Full,
    Half,
    Quarter,
    Eighth,
}

impl LodTier {
    /// Blocks per coarse cell edge
    pub fn factor(self) -> i32 {
        match self {
            LodTier::Full => 1,
            LodTier::Half => 2,
            LodTier::Quarter => 4,
            LodTier::Eighth => 8,
        }
    }
}

/// Tier switch distances in world units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    /// Upper bound of Full, Half and Quarter; beyond the last is Eighth
    pub distances: [f32; 3],
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            distances: [96.0, 192.0, 384.0],
        }
    }
}

impl LodConfig {
    /// Tier for a squared distance from the viewer.
    pub fn select(&self, distance_sq: f32) -> LodTier {
        let [full, half, quarter] = self.distances;
        if distance_sq <= full * full {
            LodTier::Full
        } else if distance_sq <= half * half {
            LodTier::Half
        } else if distance_sq <= quarter * quarter {
            LodTier::Quarter
        } else {
            LodTier::Eighth
        }
    }
}

/// Work item for a downsampled mesh. Carries a copy of the blocks so the
/// worker never touches world state.
pub struct LodBuildRequest {
    pub structure: StructureId,
    pub chunk: ChunkId,
    pub tier: LodTier,
    /// Chunk content revision the copy was taken at
    pub revision: u64,
    pub blocks: Box<[Block]>,
}

#[derive(Debug)]
pub struct LodBuildResult {
    pub structure: StructureId,
    pub chunk: ChunkId,
    pub tier: LodTier,
    pub revision: u64,
    pub mesh: MeshData,
}

/// Runs downsampled mesh builds in the background.
pub struct LodBuilder {
    queue: JobQueue<LodBuildResult>,
    registry: Arc<BlockRegistry>,
}

impl LodBuilder {
    pub fn new(registry: Arc<BlockRegistry>) -> Self {
        Self {
            queue: JobQueue::new(),
            registry,
        }
    }

    pub fn submit(&mut self, request: LodBuildRequest) {
        let registry = Arc::clone(&self.registry);
        log::trace!(
            "queueing {:?} mesh for chunk {:?} (revision {})",
            request.tier,
            request.chunk,
            request.revision
        );
        self.queue.submit(move || {
            let mesh = build_downsampled(&request.blocks, request.tier.factor(), &registry);
            LodBuildResult {
                structure: request.structure,
                chunk: request.chunk,
                tier: request.tier,
                revision: request.revision,
                mesh,
            }
        });
    }

    /// Finished builds, ready to be validated and applied.
    pub fn drain(&mut self) -> Vec<LodBuildResult> {
        self.queue.drain()
    }

    /// Block until one build finishes; `None` when idle.
    pub fn wait_one(&mut self) -> Option<LodBuildResult> {
        self.queue.wait_one()
    }

    pub fn in_flight(&self) -> usize {
        self.queue.in_flight()
    }
}
