//! Local light propagation inside one chunk.
//!
//! Emissive blocks seed a breadth-first flood fill that loses one level per
//! step through transparent cells. The fill never leaves the chunk; cells
//! outside are treated as ambient by the mesher.

use std::collections::VecDeque;

use glam::IVec3;

use crate::voxel::block::{Block, BlockRegistry, MAX_LIGHT};
use crate::voxel::chunk::{linear_index, CHUNK_SIZE, CHUNK_VOLUME};

/// Per-voxel light levels for one chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct LightField {
    levels: Box<[u8]>,
}

impl LightField {
    /// Flood-fill light through `blocks` (a full chunk grid).
    pub fn compute(blocks: &[Block], registry: &BlockRegistry, ambient: u8) -> Self {
        debug_assert_eq!(blocks.len(), CHUNK_VOLUME);
        let ambient = ambient.min(MAX_LIGHT);
        let mut levels = vec![0u8; CHUNK_VOLUME].into_boxed_slice();
        let mut queue = VecDeque::new();

        for z in 0..CHUNK_SIZE {
            for y in 0..CHUNK_SIZE {
                for x in 0..CHUNK_SIZE {
                    let p = IVec3::new(x, y, z);
                    let i = linear_index(p);
                    let block = blocks[i];
                    let emitted = registry.light_emission(block).max(if block.is_air() { 0 } else { block.light.min(MAX_LIGHT) });
                    if emitted > 0 {
                        levels[i] = emitted;
                        queue.push_back(p);
                    } else if registry.is_transparent(block) {
                        levels[i] = ambient;
                    }
                }
            }
        }

        const STEPS: [IVec3; 6] = [
            IVec3::X, IVec3::NEG_X, IVec3::Y, IVec3::NEG_Y, IVec3::Z, IVec3::NEG_Z,
        ];

        while let Some(p) = queue.pop_front() {
            let level = levels[linear_index(p)];
            if level <= 1 {
                continue;
            }
            for step in STEPS {
                let n = p + step;
                if n.cmplt(IVec3::ZERO).any() || n.cmpge(IVec3::splat(CHUNK_SIZE)).any() {
                    continue;
                }
                let ni = linear_index(n);
                if !registry.is_transparent(blocks[ni]) {
                    continue;
                }
                if levels[ni] < level - 1 {
                    levels[ni] = level - 1;
                    queue.push_back(n);
                }
            }
        }

        Self { levels }
    }

    /// Light level at a chunk-local position, `None` outside the chunk.
    pub fn level(&self, local: IVec3) -> Option<u8> {
        if local.cmplt(IVec3::ZERO).any() || local.cmpge(IVec3::splat(CHUNK_SIZE)).any() {
            return None;
        }
        Some(self.levels[linear_index(local)])
    }

    pub fn max_level(&self) -> u8 {
        self.levels.iter().copied().max().unwrap_or(0)
    }
}
