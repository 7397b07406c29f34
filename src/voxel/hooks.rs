//! Callbacks into collaborators that live outside the world core.

use glam::{IVec3, Vec3};

use crate::voxel::block::Block;
use crate::voxel::structure::StructureId;

/// Notifications raised while blocks are placed or removed.
///
/// Every method defaults to a no-op so collaborators only implement what they
/// consume (drop effects, destruction visuals, the electrical network).
pub trait BlockHooks {
    /// A removed block should spawn a pickup at `position`.
    fn spawn_drop(&mut self, _position: Vec3, _block: Block) {}

    /// A block was destroyed at `position`; `normal` is the face that was hit.
    fn destruction_visual(&mut self, _position: Vec3, _normal: Vec3, _block: Block) {}

    /// A block with the electrical capability joined `structure` at structure-local `voxel`.
    fn electrical_added(&mut self, _structure: StructureId, _voxel: IVec3, _block: Block) {}

    /// A block with the electrical capability left `structure`.
    fn electrical_removed(&mut self, _structure: StructureId, _voxel: IVec3, _block: Block) {}
}

/// Hooks that ignore everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHooks;

impl BlockHooks for NoHooks {}

/// Hooks that record every call; handy for tests and tooling.
#[derive(Clone, Debug, Default)]
pub struct RecordingHooks {
    pub drops: Vec<(Vec3, Block)>,
    pub destroyed: Vec<(Vec3, Block)>,
    pub electrical_added: Vec<(StructureId, IVec3)>,
    pub electrical_removed: Vec<(StructureId, IVec3)>,
}

impl BlockHooks for RecordingHooks {
    fn spawn_drop(&mut self, position: Vec3, block: Block) {
        self.drops.push((position, block));
    }

    fn destruction_visual(&mut self, position: Vec3, _normal: Vec3, block: Block) {
        self.destroyed.push((position, block));
    }

    fn electrical_added(&mut self, structure: StructureId, voxel: IVec3, _block: Block) {
        self.electrical_added.push((structure, voxel));
    }

    fn electrical_removed(&mut self, structure: StructureId, voxel: IVec3, _block: Block) {
        self.electrical_removed.push((structure, voxel));
    }
}
