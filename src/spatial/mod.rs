//! Spatial indexing shared by sectors and structures

pub mod octree;

pub use octree::{LooseOctree, OctreeConfig, MAX_GROW_ATTEMPTS, NUM_OBJECTS_ALLOWED};
