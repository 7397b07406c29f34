//! Asteria - a voxel world engine for space survival games
//!
//! The world is a grid of sectors. Each sector is planned up front (biomes
//! and blue-noise structure placements) and realized lazily around the
//! observer into voxel structure bodies made of 32³ chunks.

pub mod core;
pub mod math;
pub mod spatial;
pub mod voxel;
pub mod generation;
pub mod sector;
pub mod persist;
pub mod world;

pub use sector::{Sector, SectorCoord};
pub use world::{World, WorldConfig};
