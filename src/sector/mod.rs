//! Sectors of the world grid and the render-facing interfaces

pub mod coord;
pub mod render;
pub mod sector;

pub use coord::SectorCoord;
pub use render::{ChunkDraw, ChunkRenderer, DrawRecord, DrawRecorder, MaterialHandle, ViewState};
pub use sector::{Sector, SectorConfig, SectorContext, SectorEntry, SectorPlan};
