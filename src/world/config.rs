//! World configuration, loadable from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::types::Result;
use crate::core::Error;
use crate::generation::config::GenerationConfig;
use crate::sector::sector::SectorConfig;
use crate::spatial::OctreeConfig;
use crate::voxel::block::MAX_LIGHT;
use crate::voxel::lod::LodConfig;
use crate::voxel::structure::StructureConfig;

/// Per-frame rendering options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub view_distance: f32,
    /// Recompute light fields when meshes are rebuilt
    pub lighting: bool,
    /// Light level of cells open to space
    pub ambient_light: u8,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            view_distance: 768.0,
            lighting: true,
            ambient_light: MAX_LIGHT,
        }
    }
}

impl RenderConfig {
    /// Ambient level to light meshes with, if lighting is on.
    pub fn lighting_level(&self) -> Option<u8> {
        self.lighting.then_some(self.ambient_light.min(MAX_LIGHT))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub generation: GenerationConfig,
    pub sector: SectorConfig,
    pub structure: StructureConfig,
    pub lod: LodConfig,
    pub render: RenderConfig,
    pub octree: OctreeConfig,
}

impl WorldConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let sector = &self.sector;
        if !(sector.size > 0.0) {
            return Err(Error::Config("sector size must be positive".into()));
        }
        if sector.prefetch_margin < 0.0 || sector.prefetch_margin * 2.0 > sector.size {
            return Err(Error::Config(format!(
                "prefetch margin {} does not fit sector size {}",
                sector.prefetch_margin, sector.size
            )));
        }
        self.generation.validate_for_sector(sector.size)?;
        if self.structure.max_chunk_extent < 0 {
            return Err(Error::Config("max chunk extent must not be negative".into()));
        }
        if !self.lod.distances.windows(2).all(|w| w[0] <= w[1]) {
            return Err(Error::Config(format!(
                "LOD distances must be ascending, got {:?}",
                self.lod.distances
            )));
        }
        Ok(())
    }
}
