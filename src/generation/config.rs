//! Procedural generation parameters.

use serde::{Deserialize, Serialize};

use crate::core::types::Result;
use crate::core::Error;
use crate::generation::biome_gen::MAX_BIOME_RESOLUTION;

/// Placements may not be packed tighter than a sector edge divided by this.
pub const MAX_SEPARATION_DIVISOR: f32 = 64.0;

/// Parameters for sector planning (biomes and structure placement).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// World seed; every sector derives its own seed from it
    pub seed: u64,
    /// Cellular noise frequency for biome cells (per world unit)
    pub biome_frequency: f64,
    /// Biome samples per sector axis
    pub biome_resolution: u32,
    /// Minimum distance between two placements
    pub min_separation: f32,
    /// Candidates tried around each active point before it is retired
    pub max_attempts: u32,
    /// Upper bound on placements per sector
    pub max_placements: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            seed: 0x5EED_A57E,
            biome_frequency: 0.0025,
            biome_resolution: 16,
            min_separation: 160.0,
            max_attempts: 30,
            max_placements: 256,
        }
    }
}

impl GenerationConfig {
    /// Check that planning a sector of edge `sector_size` stays bounded.
    pub fn validate_for_sector(&self, sector_size: f32) -> Result<()> {
        let floor = sector_size / MAX_SEPARATION_DIVISOR;
        if !self.min_separation.is_finite() || self.min_separation < floor {
            return Err(Error::Config(format!(
                "min separation {} is below {} for sector size {}",
                self.min_separation, floor, sector_size
            )));
        }
        if !(1..=MAX_BIOME_RESOLUTION).contains(&self.biome_resolution) {
            return Err(Error::Config(format!(
                "biome resolution {} must be within 1..={}",
                self.biome_resolution, MAX_BIOME_RESOLUTION
            )));
        }
        if !self.biome_frequency.is_finite() || self.biome_frequency <= 0.0 {
            return Err(Error::Config(format!(
                "biome frequency {} must be positive",
                self.biome_frequency
            )));
        }
        Ok(())
    }
}
