//! Biome classification over a sector volume
//!
//! Biomes come from 3D cellular (Worley) noise: every noise cell carries one
//! value, which is bucketed into a [`Biome`]. The field is sampled once per
//! coarse grid cell when a sector is planned and answered from the grid
//! afterwards.

use glam::{UVec3, Vec3};
use noise::{NoiseFn, Worley};
use serde::{Deserialize, Serialize};

use crate::generation::config::GenerationConfig;
use crate::generation::hash::seed_u32;
use crate::math::Aabb;

/// Upper bound on biome samples per sector axis.
pub const MAX_BIOME_RESOLUTION: u32 = 64;

/// Space biomes, each with its own set of structure archetypes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Biome {
    /// Empty space; nothing spawns
    Void,
    IceBelt,
    RockField,
    MetalRich,
    Crystalline,
}

impl Biome {
    pub const ALL: [Biome; 5] = [
        Biome::Void,
        Biome::IceBelt,
        Biome::RockField,
        Biome::MetalRich,
        Biome::Crystalline,
    ];

    /// Bucket a noise value in [-1, 1].
    pub fn from_noise(value: f64) -> Biome {
        let t = ((value + 1.0) * 0.5).clamp(0.0, 1.0);
        let i = ((t * Self::ALL.len() as f64) as usize).min(Self::ALL.len() - 1);
        Self::ALL[i]
    }
}

/// Coarse biome grid covering one sector.
#[derive(Clone, Debug, PartialEq)]
pub struct BiomeField {
    bounds: Aabb,
    resolution: u32,
    cells: Vec<Biome>,
}

impl BiomeField {
    /// Sample cellular noise at every cell centre of `bounds`.
    pub fn generate(bounds: Aabb, config: &GenerationConfig) -> Self {
        let resolution = config.biome_resolution.clamp(1, MAX_BIOME_RESOLUTION);
        if resolution != config.biome_resolution {
            log::warn!(
                "biome resolution {} clamped to {}",
                config.biome_resolution,
                resolution
            );
        }
        let noise = Worley::new(seed_u32(config.seed)).set_frequency(config.biome_frequency);
        let cell = bounds.size() / resolution as f32;

        let mut cells = Vec::with_capacity((resolution as usize).pow(3));
        for z in 0..resolution {
            for y in 0..resolution {
                for x in 0..resolution {
                    let p = bounds.min + (UVec3::new(x, y, z).as_vec3() + Vec3::splat(0.5)) * cell;
                    let value = noise.get([p.x as f64, p.y as f64, p.z as f64]);
                    cells.push(Biome::from_noise(value));
                }
            }
        }

        Self {
            bounds,
            resolution,
            cells,
        }
    }

    /// Biome governing `point`; points outside clamp to the nearest cell.
    pub fn sample(&self, point: Vec3) -> Biome {
        let res = self.resolution as f32;
        let t = ((point - self.bounds.min) / self.bounds.size() * res)
            .floor()
            .clamp(Vec3::ZERO, Vec3::splat(res - 1.0))
            .as_uvec3();
        self.cells[(t.x + t.y * self.resolution + t.z * self.resolution * self.resolution) as usize]
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn cells(&self) -> &[Biome] {
        &self.cells
    }

    /// Cells per biome, indexed like [`Biome::ALL`].
    pub fn histogram(&self) -> [usize; 5] {
        let mut counts = [0; 5];
        for biome in &self.cells {
            counts[*biome as usize] += 1;
        }
        counts
    }
}
