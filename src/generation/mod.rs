//! Procedural generation: biomes, structure placement and asteroid fill.
//!
//! Everything here is a pure function of the world seed and its inputs, so
//! sector plans can be built on worker threads and regenerated at will.

pub mod archetype;
pub mod asteroid_gen;
pub mod biome_gen;
pub mod config;
pub mod hash;
pub mod placement;

pub use archetype::{Archetype, ArchetypeTable};
pub use asteroid_gen::{build_asteroid, fill_asteroid};
pub use biome_gen::{Biome, BiomeField};
pub use config::GenerationConfig;
pub use placement::{plan_placements, poisson_disc, PlacementId, PlacementRecord};
