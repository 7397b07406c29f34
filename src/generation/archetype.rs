//! Structure archetypes: what kind of asteroid a placement turns into

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::types::Result;
use crate::core::Error;
use crate::generation::biome_gen::Biome;
use crate::voxel::block::{ids, BlockId, BlockRegistry};

/// Recipe for one family of procedurally filled structures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Archetype {
    pub name: String,
    /// Relative weight among the archetypes a biome offers
    pub spawn_weight: f32,
    pub biomes: Vec<Biome>,
    pub min_radius: f32,
    pub max_radius: f32,
    /// Block filling the interior
    pub core: BlockId,
    /// Block of the outer shell
    pub crust: BlockId,
    #[serde(default)]
    pub ore: Option<BlockId>,
    /// Chance per interior block of being ore
    #[serde(default)]
    pub ore_chance: f32,
    /// Surface displacement as a fraction of the radius
    #[serde(default = "default_roughness")]
    pub roughness: f32,
}

fn default_roughness() -> f32 {
    0.25
}

impl Archetype {
    /// Displacement must keep the surface radius positive and bounded.
    pub fn has_valid_roughness(&self) -> bool {
        self.roughness > -1.0 && self.roughness <= 1.0
    }
}

/// All archetypes known to the generator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeTable {
    archetypes: Vec<Archetype>,
}

impl ArchetypeTable {
    pub fn new(archetypes: Vec<Archetype>) -> Result<Self> {
        let table = Self { archetypes };
        table.validate()?;
        Ok(table)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let table: Self = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    fn validate(&self) -> Result<()> {
        for a in &self.archetypes {
            if !a.spawn_weight.is_finite() || a.spawn_weight < 0.0 {
                return Err(Error::Config(format!("archetype {}: bad spawn weight", a.name)));
            }
            if !(a.min_radius > 0.0) || a.max_radius < a.min_radius {
                return Err(Error::Config(format!("archetype {}: bad radius range", a.name)));
            }
            if !a.has_valid_roughness() {
                return Err(Error::Config(format!(
                    "archetype {}: roughness {} must be within (-1, 1]",
                    a.name, a.roughness
                )));
            }
            if !(0.0..=1.0).contains(&a.ore_chance) {
                return Err(Error::Config(format!("archetype {}: bad ore chance", a.name)));
            }
        }
        Ok(())
    }

    /// Every block an archetype fills with must be a registered solid.
    pub fn validate_blocks(&self, registry: &BlockRegistry) -> Result<()> {
        for a in &self.archetypes {
            let used = [Some(a.core), Some(a.crust), a.ore];
            for id in used.into_iter().flatten() {
                if id == ids::AIR || registry.get(id).is_none() {
                    return Err(Error::Config(format!(
                        "archetype {}: block {} is not a registered solid",
                        a.name, id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Archetype> {
        self.archetypes.iter().find(|a| a.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }

    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    /// Archetypes a biome can spawn (positive weight only).
    pub fn candidates(&self, biome: Biome) -> impl Iterator<Item = &Archetype> {
        self.archetypes
            .iter()
            .filter(move |a| a.spawn_weight > 0.0 && a.biomes.contains(&biome))
    }

    /// Weighted random pick among the biome's candidates.
    pub fn choose(&self, biome: Biome, rng: &mut fastrand::Rng) -> Option<&Archetype> {
        let total: f32 = self.candidates(biome).map(|a| a.spawn_weight).sum();
        if total <= 0.0 {
            return None;
        }
        let mut pick = rng.f32() * total;
        let mut last = None;
        for a in self.candidates(biome) {
            if pick < a.spawn_weight {
                return Some(a);
            }
            pick -= a.spawn_weight;
            last = Some(a);
        }
        // Rounding left `pick` just past the end.
        last
    }
}

impl Default for ArchetypeTable {
    fn default() -> Self {
        let rock = |name: &str, weight: f32, biomes: Vec<Biome>, radius: (f32, f32), core, crust| Archetype {
            name: name.to_string(),
            spawn_weight: weight,
            biomes,
            min_radius: radius.0,
            max_radius: radius.1,
            core,
            crust,
            ore: None,
            ore_chance: 0.0,
            roughness: default_roughness(),
        };

        Self {
            archetypes: vec![
                rock("ice_chunk", 3.0, vec![Biome::IceBelt], (5.0, 14.0), ids::ICE, ids::ICE),
                rock("dirty_ice", 1.0, vec![Biome::IceBelt, Biome::RockField], (6.0, 16.0), ids::ICE, ids::REGOLITH),
                rock("rubble", 3.0, vec![Biome::RockField], (4.0, 10.0), ids::STONE, ids::REGOLITH),
                Archetype {
                    ore: Some(ids::IRON_ORE),
                    ore_chance: 0.06,
                    ..rock("boulder", 2.0, vec![Biome::RockField, Biome::MetalRich], (8.0, 20.0), ids::STONE, ids::REGOLITH)
                },
                Archetype {
                    ore: Some(ids::GOLD_ORE),
                    ore_chance: 0.04,
                    roughness: 0.15,
                    ..rock("metal_core", 2.0, vec![Biome::MetalRich], (6.0, 16.0), ids::IRON_ORE, ids::STONE)
                },
                Archetype {
                    ore: Some(ids::CRYSTAL),
                    ore_chance: 0.1,
                    roughness: 0.35,
                    ..rock("geode", 1.0, vec![Biome::Crystalline], (6.0, 14.0), ids::STONE, ids::STONE)
                },
            ],
        }
    }
}
