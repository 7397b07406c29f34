//! Voxel fill of a planned asteroid.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::{IVec3, Vec3};
use noise::{NoiseFn, Perlin};

use crate::core::types::Result;
use crate::core::Error;
use crate::generation::archetype::Archetype;
use crate::generation::hash::{hash_ivec3, seed_u32, unit_f32};
use crate::generation::placement::PlacementRecord;
use crate::spatial::OctreeConfig;
use crate::voxel::block::{Block, BlockRegistry};
use crate::voxel::chunk::{chunk_index_of, linear_index, local_of, CHUNK_SIZE, CHUNK_VOLUME};
use crate::voxel::structure::{StructureBody, StructureConfig, StructureId};

/// Thickness of the crust in blocks
const CRUST_DEPTH: f32 = 1.5;

/// Frequency of the surface displacement noise, per block
const SURFACE_FREQUENCY: f64 = 0.12;

/// Chunk grids of a filled asteroid, keyed by chunk index.
pub type ChunkGrids = BTreeMap<[i32; 3], Vec<Block>>;

/// Fill a displaced sphere around local (0, 0, 0).
///
/// The radius is clamped so the body stays inside `max_chunk_extent`.
pub fn fill_asteroid(
    record: &PlacementRecord,
    archetype: &Archetype,
    registry: &BlockRegistry,
    max_chunk_extent: i32,
) -> ChunkGrids {
    if !archetype.has_valid_roughness() {
        log::error!("archetype {}: roughness {} out of range", archetype.name, archetype.roughness);
        return ChunkGrids::new();
    }
    let limit = ((max_chunk_extent * CHUNK_SIZE) as f32 / (1.0 + archetype.roughness) - 2.0).max(1.0);
    let radius = record.radius.clamp(1.0, limit);
    let noise = Perlin::new(seed_u32(record.id.0));
    let reach = (radius * (1.0 + archetype.roughness)).ceil() as i32 + 1;

    let core = registry.create(archetype.core);
    let crust = registry.create(archetype.crust);
    let ore = archetype.ore.map(|id| registry.create(id));

    let mut grids = ChunkGrids::new();
    for z in -reach..=reach {
        for y in -reach..=reach {
            for x in -reach..=reach {
                let voxel = IVec3::new(x, y, z);
                let center = voxel.as_vec3() + Vec3::splat(0.5);
                let distance = center.length();
                if distance > reach as f32 {
                    continue;
                }
                let n = noise.get([
                    center.x as f64 * SURFACE_FREQUENCY,
                    center.y as f64 * SURFACE_FREQUENCY,
                    center.z as f64 * SURFACE_FREQUENCY,
                ]) as f32;
                let surface = radius * (1.0 + archetype.roughness * n);
                if distance > surface {
                    continue;
                }

                let depth = surface - distance;
                let block = match ore {
                    _ if depth < CRUST_DEPTH => crust,
                    Some(ore) if unit_f32(hash_ivec3(record.id.0, voxel)) < archetype.ore_chance => ore,
                    _ => core,
                };
                let grid = grids
                    .entry(chunk_index_of(voxel).to_array())
                    .or_insert_with(|| vec![Block::AIR; CHUNK_VOLUME]);
                grid[linear_index(local_of(voxel))] = block;
            }
        }
    }
    grids
}

/// Build the structure body for a placement record.
pub fn build_asteroid(
    id: StructureId,
    record: &PlacementRecord,
    archetype: &Archetype,
    registry: Arc<BlockRegistry>,
    config: StructureConfig,
    octree: OctreeConfig,
) -> Result<StructureBody> {
    let grids = fill_asteroid(record, archetype, &registry, config.max_chunk_extent);
    if grids.is_empty() {
        return Err(Error::Generation(format!(
            "placement {:?} produced no blocks",
            record.id
        )));
    }

    let mut body = StructureBody::new(id, record.position, registry, config, octree);
    body.set_origin(Some(record.id), Some(record.archetype.clone()));
    for (index, blocks) in grids {
        body.insert_chunk_blocks(IVec3::from_array(index), blocks, false)?;
    }
    body.recompute_properties();
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::arena::Handle;
    use crate::generation::archetype::ArchetypeTable;
    use crate::generation::biome_gen::Biome;
    use crate::generation::placement::PlacementId;

    fn record(radius: f32, archetype: &str) -> PlacementRecord {
        PlacementRecord {
            id: PlacementId(1234),
            position: Vec3::new(500.0, 20.0, -40.0),
            radius,
            archetype: archetype.to_string(),
            biome: Biome::RockField,
        }
    }

    #[test]
    fn test_fill_is_deterministic_and_roughly_round() {
        let table = ArchetypeTable::default();
        let registry = BlockRegistry::default();
        let archetype = table.get("boulder").unwrap();
        let a = fill_asteroid(&record(10.0, "boulder"), archetype, &registry, 8);
        let b = fill_asteroid(&record(10.0, "boulder"), archetype, &registry, 8);
        assert_eq!(a, b);

        let solid: usize = a.values().map(|g| g.iter().filter(|b| !b.is_air()).count()).sum();
        let sphere = 4.0 / 3.0 * std::f32::consts::PI * 1000.0;
        assert!((solid as f32) > sphere * 0.3 && (solid as f32) < sphere * 3.0, "{} blocks", solid);
        // The centre is always solid.
        let origin = &a[&[0, 0, 0]];
        assert!(!origin[linear_index(IVec3::ZERO)].is_air());
    }

    #[test]
    fn test_build_asteroid_body() {
        let table = ArchetypeTable::default();
        let registry = Arc::new(BlockRegistry::default());
        let rec = record(6.0, "metal_core");
        let body = build_asteroid(
            Handle::from_raw(0, 0),
            &rec,
            table.get("metal_core").unwrap(),
            registry,
            StructureConfig::default(),
            OctreeConfig::default(),
        )
        .unwrap();

        assert!(body.total_mass() > 0.0);
        assert!(!body.is_modified());
        assert_eq!(body.placement(), Some(rec.id));
        assert_eq!(body.archetype(), Some("metal_core"));
        assert!(body.neighbor_links_symmetric());
        // Displaced sphere around local 0: the centre of mass sits near the record position.
        assert!(body.center_of_mass().distance(rec.position + Vec3::splat(0.5)) < 3.0);
        let bounds = body.geometry_bounds().unwrap();
        assert!(bounds.contains_point(rec.position));
    }

    #[test]
    fn test_degenerate_roughness_builds_nothing() {
        let table = ArchetypeTable::default();
        let registry = Arc::new(BlockRegistry::default());
        let mut archetype = table.get("rubble").unwrap().clone();
        archetype.roughness = -1.0;
        assert!(fill_asteroid(&record(6.0, "rubble"), &archetype, &registry, 8).is_empty());
        let built = build_asteroid(
            Handle::from_raw(0, 0),
            &record(6.0, "rubble"),
            &archetype,
            registry,
            StructureConfig::default(),
            OctreeConfig::default(),
        );
        assert!(built.is_err());
    }

    #[test]
    fn test_radius_is_clamped_to_extent() {
        let table = ArchetypeTable::default();
        let registry = BlockRegistry::default();
        let grids = fill_asteroid(&record(500.0, "rubble"), table.get("rubble").unwrap(), &registry, 1);
        assert!(grids.keys().all(|k| IVec3::from_array(*k).abs().max_element() <= 1));
    }
}
